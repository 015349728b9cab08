// Search page controller.
// Every parameter change goes cache first, then through a debounce window, and
// only the response to the latest change may touch the view. Results are
// mirrored onto the map as markers once the maps SDK is ready.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    api::ApiError,
    attractions::AttractionsService,
    cache::{create_cache_key, CachePolicy, SearchCache, SearchResults},
    map::{MapSurface, MarkerLayer, MarkerSpec},
    map_loader::{MapLoader, MapState},
    models::{Attraction, SortOrder},
    query::SearchQuery,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchConfig {
    // Applied when the query has free text
    pub query_debounce: Duration,
    // Applied for filter-only changes
    pub filter_debounce: Duration,
    pub cache: CachePolicy,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            query_debounce: Duration::from_millis(400),
            filter_debounce: Duration::from_millis(150),
            cache: CachePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchView {
    pub query: SearchQuery,
    pub results: SearchResults,
    pub loading: bool,
    pub error: Option<String>,
    pub from_cache: bool,
    pub map: MapState,
}

pub fn markers_for(results: &[Attraction]) -> Vec<MarkerSpec> {
    results
        .iter()
        .filter_map(|attraction| {
            Some(MarkerSpec {
                position: attraction.coordinate()?,
                title: attraction.name.clone(),
                target: attraction.link_target(),
            })
        })
        .collect()
}

pub struct SearchController {
    attractions: AttractionsService,
    cache: SearchCache,
    config: SearchConfig,
    view: RwLock<SearchView>,
    // Token of the most recent parameter change
    latest: AtomicU64,
    pending: Mutex<Option<JoinHandle<()>>>,
    map_loader: Arc<MapLoader>,
    markers: MarkerLayer,
}

impl SearchController {
    pub fn new(
        attractions: AttractionsService,
        config: SearchConfig,
        map_loader: Arc<MapLoader>,
    ) -> Arc<Self> {
        Arc::new(Self {
            attractions,
            cache: SearchCache::new(config.cache),
            config,
            view: RwLock::new(SearchView::default()),
            latest: AtomicU64::new(0),
            pending: Mutex::new(None),
            map_loader,
            markers: MarkerLayer::new(),
        })
    }

    pub fn view(&self) -> SearchView {
        self.view.read().clone()
    }

    pub fn cache(&self) -> &SearchCache {
        &self.cache
    }

    pub fn markers(&self) -> &MarkerLayer {
        &self.markers
    }

    /// Loads the maps SDK and, once it is ready, shows the current results
    /// on `surface`. Without a key or after a failed load the surface is left
    /// alone and the view reports the map state instead.
    pub async fn attach_map(&self, surface: Arc<dyn MapSurface>) -> MapState {
        let state = MapState::from(self.map_loader.load().await);
        let mut view = self.view.write();
        if state.is_ready() {
            self.markers.attach(surface);
        }
        view.map = state.clone();
        state
    }

    fn next_token(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_latest(&self, token: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == token
    }

    fn cancel_pending(&self) {
        if let Some(handle) = self.pending.lock().take() {
            handle.abort();
        }
    }

    pub fn set_query_string(self: &Arc<Self>, raw: &str) {
        self.set_query(SearchQuery::from_query_string(raw));
    }

    /// Applies new search parameters.
    ///
    /// A fresh cache entry is shown at once. Otherwise a request is scheduled
    /// after the debounce window, replacing any request still waiting for its
    /// window. Must be called from within a tokio runtime.
    pub fn set_query(self: &Arc<Self>, query: SearchQuery) {
        let token = self.next_token();
        self.cancel_pending();

        let key = create_cache_key(&query);
        {
            let mut view = self.view.write();
            view.query = query.clone();
        }

        if let Some(results) = self.cache.get(&key) {
            debug!(%key, "search served from cache");
            self.apply(token, results, true);
            return;
        }

        {
            let mut view = self.view.write();
            view.loading = true;
            view.error = None;
        }

        let delay = if query.has_text() {
            self.config.query_debounce
        } else {
            self.config.filter_debounce
        };

        let this = self.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Past the window the request is no longer cancellable, only stale
            tokio::spawn(async move {
                this.fetch(token, query, key).await;
            });
        });

        *self.pending.lock() = Some(timer);
    }

    // Manual "try again": skips both the cache and the debounce window
    pub async fn refresh(&self) {
        let token = self.next_token();
        self.cancel_pending();

        let query = {
            let mut view = self.view.write();
            view.loading = true;
            view.error = None;
            view.query.clone()
        };
        let key = create_cache_key(&query);
        self.fetch(token, query, key).await;
    }

    /// Resolves `query` right away, from the cache when fresh. Leaves the
    /// view untouched.
    pub async fn search_now(&self, query: &SearchQuery) -> Result<SearchResults, ApiError> {
        let key = create_cache_key(query);
        if let Some(results) = self.cache.get(&key) {
            return Ok(results);
        }

        let results = Arc::new(self.attractions.search(&query.to_params()).await?);
        self.cache.store(&key, results.clone());
        Ok(results)
    }

    pub fn sorted(&self, order: SortOrder) -> Vec<Attraction> {
        let mut results = self.view.read().results.to_vec();
        order.sort(&mut results);
        results
    }

    async fn fetch(&self, token: u64, query: SearchQuery, key: String) {
        match self.attractions.search(&query.to_params()).await {
            Ok(results) => {
                let results = Arc::new(results);
                // Stale responses still warm the cache for their own key
                self.cache.store(&key, results.clone());
                if self.is_latest(token) {
                    info!(count = results.len(), "search results loaded");
                    self.apply(token, results, false);
                } else {
                    debug!(token, %key, "discarding stale search response");
                }
            }
            Err(err) => {
                if !self.is_latest(token) {
                    debug!(token, error = %err, "ignoring stale search failure");
                    return;
                }
                warn!(error = %err, "search failed");
                let mut view = self.view.write();
                view.loading = false;
                view.error = Some(err.to_string());
            }
        }
    }

    fn apply(&self, token: u64, results: SearchResults, from_cache: bool) {
        // Markers are synced under the view guard so they always match the
        // result set the view shows
        let mut view = self.view.write();
        if !self.is_latest(token) {
            return;
        }
        let placed = self.markers.sync(markers_for(&results));
        debug!(placed, total = results.len(), "search markers synced");

        view.results = results;
        view.loading = false;
        view.error = None;
        view.from_cache = from_cache;
    }
}

impl Drop for SearchController {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}
