// Lazy loading of the external maps SDK.
// At most one injection is in flight per loader; every caller awaits the same
// shared future. A failed load empties the slot so the next call tries again.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};
use url::form_urlencoded;

const MAPS_SCRIPT_BASE: &str = "https://maps.googleapis.com/maps/api/js";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapAvailability {
    Ready,
    // No API key configured; the caller renders without a map
    Unavailable,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MapLoadError {
    #[error("Map script request failed: {0}")]
    RequestFailed(String),

    #[error("Map script rejected with HTTP {0}")]
    Rejected(u16),
}

/// Map status as shown by a view.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MapState {
    #[default]
    NotLoaded,
    Ready,
    // Rendered as "map unavailable"
    Unavailable,
    Failed(MapLoadError),
}

impl MapState {
    pub fn is_ready(&self) -> bool {
        matches!(self, MapState::Ready)
    }
}

impl From<Result<MapAvailability, MapLoadError>> for MapState {
    fn from(result: Result<MapAvailability, MapLoadError>) -> Self {
        match result {
            Ok(MapAvailability::Ready) => MapState::Ready,
            Ok(MapAvailability::Unavailable) => MapState::Unavailable,
            Err(err) => MapState::Failed(err),
        }
    }
}

#[async_trait]
pub trait ScriptInjector: Send + Sync + 'static {
    // True once the SDK is usable
    fn is_loaded(&self) -> bool;

    async fn inject(&self, url: &str) -> Result<(), MapLoadError>;
}

pub fn script_url(api_key: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("key", api_key)
        .append_pair("libraries", "places")
        .finish();
    format!("{MAPS_SCRIPT_BASE}?{query}")
}

/// Fetches the SDK script over HTTP and treats a 2xx as a usable SDK.
pub struct HttpScriptInjector {
    client: reqwest::Client,
    loaded: AtomicBool,
}

impl HttpScriptInjector {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            loaded: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ScriptInjector for HttpScriptInjector {
    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    async fn inject(&self, url: &str) -> Result<(), MapLoadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MapLoadError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MapLoadError::Rejected(status.as_u16()));
        }

        self.loaded.store(true, Ordering::Release);
        Ok(())
    }
}

type LoadFuture = Shared<BoxFuture<'static, Result<MapAvailability, MapLoadError>>>;

pub struct MapLoader {
    injector: Arc<dyn ScriptInjector>,
    api_key: Option<String>,
    pending: Mutex<Option<LoadFuture>>,
}

impl MapLoader {
    pub fn new(injector: Arc<dyn ScriptInjector>, api_key: Option<String>) -> Self {
        Self {
            injector,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            pending: Mutex::new(None),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn load(&self) -> Result<MapAvailability, MapLoadError> {
        if self.injector.is_loaded() {
            return Ok(MapAvailability::Ready);
        }

        let Some(api_key) = self.api_key.as_deref() else {
            warn!("no maps API key configured, map disabled");
            return Ok(MapAvailability::Unavailable);
        };

        let load = {
            let mut pending = self.pending.lock();
            pending
                .get_or_insert_with(|| {
                    let injector = self.injector.clone();
                    let url = script_url(api_key);
                    async move {
                        injector.inject(&url).await?;
                        info!("maps SDK loaded");
                        Ok::<_, MapLoadError>(MapAvailability::Ready)
                    }
                    .boxed()
                    .shared()
                })
                .clone()
        };

        let result = load.clone().await;

        if let Err(err) = &result {
            warn!(error = %err, "maps SDK failed to load");
            let mut pending = self.pending.lock();
            // Only forget our own attempt, a retry may already be running
            if pending.as_ref().is_some_and(|p| p.ptr_eq(&load)) {
                *pending = None;
            }
        }

        result
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedInjector;
    use super::*;

    #[test]
    fn test_script_url() {
        assert_eq!(
            script_url("abc 123"),
            "https://maps.googleapis.com/maps/api/js?key=abc+123&libraries=places"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_loads_inject_once() {
        let injector = Arc::new(ScriptedInjector::default());
        let loader = MapLoader::new(injector.clone(), Some("key".into()));

        let (a, b, c) = tokio::join!(loader.load(), loader.load(), loader.load());

        assert_eq!(a, Ok(MapAvailability::Ready));
        assert_eq!(b, Ok(MapAvailability::Ready));
        assert_eq!(c, Ok(MapAvailability::Ready));
        assert_eq!(injector.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            injector.urls.lock().as_slice(),
            ["https://maps.googleapis.com/maps/api/js?key=key&libraries=places"]
        );

        // Already present: no new injection
        assert_eq!(loader.load().await, Ok(MapAvailability::Ready));
        assert_eq!(injector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let injector = Arc::new(ScriptedInjector::default());
        let loader = MapLoader::new(injector.clone(), Some("  ".into()));

        assert!(!loader.has_api_key());
        assert_eq!(loader.load().await, Ok(MapAvailability::Unavailable));
        assert_eq!(injector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_allows_retry() {
        let injector = Arc::new(ScriptedInjector::failing(1));
        let loader = MapLoader::new(injector.clone(), Some("key".into()));

        let (a, b) = tokio::join!(loader.load(), loader.load());
        assert_eq!(a, Err(MapLoadError::Rejected(403)));
        assert_eq!(b, Err(MapLoadError::Rejected(403)));
        assert_eq!(injector.calls.load(Ordering::SeqCst), 1);

        assert_eq!(loader.load().await, Ok(MapAvailability::Ready));
        assert_eq!(injector.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_map_state_from_load_result() {
        assert_eq!(MapState::from(Ok(MapAvailability::Ready)), MapState::Ready);
        assert_eq!(MapState::from(Ok(MapAvailability::Unavailable)), MapState::Unavailable);
        assert_eq!(
            MapState::from(Err(MapLoadError::Rejected(403))),
            MapState::Failed(MapLoadError::Rejected(403))
        );
        assert!(!MapState::default().is_ready());
    }
}
