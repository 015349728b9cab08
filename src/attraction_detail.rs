// Attraction detail controller.
// Unknown attractions are imported on first visit, and the "add to trip" toggle
// keeps the shared trip index in step with the backend.

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    api::ApiError,
    attractions::{AttractionsService, DEFAULT_SIMILAR_LIMIT},
    compilations::CompilationsService,
    membership::{TripIndex, TripMembership},
    models::{place_photo_url, Attraction, Compilation},
};

#[derive(Error, Debug)]
pub enum DetailError {
    #[error("Missing attraction id")]
    MissingId,

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone, Default)]
pub struct AttractionDetailView {
    pub attraction: Option<Attraction>,
    pub similar: Vec<Attraction>,
    pub membership: Option<TripMembership>,
    // Local only, never sent to the backend
    pub favorite: bool,
    pub loading: bool,
    pub error: Option<String>,
}

pub struct AttractionDetail {
    attractions: AttractionsService,
    compilations: CompilationsService,
    index: Arc<TripIndex>,
    maps_api_key: Option<String>,
    view: RwLock<AttractionDetailView>,
    toggle: Mutex<()>,
}

impl AttractionDetail {
    pub fn new(
        attractions: AttractionsService,
        compilations: CompilationsService,
        index: Arc<TripIndex>,
        maps_api_key: Option<String>,
    ) -> Self {
        Self {
            attractions,
            compilations,
            index,
            maps_api_key,
            view: RwLock::new(AttractionDetailView::default()),
            toggle: Mutex::new(()),
        }
    }

    pub fn view(&self) -> AttractionDetailView {
        self.view.read().clone()
    }

    pub fn photo_url(&self, max_width: u32) -> Option<String> {
        let view = self.view.read();
        let reference = view.attraction.as_ref()?.photo_reference.as_deref()?;
        place_photo_url(reference, max_width, self.maps_api_key.as_deref())
    }

    /// Loads the attraction, its trip membership and similar attractions.
    ///
    /// An id the backend does not know yet is imported once through
    /// `save_place` and fetched again; a second miss is returned as an error.
    /// Membership and similar attractions are best effort.
    pub async fn load(&self, id: &str) -> Result<Attraction, DetailError> {
        let id = id.trim();
        {
            let mut view = self.view.write();
            *view = AttractionDetailView {
                loading: true,
                ..Default::default()
            };
            if id.is_empty() {
                view.loading = false;
                view.error = Some(DetailError::MissingId.to_string());
                return Err(DetailError::MissingId);
            }
        }

        let attraction = match self.fetch(id).await {
            Ok(attraction) => attraction,
            Err(err) => {
                let mut view = self.view.write();
                view.loading = false;
                view.error = Some(err.to_string());
                return Err(err.into());
            }
        };

        let lookup_key = if attraction.place_id.is_empty() {
            id
        } else {
            attraction.place_id.as_str()
        };
        let membership = match self.compilations.list().await {
            Ok(compilations) => {
                self.index.rebuild(&compilations);
                self.index.lookup(lookup_key, Some(attraction.id))
            }
            Err(err) => {
                warn!(error = %err, "could not load trips for membership");
                None
            }
        };

        let similar = self
            .attractions
            .similar(id, DEFAULT_SIMILAR_LIMIT)
            .await
            .unwrap_or_else(|err| {
                warn!(error = %err, "could not load similar attractions");
                Vec::new()
            });

        let mut view = self.view.write();
        view.attraction = Some(attraction.clone());
        view.membership = membership;
        view.similar = similar;
        view.loading = false;
        Ok(attraction)
    }

    async fn fetch(&self, id: &str) -> Result<Attraction, ApiError> {
        match self.attractions.get(id).await {
            Err(err) if err.is_not_found() => {
                info!(%id, "attraction unknown to backend, importing");
                self.attractions.save_place(id).await?;
                self.attractions.get(id).await
            }
            other => other,
        }
    }

    /// Adds the attraction to a trip, or removes it when it is already in
    /// one. Returns the membership after the toggle.
    ///
    /// Toggles on one controller run one at a time. On failure the previous
    /// membership is kept.
    pub async fn toggle_trip(&self) -> Result<Option<TripMembership>, ApiError> {
        let _serialized = self.toggle.lock().await;

        let (attraction, current) = {
            let view = self.view.read();
            match &view.attraction {
                Some(attraction) => (attraction.clone(), view.membership),
                None => return Ok(None),
            }
        };

        let result = match current {
            Some(membership) => self.remove_from_trip(membership).await,
            None => self.add_to_trip(&attraction).await,
        };

        match result {
            Ok(membership) => {
                self.view.write().membership = membership;
                Ok(membership)
            }
            Err(err) => {
                warn!(error = %err, place_id = %attraction.place_id, "trip toggle failed");
                Err(err)
            }
        }
    }

    async fn add_to_trip(&self, attraction: &Attraction) -> Result<Option<TripMembership>, ApiError> {
        let compilation = self
            .attractions
            .save_to_trip(&attraction.place_id, None, None)
            .await?;
        self.index.apply_compilation(&compilation);

        let membership = membership_in(&compilation, attraction);
        if let Some(membership) = membership {
            info!(
                compilation_id = membership.compilation_id,
                place_id = %attraction.place_id,
                "added to trip"
            );
        }
        Ok(membership)
    }

    async fn remove_from_trip(
        &self,
        membership: TripMembership,
    ) -> Result<Option<TripMembership>, ApiError> {
        let updated = self
            .compilations
            .remove_item(membership.compilation_id, membership.attraction_id)
            .await?;
        self.index.apply_compilation(&updated);
        info!(compilation_id = membership.compilation_id, "removed from trip");
        Ok(None)
    }

    pub fn toggle_favorite(&self) -> bool {
        let mut view = self.view.write();
        view.favorite = !view.favorite;
        view.favorite
    }
}

// Ids of the attraction inside a trip the backend just returned. A trip with
// no items yields no membership; without a matching place the attraction's
// own id is used.
fn membership_in(compilation: &Compilation, attraction: &Attraction) -> Option<TripMembership> {
    if compilation.items.is_empty() {
        return None;
    }

    let membership = match compilation.find_place(&attraction.place_id) {
        Some(item) if item.attraction.id != 0 => TripMembership {
            compilation_id: compilation.id,
            item_id: item.id,
            attraction_id: item.attraction.id,
        },
        found => TripMembership {
            compilation_id: compilation.id,
            item_id: found.map(|item| item.id).unwrap_or_default(),
            attraction_id: attraction.id,
        },
    };
    Some(membership)
}
