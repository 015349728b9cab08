// `/attractions/*` façade. Every attraction leaving this module is normalized.

use tracing::debug;

use crate::{
    api::{ApiClient, ApiError},
    models::{Attraction, Compilation, SavePlaceRequest, SearchParams, SyncRequest, SyncSummary},
};

pub const DEFAULT_COUNTRY: &str = "France";
pub const DEFAULT_POPULAR_LIMIT: u32 = 20;
pub const DEFAULT_SIMILAR_LIMIT: u32 = 10;

fn normalize_all(raw: Option<Vec<Attraction>>) -> Vec<Attraction> {
    raw.unwrap_or_default()
        .into_iter()
        .map(Attraction::normalize)
        .collect()
}

#[derive(Clone)]
pub struct AttractionsService {
    api: ApiClient,
}

impl AttractionsService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn list(&self) -> Result<Vec<Attraction>, ApiError> {
        let raw = self.api.get("/attractions/", &[]).await?;
        Ok(normalize_all(raw))
    }

    pub async fn get(&self, id: &str) -> Result<Attraction, ApiError> {
        let raw: Attraction = self.api.get(&format!("/attractions/{id}/"), &[]).await?;
        Ok(raw.normalize())
    }

    pub async fn popular(&self, country: &str, limit: u32) -> Result<Vec<Attraction>, ApiError> {
        let params = [("country", country.to_string()), ("limit", limit.to_string())];
        let raw = self.api.get("/attractions/popular/", &params).await?;
        Ok(normalize_all(raw))
    }

    /// Runs a backend search.
    ///
    /// Results that contradict the requested category, rating or price
    /// filters are dropped here, so callers can rely on them.
    pub async fn search(&self, params: &SearchParams) -> Result<Vec<Attraction>, ApiError> {
        let raw = self
            .api
            .get("/attractions/search/", &params.to_pairs())
            .await?;

        let mut results = normalize_all(raw);
        let before = results.len();
        results.retain(|a| params.admits(a));
        if results.len() != before {
            debug!(dropped = before - results.len(), "search results outside filters");
        }

        Ok(results)
    }

    pub async fn similar(&self, id: &str, limit: u32) -> Result<Vec<Attraction>, ApiError> {
        let raw = self
            .api
            .get(&format!("/attractions/{id}/similar/"), &[("limit", limit.to_string())])
            .await?;
        Ok(normalize_all(raw))
    }

    // Creates or refreshes the attraction from the external places database
    pub async fn save_place(&self, place_id: &str) -> Result<Attraction, ApiError> {
        let request = SavePlaceRequest {
            place_id: place_id.to_string(),
            compilation_id: None,
            compilation_name: None,
        };
        let raw: Attraction = self.api.post("/attractions/save/", &request).await?;
        Ok(raw.normalize())
    }

    /// Saves the place into a trip. Without a compilation id the backend
    /// creates or reuses the user's default trip. Returns the updated trip.
    pub async fn save_to_trip(
        &self,
        place_id: &str,
        compilation_id: Option<i64>,
        compilation_name: Option<&str>,
    ) -> Result<Compilation, ApiError> {
        let request = SavePlaceRequest {
            place_id: place_id.to_string(),
            compilation_id,
            compilation_name: compilation_name.map(str::to_string),
        };
        let raw: Compilation = self.api.post("/attractions/save/", &request).await?;
        Ok(raw.normalize())
    }

    pub async fn sync_from_google(&self, country: &str, limit: u32) -> Result<SyncSummary, ApiError> {
        let request = SyncRequest {
            country: country.to_string(),
            limit,
        };
        self.api.post("/attractions/sync_from_google/", &request).await
    }
}
