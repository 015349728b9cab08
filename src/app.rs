// Builds every service and controller from one configuration.

use std::sync::Arc;

use tracing::info;

use crate::{
    api::{ApiClient, HttpTransport, ReqwestTransport},
    attraction_detail::AttractionDetail,
    attractions::AttractionsService,
    auth::AuthService,
    compilations::CompilationsService,
    config::DiscoveryConfig,
    map_loader::{HttpScriptInjector, MapLoader},
    membership::TripIndex,
    route::{DirectionsService, GoogleDirectionsClient},
    search::SearchController,
    session::{FileSessionStore, Session, SessionError},
    trips::{TripDetail, TripsController},
};

pub struct DiscoveryApp {
    config: DiscoveryConfig,
    pub auth: AuthService,
    pub attractions: AttractionsService,
    pub compilations: CompilationsService,
    pub map_loader: Arc<MapLoader>,
    pub directions: Option<Arc<dyn DirectionsService>>,
    // Shared by every controller so membership stays consistent across views
    pub trip_index: Arc<TripIndex>,
}

impl DiscoveryApp {
    /// Wires the production stack: reqwest transport, session file when
    /// configured, Google directions and script loading when a maps key is
    /// present.
    pub fn new(config: DiscoveryConfig) -> Result<Self, SessionError> {
        let session = match &config.session_file {
            Some(path) => Session::new(Arc::new(FileSessionStore::open(path)?)),
            None => Session::in_memory(),
        };
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(config.timeout_ms));

        Ok(Self::with_transport(config, transport, session))
    }

    pub fn with_transport(
        config: DiscoveryConfig,
        transport: Arc<dyn HttpTransport>,
        session: Session,
    ) -> Self {
        let api = ApiClient::new(&config.api_base_url, transport, session);
        let http = reqwest::Client::new();

        let directions = config.maps_api_key.as_deref().map(|key| {
            Arc::new(GoogleDirectionsClient::new(http.clone(), key)) as Arc<dyn DirectionsService>
        });
        let map_loader = Arc::new(MapLoader::new(
            Arc::new(HttpScriptInjector::new(http)),
            config.maps_api_key.clone(),
        ));

        info!(
            api = %config.api_base_url,
            maps = config.maps_api_key.is_some(),
            "discovery client configured"
        );

        Self {
            auth: AuthService::new(api.clone()),
            attractions: AttractionsService::new(api.clone()),
            compilations: CompilationsService::new(api),
            map_loader,
            directions,
            trip_index: Arc::new(TripIndex::new()),
            config,
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn search_controller(&self) -> Arc<SearchController> {
        SearchController::new(
            self.attractions.clone(),
            self.config.search,
            self.map_loader.clone(),
        )
    }

    pub fn trip_detail(&self) -> TripDetail {
        TripDetail::new(
            self.compilations.clone(),
            self.directions.clone(),
            self.trip_index.clone(),
            self.map_loader.clone(),
        )
    }

    pub fn trips(&self) -> TripsController {
        TripsController::new(self.compilations.clone(), self.trip_index.clone())
    }

    pub fn attraction_detail(&self) -> AttractionDetail {
        AttractionDetail::new(
            self.attractions.clone(),
            self.compilations.clone(),
            self.trip_index.clone(),
            self.config.maps_api_key.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        mock_server::{MockResponse, MockServer, MOCK_BASE_URL},
        Method,
    };
    use serde_json::json;

    fn app(server: &Arc<MockServer>, maps_api_key: Option<&str>) -> DiscoveryApp {
        let config = DiscoveryConfig {
            api_base_url: MOCK_BASE_URL.to_string(),
            maps_api_key: maps_api_key.map(str::to_string),
            ..Default::default()
        };
        DiscoveryApp::with_transport(config, server.clone(), Session::in_memory())
    }

    #[tokio::test]
    async fn test_views_share_the_trip_index() {
        let server = Arc::new(MockServer::new());
        server
            .respond(
                Method::Get,
                "/compilations/",
                MockResponse::json(
                    200,
                    json!([{"id": 1, "items": [{"id": 3, "attraction_id": 7, "attraction": {"id": 7, "place_id": "X"}}]}]),
                ),
            )
            .await;
        let app = app(&server, None);

        app.trips().load().await.unwrap();
        assert_eq!(app.trip_index.lookup("X", None).map(|m| m.item_id), Some(3));
        assert!(app.directions.is_none());
        assert!(!app.map_loader.has_api_key());

        let state = app
            .search_controller()
            .attach_map(Arc::new(crate::map::CanvasMap::new()))
            .await;
        assert_eq!(state, crate::map_loader::MapState::Unavailable);
    }

    #[tokio::test]
    async fn test_maps_key_enables_directions() {
        let server = Arc::new(MockServer::new());
        let app = app(&server, Some("key"));

        assert!(app.directions.is_some());
        assert!(app.map_loader.has_api_key());
        assert!(!app.trip_detail().can_calculate_route());
    }

    #[test]
    fn test_session_file_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let config = DiscoveryConfig {
            session_file: Some(dir.path().join("session.json")),
            ..Default::default()
        };

        let app = DiscoveryApp::new(config).unwrap();
        assert!(!app.auth.is_authenticated());
    }
}
