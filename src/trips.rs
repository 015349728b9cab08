// Trip list and trip detail controllers.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::{
    api::ApiError,
    compilations::CompilationsService,
    map::{MapSurface, MarkerLayer, MarkerSpec},
    map_loader::{MapLoader, MapState},
    membership::TripIndex,
    models::Compilation,
    route::{stops_of, DirectionsRoute, DirectionsService, RouteRequest, RouteStop},
};

#[derive(Debug, Clone, Default)]
pub struct TripDetailView {
    pub compilation: Option<Compilation>,
    pub loading: bool,
    pub error: Option<String>,
    pub route: Option<DirectionsRoute>,
    pub map: MapState,
}

pub struct TripDetail {
    compilations: CompilationsService,
    directions: Option<Arc<dyn DirectionsService>>,
    index: Arc<TripIndex>,
    map_loader: Arc<MapLoader>,
    view: RwLock<TripDetailView>,
    markers: MarkerLayer,
}

impl TripDetail {
    pub fn new(
        compilations: CompilationsService,
        directions: Option<Arc<dyn DirectionsService>>,
        index: Arc<TripIndex>,
        map_loader: Arc<MapLoader>,
    ) -> Self {
        Self {
            compilations,
            directions,
            index,
            map_loader,
            view: RwLock::new(TripDetailView::default()),
            markers: MarkerLayer::new(),
        }
    }

    pub fn view(&self) -> TripDetailView {
        self.view.read().clone()
    }

    // Stops and routes are drawn only after the maps SDK is ready
    pub async fn attach_map(&self, surface: Arc<dyn MapSurface>) -> MapState {
        let state = MapState::from(self.map_loader.load().await);
        if state.is_ready() {
            self.markers.attach(surface);
        }
        self.view.write().map = state.clone();
        state
    }

    pub async fn load(&self, id: i64) -> Result<Compilation, ApiError> {
        {
            let mut view = self.view.write();
            view.loading = true;
            view.error = None;
        }

        let result = self.compilations.get(id).await;

        let mut view = self.view.write();
        view.loading = false;
        match &result {
            Ok(compilation) => {
                info!(compilation_id = id, items = compilation.items.len(), "trip loaded");
                self.index.apply_compilation(compilation);
                view.compilation = Some(compilation.clone());
                view.route = None;
            }
            Err(err) => view.error = Some(err.to_string()),
        }
        result
    }

    /// Removes an attraction from the loaded trip. Without a loaded trip
    /// this is a no-op.
    pub async fn remove_item(&self, attraction_id: i64) -> Result<(), ApiError> {
        let Some(compilation_id) = self.view.read().compilation.as_ref().map(|c| c.id) else {
            return Ok(());
        };

        match self.compilations.remove_item(compilation_id, attraction_id).await {
            Ok(updated) => {
                self.index.apply_compilation(&updated);
                self.view.write().compilation = Some(updated);
                Ok(())
            }
            Err(err) => {
                self.view.write().error = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub fn cost_estimate(&self) -> u32 {
        self.view
            .read()
            .compilation
            .as_ref()
            .map(Compilation::cost_estimate)
            .unwrap_or(0)
    }

    pub fn stops(&self) -> Vec<RouteStop> {
        self.view
            .read()
            .compilation
            .as_ref()
            .map(stops_of)
            .unwrap_or_default()
    }

    pub fn can_calculate_route(&self) -> bool {
        self.directions.is_some() && self.stops().len() >= 2
    }

    /// Shows the trip's stops on the map and asks the directions service for
    /// an optimized driving route through them.
    ///
    /// Does nothing below two geocoded stops. A failed request leaves the
    /// markers in place and renders no route.
    pub async fn calculate_route(&self) -> Option<DirectionsRoute> {
        let directions = self.directions.as_ref()?;
        let stops = self.stops();
        let request = RouteRequest::through(&stops)?;

        let markers = stops
            .iter()
            .map(|stop| MarkerSpec {
                position: stop.position,
                title: stop.name.clone(),
                target: stop.target.clone(),
            })
            .collect();
        self.markers.sync(markers);

        match directions.route(&request).await {
            Ok(route) => {
                debug!(
                    legs = route.legs.len(),
                    distance_m = route.total_distance_m(),
                    "route calculated"
                );
                if let Some(surface) = self.markers.surface() {
                    surface.render_path(&route.path);
                }
                self.view.write().route = Some(route.clone());
                Some(route)
            }
            Err(err) => {
                warn!(error = %err, "route calculation failed");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TripsView {
    pub compilations: Vec<Compilation>,
    pub loading: bool,
    pub error: Option<String>,
}

pub struct TripsController {
    compilations: CompilationsService,
    index: Arc<TripIndex>,
    view: RwLock<TripsView>,
}

impl TripsController {
    pub fn new(compilations: CompilationsService, index: Arc<TripIndex>) -> Self {
        Self {
            compilations,
            index,
            view: RwLock::new(TripsView::default()),
        }
    }

    pub fn view(&self) -> TripsView {
        self.view.read().clone()
    }

    fn record<T>(&self, result: Result<T, ApiError>) -> Result<T, ApiError> {
        if let Err(err) = &result {
            warn!(error = %err, "trips request failed");
            self.view.write().error = Some(err.to_string());
        }
        result
    }

    pub async fn load(&self) -> Result<(), ApiError> {
        {
            let mut view = self.view.write();
            view.loading = true;
            view.error = None;
        }

        let result = self.compilations.list().await;
        self.view.write().loading = false;
        let compilations = self.record(result)?;

        self.index.rebuild(&compilations);
        self.view.write().compilations = compilations;
        Ok(())
    }

    // Blank names are ignored without a request
    pub async fn create(
        &self,
        name: &str,
        profile: &str,
        country: &str,
    ) -> Result<Option<Compilation>, ApiError> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }

        let result = self.compilations.create(Some(name), profile, country).await;
        let created = self.record(result)?;
        self.index.apply_compilation(&created);
        self.view.write().compilations.push(created.clone());
        Ok(Some(created))
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        let result = self.compilations.delete(id).await;
        self.record(result)?;

        self.index.remove_compilation(id);
        self.view.write().compilations.retain(|c| c.id != id);
        Ok(())
    }
}
