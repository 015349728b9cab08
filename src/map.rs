// Map geometry and the surface the markers are drawn on.
// The maps SDK is an external collaborator, so the rest of the crate only talks
// to it through `MapSurface`.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    // Rejects NaN/infinite and out-of-range values
    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);

        valid.then_some(Self { lat, lng })
    }
}

impl std::fmt::Display for LatLng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl Bounds {
    pub fn around(point: LatLng) -> Self {
        Self {
            south_west: point,
            north_east: point,
        }
    }

    pub fn extend(&mut self, point: LatLng) {
        self.south_west.lat = self.south_west.lat.min(point.lat);
        self.south_west.lng = self.south_west.lng.min(point.lng);
        self.north_east.lat = self.north_east.lat.max(point.lat);
        self.north_east.lng = self.north_east.lng.max(point.lng);
    }

    // None for an empty point set
    pub fn enclosing<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = LatLng>,
    {
        let mut points = points.into_iter();
        let mut bounds = Self::around(points.next()?);
        for point in points {
            bounds.extend(point);
        }
        Some(bounds)
    }

    pub fn contains(&self, point: LatLng) -> bool {
        (self.south_west.lat..=self.north_east.lat).contains(&point.lat)
            && (self.south_west.lng..=self.north_east.lng).contains(&point.lng)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkerId(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSpec {
    pub position: LatLng,
    pub title: String,
    // Detail link opened when the marker is clicked
    pub target: String,
}

pub trait MapSurface: Send + Sync + 'static {
    fn add_marker(&self, marker: MarkerSpec) -> MarkerId;

    fn remove_marker(&self, id: MarkerId);

    fn fit_bounds(&self, bounds: Bounds);

    fn render_path(&self, path: &[LatLng]);
}

/// Owns the set of markers one view has placed on a surface.
///
/// Every sync tears the previous markers down before placing the new set, and
/// the whole pass runs under one lock so two rebuilds never interleave.
#[derive(Default)]
pub struct MarkerLayer {
    inner: Mutex<LayerState>,
}

#[derive(Default)]
struct LayerState {
    surface: Option<Arc<dyn MapSurface>>,
    placed: Vec<MarkerId>,
    last: Vec<MarkerSpec>,
}

impl MarkerLayer {
    pub fn new() -> Self {
        Self::default()
    }

    // Attaching replays the last requested marker set onto the new surface
    pub fn attach(&self, surface: Arc<dyn MapSurface>) {
        let mut state = self.inner.lock();
        if let Some(old) = state.surface.take() {
            for id in state.placed.drain(..) {
                old.remove_marker(id);
            }
        }
        state.surface = Some(surface);
        let pending = state.last.clone();
        Self::place(&mut state, pending);
    }

    pub fn is_attached(&self) -> bool {
        self.inner.lock().surface.is_some()
    }

    /// Replaces the markers with `markers`. Returns the number placed.
    ///
    /// The viewport is only refit when at least one marker was placed. Without
    /// a surface the set is remembered and placed on `attach`.
    pub fn sync(&self, markers: Vec<MarkerSpec>) -> usize {
        let mut state = self.inner.lock();
        Self::place(&mut state, markers)
    }

    pub fn surface(&self) -> Option<Arc<dyn MapSurface>> {
        self.inner.lock().surface.clone()
    }

    pub fn placed_count(&self) -> usize {
        self.inner.lock().placed.len()
    }

    fn place(state: &mut LayerState, markers: Vec<MarkerSpec>) -> usize {
        state.last = markers;
        let Some(surface) = state.surface.clone() else {
            return 0;
        };

        for id in state.placed.drain(..) {
            surface.remove_marker(id);
        }

        for marker in state.last.iter().cloned() {
            let id = surface.add_marker(marker);
            state.placed.push(id);
        }

        if let Some(bounds) = Bounds::enclosing(state.last.iter().map(|m| m.position)) {
            surface.fit_bounds(bounds);
        }

        state.placed.len()
    }
}

// Headless surface: keeps what a real map would display
#[derive(Default)]
pub struct CanvasMap {
    markers: Mutex<BTreeMap<MarkerId, MarkerSpec>>,
    viewport: Mutex<Option<Bounds>>,
    path: Mutex<Vec<LatLng>>,
    next_id: AtomicU64,
    fit_count: AtomicUsize,
    added_count: AtomicUsize,
}

impl CanvasMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn markers(&self) -> Vec<MarkerSpec> {
        self.markers.lock().values().cloned().collect()
    }

    pub fn viewport(&self) -> Option<Bounds> {
        *self.viewport.lock()
    }

    pub fn path(&self) -> Vec<LatLng> {
        self.path.lock().clone()
    }

    pub fn fit_count(&self) -> usize {
        self.fit_count.load(Ordering::SeqCst)
    }

    // Total markers ever added, removed ones included
    pub fn added_count(&self) -> usize {
        self.added_count.load(Ordering::SeqCst)
    }
}

impl MapSurface for CanvasMap {
    fn add_marker(&self, marker: MarkerSpec) -> MarkerId {
        let id = MarkerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.markers.lock().insert(id, marker);
        self.added_count.fetch_add(1, Ordering::SeqCst);
        id
    }

    fn remove_marker(&self, id: MarkerId) {
        self.markers.lock().remove(&id);
    }

    fn fit_bounds(&self, bounds: Bounds) {
        *self.viewport.lock() = Some(bounds);
        self.fit_count.fetch_add(1, Ordering::SeqCst);
    }

    fn render_path(&self, path: &[LatLng]) {
        *self.path.lock() = path.to_vec();
    }
}
