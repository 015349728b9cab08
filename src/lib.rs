// Travel discovery client: attraction search, trip compilations and map sync

pub mod api;
pub mod app;
pub mod attraction_detail;
pub mod attractions;
pub mod auth;
pub mod cache;
pub mod compilations;
pub mod config;
pub mod map;
pub mod map_loader;
pub mod membership;
pub mod models;
pub mod query;
pub mod route;
pub mod search;
pub mod session;
pub mod trips;

// Re-export key types for convenience
pub use api::{ApiClient, ApiError, HttpTransport, ReqwestTransport};
pub use app::DiscoveryApp;
pub use cache::{CachePolicy, CacheStats, SearchCache};
pub use config::{ConfigError, DiscoveryConfig};
pub use map::{Bounds, CanvasMap, LatLng, MapSurface, MarkerLayer};
pub use map_loader::{MapLoader, MapState};
pub use models::{Attraction, Compilation, CompilationItem, SearchParams, SortOrder, User};
pub use query::SearchQuery;
pub use search::{SearchConfig, SearchController, SearchView};
pub use session::{Session, SessionStore};
