// Driving routes through the stops of a trip, computed by an external
// directions service. The first stop is the origin, the last the destination,
// and the service is free to reorder everything in between.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::form_urlencoded;

use crate::{map::LatLng, models::Compilation};

pub const DIRECTIONS_BASE_URL: &str = "https://maps.googleapis.com/maps/api/directions/json";

#[derive(Error, Debug)]
pub enum DirectionsError {
    #[error("Directions request failed: {0}")]
    NetworkError(String),

    #[error("Directions service returned {status}: {message}")]
    Status { status: String, message: String },

    #[error("Invalid directions response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TravelMode {
    #[default]
    Driving,
    Walking,
    Bicycling,
    Transit,
}

impl TravelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Driving => "driving",
            TravelMode::Walking => "walking",
            TravelMode::Bicycling => "bicycling",
            TravelMode::Transit => "transit",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteStop {
    pub item_id: i64,
    pub name: String,
    pub target: String,
    pub position: LatLng,
}

// Trip items in their stored order, skipping those without a usable coordinate
pub fn stops_of(compilation: &Compilation) -> Vec<RouteStop> {
    let mut items: Vec<_> = compilation.items.iter().collect();
    items.sort_by_key(|item| item.order_index);

    items
        .into_iter()
        .filter_map(|item| {
            Some(RouteStop {
                item_id: item.id,
                name: item.attraction.name.clone(),
                target: item.attraction.link_target(),
                position: item.attraction.coordinate()?,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub origin: LatLng,
    pub destination: LatLng,
    pub waypoints: Vec<LatLng>,
    pub optimize_waypoints: bool,
    pub mode: TravelMode,
}

impl RouteRequest {
    /// Builds the request for a list of stops, `None` below two stops.
    pub fn through(stops: &[RouteStop]) -> Option<Self> {
        let [first, middle @ .., last] = stops else {
            return None;
        };

        Some(Self {
            origin: first.position,
            destination: last.position,
            waypoints: middle.iter().map(|s| s.position).collect(),
            optimize_waypoints: true,
            mode: TravelMode::Driving,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteLeg {
    pub distance_m: u64,
    pub duration_s: u64,
    pub start_address: String,
    pub end_address: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DirectionsRoute {
    // Optimized order of the intermediate waypoints
    pub waypoint_order: Vec<usize>,
    pub path: Vec<LatLng>,
    pub legs: Vec<RouteLeg>,
}

impl DirectionsRoute {
    pub fn total_distance_m(&self) -> u64 {
        self.legs.iter().map(|l| l.distance_m).sum()
    }

    pub fn total_duration_s(&self) -> u64 {
        self.legs.iter().map(|l| l.duration_s).sum()
    }
}

/// Applies the service's waypoint order to the stops the route was built from.
///
/// Origin and destination stay in place. An order that does not describe a
/// permutation of the intermediate stops leaves the input order untouched.
pub fn ordered_stops(stops: &[RouteStop], waypoint_order: &[usize]) -> Vec<RouteStop> {
    if stops.len() < 3 {
        return stops.to_vec();
    }

    let middle = &stops[1..stops.len() - 1];
    let mut seen = vec![false; middle.len()];
    let is_permutation = waypoint_order.len() == middle.len()
        && waypoint_order
            .iter()
            .all(|&i| i < middle.len() && !std::mem::replace(&mut seen[i], true));

    if !is_permutation {
        return stops.to_vec();
    }

    let mut ordered = Vec::with_capacity(stops.len());
    ordered.push(stops[0].clone());
    ordered.extend(waypoint_order.iter().map(|&i| middle[i].clone()));
    ordered.push(stops[stops.len() - 1].clone());
    ordered
}

/// Decodes an encoded polyline (precision 1e5).
///
/// Decoding stops at the first truncated or overflowing value; everything
/// decoded so far is returned.
pub fn decode_polyline(encoded: &str) -> Vec<LatLng> {
    let bytes = encoded.as_bytes();
    let mut index = 0;
    let (mut lat, mut lng) = (0i64, 0i64);
    let mut path = Vec::new();

    let next_value = |index: &mut usize| -> Option<i64> {
        let (mut result, mut shift) = (0i64, 0u32);
        loop {
            let byte = *bytes.get(*index)? as i64 - 63;
            *index += 1;
            if !(0..64).contains(&byte) || shift > 60 {
                return None;
            }
            result |= (byte & 0x1f) << shift;
            shift += 5;
            if byte < 0x20 {
                break;
            }
        }
        Some(if result & 1 != 0 { !(result >> 1) } else { result >> 1 })
    };

    while index < bytes.len() {
        let Some(d_lat) = next_value(&mut index) else { break };
        let Some(d_lng) = next_value(&mut index) else { break };
        let (Some(next_lat), Some(next_lng)) = (lat.checked_add(d_lat), lng.checked_add(d_lng))
        else {
            break;
        };
        lat = next_lat;
        lng = next_lng;

        if let Some(point) = LatLng::new(lat as f64 / 1e5, lng as f64 / 1e5) {
            path.push(point);
        }
    }

    path
}

#[async_trait]
pub trait DirectionsService: Send + Sync + 'static {
    async fn route(&self, request: &RouteRequest) -> Result<DirectionsRoute, DirectionsError>;
}

#[derive(Deserialize)]
struct RawResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    routes: Vec<RawRoute>,
}

#[derive(Deserialize)]
struct RawRoute {
    #[serde(default)]
    waypoint_order: Vec<usize>,
    #[serde(default)]
    overview_polyline: Option<RawPolyline>,
    #[serde(default)]
    legs: Vec<RawLeg>,
}

#[derive(Deserialize)]
struct RawPolyline {
    points: String,
}

#[derive(Deserialize)]
struct RawLeg {
    #[serde(default)]
    distance: Option<RawValue>,
    #[serde(default)]
    duration: Option<RawValue>,
    #[serde(default)]
    start_address: String,
    #[serde(default)]
    end_address: String,
}

#[derive(Deserialize)]
struct RawValue {
    value: u64,
}

pub fn parse_directions(body: &str) -> Result<DirectionsRoute, DirectionsError> {
    let raw: RawResponse =
        serde_json::from_str(body).map_err(|e| DirectionsError::InvalidResponse(e.to_string()))?;

    if raw.status != "OK" {
        return Err(DirectionsError::Status {
            message: raw.error_message.unwrap_or_default(),
            status: raw.status,
        });
    }

    let route = raw
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| DirectionsError::InvalidResponse("no routes in response".to_string()))?;

    Ok(DirectionsRoute {
        waypoint_order: route.waypoint_order,
        path: route
            .overview_polyline
            .map(|p| decode_polyline(&p.points))
            .unwrap_or_default(),
        legs: route
            .legs
            .into_iter()
            .map(|leg| RouteLeg {
                distance_m: leg.distance.map(|d| d.value).unwrap_or(0),
                duration_s: leg.duration.map(|d| d.value).unwrap_or(0),
                start_address: leg.start_address,
                end_address: leg.end_address,
            })
            .collect(),
    })
}

pub struct GoogleDirectionsClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GoogleDirectionsClient {
    pub fn new(client: reqwest::Client, api_key: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            base_url: DIRECTIONS_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn request_url(&self, request: &RouteRequest) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query
            .append_pair("origin", &request.origin.to_string())
            .append_pair("destination", &request.destination.to_string());

        if !request.waypoints.is_empty() {
            let mut waypoints: Vec<String> = Vec::with_capacity(request.waypoints.len() + 1);
            if request.optimize_waypoints {
                waypoints.push("optimize:true".to_string());
            }
            waypoints.extend(request.waypoints.iter().map(LatLng::to_string));
            query.append_pair("waypoints", &waypoints.join("|"));
        }

        query
            .append_pair("mode", request.mode.as_str())
            .append_pair("key", &self.api_key);

        format!("{}?{}", self.base_url, query.finish())
    }
}

#[async_trait]
impl DirectionsService for GoogleDirectionsClient {
    async fn route(&self, request: &RouteRequest) -> Result<DirectionsRoute, DirectionsError> {
        debug!(waypoints = request.waypoints.len(), "requesting directions");

        let body = self
            .client
            .get(self.request_url(request))
            .send()
            .await
            .map_err(|e| DirectionsError::NetworkError(e.to_string()))?
            .text()
            .await
            .map_err(|e| DirectionsError::NetworkError(e.to_string()))?;

        parse_directions(&body)
    }
}
