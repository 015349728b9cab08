// Domain types shared by the services and controllers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::map::LatLng;

// Backend serializers emit `null` for blank columns
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Nested geo field returned by newer backend serializers
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct GeoPoint {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Attraction {
    pub id: i64,
    pub place_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub formatted_address: String,
    #[serde(deserialize_with = "null_as_default")]
    pub country: String,
    #[serde(deserialize_with = "null_as_default")]
    pub city: String,
    #[serde(deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(deserialize_with = "null_as_default")]
    pub types: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub rating: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub user_ratings_total: u32,
    pub price_level: Option<u8>,
    // Flat coordinates kept for older consumers, filled from `location` on normalize
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location: Option<GeoPoint>,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub website: String,
    #[serde(deserialize_with = "null_as_default")]
    pub phone_number: String,
    pub photo_reference: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub photos_count: u32,
    pub opening_hours: serde_json::Value,
    #[serde(deserialize_with = "null_as_default")]
    pub reviews: Vec<serde_json::Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub likes: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub is_featured: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Attraction {
    /// Unifies the two geo representations the backend emits.
    ///
    /// A nested `location` object wins and overwrites the flat fields; the
    /// nested value itself is preserved. Without `location` the flat fields
    /// are left as they came.
    pub fn normalize(mut self) -> Self {
        if let Some(location) = self.location {
            self.latitude = location.lat;
            self.longitude = location.lng;
        }
        self
    }

    // Valid coordinate, if both halves are present and finite
    pub fn coordinate(&self) -> Option<LatLng> {
        let (lat, lng) = match self.location {
            Some(GeoPoint {
                lat: Some(lat),
                lng: Some(lng),
            }) => (lat, lng),
            _ => (self.latitude?, self.longitude?),
        };
        LatLng::new(lat, lng)
    }

    // "Free" for tier 0 or unknown, otherwise one `$` per tier plus one
    pub fn price_label(&self) -> String {
        match self.price_level {
            None | Some(0) => "Free".to_string(),
            Some(level) => "$".repeat(level as usize + 1),
        }
    }

    // Identifier used for detail links: the external id when present
    pub fn link_target(&self) -> String {
        if self.place_id.is_empty() {
            self.id.to_string()
        } else {
            self.place_id.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CompilationItem {
    pub id: i64,
    pub order_index: i32,
    pub attraction: Attraction,
    pub attraction_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Compilation {
    pub id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub profile: String,
    #[serde(deserialize_with = "null_as_default")]
    pub country: String,
    #[serde(deserialize_with = "null_as_default")]
    pub items: Vec<CompilationItem>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Compilation {
    pub(crate) fn normalize(mut self) -> Self {
        self.items = self
            .items
            .into_iter()
            .map(|mut item| {
                item.attraction = item.attraction.normalize();
                item
            })
            .collect();
        self
    }

    // Rough budget: every item counts its price tier plus one
    pub fn cost_estimate(&self) -> u32 {
        self.items
            .iter()
            .map(|item| item.attraction.price_level.unwrap_or(0) as u32 + 1)
            .sum()
    }

    pub fn find_place(&self, place_id: &str) -> Option<&CompilationItem> {
        self.items
            .iter()
            .find(|item| item.attraction.place_id == place_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl User {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignUpRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewCompilation {
    pub name: String,
    pub profile: String,
    pub country: String,
}

// Partial update, absent fields are left untouched server side
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompilationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddItemRequest {
    pub attraction_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_index: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoveItemRequest {
    pub attraction_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavePlaceRequest {
    pub place_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compilation_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compilation_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRequest {
    pub country: String,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SyncSummary {
    pub message: String,
    pub total_found: u32,
}

// Backend search parameters, mirrors `/attractions/search/` query keys
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchParams {
    pub q: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub category: Option<String>,
    pub min_rating: Option<f64>,
    pub min_reviews: Option<u32>,
    pub min_photos: Option<u32>,
    pub price_level: Option<u8>,
    pub place_type: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius_m: Option<u32>,
    pub limit: Option<u32>,
}

impl SearchParams {
    // Only present, non-empty values end up on the wire
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        let mut push = |key: &'static str, value: Option<String>| {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                pairs.push((key, value));
            }
        };

        push("q", self.q.clone());
        push("country", self.country.clone());
        push("city", self.city.clone());
        push("category", self.category.clone());
        push("min_rating", self.min_rating.map(|v| v.to_string()));
        push("min_reviews", self.min_reviews.map(|v| v.to_string()));
        push("min_photos", self.min_photos.map(|v| v.to_string()));
        push("price_level", self.price_level.map(|v| v.to_string()));
        push("type", self.place_type.clone());
        push("lat", self.lat.map(|v| v.to_string()));
        push("lng", self.lng.map(|v| v.to_string()));
        push("radius_m", self.radius_m.map(|v| v.to_string()));
        push("limit", self.limit.map(|v| v.to_string()));

        pairs
    }

    /// True when the attraction satisfies the category, rating and price
    /// filters carried by these params. Free text and geo are left to the
    /// backend.
    pub fn admits(&self, attraction: &Attraction) -> bool {
        // A multi-select category travels as "museum,park"; any part may match
        let categories: Vec<&str> = self
            .category
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();
        if !categories.is_empty() {
            let matches = categories.iter().any(|category| {
                attraction.category.eq_ignore_ascii_case(category)
                    || attraction
                        .types
                        .iter()
                        .any(|t| t.eq_ignore_ascii_case(category))
            });
            if !matches {
                return false;
            }
        }

        if let Some(min_rating) = self.min_rating {
            if attraction.rating < min_rating {
                return false;
            }
        }

        if let Some(max_price) = self.price_level {
            if attraction.price_level.unwrap_or(0) > max_price {
                return false;
            }
        }

        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Relevance,
    Rating,
    Reviews,
    PriceLow,
    PriceHigh,
}

impl SortOrder {
    // Stable: equal keys keep backend relevance order
    pub fn sort(&self, attractions: &mut [Attraction]) {
        match self {
            SortOrder::Relevance => {}
            SortOrder::Rating => attractions.sort_by(|a, b| b.rating.total_cmp(&a.rating)),
            SortOrder::Reviews => {
                attractions.sort_by(|a, b| b.user_ratings_total.cmp(&a.user_ratings_total))
            }
            SortOrder::PriceLow => {
                attractions.sort_by_key(|a| a.price_level.unwrap_or(0));
            }
            SortOrder::PriceHigh => {
                attractions.sort_by(|a, b| {
                    b.price_level.unwrap_or(0).cmp(&a.price_level.unwrap_or(0))
                });
            }
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relevance" => Ok(SortOrder::Relevance),
            "rating" => Ok(SortOrder::Rating),
            "reviews" => Ok(SortOrder::Reviews),
            "price-low" => Ok(SortOrder::PriceLow),
            "price-high" => Ok(SortOrder::PriceHigh),
            other => Err(format!("unknown sort order: {other}")),
        }
    }
}

const PLACE_PHOTO_URL: &str = "https://maps.googleapis.com/maps/api/place/photo";

// Places photo URL, None when there is nothing to fetch or no key to fetch it with
pub fn place_photo_url(photo_reference: &str, max_width: u32, api_key: Option<&str>) -> Option<String> {
    let api_key = api_key.filter(|k| !k.is_empty())?;
    if photo_reference.is_empty() {
        return None;
    }

    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("photoreference", photo_reference)
        .append_pair("maxwidth", &max_width.to_string())
        .append_pair("key", api_key)
        .finish();

    Some(format!("{PLACE_PHOTO_URL}?{query}"))
}
