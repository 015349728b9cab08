// Search page state as carried in the URL query string.
// `q, category, minRating, maxPrice, lat, lng, radius_m` are the only persisted
// representation of a search, which keeps searches shareable.

use url::form_urlencoded;

use crate::{map::LatLng, models::SearchParams};

pub const DEFAULT_RADIUS_M: u32 = 5000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoFilter {
    pub center: LatLng,
    pub radius_m: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
    pub text: Option<String>,
    pub category: Option<String>,
    pub min_rating: Option<f64>,
    pub max_price: Option<u8>,
    pub near: Option<GeoFilter>,
}

impl SearchQuery {
    /// Parses a query string such as `q=louvre&category=museum&minRating=4`.
    ///
    /// A leading `?` is accepted. Blank values and numbers that do not parse
    /// are ignored rather than rejected. A location needs both `lat` and
    /// `lng`; `radius_m` defaults to 5 km.
    pub fn from_query_string(raw: &str) -> Self {
        let raw = raw.strip_prefix('?').unwrap_or(raw);
        let mut query = SearchQuery::default();
        let (mut lat, mut lng, mut radius) = (None, None, None);

        for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }

            match key.as_ref() {
                "q" => query.text = Some(value.to_string()),
                "category" => query.category = Some(value.to_string()),
                "minRating" => {
                    query.min_rating = value.parse::<f64>().ok().filter(|v| v.is_finite())
                }
                "maxPrice" => query.max_price = value.parse().ok(),
                "lat" => lat = value.parse::<f64>().ok(),
                "lng" => lng = value.parse::<f64>().ok(),
                "radius_m" => radius = value.parse::<u32>().ok(),
                _ => {}
            }
        }

        query.near = lat
            .zip(lng)
            .and_then(|(lat, lng)| LatLng::new(lat, lng))
            .map(|center| GeoFilter {
                center,
                radius_m: radius.unwrap_or(DEFAULT_RADIUS_M),
            });

        query
    }

    pub fn to_query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());

        if let Some(text) = &self.text {
            serializer.append_pair("q", text);
        }
        if let Some(category) = &self.category {
            serializer.append_pair("category", category);
        }
        if let Some(min_rating) = self.min_rating {
            serializer.append_pair("minRating", &min_rating.to_string());
        }
        if let Some(max_price) = self.max_price {
            serializer.append_pair("maxPrice", &max_price.to_string());
        }
        if let Some(near) = self.near {
            serializer.append_pair("lat", &near.center.lat.to_string());
            serializer.append_pair("lng", &near.center.lng.to_string());
            serializer.append_pair("radius_m", &near.radius_m.to_string());
        }

        serializer.finish()
    }

    // A text search replaces any location search
    pub fn with_text(mut self, text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            return self;
        }
        self.text = Some(text.to_string());
        self.near = None;
        self
    }

    pub fn clear_text(mut self) -> Self {
        self.text = None;
        self.near = None;
        self
    }

    pub fn with_location(mut self, center: LatLng, radius_m: u32) -> Self {
        self.near = Some(GeoFilter { center, radius_m });
        self
    }

    pub fn with_category(mut self, category: Option<&str>) -> Self {
        self.category = category.filter(|c| !c.is_empty()).map(str::to_string);
        self
    }

    pub fn with_min_rating(mut self, min_rating: Option<f64>) -> Self {
        self.min_rating = min_rating;
        self
    }

    pub fn with_max_price(mut self, max_price: Option<u8>) -> Self {
        self.max_price = max_price;
        self
    }

    pub fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn to_params(&self) -> SearchParams {
        SearchParams {
            q: self.text.clone(),
            category: self.category.clone(),
            min_rating: self.min_rating,
            price_level: self.max_price,
            lat: self.near.map(|n| n.center.lat),
            lng: self.near.map(|n| n.center.lng),
            radius_m: self.near.map(|n| n.radius_m),
            ..Default::default()
        }
    }
}
