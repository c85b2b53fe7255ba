use crate::constants::{
    CATEGORY_MAX, DESCRIPTION_MAX, LAT_MAX, LINK_MAX, LON_MAX, PUB_DATE_MAX, TITLE_MAX,
};
use geo_types::Point;
use serde::{Serialize, Serializer};

/// One incident from the feed, already cut down to the destination column widths.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentRecord {
    pub title: String,
    pub category: String,
    pub description: String,
    pub pub_date: String,
    pub link: String,
    /// Raw latitude text, `""` when the item carries no usable coordinate
    pub latitude: String,
    /// Raw longitude text, `""` when the item carries no usable coordinate
    pub longitude: String,
    /// x = longitude, y = latitude; `None` when the coordinate text is missing or not numeric
    #[serde(serialize_with = "serialize_point")]
    pub point: Option<Point<f64>>,
}

impl IncidentRecord {
    /// Builds a record, truncating every text field to its column width and
    /// deriving the point geometry from the coordinate text.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        title: &str,
        category: &str,
        description: &str,
        pub_date: &str,
        link: &str,
        latitude: &str,
        longitude: &str,
    ) -> Self {
        let latitude = truncate_chars(latitude, LAT_MAX);
        let longitude = truncate_chars(longitude, LON_MAX);
        let point = parse_point(&latitude, &longitude);
        Self {
            title: truncate_chars(title, TITLE_MAX),
            category: truncate_chars(category, CATEGORY_MAX),
            description: truncate_chars(description, DESCRIPTION_MAX),
            pub_date: truncate_chars(pub_date, PUB_DATE_MAX),
            link: truncate_chars(link, LINK_MAX),
            latitude,
            longitude,
            point,
        }
    }

    /// Well-known text for the geometry column.
    pub fn shape_wkt(&self) -> Option<String> {
        self.point.map(|p| format!("POINT ({} {})", p.x(), p.y()))
    }
}

/// Keeps at most `max` characters. Never splits a UTF-8 sequence.
pub fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}

fn parse_point(latitude: &str, longitude: &str) -> Option<Point<f64>> {
    let lat: f64 = latitude.trim().parse().ok()?;
    let lon: f64 = longitude.trim().parse().ok()?;
    if lat.is_finite() && lon.is_finite() {
        Some(Point::new(lon, lat))
    } else {
        None
    }
}

fn serialize_point<S: Serializer>(point: &Option<Point<f64>>, s: S) -> Result<S::Ok, S::Error> {
    match point {
        Some(p) => [p.x(), p.y()].serialize(s),
        None => s.serialize_none(),
    }
}
