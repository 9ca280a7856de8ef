//! Utility functions for coordinate validation, distances and timestamps

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6371000.0;

/// Valid WGS84 latitude range in degrees
pub const MAX_LATITUDE: f64 = 90.0;

/// Valid WGS84 longitude range in degrees
pub const MAX_LONGITUDE: f64 = 180.0;

/// Check that a coordinate pair is finite and inside the WGS84 ranges
#[inline(always)]
pub fn is_valid_lat_lon(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (-MAX_LATITUDE..=MAX_LATITUDE).contains(&lat)
        && (-MAX_LONGITUDE..=MAX_LONGITUDE).contains(&lon)
}

/// Haversine distance between two WGS84 positions in meters
#[inline]
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Parse a track timestamp.
///
/// Accepts RFC 3339 (`2024-06-15T08:00:00Z`), a zone-less date-time
/// (`2024-06-15T08:00:00`, taken as UTC) and a bare date (`2024-06-15`,
/// midnight UTC). Anything else is `None`.
pub fn parse_timestamp(s: &str) -> Option<OffsetDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(t) = OffsetDateTime::parse(s, &Rfc3339) {
        return Some(t);
    }
    if let Ok(t) = PrimitiveDateTime::parse(
        s,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ) {
        return Some(t.assume_utc());
    }
    Date::parse(s, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|d| d.midnight().assume_utc())
}

/// Current time as an RFC 3339 string (UTC)
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
