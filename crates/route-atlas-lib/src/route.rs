//! Route model
//!
//! [`Track`] is what the parser produces from one file. [`RouteRecord`] is
//! the persisted unit and [`Route`] wraps a record immutably together with
//! metadata (bounding box, point count) that is computed once at construction.

use crate::bounds::BoundingBox;
use crate::color::PeriodKey;
use crate::utils;
use geo::Coord;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A single recorded position
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub elevation: Option<f64>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub timestamp: Option<String>,
}

impl TrackPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            elevation: None,
            timestamp: None,
        }
    }

    /// Flat coordinate with `x = lon`, `y = lat`
    #[inline]
    pub fn coord(&self) -> Coord<f64> {
        Coord {
            x: self.lon,
            y: self.lat,
        }
    }
}

/// One `<trk>` element as parsed from a file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Track {
    /// Sequential per parse call, not globally unique
    pub id: String,
    pub name: String,
    pub points: Vec<TrackPoint>,
}

/// Derived route statistics
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RouteStats {
    pub distance_km: Option<f64>,
    pub duration_h: Option<f64>,
    pub elevation_gain: Option<f64>,
    /// km/h
    pub avg_speed: Option<f64>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl RouteStats {
    /// Compute all statistics in a single pass over the lines
    pub fn compute(lines: &[Vec<TrackPoint>]) -> Self {
        let mut distance_m = 0.0;
        let mut has_distance = false;
        let mut gain = 0.0;
        let mut has_elevation = false;
        let mut first_time = None;
        let mut last_time = None;

        for line in lines {
            let mut prev: Option<&TrackPoint> = None;
            let mut prev_ele: Option<f64> = None;
            for p in line {
                if let Some(q) = prev {
                    distance_m += utils::haversine_m(q.lat, q.lon, p.lat, p.lon);
                    has_distance = true;
                }
                prev = Some(p);

                if let Some(ele) = p.elevation {
                    if let Some(before) = prev_ele
                        && ele > before
                    {
                        gain += ele - before;
                    }
                    prev_ele = Some(ele);
                    has_elevation = true;
                }

                if let Some(t) = p.timestamp.as_deref().and_then(utils::parse_timestamp) {
                    if first_time.is_none() {
                        first_time = Some(t);
                    }
                    last_time = Some(t);
                }
            }
        }

        let distance_km = has_distance.then_some(distance_m / 1000.0);
        let duration_h = match (first_time, last_time) {
            (Some(a), Some(b)) if b > a => Some((b - a).as_seconds_f64() / 3600.0),
            _ => None,
        };
        let avg_speed = match (distance_km, duration_h) {
            (Some(d), Some(h)) if h > 0.0 => Some(d / h),
            _ => None,
        };

        Self {
            distance_km,
            duration_h,
            elevation_gain: has_elevation.then_some(gain),
            avg_speed,
        }
    }
}

/// Persisted route
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RouteRecord {
    pub id: String,
    pub name: String,
    /// Manual color override
    #[cfg_attr(feature = "serde", serde(default))]
    pub color: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub category: Option<String>,
    /// Date used for period grouping and automatic colors
    #[cfg_attr(feature = "serde", serde(default))]
    pub date: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub period_key: PeriodKey,
    pub created_at: String,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub updated_at: Option<String>,
    /// One or more line geometries
    pub lines: Vec<Vec<TrackPoint>>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub stats: RouteStats,
}

impl RouteRecord {
    /// Build a record from a parsed track.
    ///
    /// The route date is the timestamp of the first timed point, if any.
    pub fn from_track(track: Track, id: String, period_key: PeriodKey) -> Self {
        let date = track.points.iter().find_map(|p| p.timestamp.clone());
        let lines = if track.points.is_empty() {
            Vec::new()
        } else {
            vec![track.points]
        };
        let stats = RouteStats::compute(&lines);
        Self {
            id,
            name: track.name,
            color: None,
            category: None,
            date,
            period_key,
            created_at: utils::now_rfc3339(),
            updated_at: None,
            lines,
            stats,
        }
    }

    /// Apply user edits and stamp `updated_at`.
    ///
    /// `None` keeps a field as it is. An empty color or category clears it.
    pub fn with_edits(
        mut self,
        name: Option<String>,
        color: Option<String>,
        category: Option<String>,
    ) -> Self {
        if let Some(name) = name {
            self.name = name;
        }
        if let Some(color) = color {
            self.color = Some(color).filter(|c| !c.is_empty());
        }
        if let Some(category) = category {
            self.category = Some(category).filter(|c| !c.is_empty());
        }
        self.updated_at = Some(utils::now_rfc3339());
        self
    }

    pub fn total_points(&self) -> usize {
        self.lines.iter().map(Vec::len).sum()
    }
}

/// Immutable route with cached metadata
#[derive(Debug, Clone)]
pub struct Route {
    record: RouteRecord,
    /// Bounds of all valid points
    bounding_box: BoundingBox,
    /// Cached total number of points (computed once during construction)
    cached_total_points: usize,
    /// At least one point, and every point finite and in range
    valid_geometry: bool,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Route {
    /// Wrap a record, computing its metadata in a single pass.
    ///
    /// Never fails: a record without usable geometry is still a valid route,
    /// it simply never renders.
    pub fn new(record: RouteRecord) -> Arc<Self> {
        #[cfg(feature = "profiling")]
        profiling::scope!("route::new");

        let mut total_points = 0usize;
        let mut all_valid = true;
        let bounding_box = BoundingBox::from_coords(
            record
                .lines
                .iter()
                .flatten()
                .inspect(|p| {
                    total_points += 1;
                    all_valid &= utils::is_valid_lat_lon(p.lat, p.lon);
                })
                .filter(|p| utils::is_valid_lat_lon(p.lat, p.lon))
                .map(TrackPoint::coord),
        );

        if !all_valid {
            tracing::warn!(
                "Route {} contains coordinates outside the WGS84 range",
                record.id
            );
        }

        Arc::new(Route {
            record,
            bounding_box,
            cached_total_points: total_points,
            valid_geometry: total_points > 0 && all_valid,
        })
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.record.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.record.name
    }

    #[inline]
    pub fn color(&self) -> Option<&str> {
        self.record.color.as_deref()
    }

    #[inline]
    pub fn category(&self) -> Option<&str> {
        self.record.category.as_deref()
    }

    #[inline]
    pub fn date(&self) -> Option<&str> {
        self.record.date.as_deref()
    }

    #[inline]
    pub fn period_key(&self) -> PeriodKey {
        self.record.period_key
    }

    #[inline]
    pub fn stats(&self) -> &RouteStats {
        &self.record.stats
    }

    #[inline]
    pub fn lines(&self) -> &[Vec<TrackPoint>] {
        &self.record.lines
    }

    #[inline]
    pub fn record(&self) -> &RouteRecord {
        &self.record
    }

    /// Cached bounding box. [`BoundingBox::EMPTY`] for routes without points.
    #[inline]
    pub fn bounding_box(&self) -> BoundingBox {
        self.bounding_box
    }

    /// Get total number of points across all lines
    ///
    /// This is O(1) as the value is cached during construction.
    #[inline]
    pub fn total_points(&self) -> usize {
        self.cached_total_points
    }

    /// True when the route has points and all of them are valid coordinates
    #[inline]
    pub fn has_geometry(&self) -> bool {
        self.valid_geometry
    }
}
