//! RouteCollection - In-memory set of loaded routes
//!
//! Holds the routes the render scheduler scans on every viewport change,
//! together with incrementally maintained aggregate statistics.

use crate::bounds::BoundingBox;
use crate::color::PeriodKey;
use crate::route::{Route, RouteRecord};

use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Information about the route collection
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CollectionInfo {
    /// Number of routes loaded
    pub route_count: usize,
    /// Total number of track points
    pub total_points: usize,
    /// Total distance in kilometers
    pub total_distance_km: f64,
}

/// Cached statistics for the collection
///
/// These are updated incrementally when routes are added,
/// and rebuilt when routes are removed.
#[derive(Debug, Clone, Default)]
struct CachedStats {
    total_points: usize,
    total_distance_km: f64,
    /// Union of the boxes of routes with geometry (None if there are none)
    bounding_box: Option<BoundingBox>,
}

/// All loaded routes
#[derive(Debug, Clone, Default)]
pub struct RouteCollection {
    routes: Vec<Arc<Route>>,
    cached_stats: CachedStats,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl RouteCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single route. A route with an id that is already present replaces it.
    pub fn add_route(&mut self, record: RouteRecord) -> Arc<Route> {
        let route = Route::new(record);
        self.insert(route.clone());
        route
    }

    /// Build routes in parallel and add them
    ///
    /// Metadata computation (bounding boxes, point counts) runs on the rayon
    /// pool; insertion is sequential and keeps the input order.
    pub fn add_routes_parallel(&mut self, records: Vec<RouteRecord>) {
        #[cfg(feature = "profiling")]
        profiling::scope!("collection::add_routes_parallel");

        let built: Vec<Arc<Route>> = records.into_par_iter().map(Route::new).collect();
        for route in built {
            self.insert(route);
        }
    }

    fn insert(&mut self, route: Arc<Route>) {
        if let Some(pos) = self.routes.iter().position(|r| r.id() == route.id()) {
            tracing::debug!("Replacing route {}", route.id());
            self.routes[pos] = route;
            self.rebuild_cached_stats();
        } else {
            self.update_stats_for_added_route(&route);
            self.routes.push(route);
        }
    }

    /// Remove a route by id, returning it if present
    pub fn remove_route(&mut self, id: &str) -> Option<Arc<Route>> {
        let pos = self.routes.iter().position(|r| r.id() == id)?;
        let removed = self.routes.remove(pos);
        self.rebuild_cached_stats();
        Some(removed)
    }

    #[inline]
    pub fn get_route(&self, id: &str) -> Option<&Arc<Route>> {
        self.routes.iter().find(|r| r.id() == id)
    }

    /// Get all routes
    #[inline]
    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    /// Routes grouped under the given period
    pub fn routes_by_period(&self, period: PeriodKey) -> Vec<Arc<Route>> {
        self.routes
            .iter()
            .filter(|r| r.period_key() == period)
            .cloned()
            .collect()
    }

    #[inline]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Get total number of points across all routes
    ///
    /// This is O(1) as the value is cached and updated incrementally.
    #[inline]
    pub fn total_points(&self) -> usize {
        self.cached_stats.total_points
    }

    /// Get collection information
    ///
    /// This is O(1) as all values are cached.
    #[inline]
    pub fn get_info(&self) -> CollectionInfo {
        CollectionInfo {
            route_count: self.routes.len(),
            total_points: self.cached_stats.total_points,
            total_distance_km: self.cached_stats.total_distance_km,
        }
    }

    /// Combined bounding box of all routes with geometry
    #[inline]
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.cached_stats.bounding_box
    }

    /// Center of the combined bounding box as `(lat, lon)`
    #[inline]
    pub fn center(&self) -> Option<(f64, f64)> {
        self.bounding_box().map(|b| {
            let c = b.center();
            (c.y, c.x)
        })
    }

    pub fn clear(&mut self) {
        self.routes.clear();
        self.cached_stats = CachedStats::default();
    }

    #[inline]
    fn update_stats_for_added_route(&mut self, route: &Route) {
        self.cached_stats.total_points += route.total_points();
        self.cached_stats.total_distance_km += route.stats().distance_km.unwrap_or(0.0);

        if !route.has_geometry() {
            return;
        }
        let route_bbox = route.bounding_box();
        self.cached_stats.bounding_box = Some(match self.cached_stats.bounding_box {
            Some(bbox) => bbox.union(&route_bbox),
            None => route_bbox,
        });
    }

    fn rebuild_cached_stats(&mut self) {
        self.cached_stats = CachedStats::default();
        let routes = std::mem::take(&mut self.routes);
        for route in &routes {
            self.update_stats_for_added_route(route);
        }
        self.routes = routes;
    }
}

impl FromIterator<RouteRecord> for RouteCollection {
    fn from_iter<T: IntoIterator<Item = RouteRecord>>(iter: T) -> Self {
        let mut collection = RouteCollection::new();
        collection.add_routes_parallel(iter.into_iter().collect());
        collection
    }
}
