//! Render scheduling
//!
//! Every viewport change goes through a small state machine:
//!
//! ```text
//! Idle -> Pending -> Debounced -> Computing -> Committed -> Idle
//! ```
//!
//! - A change while Idle, Committed, Pending or Debounced records the newest
//!   view and restarts the debounce timer.
//! - A change while Computing is queued (newest wins) and starts a new cycle
//!   once the in-flight pass has been committed.
//!
//! The scheduler itself is clock-agnostic: callers pass `now` in and ask for
//! the next [`deadline`](RenderScheduler::deadline), which keeps it usable
//! from an async driver, a UI frame loop or a test.
//!
//! The Computing phase is [`plan_render`], a pure function of the routes, the
//! view and the configuration that can run on another thread.

use crate::bounds::BoundingBox;
use crate::color::{PeriodKey, resolve_route_color};
use crate::monitor::{MIN_FPS, PerformanceMonitor, RenderMetrics};
use crate::route::{Route, TrackPoint};
use crate::simplify::{ToleranceConfig, simplify, tolerance_for_zoom};
use crate::surface::{MapSurface, SurfaceError, ViewState};

use geo::{Coord, LineString};
use instant::Instant;
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for render passes
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RenderConfig {
    /// Quiet period after the last viewport change before computing
    pub debounce_ms: u64,
    /// Maximum number of routes drawn at once
    pub max_visible_routes: usize,
    /// Lower bound for the cap when degrading
    pub min_visible_routes: usize,
    /// Routes with more points than this are always simplified
    pub density_threshold: usize,
    /// Below this zoom every route is simplified
    pub detail_zoom: f64,
    pub tolerance: ToleranceConfig,
    /// Skip the radial pre-pass of the simplifier
    pub high_quality: bool,
    /// Bucketing mode for automatic colors
    pub period: PeriodKey,
    /// Cap multiplier applied while the monitor asks for less detail
    pub degrade_cap_factor: f64,
    /// Tolerance multiplier applied while the monitor asks for less detail
    pub degrade_tolerance_factor: f64,
    /// Average commit rate below which the next cycle degrades; zero or less
    /// disables the check. Commits are at least `debounce_ms` apart.
    pub min_fps: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            max_visible_routes: 100,
            min_visible_routes: 10,
            density_threshold: 1000,
            detail_zoom: 14.0,
            tolerance: ToleranceConfig::default(),
            high_quality: false,
            period: PeriodKey::Month,
            degrade_cap_factor: 0.5,
            degrade_tolerance_factor: 2.0,
            min_fps: MIN_FPS,
        }
    }
}

impl RenderConfig {
    #[inline]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// One styled route ready to hand to a map surface
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RenderItem {
    pub id: String,
    pub lines: Vec<LineString<f64>>,
    pub color: String,
    pub popup: String,
    /// Geometry went through the simplifier
    pub simplified: bool,
}

impl RenderItem {
    pub fn point_count(&self) -> usize {
        self.lines.iter().map(|l| l.0.len()).sum()
    }
}

/// A selected route whose geometry could not be turned into a layer
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[error("Route {id} skipped: {reason}")]
pub struct RenderSkip {
    pub id: String,
    pub reason: String,
}

/// Input of the Computing phase
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub view: ViewState,
    /// The monitor asked for less detail when this cycle started
    pub degrade: bool,
    pub started_at: Instant,
    pub cycle: u64,
}

/// Output of the Computing phase
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RenderPlan {
    pub cycle: u64,
    pub view: ViewState,
    /// In draw order: closest to the viewport center first
    pub items: Vec<RenderItem>,
    pub skipped: Vec<RenderSkip>,
    /// Routes intersecting the viewport before capping
    pub candidates: usize,
    pub cap: usize,
    pub tolerance: f64,
    pub degraded: bool,
}

impl RenderPlan {
    pub fn point_count(&self) -> usize {
        self.items.iter().map(RenderItem::point_count).sum()
    }
}

/// Where the scheduler is in its cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SchedulerPhase {
    Idle,
    /// A change arrived; the debounce timer is not armed yet
    Pending,
    /// Timer armed; computing starts at `deadline` unless another change arrives
    Debounced { deadline: Instant },
    Computing,
    Committed,
}

/// Coalesces viewport changes into render passes
#[derive(Debug, Clone)]
pub struct RenderScheduler {
    config: RenderConfig,
    phase: SchedulerPhase,
    latest_view: Option<ViewState>,
    last_change: Option<Instant>,
    /// A change arrived while computing
    queued: bool,
    cycle: u64,
    monitor: PerformanceMonitor,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl RenderScheduler {
    pub fn new(config: RenderConfig) -> Self {
        let monitor = PerformanceMonitor::new().with_min_fps(config.min_fps);
        Self {
            config,
            phase: SchedulerPhase::Idle,
            latest_view: None,
            last_change: None,
            queued: false,
            cycle: 0,
            monitor,
        }
    }

    #[inline]
    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    #[inline]
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    #[inline]
    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    /// Newest view seen
    #[inline]
    pub fn latest_view(&self) -> Option<ViewState> {
        self.latest_view
    }

    /// A change arrived while computing and will start another cycle
    #[inline]
    pub fn has_queued_change(&self) -> bool {
        self.queued
    }

    /// Record a viewport change
    pub fn notify(&mut self, view: ViewState, now: Instant) {
        self.latest_view = Some(view);
        match self.phase {
            SchedulerPhase::Computing => {
                tracing::trace!("View changed while computing, queued");
                self.queued = true;
            }
            _ => {
                self.last_change = Some(now);
                self.phase = SchedulerPhase::Pending;
            }
        }
    }

    /// When the scheduler next needs [`poll`](Self::poll)ing, if it is waiting
    pub fn deadline(&self) -> Option<Instant> {
        match self.phase {
            SchedulerPhase::Debounced { deadline } => Some(deadline),
            SchedulerPhase::Pending => self.last_change.map(|t| t + self.config.debounce()),
            _ => None,
        }
    }

    /// Advance timers. Returns a request when the debounce period has elapsed,
    /// moving the scheduler into Computing.
    pub fn poll(&mut self, now: Instant) -> Option<RenderRequest> {
        match self.phase {
            SchedulerPhase::Pending => {
                let deadline = self.last_change.unwrap_or(now) + self.config.debounce();
                self.phase = SchedulerPhase::Debounced { deadline };
                if now >= deadline {
                    return self.begin_compute(now);
                }
                None
            }
            SchedulerPhase::Debounced { deadline } if now >= deadline => self.begin_compute(now),
            SchedulerPhase::Committed => {
                self.phase = SchedulerPhase::Idle;
                None
            }
            _ => None,
        }
    }

    /// Skip the rest of the debounce period and start computing now
    pub fn flush(&mut self, now: Instant) -> Option<RenderRequest> {
        match self.phase {
            SchedulerPhase::Pending | SchedulerPhase::Debounced { .. } => self.begin_compute(now),
            _ => None,
        }
    }

    fn begin_compute(&mut self, now: Instant) -> Option<RenderRequest> {
        let view = self.latest_view?;
        self.cycle += 1;
        self.phase = SchedulerPhase::Computing;
        let degrade = self.monitor.should_optimize();
        if degrade {
            tracing::debug!("Cycle {} degraded after slow render", self.cycle);
        }
        Some(RenderRequest {
            view,
            degrade,
            started_at: now,
            cycle: self.cycle,
        })
    }

    /// Run the Computing phase on this thread
    pub fn compute(&self, request: &RenderRequest, routes: &[Arc<Route>]) -> RenderPlan {
        plan_render(request, routes, &self.config)
    }

    /// Hand a computed plan to the surface and record its cost.
    ///
    /// If a change was queued while computing, the scheduler goes back to
    /// Pending with the debounce timer started at `now`. A surface error is
    /// returned to the caller; the scheduler still leaves Computing so the
    /// next change retries.
    pub fn commit(
        &mut self,
        plan: &RenderPlan,
        surface: &mut dyn MapSurface,
        started_at: Instant,
        now: Instant,
    ) -> Result<RenderMetrics, SurfaceError> {
        let result = surface.replace_all(&plan.items);
        self.phase = SchedulerPhase::Committed;

        if self.queued {
            self.queued = false;
            self.last_change = Some(now);
            self.phase = SchedulerPhase::Pending;
        }

        if let Err(e) = result {
            tracing::error!("Failed to commit render cycle {}: {}", plan.cycle, e);
            return Err(e);
        }

        let metrics =
            self.monitor
                .observe_at(started_at, Instant::now().max(now), plan.items.len(), plan.point_count());
        self.monitor.log_performance_warning();
        tracing::debug!(
            "Committed cycle {}: {} of {} candidate routes, {} points, tolerance {:.6}",
            plan.cycle,
            plan.items.len(),
            plan.candidates,
            plan.point_count(),
            plan.tolerance
        );
        Ok(metrics)
    }
}

/// Select, order, simplify and style the routes for one view.
///
/// 1. Keep routes with geometry whose box intersects the viewport.
/// 2. Sort by distance from box center to viewport center, then by id.
/// 3. Truncate to the visible-route cap.
/// 4. Simplify dense routes, and every route below the detail zoom.
/// 5. Resolve colors.
pub fn plan_render(request: &RenderRequest, routes: &[Arc<Route>], config: &RenderConfig) -> RenderPlan {
    #[cfg(feature = "profiling")]
    profiling::scope!("scheduler::plan_render");

    let view = request.view;
    let mut tolerance = tolerance_for_zoom(view.zoom, &config.tolerance);
    let mut cap = config.max_visible_routes;
    if request.degrade {
        let reduced = (cap as f64 * config.degrade_cap_factor).ceil() as usize;
        cap = reduced.max(config.min_visible_routes).min(cap);
        tolerance *= config.degrade_tolerance_factor;
    }

    let mut plan = RenderPlan {
        cycle: request.cycle,
        view,
        cap,
        tolerance,
        degraded: request.degrade,
        ..Default::default()
    };

    let viewport = view.bounds;
    if !viewport.is_finite() || !viewport.has_area() {
        tracing::debug!("Viewport {:?} has no area, nothing to draw", viewport.to_array());
        return plan;
    }

    let mut candidates = select_candidates(routes, &viewport);
    plan.candidates = candidates.len();
    candidates.truncate(cap);

    let below_detail = view.zoom < config.detail_zoom;
    let results: Vec<Result<RenderItem, RenderSkip>> = candidates
        .par_iter()
        .map(|route| {
            let reduce = below_detail || route.total_points() > config.density_threshold;
            build_item(route, reduce.then_some(tolerance), config)
        })
        .collect();

    for result in results {
        match result {
            Ok(item) => plan.items.push(item),
            Err(skip) => {
                tracing::warn!("{}", skip);
                plan.skipped.push(skip);
            }
        }
    }

    plan
}

/// Routes intersecting `viewport`, closest first
pub fn select_candidates<'a>(routes: &'a [Arc<Route>], viewport: &BoundingBox) -> Vec<&'a Arc<Route>> {
    let center = viewport.center();
    let mut candidates: Vec<(f64, &Arc<Route>)> = routes
        .iter()
        .filter(|r| r.has_geometry())
        .filter(|r| r.bounding_box().intersects(viewport))
        .map(|r| (distance(r.bounding_box().center(), center), r))
        .collect();

    candidates.sort_by(|(da, a), (db, b)| da.total_cmp(db).then_with(|| a.id().cmp(b.id())));
    candidates.into_iter().map(|(_, r)| r).collect()
}

#[inline]
fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

fn build_item(route: &Route, tolerance: Option<f64>, config: &RenderConfig) -> Result<RenderItem, RenderSkip> {
    let mut lines = Vec::with_capacity(route.lines().len());
    for line in route.lines() {
        let coords: Vec<Coord<f64>> = line.iter().map(TrackPoint::coord).collect();
        let coords = match tolerance {
            Some(t) => simplify(&coords, t, config.high_quality),
            None => coords,
        };
        if coords.len() >= 2 {
            lines.push(LineString::new(coords));
        }
    }

    if lines.is_empty() {
        return Err(RenderSkip {
            id: route.id().to_string(),
            reason: format!("no line with at least two points ({} points total)", route.total_points()),
        });
    }

    Ok(RenderItem {
        id: route.id().to_string(),
        lines,
        color: resolve_route_color(route.color(), route.date(), config.period),
        popup: popup_text(route),
        simplified: tolerance.is_some(),
    })
}

/// Name, distance and date of a route on one line
pub fn popup_text(route: &Route) -> String {
    let mut popup = route.name().to_string();
    if let Some(km) = route.stats().distance_km {
        let _ = write!(popup, " | {:.1} km", km);
    }
    if let Some(date) = route.date() {
        let _ = write!(popup, " | {}", date.get(..10).unwrap_or(date));
    }
    popup
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::PALETTE;
    use crate::route::RouteRecord;
    use crate::surface::HeadlessSurface;

    fn view(bounds: [f64; 4], zoom: f64) -> ViewState {
        ViewState::new(BoundingBox::from(bounds), zoom)
    }

    /// Straight route from (lon0, lat0) to (lon1, lat1) with `n` points
    fn line_route(id: &str, lon0: f64, lat0: f64, lon1: f64, lat1: f64, n: usize) -> Arc<Route> {
        let points = (0..n)
            .map(|i| {
                let t = i as f64 / (n - 1).max(1) as f64;
                TrackPoint::new(lat0 + (lat1 - lat0) * t, lon0 + (lon1 - lon0) * t)
            })
            .collect();
        Route::new(RouteRecord {
            id: id.to_string(),
            name: id.to_string(),
            lines: vec![points],
            ..Default::default()
        })
    }

    fn request(v: ViewState) -> RenderRequest {
        RenderRequest {
            view: v,
            degrade: false,
            started_at: Instant::now(),
            cycle: 1,
        }
    }

    #[test]
    fn test_viewport_culling() {
        let routes = vec![
            line_route("far", 20.0, 20.0, 30.0, 30.0, 10),
            line_route("near", 5.0, 5.0, 15.0, 15.0, 10),
        ];
        let plan = plan_render(&request(view([0.0, 0.0, 10.0, 10.0], 16.0)), &routes, &RenderConfig::default());
        let ids: Vec<&str> = plan.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["near"]);
        assert_eq!(plan.candidates, 1);
    }

    #[test]
    fn test_zero_area_viewport_selects_nothing() {
        let routes = vec![line_route("a", 0.0, 0.0, 1.0, 1.0, 10)];
        let plan = plan_render(&request(view([0.5, 0.0, 0.5, 1.0], 16.0)), &routes, &RenderConfig::default());
        assert!(plan.items.is_empty());
        assert_eq!(plan.candidates, 0);
    }

    #[test]
    fn test_cap_and_ordering() {
        // 200 routes around the viewport center (5, 5). Pairs share a distance.
        let mut routes = Vec::new();
        for i in 0..200 {
            let offset = (i / 2) as f64 * 0.01;
            let (dx, dy) = if i % 2 == 0 { (offset, 0.0) } else { (0.0, offset) };
            let cx = 5.0 + dx;
            let cy = 5.0 + dy;
            routes.push(line_route(&format!("r{:03}", 199 - i), cx - 0.1, cy - 0.1, cx + 0.1, cy + 0.1, 5));
        }
        let config = RenderConfig {
            max_visible_routes: 50,
            ..Default::default()
        };
        let plan = plan_render(&request(view([0.0, 0.0, 10.0, 10.0], 16.0)), &routes, &config);

        assert_eq!(plan.candidates, 200);
        assert_eq!(plan.items.len(), 50);

        let center = BoundingBox::from([0.0, 0.0, 10.0, 10.0]).center();
        let by_id: std::collections::HashMap<&str, &Arc<Route>> =
            routes.iter().map(|r| (r.id(), r)).collect();
        let keys: Vec<(f64, &str)> = plan
            .items
            .iter()
            .map(|item| (distance(by_id[item.id.as_str()].bounding_box().center(), center), item.id.as_str()))
            .collect();
        for w in keys.windows(2) {
            assert!(w[0].0 < w[1].0 || (w[0].0 == w[1].0 && w[0].1 < w[1].1), "{:?}", w);
        }

        // Nothing left out is closer than the farthest selected route
        let farthest = keys.last().map(|k| k.0).unwrap();
        let selected: std::collections::HashSet<&str> = keys.iter().map(|k| k.1).collect();
        for r in &routes {
            if !selected.contains(r.id()) {
                assert!(distance(r.bounding_box().center(), center) >= farthest);
            }
        }
    }

    #[test]
    fn test_ties_broken_by_id() {
        // Same box, different ids
        let routes = vec![
            line_route("b", 1.0, 1.0, 2.0, 2.0, 3),
            line_route("a", 1.0, 1.0, 2.0, 2.0, 3),
            line_route("c", 1.0, 1.0, 2.0, 2.0, 3),
        ];
        let plan = plan_render(&request(view([0.0, 0.0, 3.0, 3.0], 16.0)), &routes, &RenderConfig::default());
        let ids: Vec<&str> = plan.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_routes_excluded() {
        let empty = Route::new(RouteRecord {
            id: "empty".into(),
            ..Default::default()
        });
        let routes = vec![empty, line_route("a", 0.0, 0.0, 1.0, 1.0, 3)];
        // The empty route's box [0,0,0,0] sits inside the viewport
        let plan = plan_render(&request(view([-1.0, -1.0, 2.0, 2.0], 16.0)), &routes, &RenderConfig::default());
        assert_eq!(plan.items.len(), 1);
        assert_eq!(plan.candidates, 1);
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn test_single_point_route_is_skipped_not_fatal() {
        let routes = vec![
            line_route("dot", 1.0, 1.0, 1.0, 1.0, 1),
            line_route("ok", 0.0, 0.0, 1.0, 1.0, 3),
        ];
        let plan = plan_render(&request(view([-1.0, -1.0, 2.0, 2.0], 16.0)), &routes, &RenderConfig::default());
        assert_eq!(plan.items.len(), 1);
        assert_eq!(plan.items[0].id, "ok");
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].id, "dot");
    }

    #[test]
    fn test_simplification_thresholds() {
        let config = RenderConfig {
            density_threshold: 50,
            detail_zoom: 14.0,
            ..Default::default()
        };
        let sparse = line_route("sparse", 0.0, 0.0, 0.01, 0.01, 20);
        let dense = line_route("dense", 0.0, 0.0, 0.01, 0.01, 100);
        let routes = vec![sparse, dense];
        let v = [-0.1, -0.1, 0.1, 0.1];

        let plan = plan_render(&request(view(v, 16.0)), &routes, &config);
        let sparse_item = plan.items.iter().find(|i| i.id == "sparse").unwrap();
        let dense_item = plan.items.iter().find(|i| i.id == "dense").unwrap();
        assert!(!sparse_item.simplified);
        assert_eq!(sparse_item.point_count(), 20);
        assert!(dense_item.simplified);
        // Collinear, so only the endpoints survive
        assert_eq!(dense_item.point_count(), 2);

        let plan = plan_render(&request(view(v, 10.0)), &routes, &config);
        assert!(plan.items.iter().all(|i| i.simplified));
    }

    #[test]
    fn test_colors() {
        let mut record = RouteRecord {
            id: "manual".into(),
            color: Some("#000000".into()),
            lines: vec![vec![TrackPoint::new(0.0, 0.0), TrackPoint::new(1.0, 1.0)]],
            ..Default::default()
        };
        let manual = Route::new(record.clone());
        record.id = "auto".into();
        record.color = None;
        record.date = Some("2024-06-15T10:00:00Z".into());
        let auto = Route::new(record);

        let config = RenderConfig::default();
        let plan = plan_render(&request(view([-1.0, -1.0, 2.0, 2.0], 16.0)), &[manual, auto], &config);
        let color_of = |id: &str| plan.items.iter().find(|i| i.id == id).map(|i| i.color.clone());
        assert_eq!(color_of("manual").as_deref(), Some("#000000"));
        assert_eq!(color_of("auto").as_deref(), Some(PALETTE[14 % 12]));
    }

    #[test]
    fn test_degraded_cycle_shrinks_cap_and_raises_tolerance() {
        let routes: Vec<Arc<Route>> = (0..40)
            .map(|i| line_route(&format!("r{:02}", i), 0.0, 0.0, 1.0, 1.0, 3))
            .collect();
        let config = RenderConfig {
            max_visible_routes: 30,
            min_visible_routes: 10,
            ..Default::default()
        };
        let mut req = request(view([-1.0, -1.0, 2.0, 2.0], 12.0));
        let normal = plan_render(&req, &routes, &config);
        req.degrade = true;
        let degraded = plan_render(&req, &routes, &config);

        assert_eq!(normal.items.len(), 30);
        assert_eq!(degraded.items.len(), 15);
        assert!(degraded.degraded);
        assert!((degraded.tolerance - 2.0 * normal.tolerance).abs() < 1e-12);
    }

    #[test]
    fn test_popup_text() {
        let route = Route::new(RouteRecord {
            id: "p".into(),
            name: "Lunch Loop".into(),
            date: Some("2024-06-15T10:00:00Z".into()),
            stats: crate::route::RouteStats {
                distance_km: Some(12.34),
                ..Default::default()
            },
            ..Default::default()
        });
        assert_eq!(popup_text(&route), "Lunch Loop | 12.3 km | 2024-06-15");
    }

    #[test]
    fn test_state_machine_debounce() {
        let config = RenderConfig::default();
        let debounce = config.debounce();
        let mut scheduler = RenderScheduler::new(config);
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);

        let t0 = Instant::now();
        scheduler.notify(view([0.0, 0.0, 1.0, 1.0], 10.0), t0);
        assert_eq!(scheduler.phase(), SchedulerPhase::Pending);
        assert!(scheduler.poll(t0).is_none());
        assert_eq!(scheduler.phase(), SchedulerPhase::Debounced { deadline: t0 + debounce });

        // A second change halfway through restarts the timer
        let t1 = t0 + debounce / 2;
        scheduler.notify(view([0.0, 0.0, 2.0, 2.0], 11.0), t1);
        assert_eq!(scheduler.phase(), SchedulerPhase::Pending);
        assert!(scheduler.poll(t1).is_none());
        assert!(scheduler.poll(t0 + debounce).is_none());

        let req = scheduler.poll(t1 + debounce).expect("debounce elapsed");
        assert_eq!(scheduler.phase(), SchedulerPhase::Computing);
        assert_eq!(req.view.zoom, 11.0);
        assert_eq!(req.cycle, 1);
    }

    #[test]
    fn test_change_during_computing_is_queued() {
        let mut scheduler = RenderScheduler::new(RenderConfig::default());
        let mut surface = HeadlessSurface::default();
        let routes = vec![line_route("a", 0.0, 0.0, 1.0, 1.0, 3)];

        let t0 = Instant::now();
        scheduler.notify(view([-1.0, -1.0, 2.0, 2.0], 16.0), t0);
        let req = scheduler.flush(t0).unwrap();

        // Two changes while computing; newest wins
        scheduler.notify(view([10.0, 10.0, 11.0, 11.0], 16.0), t0);
        scheduler.notify(view([20.0, 20.0, 21.0, 21.0], 16.0), t0);
        assert_eq!(scheduler.phase(), SchedulerPhase::Computing);
        assert!(scheduler.has_queued_change());

        let plan = scheduler.compute(&req, &routes);
        assert_eq!(plan.view.bounds.min_lon, -1.0);
        scheduler.commit(&plan, &mut surface, req.started_at, t0).unwrap();
        assert_eq!(surface.layers().len(), 1);

        // The queued change starts a new cycle
        assert_eq!(scheduler.phase(), SchedulerPhase::Pending);
        let next = scheduler.flush(t0).unwrap();
        assert_eq!(next.cycle, 2);
        assert_eq!(next.view.bounds.min_lon, 20.0);

        let plan = scheduler.compute(&next, &routes);
        scheduler.commit(&plan, &mut surface, next.started_at, t0).unwrap();
        assert!(surface.layers().is_empty());
        assert_eq!(surface.last_removed(), 1);
        assert_eq!(scheduler.phase(), SchedulerPhase::Committed);
        assert!(scheduler.poll(t0).is_none());
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
        assert_eq!(scheduler.monitor().len(), 2);
    }

    /// Two fast passes one second-long debounce apart
    fn second_cycle_degrades(min_fps: f64) -> bool {
        let config = RenderConfig {
            debounce_ms: 1000,
            min_fps,
            ..Default::default()
        };
        let debounce = config.debounce();
        let mut scheduler = RenderScheduler::new(config);
        let mut surface = HeadlessSurface::default();
        let t0 = Instant::now();

        scheduler.notify(view([0.0, 0.0, 1.0, 1.0], 10.0), t0);
        let req = scheduler.flush(t0).unwrap();
        let plan = scheduler.compute(&req, &[]);
        scheduler.commit(&plan, &mut surface, req.started_at, t0).unwrap();

        let t1 = t0 + debounce;
        scheduler.notify(view([0.0, 0.0, 1.0, 1.0], 11.0), t1);
        let req = scheduler.flush(t1).unwrap();
        assert!(!req.degrade);
        let plan = scheduler.compute(&req, &[]);
        scheduler
            .commit(&plan, &mut surface, req.started_at, t1 + Duration::from_millis(2))
            .unwrap();

        scheduler.notify(view([0.0, 0.0, 1.0, 1.0], 12.0), t1 + debounce);
        scheduler.flush(t1 + debounce).unwrap().degrade
    }

    #[test]
    fn test_commit_paced_fps_floor() {
        // One commit per second is under the default floor
        assert!(second_cycle_degrades(MIN_FPS));
        assert!(!second_cycle_degrades(0.0));
        assert!(!second_cycle_degrades(0.5));
    }

    struct FailingSurface;

    impl MapSurface for FailingSurface {
        fn replace_all(&mut self, _items: &[RenderItem]) -> Result<(), SurfaceError> {
            Err(SurfaceError::Unavailable("detached".into()))
        }

        fn view(&self) -> ViewState {
            ViewState::default()
        }
    }

    #[test]
    fn test_surface_failure_is_surfaced() {
        let mut scheduler = RenderScheduler::new(RenderConfig::default());
        let t0 = Instant::now();
        scheduler.notify(view([0.0, 0.0, 1.0, 1.0], 10.0), t0);
        let req = scheduler.flush(t0).unwrap();
        let plan = scheduler.compute(&req, &[]);
        let err = scheduler.commit(&plan, &mut FailingSurface, req.started_at, t0).unwrap_err();
        assert_eq!(err, SurfaceError::Unavailable("detached".into()));
        assert_eq!(scheduler.phase(), SchedulerPhase::Committed);
        assert!(scheduler.monitor().is_empty());

        // Next change starts over
        scheduler.notify(view([0.0, 0.0, 1.0, 1.0], 11.0), t0);
        assert!(scheduler.flush(t0).is_some());
    }
}
