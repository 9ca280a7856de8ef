//! Render cost tracking
//!
//! The monitor records one [`RenderMetrics`] per committed render pass and
//! derives an advisory "reduce detail" signal from the latest figures. It
//! never touches rendering state itself; the scheduler reads the signal at
//! the start of the next cycle.

use instant::Instant;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Number of render passes kept in history
pub const METRICS_CAPACITY: usize = 100;
/// Number of fps samples averaged
pub const FPS_WINDOW: usize = 60;
/// Render passes slower than this trigger degradation (one 60 Hz frame)
pub const SLOW_RENDER_MS: f64 = 16.0;
/// Default frame rate floor; lower averages trigger degradation
pub const MIN_FPS: f64 = 30.0;

/// Cost of one render pass
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RenderMetrics {
    pub render_time_ms: f64,
    pub route_count: usize,
    pub point_count: usize,
    /// Averaged frame rate; `None` until two passes have been observed
    pub fps: Option<f64>,
    /// Resident memory of the process, where the platform exposes it
    pub memory_mb: Option<f64>,
}

/// Rolling render statistics
#[derive(Debug, Clone)]
pub struct PerformanceMonitor {
    metrics: VecDeque<RenderMetrics>,
    fps_history: VecDeque<f64>,
    last_observation: Option<Instant>,
    min_fps: f64,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl PerformanceMonitor {
    pub fn new() -> Self {
        Self {
            metrics: VecDeque::with_capacity(METRICS_CAPACITY),
            fps_history: VecDeque::with_capacity(FPS_WINDOW),
            last_observation: None,
            min_fps: MIN_FPS,
        }
    }

    /// Use `min_fps` as the frame rate floor. Zero or less disables the fps
    /// check, leaving only the render time check.
    ///
    /// Observations are paced by committed passes, so a debounced caller never
    /// sees more than `1000 / debounce_ms` fps.
    pub fn with_min_fps(mut self, min_fps: f64) -> Self {
        self.min_fps = min_fps;
        self
    }

    #[inline]
    pub fn min_fps(&self) -> f64 {
        self.min_fps
    }

    /// Mark the start of a render pass
    #[inline]
    pub fn start_render(&self) -> Instant {
        Instant::now()
    }

    /// Record a finished render pass that started at `start`.
    pub fn observe(&mut self, start: Instant, route_count: usize, point_count: usize) -> RenderMetrics {
        self.observe_at(start, Instant::now(), route_count, point_count)
    }

    /// [`observe`](Self::observe) with an explicit end time.
    pub fn observe_at(
        &mut self,
        start: Instant,
        now: Instant,
        route_count: usize,
        point_count: usize,
    ) -> RenderMetrics {
        let render_time_ms = now.saturating_duration_since(start).as_secs_f64() * 1000.0;

        if let Some(last) = self.last_observation {
            let delta_ms = now.saturating_duration_since(last).as_secs_f64() * 1000.0;
            if delta_ms > 0.0 {
                if self.fps_history.len() == FPS_WINDOW {
                    self.fps_history.pop_front();
                }
                self.fps_history.push_back(1000.0 / delta_ms);
            }
        }
        self.last_observation = Some(now);

        let metrics = RenderMetrics {
            render_time_ms,
            route_count,
            point_count,
            fps: self.average_fps(),
            memory_mb: memory_usage_mb(),
        };

        if self.metrics.len() == METRICS_CAPACITY {
            self.metrics.pop_front();
        }
        self.metrics.push_back(metrics);

        tracing::trace!(
            "Render pass: {:.2} ms, {} routes, {} points",
            render_time_ms,
            route_count,
            point_count
        );
        metrics
    }

    #[inline]
    pub fn latest(&self) -> Option<&RenderMetrics> {
        self.metrics.back()
    }

    /// History, oldest first
    pub fn history(&self) -> impl Iterator<Item = &RenderMetrics> {
        self.metrics.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn average_render_time_ms(&self) -> Option<f64> {
        if self.metrics.is_empty() {
            return None;
        }
        let sum: f64 = self.metrics.iter().map(|m| m.render_time_ms).sum();
        Some(sum / self.metrics.len() as f64)
    }

    pub fn average_fps(&self) -> Option<f64> {
        if self.fps_history.is_empty() {
            return None;
        }
        Some(self.fps_history.iter().sum::<f64>() / self.fps_history.len() as f64)
    }

    /// True when the latest pass was slower than one frame or the frame rate
    /// dropped below the floor ([`MIN_FPS`] by default). False before the
    /// first observation.
    pub fn should_optimize(&self) -> bool {
        match self.latest() {
            Some(m) => m.render_time_ms > SLOW_RENDER_MS || m.fps.is_some_and(|fps| fps < self.min_fps),
            None => false,
        }
    }

    pub fn log_performance_warning(&self) {
        if let Some(m) = self.latest()
            && self.should_optimize()
        {
            tracing::warn!(
                "Slow rendering: {:.1} ms for {} routes ({} points), fps {}",
                m.render_time_ms,
                m.route_count,
                m.point_count,
                m.fps
                    .map(|f| format!("{:.1}", f))
                    .unwrap_or_else(|| "n/a".to_string())
            );
        }
    }

    pub fn clear(&mut self) {
        self.metrics.clear();
        self.fps_history.clear();
        self.last_observation = None;
    }
}

/// Resident set size in megabytes from `/proc/self/status`
#[cfg(target_os = "linux")]
fn memory_usage_mb() -> Option<f64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: f64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb / 1024.0)
}

#[cfg(not(target_os = "linux"))]
fn memory_usage_mb() -> Option<f64> {
    None
}
