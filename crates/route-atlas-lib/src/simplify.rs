//! Line simplification for zoom-dependent level of detail.
//!
//! Two stages: an optional radial-distance pre-pass that drops points closer
//! than the tolerance to the last kept point, followed by Douglas-Peucker over
//! what is left. Everything works on squared distances in whatever flat
//! coordinate space the caller supplies (degrees for routes).

use geo::Coord;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Constants of the zoom-to-tolerance mapping
///
/// `tolerance = base_meters * 2^(reference_zoom - zoom) * unit_scale`
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ToleranceConfig {
    /// Tolerance in metres at the reference zoom
    pub base_meters: f64,
    /// Zoom level at which `base_meters` applies
    pub reference_zoom: f64,
    /// Degrees per metre (approximate, latitude-independent)
    pub unit_scale: f64,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            base_meters: 10.0,
            reference_zoom: 18.0,
            unit_scale: 0.00001,
        }
    }
}

/// Tolerance in degrees for the given zoom level.
///
/// Each zoom level out doubles the tolerance.
#[inline]
pub fn tolerance_for_zoom(zoom: f64, config: &ToleranceConfig) -> f64 {
    let t = config.base_meters * (config.reference_zoom - zoom).exp2() * config.unit_scale;
    if t.is_finite() && t > 0.0 { t } else { 0.0 }
}

/// Simplify a polyline, returning the kept points in their original order.
///
/// Inputs with two points or fewer come back unchanged. The first and last
/// points are always kept. `high_quality` skips the radial pre-pass.
pub fn simplify(points: &[Coord<f64>], tolerance: f64, high_quality: bool) -> Vec<Coord<f64>> {
    if points.len() <= 2 {
        return points.to_vec();
    }
    simplify_indices(points, tolerance, high_quality)
        .into_iter()
        .map(|i| points[i])
        .collect()
}

/// Same as [`simplify`] but returns indices into `points`.
pub fn simplify_indices(points: &[Coord<f64>], tolerance: f64, high_quality: bool) -> Vec<usize> {
    #[cfg(feature = "profiling")]
    profiling::scope!("simplify::simplify_indices");

    let n = points.len();
    if n <= 2 {
        return (0..n).collect();
    }

    let tolerance = if tolerance.is_finite() && tolerance > 0.0 {
        tolerance
    } else {
        0.0
    };
    let sq_tolerance = tolerance * tolerance;

    let candidates = if high_quality {
        (0..n).collect()
    } else {
        radial_pass(points, sq_tolerance)
    };

    douglas_peucker(points, &candidates, sq_tolerance)
}

/// Keep a point only when it is farther than the tolerance from the last kept
/// point. The last input point is always kept.
fn radial_pass(points: &[Coord<f64>], sq_tolerance: f64) -> Vec<usize> {
    let last = points.len() - 1;
    let mut kept = Vec::with_capacity(points.len());
    kept.push(0);
    let mut prev = points[0];

    for (i, p) in points.iter().enumerate().take(last).skip(1) {
        if sq_distance(*p, prev) > sq_tolerance {
            kept.push(i);
            prev = *p;
        }
    }

    kept.push(last);
    kept
}

/// Iterative Douglas-Peucker over `candidates` (indices into `points`).
fn douglas_peucker(points: &[Coord<f64>], candidates: &[usize], sq_tolerance: f64) -> Vec<usize> {
    let len = candidates.len();
    if len <= 2 {
        return candidates.to_vec();
    }

    let mut markers = vec![false; len];
    markers[0] = true;
    markers[len - 1] = true;

    let mut stack: Vec<(usize, usize)> = vec![(0, len - 1)];
    while let Some((first, last)) = stack.pop() {
        let a = points[candidates[first]];
        let b = points[candidates[last]];

        let mut max_sq_dist = 0.0;
        let mut index = 0;
        for i in (first + 1)..last {
            let d = sq_segment_distance(points[candidates[i]], a, b);
            if d > max_sq_dist {
                index = i;
                max_sq_dist = d;
            }
        }

        if max_sq_dist > sq_tolerance {
            markers[index] = true;
            if index - first > 1 {
                stack.push((first, index));
            }
            if last - index > 1 {
                stack.push((index, last));
            }
        }
    }

    candidates
        .iter()
        .zip(markers)
        .filter_map(|(&idx, keep)| keep.then_some(idx))
        .collect()
}

#[inline]
fn sq_distance(p: Coord<f64>, q: Coord<f64>) -> f64 {
    let dx = p.x - q.x;
    let dy = p.y - q.y;
    dx * dx + dy * dy
}

/// Squared distance from `p` to the segment `a`-`b`.
///
/// A zero-length segment degenerates to the distance to `a`.
#[inline]
fn sq_segment_distance(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> f64 {
    let mut x = a.x;
    let mut y = a.y;
    let dx = b.x - x;
    let dy = b.y - y;

    if dx != 0.0 || dy != 0.0 {
        let t = ((p.x - x) * dx + (p.y - y) * dy) / (dx * dx + dy * dy);
        if t > 1.0 {
            x = b.x;
            y = b.y;
        } else if t > 0.0 {
            x += dx * t;
            y += dy * t;
        }
    }

    let dx = p.x - x;
    let dy = p.y - y;
    dx * dx + dy * dy
}
