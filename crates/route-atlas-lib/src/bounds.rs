//! Axis-aligned bounding boxes in WGS84 degrees.
//!
//! Boxes are stored as `[min_lon, min_lat, max_lon, max_lat]`. There is no
//! spatial tree: the scheduler does a linear scan over cached route boxes on
//! every viewport change, which stays cheap up to a few thousand routes.

use geo::{Coord, Rect};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Bounding box `[min_lon, min_lat, max_lon, max_lat]`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "[f64; 4]", into = "[f64; 4]"))]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl BoundingBox {
    /// The box returned for an empty point list. Callers treat it as "no geometry".
    pub const EMPTY: BoundingBox = BoundingBox {
        min_lon: 0.0,
        min_lat: 0.0,
        max_lon: 0.0,
        max_lat: 0.0,
    };

    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Compute the bounds of a sequence of `(x = lon, y = lat)` coordinates.
    ///
    /// Returns [`BoundingBox::EMPTY`] when the iterator yields nothing.
    pub fn from_coords<I>(coords: I) -> Self
    where
        I: IntoIterator<Item = Coord<f64>>,
    {
        let mut min_lon = f64::INFINITY;
        let mut min_lat = f64::INFINITY;
        let mut max_lon = f64::NEG_INFINITY;
        let mut max_lat = f64::NEG_INFINITY;
        let mut found = false;

        for c in coords {
            min_lon = min_lon.min(c.x);
            min_lat = min_lat.min(c.y);
            max_lon = max_lon.max(c.x);
            max_lat = max_lat.max(c.y);
            found = true;
        }

        if !found {
            return Self::EMPTY;
        }
        Self::new(min_lon, min_lat, max_lon, max_lat)
    }

    /// Closed-interval intersection test: boxes that only touch along an edge
    /// or at a corner intersect.
    #[inline]
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(self.max_lon < other.min_lon
            || self.min_lon > other.max_lon
            || self.max_lat < other.min_lat
            || self.min_lat > other.max_lat)
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// True when both extents are strictly positive
    #[inline]
    pub fn has_area(&self) -> bool {
        self.width() > 0.0 && self.height() > 0.0
    }

    #[inline]
    pub fn center(&self) -> Coord<f64> {
        Coord {
            x: (self.min_lon + self.max_lon) / 2.0,
            y: (self.min_lat + self.max_lat) / 2.0,
        }
    }

    /// Smallest box containing both
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.min_lon.min(other.min_lon),
            self.min_lat.min(other.min_lat),
            self.max_lon.max(other.max_lon),
            self.max_lat.max(other.max_lat),
        )
    }

    /// All four edges are finite numbers
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.min_lon.is_finite()
            && self.min_lat.is_finite()
            && self.max_lon.is_finite()
            && self.max_lat.is_finite()
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.min_lon,
                y: self.min_lat,
            },
            Coord {
                x: self.max_lon,
                y: self.max_lat,
            },
        )
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(a: [f64; 4]) -> Self {
        BoundingBox::new(a[0], a[1], a[2], a[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        b.to_array()
    }
}

impl From<Rect<f64>> for BoundingBox {
    fn from(r: Rect<f64>) -> Self {
        BoundingBox::new(r.min().x, r.min().y, r.max().x, r.max().y)
    }
}

/// Compute the bounds of a slice of coordinates.
#[inline]
pub fn bounds(points: &[Coord<f64>]) -> BoundingBox {
    BoundingBox::from_coords(points.iter().copied())
}

/// Closed-interval intersection of two boxes.
#[inline]
pub fn intersects(a: &BoundingBox, b: &BoundingBox) -> bool {
    a.intersects(b)
}
