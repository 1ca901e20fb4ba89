use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-side tolerance used when deciding whether a cached extent is the
/// requested one.
pub const DEFAULT_EQ_TOL: f64 = 1e-4;
/// Margin used for bbox-in-bbox containment.
pub const DEFAULT_CONTAINS_TOL: f64 = 1e-9;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    North,
    South,
    East,
    West,
}

/// `(west, south, east, north)`, the order OSM extract tools expect.
pub const OSM_ORDER: [Side; 4] = [Side::West, Side::South, Side::East, Side::North];

/// Axis-aligned WGS84 extent. Callers keep `north >= south` and
/// `east >= west`; nothing here enforces it.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct BBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BBox {
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self { north, south, east, west }
    }

    /// Padded extent of a set of `(lat, lon)` points. `None` when empty.
    pub fn from_points<I>(points: I, pad: f64) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut iter = points.into_iter();
        let (lat, lon) = iter.next()?;
        let mut bbox = Self::new(lat, lat, lon, lon);
        for (lat, lon) in iter {
            bbox.north = bbox.north.max(lat);
            bbox.south = bbox.south.min(lat);
            bbox.east = bbox.east.max(lon);
            bbox.west = bbox.west.min(lon);
        }
        Some(Self::new(
            bbox.north + pad,
            bbox.south - pad,
            bbox.east + pad,
            bbox.west - pad,
        ))
    }

    pub fn side(&self, side: Side) -> f64 {
        match side {
            Side::North => self.north,
            Side::South => self.south,
            Side::East => self.east,
            Side::West => self.west,
        }
    }

    pub fn to_ordered(&self, order: [Side; 4]) -> [f64; 4] {
        order.map(|side| self.side(side))
    }

    /// All four sides differ by less than `tol`.
    pub fn equals(&self, other: &BBox, tol: f64) -> bool {
        (self.north - other.north).abs() < tol
            && (self.south - other.south).abs() < tol
            && (self.east - other.east).abs() < tol
            && (self.west - other.west).abs() < tol
    }

    pub fn contains_bbox(&self, other: &BBox, tol: f64) -> bool {
        self.west - tol <= other.west
            && self.east + tol >= other.east
            && self.south - tol <= other.south
            && self.north + tol >= other.north
    }

    /// Boundary inclusive.
    pub fn contains_point(&self, lon: f64, lat: f64, tol: f64) -> bool {
        self.west - tol <= lon
            && lon <= self.east + tol
            && self.south - tol <= lat
            && lat <= self.north + tol
    }

    /// Unprojected degree² area. Only meaningful for ranking extents
    /// against each other.
    pub fn area(&self) -> f64 {
        ((self.north - self.south) * (self.east - self.west)).abs()
    }
}

impl fmt::Display for BBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BBox(north={}, south={}, east={}, west={})",
            self.north, self.south, self.east, self.west
        )
    }
}
