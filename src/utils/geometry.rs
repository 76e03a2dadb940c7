use geo::{AffineTransform, Coord, Rect};
use geojson::Value;
use serde::Serialize;

/// A single world-space sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Build a point from a GeoJSON position. Missing Z reads as 0.
    pub fn from_position(position: &[f64]) -> Option<Self> {
        match position {
            [x, y] => Some(Self::new(*x, *y, 0.0)),
            [x, y, z, ..] => Some(Self::new(*x, *y, *z)),
            _ => None,
        }
    }
}

/// Running extrema over every accepted point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub min_z: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub max_z: f64,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::new()
    }
}

impl BoundingBox {
    pub fn new() -> Self {
        Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            min_z: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
            max_z: f64::NEG_INFINITY,
        }
    }

    /// Widen the box to include `point`. Never narrows.
    pub fn extend(&mut self, point: &Point3) {
        self.min_x = self.min_x.min(point.x);
        self.max_x = self.max_x.max(point.x);
        self.min_y = self.min_y.min(point.y);
        self.max_y = self.max_y.max(point.y);
        self.min_z = self.min_z.min(point.z);
        self.max_z = self.max_z.max(point.z);
    }

    /// True until the first point has been added.
    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x
    }

    pub fn min(&self) -> [f64; 3] {
        [self.min_x, self.min_y, self.min_z]
    }

    pub fn max(&self) -> [f64; 3] {
        [self.max_x, self.max_y, self.max_z]
    }

    /// Floor of each minimum, used as the output coordinate offset.
    pub fn floor_offset(&self) -> [f64; 3] {
        self.min().map(f64::floor)
    }

    /// Planar extent of the box.
    pub fn footprint(&self) -> Option<Rect<f64>> {
        if self.is_empty() {
            return None;
        }
        Some(Rect::new(
            Coord {
                x: self.min_x,
                y: self.min_y,
            },
            Coord {
                x: self.max_x,
                y: self.max_y,
            },
        ))
    }
}

/// Six affine coefficients mapping raster `(col, row)` to world `(x, y)`:
/// `x = c0 + col*c1 + row*c2`, `y = c3 + col*c4 + row*c5`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    /// North-up transform from an upper-left origin and a square-or-not cell size.
    pub fn north_up(origin_x: f64, origin_y: f64, cell_width: f64, cell_height: f64) -> Self {
        Self([origin_x, cell_width, 0.0, origin_y, 0.0, -cell_height])
    }

    pub fn to_affine(&self) -> AffineTransform<f64> {
        let [c0, c1, c2, c3, c4, c5] = self.0;
        AffineTransform::new(c1, c2, c0, c4, c5, c3)
    }

    pub fn apply(&self, col: f64, row: f64) -> Coord<f64> {
        self.to_affine().apply(Coord { x: col, y: row })
    }
}

/// Closed set of vector shapes, keeping Z on every vertex.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Point(Point3),
    Line(Vec<Point3>),
    /// Rings in file order, exterior first.
    Polygon(Vec<Vec<Point3>>),
    Collection(Vec<Shape>),
}

fn ring(positions: &[Vec<f64>]) -> Vec<Point3> {
    positions
        .iter()
        .filter_map(|p| Point3::from_position(p))
        .collect()
}

fn polygon(rings: &[Vec<Vec<f64>>]) -> Shape {
    Shape::Polygon(rings.iter().map(|r| ring(r)).collect())
}

/// Convert a geojson geometry value into a Shape. Positions with fewer than
/// two ordinates are dropped.
impl From<&Value> for Shape {
    fn from(value: &Value) -> Self {
        match value {
            Value::Point(position) => match Point3::from_position(position) {
                Some(point) => Shape::Point(point),
                None => Shape::Collection(vec![]),
            },
            Value::MultiPoint(positions) => Shape::Collection(
                ring(positions).into_iter().map(Shape::Point).collect(),
            ),
            Value::LineString(positions) => Shape::Line(ring(positions)),
            Value::MultiLineString(lines) => {
                Shape::Collection(lines.iter().map(|l| Shape::Line(ring(l))).collect())
            }
            Value::Polygon(rings) => polygon(rings),
            Value::MultiPolygon(polygons) => {
                Shape::Collection(polygons.iter().map(|p| polygon(p)).collect())
            }
            Value::GeometryCollection(geometries) => Shape::Collection(
                geometries.iter().map(|g| Shape::from(&g.value)).collect(),
            ),
        }
    }
}

impl From<geojson::Geometry> for Shape {
    fn from(geometry: geojson::Geometry) -> Self {
        Shape::from(&geometry.value)
    }
}
