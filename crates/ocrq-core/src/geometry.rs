//! Planar primitives shared by recognition results.

use serde::{Deserialize, Serialize};

/// A 2D point serialized as `[x, y]`.
pub type Point = [f64; 2];

/// Ordered sequence of points outlining a text line, character or cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon(pub Vec<Point>);

impl Polygon {
    /// Creates a polygon from its points.
    pub fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Creates the clockwise rectangle `[tl, tr, br, bl]`.
    pub fn rect(xtl: f64, ytl: f64, xbr: f64, ybr: f64) -> Self {
        Self(vec![[xtl, ytl], [xbr, ytl], [xbr, ybr], [xtl, ybr]])
    }

    /// Returns the points of this polygon.
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Returns `true` if the polygon has no points.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the axis-aligned bounding box, or `None` for an empty polygon.
    pub fn bbox(&self) -> Option<BBox> {
        self.0.iter().fold(None, |acc, &[x, y]| {
            let point = BBox::new(x, y, x, y);
            Some(match acc {
                None => point,
                Some(bbox) => bbox.union(&point),
            })
        })
    }
}

impl From<Vec<Point>> for Polygon {
    fn from(points: Vec<Point>) -> Self {
        Self(points)
    }
}

/// Axis-aligned envelope serialized as `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BBox {
    /// The all-zero envelope used when nothing carried a valid one.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    /// Creates a new envelope.
    pub const fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Returns the smallest envelope containing both `self` and `other`.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    /// Returns the width of the envelope.
    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    /// Returns the height of the envelope.
    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }
}

impl From<[f64; 4]> for BBox {
    fn from([x1, y1, x2, y2]: [f64; 4]) -> Self {
        Self::new(x1, y1, x2, y2)
    }
}

impl From<BBox> for [f64; 4] {
    fn from(bbox: BBox) -> Self {
        [bbox.x1, bbox.y1, bbox.x2, bbox.y2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_is_clockwise_from_top_left() {
        let polygon = Polygon::rect(0.0, 0.0, 50.0, 10.0);
        assert_eq!(
            polygon.points(),
            &[[0.0, 0.0], [50.0, 0.0], [50.0, 10.0], [0.0, 10.0]]
        );
    }

    #[test]
    fn polygon_bbox() {
        let polygon = Polygon::new(vec![[3.0, 7.0], [1.0, 9.0], [5.0, 2.0]]);
        assert_eq!(polygon.bbox(), Some(BBox::new(1.0, 2.0, 5.0, 9.0)));
        assert_eq!(Polygon::default().bbox(), None);
    }

    #[test]
    fn bbox_serializes_as_array() {
        let bbox = BBox::new(1.0, 2.0, 3.0, 4.0);
        let json = serde_json::to_string(&bbox).unwrap();
        assert_eq!(json, "[1.0,2.0,3.0,4.0]");
        let back: BBox = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bbox);
    }

    #[test]
    fn polygon_serializes_as_nested_arrays() {
        let polygon = Polygon::rect(0.0, 0.0, 1.0, 1.0);
        let json = serde_json::to_value(&polygon).unwrap();
        assert_eq!(
            json,
            serde_json::json!([[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]])
        );
    }
}
