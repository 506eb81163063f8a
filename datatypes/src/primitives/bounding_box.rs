use super::Coordinate2D;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Serialize, Deserialize, PartialEq, Debug)]
/// The bounding box of a geometry or raster in world coordinates.
/// Note: may degenerate to a point!
pub struct BoundingBox2D {
    lower_left_coordinate: Coordinate2D,
    upper_right_coordinate: Coordinate2D,
}

impl BoundingBox2D {
    /// Creates a bounding box from corners that the caller already put in order
    pub fn new_unchecked(
        lower_left_coordinate: Coordinate2D,
        upper_right_coordinate: Coordinate2D,
    ) -> Self {
        Self {
            lower_left_coordinate,
            upper_right_coordinate,
        }
    }

    pub fn lower_left(&self) -> Coordinate2D {
        self.lower_left_coordinate
    }

    pub fn upper_right(&self) -> Coordinate2D {
        self.upper_right_coordinate
    }

    pub fn upper_left(&self) -> Coordinate2D {
        (self.lower_left_coordinate.x, self.upper_right_coordinate.y).into()
    }

    pub fn lower_right(&self) -> Coordinate2D {
        (self.upper_right_coordinate.x, self.lower_left_coordinate.y).into()
    }

    /// The footprint of the box as a closed polygon
    pub fn to_polygon(&self) -> geo::Polygon<f64> {
        geo::Rect::<f64>::from(self).to_polygon()
    }
}

impl From<&BoundingBox2D> for geo::Rect<f64> {
    fn from(bbox: &BoundingBox2D) -> geo::Rect<f64> {
        geo::Rect::new(bbox.lower_left_coordinate, bbox.upper_right_coordinate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners() {
        let bbox = BoundingBox2D::new_unchecked((1.0, 1.0).into(), (2.0, 3.0).into());

        assert_eq!(bbox.lower_left(), (1.0, 1.0).into());
        assert_eq!(bbox.upper_right(), (2.0, 3.0).into());
        assert_eq!(bbox.upper_left(), (1.0, 3.0).into());
        assert_eq!(bbox.lower_right(), (2.0, 1.0).into());
    }

    #[test]
    fn to_polygon_is_closed_rectangle() {
        let bbox = BoundingBox2D::new_unchecked((0.0, 0.0).into(), (2.0, 1.0).into());
        let polygon = bbox.to_polygon();

        assert_eq!(polygon.exterior().0.len(), 5);
        assert_eq!(polygon.exterior().0.first(), polygon.exterior().0.last());
    }
}
