use crate::primitives::{BoundingBox2D, Coordinate2D, SpatialResolution};
use serde::{Deserialize, Serialize};

/// This is a typedef for the `GDAL GeoTransform`. It represents an affine transformation matrix.
pub type GdalGeoTransform = [f64; 6];

/// The `GeoTransform` is a more user friendly representation of the `GDAL GeoTransform` affine transformation matrix.
///
/// Only north-up rasters are representable, i.e. the rotation terms are always zero.
#[derive(Copy, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_coordinate: Coordinate2D,
    pub x_pixel_size: f64,
    pub y_pixel_size: f64,
}

impl GeoTransform {
    /// Generates a new `GeoTransform`
    ///
    /// # Examples
    ///
    /// ```
    /// use orthotile_datatypes::raster::GeoTransform;
    ///
    /// let geo_transform = GeoTransform::new((0.0, 0.0).into(), 1.0, -1.0);
    /// ```
    ///
    pub fn new(origin_coordinate: Coordinate2D, x_pixel_size: f64, y_pixel_size: f64) -> Self {
        Self {
            origin_coordinate,
            x_pixel_size,
            y_pixel_size,
        }
    }

    /// The world coordinate of the upper left corner of pixel (`column`, `row`).
    /// Pixels outside the raster are allowed, e.g. `(width, height)` yields the far corner.
    pub fn pixel_to_coordinate_2d(&self, column: isize, row: isize) -> Coordinate2D {
        let coord_x = self.origin_coordinate.x + (column as f64) * self.x_pixel_size;
        let coord_y = self.origin_coordinate.y + (row as f64) * self.y_pixel_size;
        Coordinate2D::new(coord_x, coord_y)
    }

    /// Transforms an SRS coordinate (x,y) into the fractional pixel position (column, row)
    pub fn coordinate_to_fractional_pixel(&self, coord: Coordinate2D) -> (f64, f64) {
        (
            (coord.x - self.origin_coordinate.x) / self.x_pixel_size,
            (coord.y - self.origin_coordinate.y) / self.y_pixel_size,
        )
    }

    /// Transforms an SRS coordinate (x,y) into the pixel position (column, row) of the nearest pixel corner.
    /// Use this for coordinates that are expected to lie on the pixel grid.
    pub fn coordinate_to_snapped_pixel(&self, coord: Coordinate2D) -> (isize, isize) {
        let (column, row) = self.coordinate_to_fractional_pixel(coord);
        (column.round() as isize, row.round() as isize)
    }

    /// The `GeoTransform` of a window whose upper left pixel is at (`x_offset`, `y_offset`)
    #[must_use]
    pub fn shifted_by_pixels(&self, x_offset: isize, y_offset: isize) -> Self {
        GeoTransform::new(
            self.pixel_to_coordinate_2d(x_offset, y_offset),
            self.x_pixel_size,
            self.y_pixel_size,
        )
    }

    /// The world extent covered by `width` x `height` pixels starting at the origin
    pub fn spatial_bounds(&self, width: usize, height: usize) -> BoundingBox2D {
        let corner_a = self.origin_coordinate;
        let corner_b = self.pixel_to_coordinate_2d(width as isize, height as isize);

        BoundingBox2D::new_unchecked(corner_a.min_elements(corner_b), corner_a.max_elements(corner_b))
    }

    pub fn spatial_resolution(&self) -> SpatialResolution {
        SpatialResolution::new_unchecked(self.x_pixel_size.abs(), self.y_pixel_size.abs())
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        GeoTransform::new(Coordinate2D::new(0.0, 0.0), 1.0, -1.0)
    }
}

/// Drops the rotation terms, callers must reject rotated transforms first
impl From<GdalGeoTransform> for GeoTransform {
    fn from(gdal_geo_transform: GdalGeoTransform) -> Self {
        let [origin_x, x_pixel_size, _, origin_y, _, y_pixel_size] = gdal_geo_transform;
        Self::new(Coordinate2D::new(origin_x, origin_y), x_pixel_size, y_pixel_size)
    }
}

impl From<GeoTransform> for GdalGeoTransform {
    fn from(geo_transform: GeoTransform) -> GdalGeoTransform {
        [
            geo_transform.origin_coordinate.x,
            geo_transform.x_pixel_size,
            0.0,
            geo_transform.origin_coordinate.y,
            0.0,
            geo_transform.y_pixel_size,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geo_transform_pixel_to_coordinate_2d() {
        let geo_transform = GeoTransform::new((5.0, 5.0).into(), 1.0, -1.0);
        assert_eq!(geo_transform.pixel_to_coordinate_2d(0, 0), (5.0, 5.0).into());
        assert_eq!(geo_transform.pixel_to_coordinate_2d(1, 1), (6.0, 4.0).into());
        assert_eq!(geo_transform.pixel_to_coordinate_2d(2, 2), (7.0, 3.0).into());
    }

    #[test]
    fn geo_transform_coordinate_to_snapped_pixel() {
        let geo_transform = GeoTransform::new((5.0, 5.0).into(), 0.5, -0.5);
        assert_eq!(
            geo_transform.coordinate_to_snapped_pixel((5.0, 5.0).into()),
            (0, 0)
        );
        assert_eq!(
            geo_transform.coordinate_to_snapped_pixel((6.000_000_001, 3.999_999_999).into()),
            (2, 2)
        );
    }

    #[test]
    fn shifted_by_pixels_moves_origin() {
        let geo_transform = GeoTransform::new((100.0, 200.0).into(), 0.2, -0.2);
        let shifted = geo_transform.shifted_by_pixels(10, 5);

        assert_eq!(shifted.origin_coordinate, (102.0, 199.0).into());
        assert_eq!(shifted.spatial_resolution(), geo_transform.spatial_resolution());
    }

    #[test]
    fn spatial_bounds_of_north_up_raster() {
        let geo_transform = GeoTransform::new((0.0, 10.0).into(), 2.0, -1.0);
        let bounds = geo_transform.spatial_bounds(3, 4);

        assert_eq!(bounds.upper_left(), (0.0, 10.0).into());
        assert_eq!(bounds.lower_right(), (6.0, 6.0).into());
    }

    #[test]
    fn gdal_geo_transform_of_north_up_raster() {
        let gdal_geo_transform: GdalGeoTransform = [1.0, 0.5, 0.0, 9.0, 0.0, -0.5];
        let geo_transform = GeoTransform::from(gdal_geo_transform);

        assert_eq!(GdalGeoTransform::from(geo_transform), gdal_geo_transform);
    }
}
