mod bounding_box;
mod coordinate;
mod spatial_resolution;

pub use bounding_box::BoundingBox2D;
pub use coordinate::Coordinate2D;
pub use spatial_resolution::SpatialResolution;

/// Types that have a spatial extent in world coordinates
pub trait SpatialBounded {
    fn spatial_bounds(&self) -> BoundingBox2D;
}
