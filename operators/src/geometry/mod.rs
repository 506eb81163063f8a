mod filter;
mod polygon_set;

pub use filter::{GeometryFilter, PreparedGeometryFilter};
pub use polygon_set::{PolygonRole, ReferencePolygonSet, SpatialPredicate};
