mod data_type;
mod geo_transform;
mod tiling;

pub use self::data_type::{Pixel, RasterDataType, StaticRasterDataType};
pub use self::geo_transform::{GdalGeoTransform, GeoTransform};
pub use self::tiling::{GeoWindow, TileIndexer, TileWindow, TilingParameters};
