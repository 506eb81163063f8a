use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[snafu(context(suffix(false)))] // disables default `Snafu` suffix
pub enum Error {
    #[snafu(display("Invalid tiling configuration: {}", reason))]
    InvalidConfiguration {
        reason: String,
    },

    #[snafu(display(
        "Raster of {}x{} pixels is smaller than one tile of {}x{} pixels",
        width,
        height,
        tile_size,
        tile_size
    ))]
    RasterTooSmall {
        width: usize,
        height: usize,
        tile_size: usize,
    },

    #[snafu(display("InvalidSpatialReferenceString: {}", spatial_reference_string))]
    InvalidSpatialReferenceString {
        spatial_reference_string: String,
    },

    #[snafu(display("ParseU32: {}", source))]
    ParseU32 {
        source: <u32 as std::str::FromStr>::Err,
    },

    #[snafu(display("GDAL data type {} is not supported", data_type))]
    UnsupportedGdalDataType {
        data_type: String,
    },

    #[snafu(display("Spatial reference has no authority code: {}", source))]
    MissingSpatialReferenceAuthority {
        source: gdal::errors::GdalError,
    },
}
