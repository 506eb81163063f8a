use orthotile_datatypes::spatial_reference::SpatialReference;
use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[snafu(context(suffix(false)))] // disables default `Snafu` suffix
pub enum Error {
    #[snafu(display("DataTypeError: {}", source))]
    DataType {
        source: orthotile_datatypes::error::Error,
    },

    #[snafu(display("GdalError: {}", source))]
    Gdal {
        source: gdal::errors::GdalError,
    },

    #[snafu(display("Could not open raster {}: {}", path.display(), source))]
    CouldNotOpenRaster {
        path: PathBuf,
        source: gdal::errors::GdalError,
    },

    #[snafu(display("IOError: {}", source))]
    Io {
        source: std::io::Error,
    },

    #[snafu(display("IOError at {}: {}", path.display(), source))]
    IoAtPath {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Invalid configuration: {}", reason))]
    InvalidConfiguration {
        reason: String,
    },

    #[snafu(display("Raster {} has a rotated geo transform, only north-up rasters are supported", path.display()))]
    RotatedGeoTransform {
        path: PathBuf,
    },

    #[snafu(display(
        "Raster {} has no CRS with an authority code that GDAL can identify, so the reference polygons cannot be projected onto it. Assign an EPSG code to the raster",
        path.display()
    ))]
    UnreferencedRaster {
        path: PathBuf,
    },

    #[snafu(display("Cannot read GeoJSON file {}: {}", path.display(), source))]
    GeoJson {
        path: PathBuf,
        source: geojson::Error,
    },

    #[snafu(display("Cannot create a projection from {} to {}: {}", from, to, source))]
    ProjCreate {
        from: SpatialReference,
        to: SpatialReference,
        source: proj::ProjCreateError,
    },

    #[snafu(display("Cannot project from {} to {}: {}", from, to, source))]
    Proj {
        from: SpatialReference,
        to: SpatialReference,
        source: proj::ProjError,
    },

    #[snafu(display("There are no fragments to merge"))]
    NoFragments,

    #[snafu(display("Fragment {} is incompatible: {}", path.display(), reason))]
    IncompatibleFragments {
        path: PathBuf,
        reason: String,
    },

    #[snafu(display("Cannot build the worker pool: {}", source))]
    ThreadPool {
        source: rayon::ThreadPoolBuildError,
    },

    #[snafu(display("Cannot write image {}: {}", path.display(), source))]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },

    #[snafu(display("Image buffer of {}x{} pixels does not match its data", width, height))]
    ImageBuffer {
        width: usize,
        height: usize,
    },
}

impl From<orthotile_datatypes::error::Error> for Error {
    fn from(datatype_error: orthotile_datatypes::error::Error) -> Self {
        Self::DataType {
            source: datatype_error,
        }
    }
}

impl From<gdal::errors::GdalError> for Error {
    fn from(gdal_error: gdal::errors::GdalError) -> Self {
        Self::Gdal { source: gdal_error }
    }
}

impl From<std::io::Error> for Error {
    fn from(io_error: std::io::Error) -> Self {
        Self::Io { source: io_error }
    }
}

impl Error {
    /// Whether the raster was too small to hold a single tile
    pub fn is_raster_too_small(&self) -> bool {
        matches!(
            self,
            Error::DataType {
                source: orthotile_datatypes::error::Error::RasterTooSmall { .. }
            }
        )
    }
}
