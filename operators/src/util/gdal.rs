use gdal::cpl::CslStringList;
use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DatasetOptions, DriverManager, GdalOpenFlags};
use orthotile_datatypes::primitives::{BoundingBox2D, SpatialResolution};
use orthotile_datatypes::raster::{GdalGeoTransform, GeoTransform, Pixel, RasterDataType, TileWindow};
use orthotile_datatypes::spatial_reference::{SpatialReference, SpatialReferenceOption};
use snafu::{ResultExt, ensure};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error;
use crate::util::Result;

const GEOTIFF_DRIVER: &str = "GTiff";
const COMPRESSION_FORMAT: &str = "LZW";

/// Opens a Gdal Dataset with the given `path` and `dataset_options`.
pub fn gdal_open_dataset_ex(path: &Path, dataset_options: DatasetOptions) -> Result<Dataset> {
    #[cfg(debug_assertions)]
    let dataset_options = {
        let mut dataset_options = dataset_options;
        dataset_options.open_flags |= GdalOpenFlags::GDAL_OF_VERBOSE_ERROR;
        dataset_options
    };

    Dataset::open_ex(path, dataset_options).context(error::CouldNotOpenRaster { path })
}

/// Everything the engine needs to know about a raster without reading its pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterMetadata {
    pub width: usize,
    pub height: usize,
    pub band_count: usize,
    pub data_type: RasterDataType,
    pub no_data_value: Option<f64>,
    pub spatial_reference: SpatialReferenceOption,
    /// The CRS definition as stored in the file, empty for unreferenced rasters
    pub projection_wkt: String,
    pub geo_transform: GeoTransform,
}

impl RasterMetadata {
    pub fn spatial_bounds(&self) -> BoundingBox2D {
        self.geo_transform.spatial_bounds(self.width, self.height)
    }

    pub fn spatial_resolution(&self) -> SpatialResolution {
        self.geo_transform.spatial_resolution()
    }

    /// Whether the raster carries any CRS definition at all
    pub fn has_projection(&self) -> bool {
        !self.projection_wkt.trim().is_empty()
    }

    /// Two rasters share a CRS if their identities match or, lacking an identity, their definitions do
    pub fn same_crs(&self, other: &RasterMetadata) -> bool {
        match (self.spatial_reference, other.spatial_reference) {
            (SpatialReferenceOption::Unreferenced, SpatialReferenceOption::Unreferenced) => {
                self.projection_wkt == other.projection_wkt
            }
            (a, b) => a == b,
        }
    }

    /// The metadata of a `window` of this raster when written as a raster of its own
    #[must_use]
    pub fn for_window(&self, window: &TileWindow) -> Self {
        let (x, y) = window.gdal_offset();

        Self {
            width: window.width,
            height: window.height,
            geo_transform: self.geo_transform.shifted_by_pixels(x, y),
            ..self.clone()
        }
    }

    #[allow(clippy::float_cmp)]
    fn from_dataset(path: &Path, dataset: &Dataset) -> Result<Self> {
        let (width, height) = dataset.raster_size();
        let band_count = dataset.raster_count();

        ensure!(
            band_count > 0,
            error::InvalidConfiguration {
                reason: format!("raster {} has no bands", path.display())
            }
        );

        let first_band = dataset.rasterband(1)?;
        let data_type = RasterDataType::try_from(first_band.band_type())?;
        let no_data_value = first_band.no_data_value();

        // rasters without a transform get the GDAL default, which is a valid north-up transform
        let gdal_geo_transform: GdalGeoTransform = dataset
            .geo_transform()
            .unwrap_or([0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);

        ensure!(
            gdal_geo_transform[2] == 0.0 && gdal_geo_transform[4] == 0.0,
            error::RotatedGeoTransform { path }
        );

        let projection_wkt = dataset.projection();
        let spatial_reference = identify_spatial_reference(path, &projection_wkt);

        Ok(Self {
            width,
            height,
            band_count,
            data_type,
            no_data_value,
            spatial_reference,
            projection_wkt,
            geo_transform: gdal_geo_transform.into(),
        })
    }
}

/// Resolves the authority and code of a WKT definition, asking GDAL to identify it if the
/// definition does not state them.
fn identify_spatial_reference(path: &Path, projection_wkt: &str) -> SpatialReferenceOption {
    if projection_wkt.trim().is_empty() {
        return SpatialReferenceOption::Unreferenced;
    }

    let Ok(mut spatial_ref) = SpatialRef::from_wkt(projection_wkt) else {
        debug!("GDAL cannot parse the CRS of {}", path.display());
        return SpatialReferenceOption::Unreferenced;
    };

    if let Ok(spatial_reference) = SpatialReference::try_from(&spatial_ref) {
        return spatial_reference.into();
    }

    if spatial_ref.auto_identify_epsg().is_ok() {
        if let Ok(spatial_reference) = SpatialReference::try_from(&spatial_ref) {
            return spatial_reference.into();
        }
    }

    warn!(
        "CRS of {} has no authority code, the raster is treated as unreferenced",
        path.display()
    );
    SpatialReferenceOption::Unreferenced
}

/// GeoTIFF creation options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeoTiffOptions {
    pub compress: bool,
    /// Block size of a tiled layout, `None` for strips
    pub block_size: Option<usize>,
    pub big_tiff_if_safer: bool,
}

impl GeoTiffOptions {
    /// Options for small tile files
    pub fn tile() -> Self {
        Self {
            compress: true,
            block_size: None,
            big_tiff_if_safer: false,
        }
    }

    /// Options for large tiled rasters that are written block by block
    pub fn tiled(block_size: usize) -> Self {
        Self {
            compress: true,
            block_size: Some(block_size),
            big_tiff_if_safer: true,
        }
    }
}

fn create_gdal_tiff_options(options: &GeoTiffOptions) -> Result<CslStringList> {
    let mut gdal_options = CslStringList::new();

    if options.compress {
        gdal_options.add_string(&format!("COMPRESS={COMPRESSION_FORMAT}"))?;
    }

    if let Some(block_size) = options.block_size {
        gdal_options.add_string("TILED=YES")?;
        gdal_options.add_string(&format!("BLOCKXSIZE={block_size}"))?;
        gdal_options.add_string(&format!("BLOCKYSIZE={block_size}"))?;
    }

    if options.big_tiff_if_safer {
        gdal_options.add_string("BIGTIFF=IF_SAFER")?;
    }

    Ok(gdal_options)
}

/// An open raster together with its metadata.
///
/// Handles are not shared between threads: every worker opens its own.
#[derive(Debug)]
pub struct RasterHandle {
    path: PathBuf,
    dataset: Dataset,
    metadata: RasterMetadata,
}

impl RasterHandle {
    /// Opens a raster read-only
    pub fn open(path: &Path) -> Result<Self> {
        let dataset = gdal_open_dataset_ex(
            path,
            DatasetOptions {
                open_flags: GdalOpenFlags::GDAL_OF_RASTER | GdalOpenFlags::GDAL_OF_READONLY,
                ..DatasetOptions::default()
            },
        )?;

        let metadata = RasterMetadata::from_dataset(path, &dataset)?;

        Ok(Self {
            path: path.to_path_buf(),
            dataset,
            metadata,
        })
    }

    /// Creates (or overwrites) a GeoTIFF with pixel type `T` that carries the given metadata.
    /// The data type of `metadata` is ignored in favor of `T`.
    pub fn create_geotiff<T: Pixel>(
        path: &Path,
        metadata: &RasterMetadata,
        options: &GeoTiffOptions,
    ) -> Result<Self> {
        let driver = DriverManager::get_driver_by_name(GEOTIFF_DRIVER)?;
        let gdal_options = create_gdal_tiff_options(options)?;

        let mut dataset = driver.create_with_band_type_with_options::<T, _>(
            path,
            metadata.width,
            metadata.height,
            metadata.band_count,
            &gdal_options,
        )?;

        dataset.set_geo_transform(&metadata.geo_transform.into())?;

        if metadata.has_projection() {
            dataset.set_projection(&metadata.projection_wkt)?;
        }

        for band_index in 1..=metadata.band_count {
            dataset
                .rasterband(band_index)?
                .set_no_data_value(metadata.no_data_value)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            dataset,
            metadata: RasterMetadata {
                data_type: T::TYPE,
                ..metadata.clone()
            },
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &RasterMetadata {
        &self.metadata
    }

    /// Reads `window` of band `band_index` (1-based), converting pixels to `T`
    pub fn read_band_window<T: Pixel>(&self, band_index: usize, window: &TileWindow) -> Result<Vec<T>> {
        let band = self.dataset.rasterband(band_index)?;
        let buffer =
            band.read_as::<T>(window.gdal_offset(), window.gdal_size(), window.gdal_size(), None)?;

        Ok(buffer.into_iter().collect())
    }

    /// Reads `window` of every band, row-major per band
    pub fn read_window<T: Pixel>(&self, window: &TileWindow) -> Result<Vec<Vec<T>>> {
        (1..=self.metadata.band_count)
            .map(|band_index| self.read_band_window(band_index, window))
            .collect()
    }

    /// Writes `data` into `window` of band `band_index` (1-based)
    pub fn write_band_window<T: Pixel>(
        &mut self,
        band_index: usize,
        window: &TileWindow,
        data: Vec<T>,
    ) -> Result<()> {
        ensure!(
            data.len() == window.number_of_pixels(),
            error::InvalidConfiguration {
                reason: format!(
                    "{} values do not fill a window of {}x{} pixels",
                    data.len(),
                    window.width,
                    window.height
                )
            }
        );

        let mut band = self.dataset.rasterband(band_index)?;
        let mut buffer = Buffer::new(window.gdal_size(), data);

        band.write(window.gdal_offset(), window.gdal_size(), &mut buffer)?;

        Ok(())
    }

    /// Writes one buffer per band into `window`
    pub fn write_window<T: Pixel>(&mut self, window: &TileWindow, bands: Vec<Vec<T>>) -> Result<()> {
        ensure!(
            bands.len() == self.metadata.band_count,
            error::InvalidConfiguration {
                reason: format!(
                    "{} bands cannot be written to a raster with {} bands",
                    bands.len(),
                    self.metadata.band_count
                )
            }
        );

        for (band_index, data) in (1..).zip(bands) {
            self.write_band_window(band_index, window, data)?;
        }

        Ok(())
    }
}

/// Reroutes GDAL's CPL error messages to `tracing`
pub fn reroute_gdal_logging() {
    gdal::config::set_error_handler(|error_type, error_num, message| {
        let message = format!("GDAL {error_num}: {message}");
        match error_type {
            gdal::errors::CplErrType::None => {
                // should never log anything
            }
            gdal::errors::CplErrType::Debug => tracing::debug!("{}", message),
            gdal::errors::CplErrType::Warning => tracing::warn!("{}", message),
            gdal::errors::CplErrType::Failure | gdal::errors::CplErrType::Fatal => {
                tracing::error!("{}", message);
            }
        }
    });
}
