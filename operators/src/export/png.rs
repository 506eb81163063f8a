use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use num_traits::AsPrimitive;
use orthotile_datatypes::call_with_pixel_type;
use orthotile_datatypes::raster::{Pixel, TileWindow};
use rayon::prelude::*;
use snafu::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error;
use crate::util::gdal::RasterHandle;
use crate::util::rayon::create_rayon_thread_pool;
use crate::util::{Result, files_with_extension};

const TILE_EXTENSION: &str = "tif";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub converted: Vec<PathBuf>,
    /// Tiles that could not be converted, with the reason
    pub failed: Vec<(PathBuf, String)>,
}

impl ExportReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Converts every GeoTIFF tile in `input_dir` into `{stem}.png` in `output_dir`.
///
/// Tiles with three or more bands become RGB images of their first three bands, all others
/// greyscale images of their first band. A tile that cannot be converted does not stop the others.
pub fn convert_tiles_to_png(input_dir: &Path, output_dir: &Path, workers: usize) -> Result<ExportReport> {
    let tiles = files_with_extension(input_dir, TILE_EXTENSION)?;
    std::fs::create_dir_all(output_dir).context(error::IoAtPath { path: output_dir })?;

    let pool = create_rayon_thread_pool(workers)?;

    let results: Vec<(PathBuf, Result<PathBuf>)> = pool.install(|| {
        tiles
            .par_iter()
            .map(|tile| (tile.clone(), convert_tile_to_png(tile, output_dir)))
            .collect()
    });

    let mut report = ExportReport::default();

    for (tile, result) in results {
        match result {
            Ok(png) => report.converted.push(png),
            Err(error) => {
                warn!("Cannot convert {} to PNG: {error}", tile.display());
                report.failed.push((tile, error.to_string()));
            }
        }
    }

    info!(
        "Converted {} tiles of {} to PNG, {} failed",
        report.converted.len(),
        input_dir.display(),
        report.failed.len()
    );

    Ok(report)
}

/// Writes `{stem}.png` for one tile and returns its path
pub fn convert_tile_to_png(tile: &Path, output_dir: &Path) -> Result<PathBuf> {
    let raster = RasterHandle::open(tile)?;

    let mut file_name = tile.file_stem().unwrap_or_default().to_os_string();
    file_name.push(".png");
    let png_path = output_dir.join(file_name);

    let data_type = raster.metadata().data_type;
    let image = call_with_pixel_type!(data_type, T => to_image::<T>(&raster))?;

    image
        .save_with_format(&png_path, ImageFormat::Png)
        .context(error::Image { path: &png_path })?;

    Ok(png_path)
}

fn to_image<T: Pixel>(raster: &RasterHandle) -> Result<DynamicImage> {
    let metadata = raster.metadata();
    let window = TileWindow::new(0, 0, metadata.width, metadata.height);

    let buffer_error = error::ImageBuffer {
        width: metadata.width,
        height: metadata.height,
    };

    let (Ok(width), Ok(height)) = (u32::try_from(metadata.width), u32::try_from(metadata.height)) else {
        return buffer_error.fail();
    };

    if metadata.band_count >= 3 {
        let bands = (1..=3)
            .map(|band_index| raster.read_band_window::<T>(band_index, &window))
            .collect::<Result<Vec<_>>>()?;

        let interleaved: Vec<u8> = (0..window.number_of_pixels())
            .flat_map(|pixel| bands.iter().map(move |band| saturating_u8(band[pixel])))
            .collect();

        RgbImage::from_raw(width, height, interleaved)
            .map(DynamicImage::ImageRgb8)
            .context(buffer_error)
    } else {
        let band = raster.read_band_window::<T>(1, &window)?;

        GrayImage::from_raw(width, height, band.into_iter().map(saturating_u8).collect())
            .map(DynamicImage::ImageLuma8)
            .context(buffer_error)
    }
}

/// Clamps to `0..=255`, NaN becomes 0
fn saturating_u8<T: Pixel>(value: T) -> u8 {
    let value: f64 = value.as_();
    value as u8
}
