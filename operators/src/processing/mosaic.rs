use num_traits::Zero;
use orthotile_datatypes::call_with_pixel_type;
use orthotile_datatypes::raster::{GeoTransform, Pixel, TileWindow};
use orthotile_datatypes::spatial_reference::SpatialReferenceOption;
use snafu::{ResultExt, ensure};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error;
use crate::util::Result;
use crate::util::gdal::{GeoTiffOptions, RasterHandle, RasterMetadata};

pub const DEFAULT_MERGE_BLOCK_SIZE: usize = 512;
pub const GEOTIFF_BLOCK_ALIGNMENT: usize = 16;

/// Fractional pixel offsets closer than this to a whole pixel count as on the grid
const GRID_TOLERANCE: f64 = 1e-6;

/// Merges raster fragments into one large raster without holding more than two blocks in memory.
///
/// Where fragments overlap the first one in the input order wins: a pixel is only written if it
/// is not background (`> 0`) and the canvas is still background (`== 0`) at that position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MosaicAssembler {
    block_size: usize,
}

impl Default for MosaicAssembler {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_MERGE_BLOCK_SIZE,
        }
    }
}

impl MosaicAssembler {
    pub fn new(block_size: usize) -> Result<Self> {
        ensure!(
            block_size > 0 && block_size % GEOTIFF_BLOCK_ALIGNMENT == 0,
            error::InvalidConfiguration {
                reason: format!(
                    "block size {block_size} is not a positive multiple of {GEOTIFF_BLOCK_ALIGNMENT}"
                )
            }
        );

        Ok(Self { block_size })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Merges `fragment_paths` into a new raster at `output_path`, replacing any existing file.
    pub fn merge<P: AsRef<Path>>(&self, fragment_paths: &[P], output_path: &Path) -> Result<()> {
        let fragments = fragment_paths
            .iter()
            .map(|path| Fragment::read(path.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let layout = MosaicLayout::new(fragments)?;

        info!(
            "Merging {} fragments into {} ({}x{} pixels)",
            layout.placements.len(),
            output_path.display(),
            layout.canvas.width,
            layout.canvas.height
        );
        debug!("Canvas bounds {:?}", layout.canvas.spatial_bounds());

        let data_type = layout.canvas.data_type;
        call_with_pixel_type!(data_type, T => self.merge_typed::<T>(&layout, output_path))
    }

    fn merge_typed<T: Pixel>(&self, layout: &MosaicLayout, output_path: &Path) -> Result<()> {
        let mut writer = MosaicWriter::create::<T>(output_path, &layout.canvas, self.block_size)?;

        for placement in &layout.placements {
            let fragment = RasterHandle::open(&placement.path)?;

            for canvas_block in aligned_sub_blocks(placement.window, self.block_size) {
                let fragment_block = TileWindow::new(
                    canvas_block.x - placement.window.x,
                    canvas_block.y - placement.window.y,
                    canvas_block.width,
                    canvas_block.height,
                );

                let incoming = fragment.read_window::<T>(&fragment_block)?;
                writer.fill_background(&canvas_block, &incoming)?;
            }

            debug!("Merged {}", placement.path.display());
        }

        writer.finish()
    }
}

/// Merges `fragment_paths` into `output_path` using blocks of `block_size` pixels
pub fn merge<P: AsRef<Path>>(fragment_paths: &[P], output_path: &Path, block_size: usize) -> Result<()> {
    MosaicAssembler::new(block_size)?.merge(fragment_paths, output_path)
}

#[derive(Debug, Clone)]
struct Fragment {
    path: PathBuf,
    metadata: RasterMetadata,
}

impl Fragment {
    /// Reads the metadata only, the pixels are read block by block during the merge
    fn read(path: &Path) -> Result<Self> {
        let metadata = RasterHandle::open(path)?.metadata().clone();

        Ok(Self {
            path: path.to_path_buf(),
            metadata,
        })
    }
}

/// Where a fragment lies on the canvas
#[derive(Debug, Clone, PartialEq)]
struct Placement {
    path: PathBuf,
    window: TileWindow,
}

/// The canvas and the placement of every fragment on it, in input order
#[derive(Debug, Clone)]
struct MosaicLayout {
    canvas: RasterMetadata,
    placements: Vec<Placement>,
}

impl MosaicLayout {
    fn new(fragments: Vec<Fragment>) -> Result<Self> {
        let Some(first) = fragments.first() else {
            return error::NoFragments.fail();
        };

        for fragment in &fragments[1..] {
            check_compatibility(&first.metadata, fragment)?;
        }

        let reference = first.metadata.geo_transform;
        let (min_column, min_row) = Self::canvas_offset(reference, &fragments);
        let canvas_transform = reference.shifted_by_pixels(min_column, min_row);

        let placements: Vec<Placement> = fragments
            .iter()
            .map(|fragment| {
                let (x, y) =
                    canvas_transform.coordinate_to_snapped_pixel(fragment.metadata.geo_transform.origin_coordinate);

                Placement {
                    path: fragment.path.clone(),
                    window: TileWindow::new(
                        usize::try_from(x).unwrap_or_default(),
                        usize::try_from(y).unwrap_or_default(),
                        fragment.metadata.width,
                        fragment.metadata.height,
                    ),
                }
            })
            .collect();

        let width = placements.iter().map(|p| p.window.x_end()).max().unwrap_or_default();
        let height = placements.iter().map(|p| p.window.y_end()).max().unwrap_or_default();

        let canvas = RasterMetadata {
            width,
            height,
            no_data_value: Some(0.0),
            geo_transform: canvas_transform,
            ..first.metadata.clone()
        };

        Ok(Self { canvas, placements })
    }

    /// The pixel of the first fragment's grid at which the canvas starts, i.e. the smallest
    /// column and row any fragment origin falls into
    fn canvas_offset(reference: GeoTransform, fragments: &[Fragment]) -> (isize, isize) {
        fragments
            .iter()
            .map(|fragment| {
                let (column, row) =
                    reference.coordinate_to_fractional_pixel(fragment.metadata.geo_transform.origin_coordinate);
                (grid_floor(column), grid_floor(row))
            })
            .fold((0, 0), |(min_column, min_row), (column, row)| {
                (min_column.min(column), min_row.min(row))
            })
    }
}

/// Rounds down to the grid, treating offsets within `GRID_TOLERANCE` of a whole pixel as on it
fn grid_floor(offset: f64) -> isize {
    let nearest = offset.round();

    if (offset - nearest).abs() <= GRID_TOLERANCE {
        nearest as isize
    } else {
        offset.floor() as isize
    }
}

fn check_compatibility(reference: &RasterMetadata, fragment: &Fragment) -> Result<()> {
    let metadata = &fragment.metadata;

    ensure!(
        metadata.band_count == reference.band_count,
        error::IncompatibleFragments {
            path: &fragment.path,
            reason: format!(
                "band count {} differs from {}",
                metadata.band_count, reference.band_count
            ),
        }
    );

    ensure!(
        metadata
            .spatial_resolution()
            .approx_eq(&reference.spatial_resolution()),
        error::IncompatibleFragments {
            path: &fragment.path,
            reason: format!(
                "resolution {:?} differs from {:?}",
                metadata.spatial_resolution(),
                reference.spatial_resolution()
            ),
        }
    );

    ensure!(
        same_orientation(&metadata.geo_transform, &reference.geo_transform),
        error::IncompatibleFragments {
            path: &fragment.path,
            reason: "orientation of the pixel grid differs".to_string(),
        }
    );

    ensure!(
        metadata.same_crs(reference),
        error::IncompatibleFragments {
            path: &fragment.path,
            reason: format!(
                "CRS {} differs from {}",
                crs_name(metadata),
                crs_name(reference)
            ),
        }
    );

    Ok(())
}

fn same_orientation(a: &GeoTransform, b: &GeoTransform) -> bool {
    a.x_pixel_size.is_sign_positive() == b.x_pixel_size.is_sign_positive()
        && a.y_pixel_size.is_sign_positive() == b.y_pixel_size.is_sign_positive()
}

fn crs_name(metadata: &RasterMetadata) -> String {
    match metadata.spatial_reference {
        SpatialReferenceOption::SpatialReference(crs) => crs.to_string(),
        SpatialReferenceOption::Unreferenced => "unreferenced".to_string(),
    }
}

/// Splits `window` along the grid of `block_size` blocks, so that every part lies in one block
fn aligned_sub_blocks(window: TileWindow, block_size: usize) -> Vec<TileWindow> {
    let first_column = window.x / block_size;
    let first_row = window.y / block_size;
    let last_column = (window.x_end() - 1) / block_size;
    let last_row = (window.y_end() - 1) / block_size;

    (first_row..=last_row)
        .flat_map(|row| (first_column..=last_column).map(move |column| (column, row)))
        .filter_map(|(column, row)| {
            TileWindow::new(column * block_size, row * block_size, block_size, block_size)
                .intersection(&window)
        })
        .collect()
}

/// The canvas raster while it is written.
///
/// The raster lives at a temporary path next to the output and only replaces the output in
/// `finish`. Dropping an unfinished writer closes and deletes the temporary file.
struct MosaicWriter {
    // closed before the file guard deletes the file
    canvas: RasterHandle,
    file: PartialOutput,
}

impl MosaicWriter {
    fn create<T: Pixel>(output_path: &Path, canvas: &RasterMetadata, block_size: usize) -> Result<Self> {
        if let Some(parent) = output_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context(error::IoAtPath { path: parent })?;
        }

        let file = PartialOutput::new(output_path);
        let canvas = RasterHandle::create_geotiff::<T>(file.path(), canvas, &GeoTiffOptions::tiled(block_size))?;

        Ok(Self { canvas, file })
    }

    /// Copies pixels of `incoming` that are not background onto canvas pixels that still are
    fn fill_background<T: Pixel>(&mut self, window: &TileWindow, incoming: &[Vec<T>]) -> Result<()> {
        let mut existing = self.canvas.read_window::<T>(window)?;
        let mut changed = false;

        for (existing_band, incoming_band) in existing.iter_mut().zip(incoming) {
            for (existing_value, incoming_value) in existing_band.iter_mut().zip(incoming_band) {
                if *incoming_value > T::zero() && existing_value.is_zero() {
                    *existing_value = *incoming_value;
                    changed = true;
                }
            }
        }

        if changed {
            self.canvas.write_window(window, existing)?;
        }

        Ok(())
    }

    fn finish(self) -> Result<()> {
        let Self { canvas, file } = self;
        let output_path = file.target.clone();

        // flushes and closes the dataset
        drop(canvas);

        file.persist()?;

        info!("Wrote mosaic {}", output_path.display());
        Ok(())
    }
}

/// Deletes a temporary output file on drop unless it was moved to its target
#[derive(Debug)]
struct PartialOutput {
    path: PathBuf,
    target: PathBuf,
    persisted: bool,
}

impl PartialOutput {
    fn new(target: &Path) -> Self {
        let mut file_name = target.file_name().unwrap_or_default().to_os_string();
        file_name.push(".partial");

        Self {
            path: target.with_file_name(file_name),
            target: target.to_path_buf(),
            persisted: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn persist(mut self) -> Result<()> {
        std::fs::rename(&self.path, &self.target).context(error::IoAtPath { path: &self.target })?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        if !self.persisted && self.path.exists() {
            debug!("Removing unfinished mosaic {}", self.path.display());
            if let Err(error) = std::fs::remove_file(&self.path) {
                warn!("Cannot remove unfinished mosaic {}: {error}", self.path.display());
            }
        }
    }
}
