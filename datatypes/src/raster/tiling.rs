use crate::error;
use crate::primitives::{BoundingBox2D, SpatialBounded};
use crate::util::Result;

use super::GeoTransform;

use serde::{Deserialize, Serialize};
use snafu::ensure;
use std::collections::HashSet;

/// A rectangular pixel region of a raster, addressed by its upper left pixel.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileWindow {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl TileWindow {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The pixel column right of the window
    pub fn x_end(&self) -> usize {
        self.x + self.width
    }

    /// The pixel row below the window
    pub fn y_end(&self) -> usize {
        self.y + self.height
    }

    pub fn number_of_pixels(&self) -> usize {
        self.width * self.height
    }

    /// `(x, y)` in the form the GDAL raster io calls expect
    pub fn gdal_offset(&self) -> (isize, isize) {
        (self.x as isize, self.y as isize)
    }

    /// `(width, height)` in the form the GDAL raster io calls expect
    pub fn gdal_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn contains_pixel(&self, x: usize, y: usize) -> bool {
        x >= self.x && x < self.x_end() && y >= self.y && y < self.y_end()
    }

    /// The overlap of both windows or `None` if they share no pixel
    pub fn intersection(&self, other: &TileWindow) -> Option<TileWindow> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let x_end = self.x_end().min(other.x_end());
        let y_end = self.y_end().min(other.y_end());

        if x < x_end && y < y_end {
            Some(TileWindow::new(x, y, x_end - x, y_end - y))
        } else {
            None
        }
    }
}

/// A `TileWindow` together with the affine mapping of its source raster.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoWindow {
    pub window: TileWindow,
    pub source_geo_transform: GeoTransform,
}

impl GeoWindow {
    pub fn new(window: TileWindow, source_geo_transform: GeoTransform) -> Self {
        Self {
            window,
            source_geo_transform,
        }
    }

    /// The transform of the tile when it is written as a raster of its own
    pub fn tile_geo_transform(&self) -> GeoTransform {
        let (x, y) = self.window.gdal_offset();
        self.source_geo_transform.shifted_by_pixels(x, y)
    }

    /// The footprint of the window in world coordinates of the source CRS
    pub fn footprint(&self) -> geo::Polygon<f64> {
        self.spatial_bounds().to_polygon()
    }
}

impl SpatialBounded for GeoWindow {
    fn spatial_bounds(&self) -> BoundingBox2D {
        self.tile_geo_transform()
            .spatial_bounds(self.window.width, self.window.height)
    }
}

/// Tile size and overlaps of a tiling. The strides are derived as `floor(size * (1 - overlap))`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct TilingParameters {
    tile_size: usize,
    horizontal_overlap: f64,
    vertical_overlap: f64,
    horizontal_stride: usize,
    vertical_stride: usize,
}

impl TilingParameters {
    /// Validates the parameters and derives the strides.
    ///
    /// # Errors
    ///
    /// Fails if the tile size is zero, an overlap is not within `[0, 1)` or a
    /// derived stride would be zero.
    ///
    pub fn new(tile_size: usize, horizontal_overlap: f64, vertical_overlap: f64) -> Result<Self> {
        ensure!(
            tile_size > 0,
            error::InvalidConfiguration {
                reason: "tile size must be positive"
            }
        );

        for (name, overlap) in [
            ("horizontal", horizontal_overlap),
            ("vertical", vertical_overlap),
        ] {
            ensure!(
                (0.0..1.0).contains(&overlap),
                error::InvalidConfiguration {
                    reason: format!("{name} overlap {overlap} is not within [0, 1)")
                }
            );
        }

        let horizontal_stride = stride(tile_size, horizontal_overlap);
        let vertical_stride = stride(tile_size, vertical_overlap);

        ensure!(
            horizontal_stride >= 1 && vertical_stride >= 1,
            error::InvalidConfiguration {
                reason: format!(
                    "tile size {tile_size} with overlaps ({horizontal_overlap}, {vertical_overlap}) results in a zero stride"
                )
            }
        );

        Ok(Self {
            tile_size,
            horizontal_overlap,
            vertical_overlap,
            horizontal_stride,
            vertical_stride,
        })
    }

    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    pub fn horizontal_overlap(&self) -> f64 {
        self.horizontal_overlap
    }

    pub fn vertical_overlap(&self) -> f64 {
        self.vertical_overlap
    }

    pub fn horizontal_stride(&self) -> usize {
        self.horizontal_stride
    }

    pub fn vertical_stride(&self) -> usize {
        self.vertical_stride
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn stride(tile_size: usize, overlap: f64) -> usize {
    (tile_size as f64 * (1.0 - overlap)).floor() as usize
}

/// Computes the grid of overlapping tile windows of a raster.
///
/// Origins advance by the stride while they are inside the raster. A window that would
/// exceed the raster is shifted back so that it ends at the raster border. The last
/// row and column therefore overlap their neighbours more than configured, and several
/// origins may clamp to the same window.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TileIndexer {
    parameters: TilingParameters,
    raster_width: usize,
    raster_height: usize,
}

impl TileIndexer {
    /// # Errors
    ///
    /// Fails with `RasterTooSmall` if the raster cannot hold a single tile.
    ///
    pub fn new(
        parameters: TilingParameters,
        raster_width: usize,
        raster_height: usize,
    ) -> Result<Self> {
        ensure!(
            raster_width >= parameters.tile_size && raster_height >= parameters.tile_size,
            error::RasterTooSmall {
                width: raster_width,
                height: raster_height,
                tile_size: parameters.tile_size,
            }
        );

        Ok(Self {
            parameters,
            raster_width,
            raster_height,
        })
    }

    pub fn parameters(&self) -> &TilingParameters {
        &self.parameters
    }

    /// Clamped origins along one axis, in ascending order
    fn origins(extent: usize, stride: usize, tile_size: usize) -> impl Iterator<Item = usize> {
        (0..extent)
            .step_by(stride)
            .map(move |origin| origin.min(extent - tile_size))
    }

    /// All windows, row by row, duplicates included
    pub fn windows(&self) -> impl Iterator<Item = TileWindow> + '_ {
        let tile_size = self.parameters.tile_size;

        Self::origins(
            self.raster_height,
            self.parameters.vertical_stride,
            tile_size,
        )
        .flat_map(move |y| {
            Self::origins(
                self.raster_width,
                self.parameters.horizontal_stride,
                tile_size,
            )
            .map(move |x| TileWindow::new(x, y, tile_size, tile_size))
        })
    }

    /// All windows, row by row, each distinct window once
    pub fn unique_windows(&self) -> Vec<TileWindow> {
        let mut seen = HashSet::new();
        self.windows().filter(|window| seen.insert(*window)).collect()
    }

    /// The number of windows `windows` yields
    pub fn number_of_windows(&self) -> usize {
        self.raster_width.div_ceil(self.parameters.horizontal_stride)
            * self.raster_height.div_ceil(self.parameters.vertical_stride)
    }
}
