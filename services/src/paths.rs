use crate::error::{self, Result};
use crate::sources::RASTER_EXTENSION;
use orthotile_operators::util::files_with_extension;
use snafu::ResultExt;
use std::path::{Path, PathBuf};
use tracing::debug;

const TILES_TIF_DIR: &str = "tiles_tif";
const TILES_PNG_DIR: &str = "tiles_png";
const PREDICTIONS_TIF_DIR: &str = "predictions_tif";
const MOSAIC_DIR: &str = "mosaic";
const PNG_EXTENSION: &str = "png";

/// The output directories of one raster: `{output}/{raster_stem}/{tiles_tif, tiles_png, predictions_tif, mosaic}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterPaths {
    stem: String,
    root: PathBuf,
}

impl RasterPaths {
    pub fn new(output_dir: &Path, raster: &Path) -> Self {
        let stem = raster
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            root: output_dir.join(&stem),
            stem,
        }
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tiles_tif(&self) -> PathBuf {
        self.root.join(TILES_TIF_DIR)
    }

    pub fn tiles_png(&self) -> PathBuf {
        self.root.join(TILES_PNG_DIR)
    }

    pub fn predictions_tif(&self) -> PathBuf {
        self.root.join(PREDICTIONS_TIF_DIR)
    }

    pub fn mosaic(&self) -> PathBuf {
        self.root.join(MOSAIC_DIR)
    }

    /// Where the merged predictions of the raster are written
    pub fn prediction_mosaic(&self) -> PathBuf {
        self.mosaic().join(format!("{}_prediction.tif", self.stem))
    }

    fn directories(&self) -> [PathBuf; 4] {
        [
            self.tiles_tif(),
            self.tiles_png(),
            self.predictions_tif(),
            self.mosaic(),
        ]
    }

    /// Creates all directories that do not exist yet
    pub fn create(&self) -> Result<()> {
        for dir in self.directories() {
            std::fs::create_dir_all(&dir).context(error::Io { path: &dir })?;
        }

        Ok(())
    }

    /// Deletes everything below the raster's output directory and recreates the layout
    pub fn clean(&self) -> Result<()> {
        if self.root.exists() {
            debug!("Deleting {}", self.root.display());
            std::fs::remove_dir_all(&self.root).context(error::Io { path: &self.root })?;
        }

        self.create()
    }

    /// Whether no GeoTIFF tile has been extracted yet
    pub fn is_empty_tiles_tif(&self) -> bool {
        has_no_files(&self.tiles_tif(), RASTER_EXTENSION)
    }

    pub fn is_empty_tiles_png(&self) -> bool {
        has_no_files(&self.tiles_png(), PNG_EXTENSION)
    }
}

/// Missing directories count as empty, other entries than files with `extension` are ignored
fn has_no_files(dir: &Path, extension: &str) -> bool {
    files_with_extension(dir, extension).map_or(true, |files| files.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn layout() {
        let paths = RasterPaths::new(Path::new("/out"), Path::new("/data/reunion_2022_ortho.tif"));

        assert_eq!(paths.stem(), "reunion_2022_ortho");
        assert_eq!(paths.tiles_tif(), Path::new("/out/reunion_2022_ortho/tiles_tif"));
        assert_eq!(paths.tiles_png(), Path::new("/out/reunion_2022_ortho/tiles_png"));
        assert_eq!(
            paths.predictions_tif(),
            Path::new("/out/reunion_2022_ortho/predictions_tif")
        );
        assert_eq!(
            paths.prediction_mosaic(),
            Path::new("/out/reunion_2022_ortho/mosaic/reunion_2022_ortho_prediction.tif")
        );
    }

    #[test]
    fn create_and_clean() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RasterPaths::new(dir.path(), Path::new("raster.tif"));

        assert!(paths.is_empty_tiles_tif());

        paths.create().unwrap();
        assert!(paths.tiles_tif().is_dir());
        assert!(paths.mosaic().is_dir());
        assert!(paths.is_empty_tiles_tif());

        // only tiles count
        std::fs::create_dir(paths.tiles_tif().join("raster_5_5.tif")).unwrap();
        std::fs::write(paths.tiles_tif().join("raster_0_0.tif.aux.xml"), b"<PAMDataset/>").unwrap();
        assert!(paths.is_empty_tiles_tif());

        std::fs::write(paths.tiles_tif().join("raster_0_0.tif"), b"tile").unwrap();
        assert!(!paths.is_empty_tiles_tif());
        assert!(paths.is_empty_tiles_png());

        // creating again keeps existing files
        paths.create().unwrap();
        assert!(!paths.is_empty_tiles_tif());

        paths.clean().unwrap();
        assert!(paths.is_empty_tiles_tif());
        assert!(paths.predictions_tif().is_dir());
    }
}
