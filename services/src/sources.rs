use crate::error::{self, Result};
use orthotile_operators::util::files_with_extension;
use serde::Deserialize;
use snafu::{ResultExt, ensure};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const RASTER_EXTENSION: &str = "tif";

/// Where the list of rasters of a batch run comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RasterSource {
    /// A single raster
    File(PathBuf),
    /// All `.tif` files of a folder, sorted by name
    Folder(PathBuf),
    /// A CSV file with the columns `root_folder` and `ortho_name`
    Csv(PathBuf),
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    root_folder: PathBuf,
    ortho_name: String,
}

impl RasterSource {
    pub fn rasters(&self) -> Result<Vec<PathBuf>> {
        match self {
            RasterSource::File(path) => Ok(vec![path.clone()]),
            RasterSource::Folder(dir) => Ok(files_with_extension(dir, RASTER_EXTENSION)?),
            RasterSource::Csv(path) => read_csv(path),
        }
    }

    /// The rasters from position `index_start` on. An index past the end starts from the beginning.
    pub fn rasters_from(&self, index_start: usize) -> Result<Vec<PathBuf>> {
        let mut rasters = self.rasters()?;

        if index_start < rasters.len() {
            rasters.drain(..index_start);
        } else if index_start > 0 {
            warn!(
                "Start index {index_start} is beyond the {} rasters, starting from the first",
                rasters.len()
            );
        }

        Ok(rasters)
    }
}

fn read_csv(path: &Path) -> Result<Vec<PathBuf>> {
    ensure!(path.is_file(), error::MissingRasterSource { path });

    let mut reader = csv::Reader::from_path(path).context(error::Csv { path })?;

    reader
        .deserialize::<CsvRow>()
        .map(|row| -> Result<PathBuf> {
            let row = row.context(error::Csv { path })?;
            Ok(row.root_folder.join(row.ortho_name))
        })
        .collect()
}

/// Whether a path can be processed as a raster
pub fn is_raster_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case(RASTER_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn folder_lists_sorted_rasters() {
        let dir = tempfile::tempdir().unwrap();

        for name in ["b_ortho.tif", "a_ortho.tif", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let source = RasterSource::Folder(dir.path().to_path_buf());

        assert_eq!(
            source.rasters().unwrap(),
            vec![dir.path().join("a_ortho.tif"), dir.path().join("b_ortho.tif")]
        );
        assert_eq!(
            source.rasters_from(1).unwrap(),
            vec![dir.path().join("b_ortho.tif")]
        );
        assert_eq!(source.rasters_from(7).unwrap().len(), 2);
    }

    #[test]
    fn csv_rows() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("rasters.csv");

        std::fs::write(
            &csv,
            "root_folder,ortho_name\n/data/2021,st_paul_ortho.tif\n/data/2022,st_leu_ortho.tif\n",
        )
        .unwrap();

        assert_eq!(
            RasterSource::Csv(csv).rasters().unwrap(),
            vec![
                PathBuf::from("/data/2021/st_paul_ortho.tif"),
                PathBuf::from("/data/2022/st_leu_ortho.tif")
            ]
        );
    }

    #[test]
    fn missing_csv() {
        assert!(matches!(
            RasterSource::Csv(PathBuf::from("/does/not/exist.csv")).rasters(),
            Err(error::Error::MissingRasterSource { .. })
        ));
    }

    #[test]
    fn raster_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.TIF"), b"").unwrap();
        std::fs::write(dir.path().join("a.png"), b"").unwrap();

        assert!(is_raster_file(&dir.path().join("a.TIF")));
        assert!(!is_raster_file(&dir.path().join("a.png")));
        assert!(!is_raster_file(&dir.path().join("missing.tif")));
        assert!(!is_raster_file(dir.path()));
    }
}
