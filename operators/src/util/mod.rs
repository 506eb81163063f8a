pub mod gdal;
pub mod rayon;

use crate::error::{self, Error};
use snafu::ResultExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Get a lock for mutex and recover from poisoning
pub fn safe_lock_mutex<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// The files in `dir` with the given extension (ignoring case), sorted by path
pub fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir).context(error::IoAtPath { path: dir })? {
        let path = entry.context(error::IoAtPath { path: dir })?.path();

        if path.is_file()
            && path
                .extension()
                .is_some_and(|path_extension| path_extension.eq_ignore_ascii_case(extension))
        {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_files_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        for name in ["b.tif", "a.TIF", "c.png", "d.tif.partial"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("e.tif")).unwrap();

        assert_eq!(
            files_with_extension(dir.path(), "tif").unwrap(),
            vec![dir.path().join("a.TIF"), dir.path().join("b.tif")]
        );
        assert!(files_with_extension(&dir.path().join("missing"), "tif").is_err());
    }
}
