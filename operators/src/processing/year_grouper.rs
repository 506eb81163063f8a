use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::mosaic::MosaicAssembler;
use crate::util::Result;

pub const YEAR_GROUP_BLOCK_SIZE: usize = 256;

/// Where the year is found in a fragment name and how the merged rasters are named
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct YearGrouping {
    /// Splits the file stem into fields
    pub separator: char,
    /// 0-based index of the year field
    pub position: usize,
    pub output_prefix: String,
    pub block_size: usize,
}

impl Default for YearGrouping {
    fn default() -> Self {
        Self {
            separator: '-',
            position: 1,
            output_prefix: "mosaic".to_string(),
            block_size: YEAR_GROUP_BLOCK_SIZE,
        }
    }
}

/// Fragment paths by year, plus the paths without a year
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YearGroups {
    pub groups: BTreeMap<u16, Vec<PathBuf>>,
    pub invalid: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YearGroupReport {
    /// Years and the rasters they were merged into
    pub merged: Vec<(u16, PathBuf)>,
    /// Years and the error that stopped their merge
    pub failed: Vec<(u16, String)>,
    /// Fragments without a year in their name
    pub invalid: Vec<PathBuf>,
}

impl YearGroupReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Merges prediction fragments into one raster per year
#[derive(Debug, Clone)]
pub struct YearGrouper {
    grouping: YearGrouping,
    assembler: MosaicAssembler,
}

impl YearGrouper {
    pub fn new(grouping: YearGrouping) -> Result<Self> {
        let assembler = MosaicAssembler::new(grouping.block_size)?;

        Ok(Self {
            grouping,
            assembler,
        })
    }

    pub fn grouping(&self) -> &YearGrouping {
        &self.grouping
    }

    /// The year token of a file name, e.g. `2021` for `paris-2021-0.tif`
    pub fn year_of(&self, path: &Path) -> Option<u16> {
        let stem = path.file_stem()?.to_str()?;
        let token = stem.split(self.grouping.separator).nth(self.grouping.position)?;

        if token.len() == 4 && token.bytes().all(|byte| byte.is_ascii_digit()) {
            token.parse().ok()
        } else {
            None
        }
    }

    pub fn group<P: AsRef<Path>>(&self, paths: &[P]) -> YearGroups {
        let mut year_groups = YearGroups::default();

        for path in paths {
            let path = path.as_ref();

            match self.year_of(path) {
                Some(year) => year_groups
                    .groups
                    .entry(year)
                    .or_default()
                    .push(path.to_path_buf()),
                None => year_groups.invalid.push(path.to_path_buf()),
            }
        }

        for paths in year_groups.groups.values_mut() {
            paths.sort();
        }
        year_groups.invalid.sort();

        year_groups
    }

    /// `{output_dir}/{prefix}_{year}.tif`
    pub fn output_path(&self, output_dir: &Path, year: u16) -> PathBuf {
        output_dir.join(format!("{}_{year:04}.tif", self.grouping.output_prefix))
    }

    /// Merges every year group into its own raster, in ascending year order.
    /// A failing group does not stop the others.
    pub fn merge_by_year<P: AsRef<Path>>(&self, paths: &[P], output_dir: &Path) -> YearGroupReport {
        let YearGroups { groups, invalid } = self.group(paths);

        for path in &invalid {
            warn!("{} has no year in its name and is skipped", path.display());
        }

        let mut report = YearGroupReport {
            invalid,
            ..YearGroupReport::default()
        };

        for (year, fragments) in groups {
            let output_path = self.output_path(output_dir, year);

            info!("Merging {} fragments of {year}", fragments.len());

            match self.assembler.merge(&fragments, &output_path) {
                Ok(()) => report.merged.push((year, output_path)),
                Err(error) => {
                    warn!("Merging the fragments of {year} failed: {error}");
                    report.failed.push((year, error.to_string()));
                }
            }
        }

        report
    }
}
