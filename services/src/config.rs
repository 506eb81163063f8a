use crate::error::{self, Result};
use config::{Config, Environment, File};
use orthotile_datatypes::raster::TilingParameters;
use orthotile_operators::geometry::{GeometryFilter, PolygonRole};
use orthotile_operators::processing::{
    ContentFilter, ContentThresholds, DEFAULT_MERGE_BLOCK_SIZE, DEFAULT_PROGRESS_INTERVAL,
    DEFAULT_SOURCE_SUFFIX, ExtractorConfig, YEAR_GROUP_BLOCK_SIZE, YearGrouping,
};
use orthotile_operators::util::rayon::{DEFAULT_RESERVED_CORES, default_worker_count};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use snafu::ResultExt;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};

static SETTINGS: LazyLock<RwLock<Result<Config, String>>> = LazyLock::new(init_settings);

fn init_settings() -> RwLock<Result<Config, String>> {
    RwLock::new(build_settings().map_err(|error| error.to_string()))
}

fn build_settings() -> Result<Config> {
    let mut settings = Config::builder();

    let dir: PathBuf = retrieve_settings_dir()?;

    #[cfg(test)]
    let files = ["Settings-default.toml", "Settings-test.toml"];

    #[cfg(not(test))]
    let files = ["Settings-default.toml", "Settings.toml"];

    let files: Vec<File<_, _>> = files
        .iter()
        .map(|f| dir.join(f))
        .filter(|p| p.exists())
        .map(File::from)
        .collect();

    settings = settings.add_source(files);

    // Override config with environment variables that start with `ORTHOTILE__`,
    // e.g. `ORTHOTILE__TILING__TILE_SIZE=512`
    // Note: Since variables contain underscores, we need to use something different
    // for separating groups, for instance double underscores `__`
    settings = settings.add_source(Environment::with_prefix("orthotile").separator("__"));

    settings.build().context(error::Config)
}

/// test may run in subdirectory
#[cfg(test)]
fn retrieve_settings_dir() -> Result<PathBuf> {
    use crate::error::Error;

    const MAX_PARENT_DIRS: usize = 1;

    let mut settings_dir = std::env::current_dir().context(error::MissingWorkingDirectory)?;

    for _ in 0..=MAX_PARENT_DIRS {
        if settings_dir.join("Settings-default.toml").exists() {
            return Ok(settings_dir);
        }

        // go to parent directory
        if !settings_dir.pop() {
            break;
        }
    }

    Err(Error::MissingSettingsDirectory)
}

#[cfg(not(test))]
fn retrieve_settings_dir() -> Result<PathBuf> {
    std::env::current_dir().context(error::MissingWorkingDirectory)
}

#[cfg(test)]
pub fn set_config<T>(key: &str, value: T) -> Result<()>
where
    T: Into<config::Value>,
{
    let mut settings = SETTINGS
        .write()
        .map_err(|_error| error::Error::ConfigLockFailed)?;

    let current = settings
        .as_ref()
        .map_err(|reason| error::Error::InvalidSettings {
            reason: reason.clone(),
        })?;

    let builder = Config::builder()
        .add_source(current.clone())
        .set_override(key, value)
        .context(error::Config)?;

    *settings = Ok(builder.build().context(error::Config)?);
    Ok(())
}

pub fn get_config<T>(key: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let settings = SETTINGS
        .read()
        .map_err(|_error| error::Error::ConfigLockFailed)?;

    settings
        .as_ref()
        .map_err(|reason| error::Error::InvalidSettings {
            reason: reason.clone(),
        })?
        .get::<T>(key)
        .context(error::Config)
}

pub fn get_config_element<T>() -> Result<T>
where
    T: ConfigElement + DeserializeOwned,
{
    get_config(T::KEY)
}

pub trait ConfigElement {
    const KEY: &'static str;
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tiling {
    pub tile_size: usize,
    pub horizontal_overlap: f64,
    pub vertical_overlap: f64,
    #[serde(default = "default_source_suffix")]
    pub source_suffix: String,
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
}

fn default_source_suffix() -> String {
    DEFAULT_SOURCE_SUFFIX.to_string()
}

fn default_progress_interval() -> usize {
    DEFAULT_PROGRESS_INTERVAL
}

impl Tiling {
    pub fn parameters(&self) -> Result<TilingParameters> {
        Ok(TilingParameters::new(
            self.tile_size,
            self.horizontal_overlap,
            self.vertical_overlap,
        )?)
    }

    pub fn extractor_config(&self, workers: usize) -> Result<ExtractorConfig> {
        Ok(ExtractorConfig::new(self.parameters()?)
            .with_workers(workers)
            .with_source_suffix(self.source_suffix.clone())
            .with_progress_interval(self.progress_interval))
    }
}

impl ConfigElement for Tiling {
    const KEY: &'static str = "tiling";
}

impl ConfigElement for ContentThresholds {
    const KEY: &'static str = "content_filter";
}

/// Builds the content filter from the `content_filter` section
pub fn content_filter() -> Result<ContentFilter> {
    let thresholds: ContentThresholds = get_config_element()?;
    Ok(ContentFilter::new(thresholds)?)
}

/// Reference polygon files, one set per file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Geometry {
    /// Tiles must intersect a polygon of each of these sets
    pub inclusion: Vec<PathBuf>,
    /// Tiles must lie inside the union of each of these sets
    pub inclusion_within: Vec<PathBuf>,
    /// Tiles must not intersect any polygon of these sets
    pub exclusion: Vec<PathBuf>,
}

impl Geometry {
    pub fn filter(&self) -> Result<GeometryFilter> {
        let files = self
            .inclusion
            .iter()
            .map(|path| (path.as_path(), PolygonRole::intersecting()))
            .chain(
                self.inclusion_within
                    .iter()
                    .map(|path| (path.as_path(), PolygonRole::within())),
            )
            .chain(
                self.exclusion
                    .iter()
                    .map(|path| (path.as_path(), PolygonRole::Exclusion)),
            );

        Ok(GeometryFilter::from_geojson_files(files)?)
    }
}

impl ConfigElement for Geometry {
    const KEY: &'static str = "geometry";
}

#[derive(Debug, Clone, Deserialize)]
pub struct Workers {
    /// Cores left to the rest of the system when no count is given
    #[serde(default = "default_reserved_cores")]
    pub reserve: usize,
    pub count: Option<usize>,
}

fn default_reserved_cores() -> usize {
    DEFAULT_RESERVED_CORES
}

impl Workers {
    pub fn count(&self) -> usize {
        self.count
            .filter(|count| *count > 0)
            .unwrap_or_else(|| default_worker_count(self.reserve))
    }
}

impl ConfigElement for Workers {
    const KEY: &'static str = "workers";
}

#[derive(Debug, Clone, Deserialize)]
pub struct Mosaic {
    #[serde(default = "default_merge_block_size")]
    pub block_size: usize,
    #[serde(default = "default_year_block_size")]
    pub year_block_size: usize,
    pub year_separator: char,
    pub year_position: usize,
    pub output_prefix: String,
}

fn default_merge_block_size() -> usize {
    DEFAULT_MERGE_BLOCK_SIZE
}

fn default_year_block_size() -> usize {
    YEAR_GROUP_BLOCK_SIZE
}

impl Mosaic {
    pub fn year_grouping(&self) -> YearGrouping {
        YearGrouping {
            separator: self.year_separator,
            position: self.year_position,
            output_prefix: self.output_prefix.clone(),
            block_size: self.year_block_size,
        }
    }
}

impl ConfigElement for Mosaic {
    const KEY: &'static str = "mosaic";
}

#[derive(Debug, Clone, Deserialize)]
pub struct Output {
    pub directory: PathBuf,
}

impl Output {
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl ConfigElement for Output {
    const KEY: &'static str = "output";
}

#[derive(Debug, Clone, Deserialize)]
pub struct Logging {
    pub log_spec: String,
    pub raw_error_messages: bool,
}

impl ConfigElement for Logging {
    const KEY: &'static str = "logging";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn default_settings() {
        let tiling: Tiling = get_config_element().unwrap();
        assert_eq!(tiling.tile_size, 512);
        assert_eq!(tiling.source_suffix, "_ortho");
        assert!(tiling.parameters().is_ok());

        let thresholds: ContentThresholds = get_config_element().unwrap();
        assert_eq!(thresholds, ContentThresholds::default());

        let mosaic: Mosaic = get_config_element().unwrap();
        assert_eq!(mosaic.block_size, 512);
        assert_eq!(mosaic.year_grouping(), YearGrouping::default());

        let geometry: Geometry = get_config_element().unwrap();
        assert!(geometry.filter().unwrap().is_empty());
    }

    #[test]
    fn test_settings_override_defaults() {
        let workers: Workers = get_config_element().unwrap();
        assert_eq!(workers.count(), 2);
    }

    #[test]
    #[serial]
    fn override_values() {
        set_config("tiling.horizontal_overlap", 0.5).unwrap();

        let tiling: Tiling = get_config_element().unwrap();
        assert_eq!(tiling.parameters().unwrap().horizontal_stride(), 256);

        set_config("tiling.horizontal_overlap", 0.0).unwrap();
    }

    #[test]
    #[serial]
    fn invalid_values_are_rejected_on_use() {
        set_config("tiling.vertical_overlap", 1.0).unwrap();

        let tiling: Tiling = get_config_element().unwrap();
        assert!(tiling.parameters().is_err());

        set_config("tiling.vertical_overlap", 0.0).unwrap();
    }

    #[test]
    fn worker_count_falls_back_to_reserve() {
        let workers = Workers {
            reserve: 1_000_000,
            count: None,
        };
        assert_eq!(workers.count(), 1);

        let workers = Workers {
            reserve: 2,
            count: Some(0),
        };
        assert!(workers.count() >= 1);
    }
}
