use orthotile_datatypes::call_with_pixel_type;
use orthotile_datatypes::raster::{GeoWindow, Pixel, TileIndexer, TileWindow, TilingParameters};
use snafu::{ResultExt, ensure};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use tracing::{debug, info, warn};

use super::content_filter::ContentFilter;
use super::outcome::{ExtractionReport, SkipReason, TileOutcome, TileStatus};
use crate::error;
use crate::geometry::{GeometryFilter, PreparedGeometryFilter};
use crate::util::Result;
use crate::util::gdal::{GeoTiffOptions, RasterHandle, RasterMetadata};
use crate::util::rayon::{DEFAULT_RESERVED_CORES, create_rayon_thread_pool, default_worker_count};

pub const DEFAULT_SOURCE_SUFFIX: &str = "_ortho";
pub const DEFAULT_TILE_EXTENSION: &str = "tif";
pub const DEFAULT_PROGRESS_INTERVAL: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorConfig {
    pub tiling: TilingParameters,
    /// The number of tiles processed concurrently
    pub workers: usize,
    /// Removed from the source file stem to form tile names
    pub source_suffix: String,
    pub extension: String,
    /// Progress is logged every this many tiles, 0 disables it
    pub progress_interval: usize,
}

impl ExtractorConfig {
    pub fn new(tiling: TilingParameters) -> Self {
        Self {
            tiling,
            workers: default_worker_count(DEFAULT_RESERVED_CORES),
            source_suffix: DEFAULT_SOURCE_SUFFIX.to_string(),
            extension: DEFAULT_TILE_EXTENSION.to_string(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_source_suffix(mut self, source_suffix: impl Into<String>) -> Self {
        self.source_suffix = source_suffix.into();
        self
    }

    #[must_use]
    pub fn with_progress_interval(mut self, progress_interval: usize) -> Self {
        self.progress_interval = progress_interval;
        self
    }
}

/// The file stem of `source` without `suffix`, e.g. `paris_2021` for `paris_2021_ortho.tif`
pub fn source_stem(source: &Path, suffix: &str) -> String {
    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    if suffix.is_empty() {
        stem
    } else {
        stem.replace(suffix, "")
    }
}

/// Everything about one extraction that is fixed before the workers start
#[derive(Debug, Clone)]
pub struct ExtractionPlan {
    source: PathBuf,
    stem: String,
    extension: String,
    metadata: RasterMetadata,
    windows: Vec<TileWindow>,
    output_dir: PathBuf,
}

impl ExtractionPlan {
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn metadata(&self) -> &RasterMetadata {
        &self.metadata
    }

    pub fn windows(&self) -> &[TileWindow] {
        &self.windows
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `{stem}_{x}_{y}`
    pub fn tile_id(&self, window: &TileWindow) -> String {
        format!("{}_{}_{}", self.stem, window.x, window.y)
    }

    pub fn tile_path(&self, tile_id: &str) -> PathBuf {
        self.output_dir
            .join(format!("{tile_id}.{}", self.extension))
    }
}

/// One unit of work: a window of the source raster and where its tile goes
#[derive(Debug, Clone, Copy)]
pub struct TileTask<'a> {
    pub source: &'a Path,
    pub tile_id: &'a str,
    pub geo_window: GeoWindow,
    pub output_path: &'a Path,
}

/// Turns one tile task into a status. Errors and panics are recorded as failures of that tile.
pub trait TileProcessor: Send + Sync {
    fn process(&self, task: &TileTask<'_>) -> Result<TileStatus>;
}

/// Filters a window by geometry and content and writes it as a GeoTIFF
#[derive(Debug, Clone)]
pub struct GdalTileProcessor {
    geometry: Arc<PreparedGeometryFilter>,
    content: ContentFilter,
}

impl GdalTileProcessor {
    pub fn new(geometry: Arc<PreparedGeometryFilter>, content: ContentFilter) -> Self {
        Self { geometry, content }
    }

    fn process_window<T: Pixel>(&self, source: &RasterHandle, task: &TileTask<'_>) -> Result<TileStatus> {
        let window = task.geo_window.window;
        let bands = source.read_window::<T>(&window)?;

        if let Some(reason) = self.content.evaluate(&bands, window.number_of_pixels()) {
            return Ok(TileStatus::Skipped(reason));
        }

        let metadata = source.metadata().for_window(&window);

        let written = RasterHandle::create_geotiff::<T>(task.output_path, &metadata, &GeoTiffOptions::tile())
            .and_then(|mut tile| {
                tile.write_window(&TileWindow::new(0, 0, window.width, window.height), bands)
            });

        if let Err(error) = written {
            // do not leave half written tiles behind
            if task.output_path.exists() {
                if let Err(remove_error) = std::fs::remove_file(task.output_path) {
                    warn!(
                        "Cannot remove unfinished tile {}: {remove_error}",
                        task.output_path.display()
                    );
                }
            }
            return Err(error);
        }

        Ok(TileStatus::Written)
    }
}

impl TileProcessor for GdalTileProcessor {
    fn process(&self, task: &TileTask<'_>) -> Result<TileStatus> {
        if !self.geometry.keep(&task.geo_window.footprint()) {
            return Ok(TileStatus::Skipped(SkipReason::NoIntersection));
        }

        let source = RasterHandle::open(task.source)?;
        let data_type = source.metadata().data_type;

        call_with_pixel_type!(data_type, T => self.process_window::<T>(&source, task))
    }
}

/// Cuts a raster into filtered tiles on a dedicated pool of workers.
#[derive(Debug, Clone)]
pub struct ParallelTileExtractor {
    config: ExtractorConfig,
}

impl ParallelTileExtractor {
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        ensure!(
            config.workers > 0,
            error::InvalidConfiguration {
                reason: "the number of workers must be positive"
            }
        );

        Ok(Self { config })
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Reads the raster metadata, computes the windows and creates the output directory
    pub fn plan(&self, raster: &Path, output_dir: &Path) -> Result<ExtractionPlan> {
        let metadata = RasterHandle::open(raster)?.metadata().clone();

        let indexer = TileIndexer::new(self.config.tiling, metadata.width, metadata.height)?;
        let windows = indexer.unique_windows();

        debug!(
            "{} has {} windows ({} before removing duplicates)",
            raster.display(),
            windows.len(),
            indexer.number_of_windows()
        );

        std::fs::create_dir_all(output_dir).context(error::IoAtPath { path: output_dir })?;

        Ok(ExtractionPlan {
            source: raster.to_path_buf(),
            stem: source_stem(raster, &self.config.source_suffix),
            extension: self.config.extension.clone(),
            metadata,
            windows,
            output_dir: output_dir.to_path_buf(),
        })
    }

    /// Extracts all tiles of `raster` that pass both filters into `output_dir`.
    ///
    /// Fails only if the raster as a whole cannot be processed. Problems with single tiles
    /// are reported in their outcomes.
    pub fn extract_all(
        &self,
        raster: &Path,
        geometry_filter: &GeometryFilter,
        content_filter: &ContentFilter,
        output_dir: &Path,
    ) -> Result<Vec<TileOutcome>> {
        let plan = self.plan(raster, output_dir)?;

        // reproject before the workers start so that they never wait for it
        let geometry = geometry_filter.prepare(plan.metadata.spatial_reference, raster)?;

        let processor = GdalTileProcessor::new(geometry, *content_filter);

        let outcomes = self.execute(&plan, &processor)?;

        info!(
            "{}: {}",
            raster.display(),
            ExtractionReport::from_outcomes(&outcomes)
        );

        Ok(outcomes)
    }

    /// Runs `processor` on every window of the plan and returns the outcomes in completion order
    pub fn execute<P: TileProcessor + ?Sized>(
        &self,
        plan: &ExtractionPlan,
        processor: &P,
    ) -> Result<Vec<TileOutcome>> {
        let pool = create_rayon_thread_pool(self.config.workers)?;
        let (sender, receiver) = mpsc::channel();
        let completed = AtomicUsize::new(0);
        let total = plan.windows.len();
        let progress_interval = self.config.progress_interval;

        pool.scope(|scope| {
            for window in &plan.windows {
                let sender = sender.clone();
                let completed = &completed;

                scope.spawn(move |_| {
                    let outcome = run_task(plan, processor, *window);

                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if progress_interval > 0 && done % progress_interval == 0 {
                        info!("{done}/{total} tiles of {} processed", plan.source.display());
                    }

                    // the receiver lives until all tasks are done
                    let _ = sender.send(outcome);
                });
            }
        });

        drop(sender);

        Ok(receiver.into_iter().collect())
    }
}

fn run_task<P: TileProcessor + ?Sized>(
    plan: &ExtractionPlan,
    processor: &P,
    window: TileWindow,
) -> TileOutcome {
    let tile_id = plan.tile_id(&window);
    let output_path = plan.tile_path(&tile_id);

    let task = TileTask {
        source: &plan.source,
        tile_id: &tile_id,
        geo_window: GeoWindow::new(window, plan.metadata.geo_transform),
        output_path: &output_path,
    };

    let status = match panic::catch_unwind(AssertUnwindSafe(|| processor.process(&task))) {
        Ok(Ok(status)) => status,
        Ok(Err(error)) => {
            warn!("Tile {tile_id} failed: {error}");
            TileStatus::Failed(error.to_string())
        }
        Err(payload) => {
            let message = panic_message(&*payload);
            warn!("Tile {tile_id} panicked: {message}");
            TileStatus::Failed(message)
        }
    };

    TileOutcome::new(tile_id, window, status)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{PolygonRole, ReferencePolygonSet};
    use crate::util::test::{TestRaster, read_first_band};
    use geo::{MultiPolygon, polygon};
    use orthotile_datatypes::raster::GeoTransform;
    use orthotile_datatypes::primitives::Coordinate2D;
    use orthotile_datatypes::spatial_reference::{SpatialReference, SpatialReferenceOption};
    use std::collections::HashSet;

    fn config(tile_size: usize, overlap: f64, workers: usize) -> ExtractorConfig {
        ExtractorConfig::new(TilingParameters::new(tile_size, overlap, overlap).unwrap())
            .with_workers(workers)
    }

    fn tif_files(dir: &Path) -> Vec<String> {
        let mut files: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tif"))
            .collect();
        files.sort();
        files
    }

    #[test]
    fn stem_without_suffix() {
        assert_eq!(
            source_stem(Path::new("/data/paris_2021_ortho.tif"), "_ortho"),
            "paris_2021"
        );
        assert_eq!(source_stem(Path::new("/data/paris.tif"), "_ortho"), "paris");
        assert_eq!(source_stem(Path::new("paris_ortho.tif"), ""), "paris_ortho");
    }

    #[test]
    fn zero_workers_are_rejected() {
        assert!(ParallelTileExtractor::new(config(10, 0.0, 0)).is_err());
    }

    #[test]
    fn writes_every_tile_of_a_plain_raster() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("city_ortho.tif");
        let tiles = dir.path().join("tiles");

        TestRaster::new(25, 20, 3).write_uniform::<u8>(&source, |x, y| (10 + x + y) as u8);

        let extractor = ParallelTileExtractor::new(config(10, 0.0, 2)).unwrap();
        let outcomes = extractor
            .extract_all(
                &source,
                &GeometryFilter::new(Vec::new()),
                &ContentFilter::default(),
                &tiles,
            )
            .unwrap();

        assert_eq!(outcomes.len(), 3 * 2);
        assert!(outcomes.iter().all(|o| o.status == TileStatus::Written));
        assert_eq!(
            tif_files(&tiles),
            vec![
                "city_0_0.tif",
                "city_0_10.tif",
                "city_10_0.tif",
                "city_10_10.tif",
                "city_15_0.tif",
                "city_15_10.tif"
            ]
        );

        // the clamped tile starts at column 15 and carries its own transform
        let tile = RasterHandle::open(&tiles.join("city_15_10.tif")).unwrap();
        let metadata = tile.metadata();
        assert_eq!((metadata.width, metadata.height, metadata.band_count), (10, 10, 3));
        assert_eq!(
            metadata.geo_transform.origin_coordinate,
            Coordinate2D::new(700_007.5, 6_599_995.0)
        );
        assert_eq!(
            metadata.spatial_reference,
            SpatialReferenceOption::from(SpatialReference::epsg(2154))
        );

        let values = read_first_band::<u8>(&tiles.join("city_15_10.tif"));
        assert_eq!(values[0], 10 + 15 + 10);
    }

    #[test]
    fn content_and_geometry_filters() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("mixed.tif");
        let tiles = dir.path().join("tiles");

        // columns 0..10 black, 10..20 white, 20..40 grey
        TestRaster::new(40, 10, 3).write_uniform::<u8>(&source, |x, _| match x {
            0..10 => 0,
            10..20 => 255,
            _ => 128,
        });

        // world x of the raster starts at 700_000 with 0.5 m pixels, the zone covers columns 20..30
        let zone = ReferencePolygonSet::new(
            "zone",
            SpatialReference::epsg(2154),
            MultiPolygon::new(vec![polygon![
                (x: 700_010.5, y: 6_599_996.0),
                (x: 700_014.5, y: 6_599_996.0),
                (x: 700_014.5, y: 6_599_999.0),
                (x: 700_010.5, y: 6_599_999.0),
            ]]),
            PolygonRole::intersecting(),
        );

        let extractor = ParallelTileExtractor::new(config(10, 0.0, 3)).unwrap();

        let outcomes = extractor
            .extract_all(
                &source,
                &GeometryFilter::new(Vec::new()),
                &ContentFilter::default(),
                &tiles,
            )
            .unwrap();
        let report = ExtractionReport::from_outcomes(&outcomes);
        assert_eq!(report.written, 2);
        assert_eq!(report.skipped_for(SkipReason::TooBlack), 1);
        assert_eq!(report.skipped_for(SkipReason::TooWhite), 1);

        let outcomes = extractor
            .extract_all(
                &source,
                &GeometryFilter::new(vec![zone]),
                &ContentFilter::default(),
                &dir.path().join("zone_tiles"),
            )
            .unwrap();
        let report = ExtractionReport::from_outcomes(&outcomes);
        assert_eq!(report.written, 1);
        assert_eq!(report.skipped_for(SkipReason::NoIntersection), 3);
        assert_eq!(tif_files(&dir.path().join("zone_tiles")), vec!["mixed_20_0.tif"]);
    }

    #[test]
    fn raster_too_small() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("small.tif");

        TestRaster::new(8, 20, 1).write_uniform::<u8>(&source, |_, _| 100);

        let extractor = ParallelTileExtractor::new(config(10, 0.0, 1)).unwrap();
        let error = extractor
            .extract_all(
                &source,
                &GeometryFilter::new(Vec::new()),
                &ContentFilter::default(),
                &dir.path().join("tiles"),
            )
            .unwrap_err();

        assert!(error.is_raster_too_small());
    }

    #[test]
    fn unreferenced_raster_with_polygons() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("nowhere.tif");

        TestRaster::new(20, 20, 1)
            .without_crs()
            .write_uniform::<u8>(&source, |_, _| 100);

        let filter = GeometryFilter::new(vec![ReferencePolygonSet::new(
            "zone",
            SpatialReference::epsg(2154),
            MultiPolygon::new(vec![polygon![(x: 0., y: 0.), (x: 1., y: 0.), (x: 1., y: 1.)]]),
            PolygonRole::intersecting(),
        )]);

        let extractor = ParallelTileExtractor::new(config(10, 0.0, 1)).unwrap();

        let error = extractor
            .extract_all(&source, &filter, &ContentFilter::default(), &dir.path().join("tiles"))
            .unwrap_err();

        assert!(matches!(error, error::Error::UnreferencedRaster { .. }));
        assert!(error.to_string().contains("Assign an EPSG code"));
    }

    #[test]
    fn outcomes_do_not_depend_on_worker_count() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("noise.tif");

        TestRaster::new(64, 48, 3)
            .with_geo_transform(GeoTransform::new(Coordinate2D::new(0.0, 48.0), 1.0, -1.0))
            .write::<u8>(&source, |band, x, y| ((x * 7 + y * 13 + band * 5) % 256) as u8);

        let run = |workers: usize, output: &str| {
            let extractor = ParallelTileExtractor::new(config(16, 0.25, workers)).unwrap();
            let mut outcomes = extractor
                .extract_all(
                    &source,
                    &GeometryFilter::new(Vec::new()),
                    &ContentFilter::default(),
                    &dir.path().join(output),
                )
                .unwrap();
            outcomes.sort_by(|a, b| a.tile_id.cmp(&b.tile_id));
            outcomes
        };

        let sequential = run(1, "sequential");
        let parallel = run(6, "parallel");

        assert_eq!(sequential, parallel);
        assert_eq!(
            tif_files(&dir.path().join("sequential")),
            tif_files(&dir.path().join("parallel"))
        );

        for name in tif_files(&dir.path().join("sequential")) {
            assert_eq!(
                read_first_band::<u8>(&dir.path().join("sequential").join(&name)),
                read_first_band::<u8>(&dir.path().join("parallel").join(&name))
            );
        }
    }

    #[test]
    fn rerun_overwrites_tiles() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("coast_ortho.tif");
        let tiles = dir.path().join("tiles");

        TestRaster::new(30, 25, 3).write::<u8>(&source, |band, x, y| (20 + band + x + y) as u8);

        let extractor = ParallelTileExtractor::new(config(10, 0.5, 3)).unwrap();
        let run = || {
            let mut outcomes = extractor
                .extract_all(
                    &source,
                    &GeometryFilter::new(Vec::new()),
                    &ContentFilter::default(),
                    &tiles,
                )
                .unwrap();
            outcomes.sort_by(|a, b| a.tile_id.cmp(&b.tile_id));
            outcomes
        };

        let first = run();
        let first_files = tif_files(&tiles);
        let original = read_first_band::<u8>(&tiles.join("coast_10_5.tif"));

        std::fs::write(tiles.join("coast_10_5.tif"), b"stale").unwrap();

        let second = run();

        assert_eq!(first, second);
        assert_eq!(tif_files(&tiles), first_files);
        assert_eq!(first_files.len(), first.len());
        assert_eq!(read_first_band::<u8>(&tiles.join("coast_10_5.tif")), original);
    }

    #[test]
    fn blocked_tile_path_fails_only_that_tile() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("dock.tif");
        let tiles = dir.path().join("tiles");

        TestRaster::new(20, 20, 3).write_uniform::<u8>(&source, |_, _| 80);

        std::fs::create_dir_all(tiles.join("dock_0_10.tif")).unwrap();

        let extractor = ParallelTileExtractor::new(config(10, 0.0, 2)).unwrap();
        let outcomes = extractor
            .extract_all(
                &source,
                &GeometryFilter::new(Vec::new()),
                &ContentFilter::default(),
                &tiles,
            )
            .unwrap();
        let report = ExtractionReport::from_outcomes(&outcomes);

        assert_eq!(report.written, 3);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "dock_0_10");
        // the directory in the way is left alone
        assert!(tiles.join("dock_0_10.tif").is_dir());
        assert_eq!(tif_files(&tiles).len(), 4);
    }

    /// Delegates to the GDAL processor but fails one window
    struct FailingProcessor {
        inner: GdalTileProcessor,
        failing_window: TileWindow,
        panic: bool,
    }

    impl TileProcessor for FailingProcessor {
        fn process(&self, task: &TileTask<'_>) -> Result<TileStatus> {
            if task.geo_window.window == self.failing_window {
                if self.panic {
                    panic!("injected panic");
                }

                return error::InvalidConfiguration {
                    reason: "injected failure",
                }
                .fail();
            }

            self.inner.process(task)
        }
    }

    #[test]
    fn single_failure_does_not_stop_siblings() {
        for panic in [false, true] {
            let dir = tempfile::tempdir().unwrap();
            let source = dir.path().join("fifty.tif");
            let tiles = dir.path().join("tiles");

            // 10 x 5 windows of 10 pixels
            TestRaster::new(100, 50, 3).write_uniform::<u8>(&source, |_, _| 90);

            let extractor = ParallelTileExtractor::new(config(10, 0.0, 4)).unwrap();
            let plan = extractor.plan(&source, &tiles).unwrap();
            assert_eq!(plan.windows().len(), 50);

            let processor = FailingProcessor {
                inner: GdalTileProcessor::new(Arc::default(), ContentFilter::default()),
                failing_window: TileWindow::new(30, 20, 10, 10),
                panic,
            };

            let outcomes = extractor.execute(&plan, &processor).unwrap();
            let report = ExtractionReport::from_outcomes(&outcomes);

            assert_eq!(report.total, 50);
            assert_eq!(report.written, 49);
            assert_eq!(report.failed.len(), 1);
            assert_eq!(report.failed[0].0, "fifty_30_20");
            assert!(report.failed[0].1.contains("injected"));

            let written: HashSet<String> = tif_files(&tiles).into_iter().collect();
            assert_eq!(written.len(), 49);
            assert!(!written.contains("fifty_30_20.tif"));
        }
    }
}
