use crate::config::{self, get_config_element};
use crate::error::{Error, Result};
use crate::paths::RasterPaths;
use crate::sources::{RASTER_EXTENSION, is_raster_file};
use orthotile_operators::export::{ExportReport, convert_tiles_to_png};
use orthotile_operators::geometry::GeometryFilter;
use orthotile_operators::processing::{
    ContentFilter, ExtractionReport, ExtractorConfig, MosaicAssembler, ParallelTileExtractor,
};
use orthotile_operators::util::files_with_extension;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

/// What was done for one raster, `None` for steps that were skipped
#[derive(Debug, Clone, Default)]
pub struct RasterRun {
    pub extraction: Option<ExtractionReport>,
    pub export: Option<ExportReport>,
    pub prediction_mosaic: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    /// File names of the rasters that failed
    pub failed: Vec<String>,
    /// Identifiers and messages of failed tiles of rasters that were processed
    pub failed_tiles: Vec<(String, String)>,
}

impl BatchSummary {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty() || !self.failed_tiles.is_empty()
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rasters, {} failures, {} failed tiles",
            self.total,
            self.failed.len(),
            self.failed_tiles.len()
        )?;

        for name in &self.failed {
            write!(f, "\n\t* {name}")?;
        }

        for (tile_id, message) in &self.failed_tiles {
            write!(f, "\n\t* {tile_id}: {message}")?;
        }

        Ok(())
    }
}

/// Runs extraction, PNG export and the merge of predictions for a list of rasters.
///
/// Steps whose output already exists are skipped unless the pipeline cleans the outputs first.
#[derive(Debug)]
pub struct BatchPipeline {
    extractor: ParallelTileExtractor,
    geometry_filter: GeometryFilter,
    content_filter: ContentFilter,
    assembler: MosaicAssembler,
    clean: bool,
}

impl BatchPipeline {
    pub fn new(
        extractor_config: ExtractorConfig,
        geometry_filter: GeometryFilter,
        content_filter: ContentFilter,
        assembler: MosaicAssembler,
    ) -> Result<Self> {
        Ok(Self {
            extractor: ParallelTileExtractor::new(extractor_config)?,
            geometry_filter,
            content_filter,
            assembler,
            clean: false,
        })
    }

    /// Builds the pipeline from the given tiling and the filter and mosaic settings
    pub fn from_settings(tiling: &config::Tiling, workers: usize) -> Result<Self> {
        let geometry: config::Geometry = get_config_element()?;
        let mosaic: config::Mosaic = get_config_element()?;

        Self::new(
            tiling.extractor_config(workers)?,
            geometry.filter()?,
            config::content_filter()?,
            MosaicAssembler::new(mosaic.block_size)?,
        )
    }

    /// Whether previous outputs of a raster are deleted before it is processed
    #[must_use]
    pub fn with_clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    /// Processes every raster, a failing raster does not stop the others
    pub fn run(&self, rasters: &[PathBuf], output_dir: &Path) -> BatchSummary {
        let mut summary = BatchSummary {
            total: rasters.len(),
            ..BatchSummary::default()
        };

        for (index, raster) in rasters.iter().enumerate() {
            if !is_raster_file(raster) {
                warn!("{} is not a raster file and is skipped", raster.display());
                continue;
            }

            info!("{}/{} - Working with {}", index + 1, rasters.len(), raster.display());
            let start = Instant::now();

            match self.process_raster(raster, output_dir) {
                Ok(run) => {
                    if let Some(extraction) = run.extraction {
                        summary.failed_tiles.extend(extraction.failed);
                    }
                }
                Err(error) => {
                    match &error {
                        Error::Operator { source } if source.is_raster_too_small() => {
                            warn!("Skipping {}: {error}", raster.display());
                        }
                        _ => error!("Processing {} failed: {error}", raster.display()),
                    }
                    summary.failed.push(
                        raster
                            .file_name()
                            .map(|name| name.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                    );
                }
            }

            info!("Running time {:?}", start.elapsed());
        }

        info!("End of process. {summary}");
        summary
    }

    pub fn process_raster(&self, raster: &Path, output_dir: &Path) -> Result<RasterRun> {
        let paths = RasterPaths::new(output_dir, raster);

        if self.clean {
            paths.clean()?;
        } else {
            paths.create()?;
        }

        let mut run = RasterRun::default();
        let workers = self.extractor.config().workers;

        if self.clean || paths.is_empty_tiles_tif() {
            let outcomes = self.extractor.extract_all(
                raster,
                &self.geometry_filter,
                &self.content_filter,
                &paths.tiles_tif(),
            )?;

            let report = ExtractionReport::from_outcomes(&outcomes);
            for (tile_id, message) in &report.failed {
                warn!("Tile {tile_id} of {} failed: {message}", raster.display());
            }
            run.extraction = Some(report);
        } else {
            info!("Tiles of {} exist already", paths.stem());
        }

        if self.clean || paths.is_empty_tiles_png() {
            run.export = Some(convert_tiles_to_png(
                &paths.tiles_tif(),
                &paths.tiles_png(),
                workers,
            )?);
        } else {
            info!("PNG tiles of {} exist already", paths.stem());
        }

        let fragments = files_with_extension(&paths.predictions_tif(), RASTER_EXTENSION)?;

        if fragments.is_empty() {
            info!("There are no predictions for {}", paths.stem());
        } else {
            let prediction_mosaic = paths.prediction_mosaic();
            self.assembler.merge(&fragments, &prediction_mosaic)?;
            run.prediction_mosaic = Some(prediction_mosaic);
        }

        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::tests::write_test_raster;
    use orthotile_datatypes::raster::TilingParameters;
    use pretty_assertions::assert_eq;

    fn pipeline() -> BatchPipeline {
        BatchPipeline::new(
            ExtractorConfig::new(TilingParameters::new(10, 0.0, 0.0).unwrap()).with_workers(2),
            GeometryFilter::new(Vec::new()),
            ContentFilter::default(),
            MosaicAssembler::new(16).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn summary_display() {
        let summary = BatchSummary {
            total: 3,
            failed: vec!["a_ortho.tif".to_string()],
            failed_tiles: vec![("b_0_10".to_string(), "disk full".to_string())],
        };

        assert_eq!(
            summary.to_string(),
            "3 rasters, 1 failures, 1 failed tiles\n\t* a_ortho.tif\n\t* b_0_10: disk full"
        );
        assert!(summary.has_failures());
        assert!(!BatchSummary::default().has_failures());
    }

    #[test]
    fn failing_rasters_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        let output = dir.path().join("output");
        std::fs::create_dir_all(&input).unwrap();

        let good = input.join("good_ortho.tif");
        let small = input.join("small_ortho.tif");
        write_test_raster(&good, 20, 20, 3, 120);
        write_test_raster(&small, 5, 5, 3, 120);

        let summary = pipeline().run(
            &[good.clone(), small.clone(), input.join("missing.tif")],
            &output,
        );

        assert_eq!(summary.total, 3);
        assert_eq!(summary.failed, vec!["small_ortho.tif".to_string()]);
        assert!(summary.failed_tiles.is_empty());

        let paths = RasterPaths::new(&output, &good);
        assert_eq!(
            files_with_extension(&paths.tiles_tif(), "tif").unwrap(),
            vec![
                paths.tiles_tif().join("good_0_0.tif"),
                paths.tiles_tif().join("good_0_10.tif"),
                paths.tiles_tif().join("good_10_0.tif"),
                paths.tiles_tif().join("good_10_10.tif"),
            ]
        );
        assert_eq!(files_with_extension(&paths.tiles_png(), "png").unwrap().len(), 4);
    }

    #[test]
    fn failed_tiles_are_listed() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("output");
        let raster = dir.path().join("harbour_ortho.tif");
        write_test_raster(&raster, 20, 20, 3, 120);

        // a directory where a tile should be written makes that tile fail
        let paths = RasterPaths::new(&output, &raster);
        paths.create().unwrap();
        std::fs::create_dir(paths.tiles_tif().join("harbour_10_0.tif")).unwrap();

        let summary = pipeline().run(std::slice::from_ref(&raster), &output);

        assert_eq!(summary.total, 1);
        assert!(summary.failed.is_empty());
        assert_eq!(summary.failed_tiles.len(), 1);
        assert_eq!(summary.failed_tiles[0].0, "harbour_10_0");
        assert!(summary.has_failures());
        assert!(summary.to_string().starts_with("1 rasters, 0 failures, 1 failed tiles\n\t* harbour_10_0: "));

        assert_eq!(files_with_extension(&paths.tiles_tif(), "tif").unwrap().len(), 3);
    }

    #[test]
    fn existing_outputs_are_kept_and_predictions_merged() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("output");
        let raster = dir.path().join("lagoon_ortho.tif");
        write_test_raster(&raster, 20, 20, 3, 120);

        let paths = RasterPaths::new(&output, &raster);
        paths.create().unwrap();
        write_test_raster(&paths.predictions_tif().join("lagoon-2023-0.tif"), 10, 10, 1, 3);

        let pipeline = pipeline();

        let first = pipeline.process_raster(&raster, &output).unwrap();
        assert_eq!(first.extraction.unwrap().written, 4);
        assert_eq!(first.export.unwrap().converted.len(), 4);
        assert_eq!(first.prediction_mosaic, Some(paths.prediction_mosaic()));
        assert!(paths.prediction_mosaic().is_file());

        let second = pipeline.process_raster(&raster, &output).unwrap();
        assert!(second.extraction.is_none());
        assert!(second.export.is_none());

        let cleaned = pipeline.with_clean(true).process_raster(&raster, &output).unwrap();
        assert_eq!(cleaned.extraction.unwrap().written, 4);
        // cleaning removed the predictions
        assert!(cleaned.prediction_mosaic.is_none());
    }
}
