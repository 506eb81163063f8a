use crate::config::{self, get_config_element};
use anyhow::bail;
use clap::{Args, Parser};
use orthotile_operators::processing::{ExtractionReport, ParallelTileExtractor};
use std::path::PathBuf;

/// Tiling settings that take precedence over the configuration
#[derive(Debug, Clone, Default, Args)]
pub struct TilingOverrides {
    /// Edge length of the square tiles in pixels
    #[arg(long)]
    pub tile_size: Option<usize>,

    /// Horizontal overlap of neighboring tiles in `[0, 1)`
    #[arg(long)]
    pub horizontal_overlap: Option<f64>,

    /// Vertical overlap of neighboring tiles in `[0, 1)`
    #[arg(long)]
    pub vertical_overlap: Option<f64>,

    /// Number of parallel workers
    #[arg(long)]
    pub workers: Option<usize>,
}

impl TilingOverrides {
    pub fn apply(&self, mut tiling: config::Tiling) -> config::Tiling {
        if let Some(tile_size) = self.tile_size {
            tiling.tile_size = tile_size;
        }
        if let Some(horizontal_overlap) = self.horizontal_overlap {
            tiling.horizontal_overlap = horizontal_overlap;
        }
        if let Some(vertical_overlap) = self.vertical_overlap {
            tiling.vertical_overlap = vertical_overlap;
        }
        tiling
    }

    pub fn workers(&self) -> crate::error::Result<usize> {
        match self.workers {
            Some(workers) => Ok(workers),
            None => Ok(get_config_element::<config::Workers>()?.count()),
        }
    }
}

/// Cuts a raster into filtered tiles
#[derive(Debug, Parser)]
pub struct Extract {
    /// Raster to cut
    #[arg(long)]
    raster: PathBuf,

    /// Directory for the tiles
    #[arg(long)]
    output_dir: PathBuf,

    #[command(flatten)]
    tiling: TilingOverrides,
}

#[allow(clippy::print_stdout)]
pub fn extract(params: Extract) -> Result<(), anyhow::Error> {
    let tiling = params.tiling.apply(get_config_element()?);
    let extractor = ParallelTileExtractor::new(tiling.extractor_config(params.tiling.workers()?)?)?;

    let geometry_filter = get_config_element::<config::Geometry>()?.filter()?;
    let content_filter = config::content_filter()?;

    let outcomes = extractor.extract_all(
        &params.raster,
        &geometry_filter,
        &content_filter,
        &params.output_dir,
    )?;
    let report = ExtractionReport::from_outcomes(&outcomes);

    println!("{report}");

    if report.has_failures() {
        for (tile_id, reason) in &report.failed {
            println!("\t* {tile_id}: {reason}");
        }
        bail!("{} tiles could not be extracted", report.failed.len());
    }

    Ok(())
}
