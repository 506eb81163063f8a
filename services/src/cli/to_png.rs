use crate::config::{self, get_config_element};
use anyhow::bail;
use clap::Parser;
use orthotile_operators::export::convert_tiles_to_png;
use std::path::PathBuf;

/// Converts GeoTIFF tiles to 8-bit PNG images
#[derive(Debug, Parser)]
pub struct ToPng {
    /// Directory of the `.tif` tiles
    #[arg(long)]
    input_dir: PathBuf,

    /// Directory for the PNG images
    #[arg(long)]
    output_dir: PathBuf,

    /// Number of parallel workers
    #[arg(long)]
    workers: Option<usize>,
}

#[allow(clippy::print_stdout)]
pub fn to_png(params: ToPng) -> Result<(), anyhow::Error> {
    let workers = match params.workers {
        Some(workers) => workers,
        None => get_config_element::<config::Workers>()?.count(),
    };

    let report = convert_tiles_to_png(&params.input_dir, &params.output_dir, workers)?;

    println!("{} tiles converted", report.converted.len());

    if report.has_failures() {
        for (tile, reason) in &report.failed {
            println!("\t* {}: {reason}", tile.display());
        }
        bail!("{} tiles could not be converted", report.failed.len());
    }

    Ok(())
}
