use crate::config::{self, get_config_element};
use crate::sources::RASTER_EXTENSION;
use anyhow::bail;
use clap::Parser;
use orthotile_operators::processing::{MosaicAssembler, YearGrouper};
use orthotile_operators::util::files_with_extension;
use std::path::PathBuf;

/// Merges georeferenced fragments into a single mosaic
#[derive(Debug, Parser)]
pub struct Merge {
    /// Fragment rasters, directories stand for the `.tif` files they contain
    #[arg(required = true)]
    fragments: Vec<PathBuf>,

    /// The mosaic to write
    #[arg(long)]
    output: PathBuf,

    /// Edge length of the blocks that are written at once
    #[arg(long)]
    block_size: Option<usize>,
}

/// Merges the fragments of a directory into one mosaic per acquisition year
#[derive(Debug, Parser)]
pub struct MergeByYear {
    /// Directory of the fragments
    #[arg(long)]
    input_dir: PathBuf,

    /// Directory for the yearly mosaics
    #[arg(long)]
    output_dir: PathBuf,

    /// Edge length of the blocks that are written at once
    #[arg(long)]
    block_size: Option<usize>,
}

/// Replaces directories by the raster files inside them
fn expand_fragments(paths: &[PathBuf]) -> Result<Vec<PathBuf>, anyhow::Error> {
    let mut fragments = Vec::with_capacity(paths.len());

    for path in paths {
        if path.is_dir() {
            fragments.extend(files_with_extension(path, RASTER_EXTENSION)?);
        } else {
            fragments.push(path.clone());
        }
    }

    Ok(fragments)
}

pub fn merge(params: Merge) -> Result<(), anyhow::Error> {
    let block_size = match params.block_size {
        Some(block_size) => block_size,
        None => get_config_element::<config::Mosaic>()?.block_size,
    };

    let fragments = expand_fragments(&params.fragments)?;

    MosaicAssembler::new(block_size)?.merge(&fragments, &params.output)?;

    Ok(())
}

#[allow(clippy::print_stdout)]
pub fn merge_by_year(params: MergeByYear) -> Result<(), anyhow::Error> {
    let mut grouping = get_config_element::<config::Mosaic>()?.year_grouping();
    if let Some(block_size) = params.block_size {
        grouping.block_size = block_size;
    }

    let grouper = YearGrouper::new(grouping)?;
    let fragments = files_with_extension(&params.input_dir, RASTER_EXTENSION)?;

    let report = grouper.merge_by_year(&fragments, &params.output_dir);

    for (year, path) in &report.merged {
        println!("{year}: {}", path.display());
    }
    for path in &report.invalid {
        println!("no year in {}", path.display());
    }

    if report.has_failures() {
        for (year, reason) in &report.failed {
            println!("\t* {year}: {reason}");
        }
        bail!("{} yearly mosaics could not be written", report.failed.len());
    }

    Ok(())
}
