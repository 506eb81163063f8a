use super::TilingOverrides;
use crate::config::{self, get_config_element};
use crate::pipeline::BatchPipeline;
use crate::sources::RasterSource;
use anyhow::{anyhow, bail};
use clap::{Args, Parser};
use std::path::PathBuf;

/// Exactly one source of rasters
#[derive(Debug, Clone, Args)]
#[group(required = true, multiple = false)]
pub struct SourceArgs {
    /// A single raster
    #[arg(long)]
    file: Option<PathBuf>,

    /// A folder of `.tif` rasters
    #[arg(long)]
    folder: Option<PathBuf>,

    /// A CSV list with the columns `root_folder` and `ortho_name`
    #[arg(long)]
    csv: Option<PathBuf>,
}

impl SourceArgs {
    pub fn source(&self) -> Option<RasterSource> {
        match (&self.file, &self.folder, &self.csv) {
            (Some(file), _, _) => Some(RasterSource::File(file.clone())),
            (_, Some(folder), _) => Some(RasterSource::Folder(folder.clone())),
            (_, _, Some(csv)) => Some(RasterSource::Csv(csv.clone())),
            _ => None,
        }
    }
}

/// Extracts tiles, exports PNGs and merges predictions for a batch of rasters
#[derive(Debug, Parser)]
pub struct Run {
    #[command(flatten)]
    source: SourceArgs,

    /// Position of the first raster to process
    #[arg(long, default_value_t = 0)]
    index_start: usize,

    /// Deletes previous outputs of each raster before processing it
    #[arg(long)]
    clean: bool,

    /// Root of the output directories, defaults to the configured one
    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[command(flatten)]
    tiling: TilingOverrides,
}

#[allow(clippy::print_stdout)]
pub fn run(params: Run) -> Result<(), anyhow::Error> {
    let source = params
        .source
        .source()
        .ok_or_else(|| anyhow!("one of --file, --folder or --csv is required"))?;

    let output_dir = match params.output_dir {
        Some(output_dir) => output_dir,
        None => get_config_element::<config::Output>()?.directory,
    };

    let tiling = params.tiling.apply(get_config_element()?);
    let pipeline = BatchPipeline::from_settings(&tiling, params.tiling.workers()?)?
        .with_clean(params.clean);

    let rasters = source.rasters_from(params.index_start)?;
    let summary = pipeline.run(&rasters, &output_dir);

    println!("{summary}");

    if summary.has_failures() {
        bail!(
            "{} rasters and {} tiles failed",
            summary.failed.len(),
            summary.failed_tiles.len()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sources_are_exclusive() {
        assert!(Run::try_parse_from(["run"]).is_err());
        assert!(
            Run::try_parse_from(["run", "--file", "a_ortho.tif", "--folder", "rasters"]).is_err()
        );

        let run = Run::try_parse_from([
            "run",
            "--csv",
            "rasters.csv",
            "--index-start",
            "3",
            "--clean",
            "--workers",
            "4",
        ])
        .unwrap();

        assert_eq!(
            run.source.source(),
            Some(RasterSource::Csv(PathBuf::from("rasters.csv")))
        );
        assert_eq!(run.index_start, 3);
        assert!(run.clean);
        assert_eq!(run.output_dir, None);
        assert_eq!(run.tiling.workers, Some(4));
    }
}
