use clap::{Parser, Subcommand};
use orthotile_services::cli::{
    Extract, Merge, MergeByYear, Run, ToPng, extract, merge, merge_by_year, run, to_png,
};
use orthotile_services::config::{Logging, get_config_element};
use orthotile_services::logging::init_logging;

/// Tiling and mosaicking of orthophotos
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Cuts a raster into filtered tiles
    Extract(Extract),

    /// Merges georeferenced fragments into a single mosaic
    Merge(Merge),

    /// Merges fragments into one mosaic per acquisition year
    MergeByYear(MergeByYear),

    /// Converts GeoTIFF tiles to PNG images
    #[command(name = "to-png")]
    ToPng(ToPng),

    /// Processes a batch of rasters end to end
    Run(Run),
}

impl Commands {
    fn execute(self) -> Result<(), anyhow::Error> {
        match self {
            Commands::Extract(params) => extract(params),
            Commands::Merge(params) => merge(params),
            Commands::MergeByYear(params) => merge_by_year(params),
            Commands::ToPng(params) => to_png(params),
            Commands::Run(params) => run(params),
        }
    }
}

#[allow(clippy::print_stderr)]
fn main() {
    let cli = Cli::parse();

    let logging: Logging = match get_config_element() {
        Ok(logging) => logging,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = init_logging(&logging) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }

    if let Err(err) = cli.command.execute() {
        if logging.raw_error_messages {
            eprintln!("Error: {err}");
        } else {
            eprintln!("Error: {err:?}");
        }
        std::process::exit(1);
    }
}
