use snafu::Snafu;
use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[snafu(context(suffix(false)))] // disables default `Snafu` suffix
pub enum Error {
    #[snafu(display("{}", source))]
    Operator {
        source: orthotile_operators::error::Error,
    },

    #[snafu(display("{}", source))]
    DataType {
        source: orthotile_datatypes::error::Error,
    },

    #[snafu(display("Invalid settings: {}", source))]
    Config {
        source: config::ConfigError,
    },

    #[snafu(display("Settings could not be loaded: {}", reason))]
    InvalidSettings {
        reason: String,
    },

    ConfigLockFailed,

    MissingWorkingDirectory {
        source: std::io::Error,
    },

    MissingSettingsDirectory,

    #[snafu(display("Invalid log spec: {}", source))]
    InvalidLogSpec {
        source: tracing_subscriber::filter::ParseError,
    },

    #[snafu(display("Logging is already initialized: {}", source))]
    LoggingAlreadyInitialized {
        source: tracing_subscriber::util::TryInitError,
    },

    #[snafu(display("IOError at {}: {}", path.display(), source))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Cannot read raster list {}: {}", path.display(), source))]
    Csv {
        path: PathBuf,
        source: csv::Error,
    },

    #[snafu(display("Raster source {} does not exist", path.display()))]
    MissingRasterSource {
        path: PathBuf,
    },
}

impl From<orthotile_operators::error::Error> for Error {
    fn from(source: orthotile_operators::error::Error) -> Self {
        Self::Operator { source }
    }
}

impl From<orthotile_datatypes::error::Error> for Error {
    fn from(source: orthotile_datatypes::error::Error) -> Self {
        Self::DataType { source }
    }
}
