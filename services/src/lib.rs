pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod paths;
pub mod pipeline;
pub mod sources;
#[cfg(test)]
mod util;
