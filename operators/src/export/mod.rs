mod png;

pub use png::{ExportReport, convert_tile_to_png, convert_tiles_to_png};
