mod extract;
mod merge;
mod run;
mod to_png;

pub use extract::{Extract, TilingOverrides, extract};
pub use merge::{Merge, MergeByYear, merge, merge_by_year};
pub use run::{Run, SourceArgs, run};
pub use to_png::{ToPng, to_png};
