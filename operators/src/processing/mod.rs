mod content_filter;
mod extractor;
mod mosaic;
mod outcome;
mod year_grouper;

pub use content_filter::{ContentFilter, ContentStatistics, ContentThresholds};
pub use extractor::{
    DEFAULT_PROGRESS_INTERVAL, DEFAULT_SOURCE_SUFFIX, DEFAULT_TILE_EXTENSION, ExtractionPlan,
    ExtractorConfig, GdalTileProcessor, ParallelTileExtractor, TileProcessor, TileTask, source_stem,
};
pub use mosaic::{DEFAULT_MERGE_BLOCK_SIZE, GEOTIFF_BLOCK_ALIGNMENT, MosaicAssembler, merge};
pub use outcome::{ExtractionReport, SkipReason, TileOutcome, TileStatus};
pub use year_grouper::{
    YEAR_GROUP_BLOCK_SIZE, YearGroupReport, YearGrouper, YearGrouping, YearGroups,
};
