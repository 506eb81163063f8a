use rayon::{ThreadPool, ThreadPoolBuilder};
use snafu::ResultExt;
use std::num::NonZeroUsize;

use crate::error;
use crate::util::Result;

/// The number of cores that are left to the rest of the system by default
pub const DEFAULT_RESERVED_CORES: usize = 2;

/// The default number of workers: all available cores minus `reserved_cores`, but at least one.
pub fn default_worker_count(reserved_cores: usize) -> usize {
    let available = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);

    available.saturating_sub(reserved_cores).max(1)
}

/// Create a rayon thread pool with exactly `num_threads` workers.
///
/// Every call gets its own pool so that concurrent runs do not compete for the global one.
pub fn create_rayon_thread_pool(num_threads: usize) -> Result<ThreadPool> {
    snafu::ensure!(
        num_threads > 0,
        error::InvalidConfiguration {
            reason: "the number of workers must be positive"
        }
    );

    ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|index| format!("orthotile-worker-{index}"))
        .build()
        .context(error::ThreadPool)
}
