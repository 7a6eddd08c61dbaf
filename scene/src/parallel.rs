//! Ordered parallel map for the spawn and deserialize stages.
//!
//! Splits the input into contiguous chunks and processes them on scoped
//! threads. Results come back in input order, so callers can index them
//! like the sequential version. Falls back to sequential iteration on
//! WASM.

/// Configuration for parallel stages.
#[derive(Debug, Clone)]
pub struct ParConfig {
    /// Minimum number of items per batch. Inputs shorter than twice this
    /// run sequentially. Default: 64.
    pub min_batch_size: usize,
    /// Number of worker threads. `None` uses
    /// [`std::thread::available_parallelism`]. Default: `None`.
    pub num_threads: Option<usize>,
}

impl Default for ParConfig {
    fn default() -> Self {
        Self {
            min_batch_size: 64,
            num_threads: None,
        }
    }
}

impl ParConfig {
    pub(crate) fn effective_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Whether `count` items are enough to split.
    pub(crate) fn should_split(&self, count: usize) -> bool {
        self.effective_threads() > 1 && count >= self.min_batch_size.max(1) * 2
    }
}

/// Maps `f` over `items` on worker threads, preserving order.
///
/// A panic in a worker is re-raised on the calling thread.
#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn par_map<T, R, F>(items: &[T], config: &ParConfig, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let count = items.len();
    if !config.should_split(count) {
        return items.iter().map(&f).collect();
    }

    let num_threads = config.effective_threads().max(1);
    let batch_size = count
        .div_ceil(num_threads)
        .max(config.min_batch_size)
        .max(1);
    let f = &f;

    std::thread::scope(|scope| {
        let handles: Vec<_> = items
            .chunks(batch_size)
            .map(|chunk| scope.spawn(move || chunk.iter().map(f).collect::<Vec<R>>()))
            .collect();
        let mut out = Vec::with_capacity(count);
        for handle in handles {
            match handle.join() {
                Ok(part) => out.extend(part),
                Err(payload) => std::panic::resume_unwind(payload),
            }
        }
        out
    })
}

/// WASM fallback: sequential map (no threads available).
#[cfg(target_arch = "wasm32")]
pub(crate) fn par_map<T, R, F>(items: &[T], _config: &ParConfig, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    items.iter().map(&f).collect()
}
