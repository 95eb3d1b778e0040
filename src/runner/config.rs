//! Runner configuration.

/// Tuning knobs for a [`WorkflowRunner`](super::WorkflowRunner).
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// Maximum number of concurrently in-flight task attempts. Ready tasks
    /// beyond the limit queue FIFO until a slot frees up.
    pub max_parallel: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_parallel: Self::resolve_max_parallel(None),
        }
    }
}

impl RunnerConfig {
    /// Environment override for the parallelism limit.
    pub const MAX_PARALLEL_ENV: &'static str = "TASKLOOM_MAX_PARALLEL";

    fn resolve_max_parallel(provided: Option<usize>) -> usize {
        if let Some(limit) = provided {
            return limit.max(1);
        }
        dotenvy::dotenv().ok();
        std::env::var(Self::MAX_PARALLEL_ENV)
            .ok()
            .and_then(|raw| raw.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
    }

    /// Explicit parallelism limit (clamped to at least 1).
    #[must_use]
    pub fn with_max_parallel(mut self, limit: usize) -> Self {
        self.max_parallel = limit.max(1);
        self
    }
}
