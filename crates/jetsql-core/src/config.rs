//! Join execution configuration.

/// Default cap on materialized right-side rows.
pub const DEFAULT_MAX_BUILD_ROWS: usize = 10_000_000;

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(4)
        .max(1)
}

/// Configuration for join execution.
#[derive(Debug, Clone)]
pub struct JoinConfig {
    /// Number of worker tasks used when left input is split into partitions.
    pub parallelism: usize,

    /// Maximum rows materialized from a right relation. None means unlimited.
    pub max_build_rows: Option<usize>,

    /// Expected right-side row count, used to pre-size the hash table.
    pub hash_capacity_hint: usize,

    /// Whether to record join counters in [`JoinMetrics`](crate::metrics::JoinMetrics).
    pub collect_metrics: bool,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            max_build_rows: Some(DEFAULT_MAX_BUILD_ROWS),
            hash_capacity_hint: 1024,
            collect_metrics: true,
        }
    }
}

impl JoinConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker tasks.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Set the build-side row limit.
    pub fn with_max_build_rows(mut self, max: usize) -> Self {
        self.max_build_rows = Some(max);
        self
    }

    /// Remove the build-side row limit.
    pub fn unlimited_build(mut self) -> Self {
        self.max_build_rows = None;
        self
    }

    /// Set the hash table sizing hint.
    pub fn with_hash_capacity_hint(mut self, hint: usize) -> Self {
        self.hash_capacity_hint = hint;
        self
    }

    /// Enable or disable metrics collection.
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.collect_metrics = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = JoinConfig::default();
        assert!(config.parallelism >= 1);
        assert_eq!(config.max_build_rows, Some(DEFAULT_MAX_BUILD_ROWS));
        assert!(config.collect_metrics);
    }

    #[test]
    fn test_builder() {
        let config = JoinConfig::new()
            .with_parallelism(0)
            .with_max_build_rows(10)
            .with_metrics(false);
        assert_eq!(config.parallelism, 1);
        assert_eq!(config.max_build_rows, Some(10));
        assert!(!config.collect_metrics);

        assert_eq!(config.unlimited_build().max_build_rows, None);
    }
}
