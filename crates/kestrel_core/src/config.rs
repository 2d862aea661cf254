//! Database configuration.

use std::time::Duration;

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of storage collections created for each new class.
    ///
    /// New records are spread over a class's collections round-robin.
    pub collections_per_class: u32,

    /// Number of mutexes in the commit lock table.
    ///
    /// Commits only serialize when they touch a record or unique key that
    /// hashes to a shared stripe.
    pub lock_stripes: usize,

    /// Commits slower than this are logged at `warn` level.
    pub slow_commit_threshold: Duration,

    /// Maximum number of records a transaction keeps in its load cache.
    ///
    /// Versions observed by loads are always kept for validation; only the
    /// decoded records are subject to this limit.
    pub record_cache_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collections_per_class: 1,
            lock_stripes: 64,
            slow_commit_threshold: Duration::from_millis(250),
            record_cache_limit: usize::MAX,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of collections per class.
    #[must_use]
    pub const fn collections_per_class(mut self, count: u32) -> Self {
        self.collections_per_class = count;
        self
    }

    /// Sets the number of commit lock stripes.
    #[must_use]
    pub const fn lock_stripes(mut self, count: usize) -> Self {
        self.lock_stripes = count;
        self
    }

    /// Sets the slow commit warning threshold.
    #[must_use]
    pub const fn slow_commit_threshold(mut self, threshold: Duration) -> Self {
        self.slow_commit_threshold = threshold;
        self
    }

    /// Sets the per-transaction record cache limit.
    #[must_use]
    pub const fn record_cache_limit(mut self, limit: usize) -> Self {
        self.record_cache_limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.collections_per_class, 1);
        assert_eq!(config.lock_stripes, 64);
        assert_eq!(config.slow_commit_threshold, Duration::from_millis(250));
        assert_eq!(config.record_cache_limit, usize::MAX);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .collections_per_class(4)
            .lock_stripes(8)
            .record_cache_limit(16);

        assert_eq!(config.collections_per_class, 4);
        assert_eq!(config.lock_stripes, 8);
        assert_eq!(config.record_cache_limit, 16);
    }
}
