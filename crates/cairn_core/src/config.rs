//! Store configuration.

/// Configuration for opening a segment store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Capacity ceiling of a single archive container in bytes.
    pub archive_capacity: u64,

    /// Maximum number of decoded segments held by the cache.
    pub cache_capacity: usize,

    /// Whether to sync the archive after every append (safer but slower).
    pub sync_on_write: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            archive_capacity: 256 * 1024 * 1024, // 256 MiB
            cache_capacity: 1000,
            sync_on_write: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-archive capacity ceiling.
    #[must_use]
    pub const fn archive_capacity(mut self, bytes: u64) -> Self {
        self.archive_capacity = bytes;
        self
    }

    /// Sets the maximum number of cached segments.
    #[must_use]
    pub const fn cache_capacity(mut self, entries: usize) -> Self {
        self.cache_capacity = entries;
        self
    }

    /// Sets whether to sync the archive after every append.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }
}
