//! Data directory configuration.

/// Configuration for opening a data directory.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to flush the owner log after every append.
    pub sync_on_append: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_append: true,
        }
    }
}

impl Config {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the directory if missing.
    #[must_use]
    pub const fn with_create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to flush after every append.
    #[must_use]
    pub const fn with_sync_on_append(mut self, value: bool) -> Self {
        self.sync_on_append = value;
        self
    }
}
