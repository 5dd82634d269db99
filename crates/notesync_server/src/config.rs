//! Server configuration.

use uuid::Uuid;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum entries accepted in one push.
    pub max_push_batch: usize,
    /// Page size used when a pull does not ask for one.
    pub default_page_size: usize,
    /// Upper bound on any pull page.
    pub max_page_size: usize,
    /// Secret used to sign sync tokens.
    pub token_secret: Vec<u8>,
    /// Keep push conflicts in an inbox until resolved.
    pub defer_conflicts: bool,
    /// Flush owner logs after every append.
    pub sync_on_append: bool,
}

impl ServerConfig {
    /// Creates a configuration with a random token secret.
    ///
    /// Tokens issued under a random secret do not survive a restart;
    /// clients then fall back to a full resync.
    pub fn new() -> Self {
        Self {
            max_push_batch: 100,
            default_page_size: 100,
            max_page_size: 1000,
            token_secret: Uuid::new_v4().as_bytes().to_vec(),
            defer_conflicts: true,
            sync_on_append: true,
        }
    }

    /// Sets the maximum push batch size.
    pub fn with_max_push_batch(mut self, size: usize) -> Self {
        self.max_push_batch = size;
        self
    }

    /// Sets the default pull page size.
    pub fn with_default_page_size(mut self, size: usize) -> Self {
        self.default_page_size = size;
        self
    }

    /// Sets the maximum pull page size.
    pub fn with_max_page_size(mut self, size: usize) -> Self {
        self.max_page_size = size;
        self
    }

    /// Sets the token signing secret.
    pub fn with_token_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.token_secret = secret.into();
        self
    }

    /// Enables or disables the deferred conflict inbox.
    pub fn with_defer_conflicts(mut self, defer: bool) -> Self {
        self.defer_conflicts = defer;
        self
    }

    /// Sets whether owner logs flush on every append.
    pub fn with_sync_on_append(mut self, sync: bool) -> Self {
        self.sync_on_append = sync;
        self
    }

    /// Page size for a pull that asked for `requested`.
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_push_batch, 100);
        assert_eq!(config.default_page_size, 100);
        assert!(config.defer_conflicts);
        assert_eq!(config.token_secret.len(), 16);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new()
            .with_max_push_batch(10)
            .with_max_page_size(50)
            .with_token_secret(b"k".to_vec())
            .with_defer_conflicts(false);
        assert_eq!(config.max_push_batch, 10);
        assert_eq!(config.token_secret, b"k".to_vec());
        assert!(!config.defer_conflicts);
    }

    #[test]
    fn page_size_is_clamped() {
        let config = ServerConfig::new().with_max_page_size(50);
        assert_eq!(config.page_size(None), 50);
        assert_eq!(config.page_size(Some(0)), 1);
        assert_eq!(config.page_size(Some(10)), 10);
        assert_eq!(config.page_size(Some(5000)), 50);
    }
}
