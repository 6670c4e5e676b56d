use std::time::Duration;

/// Controls descriptor loading and reload behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// How often the descriptor watch checks the file for changes.
    pub reload_poll_interval: Duration,
    /// Maximum bytes read from a descriptor file.
    pub max_descriptor_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            reload_poll_interval: Duration::from_secs(1),
            max_descriptor_size: 64 * 1024,
        }
    }
}
