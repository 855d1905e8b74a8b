//! Connection configuration.

/// Configuration for a framing [`Connection`](crate::Connection).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum payload bytes buffered per outgoing frame.
    ///
    /// A message writer flushes a non-final frame whenever its buffer
    /// reaches this size, so arbitrarily large messages never hold more
    /// than one frame's payload in memory.
    ///
    /// Default: 4 KB (4096)
    pub write_buffer_size: usize,

    /// Read-buffer refill size in bytes.
    ///
    /// Default: 4 KB (4096)
    pub read_buffer_size: usize,

    /// Maximum cumulative payload bytes of a single incoming logical
    /// message. `0` means unlimited. Control frames are exempt (they are
    /// capped at 125 bytes by the protocol itself).
    ///
    /// Default: 0 (unlimited)
    pub read_limit: usize,

    /// Accept unmasked frames from clients (server only).
    ///
    /// RFC 6455 requires clients to mask all frames; this escape hatch is
    /// for testing against non-compliant peers.
    ///
    /// Default: false
    pub accept_unmasked_frames: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            write_buffer_size: 4096,
            read_buffer_size: 4096,
            read_limit: 0,
            accept_unmasked_frames: false,
        }
    }
}

impl Config {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum payload bytes per outgoing frame.
    ///
    /// Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size.max(1);
        self
    }

    /// Set the read-buffer refill size.
    #[must_use]
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Set the per-message read limit (0 = unlimited).
    #[must_use]
    pub const fn with_read_limit(mut self, limit: usize) -> Self {
        self.read_limit = limit;
        self
    }

    /// Accept unmasked client frames (non-compliant, testing only).
    #[must_use]
    pub const fn with_accept_unmasked_frames(mut self, accept: bool) -> Self {
        self.accept_unmasked_frames = accept;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.write_buffer_size, 4096);
        assert_eq!(config.read_buffer_size, 4096);
        assert_eq!(config.read_limit, 0);
        assert!(!config.accept_unmasked_frames);
    }

    #[test]
    fn test_builder() {
        let config = Config::new()
            .with_write_buffer_size(512)
            .with_read_buffer_size(256)
            .with_read_limit(1 << 20)
            .with_accept_unmasked_frames(true);
        assert_eq!(config.write_buffer_size, 512);
        assert_eq!(config.read_buffer_size, 256);
        assert_eq!(config.read_limit, 1 << 20);
        assert!(config.accept_unmasked_frames);
    }

    #[test]
    fn test_write_buffer_size_clamped() {
        let config = Config::new().with_write_buffer_size(0);
        assert_eq!(config.write_buffer_size, 1);
    }
}
