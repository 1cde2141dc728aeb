//! Sink configuration.

use crate::error::{CoreError, CoreResult};
use crate::segment::SEGMENT_OVERHEAD;
use std::time::Duration;

/// Number of segment buffers allocated at configure time.
pub const DEFAULT_MIN_POOL_BUFFERS: usize = 2;

/// Upper bound on the number of segment buffers; configurations may lower
/// it but not raise it.
pub const DEFAULT_MAX_POOL_BUFFERS: usize = 8;

/// Configuration for a stob sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    /// Size of one segment in bytes, header and trailer included.
    pub segment_size: u64,

    /// Size of the circular repository region in bytes. Only whole segments
    /// are used.
    pub stob_size: u64,

    /// A partially filled segment is persisted once this long has passed
    /// since the previous persist.
    pub flush_timeout: Duration,

    /// Segment buffers allocated up front.
    pub min_pool_buffers: usize,

    /// Most segment buffers the pool may grow to.
    pub max_pool_buffers: usize,

    /// Whether shutdown syncs the store after the final write.
    pub sync_on_shutdown: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            segment_size: 256 * 1024,            // 256 KiB
            stob_size: 64 * 1024 * 1024,         // 64 MiB
            flush_timeout: Duration::from_secs(5),
            min_pool_buffers: DEFAULT_MIN_POOL_BUFFERS,
            max_pool_buffers: DEFAULT_MAX_POOL_BUFFERS,
            sync_on_shutdown: true,
        }
    }
}

impl SinkConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the segment size.
    #[must_use]
    pub const fn segment_size(mut self, size: u64) -> Self {
        self.segment_size = size;
        self
    }

    /// Sets the repository size.
    #[must_use]
    pub const fn stob_size(mut self, size: u64) -> Self {
        self.stob_size = size;
        self
    }

    /// Sets the partial-segment flush timeout.
    #[must_use]
    pub const fn flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    /// Sets the initial and maximum number of segment buffers.
    #[must_use]
    pub const fn pool_buffers(mut self, min: usize, max: usize) -> Self {
        self.min_pool_buffers = min;
        self.max_pool_buffers = max;
        self
    }

    /// Sets whether shutdown syncs the store.
    #[must_use]
    pub const fn sync_on_shutdown(mut self, value: bool) -> Self {
        self.sync_on_shutdown = value;
        self
    }

    /// Checks the configuration on its own, without a store.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] describing the first violated
    /// constraint.
    pub fn validate(&self) -> CoreResult<()> {
        if self.segment_size == 0 {
            return Err(CoreError::invalid_config("segment size must be positive"));
        }
        if self.segment_size >= i32::MAX as u64 {
            return Err(CoreError::invalid_config(format!(
                "segment size {} must be below {}",
                self.segment_size,
                i32::MAX
            )));
        }
        if self.segment_size <= SEGMENT_OVERHEAD as u64 {
            return Err(CoreError::invalid_config(format!(
                "segment size {} leaves no room for records after {} bytes of header and trailer",
                self.segment_size, SEGMENT_OVERHEAD
            )));
        }
        if self.stob_size < self.segment_size {
            return Err(CoreError::invalid_config(format!(
                "stob size {} is smaller than one segment of {}",
                self.stob_size, self.segment_size
            )));
        }
        if self.flush_timeout.is_zero() {
            return Err(CoreError::invalid_config("flush timeout must be positive"));
        }
        if self.min_pool_buffers < DEFAULT_MIN_POOL_BUFFERS {
            return Err(CoreError::invalid_config(format!(
                "at least {DEFAULT_MIN_POOL_BUFFERS} segment buffers are required"
            )));
        }
        if self.max_pool_buffers < self.min_pool_buffers {
            return Err(CoreError::invalid_config(format!(
                "max pool buffers {} is below min pool buffers {}",
                self.max_pool_buffers, self.min_pool_buffers
            )));
        }
        if self.max_pool_buffers > DEFAULT_MAX_POOL_BUFFERS {
            return Err(CoreError::invalid_config(format!(
                "max pool buffers {} exceeds the limit of {DEFAULT_MAX_POOL_BUFFERS}",
                self.max_pool_buffers
            )));
        }
        Ok(())
    }

    /// Checks that segments are whole blocks of `block_size` bytes.
    pub(crate) fn validate_block_size(&self, block_size: u64) -> CoreResult<()> {
        if block_size == 0 || self.segment_size % block_size != 0 {
            return Err(CoreError::invalid_config(format!(
                "segment size {} is not a multiple of the store block size {}",
                self.segment_size, block_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SinkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_pool_buffers, 2);
        assert_eq!(config.max_pool_buffers, 8);
        assert!(config.sync_on_shutdown);
    }

    #[test]
    fn builder_pattern() {
        let config = SinkConfig::new()
            .segment_size(4096)
            .stob_size(10 * 4096)
            .flush_timeout(Duration::from_millis(250))
            .pool_buffers(3, 5)
            .sync_on_shutdown(false);

        assert_eq!(config.segment_size, 4096);
        assert_eq!(config.stob_size, 40960);
        assert_eq!(config.flush_timeout, Duration::from_millis(250));
        assert_eq!((config.min_pool_buffers, config.max_pool_buffers), (3, 5));
        assert!(!config.sync_on_shutdown);
    }

    #[test]
    fn zero_segment_size_rejected() {
        let err = SinkConfig::new().segment_size(0).validate().unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn oversized_segment_rejected() {
        let config = SinkConfig::new()
            .segment_size(i32::MAX as u64)
            .stob_size(u64::MAX);
        assert!(config.validate().is_err());
    }

    #[test]
    fn segment_must_hold_a_record() {
        let config = SinkConfig::new().segment_size(SEGMENT_OVERHEAD as u64);
        assert!(config.validate().is_err());
        let config = SinkConfig::new().segment_size(SEGMENT_OVERHEAD as u64 + 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn stob_smaller_than_segment_rejected() {
        let config = SinkConfig::new().segment_size(4096).stob_size(4095);
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = SinkConfig::new().flush_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn pool_bounds_checked() {
        assert!(SinkConfig::new().pool_buffers(1, 8).validate().is_err());
        assert!(SinkConfig::new().pool_buffers(4, 3).validate().is_err());
        assert!(SinkConfig::new().pool_buffers(2, 2).validate().is_ok());
        assert!(SinkConfig::new().pool_buffers(2, 8).validate().is_ok());
        let err = SinkConfig::new().pool_buffers(2, 20).validate().unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("limit of 8"));
    }

    #[test]
    fn block_multiple_checked() {
        let config = SinkConfig::new().segment_size(4096);
        assert!(config.validate_block_size(512).is_ok());
        assert!(config.validate_block_size(4096).is_ok());
        assert!(config.validate_block_size(8192).is_err());
        assert!(SinkConfig::new().segment_size(300).validate_block_size(256).is_err());
    }
}
