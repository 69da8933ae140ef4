//! Buffer pool configuration.

use quarry_common::constants::{
    DEFAULT_PAGE_SIZE, DEFAULT_POOL_SIZE, DEFAULT_REPLACER_K, DISK_QUEUE_DEPTH, MIN_PAGE_SIZE,
};

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of page frames in the pool, fixed at construction.
    pub pool_size: usize,
    /// Page size in bytes; must match the disk manager's.
    pub page_size: usize,
    /// History depth K for the LRU-K replacer.
    pub replacer_k: usize,
    /// Bound of the disk scheduler's request queue.
    pub queue_depth: usize,
}

impl BufferPoolConfig {
    /// Creates a configuration with the given number of frames and defaults
    /// everywhere else.
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            page_size: DEFAULT_PAGE_SIZE,
            replacer_k: DEFAULT_REPLACER_K,
            queue_depth: DISK_QUEUE_DEPTH,
        }
    }

    /// Sets the page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets the replacer history depth.
    pub fn with_replacer_k(mut self, k: usize) -> Self {
        self.replacer_k = k;
        self
    }

    /// Sets the disk queue bound.
    pub fn with_queue_depth(mut self, queue_depth: usize) -> Self {
        self.queue_depth = queue_depth;
        self
    }

    /// Returns the total buffer memory this configuration implies.
    pub fn memory_usage(&self) -> usize {
        self.pool_size * self.page_size
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.pool_size == 0 {
            return Err("pool_size must be > 0");
        }
        if !self.page_size.is_power_of_two() {
            return Err("page_size must be a power of 2");
        }
        if self.page_size < MIN_PAGE_SIZE {
            return Err("page_size is below the minimum");
        }
        if self.replacer_k == 0 {
            return Err("replacer_k must be > 0");
        }
        if self.queue_depth == 0 {
            return Err("queue_depth must be > 0");
        }
        Ok(())
    }
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new() {
        let config = BufferPoolConfig::new(100);
        assert_eq!(config.pool_size, 100);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.replacer_k, DEFAULT_REPLACER_K);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = BufferPoolConfig::new(8)
            .with_page_size(8192)
            .with_replacer_k(3)
            .with_queue_depth(16);

        assert_eq!(config.page_size, 8192);
        assert_eq!(config.replacer_k, 3);
        assert_eq!(config.queue_depth, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_memory_usage() {
        let config = BufferPoolConfig::new(16).with_page_size(4096);
        assert_eq!(config.memory_usage(), 16 * 4096);
    }

    #[test]
    fn test_validation() {
        assert!(BufferPoolConfig::new(0).validate().is_err());
        assert!(BufferPoolConfig::new(8)
            .with_page_size(1000)
            .validate()
            .is_err());
        assert!(BufferPoolConfig::new(8)
            .with_page_size(256)
            .validate()
            .is_err());
        assert!(BufferPoolConfig::new(8)
            .with_replacer_k(0)
            .validate()
            .is_err());
        assert!(BufferPoolConfig::new(8)
            .with_queue_depth(0)
            .validate()
            .is_err());
    }
}
