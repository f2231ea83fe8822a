//! Store behavior configuration.

/// Behavior knobs for a data store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether eligible network reads use the delta-set protocol.
    pub delta_set_enabled: bool,
    /// Page size of the bulk puller.
    pub pull_page_size: u64,
    /// Capacity of the puller's completed-page channel. A full channel
    /// blocks page producers; this is the pull backpressure bound.
    pub pull_channel_capacity: usize,
    /// Maximum number of entities per multi-insert network call.
    pub multi_insert_batch_size: usize,
}

impl StoreConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            delta_set_enabled: false,
            pull_page_size: 10_000,
            pull_channel_capacity: 8,
            multi_insert_batch_size: 100,
        }
    }

    /// Enables or disables delta-set fetching.
    #[must_use]
    pub fn with_delta_set(mut self, enabled: bool) -> Self {
        self.delta_set_enabled = enabled;
        self
    }

    /// Sets the bulk-pull page size.
    #[must_use]
    pub fn with_pull_page_size(mut self, size: u64) -> Self {
        self.pull_page_size = size.max(1);
        self
    }

    /// Sets the puller channel capacity.
    #[must_use]
    pub fn with_pull_channel_capacity(mut self, capacity: usize) -> Self {
        self.pull_channel_capacity = capacity.max(1);
        self
    }

    /// Sets the multi-insert batch size.
    #[must_use]
    pub fn with_multi_insert_batch_size(mut self, size: usize) -> Self {
        self.multi_insert_batch_size = size.max(1);
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}
