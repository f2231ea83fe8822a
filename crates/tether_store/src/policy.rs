//! Read/write policies and store types.

/// How a read request consults cache and network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPolicy {
    /// Serve strictly from the network; refresh the cache as a side effect.
    ForceNetwork,
    /// Serve strictly from the local cache.
    ForceLocal,
    /// Deliver local results first, then return the network result.
    Both,
    /// Attempt the network; fall back to the cache on connectivity
    /// failures only.
    NetworkOtherwiseLocal,
}

/// How a write request touches cache, queue and network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// Network call only; cache and queue are untouched.
    ForceNetwork,
    /// Mutate the cache and enqueue a pending action; never call the
    /// network.
    ForceLocal,
    /// Mutate the cache, call the network, reconcile on success. Network
    /// failures propagate without a queue entry.
    NetworkThenLocal,
    /// Mutate the cache, call the network; on failure enqueue the
    /// equivalent pending action so the mutation is not lost.
    LocalThenNetwork,
}

/// A fixed (read, write) policy pair selected at store construction.
///
/// The pair is immutable for the lifetime of a `DataStore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreType {
    /// Fully offline-first: all traffic goes through cache and queue.
    Sync,
    /// Fully online: no local state at all.
    Network,
    /// Online when possible, degrading to local state when not.
    Auto,
    /// Cache-accelerated reads with authoritative network writes.
    Cache,
}

impl StoreType {
    /// The read policy of this store type.
    #[must_use]
    pub fn read_policy(self) -> ReadPolicy {
        match self {
            StoreType::Sync => ReadPolicy::ForceLocal,
            StoreType::Network => ReadPolicy::ForceNetwork,
            StoreType::Auto => ReadPolicy::NetworkOtherwiseLocal,
            StoreType::Cache => ReadPolicy::Both,
        }
    }

    /// The write policy of this store type.
    #[must_use]
    pub fn write_policy(self) -> WritePolicy {
        match self {
            StoreType::Sync => WritePolicy::ForceLocal,
            StoreType::Network => WritePolicy::ForceNetwork,
            StoreType::Auto => WritePolicy::LocalThenNetwork,
            StoreType::Cache => WritePolicy::NetworkThenLocal,
        }
    }

    /// True if the store keeps a local cache at all.
    #[must_use]
    pub fn has_local_state(self) -> bool {
        !matches!(self, StoreType::Network)
    }
}
