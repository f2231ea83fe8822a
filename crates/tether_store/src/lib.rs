//! # Tether Store
//!
//! Policy-driven offline-sync engine over a local cache, a pending-write
//! queue and a remote data service.
//!
//! This crate provides:
//! - Read/write policies and the four [`StoreType`]s
//! - The [`NetworkGateway`] transport seam (plus [`MockGateway`])
//! - Policy-driven read and write request algorithms
//! - The delta-set incremental fetch protocol
//! - Bounded-concurrency bulk pull, push, and sync
//! - The per-collection [`DataStore`] façade and top-level [`Client`]
//!
//! ## Key Invariants
//!
//! - At most one governing pending action per entity
//! - A temp id is promoted to the server id by an atomic cache rename
//! - Pull demands an empty pending-write queue
//! - Delta checkpoints advance only on a successful fetch

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod context;
mod delta;
mod error;
mod gateway;
mod policy;
mod pull;
mod push;
mod read;
mod store;
mod token;
mod write;

pub use client::Client;
pub use config::StoreConfig;
pub use error::{codes, ErrorCategory, StoreError, StoreResult};
pub use gateway::{
    DeltaResponse, IndexedError, MockGateway, MultiInsertResult, NetworkGateway, Timestamped,
};
pub use policy::{ReadPolicy, StoreType, WritePolicy};
pub use pull::{PullPageError, PullResult};
pub use push::{PushError, PushResult};
pub use store::{DataStore, SyncOutcome};
pub use token::CancellationToken;
pub use write::RemoveResult;
