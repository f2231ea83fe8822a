//! # Tether Types
//!
//! Shared value types for the Tether offline-sync core.
//!
//! This crate provides:
//! - The [`Entity`] trait and the dynamic [`Document`] record
//! - Temp-id generation for entities created offline
//! - The translated [`Query`] value and its wire form
//! - Aggregation descriptors ([`ReduceFn`], [`GroupedResult`])

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entity;
mod id;
mod query;
mod reduce;

pub use entity::{Document, Entity, Metadata};
pub use id::{is_temp_id, temp_id, TEMP_ID_PREFIX};
pub use query::{Query, WireQuery};
pub use reduce::{GroupedResult, ReduceFn};
