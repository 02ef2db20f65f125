// src/aggregator/mod.rs
//! Pending-sample aggregation and drain signalling.

mod drain;
mod store;

pub use drain::DrainCoordinator;
pub use store::AggregationStore;
