// src/dag/mod.rs

//! DAG representation and levelling.
//!
//! - [`graph`] holds the validated node set with both edge directions.
//! - [`levels`] groups nodes into priority levels that both executors use
//!   to size and order their work.

pub mod graph;
pub mod levels;

pub use graph::{DagGraph, NodeDescriptor};
pub use levels::PriorityLevels;
