//! The bin's outward surface and its live graph.
//!
//! - `endpoint`: input/output endpoints, boundary events, sticky storage.
//! - `live`: the materialized element graph, drain propagation, and
//!   structural signatures.
//! - `instantiate`: turns a selected proposal cover into a live graph,
//!   inserting splitters where streams fan out and null sinks where
//!   inputs go unused.
//! - `rebuild`: [`rebuild::RouteBin`], the lock-and-condvar state machine
//!   that owns everything above.

pub mod endpoint;
pub mod instantiate;
pub mod live;
pub mod rebuild;

pub use endpoint::{BoundaryEvent, EndpointDirection, EndpointId, EventKind};
pub use live::{LiveGraph, NodeId, NodeKind, Port};
pub use rebuild::{RebuildState, RouteBin};
