//! Auto-routing transformation planner.
//!
//! Given input endpoints carrying typed streams, output endpoints
//! demanding typed streams, and a catalog of single-input/single-output
//! transformation factories, the bin synthesizes the minimum-cost element
//! graph that delivers every output from some input — sharing
//! intermediate results through fan-out where that is cheaper.
//!
//! ## Core Modules
//! - `caps`: capability sets and their algebra (intersect/union/fixate)
//! - `factory`: factory + element traits, klass masks, utility factories
//! - `index`: the precomputed catalog the planner enumerates over
//! - `policy`: per-domain hooks (catalog, route/chain validation, cost)
//!
//! ## Planning
//! - `chain`: lazy bounded-length enumeration, composable validators,
//!   sandbox negotiation and costing
//! - `plan`: proposal arena, BFS branch layering, DP exact-cover
//!   selection
//!
//! ## The Bin
//! - `graph`: endpoints and events, the live element graph, the
//!   instantiator, and [`RouteBin`] — the lock-and-condvar rebuild state
//!   machine
//!
//! # Usage
//!
//! ```
//! use autoroute::caps::Caps;
//! use autoroute::factory::CapsTransformFactory;
//! use autoroute::graph::endpoint::BoundaryEvent;
//! use autoroute::policy::Policy;
//! use autoroute::RouteBin;
//!
//! let policy = Policy::new().with_catalog(|| {
//!     vec![CapsTransformFactory::new(
//!         "rgb2yuv",
//!         "Converter/Video",
//!         Caps::media("video/x-raw-rgb"),
//!         Caps::media("video/x-raw-yuv"),
//!     ) as _]
//! });
//!
//! let bin = RouteBin::new(policy);
//! let input = bin.add_input("in");
//! let output = bin.add_output("out", Caps::media("video/x-raw-yuv")).unwrap();
//!
//! // Declaring caps on the last undescribed input triggers planning.
//! bin.handle_input_event(
//!     input,
//!     BoundaryEvent::caps_declared(Caps::media("video/x-raw-rgb")),
//! )
//! .unwrap();
//! assert!(bin.output_connected(output));
//! ```

pub mod caps;
pub mod chain;
pub mod error;
pub mod factory;
pub mod graph;
pub mod hash;
pub mod index;
pub mod plan;
pub mod policy;

// =============================================================================
// Re-exports for public API
// =============================================================================

pub use caps::{Caps, FieldValue, Structure};
pub use error::{RouteError, RouteResult};
pub use factory::{
    CapsTransformFactory, ElementFactory, KlassMask, NullSinkFactory, PadDirection, PadTemplate,
    SplitterFactory, TransformElement,
};
pub use graph::{
    BoundaryEvent, EndpointDirection, EndpointId, EventKind, LiveGraph, NodeKind, Port,
    RebuildState, RouteBin,
};
pub use hash::StableHasher;
pub use index::{FactoryEntry, FactoryIndex};
pub use plan::{PlanStats, PlannerConfig, Proposal, ProposalId, ProposalParent, TransformationStep};
pub use policy::Policy;
