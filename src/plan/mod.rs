//! Planning: proposals, their generation, and cover selection.
//!
//! - `proposal`: arena of costed candidate routes, each serving one
//!   output endpoint, parented on an input endpoint or on a step of
//!   another proposal (fan-out).
//! - `generator`: BFS layering that fills the arena — direct
//!   input→output routes first, then branches off intermediate steps.
//! - `selector`: dynamic-programming minimum-cost exact cover over the
//!   output set.

pub mod generator;
pub mod proposal;
pub mod selector;

pub use generator::{PlanStats, PlannerConfig, ProposalGenerator};
pub use proposal::{
    Proposal, ProposalArena, ProposalId, ProposalParent, Steps, TransformationStep,
};
pub use selector::select_cover;
