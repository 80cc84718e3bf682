//! Proposal arena.
//!
//! A proposal is a costed candidate route delivering one output endpoint,
//! either straight from an input endpoint or branching off a step of
//! another proposal. Proposals form a forest; instead of parent pointers
//! they live in an arena and refer to each other by [`ProposalId`]
//! handle, so branches stay cheap and ownership stays simple: the arena
//! belongs to one planning pass and is consumed by instantiation.

use std::fmt;

use smallvec::SmallVec;

use crate::caps::Caps;
use crate::chain::MAX_CHAIN_LENGTH;
use crate::graph::endpoint::EndpointId;

// =============================================================================
// TransformationStep
// =============================================================================

/// One materialized chain position: a factory-index entry plus the
/// fixated caps negotiated on each side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformationStep {
    entry: usize,
    sink_caps: Caps,
    src_caps: Caps,
}

impl TransformationStep {
    pub fn new(entry: usize, sink_caps: Caps, src_caps: Caps) -> Self {
        debug_assert!(sink_caps.is_fixed() && src_caps.is_fixed());
        Self {
            entry,
            sink_caps,
            src_caps,
        }
    }

    /// Position of the step's factory in the factory index.
    pub fn entry(&self) -> usize {
        self.entry
    }

    pub fn sink_caps(&self) -> &Caps {
        &self.sink_caps
    }

    pub fn src_caps(&self) -> &Caps {
        &self.src_caps
    }
}

/// Step list of one proposal, sink end first.
pub type Steps = SmallVec<[TransformationStep; MAX_CHAIN_LENGTH]>;

// =============================================================================
// Proposal
// =============================================================================

/// Where a proposal's chain input comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalParent {
    /// Fed directly by an input endpoint.
    Root(EndpointId),
    /// Fed by the output of `proposal`'s step `step` (fan-out).
    Branch { proposal: ProposalId, step: u32 },
}

/// A costed candidate route for one output endpoint.
///
/// Zero steps means passthrough: the parent's stream reaches
/// `src_endpoint` unchanged.
#[derive(Debug, Clone)]
pub struct Proposal {
    parent: ProposalParent,
    src_endpoint: EndpointId,
    steps: Steps,
    cost: u32,
}

impl Proposal {
    pub fn new(parent: ProposalParent, src_endpoint: EndpointId, steps: Steps, cost: u32) -> Self {
        Self {
            parent,
            src_endpoint,
            steps,
            cost,
        }
    }

    pub fn parent(&self) -> ProposalParent {
        self.parent
    }

    /// The output endpoint this proposal delivers.
    pub fn src_endpoint(&self) -> EndpointId {
        self.src_endpoint
    }

    pub fn steps(&self) -> &[TransformationStep] {
        &self.steps
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn is_passthrough(&self) -> bool {
        self.steps.is_empty()
    }
}

// =============================================================================
// ProposalId + arena
// =============================================================================

/// Handle into a [`ProposalArena`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProposalId(u32);

impl ProposalId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProposalId({})", self.0)
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p#{}", self.0)
    }
}

/// Arena of proposals for one planning pass.
#[derive(Debug, Default)]
pub struct ProposalArena {
    nodes: Vec<Proposal>,
}

impl ProposalArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a proposal and return its handle.
    ///
    /// A branch parent must already be in the arena, and the new
    /// proposal's output endpoint must not repeat along its ancestor
    /// chain (no cycles over output endpoints).
    pub fn push(&mut self, proposal: Proposal) -> ProposalId {
        if let ProposalParent::Branch { proposal: parent, .. } = proposal.parent() {
            debug_assert!(parent.index() < self.nodes.len());
            debug_assert!(
                !self
                    .ancestors(parent)
                    .any(|id| self.get(id).src_endpoint() == proposal.src_endpoint()),
                "output endpoint repeated along ancestor chain"
            );
        }
        let id = ProposalId(self.nodes.len() as u32);
        self.nodes.push(proposal);
        id
    }

    pub fn get(&self, id: ProposalId) -> &Proposal {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All handles in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = ProposalId> + use<> {
        (0..self.nodes.len() as u32).map(ProposalId)
    }

    /// Walk from `id` to its root, inclusive.
    pub fn ancestors(&self, id: ProposalId) -> Ancestors<'_> {
        Ancestors {
            arena: self,
            next: Some(id),
        }
    }

    /// The input endpoint at the root of `id`'s ancestor chain.
    pub fn root_endpoint(&self, id: ProposalId) -> EndpointId {
        let mut current = id;
        loop {
            match self.get(current).parent() {
                ProposalParent::Root(endpoint) => return endpoint,
                ProposalParent::Branch { proposal, .. } => current = proposal,
            }
        }
    }

    /// Output endpoints served along `id`'s ancestor chain, deepest
    /// first.
    pub fn covered_endpoints(&self, id: ProposalId) -> impl Iterator<Item = EndpointId> + '_ {
        self.ancestors(id).map(|a| self.get(a).src_endpoint())
    }

    /// Total cost along `id`'s ancestor chain.
    pub fn chain_cost(&self, id: ProposalId) -> u64 {
        self.ancestors(id).map(|a| self.get(a).cost() as u64).sum()
    }

    /// True when `endpoint` is served by `id` or one of its ancestors.
    pub fn covers(&self, id: ProposalId, endpoint: EndpointId) -> bool {
        self.covered_endpoints(id).any(|e| e == endpoint)
    }
}

/// Iterator over a proposal's ancestor chain, starting at the proposal
/// itself.
pub struct Ancestors<'a> {
    arena: &'a ProposalArena,
    next: Option<ProposalId>,
}

impl Iterator for Ancestors<'_> {
    type Item = ProposalId;

    fn next(&mut self) -> Option<ProposalId> {
        let current = self.next?;
        self.next = match self.arena.get(current).parent() {
            ProposalParent::Root(_) => None,
            ProposalParent::Branch { proposal, .. } => Some(proposal),
        };
        Some(current)
    }
}

// =============================================================================
// Tests
// =============================================================================
