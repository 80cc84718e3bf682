//! Proposal generation.
//!
//! Breadth-first layering: layer 0 holds the best direct route for every
//! (input endpoint, output endpoint) pair; each later layer branches off
//! the intermediate steps of the previous layer's proposals, so shared
//! prefixes become fan-out points. Generation stops when a layer yields
//! nothing.
//!
//! Per (parent, output) pair, passthrough is probed first, then chain
//! lengths in increasing order; the first length that yields a proposal
//! settles the pair. `PlannerConfig::keep_alternates` widens that to
//! every successful chain at the settled length, letting the selector
//! choose among them.

use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::caps::Caps;
use crate::chain::tester::TestedChain;
use crate::chain::{ChainGenerator, ChainTester, ElementCache, MAX_CHAIN_LENGTH};
use crate::graph::endpoint::EndpointId;
use crate::index::FactoryIndex;
use crate::plan::proposal::{Proposal, ProposalArena, ProposalId, ProposalParent};
use crate::policy::Policy;

// =============================================================================
// Config and stats
// =============================================================================

/// Tunables for one planning pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlannerConfig {
    /// Keep every successful chain at the shortest viable length for a
    /// (parent, output) pair instead of only the first one found.
    pub keep_alternates: bool,
}

/// Counters from one generation pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanStats {
    /// Chains handed to the sandbox tester.
    pub candidates_tested: usize,
    /// Chains the sandbox tester rejected.
    pub candidates_rejected: usize,
    /// Proposals pushed into the arena.
    pub proposals_generated: usize,
    /// BFS layers produced, counting the direct layer.
    pub layers: usize,
}

// =============================================================================
// ProposalGenerator
// =============================================================================

/// Fills a [`ProposalArena`] for one planning pass.
pub struct ProposalGenerator<'a> {
    index: &'a FactoryIndex,
    policy: &'a Policy,
    config: PlannerConfig,
}

impl<'a> ProposalGenerator<'a> {
    pub fn new(index: &'a FactoryIndex, policy: &'a Policy, config: PlannerConfig) -> Self {
        Self {
            index,
            policy,
            config,
        }
    }

    /// Generate proposals for the given inputs (with their declared caps)
    /// and outputs (with their advertised downstream caps).
    pub fn generate(
        &self,
        inputs: &[(EndpointId, Caps)],
        outputs: &[(EndpointId, Caps)],
    ) -> (ProposalArena, PlanStats) {
        let mut arena = ProposalArena::new();
        let mut stats = PlanStats::default();
        let mut cache = ElementCache::new();
        let tester = ChainTester::new(self.index, self.policy);

        self.policy.begin_building_graph();

        // Layer 0: direct input → output routes.
        let mut layer: Vec<ProposalId> = Vec::new();
        for (input, sink_caps) in inputs {
            for (output, downstream_caps) in outputs {
                if !self.policy.validate_route(sink_caps, downstream_caps) {
                    continue;
                }
                for tested in
                    self.probe(&tester, &mut cache, sink_caps, downstream_caps, &mut stats)
                {
                    let id = arena.push(Proposal::new(
                        ProposalParent::Root(*input),
                        *output,
                        tested.steps,
                        tested.cost,
                    ));
                    stats.proposals_generated += 1;
                    layer.push(id);
                }
            }
        }
        stats.layers = 1;

        // Layers k > 0: branch off every intermediate step of the
        // previous layer, toward outputs not already on the ancestor
        // chain.
        while !layer.is_empty() {
            let mut next_layer: Vec<ProposalId> = Vec::new();
            for &parent_id in &layer {
                let step_count = arena.get(parent_id).steps().len();
                for step in 0..step_count {
                    let branch_caps = arena.get(parent_id).steps()[step].src_caps().clone();
                    for (output, downstream_caps) in outputs {
                        if arena.covers(parent_id, *output) {
                            continue;
                        }
                        if !self.policy.validate_route(&branch_caps, downstream_caps) {
                            continue;
                        }
                        for tested in self.probe(
                            &tester,
                            &mut cache,
                            &branch_caps,
                            downstream_caps,
                            &mut stats,
                        ) {
                            let id = arena.push(Proposal::new(
                                ProposalParent::Branch {
                                    proposal: parent_id,
                                    step: step as u32,
                                },
                                *output,
                                tested.steps,
                                tested.cost,
                            ));
                            stats.proposals_generated += 1;
                            next_layer.push(id);
                        }
                    }
                }
            }
            if next_layer.is_empty() {
                break;
            }
            stats.layers += 1;
            layer = next_layer;
        }

        debug!(
            target: "autoroute::plan",
            proposals = stats.proposals_generated,
            tested = stats.candidates_tested,
            rejected = stats.candidates_rejected,
            layers = stats.layers,
            "proposal generation finished"
        );
        (arena, stats)
    }

    /// Probe one (parent, output) pair: passthrough first, then chain
    /// lengths in increasing order. The first viable length settles the
    /// pair; `keep_alternates` keeps every success at that length.
    fn probe(
        &self,
        tester: &ChainTester<'_>,
        cache: &mut ElementCache,
        sink_caps: &Caps,
        downstream_caps: &Caps,
        stats: &mut PlanStats,
    ) -> SmallVec<[TestedChain; 1]> {
        let mut found: SmallVec<[TestedChain; 1]> = SmallVec::new();

        if let Some(tested) = tester.test_passthrough(sink_caps, downstream_caps) {
            found.push(tested);
            return found;
        }

        for length in 1..=MAX_CHAIN_LENGTH {
            let mut generator = ChainGenerator::new(length, self.index.len());
            while let Some(chain) = generator.next(|candidate| {
                self.policy
                    .validate_chain(sink_caps, downstream_caps, candidate, self.index)
            }) {
                stats.candidates_tested += 1;
                match tester.test_chain(cache, &chain, sink_caps, downstream_caps) {
                    Some(tested) => {
                        trace!(
                            target: "autoroute::plan",
                            chain = ?chain.as_slice(),
                            cost = tested.cost,
                            "viable chain"
                        );
                        found.push(tested);
                        if !self.config.keep_alternates {
                            return found;
                        }
                    }
                    None => stats.candidates_rejected += 1,
                }
            }
            if !found.is_empty() {
                return found;
            }
        }
        found
    }
}

// =============================================================================
// Tests
// =============================================================================
