//! The bin: structural lock, rebuild state machine, planning triggers.
//!
//! One mutex serializes every structural operation — endpoint add/remove,
//! capability declaration, planning, graph swap — and one condvar parks
//! input-side operations that arrive while the graph is being replaced.
//!
//! The rebuild protocol is an explicit state machine:
//!
//! ```text
//! Idle --(inputs fully described | needs-reconfigure flagged)--> Draining
//! Draining --(every awaiting output acked the drain marker)--> Rebuilding
//! Rebuilding --(new graph installed, latches cleared)--> Idle
//! ```
//!
//! Drain markers propagate structurally through the live graph, so the
//! drain acknowledgments arrive synchronously under the lock; the marker
//! is absorbed at each output and never forwarded downstream. An input
//! operation observing any state other than `Idle` waits on the condvar
//! and is released by the `Rebuilding → Idle` transition.

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::caps::Caps;
use crate::error::{RouteError, RouteResult};
use crate::graph::endpoint::{
    BoundaryEvent, EndpointDirection, EndpointId, EndpointTable, EventKind,
};
use crate::graph::instantiate::instantiate;
use crate::graph::live::LiveGraph;
use crate::index::FactoryIndex;
use crate::plan::{select_cover, PlannerConfig, PlanStats, ProposalGenerator};
use crate::policy::Policy;

// =============================================================================
// State machine
// =============================================================================

/// Where the bin is in the rebuild protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RebuildState {
    #[default]
    Idle,
    Draining,
    Rebuilding,
}

// =============================================================================
// RouteBin
// =============================================================================

struct BinShared {
    policy: Policy,
    config: PlannerConfig,
    endpoints: EndpointTable,
    index: Option<FactoryIndex>,
    live: LiveGraph,
    state: RebuildState,
    planned_once: bool,
    last_stats: PlanStats,
}

/// The auto-routing bin.
///
/// Configure endpoints, declare caps on the inputs, and the bin plans,
/// selects and materializes the transformation graph; downstream
/// consumers flag `needs-reconfigure` to trigger replanning.
pub struct RouteBin {
    shared: Mutex<BinShared>,
    resume: Condvar,
}

impl RouteBin {
    pub fn new(policy: Policy) -> Self {
        Self::with_config(policy, PlannerConfig::default())
    }

    pub fn with_config(policy: Policy, config: PlannerConfig) -> Self {
        Self {
            shared: Mutex::new(BinShared {
                policy,
                config,
                endpoints: EndpointTable::new(),
                index: None,
                live: LiveGraph::new(),
                state: RebuildState::Idle,
                planned_once: false,
                last_stats: PlanStats::default(),
            }),
            resume: Condvar::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Endpoint configuration
    // -------------------------------------------------------------------------

    /// Add an input endpoint. Planning starts once every input has
    /// declared caps.
    pub fn add_input(&self, name: &str) -> EndpointId {
        let mut shared = self.shared.lock();
        self.wait_idle(&mut shared);
        shared.endpoints.add(name, EndpointDirection::Input)
    }

    /// Add an output endpoint demanding `caps`. On a bin that already
    /// planned, this latches `needs-reconfigure` and replans immediately.
    pub fn add_output(&self, name: &str, caps: Caps) -> RouteResult<EndpointId> {
        let mut shared = self.shared.lock();
        self.wait_idle(&mut shared);
        let id = shared.endpoints.add(name, EndpointDirection::Output);
        let endpoint = shared.endpoints.get_mut(id).expect("endpoint just added");
        endpoint.set_current_caps(caps);
        endpoint.set_needs_reconfigure(true);
        if shared.planned_once && Self::inputs_described(&shared) {
            self.reconfigure(&mut shared)?;
        }
        Ok(id)
    }

    /// Remove an endpoint; replans when the removed endpoint was part of
    /// the live graph.
    pub fn remove_endpoint(&self, id: EndpointId) -> RouteResult<bool> {
        let mut shared = self.shared.lock();
        self.wait_idle(&mut shared);
        let was_live = shared.live.connected_inputs().contains(&id)
            || shared.live.output_connected(id);
        let removed = shared.endpoints.remove(id);
        if removed && was_live {
            if Self::inputs_described(&shared) {
                self.reconfigure(&mut shared)?;
            } else {
                // Nothing left to plan from; drop the stale graph rather
                // than keep links to a gone endpoint.
                shared.live = LiveGraph::new();
            }
        }
        Ok(removed)
    }

    /// Rebuild the factory index from the policy's catalog. The index is
    /// otherwise built once, on first use.
    pub fn rebuild_index(&self) -> RouteResult<()> {
        let mut shared = self.shared.lock();
        self.wait_idle(&mut shared);
        let catalog = shared.policy.catalog()?;
        shared.index = Some(FactoryIndex::build(&catalog));
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Input-side operations
    // -------------------------------------------------------------------------

    /// Deliver a boundary event on an input endpoint.
    ///
    /// Caps declarations are intercepted and may trigger planning; other
    /// sticky events are stored for replay; Eos outside a drain passes
    /// through untouched.
    pub fn handle_input_event(
        &self,
        input: EndpointId,
        event: BoundaryEvent,
    ) -> RouteResult<()> {
        let mut shared = self.shared.lock();
        self.wait_idle(&mut shared);
        Self::expect_direction(&shared, input, EndpointDirection::Input)?;

        match &event.kind {
            EventKind::CapsDeclared(caps) => {
                let caps = caps.clone();
                let endpoint = shared
                    .endpoints
                    .get_mut(input)
                    .expect("direction checked above");
                endpoint.set_current_caps(caps);
                endpoint.store_sticky(event);

                let first_description = !shared.planned_once;
                let flagged = shared
                    .endpoints
                    .outputs()
                    .any(|e| e.needs_reconfigure());
                if Self::inputs_described(&shared) && (first_description || flagged) {
                    self.reconfigure(&mut shared)?;
                }
            }
            EventKind::Eos => {
                // A stray end-of-stream while idle is the host's to
                // deliver; the bin only consumes it as a drain marker.
            }
            _ => {
                let endpoint = shared
                    .endpoints
                    .get_mut(input)
                    .expect("direction checked above");
                endpoint.store_sticky(event);
            }
        }
        Ok(())
    }

    /// Admit a buffer on an input endpoint. Blocks while the graph is
    /// being replaced; the actual dispatch belongs to the host and
    /// happens after this returns, outside the lock.
    pub fn push_buffer(&self, input: EndpointId) -> RouteResult<()> {
        let mut shared = self.shared.lock();
        self.wait_idle(&mut shared);
        Self::expect_direction(&shared, input, EndpointDirection::Input)?;
        Ok(())
    }

    /// Capability query on an endpoint: the filter intersected with the
    /// union of the opposite side's advertised caps and the relevant
    /// factory union, normalized.
    pub fn query_caps(&self, id: EndpointId, filter: &Caps) -> RouteResult<Caps> {
        let mut shared = self.shared.lock();
        self.wait_idle(&mut shared);
        let direction = shared
            .endpoints
            .get(id)
            .ok_or_else(|| RouteError::unknown_endpoint(format!("{id}")))?
            .direction();

        // The factory unions need the index; build it lazily when the
        // policy can provide a catalog.
        if shared.index.is_none() {
            if let Ok(catalog) = shared.policy.catalog() {
                shared.index = Some(FactoryIndex::build(&catalog));
            }
        }

        let mut union = Caps::empty();
        for peer in shared.endpoints.iter() {
            if peer.direction() != direction {
                if let Some(caps) = peer.current_caps() {
                    union = union.union(caps);
                }
            }
        }
        if let Some(index) = &shared.index {
            union = union.union(match direction {
                EndpointDirection::Input => index.all_sink_caps(),
                EndpointDirection::Output => index.all_src_caps(),
            });
        }
        Ok(union.intersect_with_filter(filter))
    }

    /// A downstream consumer of `output` asks for reconfiguration. The
    /// latch coalesces: flagging during a rebuild is absorbed by the
    /// rebuild already in flight.
    pub fn mark_needs_reconfigure(&self, output: EndpointId) -> RouteResult<()> {
        let mut shared = self.shared.lock();
        self.wait_idle(&mut shared);
        Self::expect_direction(&shared, output, EndpointDirection::Output)?;
        shared
            .endpoints
            .get_mut(output)
            .expect("direction checked above")
            .set_needs_reconfigure(true);
        if shared.planned_once && Self::inputs_described(&shared) {
            self.reconfigure(&mut shared)?;
        }
        Ok(())
    }

    /// Forget everything streaming: declared input caps, sticky events,
    /// the live graph. Endpoint identities and output demands survive.
    /// The next full set of caps declarations starts planning afresh.
    pub fn reset(&self) {
        let mut shared = self.shared.lock();
        self.wait_idle(&mut shared);
        shared.live = LiveGraph::new();
        shared.planned_once = false;
        for endpoint in shared.endpoints.iter_mut() {
            if endpoint.direction() == EndpointDirection::Input {
                endpoint.clear_current_caps();
            }
            endpoint.clear_sticky();
            endpoint.set_needs_reconfigure(false);
            endpoint.set_awaiting_drain(false);
        }
    }

    // -------------------------------------------------------------------------
    // Observation
    // -------------------------------------------------------------------------

    pub fn state(&self) -> RebuildState {
        self.shared.lock().state
    }

    /// Structural signature of the current live graph.
    pub fn graph_signature(&self) -> u64 {
        self.shared.lock().live.signature()
    }

    /// Inspect the live graph under the lock.
    pub fn with_graph<R>(&self, f: impl FnOnce(&LiveGraph) -> R) -> R {
        f(&self.shared.lock().live)
    }

    pub fn output_connected(&self, output: EndpointId) -> bool {
        self.shared.lock().live.output_connected(output)
    }

    pub fn output_needs_reconfigure(&self, output: EndpointId) -> bool {
        self.shared
            .lock()
            .endpoints
            .get(output)
            .is_some_and(|e| e.needs_reconfigure())
    }

    /// Sticky events visible at an output after replay.
    pub fn output_sticky(&self, output: EndpointId) -> Vec<BoundaryEvent> {
        self.shared
            .lock()
            .endpoints
            .get(output)
            .map(|e| e.sticky_events().to_vec())
            .unwrap_or_default()
    }

    /// Counters from the most recent planning pass.
    pub fn last_plan_stats(&self) -> PlanStats {
        self.shared.lock().last_stats
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn wait_idle(&self, shared: &mut MutexGuard<'_, BinShared>) {
        while shared.state != RebuildState::Idle {
            self.resume.wait(shared);
        }
    }

    fn inputs_described(shared: &BinShared) -> bool {
        let mut any = false;
        for input in shared.endpoints.inputs() {
            any = true;
            if input.current_caps().is_none() {
                return false;
            }
        }
        any
    }

    fn expect_direction(
        shared: &BinShared,
        id: EndpointId,
        direction: EndpointDirection,
    ) -> RouteResult<()> {
        match shared.endpoints.get(id) {
            Some(endpoint) if endpoint.direction() == direction => Ok(()),
            _ => Err(RouteError::unknown_endpoint(format!("{id}"))),
        }
    }

    /// Drive one full pass of the rebuild protocol. Runs with the
    /// structural lock held; leaves the state machine in `Idle` and wakes
    /// blocked input operations on every exit path.
    fn reconfigure(&self, shared: &mut BinShared) -> RouteResult<()> {
        debug!(target: "autoroute::rebuild", "Idle -> Draining");
        shared.state = RebuildState::Draining;

        // Record the outputs that owe a drain ack, then push the marker
        // in from every live input. Propagation is structural, so the
        // acks land immediately; the marker is absorbed here and never
        // forwarded downstream.
        let awaiting = shared.live.connected_outputs();
        for &output in &awaiting {
            if let Some(endpoint) = shared.endpoints.get_mut(output) {
                endpoint.set_awaiting_drain(true);
            }
        }
        for input in shared.live.connected_inputs() {
            for output in shared.live.reachable_outputs(input) {
                if let Some(endpoint) = shared.endpoints.get_mut(output) {
                    endpoint.set_awaiting_drain(false);
                }
            }
        }
        debug_assert!(
            shared.endpoints.outputs().all(|e| !e.awaiting_drain()),
            "drain marker missed an awaiting output"
        );

        debug!(target: "autoroute::rebuild", "Draining -> Rebuilding");
        shared.state = RebuildState::Rebuilding;

        // Tear down the prior graph before building its replacement.
        shared.live = LiveGraph::new();

        match Self::replan(shared) {
            Ok(graph) => {
                shared.live = graph;
                Self::replay_sticky(shared);
                for endpoint in shared.endpoints.iter_mut() {
                    endpoint.set_needs_reconfigure(false);
                }
                shared.planned_once = true;
                shared.state = RebuildState::Idle;
                debug!(target: "autoroute::rebuild", "Rebuilding -> Idle");
                self.resume.notify_all();
                Ok(())
            }
            Err(err) => {
                // Fatal: discard the partial build, surface the error,
                // but never leave inputs parked forever.
                warn!(target: "autoroute::rebuild", error = %err, "rebuild failed");
                shared.live = LiveGraph::new();
                shared.state = RebuildState::Idle;
                self.resume.notify_all();
                Err(err)
            }
        }
    }

    /// Plan and materialize a graph for the current configuration.
    fn replan(shared: &mut BinShared) -> RouteResult<LiveGraph> {
        if shared.index.is_none() {
            let catalog = shared.policy.catalog()?;
            shared.index = Some(FactoryIndex::build(&catalog));
        }
        let index = shared.index.as_ref().expect("index built above");

        let inputs: Vec<(EndpointId, Caps)> = shared
            .endpoints
            .inputs()
            .filter_map(|e| e.current_caps().map(|c| (e.id(), c.clone())))
            .collect();
        let outputs: Vec<(EndpointId, Caps)> = shared
            .endpoints
            .outputs()
            .filter_map(|e| e.current_caps().map(|c| (e.id(), c.clone())))
            .collect();

        let generator = ProposalGenerator::new(index, &shared.policy, shared.config);
        let (arena, stats) = generator.generate(&inputs, &outputs);
        shared.last_stats = stats;

        let output_ids: Vec<EndpointId> = outputs.iter().map(|(id, _)| *id).collect();
        let selected = match select_cover(&arena, &output_ids) {
            Some(picks) => picks,
            None => {
                // No viable cover: leave every output unconnected and
                // report success; the host observes the absence of data.
                debug!(target: "autoroute::rebuild", "no cover; outputs left unconnected");
                Vec::new()
            }
        };

        let input_ids: Vec<EndpointId> = inputs.iter().map(|(id, _)| *id).collect();
        instantiate(&arena, &selected, index, &input_ids)
    }

    /// Replay each connected input's sticky events into the freshly
    /// built subgraph; they surface on every output the input reaches.
    fn replay_sticky(shared: &mut BinShared) {
        for input in shared.live.connected_inputs() {
            let events: Vec<BoundaryEvent> = shared
                .endpoints
                .get(input)
                .map(|e| e.sticky_events().to_vec())
                .unwrap_or_default();
            for output in shared.live.reachable_outputs(input) {
                if let Some(endpoint) = shared.endpoints.get_mut(output) {
                    for event in &events {
                        endpoint.store_sticky(event.clone());
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for RouteBin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared.lock();
        f.debug_struct("RouteBin")
            .field("state", &shared.state)
            .field("planned_once", &shared.planned_once)
            .field("nodes", &shared.live.node_count())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
