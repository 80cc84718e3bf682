//! The materialized element graph.
//!
//! Planning ends in a [`LiveGraph`]: element instances (transforms,
//! splitters, null sinks) plus directed links between them and the bin's
//! endpoints. The graph is structural — the host's data path runs
//! through it, the core only needs reachability (drain markers, sticky
//! replay) and identity (structural signatures).

use tracing::trace;

use crate::caps::Caps;
use crate::factory::TransformElement;
use crate::graph::endpoint::EndpointId;
use crate::hash::StableHasher;

// =============================================================================
// Nodes and ports
// =============================================================================

/// Handle to one element instance inside the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What role an element plays in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A transformation step from a selected proposal.
    Transform,
    /// Host-provided fan-out element.
    Splitter,
    /// Host-provided terminator for unused inputs.
    NullSink,
}

/// One element instance.
pub struct LiveNode {
    kind: NodeKind,
    element: Box<dyn TransformElement>,
    /// Fixated caps on the element's sink side, when negotiation decided
    /// them (transform steps only).
    sink_caps: Option<Caps>,
}

impl LiveNode {
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn factory_name(&self) -> &str {
        self.element.factory_name()
    }

    pub fn sink_caps(&self) -> Option<&Caps> {
        self.sink_caps.as_ref()
    }
}

impl std::fmt::Debug for LiveNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveNode")
            .field("kind", &self.kind)
            .field("factory", &self.factory_name())
            .finish()
    }
}

/// One end of a link: a bin endpoint or an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    BinInput(EndpointId),
    BinOutput(EndpointId),
    Element(NodeId),
}

// =============================================================================
// LiveGraph
// =============================================================================

/// Element instances plus directed links. Built by the instantiator,
/// replaced wholesale on every rebuild.
#[derive(Debug, Default)]
pub struct LiveGraph {
    nodes: Vec<LiveNode>,
    links: Vec<(Port, Port)>,
}

impl LiveGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(
        &mut self,
        kind: NodeKind,
        element: Box<dyn TransformElement>,
        sink_caps: Option<Caps>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(LiveNode {
            kind,
            element,
            sink_caps,
        });
        id
    }

    pub fn link(&mut self, from: Port, to: Port) {
        trace!(target: "autoroute::graph", ?from, ?to, "link");
        self.links.push((from, to));
    }

    pub fn node(&self, id: NodeId) -> &LiveNode {
        &self.nodes[id.index()]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &LiveNode> {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn links(&self) -> &[(Port, Port)] {
        &self.links
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }

    /// Direct successors of a port.
    pub fn successors(&self, port: Port) -> impl Iterator<Item = Port> + '_ {
        self.links
            .iter()
            .filter(move |(from, _)| *from == port)
            .map(|(_, to)| *to)
    }

    /// Input endpoints that feed the graph.
    pub fn connected_inputs(&self) -> Vec<EndpointId> {
        let mut out = Vec::new();
        for (from, _) in &self.links {
            if let Port::BinInput(id) = from {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
        }
        out
    }

    /// Output endpoints something in the graph delivers to.
    pub fn connected_outputs(&self) -> Vec<EndpointId> {
        let mut out = Vec::new();
        for (_, to) in &self.links {
            if let Port::BinOutput(id) = to {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
        }
        out
    }

    /// True when `output` is fed by anything in the graph.
    pub fn output_connected(&self, output: EndpointId) -> bool {
        self.links
            .iter()
            .any(|(_, to)| *to == Port::BinOutput(output))
    }

    /// Walk the graph from `input` and collect every output endpoint the
    /// stream reaches. This is how a drain marker injected at an input
    /// finds the outputs that must acknowledge it, and how sticky events
    /// find the outputs they replay to. Null sinks absorb.
    pub fn reachable_outputs(&self, input: EndpointId) -> Vec<EndpointId> {
        let mut reached = Vec::new();
        let mut queue = vec![Port::BinInput(input)];
        let mut visited: Vec<Port> = Vec::new();

        while let Some(port) = queue.pop() {
            if visited.contains(&port) {
                continue;
            }
            visited.push(port);
            match port {
                Port::BinOutput(id) => {
                    if !reached.contains(&id) {
                        reached.push(id);
                    }
                }
                _ => queue.extend(self.successors(port)),
            }
        }
        reached.sort();
        reached
    }

    /// Structural signature: equal graphs (same nodes in the same roles,
    /// same wiring) hash equal. Used to recognize that a planning pass on
    /// an unchanged configuration rebuilt the same graph.
    pub fn signature(&self) -> u64 {
        let mut hasher = StableHasher::new().update_usize(self.nodes.len());
        for node in &self.nodes {
            hasher = hasher
                .update_str(match node.kind {
                    NodeKind::Transform => "transform",
                    NodeKind::Splitter => "splitter",
                    NodeKind::NullSink => "null-sink",
                })
                .update_str(node.factory_name());
            if let Some(caps) = &node.sink_caps {
                hasher = hasher.update_caps(caps);
            }
        }
        for (from, to) in &self.links {
            hasher = hash_port(hash_port(hasher, from), to);
        }
        hasher.finish()
    }
}

fn hash_port(hasher: StableHasher, port: &Port) -> StableHasher {
    match port {
        Port::BinInput(id) => hasher.update_str("in").update_u64(id.index() as u64),
        Port::BinOutput(id) => hasher.update_str("out").update_u64(id.index() as u64),
        Port::Element(id) => hasher.update_str("elem").update_usize(id.index()),
    }
}

// =============================================================================
// Tests
// =============================================================================
