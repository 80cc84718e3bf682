//! Turning a selected cover into a live graph.
//!
//! Every selected proposal (plus its ancestors) is materialized exactly
//! once. Splitters appear exactly where a stream fans out: on an input
//! endpoint feeding more than one chain, and on a step whose output both
//! continues its own chain and feeds branches. Inputs nothing consumes
//! are terminated with a null sink so upstream keeps a valid peer.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{RouteError, RouteResult};
use crate::factory::{ElementFactory, NullSinkFactory, SplitterFactory};
use crate::graph::endpoint::EndpointId;
use crate::graph::live::{LiveGraph, NodeKind, Port};
use crate::index::FactoryIndex;
use crate::plan::{ProposalArena, ProposalId, ProposalParent};

/// Build the live graph for `selected` (as chosen by the selector) over
/// the bin's `inputs`.
///
/// The arena guarantees parents precede children in id order, so walking
/// the deduplicated ancestor closure in ascending id order materializes
/// every fan-out point before anything that hangs off it.
pub fn instantiate(
    arena: &ProposalArena,
    selected: &[ProposalId],
    index: &FactoryIndex,
    inputs: &[EndpointId],
) -> RouteResult<LiveGraph> {
    // Deduplicated ancestor closure, ascending id.
    let mut closure: Vec<ProposalId> = Vec::new();
    for &id in selected {
        for ancestor in arena.ancestors(id) {
            if !closure.contains(&ancestor) {
                closure.push(ancestor);
            }
        }
    }
    closure.sort_by_key(|id| id.index());

    // Fan-out accounting.
    let mut input_consumers: FxHashMap<EndpointId, usize> = FxHashMap::default();
    let mut branch_counts: FxHashMap<(ProposalId, u32), usize> = FxHashMap::default();
    for &id in &closure {
        match arena.get(id).parent() {
            ProposalParent::Root(input) => *input_consumers.entry(input).or_default() += 1,
            ProposalParent::Branch { proposal, step } => {
                *branch_counts.entry((proposal, step)).or_default() += 1
            }
        }
    }

    let mut graph = LiveGraph::new();

    // Splitters on inputs that feed more than one chain. Walking the
    // bin's input order keeps node numbering deterministic.
    let mut input_ports: FxHashMap<EndpointId, Port> = FxHashMap::default();
    for &input in inputs {
        let Some(&consumers) = input_consumers.get(&input) else {
            continue;
        };
        let port = if consumers > 1 {
            let splitter = graph.add_node(NodeKind::Splitter, SplitterFactory.create(), None);
            graph.link(Port::BinInput(input), Port::Element(splitter));
            Port::Element(splitter)
        } else {
            Port::BinInput(input)
        };
        input_ports.insert(input, port);
    }

    // Materialize proposals; parents come first, so branch sources are
    // always present when a child looks them up.
    let mut step_splitters: FxHashMap<(ProposalId, u32), Port> = FxHashMap::default();
    for &id in &closure {
        let proposal = arena.get(id);
        let mut upstream = match proposal.parent() {
            ProposalParent::Root(input) => *input_ports
                .get(&input)
                .ok_or_else(|| RouteError::build_failed(format!("no source for input {input}")))?,
            ProposalParent::Branch { proposal: parent, step } => *step_splitters
                .get(&(parent, step))
                .ok_or_else(|| {
                    RouteError::build_failed(format!("no splitter for branch of {parent} at step {step}"))
                })?,
        };

        for (pos, step) in proposal.steps().iter().enumerate() {
            let element = index.entry(step.entry()).factory().create();
            let node = graph.add_node(
                NodeKind::Transform,
                element,
                Some(step.sink_caps().clone()),
            );
            graph.link(upstream, Port::Element(node));
            upstream = Port::Element(node);

            // A step that also feeds branches fans out through a splitter.
            if branch_counts.contains_key(&(id, pos as u32)) {
                let splitter = graph.add_node(NodeKind::Splitter, SplitterFactory.create(), None);
                graph.link(upstream, Port::Element(splitter));
                upstream = Port::Element(splitter);
                step_splitters.insert((id, pos as u32), upstream);
            }
        }

        graph.link(upstream, Port::BinOutput(proposal.src_endpoint()));
    }

    // Null-sink every input nothing consumes.
    for &input in inputs {
        if !input_consumers.contains_key(&input) {
            let sink = graph.add_node(NodeKind::NullSink, NullSinkFactory.create(), None);
            graph.link(Port::BinInput(input), Port::Element(sink));
        }
    }

    debug!(
        target: "autoroute::graph",
        proposals = closure.len(),
        nodes = graph.node_count(),
        "graph instantiated"
    );
    Ok(graph)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::Caps;
    use crate::factory::CapsTransformFactory;
    use crate::plan::{Proposal, Steps, TransformationStep};
    use std::sync::Arc;

    fn index() -> FactoryIndex {
        FactoryIndex::build(&[
            CapsTransformFactory::new(
                "rgb2yuv",
                "Converter/Video",
                Caps::media("video/x-raw-rgb"),
                Caps::media("video/x-raw-yuv"),
            ) as Arc<_>,
            CapsTransformFactory::new(
                "h264enc",
                "Codec/Encoder/Video",
                Caps::media("video/x-raw-yuv"),
                Caps::media("video/x-h264"),
            ),
        ])
    }

    fn step(entry: usize, sink: &str, src: &str) -> TransformationStep {
        TransformationStep::new(entry, Caps::media(sink), Caps::media(src))
    }

    fn count_kind(graph: &LiveGraph, kind: NodeKind) -> usize {
        graph.nodes().filter(|n| n.kind() == kind).count()
    }

    #[test]
    fn test_single_passthrough_no_splitter() {
        let input = EndpointId::new(0);
        let output = EndpointId::new(1);
        let mut arena = ProposalArena::new();
        let p = arena.push(Proposal::new(
            ProposalParent::Root(input),
            output,
            Steps::new(),
            0,
        ));

        let graph = instantiate(&arena, &[p], &index(), &[input]).unwrap();

        assert_eq!(graph.node_count(), 0);
        assert_eq!(
            graph.links(),
            &[(Port::BinInput(input), Port::BinOutput(output))]
        );
    }

    #[test]
    fn test_single_chain_direct_link() {
        let input = EndpointId::new(0);
        let output = EndpointId::new(1);
        let mut arena = ProposalArena::new();
        let steps: Steps = [step(0, "video/x-raw-rgb", "video/x-raw-yuv")]
            .into_iter()
            .collect();
        let p = arena.push(Proposal::new(ProposalParent::Root(input), output, steps, 1));

        let graph = instantiate(&arena, &[p], &index(), &[input]).unwrap();

        assert_eq!(count_kind(&graph, NodeKind::Transform), 1);
        assert_eq!(count_kind(&graph, NodeKind::Splitter), 0);
        assert_eq!(graph.reachable_outputs(input), vec![output]);
    }

    #[test]
    fn test_branch_inserts_step_splitter() {
        let input = EndpointId::new(0);
        let out_yuv = EndpointId::new(1);
        let out_h264 = EndpointId::new(2);

        // [rgb2yuv] → yuv output, with [h264enc] branching off step 0
        let mut arena = ProposalArena::new();
        let root_steps: Steps = [step(0, "video/x-raw-rgb", "video/x-raw-yuv")]
            .into_iter()
            .collect();
        let root = arena.push(Proposal::new(
            ProposalParent::Root(input),
            out_yuv,
            root_steps,
            1,
        ));
        let branch_steps: Steps = [step(1, "video/x-raw-yuv", "video/x-h264")]
            .into_iter()
            .collect();
        let branch = arena.push(Proposal::new(
            ProposalParent::Branch {
                proposal: root,
                step: 0,
            },
            out_h264,
            branch_steps,
            1,
        ));

        let graph = instantiate(&arena, &[branch], &index(), &[input]).unwrap();

        // Both chains materialize even though only the branch was picked:
        // its ancestor closure pulls the root in.
        assert_eq!(count_kind(&graph, NodeKind::Transform), 2);
        assert_eq!(count_kind(&graph, NodeKind::Splitter), 1);
        assert_eq!(graph.reachable_outputs(input), vec![out_yuv, out_h264]);
    }

    #[test]
    fn test_input_fanout_gets_splitter() {
        let input = EndpointId::new(0);
        let out_a = EndpointId::new(1);
        let out_b = EndpointId::new(2);

        let mut arena = ProposalArena::new();
        let a = arena.push(Proposal::new(
            ProposalParent::Root(input),
            out_a,
            Steps::new(),
            0,
        ));
        let chain: Steps = [step(0, "video/x-raw-rgb", "video/x-raw-yuv")]
            .into_iter()
            .collect();
        let b = arena.push(Proposal::new(ProposalParent::Root(input), out_b, chain, 1));

        let graph = instantiate(&arena, &[a, b], &index(), &[input]).unwrap();

        assert_eq!(count_kind(&graph, NodeKind::Splitter), 1);
        assert_eq!(graph.reachable_outputs(input), vec![out_a, out_b]);
    }

    #[test]
    fn test_unused_input_null_sinked() {
        let used = EndpointId::new(0);
        let unused = EndpointId::new(1);
        let output = EndpointId::new(2);

        let mut arena = ProposalArena::new();
        let p = arena.push(Proposal::new(
            ProposalParent::Root(used),
            output,
            Steps::new(),
            0,
        ));

        let graph = instantiate(&arena, &[p], &index(), &[used, unused]).unwrap();

        assert_eq!(count_kind(&graph, NodeKind::NullSink), 1);
        assert!(graph.reachable_outputs(unused).is_empty());
        assert_eq!(graph.reachable_outputs(used), vec![output]);
    }

    #[test]
    fn test_no_cover_null_sinks_everything() {
        let in_a = EndpointId::new(0);
        let in_b = EndpointId::new(1);
        let arena = ProposalArena::new();

        let graph = instantiate(&arena, &[], &index(), &[in_a, in_b]).unwrap();

        assert_eq!(count_kind(&graph, NodeKind::NullSink), 2);
        assert!(graph.connected_outputs().is_empty());
    }

    #[test]
    fn test_shared_ancestor_materialized_once() {
        let input = EndpointId::new(0);
        let out_a = EndpointId::new(1);
        let out_b = EndpointId::new(2);
        let out_c = EndpointId::new(3);

        // Root chain to out_a; two branches off its step 0.
        let mut arena = ProposalArena::new();
        let root_steps: Steps = [step(0, "video/x-raw-rgb", "video/x-raw-yuv")]
            .into_iter()
            .collect();
        let root = arena.push(Proposal::new(
            ProposalParent::Root(input),
            out_a,
            root_steps,
            1,
        ));
        let mk_branch: Steps = [step(1, "video/x-raw-yuv", "video/x-h264")]
            .into_iter()
            .collect();
        let b1 = arena.push(Proposal::new(
            ProposalParent::Branch {
                proposal: root,
                step: 0,
            },
            out_b,
            mk_branch.clone(),
            1,
        ));
        let b2 = arena.push(Proposal::new(
            ProposalParent::Branch {
                proposal: root,
                step: 0,
            },
            out_c,
            mk_branch,
            1,
        ));

        let graph = instantiate(&arena, &[b1, b2], &index(), &[input]).unwrap();

        // root materialized once: 3 transforms, 1 splitter
        assert_eq!(count_kind(&graph, NodeKind::Transform), 3);
        assert_eq!(count_kind(&graph, NodeKind::Splitter), 1);
        assert_eq!(
            graph.reachable_outputs(input),
            vec![out_a, out_b, out_c]
        );
    }
}
