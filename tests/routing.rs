//! End-to-end routing scenarios driven through the public bin API.

use std::sync::Arc;

use autoroute::caps::Caps;
use autoroute::factory::{CapsTransformFactory, ElementFactory};
use autoroute::graph::endpoint::BoundaryEvent;
use autoroute::graph::{NodeKind, RebuildState};
use autoroute::policy::Policy;
use autoroute::plan::PlannerConfig;
use autoroute::RouteBin;

fn rgb() -> Caps {
    Caps::media("video/x-raw-rgb")
}

fn yuv() -> Caps {
    Caps::media("video/x-raw-yuv")
}

fn h264() -> Caps {
    Caps::media("video/x-h264")
}

/// A: rgb→yuv converter, B: yuv→h264 encoder.
fn video_catalog() -> Vec<Arc<dyn ElementFactory>> {
    vec![
        CapsTransformFactory::new("rgb2yuv", "Converter/Video", rgb(), yuv()) as Arc<_>,
        CapsTransformFactory::new("h264enc", "Codec/Encoder/Video", yuv(), h264()),
    ]
}

fn count_kind(bin: &RouteBin, kind: NodeKind) -> usize {
    bin.with_graph(|g| g.nodes().filter(|n| n.kind() == kind).count())
}

#[test]
fn passthrough_wins_over_conversion_roundtrip() {
    // Even with converters in both directions available, a stream the
    // output accepts as-is must pass straight through: zero steps, no
    // splitter, no elements at all.
    let policy = Policy::new().with_catalog(|| {
        vec![
            CapsTransformFactory::new("rgb2yuv", "Converter/Video", rgb(), yuv()) as Arc<_>,
            CapsTransformFactory::new("yuv2rgb", "Converter/Video", yuv(), rgb()),
        ]
    });
    let bin = RouteBin::new(policy);
    let input = bin.add_input("in");
    let output = bin.add_output("out", rgb()).unwrap();

    bin.handle_input_event(input, BoundaryEvent::caps_declared(rgb()))
        .unwrap();

    assert!(bin.output_connected(output));
    bin.with_graph(|g| assert_eq!(g.node_count(), 0));
}

#[test]
fn single_conversion_step() {
    let policy = Policy::new().with_catalog(|| {
        vec![CapsTransformFactory::new("rgb2yuv", "Converter/Video", rgb(), yuv()) as Arc<_>]
    });
    let bin = RouteBin::new(policy);
    let input = bin.add_input("in");
    let output = bin.add_output("out", yuv()).unwrap();

    bin.handle_input_event(input, BoundaryEvent::caps_declared(rgb()))
        .unwrap();

    assert!(bin.output_connected(output));
    assert_eq!(count_kind(&bin, NodeKind::Transform), 1);
    assert_eq!(count_kind(&bin, NodeKind::Splitter), 0);
    bin.with_graph(|g| {
        let names: Vec<_> = g.nodes().map(|n| n.factory_name().to_string()).collect();
        assert_eq!(names, vec!["rgb2yuv"]);
    });
}

#[test]
fn two_step_chain_to_encoded_output() {
    let policy = Policy::new().with_catalog(video_catalog);
    let bin = RouteBin::new(policy);
    let input = bin.add_input("in");
    let output = bin.add_output("out", h264()).unwrap();

    bin.handle_input_event(input, BoundaryEvent::caps_declared(rgb()))
        .unwrap();

    assert!(bin.output_connected(output));
    assert_eq!(count_kind(&bin, NodeKind::Transform), 2);
    bin.with_graph(|g| {
        let names: Vec<_> = g.nodes().map(|n| n.factory_name().to_string()).collect();
        assert_eq!(names, vec!["rgb2yuv", "h264enc"]);
    });
}

#[test]
fn fan_out_shares_the_conversion_prefix() {
    // Two outputs, one demanding yuv and one h264: the rgb2yuv step is
    // shared through a splitter instead of being materialized twice.
    let policy = Policy::new().with_catalog(video_catalog);
    let bin = RouteBin::new(policy);
    let input = bin.add_input("in");
    let out_yuv = bin.add_output("out_yuv", yuv()).unwrap();
    let out_h264 = bin.add_output("out_h264", h264()).unwrap();

    bin.handle_input_event(input, BoundaryEvent::caps_declared(rgb()))
        .unwrap();

    assert!(bin.output_connected(out_yuv));
    assert!(bin.output_connected(out_h264));
    // rgb2yuv once, h264enc once, one splitter on the yuv point
    assert_eq!(count_kind(&bin, NodeKind::Transform), 2);
    assert_eq!(count_kind(&bin, NodeKind::Splitter), 1);
    bin.with_graph(|g| {
        assert_eq!(g.reachable_outputs(input), vec![out_yuv, out_h264]);
    });
}

#[test]
fn class_ordering_blocks_encode_then_decode() {
    // The only caps-compatible chain runs an encoder before a decoder;
    // the ordering validator rejects it, so the output stays dark.
    let catalog = || {
        vec![
            CapsTransformFactory::new("enc", "Codec/Encoder/Video", rgb(), h264()) as Arc<dyn ElementFactory>,
            CapsTransformFactory::new("dec", "Codec/Decoder/Video", h264(), yuv()),
        ]
    };

    let bin = RouteBin::new(Policy::new().with_catalog(catalog));
    let input = bin.add_input("in");
    let output = bin.add_output("out", yuv()).unwrap();
    bin.handle_input_event(input, BoundaryEvent::caps_declared(rgb()))
        .unwrap();
    assert!(!bin.output_connected(output));

    // Same catalog with ordering disabled proves the validator (and not
    // caps connectivity) was what blocked the route.
    let bin = RouteBin::new(Policy::new().with_catalog(catalog).with_klass_ordering(false));
    let input = bin.add_input("in");
    let output = bin.add_output("out", yuv()).unwrap();
    bin.handle_input_event(input, BoundaryEvent::caps_declared(rgb()))
        .unwrap();
    assert!(bin.output_connected(output));
}

#[test]
fn selector_prefers_cheaper_alternative() {
    // Two single-step routes to the same output; per-step costs 5 and 3.
    // With alternates retained, the selector must take the cheap one.
    let policy = Policy::new()
        .with_catalog(|| {
            vec![
                CapsTransformFactory::new("convA", "Converter/Video", rgb(), yuv()) as Arc<_>,
                CapsTransformFactory::new("convB", "Converter/Video", rgb(), yuv()),
            ]
        })
        .with_step_cost(|step| if step.entry() == 0 { 5 } else { 3 });

    let bin = RouteBin::with_config(
        policy,
        PlannerConfig {
            keep_alternates: true,
        },
    );
    let input = bin.add_input("in");
    let output = bin.add_output("out", yuv()).unwrap();

    bin.handle_input_event(input, BoundaryEvent::caps_declared(rgb()))
        .unwrap();

    assert!(bin.output_connected(output));
    bin.with_graph(|g| {
        let names: Vec<_> = g.nodes().map(|n| n.factory_name().to_string()).collect();
        assert_eq!(names, vec!["convB"]);
    });
}

#[test]
fn empty_catalog_allows_only_passthrough() {
    // With no factories, a matching output is served by passthrough and
    // nothing else.
    let policy = Policy::new().with_catalog(Vec::new);
    let bin = RouteBin::new(policy);
    let input = bin.add_input("in");
    let out_same = bin.add_output("out_same", rgb()).unwrap();

    bin.handle_input_event(input, BoundaryEvent::caps_declared(rgb()))
        .unwrap();

    assert!(bin.output_connected(out_same));
    bin.with_graph(|g| assert_eq!(g.node_count(), 0));
}

#[test]
fn partial_coverage_connects_nothing() {
    // Cover selection is exact: when one output is unreachable the whole
    // pass yields no cover, every output stays dark, and the inputs are
    // terminated. The pass itself still succeeds.
    let policy = Policy::new().with_catalog(Vec::new);
    let bin = RouteBin::new(policy);
    let input = bin.add_input("in");
    let out_same = bin.add_output("out_same", rgb()).unwrap();
    let out_other = bin.add_output("out_other", yuv()).unwrap();

    bin.handle_input_event(input, BoundaryEvent::caps_declared(rgb()))
        .unwrap();

    assert!(!bin.output_connected(out_same));
    assert!(!bin.output_connected(out_other));
    assert_eq!(count_kind(&bin, NodeKind::NullSink), 1);
}

#[test]
fn chain_length_is_bounded() {
    // Five conversions would be needed end to end; the planner must give
    // up rather than propose a length-5 chain.
    let media: Vec<Caps> = (0..6).map(|i| Caps::media(format!("video/step-{i}"))).collect();
    let catalog = {
        let media = media.clone();
        move || {
            (0..5)
                .map(|i| {
                    CapsTransformFactory::new(
                        format!("conv{i}"),
                        "Converter/Video",
                        media[i].clone(),
                        media[i + 1].clone(),
                    ) as Arc<dyn ElementFactory>
                })
                .collect()
        }
    };

    let bin = RouteBin::new(Policy::new().with_catalog(catalog.clone()));
    let input = bin.add_input("in");
    let output = bin.add_output("out", media[5].clone()).unwrap();
    bin.handle_input_event(input, BoundaryEvent::caps_declared(media[0].clone()))
        .unwrap();
    assert!(!bin.output_connected(output));

    // Four steps is still in budget
    let bin = RouteBin::new(Policy::new().with_catalog(catalog));
    let input = bin.add_input("in");
    let output = bin.add_output("out", media[4].clone()).unwrap();
    bin.handle_input_event(input, BoundaryEvent::caps_declared(media[0].clone()))
        .unwrap();
    assert!(bin.output_connected(output));
    assert_eq!(count_kind(&bin, NodeKind::Transform), 4);
}

#[test]
fn unchanged_configuration_rebuilds_identical_graph() {
    let make_bin = || {
        let bin = RouteBin::new(Policy::new().with_catalog(video_catalog));
        let input = bin.add_input("in");
        let out_yuv = bin.add_output("out_yuv", yuv()).unwrap();
        let out_h264 = bin.add_output("out_h264", h264()).unwrap();
        bin.handle_input_event(input, BoundaryEvent::caps_declared(rgb()))
            .unwrap();
        (bin, out_yuv, out_h264)
    };

    // Two independent bins over the same configuration agree
    let (bin_a, ..) = make_bin();
    let (bin_b, out_yuv, _) = make_bin();
    assert_eq!(bin_a.graph_signature(), bin_b.graph_signature());

    // A forced replan on an unchanged configuration agrees with itself
    let before = bin_b.graph_signature();
    bin_b.mark_needs_reconfigure(out_yuv).unwrap();
    assert_eq!(bin_b.graph_signature(), before);
    assert_eq!(bin_b.state(), RebuildState::Idle);
}

#[test]
fn multiple_inputs_each_find_their_output() {
    let policy = Policy::new().with_catalog(video_catalog);
    let bin = RouteBin::new(policy);
    let in_rgb = bin.add_input("in_rgb");
    let in_yuv = bin.add_input("in_yuv");
    let out_yuv = bin.add_output("out_yuv", yuv()).unwrap();
    let out_h264 = bin.add_output("out_h264", h264()).unwrap();

    bin.handle_input_event(in_rgb, BoundaryEvent::caps_declared(rgb()))
        .unwrap();
    bin.handle_input_event(in_yuv, BoundaryEvent::caps_declared(yuv()))
        .unwrap();

    assert!(bin.output_connected(out_yuv));
    assert!(bin.output_connected(out_h264));

    // The yuv input can serve both outputs more cheaply than converting
    // the rgb input: passthrough to out_yuv, one encoder to out_h264.
    // The rgb input ends in a null sink.
    assert_eq!(count_kind(&bin, NodeKind::Transform), 1);
    assert_eq!(count_kind(&bin, NodeKind::NullSink), 1);
    bin.with_graph(|g| {
        assert!(g.reachable_outputs(in_rgb).is_empty());
        assert_eq!(g.reachable_outputs(in_yuv), vec![out_yuv, out_h264]);
    });
}
