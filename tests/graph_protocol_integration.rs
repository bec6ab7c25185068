//! Integration tests for the connection protocol
//!
//! These tests drive the graph through its public surface:
//! - Port materialization per arity table
//! - Connecting, reconnecting and disconnecting inputs
//! - Notify fan-out to subscribers
//! - Module removal and topology snapshots

mod common;

use common::builders::{ImageProbe, ImageSource, VolumeBuilder};
use common::{image_in, image_out, scene_in, scene_out};
use proptest::prelude::*;
use voxgraph::config::RendererSettings;
use voxgraph::graph::modules::{
    GeometryKind, GeometryModule, PixelFilterModule, RenderMode, RendererModule, ShaderFilterModule,
};
use voxgraph::graph::{
    BuiltinModule, Graph, GraphError, ModuleId, PortDirection, PortId, PortKind, ScalarValue,
};

fn source(graph: &mut Graph, fill: u8) -> ModuleId {
    let image = VolumeBuilder::new(4, 4, 1).u8_fill(fill).build_port();
    graph.add_module(ImageSource::boxed(image)).unwrap()
}

#[test]
fn test_ports_match_arity_tables() {
    let mut graph = Graph::new();
    let renderer = graph
        .add_module(BuiltinModule::Renderer(
            RendererModule::new(RenderMode::Slice2d, RendererSettings::default())
                .with_surface(Box::new(voxgraph::collab::HeadlessSurface::new())),
        ))
        .unwrap();
    let gauss = graph
        .add_module(BuiltinModule::PixelFilter(PixelFilterModule::gaussian(1.0).unwrap()))
        .unwrap();

    let expected = [
        (renderer, PortDirection::Input, [1, 3, 0]),
        (renderer, PortDirection::Output, [0, 0, 0]),
        (gauss, PortDirection::Input, [1, 0, 0]),
        (gauss, PortDirection::Output, [1, 0, 0]),
    ];
    for (id, direction, counts) in expected {
        for (kind, count) in PortKind::ALL.into_iter().zip(counts) {
            assert_eq!(
                graph.port_count(id, direction, kind).unwrap(),
                count,
                "{:?} {:?} {}",
                id,
                direction,
                kind
            );
        }
    }
    // Only the filter owns an output payload.
    assert_eq!(graph.payload_count(), 1);
}

#[test]
fn test_connect_rejects_kind_mismatch() {
    let mut graph = Graph::new();
    let cube = graph
        .add_module(BuiltinModule::Geometry(GeometryModule::new(GeometryKind::Cube)))
        .unwrap();
    let filter = graph
        .add_module(BuiltinModule::ShaderFilter(ShaderFilterModule::laplace()))
        .unwrap();

    let result = graph.connect(scene_out(cube), PortId::input(filter, PortKind::Image, 0));
    assert!(matches!(
        result,
        Err(GraphError::KindMismatch {
            output: PortKind::Scene,
            input: PortKind::Image
        })
    ));
    assert!(graph.subscribers(scene_out(cube)).unwrap().is_empty());
    assert_eq!(graph.input_update_count(image_in(filter)).unwrap(), 0);
}

#[test]
fn test_connect_delivers_existing_data() {
    let mut graph = Graph::new();
    let src = source(&mut graph, 7);
    let (probe, seen) = ImageProbe::new();
    let probe = graph.add_module(probe).unwrap();

    graph.connect(image_out(src), image_in(probe)).unwrap();

    assert_eq!(graph.input_update_count(image_in(probe)).unwrap(), 1);
    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].volume.samples().unwrap().get(0), Some(7));
}

#[test]
fn test_second_connect_detaches_first_producer() {
    let mut graph = Graph::new();
    let a = source(&mut graph, 1);
    let b = source(&mut graph, 2);
    let (probe, seen) = ImageProbe::new();
    let probe = graph.add_module(probe).unwrap();

    graph.connect(image_out(a), image_in(probe)).unwrap();
    graph.connect(image_out(b), image_in(probe)).unwrap();

    assert_eq!(graph.source_of(image_in(probe)).unwrap(), Some(image_out(b)));
    assert!(graph.subscribers(image_out(a)).unwrap().is_empty());
    assert_eq!(graph.subscribers(image_out(b)).unwrap(), &[image_in(probe)]);

    // connect a, implicit disconnect, connect b
    assert_eq!(graph.input_update_count(image_in(probe)).unwrap(), 3);
    let last = seen.borrow().last().cloned().unwrap();
    assert_eq!(last.volume.samples().unwrap().get(0), Some(2));

    // Upstream changes of the detached producer no longer arrive.
    graph.submit_parameter(a, ScalarValue::Int(9)).unwrap();
    assert_eq!(graph.input_update_count(image_in(probe)).unwrap(), 3);
}

#[test]
fn test_reconnecting_same_pair_keeps_single_subscription() {
    let mut graph = Graph::new();
    let src = source(&mut graph, 1);
    let (probe, _) = ImageProbe::new();
    let probe = graph.add_module(probe).unwrap();

    graph.connect(image_out(src), image_in(probe)).unwrap();
    graph.connect(image_out(src), image_in(probe)).unwrap();

    assert_eq!(graph.subscribers(image_out(src)).unwrap(), &[image_in(probe)]);
}

#[test]
fn test_notify_reaches_every_subscriber_once() {
    let mut graph = Graph::new();
    let src = source(&mut graph, 1);
    let other = source(&mut graph, 1);
    let mut probes = Vec::new();
    for _ in 0..3 {
        let (probe, _) = ImageProbe::new();
        probes.push(graph.add_module(probe).unwrap());
    }
    let (bystander, _) = ImageProbe::new();
    let bystander = graph.add_module(bystander).unwrap();

    for &probe in &probes {
        graph.connect(image_out(src), image_in(probe)).unwrap();
    }
    graph.connect(image_out(other), image_in(bystander)).unwrap();

    graph.notify_outputs(src).unwrap();

    for &probe in &probes {
        assert_eq!(graph.input_update_count(image_in(probe)).unwrap(), 2);
    }
    assert_eq!(graph.input_update_count(image_in(bystander)).unwrap(), 1);
}

#[test]
fn test_disconnect_one_of_two_subscribers() {
    let mut graph = Graph::new();
    let src = source(&mut graph, 5);
    let (first, first_seen) = ImageProbe::new();
    let first = graph.add_module(first).unwrap();
    let (second, _) = ImageProbe::new();
    let second = graph.add_module(second).unwrap();
    graph.connect(image_out(src), image_in(first)).unwrap();
    graph.connect(image_out(src), image_in(second)).unwrap();

    graph.disconnect(image_in(first)).unwrap();

    assert_eq!(graph.subscribers(image_out(src)).unwrap(), &[image_in(second)]);
    assert_eq!(graph.input_update_count(image_in(first)).unwrap(), 2);
    assert_eq!(graph.input_update_count(image_in(second)).unwrap(), 1);

    let reset = first_seen.borrow().last().cloned().unwrap();
    assert!(!reset.volume.has_samples());
    assert_eq!(reset.volume.width(), 0);
    assert!(reset.chain.is_empty());
    assert!(graph.input_payload(image_in(first)).unwrap().is_empty());

    // The output survives losing a subscriber.
    assert!(!graph.output_payload(image_out(src)).unwrap().is_empty());
}

#[test]
fn test_disconnect_unconnected_input_is_noop() {
    let mut graph = Graph::new();
    let (probe, seen) = ImageProbe::new();
    let probe = graph.add_module(probe).unwrap();

    graph.disconnect(image_in(probe)).unwrap();

    assert_eq!(graph.input_update_count(image_in(probe)).unwrap(), 0);
    assert!(seen.borrow().is_empty());
}

#[test]
fn test_shader_chain_does_not_touch_upstream() {
    let mut graph = Graph::new();
    let src = source(&mut graph, 3);
    let first = graph
        .add_module(BuiltinModule::ShaderFilter(ShaderFilterModule::laplace()))
        .unwrap();
    let second = graph
        .add_module(BuiltinModule::ShaderFilter(ShaderFilterModule::laplace()))
        .unwrap();
    graph.connect(image_out(src), image_in(first)).unwrap();
    graph.connect(image_out(first), image_in(second)).unwrap();

    let upstream = graph.output_payload(image_out(first)).unwrap().as_image().unwrap().clone();
    let downstream = graph.output_payload(image_out(second)).unwrap().as_image().unwrap().clone();

    assert_eq!(upstream.chain.len(), 1);
    assert_eq!(downstream.chain.len(), 2);
    // Kernels are shared, the sequence is not.
    assert!(std::sync::Arc::ptr_eq(
        upstream.chain.get(0).unwrap(),
        downstream.chain.get(0).unwrap()
    ));
    // Samples pass through untouched.
    assert!(std::sync::Arc::ptr_eq(
        upstream.volume.samples().unwrap(),
        downstream.volume.samples().unwrap()
    ));
}

#[test]
fn test_cycle_and_self_connection_rejected() {
    let mut graph = Graph::new();
    let a = graph
        .add_module(BuiltinModule::ShaderFilter(ShaderFilterModule::laplace()))
        .unwrap();
    let b = graph
        .add_module(BuiltinModule::ShaderFilter(ShaderFilterModule::laplace()))
        .unwrap();
    let c = graph
        .add_module(BuiltinModule::ShaderFilter(ShaderFilterModule::laplace()))
        .unwrap();
    graph.connect(image_out(a), image_in(b)).unwrap();
    graph.connect(image_out(b), image_in(c)).unwrap();

    assert!(matches!(
        graph.connect(image_out(c), image_in(a)),
        Err(GraphError::CycleDetected { .. })
    ));
    assert!(matches!(
        graph.connect(image_out(b), image_in(b)),
        Err(GraphError::SelfConnection(_))
    ));
    assert_eq!(graph.source_of(image_in(a)).unwrap(), None);
}

#[test]
fn test_pending_connection_brokering() {
    let mut graph = Graph::new();
    let cube = graph
        .add_module(BuiltinModule::Geometry(GeometryModule::new(GeometryKind::Cube)))
        .unwrap();
    let renderer = graph
        .add_module(BuiltinModule::Renderer(
            RendererModule::new(RenderMode::Volume3d, RendererSettings::default())
                .with_surface(Box::new(voxgraph::collab::HeadlessSurface::new())),
        ))
        .unwrap();

    assert!(graph.complete_connection(scene_in(renderer, 0)).is_err());

    graph.begin_connection(scene_out(cube)).unwrap();
    assert_eq!(graph.pending_connection(), Some(scene_out(cube)));
    graph.complete_connection(scene_in(renderer, 2)).unwrap();

    assert_eq!(graph.pending_connection(), None);
    assert_eq!(graph.source_of(scene_in(renderer, 2)).unwrap(), Some(scene_out(cube)));

    graph.begin_connection(scene_out(cube)).unwrap();
    assert_eq!(graph.cancel_connection(), Some(scene_out(cube)));
    assert!(graph.begin_connection(scene_in(renderer, 0)).is_err());
}

#[test]
fn test_remove_module_resets_downstream() {
    let mut graph = Graph::new();
    let src = source(&mut graph, 4);
    let filter = graph
        .add_module(BuiltinModule::ShaderFilter(ShaderFilterModule::laplace()))
        .unwrap();
    let (probe, seen) = ImageProbe::new();
    let probe = graph.add_module(probe).unwrap();
    graph.connect(image_out(src), image_in(filter)).unwrap();
    graph.connect(image_out(filter), image_in(probe)).unwrap();
    let payloads = graph.payload_count();

    graph.remove_module(filter).unwrap();

    assert!(graph.subscribers(image_out(src)).unwrap().is_empty());
    assert_eq!(graph.source_of(image_in(probe)).unwrap(), None);
    assert_eq!(graph.input_update_count(image_in(probe)).unwrap(), 2);
    assert!(!seen.borrow().last().unwrap().volume.has_samples());
    assert_eq!(graph.payload_count(), payloads - 1);
    assert!(matches!(
        graph.connect(image_out(filter), image_in(probe)),
        Err(GraphError::UnknownModule(_))
    ));
    assert_eq!(graph.module_count(), 2);
}

#[test]
fn test_topology_lists_edges() {
    let mut graph = Graph::new();
    let src = source(&mut graph, 1);
    let (probe, _) = ImageProbe::new();
    let probe = graph.add_module(probe).unwrap();
    graph.connect(image_out(src), image_in(probe)).unwrap();

    let topology = graph.topology();
    assert_eq!(topology.modules.len(), 2);
    assert_eq!(topology.modules[0].name, "Image Source");
    assert_eq!(topology.connections.len(), 1);
    let edge = &topology.connections[0];
    assert_eq!((edge.from_module, edge.to_module), (src.0, probe.0));
    assert_eq!(edge.kind, PortKind::Image);

    let json = serde_json::to_string(&topology).unwrap();
    assert!(json.contains("Image Source"));
}

proptest! {
    #[test]
    fn test_each_input_has_at_most_one_producer(
        ops in prop::collection::vec((0usize..3, 0usize..3, any::<bool>()), 1..40)
    ) {
        let mut graph = Graph::new();
        let sources: Vec<_> = (0..3).map(|i| source(&mut graph, i as u8)).collect();
        let probes: Vec<_> = (0..3)
            .map(|_| graph.add_module(ImageProbe::new().0).unwrap())
            .collect();

        for (s, p, connect) in ops {
            if connect {
                graph.connect(image_out(sources[s]), image_in(probes[p])).unwrap();
            } else {
                graph.disconnect(image_in(probes[p])).unwrap();
            }
        }

        for &probe in &probes {
            let holders: Vec<_> = sources
                .iter()
                .filter(|&&s| graph.subscribers(image_out(s)).unwrap().contains(&image_in(probe)))
                .collect();
            prop_assert!(holders.len() <= 1);
            match graph.source_of(image_in(probe)).unwrap() {
                Some(output) => {
                    prop_assert_eq!(holders.len(), 1);
                    prop_assert_eq!(image_out(*holders[0]), output);
                }
                None => prop_assert!(holders.is_empty()),
            }
        }
        for &src in &sources {
            let subs = graph.subscribers(image_out(src)).unwrap();
            for (i, a) in subs.iter().enumerate() {
                prop_assert!(!subs[i + 1..].contains(a));
            }
        }
    }
}
