//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use std::time::{Duration, Instant};
use voxgraph::graph::{Graph, ModuleId, PortId, PortKind};

/// Upper bound for loads served by worker threads
pub const LOAD_TIMEOUT: Duration = Duration::from_secs(5);

/// Pump `graph` until `expected` loads were published or [`LOAD_TIMEOUT`]
/// passed. Returns whether all of them arrived.
pub fn wait_for_loads(graph: &mut Graph, expected: usize) -> bool {
    let started = Instant::now();
    let mut published = 0;
    while published < expected {
        published += graph.pump_loads().unwrap();
        if started.elapsed() > LOAD_TIMEOUT {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    true
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// First image output of `module`
pub fn image_out(module: ModuleId) -> PortId {
    PortId::output(module, PortKind::Image, 0)
}

/// First image input of `module`
pub fn image_in(module: ModuleId) -> PortId {
    PortId::input(module, PortKind::Image, 0)
}

pub fn scene_out(module: ModuleId) -> PortId {
    PortId::output(module, PortKind::Scene, 0)
}

pub fn scene_in(module: ModuleId, index: u16) -> PortId {
    PortId::input(module, PortKind::Scene, index)
}
