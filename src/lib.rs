//! # voxgraph: dataflow runtime for a medical volume workbench
//!
//! Modules are wired into a directed graph through typed ports. A data
//! loader publishes a volume, filters transform it either on the CPU or by
//! deferring their kernel to the renderer, and renderers draw the result
//! together with scene geometry.
//!
//! ## Architecture
//!
//! - **Graph**: module slots, port wiring and update propagation
//! - **Modules**: preset and raw-file loaders, pixel filter, shader filter,
//!   renderer, geometry
//! - **Kernel**: 2-D convolution, Gaussian kernels and render pass planning
//! - **Collaborators**: byte sources, render surfaces and log sinks
//!
//! ## Configuration
//!
//! Settings are read from `config.toml` in the platform config directory
//! under `voxgraph` (see [`config`]).
//!
//! ## Example
//!
//! ```ignore
//! use voxgraph::config::WorkbenchConfig;
//! use voxgraph::graph::{Graph, ModuleFactory, ModuleType, PortId, PortKind};
//!
//! let factory = ModuleFactory::new(WorkbenchConfig::default());
//! let mut graph = Graph::new();
//! let loader = graph.add_module(factory.create(ModuleType::ExampleDataLoader)?)?;
//! let renderer = graph.add_module(factory.create(ModuleType::Renderer2d)?)?;
//! graph.connect(
//!     PortId::output(loader, PortKind::Image, 0),
//!     PortId::input(renderer, PortKind::Image, 0),
//! )?;
//! graph.pump_loads()?;
//! ```

pub mod collab;
pub mod config;
pub mod error;
pub mod graph;

// Re-export commonly used types
pub use config::WorkbenchConfig;
pub use error::{Result, WorkbenchError};
pub use graph::{Graph, GraphError, ModuleFactory, ModuleId, ModuleType, PortId, PortKind};
