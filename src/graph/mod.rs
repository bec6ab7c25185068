//! Dataflow graph runtime.
//!
//! Modules expose typed input and output ports (image, scene, base). An
//! output holds one payload and fans out to any number of inputs; an input
//! has at most one source. When an output changes, every subscribed input
//! is notified and its module decides whether its own outputs changed,
//! which continues propagation downstream.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐  image  ┌─────────┐  image  ┌────────┐  image  ┌──────────┐
//! │  Loader  │ ──────► │  Gauss  │ ──────► │ Shader │ ──────► │ Renderer │
//! └──────────┘         └─────────┘         └────────┘         └──────────┘
//!                                                        scene   ▲
//!                                          ┌──────────┐ ─────────┘
//!                                          │   Cube   │
//!                                          └──────────┘
//! ```

pub mod error;
#[allow(clippy::module_inception)]
pub mod graph;
pub mod id;
pub mod kernel;
pub mod module;
pub mod module_type;
pub mod modules;
pub mod payload;
pub mod port;

pub use error::{GraphError, GraphResult};
pub use graph::{ConnectionSnapshot, Graph, ModuleSnapshot, ModuleSlot, TopologySnapshot};
pub use id::{ModuleId, PortId};
pub use kernel::{
    create_gaussian_kernel, filter_image_data, laplace_kernel, plan_render_passes, BufferId,
    FilteredVolume, PassSource, PassTarget, RenderPass,
};
pub use module::{
    AnyModule, BuiltinModule, Connection, ModuleContext, ModulePlugin, PointerButton,
    PointerEvent,
};
pub use module_type::{ModuleFactory, ModuleType};
pub use payload::{
    FaceSide, Geometry, ImagePort, Kernel, KernelChain, Material, Payload, SampleType, Samples,
    ScalarValue, SceneNode, VolumeData, VoxelSize,
};
pub use port::{PortArity, PortDirection, PortKind, NO_PORTS};
