//! Module abstraction for the dataflow graph.
//!
//! Two-layer design:
//! - **`ModulePlugin` trait** for modules defined outside the crate.
//! - **`BuiltinModule` enum** for the built-in specializations, dispatched by
//!   match.
//!
//! `AnyModule` wraps either variant so the graph handles both uniformly.
//! Modules never hold references to their ports; every hook receives a
//! `ModuleContext` giving access to the module's own inputs and outputs for
//! the duration of the call.

use crate::graph::error::{GraphError, GraphResult};
use crate::graph::id::{ModuleId, PortId};
use crate::graph::modules::{
    DataLoaderModule, GeometryModule, PixelFilterModule, RawDataLoaderModule, RendererModule,
    ShaderFilterModule,
};
use crate::graph::payload::{
    ImagePort, Payload, PayloadArena, PayloadKey, ScalarValue, SceneNode,
};
use crate::graph::port::{PerKind, PortArity, PortKind};
use std::time::Duration;

// ==================== Port instances ====================

/// Link from an input to the output it reads through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub output: PortId,
    pub payload: PayloadKey,
}

/// Materialized input slot. Reads the empty payload of its kind while
/// disconnected.
#[derive(Debug, Clone)]
pub struct InputPort {
    pub id: PortId,
    pub(crate) source: Option<Connection>,
    pub(crate) update_count: u64,
}

impl InputPort {
    pub(crate) fn new(id: PortId) -> Self {
        Self {
            id,
            source: None,
            update_count: 0,
        }
    }

    pub fn source(&self) -> Option<Connection> {
        self.source
    }

    /// Number of `update` notifications this input has received.
    pub fn update_count(&self) -> u64 {
        self.update_count
    }
}

/// Materialized output slot owning one payload record.
#[derive(Debug, Clone)]
pub struct OutputPort {
    pub id: PortId,
    pub(crate) payload: PayloadKey,
    pub(crate) subscribers: Vec<PortId>,
}

impl OutputPort {
    pub(crate) fn new(id: PortId, payload: PayloadKey) -> Self {
        Self {
            id,
            payload,
            subscribers: Vec::new(),
        }
    }

    pub fn payload_key(&self) -> PayloadKey {
        self.payload
    }

    /// Subscribed inputs in subscription order.
    pub fn subscribers(&self) -> &[PortId] {
        &self.subscribers
    }
}

// ==================== Context ====================

/// Per-call view of one module's ports and the payload arena.
pub struct ModuleContext<'a> {
    module: ModuleId,
    inputs: &'a PerKind<Vec<InputPort>>,
    outputs: &'a PerKind<Vec<OutputPort>>,
    arena: &'a mut PayloadArena,
}

impl<'a> ModuleContext<'a> {
    pub(crate) fn new(
        module: ModuleId,
        inputs: &'a PerKind<Vec<InputPort>>,
        outputs: &'a PerKind<Vec<OutputPort>>,
        arena: &'a mut PayloadArena,
    ) -> Self {
        Self {
            module,
            inputs,
            outputs,
            arena,
        }
    }

    pub fn module_id(&self) -> ModuleId {
        self.module
    }

    pub fn input_count(&self, kind: PortKind) -> usize {
        self.inputs.get(kind).len()
    }

    pub fn output_count(&self, kind: PortKind) -> usize {
        self.outputs.get(kind).len()
    }

    pub fn is_input_connected(&self, kind: PortKind, index: usize) -> bool {
        self.inputs
            .get(kind)
            .get(index)
            .is_some_and(|port| port.source.is_some())
    }

    fn input_payload(&self, kind: PortKind, index: usize) -> Option<&Payload> {
        let source = self.inputs.get(kind).get(index)?.source?;
        self.arena.get(source.payload)
    }

    /// Current image on input `index`, or the empty image when disconnected.
    pub fn image_input(&self, index: usize) -> ImagePort {
        match self.input_payload(PortKind::Image, index) {
            Some(Payload::Image(port)) => port.clone(),
            _ => ImagePort::default(),
        }
    }

    pub fn scene_input(&self, index: usize) -> Option<SceneNode> {
        match self.input_payload(PortKind::Scene, index) {
            Some(Payload::Scene(node)) => node.clone(),
            _ => None,
        }
    }

    /// Scene nodes present on any scene input, in port order.
    pub fn scene_inputs(&self) -> Vec<SceneNode> {
        (0..self.input_count(PortKind::Scene))
            .filter_map(|i| self.scene_input(i))
            .collect()
    }

    pub fn base_input(&self, index: usize) -> Option<ScalarValue> {
        match self.input_payload(PortKind::Base, index) {
            Some(Payload::Base(value)) => value.clone(),
            _ => None,
        }
    }

    fn output_payload_mut(&mut self, kind: PortKind, index: usize) -> GraphResult<&mut Payload> {
        let module = self.module;
        let key = self
            .outputs
            .get(kind)
            .get(index)
            .map(|port| port.payload)
            .ok_or(GraphError::UnknownPort(PortId::output(module, kind, index as u16)))?;
        self.arena.get_mut(key).ok_or_else(|| {
            GraphError::InvariantViolation(format!(
                "output {}#{} of {:?} has no payload record",
                kind, index, module
            ))
        })
    }

    pub fn image_output_mut(&mut self, index: usize) -> GraphResult<&mut ImagePort> {
        match self.output_payload_mut(PortKind::Image, index)? {
            Payload::Image(port) => Ok(port),
            other => Err(kind_drift(PortKind::Image, other)),
        }
    }

    pub fn scene_output_mut(&mut self, index: usize) -> GraphResult<&mut Option<SceneNode>> {
        match self.output_payload_mut(PortKind::Scene, index)? {
            Payload::Scene(node) => Ok(node),
            other => Err(kind_drift(PortKind::Scene, other)),
        }
    }

    pub fn base_output_mut(&mut self, index: usize) -> GraphResult<&mut Option<ScalarValue>> {
        match self.output_payload_mut(PortKind::Base, index)? {
            Payload::Base(value) => Ok(value),
            other => Err(kind_drift(PortKind::Base, other)),
        }
    }

    /// Fails with `UnsupportedArity` when more than one output of `kind` is
    /// declared.
    pub fn require_single_output(&self, kind: PortKind) -> GraphResult<()> {
        let count = self.output_count(kind);
        if count > 1 {
            return Err(GraphError::UnsupportedArity {
                module: self.module,
                kind,
                count,
            });
        }
        Ok(())
    }
}

fn kind_drift(expected: PortKind, found: &Payload) -> GraphError {
    GraphError::InvariantViolation(format!(
        "{} output holds a {} payload",
        expected,
        found.kind()
    ))
}

// ==================== Pointer events ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
}

/// Input forwarded from the render surface to a module.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Drag {
        button: PointerButton,
        dx: f64,
        dy: f64,
    },
    Wheel {
        delta_y: f64,
    },
    /// Surface scale changed; the module should redraw.
    Scale {
        factor: f64,
    },
}

// ==================== Plugin trait ====================

/// Contract every module implements.
///
/// Hooks returning `GraphResult<bool>` report whether outputs changed; the
/// graph then notifies all output families once.
pub trait ModulePlugin {
    /// Human-readable name of this module.
    fn name(&self) -> &str;

    /// Input arity table. Must name every kind exactly once.
    fn inputs(&self) -> &[PortArity];

    /// Output arity table. Must name every kind exactly once.
    fn outputs(&self) -> &[PortArity];

    /// Called once after ports are materialized.
    fn on_init(&mut self, _ctx: &mut ModuleContext) -> GraphResult<bool> {
        Ok(false)
    }

    /// Called once per `update` received on an input of `kind`.
    fn on_input_changed(&mut self, kind: PortKind, ctx: &mut ModuleContext) -> GraphResult<bool>;

    /// Called when a configuration surface commits a new parameter value.
    fn on_parameter_submitted(
        &mut self,
        _value: &ScalarValue,
        _ctx: &mut ModuleContext,
    ) -> GraphResult<bool> {
        Err(GraphError::InvalidParameter {
            module: self.name().to_string(),
            message: "module has no parameters".to_string(),
        })
    }

    /// Called by the graph to complete pending asynchronous work.
    fn poll_pending(&mut self, _ctx: &mut ModuleContext) -> GraphResult<bool> {
        Ok(false)
    }

    /// Called once per frame of the external render loop.
    fn on_frame(&mut self, _dt: Duration, _ctx: &mut ModuleContext) -> GraphResult<()> {
        Ok(())
    }

    fn on_pointer(&mut self, _event: &PointerEvent, _ctx: &mut ModuleContext) -> GraphResult<()> {
        Ok(())
    }

    /// Release resources beyond ports and payloads. Called last on removal.
    fn release_child_resources(&mut self) {}
}

// ==================== Built-in dispatch ====================

/// Enum dispatch for built-in modules.
pub enum BuiltinModule {
    DataLoader(DataLoaderModule),
    RawDataLoader(RawDataLoaderModule),
    PixelFilter(PixelFilterModule),
    ShaderFilter(ShaderFilterModule),
    Renderer(RendererModule),
    Geometry(GeometryModule),
}

impl BuiltinModule {
    pub fn name(&self) -> &str {
        match self {
            BuiltinModule::DataLoader(m) => m.name(),
            BuiltinModule::RawDataLoader(m) => m.name(),
            BuiltinModule::PixelFilter(m) => m.name(),
            BuiltinModule::ShaderFilter(m) => m.name(),
            BuiltinModule::Renderer(m) => m.name(),
            BuiltinModule::Geometry(m) => m.name(),
        }
    }

    pub fn inputs(&self) -> &[PortArity] {
        match self {
            BuiltinModule::DataLoader(m) => m.inputs(),
            BuiltinModule::RawDataLoader(m) => m.inputs(),
            BuiltinModule::PixelFilter(m) => m.inputs(),
            BuiltinModule::ShaderFilter(m) => m.inputs(),
            BuiltinModule::Renderer(m) => m.inputs(),
            BuiltinModule::Geometry(m) => m.inputs(),
        }
    }

    pub fn outputs(&self) -> &[PortArity] {
        match self {
            BuiltinModule::DataLoader(m) => m.outputs(),
            BuiltinModule::RawDataLoader(m) => m.outputs(),
            BuiltinModule::PixelFilter(m) => m.outputs(),
            BuiltinModule::ShaderFilter(m) => m.outputs(),
            BuiltinModule::Renderer(m) => m.outputs(),
            BuiltinModule::Geometry(m) => m.outputs(),
        }
    }

    pub fn on_init(&mut self, ctx: &mut ModuleContext) -> GraphResult<bool> {
        match self {
            BuiltinModule::DataLoader(m) => m.on_init(ctx),
            BuiltinModule::RawDataLoader(m) => m.on_init(ctx),
            BuiltinModule::PixelFilter(_) => Ok(false),
            BuiltinModule::ShaderFilter(_) => Ok(false),
            BuiltinModule::Renderer(_) => Ok(false),
            BuiltinModule::Geometry(m) => m.on_init(ctx),
        }
    }

    pub fn on_input_changed(&mut self, kind: PortKind, ctx: &mut ModuleContext) -> GraphResult<bool> {
        match self {
            BuiltinModule::DataLoader(m) => m.on_input_changed(kind, ctx),
            BuiltinModule::RawDataLoader(m) => m.on_input_changed(kind, ctx),
            BuiltinModule::PixelFilter(m) => m.on_input_changed(kind, ctx),
            BuiltinModule::ShaderFilter(m) => m.on_input_changed(kind, ctx),
            BuiltinModule::Renderer(m) => m.on_input_changed(kind, ctx),
            BuiltinModule::Geometry(m) => m.on_input_changed(kind, ctx),
        }
    }

    pub fn on_parameter_submitted(
        &mut self,
        value: &ScalarValue,
        ctx: &mut ModuleContext,
    ) -> GraphResult<bool> {
        match self {
            BuiltinModule::DataLoader(m) => m.on_parameter_submitted(value, ctx),
            BuiltinModule::RawDataLoader(m) => m.on_parameter_submitted(value, ctx),
            BuiltinModule::PixelFilter(m) => m.on_parameter_submitted(value, ctx),
            BuiltinModule::ShaderFilter(m) => m.on_parameter_submitted(value, ctx),
            BuiltinModule::Renderer(m) => no_parameters(m.name()),
            BuiltinModule::Geometry(m) => no_parameters(m.name()),
        }
    }

    pub fn poll_pending(&mut self, ctx: &mut ModuleContext) -> GraphResult<bool> {
        match self {
            BuiltinModule::DataLoader(m) => m.poll_pending(ctx),
            BuiltinModule::RawDataLoader(m) => m.poll_pending(ctx),
            _ => Ok(false),
        }
    }

    pub fn on_frame(&mut self, dt: Duration, ctx: &mut ModuleContext) -> GraphResult<()> {
        match self {
            BuiltinModule::Renderer(m) => m.on_frame(dt, ctx),
            _ => Ok(()),
        }
    }

    pub fn on_pointer(&mut self, event: &PointerEvent, ctx: &mut ModuleContext) -> GraphResult<()> {
        match self {
            BuiltinModule::Renderer(m) => m.on_pointer(event, ctx),
            _ => Ok(()),
        }
    }

    pub fn release_child_resources(&mut self) {
        match self {
            BuiltinModule::DataLoader(m) => m.release_child_resources(),
            BuiltinModule::RawDataLoader(m) => m.release_child_resources(),
            BuiltinModule::PixelFilter(m) => m.release_child_resources(),
            BuiltinModule::ShaderFilter(m) => m.release_child_resources(),
            BuiltinModule::Renderer(m) => m.release_child_resources(),
            BuiltinModule::Geometry(m) => m.release_child_resources(),
        }
    }
}

fn no_parameters(name: &str) -> GraphResult<bool> {
    Err(GraphError::InvalidParameter {
        module: name.to_string(),
        message: "module has no parameters".to_string(),
    })
}

/// Wrapper that holds either a built-in module (enum dispatch) or a plugin (trait object).
pub enum AnyModule {
    Builtin(BuiltinModule),
    Plugin(Box<dyn ModulePlugin>),
}

impl AnyModule {
    pub fn name(&self) -> &str {
        match self {
            AnyModule::Builtin(m) => m.name(),
            AnyModule::Plugin(m) => m.name(),
        }
    }

    pub fn inputs(&self) -> &[PortArity] {
        match self {
            AnyModule::Builtin(m) => m.inputs(),
            AnyModule::Plugin(m) => m.inputs(),
        }
    }

    pub fn outputs(&self) -> &[PortArity] {
        match self {
            AnyModule::Builtin(m) => m.outputs(),
            AnyModule::Plugin(m) => m.outputs(),
        }
    }

    pub fn on_init(&mut self, ctx: &mut ModuleContext) -> GraphResult<bool> {
        match self {
            AnyModule::Builtin(m) => m.on_init(ctx),
            AnyModule::Plugin(m) => m.on_init(ctx),
        }
    }

    pub fn on_input_changed(&mut self, kind: PortKind, ctx: &mut ModuleContext) -> GraphResult<bool> {
        match self {
            AnyModule::Builtin(m) => m.on_input_changed(kind, ctx),
            AnyModule::Plugin(m) => m.on_input_changed(kind, ctx),
        }
    }

    pub fn on_parameter_submitted(
        &mut self,
        value: &ScalarValue,
        ctx: &mut ModuleContext,
    ) -> GraphResult<bool> {
        match self {
            AnyModule::Builtin(m) => m.on_parameter_submitted(value, ctx),
            AnyModule::Plugin(m) => m.on_parameter_submitted(value, ctx),
        }
    }

    pub fn poll_pending(&mut self, ctx: &mut ModuleContext) -> GraphResult<bool> {
        match self {
            AnyModule::Builtin(m) => m.poll_pending(ctx),
            AnyModule::Plugin(m) => m.poll_pending(ctx),
        }
    }

    pub fn on_frame(&mut self, dt: Duration, ctx: &mut ModuleContext) -> GraphResult<()> {
        match self {
            AnyModule::Builtin(m) => m.on_frame(dt, ctx),
            AnyModule::Plugin(m) => m.on_frame(dt, ctx),
        }
    }

    pub fn on_pointer(&mut self, event: &PointerEvent, ctx: &mut ModuleContext) -> GraphResult<()> {
        match self {
            AnyModule::Builtin(m) => m.on_pointer(event, ctx),
            AnyModule::Plugin(m) => m.on_pointer(event, ctx),
        }
    }

    pub fn release_child_resources(&mut self) {
        match self {
            AnyModule::Builtin(m) => m.release_child_resources(),
            AnyModule::Plugin(m) => m.release_child_resources(),
        }
    }

    pub fn as_builtin(&self) -> Option<&BuiltinModule> {
        match self {
            AnyModule::Builtin(m) => Some(m),
            AnyModule::Plugin(_) => None,
        }
    }

    pub fn as_builtin_mut(&mut self) -> Option<&mut BuiltinModule> {
        match self {
            AnyModule::Builtin(m) => Some(m),
            AnyModule::Plugin(_) => None,
        }
    }
}

impl From<BuiltinModule> for AnyModule {
    fn from(module: BuiltinModule) -> Self {
        AnyModule::Builtin(module)
    }
}

impl From<Box<dyn ModulePlugin>> for AnyModule {
    fn from(module: Box<dyn ModulePlugin>) -> Self {
        AnyModule::Plugin(module)
    }
}
