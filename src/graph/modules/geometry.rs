//! GeometryModule: constant scene node source.

use crate::graph::error::{GraphError, GraphResult};
use crate::graph::module::ModuleContext;
use crate::graph::payload::{FaceSide, Geometry, Material, SceneNode};
use crate::graph::port::{PortArity, PortKind, NO_PORTS};
use serde::{Deserialize, Serialize};

static OUTPUTS: &[PortArity] = &[
    PortArity::new(PortKind::Image, 0),
    PortArity::new(PortKind::Scene, 1),
    PortArity::new(PortKind::Base, 0),
];

const OUTLINE_COLOR: u32 = 0xaa0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryKind {
    Cube,
    Plane,
}

impl GeometryKind {
    pub fn name(self) -> &'static str {
        match self {
            GeometryKind::Cube => "Cube",
            GeometryKind::Plane => "Plane",
        }
    }

    /// The fixed scene node this kind exposes.
    pub fn scene_node(self) -> SceneNode {
        match self {
            GeometryKind::Cube => SceneNode::new(
                self.name(),
                Geometry::Box {
                    width: 0.5,
                    height: 0.5,
                    depth: 0.5,
                },
                Material::outline(OUTLINE_COLOR, FaceSide::Back),
            ),
            GeometryKind::Plane => SceneNode::new(
                self.name(),
                Geometry::Plane {
                    width: 1.0,
                    height: 1.0,
                },
                Material::outline(OUTLINE_COLOR, FaceSide::Double),
            ),
        }
    }
}

/// Source of one fixed mesh on its scene output.
pub struct GeometryModule {
    kind: GeometryKind,
    node: SceneNode,
}

impl GeometryModule {
    pub fn new(kind: GeometryKind) -> Self {
        Self {
            kind,
            node: kind.scene_node(),
        }
    }

    pub fn kind(&self) -> GeometryKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        self.kind.name()
    }

    pub fn inputs(&self) -> &[PortArity] {
        NO_PORTS
    }

    pub fn outputs(&self) -> &[PortArity] {
        OUTPUTS
    }

    pub fn on_init(&mut self, ctx: &mut ModuleContext) -> GraphResult<bool> {
        *ctx.scene_output_mut(0)? = Some(self.node.clone());
        Ok(true)
    }

    pub fn on_input_changed(&mut self, kind: PortKind, _ctx: &mut ModuleContext) -> GraphResult<bool> {
        Err(GraphError::InvariantViolation(format!(
            "'{}' has no {} inputs",
            self.name(),
            kind
        )))
    }

    pub fn release_child_resources(&mut self) {}
}
