//! ShaderFilterModule: defers its kernel to render time.
//!
//! The output shares the input's sample buffer and carries a copy of the
//! input kernel chain with this filter's kernel appended. Nothing is
//! convolved on the CPU; the renderer evaluates the chain when drawing.

use crate::graph::error::{GraphError, GraphResult};
use crate::graph::kernel::laplace_kernel;
use crate::graph::module::ModuleContext;
use crate::graph::payload::{Kernel, ScalarValue};
use crate::graph::port::{PortArity, PortKind};
use std::sync::Arc;

static INPUTS: &[PortArity] = &[
    PortArity::new(PortKind::Image, 1),
    PortArity::new(PortKind::Scene, 0),
    PortArity::new(PortKind::Base, 0),
];

/// Shader-domain filter.
pub struct ShaderFilterModule {
    name: String,
    kernel: Arc<Kernel>,
    outputs: [PortArity; 3],
}

impl ShaderFilterModule {
    pub fn new(name: impl Into<String>, kernel: Kernel) -> Self {
        Self {
            name: name.into(),
            kernel: Arc::new(kernel),
            outputs: [
                PortArity::new(PortKind::Image, 1),
                PortArity::new(PortKind::Scene, 0),
                PortArity::new(PortKind::Base, 0),
            ],
        }
    }

    /// "Laplace Filter Shader"
    pub fn laplace() -> Self {
        Self::new("Laplace Filter Shader", laplace_kernel())
    }

    pub fn with_image_outputs(mut self, count: usize) -> Self {
        self.outputs[0] = PortArity::new(PortKind::Image, count);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[PortArity] {
        INPUTS
    }

    pub fn outputs(&self) -> &[PortArity] {
        &self.outputs
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    pub fn on_input_changed(&mut self, kind: PortKind, ctx: &mut ModuleContext) -> GraphResult<bool> {
        if kind != PortKind::Image {
            return Ok(false);
        }
        ctx.require_single_output(PortKind::Image)?;

        let input = ctx.image_input(0);
        let output = ctx.image_output_mut(0)?;
        output.volume.copy_metadata_from(&input.volume);
        output.volume.set_samples(input.volume.samples().cloned())?;
        output.chain = input.chain.appended(Arc::clone(&self.kernel));

        tracing::debug!(
            "'{}' forwarded chain of {} kernel(s)",
            self.name,
            output.chain.len()
        );
        Ok(true)
    }

    pub fn on_parameter_submitted(
        &mut self,
        _value: &ScalarValue,
        _ctx: &mut ModuleContext,
    ) -> GraphResult<bool> {
        Err(GraphError::InvalidParameter {
            module: self.name.clone(),
            message: "kernel is fixed".to_string(),
        })
    }

    pub fn release_child_resources(&mut self) {}
}
