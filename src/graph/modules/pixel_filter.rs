//! PixelFilterModule: CPU convolution of the input volume.
//!
//! On every image update the input metadata is copied to the output and, if
//! samples are present, replaced by the convolution result (which shrinks the
//! in-plane grid by the kernel radius on each side). The upstream kernel chain
//! passes through unchanged.

use crate::collab::LogSink;
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::kernel::{create_gaussian_kernel, filter_image_data, laplace_kernel, FilteredVolume};
use crate::graph::module::ModuleContext;
use crate::graph::payload::{ImagePort, Kernel, ScalarValue};
use crate::graph::port::{PortArity, PortKind};
use std::sync::Arc;
use std::time::Instant;

static INPUTS: &[PortArity] = &[
    PortArity::new(PortKind::Image, 1),
    PortArity::new(PortKind::Scene, 0),
    PortArity::new(PortKind::Base, 0),
];

const TIMING_HEADER: &str = "Voxels, DataType, Modality, KernelSize, Execution Time(ms)\n";

/// Accumulated convolution timings for one filter.
struct TimingLog {
    runs: u32,
    rows: String,
    sink: Box<dyn LogSink>,
}

/// Pixel-domain convolution filter.
pub struct PixelFilterModule {
    name: String,
    kernel: Arc<Kernel>,
    /// Set for Gaussian filters; the only kernels that accept a parameter.
    sigma: Option<f64>,
    outputs: [PortArity; 3],
    timing: Option<TimingLog>,
}

impl PixelFilterModule {
    /// "Gauss Smoothing Data" with a kernel generated from `sigma`.
    pub fn gaussian(sigma: f64) -> GraphResult<Self> {
        let kernel = create_gaussian_kernel(sigma)?;
        let mut module = Self::with_kernel("Gauss Smoothing Data", kernel);
        module.sigma = Some(sigma);
        Ok(module)
    }

    /// "Laplace Filter Data" with the fixed 3x3 Laplace kernel.
    pub fn laplace() -> Self {
        Self::with_kernel("Laplace Filter Data", laplace_kernel())
    }

    pub fn with_kernel(name: impl Into<String>, kernel: Kernel) -> Self {
        Self {
            name: name.into(),
            kernel: Arc::new(kernel),
            sigma: None,
            outputs: [
                PortArity::new(PortKind::Image, 1),
                PortArity::new(PortKind::Scene, 0),
                PortArity::new(PortKind::Base, 0),
            ],
            timing: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Time `runs` repeated convolutions per update and deliver the
    /// accumulated CSV to `sink`.
    pub fn with_timing(mut self, runs: u32, sink: Box<dyn LogSink>) -> Self {
        self.timing = Some(TimingLog {
            runs: runs.max(1),
            rows: TIMING_HEADER.to_string(),
            sink,
        });
        self
    }

    /// Declare `count` image outputs. Only a single output is supported;
    /// larger counts fail on the first update.
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

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn sigma(&self) -> Option<f64> {
        self.sigma
    }

    pub fn on_input_changed(&mut self, kind: PortKind, ctx: &mut ModuleContext) -> GraphResult<bool> {
        if kind != PortKind::Image {
            return Ok(false);
        }
        ctx.require_single_output(PortKind::Image)?;
        self.recompute(ctx)?;
        Ok(true)
    }

    /// Accepts a new sigma for Gaussian filters.
    pub fn on_parameter_submitted(
        &mut self,
        value: &ScalarValue,
        ctx: &mut ModuleContext,
    ) -> GraphResult<bool> {
        if self.sigma.is_none() {
            return Err(GraphError::InvalidParameter {
                module: self.name.clone(),
                message: "kernel is fixed".to_string(),
            });
        }
        let sigma = value
            .as_number()
            .filter(|s| s.is_finite() && *s > 0.0)
            .ok_or_else(|| GraphError::InvalidParameter {
                module: self.name.clone(),
                message: format!("sigma must be a positive number, got {:?}", value),
            })?;

        self.kernel = Arc::new(create_gaussian_kernel(sigma)?);
        self.sigma = Some(sigma);
        tracing::debug!(
            "'{}' sigma set to {} ({}x{} kernel)",
            self.name,
            sigma,
            self.kernel.dim(),
            self.kernel.dim()
        );

        ctx.require_single_output(PortKind::Image)?;
        self.recompute(ctx)?;
        Ok(true)
    }

    pub fn release_child_resources(&mut self) {
        self.timing = None;
    }

    fn recompute(&mut self, ctx: &mut ModuleContext) -> GraphResult<()> {
        let input = ctx.image_input(0);

        // Convolve before touching the output so a failure leaves it as it was.
        let filtered = match input.volume.samples() {
            Some(samples) => {
                let volume = &input.volume;
                match self.timing.as_mut() {
                    Some(timing) => {
                        let runs = timing.runs;
                        let mut total_ms = 0.0;
                        let mut last = None;
                        for _ in 0..runs {
                            let start = Instant::now();
                            last = Some(filter_image_data(
                                samples,
                                volume.width(),
                                volume.height(),
                                volume.depth(),
                                &self.kernel,
                            )?);
                            total_ms += start.elapsed().as_secs_f64() * 1000.0;
                        }
                        if let Some(result) = &last {
                            let average_ms = total_ms / runs as f64;
                            record_timing(&self.name, timing, &input, result, self.kernel.len(), average_ms);
                        }
                        last
                    }
                    None => Some(filter_image_data(
                        samples,
                        volume.width(),
                        volume.height(),
                        volume.depth(),
                        &self.kernel,
                    )?),
                }
            }
            None => None,
        };

        let output = ctx.image_output_mut(0)?;
        output.volume.copy_metadata_from(&input.volume);
        output.chain = input.chain.clone();
        if let Some(filtered) = filtered {
            output
                .volume
                .replace_grid(filtered.width, filtered.height, filtered.samples)?;
        }
        Ok(())
    }
}

fn record_timing(
    name: &str,
    timing: &mut TimingLog,
    input: &ImagePort,
    result: &FilteredVolume,
    kernel_len: usize,
    average_ms: f64,
) {
    let sample_type = input
        .volume
        .sample_type()
        .map(|t| t.name())
        .unwrap_or("unknown");
    timing.rows.push_str(&format!(
        "\n{}, {}, {}, {}, {}",
        result.samples.len(),
        sample_type,
        input.volume.modality(),
        kernel_len,
        average_ms
    ));
    tracing::info!("'{}' convolution took {:.3} ms on average", name, average_ms);

    let file_name = format!("filter-execution-time-{}", name);
    if let Err(e) = timing.sink.deliver(&timing.rows, &file_name) {
        tracing::warn!("'{}' failed to deliver timing log: {}", name, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gaussian_defaults() {
        let filter = PixelFilterModule::gaussian(1.0).unwrap();
        assert_eq!(filter.name(), "Gauss Smoothing Data");
        assert_eq!(filter.kernel().len(), 25);
        assert_eq!(filter.sigma(), Some(1.0));
    }

    #[test]
    fn test_gaussian_rejects_bad_sigma() {
        assert!(matches!(
            PixelFilterModule::gaussian(0.0),
            Err(GraphError::InvalidKernel(_))
        ));
    }

    #[test]
    fn test_laplace_has_fixed_kernel() {
        let filter = PixelFilterModule::laplace();
        assert_eq!(filter.name(), "Laplace Filter Data");
        assert_eq!(filter.kernel().dim(), 3);
        assert!(filter.sigma().is_none());
    }

    #[test]
    fn test_arity_tables() {
        let filter = PixelFilterModule::laplace().with_image_outputs(2);
        assert_eq!(filter.inputs()[0], PortArity::new(PortKind::Image, 1));
        assert_eq!(filter.outputs()[0], PortArity::new(PortKind::Image, 2));
        assert_eq!(filter.outputs().len(), 3);
    }
}
