//! Kernel engine: CPU convolution, kernel synthesis and render-pass planning
//! for deferred kernel chains.

use crate::graph::error::{GraphError, GraphResult};
use crate::graph::payload::{Kernel, KernelChain, Samples};
use std::sync::Arc;

/// Result of a pixel-domain convolution: the shrunken grid and its samples.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredVolume {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    pub samples: Samples,
}

/// Convolve every z-slice of `samples` with `kernel`.
///
/// Only voxels whose full kernel footprint lies inside the slice are
/// produced, so the output grid is `(width - 2m) x (height - 2m) x depth`
/// with `m = kernel.radius()`. Negative sums clamp to zero. Sums are not
/// clamped from above: they are truncated to an integer and wrapped into the
/// input's sample width, so kernels whose weights can push a sum past the
/// sample range produce wrapped values.
///
/// Accumulation per output voxel runs `ky` outer, `kx` inner, both from
/// `-m` to `m`, starting from `0.0`.
pub fn filter_image_data(
    samples: &Samples,
    width: usize,
    height: usize,
    depth: usize,
    kernel: &Kernel,
) -> GraphResult<FilteredVolume> {
    if samples.len() != width * height * depth {
        return Err(GraphError::InvariantViolation(format!(
            "sample buffer holds {} values, {}x{}x{} requires {}",
            samples.len(),
            width,
            height,
            depth,
            width * height * depth
        )));
    }

    let m = kernel.radius();
    let new_width = width.saturating_sub(2 * m);
    let new_height = height.saturating_sub(2 * m);

    let out = match samples {
        Samples::U8(data) => Samples::U8(convolve(data, width, height, depth, kernel, |v| {
            v as u8
        })),
        Samples::U16(data) => Samples::U16(convolve(data, width, height, depth, kernel, |v| {
            v as u16
        })),
    };

    Ok(FilteredVolume {
        width: new_width,
        height: new_height,
        depth,
        samples: out,
    })
}

/// Inner loop shared by both sample widths. `narrow` receives the truncated
/// non-negative sum and reduces it to the output width.
fn convolve<T, F>(
    data: &[T],
    width: usize,
    height: usize,
    depth: usize,
    kernel: &Kernel,
    narrow: F,
) -> Vec<T>
where
    T: Copy + Into<f64>,
    F: Fn(u64) -> T,
{
    let m = kernel.radius();
    if width < 2 * m || height < 2 * m {
        return Vec::new();
    }
    let weights = kernel.weights();
    let out_len = (width - 2 * m) * (height - 2 * m) * depth;
    let mut out = Vec::with_capacity(out_len);

    for z in 0..depth {
        let slice = z * height * width;
        for y in m..height - m {
            for x in m..width - m {
                let mut sum = 0.0f64;
                let mut k = 0;
                for ky in 0..kernel.dim() {
                    let row = slice + (y + ky - m) * width;
                    for kx in 0..kernel.dim() {
                        let sample: f64 = data[row + x + kx - m].into();
                        sum += sample * weights[k];
                        k += 1;
                    }
                }
                let value = if sum > 0.0 { sum.trunc() as u64 } else { 0 };
                out.push(narrow(value));
            }
        }
    }
    out
}

/// Largest linear dimension `create_gaussian_kernel` will build.
pub const MAX_GAUSSIAN_DIM: usize = 1025;

/// Normalized Gaussian kernel for `sigma`.
///
/// Both axes start at `-2σ` and advance in unit steps while they stay within
/// `2σ`, so each axis takes `floor(4σ) + 1` steps. The kernel is centered at
/// `floor(σ)`, so for odd `2σ` it is not symmetric about its middle element.
///
/// An odd step count gives a valid kernel (σ = 0.1 yields 1x1, σ = 0.6
/// yields 3x3). An even step count has no center element and is rejected as
/// an invalid kernel (σ = 0.75, σ = 1.3). So are sigmas whose weights
/// underflow and kernels wider than [`MAX_GAUSSIAN_DIM`].
pub fn create_gaussian_kernel(sigma: f64) -> GraphResult<Kernel> {
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(GraphError::InvalidKernel(format!(
            "sigma must be positive, got {}",
            sigma
        )));
    }

    let standard_deviation = 2.0 * sigma;
    if (2.0 * standard_deviation).floor() >= MAX_GAUSSIAN_DIM as f64 {
        return Err(GraphError::InvalidKernel(format!(
            "sigma {} exceeds the {}x{} kernel limit",
            sigma, MAX_GAUSSIAN_DIM, MAX_GAUSSIAN_DIM
        )));
    }
    let mean = (standard_deviation / 2.0).floor();
    let denom = 2.0 * sigma * sigma;

    let mut weights = Vec::new();
    let mut sum = 0.0;
    let mut i = -standard_deviation;
    while i <= standard_deviation {
        let mut j = -standard_deviation;
        while j <= standard_deviation {
            let x = i - mean;
            let y = j - mean;
            let value = (-(x * x + y * y) / denom).exp();
            weights.push(value);
            sum += value;
            j += 1.0;
        }
        i += 1.0;
    }

    if !(sum.is_finite() && sum > 0.0) {
        return Err(GraphError::InvalidKernel(format!(
            "sigma {} is too small to weight any sample",
            sigma
        )));
    }
    for w in &mut weights {
        *w /= sum;
    }
    Kernel::new(weights)
}

const LAPLACE: [f64; 9] = [0.0, -1.0, 0.0, -1.0, 4.0, -1.0, 0.0, -1.0, 0.0];

/// 3x3 Laplace edge kernel.
pub fn laplace_kernel() -> Kernel {
    Kernel::from_square(LAPLACE.to_vec(), 3)
}

// ==================== Render passes ====================

/// Intermediate render buffer of the ping-pong pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferId {
    A,
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassSource {
    /// The full-precision volume texture.
    Volume,
    Buffer(BufferId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassTarget {
    Screen,
    Buffer(BufferId),
}

/// One draw of the chain evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPass {
    pub source: PassSource,
    pub target: PassTarget,
    /// `None` draws the source unfiltered.
    pub kernel: Option<Arc<Kernel>>,
}

/// Plan the draws needed to evaluate `chain` on the volume texture.
///
/// Kernel 0 always runs against the volume itself. With more kernels its
/// result is captured into a buffer; each further kernel swaps the buffer
/// roles, reading the one written last and writing the other. A last
/// unfiltered pass presents the final buffer.
pub fn plan_render_passes(chain: &KernelChain) -> Vec<RenderPass> {
    let first = match chain.get(0) {
        None => {
            return vec![RenderPass {
                source: PassSource::Volume,
                target: PassTarget::Screen,
                kernel: None,
            }]
        }
        Some(k) => k.clone(),
    };

    if chain.len() == 1 {
        return vec![RenderPass {
            source: PassSource::Volume,
            target: PassTarget::Screen,
            kernel: Some(first),
        }];
    }

    let mut passes = Vec::with_capacity(chain.len() + 1);
    let (mut read, mut write) = (BufferId::A, BufferId::B);
    passes.push(RenderPass {
        source: PassSource::Volume,
        target: PassTarget::Buffer(write),
        kernel: Some(first),
    });
    for kernel in chain.iter().skip(1) {
        std::mem::swap(&mut read, &mut write);
        passes.push(RenderPass {
            source: PassSource::Buffer(read),
            target: PassTarget::Buffer(write),
            kernel: Some(kernel.clone()),
        });
    }
    passes.push(RenderPass {
        source: PassSource::Buffer(write),
        target: PassTarget::Screen,
        kernel: None,
    });
    passes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, eps: f64) {
        assert!((a - b).abs() < eps, "{} != {} (eps {})", a, b, eps);
    }

    #[test]
    fn test_laplace_flat_field_is_zero() {
        let samples = Samples::U8(vec![10; 16]);
        let out = filter_image_data(&samples, 4, 4, 1, &laplace_kernel()).unwrap();
        assert_eq!((out.width, out.height, out.depth), (2, 2, 1));
        assert_eq!(out.samples, Samples::U8(vec![0; 4]));
    }

    #[test]
    fn test_negative_sums_clamp() {
        // Bright border, dark center: Laplace at the center is strongly negative.
        let mut data = vec![200u16; 9];
        data[4] = 0;
        let out = filter_image_data(&Samples::U16(data), 3, 3, 1, &laplace_kernel()).unwrap();
        assert_eq!(out.samples, Samples::U16(vec![0]));
    }

    #[test]
    fn test_identity_kernel_crops_border() {
        let mut weights = vec![0.0; 9];
        weights[4] = 1.0;
        let identity = Kernel::new(weights).unwrap();
        let data: Vec<u8> = (0..25).collect();
        let out = filter_image_data(&Samples::U8(data), 5, 5, 1, &identity).unwrap();
        assert_eq!(out.samples, Samples::U8(vec![6, 7, 8, 11, 12, 13, 16, 17, 18]));
    }

    #[test]
    fn test_overflow_wraps_sample_width() {
        let kernel = Kernel::new(vec![2.0]).unwrap();
        let out = filter_image_data(&Samples::U8(vec![200]), 1, 1, 1, &kernel).unwrap();
        assert_eq!(out.samples, Samples::U8(vec![144]));
    }

    #[test]
    fn test_depth_slices_are_independent() {
        let mut data = vec![1u8; 9];
        data.extend(vec![3u8; 9]);
        let mut weights = vec![0.0; 9];
        weights[4] = 1.0;
        let identity = Kernel::new(weights).unwrap();
        let out = filter_image_data(&Samples::U8(data), 3, 3, 2, &identity).unwrap();
        assert_eq!(out.depth, 2);
        assert_eq!(out.samples, Samples::U8(vec![1, 3]));
    }

    #[test]
    fn test_kernel_larger_than_image() {
        let kernel = Kernel::new(vec![1.0; 25]).unwrap();
        let out = filter_image_data(&Samples::U8(vec![1; 9]), 3, 3, 1, &kernel).unwrap();
        assert_eq!((out.width, out.height), (0, 0));
        assert!(out.samples.is_empty());
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let err = filter_image_data(&Samples::U8(vec![1; 8]), 3, 3, 1, &laplace_kernel());
        assert!(matches!(err, Err(GraphError::InvariantViolation(_))));
    }

    #[test]
    fn test_gaussian_sigma_one() {
        let kernel = create_gaussian_kernel(1.0).unwrap();
        assert_eq!(kernel.len(), 25);
        assert_eq!(kernel.dim(), 5);
        assert_close(kernel.sum(), 1.0, 1e-9);
    }

    #[test]
    fn test_gaussian_sigma_one_is_off_center() {
        // Peak sits at (i, j) = (1, 1), i.e. row 3 / column 3 of the 5x5 grid.
        let kernel = create_gaussian_kernel(1.0).unwrap();
        let w = kernel.weights();
        let peak = w
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
        assert_eq!(peak.0, 3 * 5 + 3);
        assert!(w[0] < w[24]);
    }

    #[test]
    fn test_gaussian_sigma_half_is_symmetric() {
        let kernel = create_gaussian_kernel(0.5).unwrap();
        assert_eq!(kernel.dim(), 3);
        let w = kernel.weights();
        for i in 0..w.len() {
            assert_close(w[i], w[w.len() - 1 - i], 1e-12);
        }
        assert!(w[4] > w[0]);
    }

    #[test]
    fn test_gaussian_step_count_decides_validity() {
        let tiny = create_gaussian_kernel(0.1).unwrap();
        assert_eq!(tiny.dim(), 1);
        assert_close(tiny.sum(), 1.0, 1e-12);

        let small = create_gaussian_kernel(0.6).unwrap();
        assert_eq!(small.dim(), 3);
        assert_close(small.sum(), 1.0, 1e-9);

        // floor(4 sigma) + 1 is even
        for sigma in [0.3, 0.75, 1.3] {
            assert!(matches!(
                create_gaussian_kernel(sigma),
                Err(GraphError::InvalidKernel(_))
            ));
        }
        assert!(create_gaussian_kernel(0.0).is_err());
        assert!(create_gaussian_kernel(-1.0).is_err());
    }

    #[test]
    fn test_gaussian_rejects_degenerate_sigmas() {
        assert!(matches!(
            create_gaussian_kernel(1e-300),
            Err(GraphError::InvalidKernel(_))
        ));
        assert!(matches!(
            create_gaussian_kernel(1e16),
            Err(GraphError::InvalidKernel(_))
        ));
        assert!(create_gaussian_kernel(f64::INFINITY).is_err());
    }

    #[test]
    fn test_plan_empty_chain() {
        let passes = plan_render_passes(&KernelChain::new());
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].source, PassSource::Volume);
        assert_eq!(passes[0].target, PassTarget::Screen);
        assert!(passes[0].kernel.is_none());
    }

    #[test]
    fn test_plan_single_kernel() {
        let k = Arc::new(laplace_kernel());
        let passes = plan_render_passes(&KernelChain::new().appended(k.clone()));
        assert_eq!(passes.len(), 1);
        assert!(Arc::ptr_eq(passes[0].kernel.as_ref().unwrap(), &k));
        assert_eq!(passes[0].target, PassTarget::Screen);
    }

    #[test]
    fn test_plan_three_kernels_ping_pong() {
        let k = Arc::new(laplace_kernel());
        let chain = KernelChain::new()
            .appended(k.clone())
            .appended(k.clone())
            .appended(k.clone());
        let passes = plan_render_passes(&chain);
        let route: Vec<_> = passes.iter().map(|p| (p.source, p.target)).collect();
        assert_eq!(
            route,
            vec![
                (PassSource::Volume, PassTarget::Buffer(BufferId::B)),
                (PassSource::Buffer(BufferId::B), PassTarget::Buffer(BufferId::A)),
                (PassSource::Buffer(BufferId::A), PassTarget::Buffer(BufferId::B)),
                (PassSource::Buffer(BufferId::B), PassTarget::Screen),
            ]
        );
        assert!(passes[3].kernel.is_none());
        assert!(passes[..3].iter().all(|p| p.kernel.is_some()));
    }
}
