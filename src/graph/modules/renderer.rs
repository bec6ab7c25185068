//! RendererModule: terminal sink driving a [`RenderSurface`].
//!
//! An image update rebuilds the volume texture, window level and view state
//! from the current input; a scene update only re-merges the scene inputs.
//! Per-frame animation (slice ping-pong in 2-D, rotation in 3-D) and the
//! optional average-FPS log are driven by `on_frame`.

use crate::collab::{
    DrawCall, LogSink, MaterialState, RenderSurface, TextureData, ViewUniforms, VolumeTexture,
};
use crate::config::RendererSettings;
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::kernel::plan_render_passes;
use crate::graph::module::{ModuleContext, PointerButton, PointerEvent};
use crate::graph::payload::{KernelChain, SampleType, Samples, SceneNode, VolumeData};
use crate::graph::port::{PortArity, PortKind, NO_PORTS};
use half::f16;
use serde::{Deserialize, Serialize};
use std::time::Duration;

static INPUTS: &[PortArity] = &[
    PortArity::new(PortKind::Image, 1),
    PortArity::new(PortKind::Scene, 3),
    PortArity::new(PortKind::Base, 0),
];

const FPS_HEADER: &str = "Voxels, DataType, Modality, Centre, Width, FPS\n";

/// Offset between stored 16-bit CT values and Hounsfield units.
const CT_HU_OFFSET: f64 = 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderMode {
    /// One z-slice at a time on a plane.
    Slice2d,
    /// Ray-marched volume in a rotating box.
    Volume3d,
}

impl RenderMode {
    pub fn module_name(self) -> &'static str {
        match self {
            RenderMode::Slice2d => "Renderer 2D",
            RenderMode::Volume3d => "Renderer 3D",
        }
    }
}

// ==================== Window level ====================

/// Display window (LUT centre and width) in texture units.
///
/// 8-bit textures are normalized to `[0, 1]`, so their bounds and drag
/// multiplier are scaled by 1/255.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowLevel {
    pub centre: f64,
    pub width: f64,
    /// Smallest sample value in texture units.
    pub min: f64,
    /// Largest sample value in texture units.
    pub max: f64,
    /// Texture units per pointer pixel.
    pub multiplier: f64,
}

impl WindowLevel {
    /// Initial window for `samples`; `pointer_multiplier` applies to 16-bit data.
    pub fn for_samples(samples: &Samples, pointer_multiplier: f64) -> Self {
        let (lo, hi) = samples.min_max().unwrap_or((0, 0));
        let (centre, width, scale, multiplier) = match samples.sample_type() {
            SampleType::Uint8 => (40.0 / 255.0, 160.0 / 255.0, 1.0 / 255.0, 1.0 / 255.0),
            SampleType::Uint16 => (640.0, 2560.0, 1.0, pointer_multiplier),
        };
        let min = lo as f64 * scale;
        let max = hi as f64 * scale;

        // Filtered data can end below the default window.
        let clamp_to_max = |v: f64| if max > 0.0 && v > max { max } else { v };
        Self {
            centre: clamp_to_max(centre),
            width: clamp_to_max(width),
            min,
            max,
            multiplier,
        }
    }

    /// Vertical motion moves the centre, horizontal motion the width; both
    /// stay within the data range.
    pub fn drag(&mut self, dx: f64, dy: f64) {
        self.centre = (self.centre + dy * self.multiplier).max(self.min).min(self.max);
        self.width = (self.width + dx * self.multiplier).max(self.min).min(self.max);
    }

    /// Human-readable window. 16-bit CT is shown in Hounsfield units and
    /// 8-bit data in the original 0..255 range.
    pub fn label(&self, sample_type: SampleType, modality: &str) -> String {
        match sample_type {
            SampleType::Uint16 if modality == "ct" => {
                format!("LUT C/W: {} / {}", self.centre - CT_HU_OFFSET, self.width)
            }
            SampleType::Uint8 => format!(
                "LUT C/W: {} / {}",
                (self.centre * 255.0).round(),
                (self.width * 255.0).round()
            ),
            SampleType::Uint16 => format!("LUT C/W: {} / {}", self.centre, self.width),
        }
    }
}

// ==================== Helpers ====================

/// Height of the volume box relative to its unit width.
pub fn voxel_size_z(volume: &VolumeData) -> GraphResult<f64> {
    let voxel = volume.voxel_size();
    if voxel.x != voxel.y {
        return Err(GraphError::AnisotropicVoxels {
            x: voxel.x,
            y: voxel.y,
        });
    }
    Ok((volume.depth() as f64 * voxel.z) / (volume.width() as f64 * voxel.x))
}

/// 8-bit samples upload as-is; 16-bit samples become half floats.
pub fn prepare_texture(volume: &VolumeData, samples: &Samples) -> VolumeTexture {
    let data = match samples {
        Samples::U8(values) => TextureData::R8(values.clone()),
        Samples::U16(values) => {
            TextureData::R16F(values.iter().map(|&v| f16::from_f32(v as f32)).collect())
        }
    };
    VolumeTexture {
        width: volume.width(),
        height: volume.height(),
        depth: volume.depth(),
        data,
    }
}

// ==================== State ====================

/// Per-image render state, rebuilt on every image update.
#[derive(Debug, Clone)]
struct VolumeView {
    sample_type: SampleType,
    modality: String,
    voxel_count: usize,
    depth: usize,
    chain: KernelChain,
    window: WindowLevel,
    slice: usize,
    slice_ascending: bool,
    rotation: f64,
    voxel_size_z: f64,
}

impl VolumeView {
    /// Ping-pong between the first and last slice.
    fn advance_slice(&mut self) {
        if self.depth <= 1 {
            self.slice = 0;
            return;
        }
        if self.slice == 0 {
            self.slice_ascending = true;
        } else if self.slice >= self.depth - 1 {
            self.slice_ascending = false;
        }
        if self.slice_ascending {
            self.slice += 1;
        } else {
            self.slice -= 1;
        }
    }

    /// Wheel down moves towards slice 0, wheel up towards the last slice.
    fn step_slice(&mut self, delta_y: f64) {
        if delta_y > 0.0 && self.slice > 0 {
            self.slice -= 1;
        } else if delta_y < 0.0 && self.slice + 1 < self.depth {
            self.slice += 1;
        }
    }
}

#[derive(Debug)]
struct FpsCounter {
    frames: u64,
    elapsed: Duration,
    total_frames: u64,
    total_elapsed: Duration,
    csv: String,
    provided: bool,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            frames: 0,
            elapsed: Duration::ZERO,
            total_frames: 0,
            total_elapsed: Duration::ZERO,
            csv: FPS_HEADER.to_string(),
            provided: false,
        }
    }

    /// Counters restart per image; the accumulated CSV is kept.
    fn reset(&mut self) {
        self.frames = 0;
        self.elapsed = Duration::ZERO;
        self.total_frames = 0;
        self.total_elapsed = Duration::ZERO;
        self.provided = false;
    }

    fn tick(&mut self, dt: Duration) {
        self.frames += 1;
        self.elapsed += dt;
        if self.elapsed > Duration::from_secs(1) {
            tracing::trace!(
                "FPS: {:.0}",
                self.frames as f64 / self.elapsed.as_secs_f64()
            );
            self.total_elapsed += self.elapsed;
            self.total_frames += self.frames;
            self.frames = 0;
            self.elapsed = Duration::ZERO;
        }
    }

    fn average(&self) -> f64 {
        (self.total_frames as f64 / self.total_elapsed.as_secs_f64()).round()
    }
}

// ==================== Module ====================

/// 2-D slice or 3-D volume renderer.
pub struct RendererModule {
    name: String,
    mode: RenderMode,
    settings: RendererSettings,
    surface: Option<Box<dyn RenderSurface>>,
    log_sink: Option<Box<dyn LogSink>>,
    view: Option<VolumeView>,
    scene: Vec<SceneNode>,
    fps: FpsCounter,
}

impl RendererModule {
    pub fn new(mode: RenderMode, settings: RendererSettings) -> Self {
        Self {
            name: mode.module_name().to_string(),
            mode,
            settings,
            surface: None,
            log_sink: None,
            view: None,
            scene: Vec::new(),
            fps: FpsCounter::new(),
        }
    }

    pub fn with_surface(mut self, surface: Box<dyn RenderSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Sink for the average-FPS CSV; only used when FPS logging is enabled.
    pub fn with_log_sink(mut self, sink: Box<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[PortArity] {
        INPUTS
    }

    pub fn outputs(&self) -> &[PortArity] {
        NO_PORTS
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn window(&self) -> Option<&WindowLevel> {
        self.view.as_ref().map(|v| &v.window)
    }

    pub fn slice(&self) -> Option<usize> {
        self.view.as_ref().map(|v| v.slice)
    }

    pub fn rotation(&self) -> Option<f64> {
        self.view.as_ref().map(|v| v.rotation)
    }

    pub fn voxel_size_z(&self) -> Option<f64> {
        self.view.as_ref().map(|v| v.voxel_size_z)
    }

    /// Scene inputs merged into this renderer's own scene.
    pub fn scene_nodes(&self) -> &[SceneNode] {
        &self.scene
    }

    pub fn lut_label(&self) -> Option<String> {
        self.view
            .as_ref()
            .map(|v| v.window.label(v.sample_type, &v.modality))
    }

    pub fn slice_label(&self) -> Option<String> {
        match (self.mode, &self.view) {
            (RenderMode::Slice2d, Some(view)) => Some(format!("Slice: {}", view.slice)),
            _ => None,
        }
    }

    /// Whether the average-FPS row for the current image has been delivered.
    pub fn fps_logged(&self) -> bool {
        self.fps.provided
    }

    pub fn on_input_changed(&mut self, kind: PortKind, ctx: &mut ModuleContext) -> GraphResult<bool> {
        match kind {
            PortKind::Image => self.rebuild(ctx)?,
            PortKind::Scene => {
                self.scene = ctx.scene_inputs();
                if !self.settings.log_fps {
                    self.draw()?;
                }
            }
            PortKind::Base => {}
        }
        Ok(false)
    }

    pub fn on_frame(&mut self, dt: Duration, _ctx: &mut ModuleContext) -> GraphResult<()> {
        if self.view.is_none() {
            return Ok(());
        }
        if self.settings.log_fps {
            self.fps.tick(dt);
        }
        if !self.fps.provided {
            self.animate();
        }
        if self.settings.log_fps && !self.fps.provided {
            self.maybe_log_fps();
        }
        self.draw()
    }

    pub fn on_pointer(&mut self, event: &PointerEvent, _ctx: &mut ModuleContext) -> GraphResult<()> {
        let mode = self.mode;
        let view = match self.view.as_mut() {
            Some(view) => view,
            None if matches!(event, PointerEvent::Scale { .. }) => return self.draw(),
            None => return Ok(()),
        };

        let redraw = match *event {
            PointerEvent::Drag {
                button: PointerButton::Secondary,
                dx,
                dy,
            } => {
                view.window.drag(dx, dy);
                true
            }
            PointerEvent::Drag {
                button: PointerButton::Primary,
                ..
            } => mode == RenderMode::Volume3d,
            PointerEvent::Wheel { delta_y } => {
                if mode == RenderMode::Slice2d {
                    view.step_slice(delta_y);
                }
                true
            }
            PointerEvent::Scale { .. } => true,
        };

        if redraw && !self.settings.log_fps {
            self.draw()?;
        }
        Ok(())
    }

    pub fn release_child_resources(&mut self) {
        if let Some(mut surface) = self.surface.take() {
            surface.release();
        }
        self.log_sink = None;
        self.view = None;
        self.scene.clear();
        tracing::debug!("'{}' released its render surface", self.name);
    }

    fn rebuild(&mut self, ctx: &mut ModuleContext) -> GraphResult<()> {
        self.fps.reset();
        self.view = None;
        let surface = self
            .surface
            .as_mut()
            .ok_or(GraphError::MissingCollaborator("render surface"))?;
        surface.clear();

        let input = ctx.image_input(0);
        self.scene = ctx.scene_inputs();

        if let Some(samples) = input.volume.samples() {
            let volume = &input.volume;
            let voxel_size_z = match self.mode {
                RenderMode::Volume3d => voxel_size_z(volume)?,
                RenderMode::Slice2d => 1.0,
            };
            let texture = prepare_texture(volume, samples);
            surface.upload_texture(&texture)?;

            self.view = Some(VolumeView {
                sample_type: samples.sample_type(),
                modality: volume.modality().to_string(),
                voxel_count: volume.voxel_count(),
                depth: volume.depth(),
                chain: input.chain.clone(),
                window: WindowLevel::for_samples(samples, self.settings.pointer_multiplier),
                slice: 0,
                slice_ascending: true,
                rotation: 0.0,
                voxel_size_z,
            });
            tracing::debug!(
                "'{}' uploaded {}x{}x{} {} texture with {} kernel(s)",
                self.name,
                texture.width,
                texture.height,
                texture.depth,
                texture.data.format_name(),
                input.chain.len()
            );
        }

        if !self.settings.log_fps {
            self.draw()?;
        }
        Ok(())
    }

    fn animate(&mut self) {
        let step = self.settings.rotation_step;
        if let Some(view) = self.view.as_mut() {
            match self.mode {
                RenderMode::Slice2d => view.advance_slice(),
                RenderMode::Volume3d => view.rotation += step,
            }
        }
    }

    fn maybe_log_fps(&mut self) {
        let threshold = Duration::from_secs(self.settings.fps_log_after_secs);
        if threshold.is_zero() || self.fps.total_elapsed < threshold {
            return;
        }
        let Some(view) = self.view.as_ref() else {
            return;
        };

        let average = self.fps.average();
        self.fps.csv.push_str(&format!(
            "\n{}, {}, {}, {}, {}, {}",
            view.voxel_count,
            view.sample_type,
            view.modality,
            view.window.centre,
            view.window.width,
            average
        ));
        self.fps.provided = true;
        tracing::info!("'{}' averaged {} FPS", self.name, average);

        let file_name = format!("average-fps-{}", self.name);
        match self.log_sink.as_mut() {
            Some(sink) => {
                if let Err(e) = sink.deliver(&self.fps.csv, &file_name) {
                    tracing::warn!("'{}' failed to deliver FPS log: {}", self.name, e);
                }
            }
            None => tracing::warn!("'{}' has no log sink for {}", self.name, file_name),
        }
    }

    fn draw(&mut self) -> GraphResult<()> {
        let call = match &self.view {
            Some(view) => DrawCall {
                passes: plan_render_passes(&view.chain),
                scene: self.scene.clone(),
                material: Some(MaterialState {
                    centre: view.window.centre,
                    width: view.window.width,
                    view: match self.mode {
                        RenderMode::Slice2d => ViewUniforms::Slice { index: view.slice },
                        RenderMode::Volume3d => ViewUniforms::Volume {
                            rotation: view.rotation,
                            voxel_size_z: view.voxel_size_z,
                        },
                    },
                }),
            },
            None => DrawCall {
                passes: Vec::new(),
                scene: self.scene.clone(),
                material: None,
            },
        };
        self.surface
            .as_mut()
            .ok_or(GraphError::MissingCollaborator("render surface"))?
            .draw(&call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::payload::VoxelSize;

    #[test]
    fn test_window_defaults_uint16() {
        let window = WindowLevel::for_samples(&Samples::U16(vec![0, 4000]), 4.0);
        assert_eq!(window.centre, 640.0);
        assert_eq!(window.width, 2560.0);
        assert_eq!(window.max, 4000.0);
        assert_eq!(window.multiplier, 4.0);
    }

    #[test]
    fn test_window_clamped_to_data_max() {
        let window = WindowLevel::for_samples(&Samples::U16(vec![0, 1000]), 4.0);
        assert_eq!(window.centre, 640.0);
        assert_eq!(window.width, 1000.0);
    }

    #[test]
    fn test_window_all_zero_data_keeps_defaults() {
        let window = WindowLevel::for_samples(&Samples::U16(vec![0, 0]), 4.0);
        assert_eq!(window.centre, 640.0);
        assert_eq!(window.width, 2560.0);
    }

    #[test]
    fn test_window_uint8_scaled() {
        let window = WindowLevel::for_samples(&Samples::U8(vec![0, 255]), 4.0);
        assert!((window.centre - 40.0 / 255.0).abs() < 1e-12);
        assert_eq!(window.max, 1.0);
        assert!((window.multiplier - 1.0 / 255.0).abs() < 1e-12);
        assert_eq!(
            window.label(SampleType::Uint8, "ct"),
            "LUT C/W: 40 / 160"
        );
    }

    #[test]
    fn test_window_drag_clamps() {
        let mut window = WindowLevel::for_samples(&Samples::U16(vec![100, 3000]), 4.0);
        window.drag(10.0, -1000.0);
        assert_eq!(window.centre, 100.0);
        assert_eq!(window.width, 2600.0);
        window.drag(1000.0, 0.0);
        assert_eq!(window.width, 3000.0);
    }

    #[test]
    fn test_ct_label_in_hounsfield() {
        let window = WindowLevel::for_samples(&Samples::U16(vec![0, 4000]), 4.0);
        assert_eq!(window.label(SampleType::Uint16, "ct"), "LUT C/W: -384 / 2560");
        assert_eq!(window.label(SampleType::Uint16, "mrt"), "LUT C/W: 640 / 2560");
    }

    #[test]
    fn test_voxel_size_z() {
        let volume = VolumeData::new(SampleType::Uint8, "ct", 4, 4, 2, VoxelSize::new(0.5, 0.5, 1.0));
        assert_eq!(voxel_size_z(&volume).unwrap(), 1.0);

        let skewed = VolumeData::new(SampleType::Uint8, "ct", 4, 4, 2, VoxelSize::new(0.5, 0.25, 1.0));
        assert!(matches!(
            voxel_size_z(&skewed),
            Err(GraphError::AnisotropicVoxels { .. })
        ));
    }

    #[test]
    fn test_prepare_texture_half_float() {
        let volume = VolumeData::new(SampleType::Uint16, "ct", 2, 1, 1, VoxelSize::default());
        let texture = prepare_texture(&volume, &Samples::U16(vec![0, 2048]));
        assert_eq!(
            texture.data,
            TextureData::R16F(vec![f16::from_f32(0.0), f16::from_f32(2048.0)])
        );
    }

    #[test]
    fn test_slice_ping_pong_stays_in_range() {
        let mut view = VolumeView {
            sample_type: SampleType::Uint8,
            modality: "ct".to_string(),
            voxel_count: 3,
            depth: 3,
            chain: KernelChain::new(),
            window: WindowLevel::for_samples(&Samples::U8(vec![0, 1, 2]), 4.0),
            slice: 0,
            slice_ascending: true,
            rotation: 0.0,
            voxel_size_z: 1.0,
        };
        let mut seen = Vec::new();
        for _ in 0..6 {
            view.advance_slice();
            seen.push(view.slice);
        }
        assert_eq!(seen, vec![1, 2, 1, 0, 1, 2]);

        view.step_slice(-1.0);
        assert_eq!(view.slice, 2);
        view.step_slice(1.0);
        assert_eq!(view.slice, 1);
    }
}
