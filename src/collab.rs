//! External collaborators the module graph talks to.
//!
//! Modules never touch files, GPUs or downloads directly. They go through
//! three small contracts:
//! - [`ByteSource`] delivers the raw bytes of a volume preset, possibly later.
//! - [`RenderSurface`] takes textures and draw calls.
//! - [`LogSink`] receives composed CSV text under a suggested file name.
//!
//! In-crate implementations cover headless runs and tests.

use crate::config::VolumePreset;
use crate::graph::kernel::RenderPass;
use crate::graph::{GraphError, GraphResult, SceneNode};
use crossbeam_channel::{bounded, Receiver};
use half::f16;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

// ==================== Byte sources ====================

/// Asynchronous raw byte provider.
///
/// `load` returns immediately. The receiver yields exactly one message:
/// `Some(bytes)` on success or `None` when the bytes are unavailable. A
/// sender dropped without a message counts as unavailable too.
pub trait ByteSource {
    fn load(&self, preset: &VolumePreset) -> Receiver<Option<Vec<u8>>>;
}

/// Byte source backed by buffers registered per preset name.
#[derive(Debug, Default, Clone)]
pub struct MemoryByteSource {
    volumes: HashMap<String, Vec<u8>>,
}

impl MemoryByteSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_volume(mut self, preset_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.volumes.insert(preset_name.into(), bytes);
        self
    }

    pub fn insert(&mut self, preset_name: impl Into<String>, bytes: Vec<u8>) {
        self.volumes.insert(preset_name.into(), bytes);
    }
}

impl ByteSource for MemoryByteSource {
    fn load(&self, preset: &VolumePreset) -> Receiver<Option<Vec<u8>>> {
        let (tx, rx) = bounded(1);
        let _ = tx.send(self.volumes.get(&preset.name).cloned());
        rx
    }
}

/// Byte source reading raw files from a directory on a worker thread.
#[derive(Debug, Clone)]
pub struct FileByteSource {
    base_dir: PathBuf,
}

impl FileByteSource {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

impl ByteSource for FileByteSource {
    fn load(&self, preset: &VolumePreset) -> Receiver<Option<Vec<u8>>> {
        let (tx, rx) = bounded(1);
        let path = self.base_dir.join(&preset.file);
        let spawned = std::thread::Builder::new()
            .name("voxgraph-loader".to_string())
            .spawn(move || {
                let bytes = match std::fs::read(&path) {
                    Ok(bytes) => {
                        tracing::debug!("Read {} bytes from {:?}", bytes.len(), path);
                        Some(bytes)
                    }
                    Err(e) => {
                        tracing::warn!("Failed to read volume {:?}: {}", path, e);
                        None
                    }
                };
                let _ = tx.send(bytes);
            });
        if let Err(e) = spawned {
            // The sender was moved into the failed closure and dropped, so
            // the receiver reports the load as unavailable.
            tracing::error!("Failed to spawn loader thread: {}", e);
        }
        rx
    }
}

// ==================== Render surface ====================

/// Texel storage handed to the surface.
#[derive(Debug, Clone, PartialEq)]
pub enum TextureData {
    /// 8-bit single channel
    R8(Vec<u8>),
    /// Half-float single channel
    R16F(Vec<f16>),
}

impl TextureData {
    pub fn format_name(&self) -> &'static str {
        match self {
            TextureData::R8(_) => "R8",
            TextureData::R16F(_) => "R16F",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TextureData::R8(v) => v.len(),
            TextureData::R16F(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A volume ready for upload as a 3-D texture.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeTexture {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    pub data: TextureData,
}

/// How the volume mesh is presented.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewUniforms {
    /// One z-slice of the volume on a plane.
    Slice { index: usize },
    /// Ray-marched volume in a unit box.
    Volume { rotation: f64, voxel_size_z: f64 },
}

/// Per-draw material state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialState {
    /// Window level in texture units.
    pub centre: f64,
    pub width: f64,
    pub view: ViewUniforms,
}

/// Everything needed to draw one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    /// Empty when no volume is attached to the scene.
    pub passes: Vec<RenderPass>,
    pub scene: Vec<SceneNode>,
    /// `None` when no volume is attached to the scene.
    pub material: Option<MaterialState>,
}

/// Visible drawing surface driven by a renderer module.
pub trait RenderSurface {
    fn upload_texture(&mut self, texture: &VolumeTexture) -> GraphResult<()>;

    fn draw(&mut self, call: &DrawCall) -> GraphResult<()>;

    /// Drop the current texture and blank the surface.
    fn clear(&mut self);

    /// Release GPU-side resources. The surface is not used afterwards.
    fn release(&mut self);
}

/// Observable record of everything a [`HeadlessSurface`] was asked to do.
#[derive(Debug, Default)]
pub struct SurfaceLog {
    /// `(width, height, depth, format)` per upload
    pub uploads: Vec<(usize, usize, usize, &'static str)>,
    pub draws: Vec<DrawCall>,
    pub clears: usize,
    pub released: bool,
}

pub type SharedSurfaceLog = Rc<RefCell<SurfaceLog>>;

/// Render surface that records calls instead of drawing.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    log: SharedSurfaceLog,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle that stays readable after the surface moves into a module.
    pub fn log(&self) -> SharedSurfaceLog {
        Rc::clone(&self.log)
    }
}

impl RenderSurface for HeadlessSurface {
    fn upload_texture(&mut self, texture: &VolumeTexture) -> GraphResult<()> {
        let expected = texture.width * texture.height * texture.depth;
        if texture.data.len() != expected {
            return Err(GraphError::InvariantViolation(format!(
                "texture holds {} texels, {}x{}x{} requires {}",
                texture.data.len(),
                texture.width,
                texture.height,
                texture.depth,
                expected
            )));
        }
        self.log.borrow_mut().uploads.push((
            texture.width,
            texture.height,
            texture.depth,
            texture.data.format_name(),
        ));
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall) -> GraphResult<()> {
        self.log.borrow_mut().draws.push(call.clone());
        Ok(())
    }

    fn clear(&mut self) {
        self.log.borrow_mut().clears += 1;
    }

    fn release(&mut self) {
        self.log.borrow_mut().released = true;
    }
}

// ==================== Log sinks ====================

/// Receives composed log content for download.
pub trait LogSink {
    /// `content` is the complete accumulated text; a later delivery under the
    /// same name supersedes an earlier one.
    fn deliver(&mut self, content: &str, suggested_name: &str) -> GraphResult<()>;
}

/// Writes each delivery to `<dir>/<suggested_name>.csv`.
#[derive(Debug, Clone)]
pub struct FileLogSink {
    dir: PathBuf,
}

impl FileLogSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, suggested_name: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", suggested_name))
    }
}

impl LogSink for FileLogSink {
    fn deliver(&mut self, content: &str, suggested_name: &str) -> GraphResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(suggested_name);
        std::fs::write(&path, content)?;
        tracing::info!("Wrote log {:?}", path);
        Ok(())
    }
}

/// Keeps deliveries in memory as `(suggested_name, content)` pairs.
#[derive(Debug, Default, Clone)]
pub struct MemoryLogSink {
    entries: Rc<RefCell<Vec<(String, String)>>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries.borrow().clone()
    }

    /// Most recent content delivered under `suggested_name`.
    pub fn latest(&self, suggested_name: &str) -> Option<String> {
        self.entries
            .borrow()
            .iter()
            .rev()
            .find(|(name, _)| name == suggested_name)
            .map(|(_, content)| content.clone())
    }
}

impl LogSink for MemoryLogSink {
    fn deliver(&mut self, content: &str, suggested_name: &str) -> GraphResult<()> {
        self.entries
            .borrow_mut()
            .push((suggested_name.to_string(), content.to_string()));
        Ok(())
    }
}
