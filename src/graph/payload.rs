//! Payload types exchanged between ports, and the arena that owns them.
//!
//! Three payload kinds exist: image ports (a volume plus a deferred kernel
//! chain), scene nodes, and base scalar values. Output ports own one payload
//! record each in the `PayloadArena`; connected inputs read the producer's
//! record through its `PayloadKey` rather than holding a copy.
//!
//! Sample buffers and kernels sit behind `Arc` so a shader-domain filter can
//! pass the upstream buffer on by reference, and a copied kernel chain shares
//! its kernels with the chain it was copied from.

use crate::graph::error::{GraphError, GraphResult};
use crate::graph::port::PortKind;
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

// ==================== Volume data ====================

/// Fixed-width unsigned sample encodings a volume may use.
///
/// Serialized by name, so an unknown name in a config file surfaces as
/// `UnsupportedSampleType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SampleType {
    Uint8,
    Uint16,
}

impl SampleType {
    pub fn name(self) -> &'static str {
        match self {
            SampleType::Uint8 => "Uint8",
            SampleType::Uint16 => "Uint16",
        }
    }

    /// Width of one sample in bytes.
    pub fn byte_width(self) -> usize {
        match self {
            SampleType::Uint8 => 1,
            SampleType::Uint16 => 2,
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SampleType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Uint8" => Ok(SampleType::Uint8),
            "Uint16" => Ok(SampleType::Uint16),
            other => Err(GraphError::UnsupportedSampleType(other.to_string())),
        }
    }
}

impl TryFrom<String> for SampleType {
    type Error = GraphError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SampleType> for String {
    fn from(value: SampleType) -> Self {
        value.name().to_string()
    }
}

/// Physical scale of one voxel along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoxelSize {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl VoxelSize {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl Default for VoxelSize {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }
}

/// Flat sample buffer, row-major with x fastest, then y, then z.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Samples {
    U8(Vec<u8>),
    U16(Vec<u16>),
}

impl Samples {
    pub fn len(&self) -> usize {
        match self {
            Samples::U8(v) => v.len(),
            Samples::U16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            Samples::U8(_) => SampleType::Uint8,
            Samples::U16(_) => SampleType::Uint16,
        }
    }

    /// Sample at `index`, widened.
    pub fn get(&self, index: usize) -> Option<u32> {
        match self {
            Samples::U8(v) => v.get(index).map(|&s| s as u32),
            Samples::U16(v) => v.get(index).map(|&s| s as u32),
        }
    }

    /// Smallest and largest sample, or `None` for an empty buffer.
    pub fn min_max(&self) -> Option<(u32, u32)> {
        fn fold<T: Copy + Ord + Into<u32>>(values: &[T]) -> Option<(u32, u32)> {
            let first = *values.first()?;
            let (min, max) = values
                .iter()
                .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            Some((min.into(), max.into()))
        }
        match self {
            Samples::U8(v) => fold(v),
            Samples::U16(v) => fold(v),
        }
    }
}

/// One 3-D (or 2-D stack) sample grid with its metadata.
///
/// Whenever samples are present, `samples.len() == width * height * depth`
/// and their encoding matches `sample_type`. All mutators preserve this.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VolumeData {
    sample_type: Option<SampleType>,
    modality: String,
    width: usize,
    height: usize,
    depth: usize,
    voxel_size: VoxelSize,
    samples: Option<Arc<Samples>>,
}

impl VolumeData {
    /// Metadata-only volume; samples are absent until assigned.
    pub fn new(
        sample_type: SampleType,
        modality: impl Into<String>,
        width: usize,
        height: usize,
        depth: usize,
        voxel_size: VoxelSize,
    ) -> Self {
        Self {
            sample_type: Some(sample_type),
            modality: modality.into(),
            width,
            height,
            depth,
            voxel_size,
            samples: None,
        }
    }

    pub fn with_samples(mut self, samples: Samples) -> GraphResult<Self> {
        self.set_samples(Some(Arc::new(samples)))?;
        Ok(self)
    }

    pub fn sample_type(&self) -> Option<SampleType> {
        self.sample_type
    }

    pub fn modality(&self) -> &str {
        &self.modality
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn voxel_size(&self) -> VoxelSize {
        self.voxel_size
    }

    pub fn voxel_count(&self) -> usize {
        self.width * self.height * self.depth
    }

    pub fn samples(&self) -> Option<&Arc<Samples>> {
        self.samples.as_ref()
    }

    pub fn has_samples(&self) -> bool {
        self.samples.is_some()
    }

    /// Assign (or clear) the sample buffer, checking it against the metadata.
    pub fn set_samples(&mut self, samples: Option<Arc<Samples>>) -> GraphResult<()> {
        if let Some(buffer) = &samples {
            self.check_buffer(self.width, self.height, buffer)?;
        }
        self.samples = samples;
        Ok(())
    }

    /// Replace the in-plane dimensions together with a buffer of the new shape.
    /// Depth is kept.
    pub fn replace_grid(&mut self, width: usize, height: usize, samples: Samples) -> GraphResult<()> {
        self.check_buffer(width, height, &samples)?;
        self.width = width;
        self.height = height;
        self.samples = Some(Arc::new(samples));
        Ok(())
    }

    /// Copy sample type, modality, dimensions and voxel size from `other`.
    /// The sample buffer is left absent; callers assign it afterwards.
    pub fn copy_metadata_from(&mut self, other: &VolumeData) {
        self.sample_type = other.sample_type;
        self.modality.clone_from(&other.modality);
        self.width = other.width;
        self.height = other.height;
        self.depth = other.depth;
        self.voxel_size = other.voxel_size;
        self.samples = None;
    }

    /// Drop the buffer and reset metadata to the empty sentinel.
    pub fn clear(&mut self) {
        *self = VolumeData::default();
    }

    fn check_buffer(&self, width: usize, height: usize, samples: &Samples) -> GraphResult<()> {
        let expected = width * height * self.depth;
        if samples.len() != expected {
            return Err(GraphError::InvariantViolation(format!(
                "sample buffer holds {} values, {}x{}x{} requires {}",
                samples.len(),
                width,
                height,
                self.depth,
                expected
            )));
        }
        if self.sample_type != Some(samples.sample_type()) {
            return Err(GraphError::InvariantViolation(format!(
                "sample buffer is {}, volume declares {:?}",
                samples.sample_type(),
                self.sample_type
            )));
        }
        Ok(())
    }
}

// ==================== Kernels ====================

/// Square convolution kernel of odd linear dimension, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    weights: Vec<f64>,
    dim: usize,
}

impl Kernel {
    pub fn new(weights: Vec<f64>) -> GraphResult<Self> {
        let len = weights.len();
        let dim = (len as f64).sqrt().round() as usize;
        if dim * dim != len {
            return Err(GraphError::InvalidKernel(format!(
                "{} weights do not form a square",
                len
            )));
        }
        if dim % 2 == 0 {
            return Err(GraphError::InvalidKernel(format!(
                "{}x{} kernel has no center element",
                dim, dim
            )));
        }
        Ok(Self { weights, dim })
    }

    /// Build from weights already known to form an odd `dim x dim` square.
    pub(crate) fn from_square(weights: Vec<f64>, dim: usize) -> Self {
        debug_assert!(dim % 2 == 1 && weights.len() == dim * dim);
        Self { weights, dim }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Linear dimension `k` of the `k x k` kernel.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Distance from the center to the border, `floor(k / 2)`.
    pub fn radius(&self) -> usize {
        self.dim / 2
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.weights.iter().sum()
    }
}

/// Ordered kernels a renderer applies at draw time. Empty means identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KernelChain(Vec<Arc<Kernel>>);

impl KernelChain {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Kernel>> {
        self.0.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Kernel>> {
        self.0.get(index)
    }

    pub fn push(&mut self, kernel: Arc<Kernel>) {
        self.0.push(kernel);
    }

    /// Copy of this chain with `kernel` appended. `self` is untouched.
    pub fn appended(&self, kernel: Arc<Kernel>) -> KernelChain {
        let mut kernels = Vec::with_capacity(self.0.len() + 1);
        kernels.extend(self.0.iter().cloned());
        kernels.push(kernel);
        KernelChain(kernels)
    }
}

/// Payload carried by image ports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImagePort {
    pub volume: VolumeData,
    pub chain: KernelChain,
}

impl ImagePort {
    pub fn new(volume: VolumeData) -> Self {
        Self {
            volume,
            chain: KernelChain::new(),
        }
    }
}

// ==================== Scene nodes ====================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Geometry {
    Box { width: f64, height: f64, depth: f64 },
    Plane { width: f64, height: f64 },
}

/// Which faces of a mesh are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceSide {
    Front,
    Back,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// 0xRRGGBB
    pub color: u32,
    pub opacity: f32,
    pub transparent: bool,
    pub side: FaceSide,
    pub depth_test: bool,
    pub depth_write: bool,
}

impl Material {
    /// Translucent line material used by the geometry sources.
    pub const fn outline(color: u32, side: FaceSide) -> Self {
        Self {
            color,
            opacity: 0.5,
            transparent: true,
            side,
            depth_test: true,
            depth_write: false,
        }
    }
}

/// Opaque renderable node. Cloned whenever a renderer merges it into its own
/// scene, so one upstream node can feed several renderers.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub name: String,
    pub geometry: Geometry,
    pub material: Material,
    /// Euler rotation in radians.
    pub rotation: [f64; 3],
}

impl SceneNode {
    pub fn new(name: impl Into<String>, geometry: Geometry, material: Material) -> Self {
        Self {
            name: name.into(),
            geometry,
            material,
            rotation: [0.0; 3],
        }
    }
}

// ==================== Base values ====================

/// Scalar or string value, used for base ports and parameter submissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ScalarValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScalarValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ScalarValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ScalarValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of `Int` and `Float`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ScalarValue::Int(v) => Some(*v as f64),
            ScalarValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::String(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

// ==================== Arena ====================

/// A payload record of one of the three kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Image(ImagePort),
    Scene(Option<SceneNode>),
    Base(Option<ScalarValue>),
}

impl Payload {
    /// The empty sentinel for `kind`.
    pub fn empty(kind: PortKind) -> Self {
        match kind {
            PortKind::Image => Payload::Image(ImagePort::default()),
            PortKind::Scene => Payload::Scene(None),
            PortKind::Base => Payload::Base(None),
        }
    }

    pub fn kind(&self) -> PortKind {
        match self {
            Payload::Image(_) => PortKind::Image,
            Payload::Scene(_) => PortKind::Scene,
            Payload::Base(_) => PortKind::Base,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Image(port) => port.chain.is_empty() && port.volume == VolumeData::default(),
            Payload::Scene(node) => node.is_none(),
            Payload::Base(value) => value.is_none(),
        }
    }

    pub fn as_image(&self) -> Option<&ImagePort> {
        match self {
            Payload::Image(port) => Some(port),
            _ => None,
        }
    }

    pub fn as_scene(&self) -> Option<&Option<SceneNode>> {
        match self {
            Payload::Scene(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_base(&self) -> Option<&Option<ScalarValue>> {
        match self {
            Payload::Base(value) => Some(value),
            _ => None,
        }
    }
}

new_key_type! {
    /// Stable handle to a payload record owned by an output port.
    pub struct PayloadKey;
}

/// Owner of every output payload in a graph.
#[derive(Debug, Default)]
pub struct PayloadArena {
    records: SlotMap<PayloadKey, Payload>,
}

impl PayloadArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh empty record of `kind`.
    pub fn allocate(&mut self, kind: PortKind) -> PayloadKey {
        self.records.insert(Payload::empty(kind))
    }

    pub fn get(&self, key: PayloadKey) -> Option<&Payload> {
        self.records.get(key)
    }

    pub fn get_mut(&mut self, key: PayloadKey) -> Option<&mut Payload> {
        self.records.get_mut(key)
    }

    /// Release a record. Returns the payload it held.
    pub fn release(&mut self, key: PayloadKey) -> Option<Payload> {
        self.records.remove(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
