//! Test data builders for creating test objects

use std::cell::RefCell;
use std::rc::Rc;
use voxgraph::config::VolumePreset;
use voxgraph::graph::{
    GraphResult, ImagePort, ModuleContext, ModulePlugin, PortArity, PortKind, SampleType,
    Samples, ScalarValue, VolumeData, VoxelSize,
};

/// Builder for creating test volumes
pub struct VolumeBuilder {
    width: usize,
    height: usize,
    depth: usize,
    modality: String,
    voxel_size: VoxelSize,
    samples: Option<Samples>,
}

impl VolumeBuilder {
    pub fn new(width: usize, height: usize, depth: usize) -> Self {
        Self {
            width,
            height,
            depth,
            modality: "ct".to_string(),
            voxel_size: VoxelSize::default(),
            samples: None,
        }
    }

    pub fn modality(mut self, modality: &str) -> Self {
        self.modality = modality.to_string();
        self
    }

    pub fn voxel_size(mut self, x: f64, y: f64, z: f64) -> Self {
        self.voxel_size = VoxelSize::new(x, y, z);
        self
    }

    /// 8-bit samples produced by `f(x, y, z)`
    pub fn u8_fn(mut self, f: impl Fn(usize, usize, usize) -> u8) -> Self {
        self.samples = Some(Samples::U8(self.generate(f)));
        self
    }

    /// 16-bit samples produced by `f(x, y, z)`
    pub fn u16_fn(mut self, f: impl Fn(usize, usize, usize) -> u16) -> Self {
        self.samples = Some(Samples::U16(self.generate(f)));
        self
    }

    pub fn u8_fill(self, value: u8) -> Self {
        self.u8_fn(move |_, _, _| value)
    }

    pub fn u16_fill(self, value: u16) -> Self {
        self.u16_fn(move |_, _, _| value)
    }

    fn generate<T>(&self, f: impl Fn(usize, usize, usize) -> T) -> Vec<T> {
        let mut values = Vec::with_capacity(self.width * self.height * self.depth);
        for z in 0..self.depth {
            for y in 0..self.height {
                for x in 0..self.width {
                    values.push(f(x, y, z));
                }
            }
        }
        values
    }

    pub fn build(self) -> VolumeData {
        let sample_type = match &self.samples {
            Some(samples) => samples.sample_type(),
            None => SampleType::Uint8,
        };
        let volume = VolumeData::new(
            sample_type,
            self.modality,
            self.width,
            self.height,
            self.depth,
            self.voxel_size,
        );
        match self.samples {
            Some(samples) => volume.with_samples(samples).unwrap(),
            None => volume,
        }
    }

    pub fn build_port(self) -> ImagePort {
        ImagePort::new(self.build())
    }
}

/// Small preset whose raw bytes tests can synthesize
pub fn test_preset(name: &str, sample_type: SampleType, width: usize, height: usize, depth: usize) -> VolumePreset {
    VolumePreset {
        name: name.to_string(),
        file: format!("{}.raw", name.to_lowercase().replace(' ', "_")),
        sample_type,
        modality: "ct".to_string(),
        width,
        height,
        depth,
        voxel_size: VoxelSize::new(1.0, 1.0, 2.0),
    }
}

static IMAGE_ONLY: &[PortArity] = &[
    PortArity::new(PortKind::Image, 1),
    PortArity::new(PortKind::Scene, 0),
    PortArity::new(PortKind::Base, 0),
];

static NOTHING: &[PortArity] = &[
    PortArity::new(PortKind::Image, 0),
    PortArity::new(PortKind::Scene, 0),
    PortArity::new(PortKind::Base, 0),
];

/// Plugin source publishing a fixed image on init and a replacement on
/// every submitted parameter.
pub struct ImageSource {
    image: ImagePort,
}

impl ImageSource {
    pub fn new(image: ImagePort) -> Self {
        Self { image }
    }

    pub fn boxed(image: ImagePort) -> Box<dyn ModulePlugin> {
        Box::new(Self::new(image))
    }
}

impl ModulePlugin for ImageSource {
    fn name(&self) -> &str {
        "Image Source"
    }

    fn inputs(&self) -> &[PortArity] {
        NOTHING
    }

    fn outputs(&self) -> &[PortArity] {
        IMAGE_ONLY
    }

    fn on_init(&mut self, ctx: &mut ModuleContext) -> GraphResult<bool> {
        *ctx.image_output_mut(0)? = self.image.clone();
        Ok(true)
    }

    fn on_input_changed(&mut self, _kind: PortKind, _ctx: &mut ModuleContext) -> GraphResult<bool> {
        Ok(false)
    }

    /// An `Int` fills the image with that value.
    fn on_parameter_submitted(&mut self, value: &ScalarValue, ctx: &mut ModuleContext) -> GraphResult<bool> {
        let fill = value.as_int().unwrap_or(0);
        let volume = &self.image.volume;
        let samples = match volume.sample_type() {
            Some(SampleType::Uint16) => Samples::U16(vec![fill as u16; volume.voxel_count()]),
            _ => Samples::U8(vec![fill as u8; volume.voxel_count()]),
        };
        let mut next = self.image.clone();
        next.volume.set_samples(Some(samples.into()))?;
        self.image = next;
        *ctx.image_output_mut(0)? = self.image.clone();
        Ok(true)
    }
}

/// What an [`ImageProbe`] saw on each image update
pub type ProbeLog = Rc<RefCell<Vec<ImagePort>>>;

/// Plugin sink recording every image it is notified about.
pub struct ImageProbe {
    seen: ProbeLog,
}

impl ImageProbe {
    pub fn new() -> (Box<dyn ModulePlugin>, ProbeLog) {
        let seen = ProbeLog::default();
        (Box::new(Self { seen: seen.clone() }), seen)
    }
}

impl ModulePlugin for ImageProbe {
    fn name(&self) -> &str {
        "Image Probe"
    }

    fn inputs(&self) -> &[PortArity] {
        IMAGE_ONLY
    }

    fn outputs(&self) -> &[PortArity] {
        NOTHING
    }

    fn on_input_changed(&mut self, kind: PortKind, ctx: &mut ModuleContext) -> GraphResult<bool> {
        if kind == PortKind::Image {
            self.seen.borrow_mut().push(ctx.image_input(0));
        }
        Ok(false)
    }
}
