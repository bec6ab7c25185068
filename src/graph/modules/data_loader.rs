//! DataLoaderModule: source of image volumes.
//!
//! Selecting a preset starts an asynchronous load through the configured
//! [`ByteSource`]. The graph polls pending loads; a completed load publishes
//! the preset metadata and decoded samples on the single image output.
//!
//! Every selection bumps a load generation and drops the receiver of the
//! load it supersedes, so a slow load can never overwrite the output of a
//! newer selection.

use crate::collab::ByteSource;
use crate::config::VolumePreset;
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::module::ModuleContext;
use crate::graph::payload::{SampleType, Samples, ScalarValue, VolumeData};
use crate::graph::port::{PortArity, PortKind, NO_PORTS};
use crossbeam_channel::{Receiver, TryRecvError};
use std::sync::Arc;

pub(super) static LOADER_OUTPUTS: &[PortArity] = &[
    PortArity::new(PortKind::Image, 1),
    PortArity::new(PortKind::Scene, 0),
    PortArity::new(PortKind::Base, 0),
];

/// The one load a loader waits for, tagged with its generation.
#[derive(Default)]
pub(super) struct LoadTracker {
    generation: u64,
    pending: Option<Receiver<Option<Vec<u8>>>>,
}

impl LoadTracker {
    pub(super) fn generation(&self) -> u64 {
        self.generation
    }

    pub(super) fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Start loading `preset`, dropping any load still in flight.
    pub(super) fn start(&mut self, owner: &str, source: &dyn ByteSource, preset: &VolumePreset) {
        if self.pending.take().is_some() {
            tracing::debug!(
                "'{}' dropping superseded load (generation {})",
                owner,
                self.generation
            );
        }
        self.generation += 1;
        tracing::info!(
            "'{}' loading '{}' (generation {})",
            owner,
            preset.name,
            self.generation
        );
        self.pending = Some(source.load(preset));
    }

    /// `Some(result)` once the current load has finished. A worker that
    /// hung up without sending counts as unavailable bytes.
    pub(super) fn poll(&mut self) -> Option<Option<Vec<u8>>> {
        let result = match self.pending.as_ref()?.try_recv() {
            Ok(bytes) => bytes,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => None,
        };
        self.pending = None;
        Some(result)
    }

    pub(super) fn clear(&mut self) {
        self.pending = None;
    }
}

/// Metadata of `preset` plus the samples decoded from `bytes`.
///
/// Missing bytes, a size that does not match the preset and undecodable
/// bytes are logged and leave the samples absent.
pub(super) fn volume_from_bytes(owner: &str, preset: &VolumePreset, bytes: Option<Vec<u8>>) -> VolumeData {
    let mut volume = preset.to_volume();
    let Some(bytes) = bytes else {
        tracing::warn!("'{}' got no bytes for '{}'", owner, preset.name);
        return volume;
    };

    let expected = preset.expected_bytes();
    let decoded = if bytes.len() == expected {
        decode_samples(&bytes, preset.sample_type)
            .and_then(|samples| volume.set_samples(Some(Arc::new(samples))))
    } else {
        Err(GraphError::Decode(format!(
            "expected {} bytes for {}x{}x{} {}, got {}",
            expected,
            preset.width,
            preset.height,
            preset.depth,
            preset.sample_type,
            bytes.len()
        )))
    };
    match decoded {
        Ok(()) => tracing::info!(
            "'{}' loaded '{}': {}x{}x{} {}",
            owner,
            preset.name,
            volume.width(),
            volume.height(),
            volume.depth(),
            preset.sample_type
        ),
        Err(e) => tracing::error!("'{}' cannot use bytes of '{}': {}", owner, preset.name, e),
    }
    volume
}

/// Replace the image on output 0 with `volume` and an empty kernel chain.
pub(super) fn publish_volume(volume: VolumeData, ctx: &mut ModuleContext) -> GraphResult<()> {
    let output = ctx.image_output_mut(0)?;
    output.volume = volume;
    output.chain = Default::default();
    Ok(())
}

/// Loader of preset volumes.
pub struct DataLoaderModule {
    name: String,
    presets: Vec<VolumePreset>,
    selected: usize,
    source: Option<Box<dyn ByteSource>>,
    loads: LoadTracker,
}

impl DataLoaderModule {
    pub fn new(presets: Vec<VolumePreset>) -> Self {
        Self {
            name: "Example Data Loader".to_string(),
            presets,
            selected: 0,
            source: None,
            loads: LoadTracker::default(),
        }
    }

    pub fn with_source(mut self, source: Box<dyn ByteSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Preset selected when the module starts.
    pub fn with_selection(mut self, index: usize) -> Self {
        self.selected = index;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[PortArity] {
        NO_PORTS
    }

    pub fn outputs(&self) -> &[PortArity] {
        LOADER_OUTPUTS
    }

    pub fn presets(&self) -> &[VolumePreset] {
        &self.presets
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    /// Current load generation; increases with every selection.
    pub fn generation(&self) -> u64 {
        self.loads.generation()
    }

    /// Loads started but not yet received. Never more than one.
    pub fn pending_loads(&self) -> usize {
        usize::from(self.loads.is_pending())
    }

    pub fn on_init(&mut self, _ctx: &mut ModuleContext) -> GraphResult<bool> {
        self.start_load(self.selected)?;
        Ok(false)
    }

    pub fn on_input_changed(&mut self, kind: PortKind, _ctx: &mut ModuleContext) -> GraphResult<bool> {
        Err(GraphError::InvariantViolation(format!(
            "'{}' has no {} inputs",
            self.name, kind
        )))
    }

    /// Select a preset by index (`Int`) or by name (`String`) and start loading it.
    pub fn on_parameter_submitted(
        &mut self,
        value: &ScalarValue,
        _ctx: &mut ModuleContext,
    ) -> GraphResult<bool> {
        let index = match value {
            ScalarValue::Int(i) => usize::try_from(*i).ok(),
            ScalarValue::String(name) => self.presets.iter().position(|p| &p.name == name),
            _ => None,
        };
        let index = index
            .filter(|&i| i < self.presets.len())
            .ok_or_else(|| GraphError::InvalidParameter {
                module: self.name.clone(),
                message: format!("no preset matches {:?}", value),
            })?;

        self.selected = index;
        self.start_load(index)?;
        Ok(false)
    }

    pub fn poll_pending(&mut self, ctx: &mut ModuleContext) -> GraphResult<bool> {
        let Some(bytes) = self.loads.poll() else {
            return Ok(false);
        };
        let preset = self.presets.get(self.selected).ok_or_else(|| {
            GraphError::InvariantViolation(format!("pending load for unknown preset {}", self.selected))
        })?;
        publish_volume(volume_from_bytes(&self.name, preset, bytes), ctx)?;
        Ok(true)
    }

    pub fn release_child_resources(&mut self) {
        self.loads.clear();
        self.source = None;
    }

    fn start_load(&mut self, index: usize) -> GraphResult<()> {
        let source = self
            .source
            .as_deref()
            .ok_or(GraphError::MissingCollaborator("byte source"))?;
        let preset = self.presets.get(index).ok_or_else(|| GraphError::InvalidParameter {
            module: self.name.clone(),
            message: format!("preset index {} out of range", index),
        })?;
        self.loads.start(&self.name, source, preset);
        Ok(())
    }
}

/// View raw bytes as samples of `sample_type`. 16-bit samples are
/// little-endian.
pub fn decode_samples(bytes: &[u8], sample_type: SampleType) -> GraphResult<Samples> {
    match sample_type {
        SampleType::Uint8 => Ok(Samples::U8(bytes.to_vec())),
        SampleType::Uint16 => {
            if bytes.len() % 2 != 0 {
                return Err(GraphError::Decode(format!(
                    "{} bytes cannot hold 16-bit samples",
                    bytes.len()
                )));
            }
            let mut values: Vec<u16> = bytemuck::pod_collect_to_vec(bytes);
            values.iter_mut().for_each(|v| *v = u16::from_le(*v));
            Ok(Samples::U16(values))
        }
    }
}
