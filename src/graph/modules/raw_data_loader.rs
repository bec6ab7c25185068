//! RawDataLoaderModule: source of a user-chosen raw volume file.
//!
//! Raw files carry no header. The module is built with declared metadata
//! (sample type, modality, grid shape, voxel size) and publishes it right
//! away with samples absent. Submitting a file path starts a load through
//! the [`ByteSource`]; relative paths resolve against the source's base
//! directory.

use super::data_loader::{publish_volume, volume_from_bytes, LoadTracker, LOADER_OUTPUTS};
use crate::collab::ByteSource;
use crate::config::VolumePreset;
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::module::ModuleContext;
use crate::graph::payload::ScalarValue;
use crate::graph::port::{PortArity, PortKind, NO_PORTS};
use std::path::{Path, PathBuf};

/// Loader of one raw file interpreted with declared metadata.
pub struct RawDataLoaderModule {
    name: String,
    metadata: VolumePreset,
    file: Option<PathBuf>,
    source: Option<Box<dyn ByteSource>>,
    loads: LoadTracker,
}

impl RawDataLoaderModule {
    pub fn new(metadata: VolumePreset) -> Self {
        Self {
            name: "Raw Data Loader".to_string(),
            metadata,
            file: None,
            source: None,
            loads: LoadTracker::default(),
        }
    }

    pub fn with_source(mut self, source: Box<dyn ByteSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// File loaded as soon as the module starts.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
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
        NO_PORTS
    }

    pub fn outputs(&self) -> &[PortArity] {
        LOADER_OUTPUTS
    }

    pub fn metadata(&self) -> &VolumePreset {
        &self.metadata
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.loads.generation()
    }

    pub fn pending_loads(&self) -> usize {
        usize::from(self.loads.is_pending())
    }

    pub fn on_init(&mut self, ctx: &mut ModuleContext) -> GraphResult<bool> {
        if self.source.is_none() {
            return Err(GraphError::MissingCollaborator("byte source"));
        }
        match self.file.clone() {
            Some(path) => {
                self.start_load(&path)?;
                Ok(false)
            }
            None => {
                publish_volume(self.metadata.to_volume(), ctx)?;
                Ok(true)
            }
        }
    }

    pub fn on_input_changed(&mut self, kind: PortKind, _ctx: &mut ModuleContext) -> GraphResult<bool> {
        Err(GraphError::InvariantViolation(format!(
            "'{}' has no {} inputs",
            self.name, kind
        )))
    }

    /// A `String` names the raw file to load.
    pub fn on_parameter_submitted(
        &mut self,
        value: &ScalarValue,
        _ctx: &mut ModuleContext,
    ) -> GraphResult<bool> {
        let path = match value.as_str() {
            Some(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => {
                return Err(GraphError::InvalidParameter {
                    module: self.name.clone(),
                    message: format!("expected a file path, got {:?}", value),
                })
            }
        };
        self.start_load(&path)?;
        self.file = Some(path);
        Ok(false)
    }

    pub fn poll_pending(&mut self, ctx: &mut ModuleContext) -> GraphResult<bool> {
        let Some(bytes) = self.loads.poll() else {
            return Ok(false);
        };
        publish_volume(volume_from_bytes(&self.name, &self.metadata, bytes), ctx)?;
        Ok(true)
    }

    pub fn release_child_resources(&mut self) {
        self.loads.clear();
        self.source = None;
    }

    fn start_load(&mut self, path: &Path) -> GraphResult<()> {
        let source = self
            .source
            .as_deref()
            .ok_or(GraphError::MissingCollaborator("byte source"))?;
        let request = VolumePreset {
            file: path.to_string_lossy().into_owned(),
            ..self.metadata.clone()
        };
        self.loads.start(&self.name, source, &request);
        Ok(())
    }
}
