//! Module type enumeration and the factory that builds configured modules.

use crate::collab::{
    ByteSource, FileByteSource, FileLogSink, HeadlessSurface, LogSink, RenderSurface,
};
use crate::config::WorkbenchConfig;
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::module::{AnyModule, BuiltinModule};
use crate::graph::modules::{
    DataLoaderModule, GeometryKind, GeometryModule, PixelFilterModule, RawDataLoaderModule,
    RenderMode, RendererModule, ShaderFilterModule,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Types of modules the workbench can instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleType {
    // Sources
    ExampleDataLoader,
    RawDataLoader,
    GeometryCube,
    GeometryPlane,

    // Filters
    GaussSmoothingData,
    LaplaceFilterData,
    LaplaceFilterShader,

    // Sinks
    Renderer2d,
    Renderer3d,
}

impl ModuleType {
    pub fn display_name(&self) -> &'static str {
        match self {
            ModuleType::ExampleDataLoader => "Example Data Loader",
            ModuleType::RawDataLoader => "Raw Data Loader",
            ModuleType::GeometryCube => "Cube",
            ModuleType::GeometryPlane => "Plane",
            ModuleType::GaussSmoothingData => "Gauss Smoothing Data",
            ModuleType::LaplaceFilterData => "Laplace Filter Data",
            ModuleType::LaplaceFilterShader => "Laplace Filter Shader",
            ModuleType::Renderer2d => "Renderer 2D",
            ModuleType::Renderer3d => "Renderer 3D",
        }
    }

    pub fn all() -> &'static [ModuleType] {
        &[
            ModuleType::ExampleDataLoader,
            ModuleType::RawDataLoader,
            ModuleType::GeometryCube,
            ModuleType::GeometryPlane,
            ModuleType::GaussSmoothingData,
            ModuleType::LaplaceFilterData,
            ModuleType::LaplaceFilterShader,
            ModuleType::Renderer2d,
            ModuleType::Renderer3d,
        ]
    }

    pub fn is_filter(&self) -> bool {
        matches!(
            self,
            ModuleType::GaussSmoothingData
                | ModuleType::LaplaceFilterData
                | ModuleType::LaplaceFilterShader
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            ModuleType::ExampleDataLoader => "Loads one of the example volume presets.",
            ModuleType::RawDataLoader => {
                "Loads a raw file chosen by the user.\n\
                 Interprets it with the first preset's metadata."
            }
            ModuleType::GeometryCube => "Outputs a translucent 0.5 unit cube.",
            ModuleType::GeometryPlane => "Outputs a translucent unit plane.",
            ModuleType::GaussSmoothingData => {
                "Smooths every slice on the CPU.\n\
                 Accepts a new sigma as parameter."
            }
            ModuleType::LaplaceFilterData => {
                "Edge filter computed on the CPU.\n\
                 Shrinks each slice by one voxel per side."
            }
            ModuleType::LaplaceFilterShader => {
                "Edge filter evaluated by the renderer.\n\
                 Appends its kernel to the image's kernel chain."
            }
            ModuleType::Renderer2d => "Shows one slice at a time.",
            ModuleType::Renderer3d => "Ray-marches the volume in a rotating box.",
        }
    }
}

impl std::fmt::Display for ModuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

type Provider<T> = Box<dyn Fn() -> Box<T>>;

/// Builds modules with configured defaults and fresh collaborators.
///
/// Collaborators default to files under the configured directories and a
/// headless render surface; each can be replaced with a provider closure.
pub struct ModuleFactory {
    config: WorkbenchConfig,
    byte_source: Provider<dyn ByteSource>,
    surface: Provider<dyn RenderSurface>,
    log_sink: Provider<dyn LogSink>,
}

impl ModuleFactory {
    pub fn new(config: WorkbenchConfig) -> Self {
        let data_dir = config.data.data_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        let log_dir = config.filters.log_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        Self {
            config,
            byte_source: Box::new(move || Box::new(FileByteSource::new(data_dir.clone()))),
            surface: Box::new(|| Box::new(HeadlessSurface::new())),
            log_sink: Box::new(move || Box::new(FileLogSink::new(log_dir.clone()))),
        }
    }

    pub fn with_byte_source(mut self, provider: impl Fn() -> Box<dyn ByteSource> + 'static) -> Self {
        self.byte_source = Box::new(provider);
        self
    }

    pub fn with_surface(mut self, provider: impl Fn() -> Box<dyn RenderSurface> + 'static) -> Self {
        self.surface = Box::new(provider);
        self
    }

    pub fn with_log_sink(mut self, provider: impl Fn() -> Box<dyn LogSink> + 'static) -> Self {
        self.log_sink = Box::new(provider);
        self
    }

    pub fn config(&self) -> &WorkbenchConfig {
        &self.config
    }

    pub fn create(&self, module_type: ModuleType) -> GraphResult<AnyModule> {
        let module = match module_type {
            ModuleType::ExampleDataLoader => BuiltinModule::DataLoader(
                DataLoaderModule::new(self.config.data.presets.clone())
                    .with_source((self.byte_source)()),
            ),
            ModuleType::RawDataLoader => {
                let metadata = self.config.data.presets.first().cloned().ok_or_else(|| {
                    GraphError::InvalidParameter {
                        module: module_type.display_name().to_string(),
                        message: "no volume preset describes raw files".to_string(),
                    }
                })?;
                BuiltinModule::RawDataLoader(
                    RawDataLoaderModule::new(metadata).with_source((self.byte_source)()),
                )
            }
            ModuleType::GeometryCube => {
                BuiltinModule::Geometry(GeometryModule::new(GeometryKind::Cube))
            }
            ModuleType::GeometryPlane => {
                BuiltinModule::Geometry(GeometryModule::new(GeometryKind::Plane))
            }
            ModuleType::GaussSmoothingData => BuiltinModule::PixelFilter(
                self.timed(PixelFilterModule::gaussian(self.config.filters.default_sigma)?),
            ),
            ModuleType::LaplaceFilterData => {
                BuiltinModule::PixelFilter(self.timed(PixelFilterModule::laplace()))
            }
            ModuleType::LaplaceFilterShader => {
                BuiltinModule::ShaderFilter(ShaderFilterModule::laplace())
            }
            ModuleType::Renderer2d => BuiltinModule::Renderer(self.renderer(RenderMode::Slice2d)),
            ModuleType::Renderer3d => BuiltinModule::Renderer(self.renderer(RenderMode::Volume3d)),
        };
        tracing::debug!("Created module of type {}", module_type);
        Ok(AnyModule::Builtin(module))
    }

    fn timed(&self, filter: PixelFilterModule) -> PixelFilterModule {
        if self.config.filters.log_timings {
            filter.with_timing(self.config.filters.timing_runs, (self.log_sink)())
        } else {
            filter
        }
    }

    fn renderer(&self, mode: RenderMode) -> RendererModule {
        RendererModule::new(mode, self.config.renderer.clone())
            .with_surface((self.surface)())
            .with_log_sink((self.log_sink)())
    }
}
