//! Built-in module specializations.

pub mod data_loader;
pub mod geometry;
pub mod pixel_filter;
pub mod raw_data_loader;
pub mod renderer;
pub mod shader_filter;

pub use data_loader::{decode_samples, DataLoaderModule};
pub use geometry::{GeometryKind, GeometryModule};
pub use pixel_filter::PixelFilterModule;
pub use raw_data_loader::RawDataLoaderModule;
pub use renderer::{prepare_texture, voxel_size_z, RenderMode, RendererModule, WindowLevel};
pub use shader_filter::ShaderFilterModule;
