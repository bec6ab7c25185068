//! Built-in volume presets
//!
//! A preset names a raw sample file and the metadata needed to interpret it:
//! the raw files carry no header, so sample width, grid shape and voxel
//! spacing come from here.

use crate::graph::{SampleType, VolumeData, VoxelSize};
use serde::{Deserialize, Serialize};

/// Description of one raw volume dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumePreset {
    /// Display name, also used as the lookup key by in-memory byte sources
    pub name: String,

    /// Raw file name, resolved against `DataSettings::data_dir`
    pub file: String,

    /// Encoding of each sample in the file
    pub sample_type: SampleType,

    /// Acquisition modality (`ct`, `mrt`, ...)
    pub modality: String,

    pub width: usize,
    pub height: usize,
    pub depth: usize,

    #[serde(default)]
    pub voxel_size: VoxelSize,
}

impl VolumePreset {
    /// Metadata-only volume for this preset; samples are absent until loaded.
    pub fn to_volume(&self) -> VolumeData {
        VolumeData::new(
            self.sample_type,
            self.modality.clone(),
            self.width,
            self.height,
            self.depth,
            self.voxel_size,
        )
    }

    /// Number of bytes a complete raw file for this preset holds.
    pub fn expected_bytes(&self) -> usize {
        self.width * self.height * self.depth * self.sample_type.byte_width()
    }
}

/// The three example datasets shipped with the workbench.
pub fn builtin_presets() -> Vec<VolumePreset> {
    vec![
        VolumePreset {
            name: "Cardiac CT".to_string(),
            file: "cardiac_0.raw".to_string(),
            sample_type: SampleType::Uint16,
            modality: "ct".to_string(),
            width: 512,
            height: 512,
            depth: 337,
            voxel_size: VoxelSize::new(0.390625, 0.390625, 0.4),
        },
        VolumePreset {
            name: "Head MRT".to_string(),
            file: "mrt.raw".to_string(),
            sample_type: SampleType::Uint16,
            modality: "mrt".to_string(),
            width: 512,
            height: 512,
            depth: 144,
            voxel_size: VoxelSize::new(0.5, 0.5, 1.0),
        },
        VolumePreset {
            name: "Foot CT".to_string(),
            file: "foot_256x256x256_uint8.raw".to_string(),
            sample_type: SampleType::Uint8,
            modality: "ct".to_string(),
            width: 256,
            height: 256,
            depth: 256,
            voxel_size: VoxelSize::new(1.0, 1.0, 1.0),
        },
    ]
}
