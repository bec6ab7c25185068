//! Tests for the shared test builders
//!
//! Kept in their own binary so they run once instead of once per file that
//! declares `mod common`.

mod common;

use common::builders::{test_preset, VolumeBuilder};
use voxgraph::graph::SampleType;

#[test]
fn test_volume_builder() {
    let volume = VolumeBuilder::new(3, 2, 2).u8_fn(|x, y, z| (x + 10 * y + 100 * z) as u8).build();
    assert_eq!(volume.voxel_count(), 12);
    let samples = volume.samples().unwrap();
    assert_eq!(samples.get(0), Some(0));
    assert_eq!(samples.get(4), Some(11));
    assert_eq!(samples.get(11), Some(112));
}

#[test]
fn test_volume_builder_without_samples() {
    let volume = VolumeBuilder::new(4, 4, 1).modality("mrt").voxel_size(0.5, 0.5, 1.0).build();
    assert!(!volume.has_samples());
    assert_eq!(volume.modality(), "mrt");
    assert_eq!(volume.voxel_size().x, 0.5);
}

#[test]
fn test_preset_bytes_match_grid() {
    let preset = test_preset("Small Head", SampleType::Uint16, 3, 2, 2);
    assert_eq!(preset.file, "small_head.raw");
    assert_eq!(preset.expected_bytes(), 3 * 2 * 2 * 2);
}
