//! Mock collaborators and construction helpers

use crossbeam_channel::{bounded, Receiver, Sender};
use mockall::mock;
use voxgraph::collab::{ByteSource, DrawCall, LogSink, RenderSurface, VolumeTexture};
use voxgraph::config::VolumePreset;
use voxgraph::graph::GraphResult;

mock! {
    pub Source {}

    impl ByteSource for Source {
        fn load(&self, preset: &VolumePreset) -> Receiver<Option<Vec<u8>>>;
    }
}

mock! {
    pub Surface {}

    impl RenderSurface for Surface {
        fn upload_texture(&mut self, texture: &VolumeTexture) -> GraphResult<()>;
        fn draw(&mut self, call: &DrawCall) -> GraphResult<()>;
        fn clear(&mut self);
        fn release(&mut self);
    }
}

mock! {
    pub Sink {}

    impl LogSink for Sink {
        fn deliver(&mut self, content: &str, suggested_name: &str) -> GraphResult<()>;
    }
}

/// A load whose bytes the test delivers later through the sender
pub fn deferred_load() -> (Sender<Option<Vec<u8>>>, Receiver<Option<Vec<u8>>>) {
    bounded(1)
}

/// A load that has already completed with `bytes`
pub fn ready_load(bytes: Option<Vec<u8>>) -> Receiver<Option<Vec<u8>>> {
    let (tx, rx) = bounded(1);
    tx.send(bytes).unwrap();
    rx
}

/// Surface mock accepting any number of calls of every kind
pub fn permissive_surface() -> MockSurface {
    let mut surface = MockSurface::new();
    surface.expect_upload_texture().returning(|_| Ok(()));
    surface.expect_draw().returning(|_| Ok(()));
    surface.expect_clear().return_const(());
    surface.expect_release().return_const(());
    surface
}
