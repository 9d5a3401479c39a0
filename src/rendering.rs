//! What the presenter needs to draw a frame: a camera and its uniform record.

pub mod camera;

pub use camera::{Camera, RenderParams};
