use crate::components::ppu::Framebuffer;

/// Host side of a running machine. Called on every frame event, before control returns to the
/// simulation.
pub trait Platform {
    fn video_frame(&mut self, _framebuffer: &Framebuffer) {}

    /// Samples produced by the audio processor since the previous frame.
    fn audio_frame(&mut self, _samples: &[i16]) {}
}

/// Discards all output.
pub struct Headless;

impl Platform for Headless {}
