//! Pixel formats and an abstract image target for rendered frames.
use intbits::Bits;

use crate::common::serializer::Serializable;
use crate::common::serializer::Serializer;

/// Conversion factor from u5 to u8
const U5_TO_U8_CONVERSION: f32 = 8.225806;

/// RGB format produced by the display processor, 5 bits per channel
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb15(pub u16);

impl Serializable for Rgb15 {
    fn serialize(&mut self, s: &mut Serializer) {
        s.integer(&mut self.0);
    }
}

/// 32-bit RGBA format used on modern machines for interop with image-rs
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq)]
pub struct Rgba32(pub [u8; 4]);

impl From<Rgb15> for Rgba32 {
    fn from(value: Rgb15) -> Self {
        let r = (value.0.bits(0..=4) as f32 * U5_TO_U8_CONVERSION) as u8;
        let g = (value.0.bits(5..=9) as f32 * U5_TO_U8_CONVERSION) as u8;
        let b = (value.0.bits(10..=14) as f32 * U5_TO_U8_CONVERSION) as u8;
        Self([r, g, b, 255])
    }
}

/// Abstract interface for image::RgbaImage (used by sres_cli) or any other pixel sink.
pub trait Image {
    fn new(width: u32, height: u32) -> Self;
    fn set_pixel(&mut self, index: (u32, u32), value: Rgba32);
}
