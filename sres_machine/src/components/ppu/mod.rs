//! Display processor.
//!
//! Renders one scanline per "instruction" from work RAM, a few dots per slice. The frame event
//! is raised right after the last visible line. The synchronization point is at the start of
//! every line, and the CPU is synchronized at the end of every line the display processor is
//! ahead on.

use crate::common::clock::CPU_FREQUENCY;
use crate::common::entropy::Random;
use crate::common::image::Image;
use crate::common::image::Rgb15;
use crate::common::serializer::Serializable;
use crate::common::serializer::Serializer;
use crate::scheduler::Chip;
use crate::scheduler::Context;
use crate::scheduler::Event;

/// Master clock units per dot.
pub const DOT_UNITS: u32 = 4;
pub const DOTS_PER_LINE: u16 = 341;
pub const LINES_PER_FRAME: u16 = 262;
pub const VISIBLE_LINES: u16 = 224;
pub const WIDTH: u32 = 256;
pub const HEIGHT: u32 = VISIBLE_LINES as u32;

/// Dots rendered per slice.
const DOTS_PER_SLICE: u16 = 8;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
enum Continuation {
    /// At the start of `line`, in front of the synchronization point.
    #[default]
    Idle,
    Line {
        dot: u16,
    },
    /// The last visible line completed and the frame event is pending.
    Frame,
    EndOfLine,
}

impl Continuation {
    fn serialize(&mut self, s: &mut Serializer) {
        let (mut tag, mut dot) = match *self {
            Continuation::Idle => (0_u8, 0_u16),
            Continuation::Line { dot } => (1, dot),
            Continuation::Frame => (2, 0),
            Continuation::EndOfLine => (3, 0),
        };
        s.integer(&mut tag);
        s.integer(&mut dot);
        *self = match tag {
            0 => Continuation::Idle,
            1 if dot < DOTS_PER_LINE => Continuation::Line { dot },
            2 => Continuation::Frame,
            3 => Continuation::EndOfLine,
            _ => {
                s.reject("ppu continuation");
                Continuation::Idle
            }
        };
    }
}

pub struct Ppu {
    line: u16,
    frame: u64,
    framebuffer: Framebuffer,
    continuation: Continuation,
}

impl Ppu {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            line: 0,
            frame: 0,
            framebuffer: Framebuffer::default(),
            continuation: Continuation::Idle,
        }
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    pub fn debug(&self) -> PpuDebug<'_> {
        PpuDebug(self)
    }

    fn render(&mut self, cx: &Context, first_dot: u16, count: u16) {
        if self.line >= VISIBLE_LINES {
            return;
        }
        let y = self.line as u32;
        for x in (first_dot as u32..(first_dot + count) as u32).filter(|x| *x < WIDTH) {
            let byte = cx.bus.read_wram((self.line << 5) | (x as u16 >> 3)) as u16;
            let shade = if byte & (1 << (x & 7)) != 0 { 0x1F } else { 0x08 };
            self.framebuffer[(x, y)] = Rgb15(((byte << 5) ^ shade) & 0x7FFF);
        }
    }
}

impl Chip for Ppu {
    fn frequency(&self) -> u32 {
        CPU_FREQUENCY
    }

    fn power(&mut self, _random: &mut Random) {
        self.line = 0;
        self.frame = 0;
        self.framebuffer = Framebuffer::default();
        self.continuation = Continuation::Idle;
    }

    fn main(&mut self, cx: &mut Context) {
        match self.continuation {
            Continuation::Idle => {
                if cx.synchronize_point() {
                    self.continuation = Continuation::Line { dot: 0 };
                }
            }
            Continuation::Line { dot } => {
                let count = DOTS_PER_SLICE.min(DOTS_PER_LINE - dot);
                self.render(cx, dot, count);
                cx.step(count as u32 * DOT_UNITS);
                self.continuation = if dot + count < DOTS_PER_LINE {
                    Continuation::Line { dot: dot + count }
                } else {
                    self.line += 1;
                    if self.line == VISIBLE_LINES {
                        Continuation::Frame
                    } else {
                        Continuation::EndOfLine
                    }
                };
            }
            Continuation::Frame => {
                self.frame = self.frame.wrapping_add(1);
                self.continuation = Continuation::EndOfLine;
                cx.leave(Event::Frame);
            }
            Continuation::EndOfLine => {
                if self.line >= LINES_PER_FRAME {
                    self.line = 0;
                }
                self.continuation = Continuation::Idle;
                cx.synchronize_cpu();
            }
        }
    }

    fn serialize(&mut self, s: &mut Serializer) {
        s.integer(&mut self.line);
        s.integer(&mut self.frame);
        s.object(&mut self.framebuffer);
        if self.line > LINES_PER_FRAME {
            s.reject("ppu line");
            self.line = 0;
        }
    }

    fn serialize_stack(&mut self, s: &mut Serializer) {
        self.continuation.serialize(s);
    }

    fn at_boundary(&self) -> bool {
        self.continuation == Continuation::Idle
    }
}

pub struct PpuDebug<'a>(&'a Ppu);

impl PpuDebug<'_> {
    pub fn line(&self) -> u16 {
        self.0.line
    }

    /// Number of frames completed since power-on.
    pub fn frame(&self) -> u64 {
        self.0.frame
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Framebuffer(Vec<Rgb15>);

impl Framebuffer {
    fn iter(&self) -> impl Iterator<Item = (u32, u32, &Rgb15)> {
        self.0
            .iter()
            .enumerate()
            .map(|(idx, pixel)| (idx as u32 % WIDTH, idx as u32 / WIDTH, pixel))
    }

    pub fn to_rgba<ImageT: Image>(&self) -> ImageT {
        let mut image = ImageT::new(WIDTH, HEIGHT);
        for (x, y, pixel) in self.iter() {
            image.set_pixel((x, y), (*pixel).into());
        }
        image
    }
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self(vec![Rgb15(0); (WIDTH * HEIGHT) as usize])
    }
}

impl std::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Framebuffer({}x{})", WIDTH, HEIGHT)
    }
}

impl std::ops::Index<(u32, u32)> for Framebuffer {
    type Output = Rgb15;

    fn index(&self, index: (u32, u32)) -> &Self::Output {
        &self.0[index.0 as usize + index.1 as usize * WIDTH as usize]
    }
}

impl std::ops::IndexMut<(u32, u32)> for Framebuffer {
    fn index_mut(&mut self, index: (u32, u32)) -> &mut Self::Output {
        &mut self.0[index.0 as usize + index.1 as usize * WIDTH as usize]
    }
}

impl Serializable for Framebuffer {
    fn serialize(&mut self, s: &mut Serializer) {
        s.array(&mut self.0);
    }
}
