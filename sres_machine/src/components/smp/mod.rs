//! Audio processor.
//!
//! Runs its own program out of a private 4 KiB RAM, mixes into an accumulator and emits one
//! sample every [SAMPLE_UNITS] oscillator cycles. The CPU is synchronized before every access
//! to the shared ports, and forcibly whenever the audio processor runs more than a millisecond
//! ahead.

use crate::common::clock::SMP_FREQUENCY;
use crate::common::entropy::Random;
use crate::common::serializer::Serializer;
use crate::scheduler::Chip;
use crate::scheduler::Context;

/// Oscillator cycles per instruction cycle.
pub const CYCLE_UNITS: u32 = 24;

/// Oscillator cycles per output sample (32 kHz).
pub const SAMPLE_UNITS: u32 = 768;

/// Rate of the samples handed to the host.
pub const SAMPLE_RATE: u32 = SMP_FREQUENCY / SAMPLE_UNITS;

/// Oscillator cycles the audio processor may run ahead before the CPU is forced to catch up.
pub const SYNC_THRESHOLD_UNITS: u32 = SMP_FREQUENCY / 1000;

pub const RAM_SIZE: usize = 0x1000;
const RAM_MASK: u16 = (RAM_SIZE - 1) as u16;

/// Samples buffered between two frames. A frame at 60 Hz produces about 533.
pub const SAMPLE_CAPACITY: usize = 2048;

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::FromRepr)]
#[repr(u8)]
enum Opcode {
    Mix = 0,
    PortRead = 1,
    PortWrite = 2,
    Store = 3,
}

impl Opcode {
    fn cycles(self) -> u8 {
        match self {
            Opcode::Mix | Opcode::Store => 2,
            Opcode::PortRead | Opcode::PortWrite => 3,
        }
    }

    fn accesses_ports(self) -> bool {
        matches!(self, Opcode::PortRead | Opcode::PortWrite)
    }
}

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
enum Continuation {
    #[default]
    Idle,
    Execute {
        opcode: Opcode,
        operand: u8,
        cycles: u8,
    },
    Access {
        opcode: Opcode,
        operand: u8,
        synchronized: bool,
    },
}

impl Continuation {
    fn serialize(&mut self, s: &mut Serializer) {
        let (mut tag, mut opcode, mut operand, mut extra) = match *self {
            Continuation::Idle => (0_u8, 0_u8, 0_u8, 0_u8),
            Continuation::Execute {
                opcode,
                operand,
                cycles,
            } => (1, opcode as u8, operand, cycles),
            Continuation::Access {
                opcode,
                operand,
                synchronized,
            } => (2, opcode as u8, operand, synchronized as u8),
        };
        s.integer(&mut tag);
        s.integer(&mut opcode);
        s.integer(&mut operand);
        s.integer(&mut extra);
        *self = match (tag, Opcode::from_repr(opcode)) {
            (0, _) => Continuation::Idle,
            (1, Some(opcode)) => Continuation::Execute {
                opcode,
                operand,
                cycles: extra,
            },
            (2, Some(opcode)) => Continuation::Access {
                opcode,
                operand,
                synchronized: extra != 0,
            },
            _ => {
                s.reject("smp continuation");
                Continuation::Idle
            }
        };
    }
}

pub struct Smp {
    ram: Box<[u8; RAM_SIZE]>,
    a: u8,
    pc: u16,
    mix: i32,
    /// Oscillator cycles since the last sample.
    sample_units: u32,
    samples: Box<[i16; SAMPLE_CAPACITY]>,
    sample_count: u16,
    continuation: Continuation,
}

impl Smp {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            ram: Box::new([0; RAM_SIZE]),
            a: 0,
            pc: 0,
            mix: 0,
            sample_units: 0,
            samples: Box::new([0; SAMPLE_CAPACITY]),
            sample_count: 0,
            continuation: Continuation::Idle,
        }
    }

    pub fn debug(&self) -> SmpDebug<'_> {
        SmpDebug(self)
    }

    /// Samples produced since the last call to [Smp::clear_samples].
    pub fn samples(&self) -> &[i16] {
        &self.samples[..self.sample_count as usize]
    }

    pub fn clear_samples(&mut self) {
        self.sample_count = 0;
    }

    fn emit_sample(&mut self) {
        let sample = self.mix.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        // Samples that do not fit are dropped until the host drains the buffer.
        if (self.sample_count as usize) < SAMPLE_CAPACITY {
            self.samples[self.sample_count as usize] = sample;
            self.sample_count += 1;
        }
    }

    fn fetch(&mut self) {
        let opcode = Opcode::from_repr(self.ram[self.pc as usize] & 0x03).unwrap_or(Opcode::Mix);
        let operand = self.ram[(self.pc.wrapping_add(1) & RAM_MASK) as usize];
        self.pc = self.pc.wrapping_add(2) & RAM_MASK;
        self.continuation = Continuation::Execute {
            opcode,
            operand,
            cycles: opcode.cycles(),
        };
    }

    fn execute(&mut self, cx: &mut Context, opcode: Opcode, operand: u8) {
        let port = operand as usize % 4;
        match opcode {
            Opcode::Mix => {
                let address = (((operand as u16) << 4) | (self.a & 0x0F) as u16) & RAM_MASK;
                let input = self.ram[address as usize] as i8 as i32;
                self.mix = self.mix - (self.mix >> 3) + input * 32;
            }
            Opcode::PortRead => self.a = cx.bus.apu.input[port],
            Opcode::PortWrite => cx.bus.apu.output[port] = self.a ^ (self.mix >> 8) as u8,
            Opcode::Store => {
                let address = (0x800 | ((operand as u16) << 3) | (self.a & 0x07) as u16) & RAM_MASK;
                self.ram[address as usize] = self.a.wrapping_add(self.mix as u8);
            }
        }
    }
}

impl Chip for Smp {
    fn frequency(&self) -> u32 {
        SMP_FREQUENCY
    }

    fn power(&mut self, random: &mut Random) {
        random.fill(self.ram.as_mut_slice());
        self.a = 0;
        self.pc = 0;
        self.mix = 0;
        self.sample_units = 0;
        self.samples.fill(0);
        self.sample_count = 0;
        self.continuation = Continuation::Idle;
    }

    fn main(&mut self, cx: &mut Context) {
        match self.continuation {
            Continuation::Idle => {
                if cx.synchronize_point() {
                    self.fetch();
                }
            }
            Continuation::Execute {
                opcode,
                operand,
                cycles,
            } => {
                cx.step(CYCLE_UNITS);
                self.sample_units += CYCLE_UNITS;
                if self.sample_units >= SAMPLE_UNITS {
                    self.sample_units -= SAMPLE_UNITS;
                    self.emit_sample();
                }
                self.continuation = if cycles > 1 {
                    Continuation::Execute {
                        opcode,
                        operand,
                        cycles: cycles - 1,
                    }
                } else {
                    Continuation::Access {
                        opcode,
                        operand,
                        synchronized: false,
                    }
                };
            }
            Continuation::Access {
                opcode,
                operand,
                synchronized,
            } => {
                if !synchronized && opcode.accesses_ports() {
                    self.continuation = Continuation::Access {
                        opcode,
                        operand,
                        synchronized: true,
                    };
                    if cx.synchronize_cpu() {
                        return;
                    }
                }
                self.execute(cx, opcode, operand);
                self.continuation = Continuation::Idle;
                cx.synchronize_ahead(SYNC_THRESHOLD_UNITS);
            }
        }
    }

    fn serialize(&mut self, s: &mut Serializer) {
        s.bytes(self.ram.as_mut_slice());
        s.integer(&mut self.a);
        s.integer(&mut self.pc);
        s.integer(&mut self.mix);
        s.integer(&mut self.sample_units);
        s.array(self.samples.as_mut_slice());
        s.integer(&mut self.sample_count);
        if self.sample_count as usize > SAMPLE_CAPACITY {
            s.reject("smp sample count");
            self.sample_count = 0;
        }
        if self.sample_units >= SAMPLE_UNITS {
            s.reject("smp sample units");
            self.sample_units = 0;
        }
        self.pc &= RAM_MASK;
    }

    fn serialize_stack(&mut self, s: &mut Serializer) {
        self.continuation.serialize(s);
    }

    fn at_boundary(&self) -> bool {
        self.continuation == Continuation::Idle
    }
}

pub struct SmpDebug<'a>(&'a Smp);

impl SmpDebug<'_> {
    pub fn ram(&self) -> &[u8] {
        self.0.ram.as_slice()
    }

    pub fn a(&self) -> u8 {
        self.0.a
    }

    pub fn pc(&self) -> u16 {
        self.0.pc
    }

    pub fn mix(&self) -> i32 {
        self.0.mix
    }
}
