//! Main processor.
//!
//! The CPU is the reference clock domain. It executes a pseudo-program driven by work RAM and a
//! linear feedback shift register, talking to the audio processor and the coprocessors through
//! their latched ports. It synchronizes a chip right before touching that chip's ports, and
//! forces every dependent to catch up once per scanline worth of master cycles.

use std::fmt::Display;

use crate::common::clock::CPU_FREQUENCY;
use crate::common::entropy::Random;
use crate::common::serializer::Serializer;
use crate::scheduler::Chip;
use crate::scheduler::Context;
use crate::scheduler::ThreadId;

/// Master clock units per CPU cycle.
pub const CYCLE_UNITS: u32 = 8;

/// Master clock units between forced synchronizations of all dependents.
pub const CATCHUP_UNITS: u32 = 1364;

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::FromRepr)]
#[repr(u8)]
pub enum Opcode {
    Add = 0,
    Store = 1,
    ApuWrite = 2,
    ApuRead = 3,
    CopWrite = 4,
    CopRead = 5,
    Shift = 6,
    Wait = 7,
}

impl Opcode {
    fn decode(byte: u8) -> Self {
        // All 8 values of the low 3 bits are valid opcodes.
        Self::from_repr(byte & 0x07).unwrap_or(Opcode::Wait)
    }

    fn cycles(self, operand: u8) -> u8 {
        match self {
            Opcode::Add | Opcode::Shift => 1,
            Opcode::Store => 3,
            Opcode::ApuWrite | Opcode::ApuRead | Opcode::CopWrite | Opcode::CopRead => 2,
            Opcode::Wait => (operand & 0x0F) + 1,
        }
    }
}

/// Progress through the current instruction.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
enum Continuation {
    /// At the synchronization point in front of the next instruction.
    #[default]
    Idle,
    /// Spending the instruction's cycles. `cycles` are remaining.
    Execute {
        opcode: Opcode,
        operand: u8,
        cycles: u8,
    },
    /// All cycles spent. `synchronized` is set once the accessed chip was given a chance to
    /// catch up.
    Access {
        opcode: Opcode,
        operand: u8,
        synchronized: bool,
    },
    /// Forcing dependents to catch up, starting with dependent number `next`.
    Catchup { next: u8 },
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
            Continuation::Catchup { next } => (3, 0, 0, next),
        };
        s.integer(&mut tag);
        s.integer(&mut opcode);
        s.integer(&mut operand);
        s.integer(&mut extra);
        let opcode = Opcode::from_repr(opcode);
        *self = match (tag, opcode) {
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
            (3, _) => Continuation::Catchup { next: extra },
            _ => {
                s.reject("cpu continuation");
                Continuation::Idle
            }
        };
    }
}

pub struct Cpu {
    a: u16,
    x: u16,
    pc: u16,
    lfsr: u16,
    /// Master clock units since the dependents were last forced to catch up.
    catchup_units: u32,
    instructions: u64,
    coprocessors: u8,
    continuation: Continuation,
}

impl Cpu {
    pub fn new(coprocessors: u8) -> Self {
        Self {
            a: 0,
            x: 0,
            pc: 0,
            lfsr: 1,
            catchup_units: 0,
            instructions: 0,
            coprocessors,
            continuation: Continuation::Idle,
        }
    }

    pub fn debug(&self) -> CpuDebug<'_> {
        CpuDebug(self)
    }

    /// Chips the CPU keeps in sync, in catch-up order.
    fn dependent(&self, index: u8) -> Option<ThreadId> {
        match index {
            0 => Some(ThreadId::Smp),
            1 => Some(ThreadId::Ppu),
            n if n - 2 < self.coprocessors => Some(ThreadId::Coprocessor(n - 2)),
            _ => None,
        }
    }

    fn next_lfsr(&mut self) -> u16 {
        let feedback = if self.lfsr & 1 != 0 { 0xB400 } else { 0 };
        self.lfsr = (self.lfsr >> 1) ^ feedback;
        self.lfsr
    }

    /// The chip whose ports `opcode` touches, if any.
    fn accessed_chip(&self, opcode: Opcode, operand: u8) -> Option<ThreadId> {
        match opcode {
            Opcode::ApuWrite | Opcode::ApuRead => Some(ThreadId::Smp),
            Opcode::CopWrite | Opcode::CopRead if self.coprocessors > 0 => {
                Some(ThreadId::Coprocessor((operand >> 2) % self.coprocessors))
            }
            _ => None,
        }
    }

    fn fetch(&mut self, cx: &mut Context) {
        let opcode = Opcode::decode(cx.bus.read_wram(self.pc) ^ self.next_lfsr() as u8);
        let operand = cx.bus.read_wram(self.pc.wrapping_add(1));
        self.pc = self.pc.wrapping_add(2);
        self.continuation = Continuation::Execute {
            opcode,
            operand,
            cycles: opcode.cycles(operand),
        };
    }

    fn execute(&mut self, cx: &mut Context, opcode: Opcode, operand: u8) {
        match opcode {
            Opcode::Add => self.a = self.a.wrapping_add(cx.bus.read_wram(self.x) as u16),
            Opcode::Store => {
                cx.bus.write_wram(self.x, self.a as u8);
                self.x = self.x.wrapping_add(1);
            }
            Opcode::ApuWrite => cx.bus.apu.write_input(operand as usize, self.a as u8),
            Opcode::ApuRead => {
                self.a = (self.a << 8) | cx.bus.apu.read_output(operand as usize) as u16
            }
            Opcode::CopWrite | Opcode::CopRead => {
                let index = (operand >> 2).checked_rem(self.coprocessors);
                if let Some(latch) = index.and_then(|i| cx.bus.coprocessor_latch(i as usize)) {
                    if opcode == Opcode::CopWrite {
                        latch.write_input(operand as usize, self.a as u8);
                    } else {
                        self.a ^= latch.read_output(operand as usize) as u16;
                    }
                }
            }
            Opcode::Shift => self.a = self.a.rotate_left(1) ^ self.lfsr,
            Opcode::Wait => {}
        }
        self.instructions = self.instructions.wrapping_add(1);
    }
}

impl Chip for Cpu {
    fn frequency(&self) -> u32 {
        CPU_FREQUENCY
    }

    fn power(&mut self, random: &mut Random) {
        self.a = random.next_u16();
        self.x = random.next_u16();
        self.pc = 0;
        self.lfsr = random.next_u16() | 1;
        self.catchup_units = 0;
        self.instructions = 0;
        self.continuation = Continuation::Idle;
    }

    fn main(&mut self, cx: &mut Context) {
        match self.continuation {
            Continuation::Idle => {
                if cx.synchronize_point() {
                    self.fetch(cx);
                }
            }
            Continuation::Execute {
                opcode,
                operand,
                cycles,
            } => {
                cx.step(CYCLE_UNITS);
                self.catchup_units += CYCLE_UNITS;
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
                if !synchronized {
                    if let Some(chip) = self.accessed_chip(opcode, operand) {
                        self.continuation = Continuation::Access {
                            opcode,
                            operand,
                            synchronized: true,
                        };
                        if cx.synchronize(chip) {
                            return;
                        }
                    }
                }
                self.execute(cx, opcode, operand);
                self.continuation = if self.catchup_units >= CATCHUP_UNITS {
                    self.catchup_units = 0;
                    Continuation::Catchup { next: 0 }
                } else {
                    Continuation::Idle
                };
            }
            Continuation::Catchup { mut next } => {
                while let Some(chip) = self.dependent(next) {
                    next += 1;
                    self.continuation = Continuation::Catchup { next };
                    if cx.synchronize(chip) {
                        return;
                    }
                }
                self.continuation = Continuation::Idle;
            }
        }
    }

    fn serialize(&mut self, s: &mut Serializer) {
        s.integer(&mut self.a);
        s.integer(&mut self.x);
        s.integer(&mut self.pc);
        s.integer(&mut self.lfsr);
        s.integer(&mut self.catchup_units);
        s.integer(&mut self.instructions);
        if self.catchup_units > 2 * CATCHUP_UNITS {
            s.reject("cpu catch-up units");
            self.catchup_units = 0;
        }
    }

    fn serialize_stack(&mut self, s: &mut Serializer) {
        self.continuation.serialize(s);
    }

    fn at_boundary(&self) -> bool {
        self.continuation == Continuation::Idle
    }
}

pub struct CpuDebug<'a>(&'a Cpu);

impl CpuDebug<'_> {
    pub fn state(&self) -> CpuState {
        CpuState {
            a: self.0.a,
            x: self.0.x,
            pc: self.0.pc,
            lfsr: self.0.lfsr,
            instructions: self.0.instructions,
        }
    }
}

/// Snapshot of the CPU registers for debugging purposes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CpuState {
    pub a: u16,
    pub x: u16,
    pub pc: u16,
    pub lfsr: u16,
    pub instructions: u64,
}

impl Display for CpuState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "A:{:04X} X:{:04X} PC:{:04X} R:{:04X} I:{}",
            self.a, self.x, self.pc, self.lfsr, self.instructions
        )
    }
}
