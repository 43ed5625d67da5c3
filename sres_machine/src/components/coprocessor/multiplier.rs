use log::debug;

use crate::common::entropy::Random;
use crate::common::serializer::Serializer;
use crate::scheduler::Chip;
use crate::scheduler::Context;

pub const FREQUENCY: u32 = 10_738_636;

/// Cycles between a command and its result.
pub const LATENCY: u8 = 8;

/// Cycles spent per slice while no command is pending.
const IDLE_CYCLES: u32 = 8;

/// Set in output port 3 while a command executes.
pub const STATUS_BUSY: u8 = 0x80;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
enum Continuation {
    #[default]
    Idle,
    /// Idle cycles spent, the CPU is synchronized next.
    Waited,
    Busy {
        remaining: u8,
    },
    Complete,
}

/// Multiply/divide unit.
///
/// Command 0 multiplies port 1 by port 2 into output ports 0-1. Command 1 divides ports 1-2 by
/// port 3 into a quotient in output ports 0-1 and a remainder in output port 2.
pub struct Multiplier {
    index: u8,
    operands: [u8; 4],
    operations: u32,
    continuation: Continuation,
}

impl Multiplier {
    pub fn new(index: u8) -> Self {
        Self {
            index,
            operands: [0; 4],
            operations: 0,
            continuation: Continuation::Idle,
        }
    }

    fn compute(&self) -> [u8; 4] {
        let [command, a, b, c] = self.operands;
        if command & 1 == 0 {
            let [low, high] = (a as u16 * b as u16).to_le_bytes();
            [low, high, 0, 0]
        } else {
            let dividend = u16::from_le_bytes([a, b]);
            let (quotient, remainder) = match c {
                0 => (0xFFFF, dividend as u8),
                divisor => (dividend / divisor as u16, (dividend % divisor as u16) as u8),
            };
            let [low, high] = quotient.to_le_bytes();
            [low, high, remainder, 0]
        }
    }
}

impl Chip for Multiplier {
    fn frequency(&self) -> u32 {
        FREQUENCY
    }

    fn power(&mut self, _random: &mut Random) {
        self.operands = [0; 4];
        self.operations = 0;
        self.continuation = Continuation::Idle;
    }

    fn main(&mut self, cx: &mut Context) {
        let index = self.index as usize;
        match self.continuation {
            Continuation::Idle => {
                if !cx.synchronize_point() {
                    return;
                }
                let command = cx.bus.coprocessor_latch(index).and_then(|latch| {
                    latch.take_strobe().then(|| {
                        latch.output[3] = STATUS_BUSY;
                        latch.input
                    })
                });
                match command {
                    Some(operands) => {
                        debug!("cop{} command {:02X?}", index, operands);
                        self.operands = operands;
                        self.continuation = Continuation::Busy { remaining: LATENCY };
                    }
                    None => {
                        cx.step(IDLE_CYCLES);
                        self.continuation = Continuation::Waited;
                    }
                }
            }
            Continuation::Waited => {
                self.continuation = Continuation::Idle;
                cx.synchronize_cpu();
            }
            Continuation::Busy { remaining } => {
                cx.step(1);
                self.continuation = if remaining > 1 {
                    Continuation::Busy {
                        remaining: remaining - 1,
                    }
                } else {
                    Continuation::Complete
                };
            }
            Continuation::Complete => {
                let result = self.compute();
                if let Some(latch) = cx.bus.coprocessor_latch(index) {
                    latch.output = result;
                }
                self.operations = self.operations.wrapping_add(1);
                self.continuation = Continuation::Idle;
                cx.synchronize_cpu();
            }
        }
    }

    fn serialize(&mut self, s: &mut Serializer) {
        s.bytes(&mut self.operands);
        s.integer(&mut self.operations);
    }

    fn serialize_stack(&mut self, s: &mut Serializer) {
        let (mut tag, mut remaining) = match self.continuation {
            Continuation::Idle => (0_u8, 0_u8),
            Continuation::Waited => (1, 0),
            Continuation::Busy { remaining } => (2, remaining),
            Continuation::Complete => (3, 0),
        };
        s.integer(&mut tag);
        s.integer(&mut remaining);
        self.continuation = match tag {
            0 => Continuation::Idle,
            1 => Continuation::Waited,
            2 => Continuation::Busy { remaining },
            3 => Continuation::Complete,
            _ => {
                s.reject("multiplier continuation");
                Continuation::Idle
            }
        };
    }

    fn at_boundary(&self) -> bool {
        self.continuation == Continuation::Idle
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::common::clock::CPU_FREQUENCY;
    use crate::scheduler::test_util::TestMachine;
    use crate::scheduler::test_util::Ticker;
    use crate::scheduler::Event;
    use crate::scheduler::ThreadId;

    const COP: ThreadId = ThreadId::Coprocessor(0);

    fn machine() -> TestMachine {
        TestMachine::new(vec![
            Box::new(Ticker::new(CPU_FREQUENCY, 1364 * 10).with_frames(1)),
            Box::new(Ticker::new(CPU_FREQUENCY, 4)),
            Box::new(Ticker::new(CPU_FREQUENCY, 4)),
            Box::new(Multiplier::new(0)),
        ])
    }

    fn command(machine: &mut TestMachine, operands: [u8; 4]) -> [u8; 4] {
        let latch = &mut machine.chips.bus.coprocessors[0];
        latch.input = operands;
        latch.strobe = true;
        machine.synchronize(COP);
        assert!(!machine.chips.bus.coprocessors[0].strobe);
        machine.chips.bus.coprocessors[0].output
    }

    #[test]
    fn test_multiply() {
        let mut machine = machine();
        assert_eq!(command(&mut machine, [0, 200, 100, 0]), [0x20, 0x4E, 0, 0]);
    }

    #[test]
    fn test_divide() {
        let mut machine = machine();
        assert_eq!(command(&mut machine, [1, 0x39, 0x30, 10]), [0xD2, 0x04, 5, 0]);
        assert_eq!(command(&mut machine, [1, 0x39, 0x30, 0]), [0xFF, 0xFF, 0x39, 0]);
    }

    #[test]
    fn test_result_after_latency() {
        let mut multiplier = Multiplier::new(0);
        multiplier.operands = [0, 3, 4, 0];
        assert_eq!(multiplier.compute(), [12, 0, 0, 0]);

        // Level with the CPU, the result is ready after exactly the latency.
        let mut machine = machine();
        machine.chips.bus.coprocessors[0].input = [0, 3, 4, 0];
        machine.chips.bus.coprocessors[0].strobe = true;
        machine.synchronize(COP);
        assert_eq!(
            machine.scheduler.clock(COP).value,
            LATENCY as i64 * CPU_FREQUENCY as i64
        );
        assert_eq!(machine.chips.bus.coprocessors[0].output, [12, 0, 0, 0]);
    }

    #[test]
    fn test_catches_up_before_parking() {
        // The CPU runs ten scanlines ahead while the multiplier has nothing to do.
        let mut machine = machine();
        assert_eq!(machine.run(), Event::Frame);
        assert!(machine.scheduler.clock(COP).value < 0);

        machine.chips.bus.coprocessors[0].input = [0, 6, 7, 0];
        machine.chips.bus.coprocessors[0].strobe = true;
        machine.synchronize(COP);
        let clock = machine.scheduler.clock(COP).value;
        assert!(clock >= 0);
        assert!(clock < IDLE_CYCLES as i64 * CPU_FREQUENCY as i64);
        assert_eq!(machine.chips.bus.coprocessors[0].output, [42, 0, 0, 0]);
        assert!(machine.chip(COP).at_boundary());
    }
}
