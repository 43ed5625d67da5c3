use crate::common::entropy::Random;
use crate::common::serializer::Serializer;
use crate::scheduler::Chip;
use crate::scheduler::Context;

pub const FREQUENCY: u32 = 32_768;

/// Command that loads the seconds counter from input ports 1-3.
pub const COMMAND_SET: u8 = 0x01;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
enum Continuation {
    #[default]
    Idle,
    Ticked,
}

/// Real-time clock. Output ports 0-3 always hold the seconds counter.
pub struct Rtc {
    index: u8,
    ticks: u16,
    seconds: u32,
    continuation: Continuation,
}

impl Rtc {
    pub fn new(index: u8) -> Self {
        Self {
            index,
            ticks: 0,
            seconds: 0,
            continuation: Continuation::Idle,
        }
    }

    pub fn seconds(&self) -> u32 {
        self.seconds
    }
}

impl Chip for Rtc {
    fn frequency(&self) -> u32 {
        FREQUENCY
    }

    fn power(&mut self, random: &mut Random) {
        self.ticks = 0;
        self.seconds = random.next_u16() as u32;
        self.continuation = Continuation::Idle;
    }

    fn main(&mut self, cx: &mut Context) {
        match self.continuation {
            Continuation::Idle => {
                if !cx.synchronize_point() {
                    return;
                }
                cx.step(1);
                self.ticks += 1;
                if self.ticks as u32 >= FREQUENCY {
                    self.ticks = 0;
                    self.seconds = self.seconds.wrapping_add(1);
                }
                if let Some(latch) = cx.bus.coprocessor_latch(self.index as usize) {
                    if latch.take_strobe() && latch.input[0] == COMMAND_SET {
                        let [_, a, b, c] = latch.input;
                        self.seconds = u32::from_le_bytes([a, b, c, 0]);
                        self.ticks = 0;
                    }
                    latch.output = self.seconds.to_le_bytes();
                }
                self.continuation = Continuation::Ticked;
            }
            Continuation::Ticked => {
                self.continuation = Continuation::Idle;
                cx.synchronize_cpu();
            }
        }
    }

    fn serialize(&mut self, s: &mut Serializer) {
        s.integer(&mut self.ticks);
        s.integer(&mut self.seconds);
        if self.ticks as u32 >= FREQUENCY {
            s.reject("rtc ticks");
            self.ticks = 0;
        }
    }

    fn serialize_stack(&mut self, s: &mut Serializer) {
        let mut ticked = self.continuation == Continuation::Ticked;
        s.boolean(&mut ticked);
        self.continuation = if ticked {
            Continuation::Ticked
        } else {
            Continuation::Idle
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
    use crate::scheduler::ThreadId;

    const COP: ThreadId = ThreadId::Coprocessor(0);

    #[test]
    fn test_counts_seconds() {
        let mut machine = TestMachine::new(vec![
            Box::new(Ticker::new(CPU_FREQUENCY, 8)),
            Box::new(Ticker::new(CPU_FREQUENCY, 4)),
            Box::new(Ticker::new(CPU_FREQUENCY, 4)),
            Box::new(Rtc::new(0)),
        ]);
        machine.chips.bus.coprocessors[0].input = [COMMAND_SET, 0x10, 0, 0];
        machine.chips.bus.coprocessors[0].strobe = true;
        // The command is picked up on the first tick, which restarts the current second.
        for _ in 0..=FREQUENCY * 2 {
            machine.synchronize(COP);
        }
        assert_eq!(machine.chips.bus.coprocessors[0].output, [0x12, 0, 0, 0]);
    }
}
