use crate::common::clock::Clock;
use crate::common::serializer::Serializable;
use crate::common::serializer::Serializer;

use super::ThreadId;

/// Largest distance from the CPU a loaded clock may claim. Chips never drift apart by more than
/// a fraction of a second, which is below 2^50 in cross-multiplied units.
const MAX_CLOCK_DISTANCE: u64 = 1 << 56;

/// Where a thread's execution context currently is relative to its synchronization point.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum ThreadState {
    /// Suspended exactly at its synchronization point. Fresh and freshly loaded threads start
    /// here.
    #[default]
    Parked,
    /// Given control while parked. The next synchronization point it reaches is the one it was
    /// parked at, which it passes without leaving.
    Released,
    /// Past its synchronization point, possibly suspended in the middle of a unit of work.
    Running,
}

impl ThreadState {
    fn to_u8(self) -> u8 {
        match self {
            ThreadState::Parked => 0,
            ThreadState::Released => 1,
            ThreadState::Running => 2,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ThreadState::Parked),
            1 => Some(ThreadState::Released),
            2 => Some(ThreadState::Running),
            _ => None,
        }
    }
}

/// Execution context of one chip: its identity, clock and suspension state.
///
/// The chip's registers and in-flight work live in the chip itself; the thread only knows how
/// far along in time the chip is and whether it is resting at its synchronization point.
#[derive(Clone, Debug)]
pub struct Thread {
    id: ThreadId,
    pub clock: Clock,
    state: ThreadState,
}

impl Thread {
    pub fn new(id: ThreadId, frequency: u32) -> Self {
        Self {
            id,
            clock: Clock::new(frequency),
            state: ThreadState::Parked,
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn frequency(&self) -> u32 {
        self.clock.frequency
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    pub fn parked(&self) -> bool {
        self.state == ThreadState::Parked
    }

    /// Parked and not behind the CPU, so its registers describe the same instant as the CPU's.
    pub fn settled(&self) -> bool {
        self.parked() && (self.id == ThreadId::Cpu || self.clock.ahead())
    }

    /// Control is being transferred to this thread.
    pub(super) fn release(&mut self) {
        if self.state == ThreadState::Parked {
            self.state = ThreadState::Released;
        }
    }

    pub(super) fn set_state(&mut self, state: ThreadState) {
        self.state = state;
    }

    /// Registers of the execution context, valid in every snapshot.
    pub fn serialize(&mut self, s: &mut Serializer) {
        let frequency = self.clock.frequency;
        s.object(&mut self.clock);
        if self.clock.frequency != frequency {
            s.reject("thread frequency");
            self.clock.frequency = frequency;
        }
        if self.clock.value.unsigned_abs() > MAX_CLOCK_DISTANCE {
            s.reject("thread clock");
            self.clock.value = 0;
        }
    }

    /// Suspension state, only valid for the build and machine that produced it.
    pub fn serialize_stack(&mut self, s: &mut Serializer) {
        let mut state = self.state.to_u8();
        s.integer(&mut state);
        match ThreadState::from_u8(state) {
            Some(state) => self.state = state,
            None => s.reject("thread state"),
        }
    }
}

impl Serializable for Thread {
    fn serialize(&mut self, s: &mut Serializer) {
        Thread::serialize(self, s);
    }
}
