use super::Event;
use super::Scheduler;
use super::ThreadId;
use crate::common::bus::Bus;
use crate::common::entropy::Random;
use crate::common::serializer::Serializer;

/// The contract every virtualized processor implements.
///
/// A chip is a resumable state machine. `main` executes one slice: at most one unit of work or
/// one transfer of control through the [Context]. Work that spans multiple slices is kept in the
/// chip's continuation, which must be back in its idle state whenever the chip reaches its
/// synchronization point.
pub trait Chip {
    /// Nominal frequency of the chip's clock domain in Hz.
    fn frequency(&self) -> u32;

    /// Resets registers and seeds uninitialized memory.
    fn power(&mut self, random: &mut Random);

    fn main(&mut self, cx: &mut Context);

    /// Architectural registers. Valid at any synchronization point.
    fn serialize(&mut self, s: &mut Serializer);

    /// The in-flight continuation. Only part of instant snapshots.
    fn serialize_stack(&mut self, s: &mut Serializer);

    /// True if no unit of work is in flight.
    fn at_boundary(&self) -> bool;
}

/// A set of chips the scheduler can transfer control between.
pub trait ChipSet {
    /// Executes one slice of the chip belonging to `thread`.
    fn main(&mut self, thread: ThreadId, scheduler: &mut Scheduler);
}

/// Everything a chip can reach while executing a slice.
pub struct Context<'a> {
    pub bus: &'a mut Bus,
    scheduler: &'a mut Scheduler,
    thread: ThreadId,
}

impl<'a> Context<'a> {
    pub fn new(bus: &'a mut Bus, scheduler: &'a mut Scheduler, thread: ThreadId) -> Self {
        Self {
            bus,
            scheduler,
            thread,
        }
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// Advances this chip's clock by `units` of its own domain.
    #[inline]
    pub fn step(&mut self, units: u32) {
        self.scheduler.step(self.thread, units);
    }

    /// This chip's time relative to the CPU. Always 0 for the CPU itself.
    pub fn clock(&self) -> i64 {
        self.scheduler.clock(self.thread).value
    }

    pub fn synchronizing(&self) -> bool {
        self.scheduler.synchronizing()
    }

    /// CPU side: resumes `other` if it is behind. Returns true if control was transferred, in
    /// which case the slice must end.
    pub fn synchronize(&mut self, other: ThreadId) -> bool {
        debug_assert_eq!(self.thread, ThreadId::Cpu);
        if self.scheduler.clock(other).ahead() {
            return false;
        }
        self.scheduler.resume(other);
        true
    }

    /// Dependent side: resumes the CPU if this chip is level with or ahead of it.
    ///
    /// Does nothing while synchronizing: a chip being driven to its synchronization point may
    /// run ahead of the CPU by the rest of its current unit of work.
    pub fn synchronize_cpu(&mut self) -> bool {
        debug_assert_ne!(self.thread, ThreadId::Cpu);
        if self.scheduler.synchronizing() || !self.scheduler.clock(self.thread).ahead() {
            return false;
        }
        self.scheduler.resume(ThreadId::Cpu);
        true
    }

    /// Dependent side: resumes the CPU only if this chip ran ahead by more than `cycles` of its
    /// own domain. Like [Context::synchronize_cpu], does nothing while synchronizing.
    pub fn synchronize_ahead(&mut self, cycles: u32) -> bool {
        debug_assert_ne!(self.thread, ThreadId::Cpu);
        let reference = self.scheduler.clock(ThreadId::Cpu).frequency;
        if self.scheduler.synchronizing()
            || !self.scheduler.clock(self.thread).ahead_by(cycles, reference)
        {
            return false;
        }
        self.scheduler.resume(ThreadId::Cpu);
        true
    }

    /// Marks the chip's synchronization point. Returns false if the chip left the scheduler here
    /// and must end the slice.
    pub fn synchronize_point(&mut self) -> bool {
        self.scheduler.synchronize_point(self.thread)
    }

    pub fn resume(&mut self, target: ThreadId) {
        self.scheduler.resume(target);
    }

    pub fn leave(&mut self, event: Event) {
        self.scheduler.leave(event);
    }
}
