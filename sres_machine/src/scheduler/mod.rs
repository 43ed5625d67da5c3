//! Cooperative scheduler interleaving all chips on a single host thread.
//!
//! Each chip is an explicit resumable state machine. The scheduler repeatedly asks the active
//! chip to execute one slice of work; a slice may end with a request to transfer control to
//! another chip ([Scheduler::resume]) or back to the host ([Scheduler::leave]). Nothing in here
//! ever runs two chips at once, so chips can share the bus without locks.
mod chip;
mod test;
#[cfg(test)]
pub mod test_util;
mod thread;

use std::fmt::Display;
use std::str::FromStr;

use anyhow::bail;
use anyhow::Context as _;
use log::trace;

pub use self::chip::Chip;
pub use self::chip::ChipSet;
pub use self::chip::Context;
pub use self::thread::Thread;
pub use self::thread::ThreadState;
use crate::common::clock::Clock;
use crate::common::debug_events::DebugEventCollectorRef;
use crate::common::serializer::Serializer;

/// Identifies one of the chips managed by the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ThreadId {
    Cpu,
    Smp,
    Ppu,
    Coprocessor(u8),
}

impl ThreadId {
    pub fn index(self) -> usize {
        match self {
            ThreadId::Cpu => 0,
            ThreadId::Smp => 1,
            ThreadId::Ppu => 2,
            ThreadId::Coprocessor(index) => 3 + index as usize,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(ThreadId::Cpu),
            1 => Some(ThreadId::Smp),
            2 => Some(ThreadId::Ppu),
            _ => u8::try_from(index - 3).ok().map(ThreadId::Coprocessor),
        }
    }
}

impl Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreadId::Cpu => write!(f, "cpu"),
            ThreadId::Smp => write!(f, "smp"),
            ThreadId::Ppu => write!(f, "ppu"),
            ThreadId::Coprocessor(index) => write!(f, "cop{}", index),
        }
    }
}

impl FromStr for ThreadId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "cpu" => ThreadId::Cpu,
            "smp" => ThreadId::Smp,
            "ppu" => ThreadId::Ppu,
            other => {
                let Some(index) = other.strip_prefix("cop") else {
                    bail!("Unknown thread {}", s);
                };
                ThreadId::Coprocessor(
                    index
                        .parse()
                        .with_context(|| format!("Invalid coprocessor index in {}", s))?,
                )
            }
        })
    }
}

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum Mode {
    /// Normal execution. Synchronization points are passed without stopping.
    #[default]
    Run,
    /// The save/restore driver is steering chips towards their synchronization points.
    Synchronize,
}

/// Why control was returned to the host.
#[derive(
    Default, Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Event {
    /// A visible frame completed.
    #[default]
    Frame,
    /// The leaving chip reached its synchronization point undisturbed.
    Synchronized,
    /// The leaving chip reached its synchronization point, but another chip was resumed on the
    /// way there.
    Desynchronized,
}

/// Scheduler activity reported to the debugger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerEvent {
    Resume { from: ThreadId, to: ThreadId },
    Leave { thread: ThreadId, event: Event },
    Step { thread: ThreadId, units: u32, clock: i64 },
}

impl Display for SchedulerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerEvent::Resume { from, to } => write!(f, "resume {} -> {}", from, to),
            SchedulerEvent::Leave { thread, event } => write!(f, "leave {} ({})", thread, event),
            SchedulerEvent::Step {
                thread,
                units,
                clock,
            } => write!(f, "step {} +{} ({})", thread, units, clock),
        }
    }
}

/// Control transfer requested by the slice that is currently executing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Transfer {
    Resume(ThreadId),
    Leave(Event),
}

pub struct Scheduler {
    mode: Mode,
    event: Event,
    active: ThreadId,
    /// True while the host is inside [Scheduler::enter].
    entered: bool,
    desynchronized: bool,
    threads: Vec<Thread>,
    transfer: Option<Transfer>,
    debug_event_collector: Option<DebugEventCollectorRef<SchedulerEvent>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            mode: Mode::Run,
            event: Event::Frame,
            active: ThreadId::Cpu,
            entered: false,
            desynchronized: false,
            threads: Vec::new(),
            transfer: None,
            debug_event_collector: None,
        }
    }

    /// Registers the execution context of a chip. Threads must be created in [ThreadId::index]
    /// order, starting with the CPU, which is the reference clock domain.
    pub fn create(&mut self, id: ThreadId, frequency: u32) {
        debug_assert_eq!(id.index(), self.threads.len());
        self.threads.push(Thread::new(id, frequency));
    }

    /// Returns every thread to its power-on state: parked with a zeroed clock.
    pub fn reset(&mut self) {
        self.mode = Mode::Run;
        self.event = Event::Frame;
        self.active = ThreadId::Cpu;
        self.desynchronized = false;
        self.transfer = None;
        for thread in self.threads.iter_mut() {
            thread.clock.reset();
            thread.set_state(ThreadState::Parked);
        }
    }

    pub fn set_debug_event_collector(
        &mut self,
        collector: Option<DebugEventCollectorRef<SchedulerEvent>>,
    ) {
        self.debug_event_collector = collector;
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        debug_assert!(!self.entered);
        self.mode = mode;
    }

    pub fn event(&self) -> Event {
        self.event
    }

    pub fn active(&self) -> ThreadId {
        self.active
    }

    /// Selects the thread that the next [Scheduler::enter] transfers control to.
    pub fn set_active(&mut self, id: ThreadId) {
        debug_assert!(!self.entered);
        debug_assert!(id.index() < self.threads.len());
        self.active = id;
    }

    pub fn desynchronized(&self) -> bool {
        self.desynchronized
    }

    pub fn clear_desynchronized(&mut self) {
        self.desynchronized = false;
    }

    pub fn synchronizing(&self) -> bool {
        self.mode == Mode::Synchronize
    }

    /// True if `id` is the chip currently executing.
    pub fn executing(&self, id: ThreadId) -> bool {
        self.entered && self.active == id
    }

    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn thread(&self, id: ThreadId) -> &Thread {
        &self.threads[id.index()]
    }

    pub fn clock(&self, id: ThreadId) -> &Clock {
        &self.threads[id.index()].clock
    }

    /// True if every thread rests at its synchronization point.
    pub fn all_parked(&self) -> bool {
        self.threads.iter().all(Thread::parked)
    }

    /// True if every thread is [settled](Thread::settled): the machine is at a consistent
    /// instant and a portable snapshot may be written.
    pub fn quiescent(&self) -> bool {
        self.threads.iter().all(Thread::settled)
    }

    /// Marks every thread as resting at its synchronization point. Used after loading a
    /// snapshot that was taken at a quiescent instant.
    pub fn park_all(&mut self) {
        for thread in self.threads.iter_mut() {
            thread.set_state(ThreadState::Parked);
        }
    }

    /// Transfers control to the active thread and runs slices until one of them leaves.
    pub fn enter<C: ChipSet + ?Sized>(&mut self, chips: &mut C) -> Event {
        debug_assert!(!self.entered, "enter called from within the simulation");
        self.entered = true;
        self.transfer = None;
        self.threads[self.active.index()].release();
        loop {
            chips.main(self.active, self);
            match self.transfer.take() {
                None => {}
                Some(Transfer::Resume(target)) => {
                    let from = self.active;
                    trace!("{} -> {}", from, target);
                    self.emit(|| SchedulerEvent::Resume { from, to: target });
                    self.active = target;
                    self.threads[target.index()].release();
                }
                Some(Transfer::Leave(event)) => {
                    let thread = self.active;
                    trace!("{} leaves: {}", thread, event);
                    self.emit(|| SchedulerEvent::Leave { thread, event });
                    self.event = event;
                    break;
                }
            }
        }
        self.entered = false;
        self.event
    }

    /// Ends the current slice and returns control to the host with `event`. The leaving thread
    /// stays active, so the next [Scheduler::enter] continues exactly where it left off.
    pub fn leave(&mut self, event: Event) {
        debug_assert!(self.entered, "leave called outside of the simulation");
        debug_assert!(self.transfer.is_none(), "second transfer requested in one slice");
        self.transfer = Some(Transfer::Leave(event));
    }

    /// Ends the current slice and transfers control to `target`.
    ///
    /// Any resume while synchronizing disturbs the chip the driver is steering.
    pub fn resume(&mut self, target: ThreadId) {
        debug_assert!(self.entered, "resume called outside of the simulation");
        debug_assert!(self.transfer.is_none(), "second transfer requested in one slice");
        debug_assert!(target.index() < self.threads.len());
        if self.mode == Mode::Synchronize {
            self.desynchronized = true;
        }
        self.transfer = Some(Transfer::Resume(target));
    }

    /// Called by a chip at its synchronization point. Returns true if the chip continues
    /// executing, false if it left and must end the slice.
    ///
    /// A dependent that is still behind the CPU passes its point even while synchronizing.
    pub fn synchronize_point(&mut self, id: ThreadId) -> bool {
        debug_assert!(self.executing(id));
        let thread = &mut self.threads[id.index()];
        let behind = id != ThreadId::Cpu && !thread.clock.ahead();
        if thread.state() == ThreadState::Released || self.mode == Mode::Run || behind {
            thread.set_state(ThreadState::Running);
            return true;
        }
        thread.set_state(ThreadState::Parked);
        let event = if std::mem::take(&mut self.desynchronized) {
            Event::Desynchronized
        } else {
            Event::Synchronized
        };
        self.leave(event);
        false
    }

    /// Advances the clock of `id` by `units` of its own domain.
    ///
    /// A CPU step moves every other clock back instead, keeping the CPU at zero.
    #[inline]
    pub fn step(&mut self, id: ThreadId, units: u32) {
        let clock = if id == ThreadId::Cpu {
            for thread in self.threads.iter_mut().skip(1) {
                thread.clock.rewind(units);
            }
            0
        } else {
            let reference = self.threads[0].frequency();
            let clock = &mut self.threads[id.index()].clock;
            clock.advance(units, reference);
            clock.value
        };
        self.emit(|| SchedulerEvent::Step {
            thread: id,
            units,
            clock,
        });
    }

    /// Clock and registers of one execution context.
    pub fn serialize_thread(&mut self, id: ThreadId, s: &mut Serializer) {
        let thread = &mut self.threads[id.index()];
        thread.serialize(s);
        if id == ThreadId::Cpu && thread.clock.value != 0 {
            s.reject("cpu clock");
            thread.clock.value = 0;
        }
    }

    /// Scheduler state that is only meaningful together with suspended chip continuations.
    pub fn serialize_stack(&mut self, s: &mut Serializer) {
        let mut active = self.active.index() as u8;
        s.integer(&mut active);
        s.boolean(&mut self.desynchronized);
        for thread in self.threads.iter_mut() {
            thread.serialize_stack(s);
        }
        match ThreadId::from_index(active as usize) {
            Some(id) if id.index() < self.threads.len() => self.active = id,
            _ => {
                s.reject("active thread");
                self.active = ThreadId::Cpu;
            }
        }
    }

    #[inline]
    fn emit(&self, event: impl FnOnce() -> SchedulerEvent) {
        if let Some(collector) = &self.debug_event_collector {
            collector.on_event(event);
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
