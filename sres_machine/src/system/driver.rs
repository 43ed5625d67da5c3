//! Drives every chip to its synchronization point before a portable snapshot is taken.
//!
//! Chips are resumable state machines, but a chip suspended in the middle of a unit of work
//! carries part of that work in its continuation. Portable snapshots only contain architectural
//! registers, so before one is written the machine is steered into an instant at which every
//! thread is parked at its synchronization point.
//!
//! Two strategies are available:
//!
//! - [SerializationMethod::Strict] visits the chips in a fixed order, audio processor around the
//!   CPU, and starts over whenever a drive is disturbed. Only a pass in which every chip reached
//!   its point undisturbed ends the loop.
//! - [SerializationMethod::Fast] brings the CPU to its point first, then every remaining chip
//!   individually, retrying chips that are disturbed but never starting over.
use log::debug;
use serde::Deserialize;
use serde::Serialize;

use crate::scheduler::ChipSet;
use crate::scheduler::Event;
use crate::scheduler::Mode;
use crate::scheduler::Scheduler;
use crate::scheduler::ThreadId;

#[derive(
    Default,
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum SerializationMethod {
    #[default]
    Fast,
    Strict,
}

/// Statistics of one [run_to_save] call.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncReport {
    pub passes: u32,
    pub desyncs: u32,
    pub frames: u32,
}

/// Drives all threads of `scheduler` to their synchronization points.
///
/// `on_frame` is called for every frame event raised on the way, exactly like during normal
/// execution. On return the scheduler is [quiescent](Scheduler::quiescent): every thread is
/// parked and no chip is behind the CPU. The scheduler is back in [Mode::Run] and the CPU is the
/// active thread.
pub fn run_to_save<C: ChipSet + ?Sized>(
    method: SerializationMethod,
    scheduler: &mut Scheduler,
    chips: &mut C,
    mut on_frame: impl FnMut(&mut C),
) -> SyncReport {
    let _span = tracing::info_span!("run_to_save", %method).entered();
    let mut driver = Driver {
        scheduler,
        report: SyncReport::default(),
    };
    driver.scheduler.clear_desynchronized();
    driver.scheduler.set_mode(Mode::Synchronize);
    match method {
        SerializationMethod::Fast => driver.fast(chips, &mut on_frame),
        SerializationMethod::Strict => driver.strict(chips, &mut on_frame),
    }
    debug_assert!(driver.scheduler.quiescent());
    driver.scheduler.set_mode(Mode::Run);
    driver.scheduler.set_active(ThreadId::Cpu);
    driver.scheduler.clear_desynchronized();
    debug!(
        "{} synchronization: {} passes, {} desyncs, {} frames",
        method, driver.report.passes, driver.report.desyncs, driver.report.frames
    );
    driver.report
}

/// Order in which [SerializationMethod::Strict] visits the threads of `scheduler`.
pub fn strict_order(scheduler: &Scheduler) -> Vec<ThreadId> {
    let ids = scheduler.threads().iter().map(|thread| thread.id());
    let mut order = if scheduler.threads().len() > ThreadId::Smp.index() {
        vec![ThreadId::Smp, ThreadId::Cpu, ThreadId::Smp]
    } else {
        vec![ThreadId::Cpu]
    };
    order.extend(ids.filter(|id| !matches!(id, ThreadId::Cpu | ThreadId::Smp)));
    order
}

struct Driver<'a> {
    scheduler: &'a mut Scheduler,
    report: SyncReport,
}

impl Driver<'_> {
    fn strict<C: ChipSet + ?Sized>(&mut self, chips: &mut C, on_frame: &mut impl FnMut(&mut C)) {
        let order = strict_order(self.scheduler);
        'pass: loop {
            self.report.passes += 1;
            let _span = tracing::debug_span!("pass", number = self.report.passes).entered();
            for &thread in order.iter() {
                if !self.drive(thread, chips, on_frame) {
                    debug!("Pass {} disturbed while driving {}", self.report.passes, thread);
                    continue 'pass;
                }
            }
            break;
        }
    }

    /// Runs the CPU to its point, then settles every other chip.
    ///
    /// Phase one does not let the simulation continue with whichever chip a disturbance left in
    /// charge. That chip would park at its own point and end the drive without the CPU moving,
    /// so the CPU is made active again until it parks undisturbed.
    fn fast<C: ChipSet + ?Sized>(&mut self, chips: &mut C, on_frame: &mut impl FnMut(&mut C)) {
        self.report.passes += 1;
        while !self.drive(ThreadId::Cpu, chips, on_frame) {}

        let threads = self
            .scheduler
            .threads()
            .iter()
            .map(|thread| thread.id())
            .filter(|id| *id != ThreadId::Cpu)
            .collect::<Vec<_>>();
        for &thread in threads.iter() {
            while !self.scheduler.thread(thread).settled() {
                self.drive(thread, chips, on_frame);
            }
        }

        // Chips driven later may have resumed chips that were already done.
        while !self.scheduler.quiescent() {
            self.report.passes += 1;
            let unsettled = self
                .scheduler
                .threads()
                .iter()
                .filter(|thread| !thread.settled())
                .map(|thread| thread.id())
                .collect::<Vec<_>>();
            debug!("Re-driving {} unsettled threads", unsettled.len());
            for thread in unsettled {
                self.drive(thread, chips, on_frame);
            }
        }
    }

    /// Enters the scheduler with `thread` active until some thread reaches its synchronization
    /// point. Returns true if it was `thread`, undisturbed.
    fn drive<C: ChipSet + ?Sized>(
        &mut self,
        thread: ThreadId,
        chips: &mut C,
        on_frame: &mut impl FnMut(&mut C),
    ) -> bool {
        self.scheduler.set_active(thread);
        loop {
            match self.scheduler.enter(chips) {
                Event::Frame => {
                    self.report.frames += 1;
                    on_frame(chips);
                }
                Event::Synchronized if self.scheduler.active() == thread => return true,
                Event::Synchronized | Event::Desynchronized => {
                    self.report.desyncs += 1;
                    return false;
                }
            }
        }
    }
}
