#![cfg(test)]

use std::sync::atomic::Ordering;

use pretty_assertions::assert_eq;

use super::*;
use crate::common::debug_events::test::vec_collector;
use crate::common::debug_events::DEBUG_EVENTS_ENABLED;
use crate::common::serializer::Serializer;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    #[default]
    Boundary,
    Work,
    Sync,
}

/// Two chips with a 3:2 frequency ratio. A is the reference domain and B depends on it.
/// Each unit of work takes three slices: synchronization point, step, synchronization check.
#[derive(Default)]
struct Pair {
    stages: [Stage; 2],
    units: [u64; 2],
    /// A leaves with a frame event after this many units.
    frame_units: u64,
    /// Clock of B after every step, with the number of units of A and B at that point.
    history: Vec<(i64, u64, u64)>,
}

const A: ThreadId = ThreadId::Cpu;
const B: ThreadId = ThreadId::Smp;

impl Pair {
    fn scheduler() -> Scheduler {
        let mut scheduler = Scheduler::new();
        scheduler.create(A, 3);
        scheduler.create(B, 2);
        scheduler
    }
}

impl ChipSet for Pair {
    fn main(&mut self, thread: ThreadId, scheduler: &mut Scheduler) {
        let index = thread.index();
        match self.stages[index] {
            Stage::Boundary => {
                if scheduler.synchronize_point(thread) {
                    self.stages[index] = Stage::Work;
                }
            }
            Stage::Work => {
                scheduler.step(thread, 1);
                self.units[index] += 1;
                self.history
                    .push((scheduler.clock(B).value, self.units[0], self.units[1]));
                self.stages[index] = Stage::Sync;
            }
            Stage::Sync => {
                self.stages[index] = Stage::Boundary;
                let clock = scheduler.clock(B).value;
                if thread == A {
                    if self.frame_units > 0 && self.units[0] % self.frame_units == 0 {
                        scheduler.leave(Event::Frame);
                    } else if clock < 0 {
                        scheduler.resume(B);
                    }
                } else if clock >= 0 {
                    scheduler.resume(A);
                }
            }
        }
    }
}

#[test]
fn test_cross_multiplied_clocks_do_not_drift() {
    let mut scheduler = Pair::scheduler();
    let mut pair = Pair {
        frame_units: 10_000,
        ..Default::default()
    };
    assert_eq!(scheduler.enter(&mut pair), Event::Frame);
    assert_eq!(pair.units[0], 10_000);

    for (clock, a_units, b_units) in pair.history.iter() {
        // Every unit of A moves B back by B's frequency, every unit of B forward by A's.
        assert_eq!(*clock, 3 * *b_units as i64 - 2 * *a_units as i64);
        assert!(clock.abs() <= 3, "clock drifted to {}", clock);
    }
    // 10_000 units of A at 3 Hz take as long as ~6_667 units of B at 2 Hz.
    assert!((6_666..=6_668).contains(&pair.units[1]));
}

#[test]
fn test_leave_keeps_leaving_thread_active() {
    let mut scheduler = Pair::scheduler();
    let mut pair = Pair {
        frame_units: 4,
        ..Default::default()
    };
    assert_eq!(scheduler.enter(&mut pair), Event::Frame);
    assert_eq!(scheduler.active(), A);
    assert!(!scheduler.executing(A));
    assert_eq!(scheduler.enter(&mut pair), Event::Frame);
    assert_eq!(pair.units[0], 8);
}

#[test]
fn test_resume_while_synchronizing_desynchronizes() {
    let mut scheduler = Pair::scheduler();
    let mut pair = Pair::default();
    assert!(scheduler.all_parked());

    scheduler.set_mode(Mode::Synchronize);
    scheduler.set_active(A);
    // A passes its point, steps, resumes B. B passes its point, steps, resumes A. A reaches its
    // point again but two resumes happened on the way.
    assert_eq!(scheduler.enter(&mut pair), Event::Desynchronized);
    assert_eq!(scheduler.active(), A);
    assert!(!scheduler.desynchronized());
    assert_eq!(scheduler.thread(A).state(), ThreadState::Parked);
    assert_eq!(scheduler.thread(B).state(), ThreadState::Running);
    assert!(!scheduler.all_parked());

    // B is already back at its boundary and leaves without disturbing anyone.
    scheduler.set_active(B);
    assert_eq!(scheduler.enter(&mut pair), Event::Synchronized);
    assert!(scheduler.all_parked());
    assert_eq!(pair.units, [1, 1]);
}

#[test]
fn test_dependent_behind_does_not_park() {
    let mut scheduler = Pair::scheduler();
    let mut pair = Pair::default();
    scheduler.threads[B.index()].clock.value = -5;
    scheduler.set_mode(Mode::Synchronize);
    scheduler.set_active(B);

    // B keeps working through its point until it is ahead, then catches up A, which runs one
    // unit and leaves B behind again.
    assert_eq!(scheduler.enter(&mut pair), Event::Desynchronized);
    assert_eq!(pair.units, [1, 3]);
    assert_eq!(scheduler.clock(B).value, 2);

    scheduler.set_active(B);
    assert_eq!(scheduler.enter(&mut pair), Event::Synchronized);
    assert!(scheduler.quiescent());
    assert_eq!(pair.units, [1, 3]);
}

#[test]
fn test_run_mode_passes_synchronization_points() {
    let mut scheduler = Pair::scheduler();
    let mut pair = Pair {
        frame_units: 100,
        ..Default::default()
    };
    scheduler.enter(&mut pair);
    assert!(!scheduler.desynchronized());
    assert_eq!(scheduler.thread(A).state(), ThreadState::Running);
}

#[test]
fn test_reset_parks_threads() {
    let mut scheduler = Pair::scheduler();
    let mut pair = Pair {
        frame_units: 5,
        ..Default::default()
    };
    scheduler.enter(&mut pair);
    assert!(!scheduler.all_parked());
    scheduler.reset();
    assert!(scheduler.all_parked());
    assert_eq!(scheduler.clock(B).value, 0);
    assert_eq!(scheduler.active(), A);
}

#[test]
fn test_debug_events() {
    DEBUG_EVENTS_ENABLED.store(true, Ordering::Relaxed);
    let (collector, events) = vec_collector();
    let mut scheduler = Pair::scheduler();
    scheduler.set_debug_event_collector(Some(collector));
    let mut pair = Pair {
        frame_units: 1,
        ..Default::default()
    };
    scheduler.enter(&mut pair);
    assert_eq!(
        *events.borrow(),
        vec![
            SchedulerEvent::Step {
                thread: A,
                units: 1,
                clock: 0
            },
            SchedulerEvent::Leave {
                thread: A,
                event: Event::Frame
            },
        ]
    );
}

#[test]
fn test_instant_state_rejects_unknown_thread() {
    let mut scheduler = Pair::scheduler();
    let mut load = Serializer::load(&[7, 0, 0, 0]);
    scheduler.serialize_stack(&mut load);
    assert_eq!(load.invalid(), Some("active thread"));
    assert_eq!(scheduler.active(), A);
}

#[test]
fn test_instant_state_round_trip() {
    let mut scheduler = Pair::scheduler();
    let mut pair = Pair::default();
    scheduler.set_mode(Mode::Synchronize);
    scheduler.enter(&mut pair);
    scheduler.set_mode(Mode::Run);
    scheduler.set_active(B);

    let mut save = Serializer::save(0);
    scheduler.serialize_stack(&mut save);

    let mut restored = Pair::scheduler();
    let mut load = Serializer::load(save.data());
    restored.serialize_stack(&mut load);
    assert_eq!(load.invalid(), None);
    assert_eq!(restored.active(), B);
    assert_eq!(restored.thread(B).state(), ThreadState::Running);
    assert_eq!(restored.thread(A).state(), ThreadState::Parked);
}

#[test]
fn test_thread_id_names() {
    for id in [A, B, ThreadId::Ppu, ThreadId::Coprocessor(1)] {
        assert_eq!(id.to_string().parse::<ThreadId>().unwrap(), id);
        assert_eq!(ThreadId::from_index(id.index()), Some(id));
    }
    assert_eq!("COP12".parse::<ThreadId>().unwrap(), ThreadId::Coprocessor(12));
    assert!("dsp".parse::<ThreadId>().is_err());
    assert!("cop".parse::<ThreadId>().is_err());
    assert_eq!("desynchronized".parse::<Event>().unwrap(), Event::Desynchronized);
}
