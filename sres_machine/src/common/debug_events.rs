//! Debug event plumbing shared by the scheduler and the debugger.
//!
//! Emitting an event is a single relaxed atomic load while debug events are disabled, so the
//! scheduler can report every transfer of control without slowing down normal execution.
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

pub static DEBUG_EVENTS_ENABLED: AtomicBool = AtomicBool::new(false);

pub trait DebugEventCollector<EventT> {
    #[cold]
    fn collect_event(&mut self, event: EventT);
}

/// Shared reference to a [DebugEventCollector].
///
/// Handed to emitters so they can report events without knowing about the debugger.
pub struct DebugEventCollectorRef<EventT>(pub Rc<RefCell<dyn DebugEventCollector<EventT>>>);

impl<EventT> Clone for DebugEventCollectorRef<EventT> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<EventT> DebugEventCollectorRef<EventT> {
    #[inline]
    pub fn on_event(&self, event: impl FnOnce() -> EventT) {
        if DEBUG_EVENTS_ENABLED.load(Ordering::Relaxed) {
            self.0.borrow_mut().collect_event(event());
        }
    }
}
