//! Debugger functionality
//!
//! The scheduler reports every transfer of control and every clock step as a [SchedulerEvent].
//! The debugger keeps the events matching one of its log points, so the front end can show how
//! chips were interleaved.
use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::atomic::Ordering;

use anyhow::bail;

use crate::common::debug_events::DebugEventCollector;
use crate::common::debug_events::DEBUG_EVENTS_ENABLED;
use crate::common::util::RingBuffer;
use crate::scheduler::Event;
use crate::scheduler::SchedulerEvent;
use crate::scheduler::ThreadId;

pub type DebuggerRef = Rc<RefCell<Debugger>>;

/// Selects scheduler events. A missing argument matches any thread or event.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum EventFilter {
    /// Control transferred to a thread.
    Resume(Option<ThreadId>),
    /// Control returned to the host.
    Leave(Option<Event>),
    /// A thread advanced its clock.
    Step(Option<ThreadId>),
}

impl EventFilter {
    pub fn matches(&self, event: &SchedulerEvent) -> bool {
        use EventFilter::*;
        match (self, event) {
            (Resume(target), SchedulerEvent::Resume { to, .. }) => target.map_or(true, |t| t == *to),
            (Leave(expected), SchedulerEvent::Leave { event, .. }) => {
                expected.map_or(true, |e| e == *event)
            }
            (Step(thread), SchedulerEvent::Step { thread: stepped, .. }) => {
                thread.map_or(true, |t| t == *stepped)
            }
            _ => false,
        }
    }
}

impl FromStr for EventFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use EventFilter::*;
        let (key, arg) = s.trim().split_once(' ').unwrap_or((s.trim(), ""));
        let arg = arg.trim();
        Ok(match key.to_lowercase().as_str() {
            "resume" => Resume(parse_optional(arg)?),
            "leave" => Leave(parse_optional(arg)?),
            "step" => Step(parse_optional(arg)?),
            _ => bail!("Unknown event filter {:?}", s),
        })
    }
}

impl Display for EventFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use EventFilter::*;
        match self {
            Resume(thread) => write!(f, "resume{}", format_optional(thread)),
            Leave(event) => write!(f, "leave{}", format_optional(event)),
            Step(thread) => write!(f, "step{}", format_optional(thread)),
        }
    }
}

fn parse_optional<T: FromStr>(arg: &str) -> anyhow::Result<Option<T>>
where
    T::Err: Display,
{
    if arg.is_empty() {
        return Ok(None);
    }
    match arg.parse() {
        Ok(value) => Ok(Some(value)),
        Err(error) => bail!("Invalid filter argument {:?}: {}", arg, error),
    }
}

fn format_optional<T: Display>(value: &Option<T>) -> String {
    match value {
        Some(value) => format!(" {}", value),
        None => String::new(),
    }
}

#[derive(Default)]
pub struct Debugger {
    pub log_points: Vec<EventFilter>,
    pub log: RingBuffer<SchedulerEvent, 1024>,
    enabled: bool,
}

impl Debugger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Turns on event collection. The switch is process wide.
    pub fn enable(&mut self) {
        self.enabled = true;
        DEBUG_EVENTS_ENABLED.store(true, Ordering::Relaxed);
    }

    pub fn disable(&mut self) {
        self.enabled = false;
        DEBUG_EVENTS_ENABLED.store(false, Ordering::Relaxed);
    }

    pub fn has_log_point(&self, trigger: &EventFilter) -> bool {
        self.log_points.iter().any(|t| t == trigger)
    }

    pub fn add_log_point(&mut self, trigger: EventFilter) {
        if !self.has_log_point(&trigger) {
            self.log_points.push(trigger);
        }
    }

    pub fn remove_log_point(&mut self, trigger: &EventFilter) {
        self.log_points.retain(|t| t != trigger)
    }

    pub fn toggle_log_point(&mut self, trigger: EventFilter) {
        if self.has_log_point(&trigger) {
            self.remove_log_point(&trigger)
        } else {
            self.add_log_point(trigger)
        }
    }

    /// Logged events, oldest first. The log is emptied.
    pub fn take_log(&mut self) -> Vec<SchedulerEvent> {
        self.log.drain_oldest_first().collect()
    }
}

impl DebugEventCollector<SchedulerEvent> for Debugger {
    fn collect_event(&mut self, event: SchedulerEvent) {
        if !self.enabled {
            return;
        }
        if self.log_points.iter().any(|filter| filter.matches(&event)) {
            self.log.push(event);
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_filter_format() {
        let check_format = |filter: &str, expected: EventFilter| {
            assert_eq!(format!("{}", expected), filter);
            assert_eq!(filter.parse::<EventFilter>().unwrap(), expected);
        };

        use EventFilter::*;
        check_format("resume smp", Resume(Some(ThreadId::Smp)));
        check_format("resume", Resume(None));
        check_format("leave frame", Leave(Some(Event::Frame)));
        check_format("step cop1", Step(Some(ThreadId::Coprocessor(1))));
        assert!("jump cpu".parse::<EventFilter>().is_err());
        assert!("resume gpu".parse::<EventFilter>().is_err());
    }

    #[test]
    fn test_filter_matches() {
        let resume = SchedulerEvent::Resume {
            from: ThreadId::Cpu,
            to: ThreadId::Smp,
        };
        assert!(EventFilter::Resume(None).matches(&resume));
        assert!(EventFilter::Resume(Some(ThreadId::Smp)).matches(&resume));
        assert!(!EventFilter::Resume(Some(ThreadId::Cpu)).matches(&resume));
        assert!(!EventFilter::Step(None).matches(&resume));

        let leave = SchedulerEvent::Leave {
            thread: ThreadId::Ppu,
            event: Event::Frame,
        };
        assert!(EventFilter::Leave(Some(Event::Frame)).matches(&leave));
        assert!(!EventFilter::Leave(Some(Event::Synchronized)).matches(&leave));
    }

    #[test]
    fn test_log_points() {
        let mut debugger = Debugger::new();
        debugger.enabled = true;
        debugger.toggle_log_point(EventFilter::Leave(None));
        debugger.collect_event(SchedulerEvent::Step {
            thread: ThreadId::Cpu,
            units: 8,
            clock: 0,
        });
        let leave = SchedulerEvent::Leave {
            thread: ThreadId::Cpu,
            event: Event::Synchronized,
        };
        debugger.collect_event(leave);
        assert_eq!(debugger.take_log(), vec![leave]);

        debugger.toggle_log_point(EventFilter::Leave(None));
        debugger.collect_event(leave);
        assert!(debugger.log.is_empty());
    }
}
