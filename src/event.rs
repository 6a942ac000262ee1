use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;

use crate::{ConnId, NodeId};

/// What the scheduler can deliver. Targets are arena handles, never
/// references, so a fired event outliving its target is skippable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    ReadReady { node: NodeId, conn: ConnId },
    WriteReady { node: NodeId, conn: ConnId },
    RefillRead { node: NodeId },
    RefillWrite { node: NodeId },
}

impl Event {
    /// Which node this event targets.
    pub fn node(&self) -> NodeId {
        match *self {
            Event::ReadReady { node, .. }
            | Event::WriteReady { node, .. }
            | Event::RefillRead { node }
            | Event::RefillWrite { node } => node,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Entry {
    at: Duration,
    seq: u64,
    event: Event,
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // same-time events fire in scheduling order
        self.at.cmp(&other.at).then(self.seq.cmp(&other.seq))
    }
}

/// Discrete-event scheduler with a simulated clock. Single logical thread;
/// time only advances when an event is popped.
#[derive(Debug, Default)]
pub struct Scheduler {
    now: Duration,
    seq: u64,
    queue: BinaryHeap<Reverse<Entry>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn schedule_in(&mut self, delay: Duration, event: Event) {
        let seq = self.seq;
        self.seq += 1;
        self.queue.push(Reverse(Entry {
            at: self.now + delay,
            seq,
            event,
        }));
    }

    /// Pop the earliest event and advance the clock to it.
    pub fn pop(&mut self) -> Option<(Duration, Event)> {
        let Reverse(entry) = self.queue.pop()?;
        debug_assert!(entry.at >= self.now);
        self.now = entry.at;
        Some((entry.at, entry.event))
    }

    /// Advance the clock without firing anything. Meant for harnesses that
    /// drive state machines directly instead of through events.
    pub fn advance_by(&mut self, delta: Duration) {
        self.now += delta;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const NODE: NodeId = NodeId(0);

    #[test]
    fn pops_in_time_order() {
        let mut sched = Scheduler::new();
        sched.schedule_in(
            Duration::from_millis(5),
            Event::ReadReady {
                node: NODE,
                conn: ConnId(1),
            },
        );
        sched.schedule_in(Duration::from_millis(1), Event::RefillRead { node: NODE });
        sched.schedule_in(
            Duration::from_millis(3),
            Event::WriteReady {
                node: NODE,
                conn: ConnId(0),
            },
        );

        let (at, event) = sched.pop().unwrap();
        assert_eq!(at, Duration::from_millis(1));
        assert_eq!(event, Event::RefillRead { node: NODE });
        assert_eq!(sched.now(), Duration::from_millis(1));

        assert_eq!(sched.pop().unwrap().0, Duration::from_millis(3));
        assert_eq!(sched.pop().unwrap().0, Duration::from_millis(5));
        assert!(sched.pop().is_none());
    }

    #[test]
    fn same_time_events_fire_in_scheduling_order() {
        let mut sched = Scheduler::new();
        for i in 0..4 {
            sched.schedule_in(
                Duration::ZERO,
                Event::ReadReady {
                    node: NODE,
                    conn: ConnId(i),
                },
            );
        }
        for i in 0..4 {
            let (_, event) = sched.pop().unwrap();
            assert_eq!(
                event,
                Event::ReadReady {
                    node: NODE,
                    conn: ConnId(i),
                }
            );
        }
    }

    #[test]
    fn delays_are_relative_to_now() {
        let mut sched = Scheduler::new();
        sched.schedule_in(Duration::from_millis(10), Event::RefillRead { node: NODE });
        sched.pop().unwrap();
        sched.schedule_in(Duration::from_millis(10), Event::RefillRead { node: NODE });
        assert_eq!(sched.pop().unwrap().0, Duration::from_millis(20));
    }
}
