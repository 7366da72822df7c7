/*!
A virtual-time timer queue.

Time is a `Duration` since an arbitrary epoch chosen by whoever drives the
agents: the daemon uses the time since start-up, tests use a hand-advanced
clock. Nothing here sleeps; the owner pops due events and handles them.
*/

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

/// Identifies a scheduled event so that it can be cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug)]
pub struct Scheduler<E> {
    queue: BinaryHeap<Reverse<(Duration, u64)>>,
    events: HashMap<u64, E>,
    next_seq: u64,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Scheduler::new()
    }
}

impl<E> Scheduler<E> {
    pub fn new() -> Scheduler<E> {
        Scheduler {
            queue: BinaryHeap::new(),
            events: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Schedules `event` at the absolute time `at`.
    /// Events due at the same time fire in scheduling order.
    pub fn schedule_at(&mut self, at: Duration, event: E) -> TimerHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse((at, seq)));
        self.events.insert(seq, event);
        TimerHandle(seq)
    }

    pub fn schedule_after(&mut self, now: Duration, delay: Duration, event: E) -> TimerHandle {
        self.schedule_at(now + delay, event)
    }

    /// Returns the event if it was still pending.
    pub fn cancel(&mut self, handle: TimerHandle) -> Option<E> {
        self.events.remove(&handle.0)
    }

    /// The time of the earliest pending event.
    pub fn next_due(&mut self) -> Option<Duration> {
        self.skip_cancelled();
        self.queue.peek().map(|&Reverse((at, _))| at)
    }

    /// Pops the earliest event that is due at `now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<(Duration, E)> {
        self.skip_cancelled();
        let at = match self.queue.peek() {
            Some(&Reverse((at, _))) if at <= now => at,
            _ => return None,
        };
        let Reverse((_, seq)) = self.queue.pop()?;
        self.events.remove(&seq).map(|event| (at, event))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn skip_cancelled(&mut self) {
        while let Some(&Reverse((_, seq))) = self.queue.peek() {
            if self.events.contains_key(&seq) {
                break;
            }
            self.queue.pop();
        }
    }
}
