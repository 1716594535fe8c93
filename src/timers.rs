//! Retransmission timer table.
//!
//! A generation-stamped priority queue, per the redesign this spec adopts
//! over the reference implementation's thread-per-timer model: a cancel or
//! reschedule just bumps the live generation for a `seq`, and a stale heap
//! entry is simply skipped when popped rather than hunted down and removed.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    deadline: Instant,
    seq: i64,
    generation: u64,
}

#[derive(Debug, Default)]
pub struct TimerTable {
    generation: HashMap<i64, u64>,
    heap: BinaryHeap<Reverse<Entry>>,
}

impl TimerTable {
    pub fn new() -> Self {
        Self {
            generation: HashMap::new(),
            heap: BinaryHeap::new(),
        }
    }

    /// Schedule (or reschedule) a timer for `seq`, cancelling any prior
    /// timer for the same `seq` in the process. Returns the new generation.
    pub fn schedule(&mut self, seq: i64, deadline: Instant) -> u64 {
        let generation = self.generation.entry(seq).or_insert(0);
        *generation += 1;
        let g = *generation;
        self.heap.push(Reverse(Entry {
            deadline,
            seq,
            generation: g,
        }));
        g
    }

    /// Cancel the live timer for `seq`, if any. Idempotent.
    pub fn cancel(&mut self, seq: i64) {
        if let Some(g) = self.generation.get_mut(&seq) {
            *g += 1;
        }
    }

    /// Cancel every live timer with `seq <= n` (used when a cumulative ACK
    /// advances past them).
    pub fn cancel_up_to(&mut self, n: i64) {
        for (&seq, g) in self.generation.iter_mut() {
            if seq <= n {
                *g += 1;
            }
        }
    }

    /// Cancel every live timer (used on transfer end).
    pub fn cancel_all(&mut self) {
        for g in self.generation.values_mut() {
            *g += 1;
        }
    }

    /// Pop and return the next due `(seq, generation)` at or before `now`,
    /// skipping any stale (superseded) entries along the way. Returns `None`
    /// once there is nothing due.
    pub fn pop_due(&mut self, now: Instant) -> Option<(i64, u64)> {
        while let Some(&Reverse(entry)) = self.heap.peek() {
            if entry.deadline > now {
                return None;
            }
            self.heap.pop();
            if self.generation.get(&entry.seq) == Some(&entry.generation) {
                return Some((entry.seq, entry.generation));
            }
            // stale: already cancelled or superseded by a later reschedule.
        }
        None
    }

    /// The deadline of the earliest still-live timer, if any, used to bound
    /// how long the event loop should block on its next `recv_from`.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap
            .iter()
            .filter(|Reverse(e)| self.generation.get(&e.seq) == Some(&e.generation))
            .map(|Reverse(e)| e.deadline)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn cancelled_timer_never_fires() {
        let mut t = TimerTable::new();
        let now = Instant::now();
        t.schedule(3, now);
        t.cancel(3);
        assert_eq!(t.pop_due(now + Duration::from_secs(1)), None);
    }

    #[test]
    fn rescheduling_supersedes_the_earlier_entry() {
        let mut t = TimerTable::new();
        let now = Instant::now();
        t.schedule(3, now);
        let g2 = t.schedule(3, now + Duration::from_millis(50));
        // the stale first entry is due immediately but must be skipped
        let due = t.pop_due(now + Duration::from_millis(100));
        assert_eq!(due, Some((3, g2)));
        assert_eq!(t.pop_due(now + Duration::from_millis(100)), None);
    }

    #[test]
    fn at_most_one_live_timer_per_seq() {
        let mut t = TimerTable::new();
        let now = Instant::now();
        t.schedule(1, now);
        t.schedule(1, now);
        t.schedule(1, now);
        let mut fired = 0;
        while t.pop_due(now + Duration::from_secs(1)).is_some() {
            fired += 1;
        }
        assert_eq!(fired, 1);
    }

    #[test]
    fn cancel_up_to_clears_every_seq_at_or_below_n() {
        let mut t = TimerTable::new();
        let now = Instant::now();
        t.schedule(1, now);
        t.schedule(2, now);
        t.schedule(5, now);
        t.cancel_up_to(2);
        let mut due = Vec::new();
        while let Some((seq, _)) = t.pop_due(now + Duration::from_secs(1)) {
            due.push(seq);
        }
        assert_eq!(due, vec![5]);
    }

    #[test]
    fn nothing_due_before_deadline() {
        let mut t = TimerTable::new();
        let now = Instant::now();
        t.schedule(1, now + Duration::from_secs(10));
        assert_eq!(t.pop_due(now), None);
    }
}
