//! Pure congestion-window algebra: slow start, congestion avoidance, fast
//! retransmit and the ECN reaction. No I/O, no timers, no sequence numbers —
//! [`crate::controller`] owns those and calls into this module only for the
//! `cwnd`/`ssthresh` bookkeeping.

const INITIAL_CWND: u64 = 1;
const INITIAL_SSTHRESH: u64 = 8;
const ACKS_ON_MAX_WINDOW_THRESHOLD: u32 = 3;

#[derive(Debug, Clone)]
pub struct Window {
    pub cwnd: u64,
    pub ssthresh: u64,
    acks_in_window: u64,
    acks_on_max_window: u32,
}

impl Window {
    pub fn new() -> Self {
        Self {
            cwnd: INITIAL_CWND,
            ssthresh: INITIAL_SSTHRESH,
            acks_in_window: 0,
            acks_on_max_window: 0,
        }
    }

    /// Slow start / congestion avoidance growth on a new (non-duplicate) ACK.
    ///
    /// Both branches are gated on `acks_in_window >= cwnd`: the reference
    /// implementation nests congestion avoidance inside that same check
    /// rather than running it on every single ACK, and this spec follows
    /// that reading (see DESIGN.md).
    pub fn on_new_ack(&mut self) {
        self.acks_in_window += 1;
        if self.acks_in_window < self.cwnd {
            return;
        }
        if self.cwnd < self.ssthresh {
            self.cwnd += 1;
            self.acks_in_window = 0;
        } else {
            self.acks_on_max_window += 1;
            if self.acks_on_max_window >= ACKS_ON_MAX_WINDOW_THRESHOLD {
                self.ssthresh += 1;
                self.cwnd = self.ssthresh;
                self.acks_in_window = 0;
                self.acks_on_max_window = 0;
            }
        }
    }

    /// Fast retransmit resets the growth counters but does not shrink `cwnd`.
    pub fn on_fast_retransmit(&mut self) {
        self.acks_in_window = 0;
        self.acks_on_max_window = 0;
    }

    /// A timer-triggered retransmit resets the growth counters; like fast
    /// retransmit, it never touches `cwnd`/`ssthresh`.
    pub fn on_timer_retransmit(&mut self) {
        self.acks_in_window = 0;
        self.acks_on_max_window = 0;
    }

    pub fn on_ecn(&mut self) {
        self.ssthresh = self.cwnd.saturating_sub(1).max(1);
        self.cwnd = self.ssthresh.saturating_sub(1).max(1);
        self.acks_in_window = 0;
        self.acks_on_max_window = 0;
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::new()
    }
}
