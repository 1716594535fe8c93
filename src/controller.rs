//! Sender congestion controller and retransmission engine.
//!
//! All congestion/timer/RTT state lives behind this one `Controller`; no
//! field of it is touched except through `on_get`/`on_ack`/`on_ecn`/
//! `on_ack_fin`/`on_timer`. That makes the single-threaded event loop in
//! `bin/sender.rs` the only caller that ever needs to reason about ordering.

use std::collections::HashMap;
use std::time::Instant;

use crate::codec::{self, Message};
use crate::congestion;
use crate::rtt;
use crate::timers::TimerTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Active,
}

#[derive(Debug)]
pub struct Controller {
    state: State,
    token: String,
    lines: Vec<String>,
    checksums: Vec<String>,
    n: usize,
    window: congestion::Window,
    rtt: rtt::Estimator,
    timers: TimerTable,
    last_ack: i64,
    last_sent: i64,
    dup_ack_count: u32,
    time_sent: HashMap<i64, Instant>,
    timer_in_flight: u32,
}

impl Controller {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            token: String::new(),
            lines: Vec::new(),
            checksums: Vec::new(),
            n: 0,
            window: congestion::Window::new(),
            rtt: rtt::Estimator::new(),
            timers: TimerTable::new(),
            last_ack: -1,
            last_sent: -1,
            dup_ack_count: 0,
            time_sent: HashMap::new(),
            timer_in_flight: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == State::Active
    }

    /// Number of data segments in the current (or most recent) transfer —
    /// the FIN sentinel sits at this index.
    pub fn segment_count(&self) -> usize {
        self.n
    }

    /// Begin a transfer. A `GET` while already active is ignored — this
    /// spec's Non-goals exclude concurrent/duplicate transfers, so guarding
    /// here is the safer reading even though the reference implementation
    /// never bothered to check.
    pub fn on_get(&mut self, token: String, lines: Vec<String>, now: Instant) -> Vec<String> {
        if self.state != State::Idle {
            return Vec::new();
        }
        self.state = State::Active;
        self.token = token;
        self.checksums = lines.iter().map(|l| codec::checksum(l)).collect();
        self.n = lines.len();
        self.lines = lines;
        self.window = congestion::Window::new();
        self.rtt = rtt::Estimator::new();
        self.timers = TimerTable::new();
        self.last_ack = -1;
        self.last_sent = -1;
        self.dup_ack_count = 0;
        self.time_sent.clear();
        self.timer_in_flight = 0;

        let mut out = Vec::new();
        self.fill_window(now, &mut out);
        out
    }

    pub fn on_ack(&mut self, n: i64, now: Instant) -> Vec<String> {
        if self.state != State::Active {
            return Vec::new();
        }
        // Unconditional, per this spec's explicit step ordering: even a
        // duplicate ACK's (stale) time_sent entry gets sampled here. The
        // reference implementation only does this on the non-duplicate
        // branch; this spec moves it ahead of the duplicate check instead.
        self.timer_in_flight = 0;
        self.timers.cancel_up_to(n);
        if let Some(&sent_at) = self.time_sent.get(&n) {
            let sample = now.duration_since(sent_at).as_secs_f64();
            self.rtt.sample(sample);
        }

        let mut out = Vec::new();
        if n == self.last_ack {
            self.dup_ack_count += 1;
            if self.dup_ack_count == 2 {
                // Fast retransmit: rewind and refill, cwnd untouched.
                self.last_sent = n;
                self.last_ack = n - 1;
                self.window.on_fast_retransmit();
                self.dup_ack_count = 0;
                self.fill_window(now, &mut out);
            }
        } else if n > self.last_ack {
            self.dup_ack_count = 0;
            self.last_ack = n;
            self.window.on_new_ack();
            self.fill_window(now, &mut out);
        }
        out
    }

    /// React to an ECN-stamped datagram echoed back by the emulator.
    /// `echoed_seq` is the sequence number the emulator's ECN tag referred
    /// to (N for a dropped FIN, N+1 for a dropped TERM-ACK).
    pub fn on_ecn(&mut self, echoed_seq: i64, now: Instant) -> Vec<String> {
        if self.state != State::Active {
            return Vec::new();
        }
        self.window.on_ecn();
        self.last_sent = echoed_seq - 1;

        let mut out = Vec::new();
        let budget = (self.window.cwnd as i64 - self.timer_in_flight as i64).max(0);
        for i in 0..budget {
            let seq = echoed_seq + i;
            if seq > self.n as i64 {
                break;
            }
            self.last_sent = seq;
            self.send_segment(seq, now, &mut out);
        }
        out
    }

    pub fn on_ack_fin(&mut self, now: Instant) -> Vec<String> {
        let _ = now;
        if self.state == State::Idle {
            return Vec::new();
        }
        self.state = State::Idle;
        self.timers.cancel_all();
        vec![Message::TermAck.encode(&self.token)]
    }

    /// Drain and dispatch every timer due at or before `now`.
    pub fn poll_timers(&mut self, now: Instant) -> Vec<String> {
        let mut out = Vec::new();
        while let Some((seq, _generation)) = self.timers.pop_due(now) {
            out.extend(self.on_timer_fired(seq, now));
        }
        out
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    fn on_timer_fired(&mut self, seq: i64, now: Instant) -> Vec<String> {
        if seq <= self.last_ack {
            return Vec::new();
        }
        self.window.on_timer_retransmit();
        self.last_sent = self.last_sent.max(seq);
        self.timer_in_flight += 1;
        let mut out = Vec::new();
        self.send_segment(seq, now, &mut out);
        out
    }

    fn fill_window(&mut self, now: Instant, out: &mut Vec<String>) {
        while self.last_sent + 1 <= self.n as i64
            && self.last_sent < self.last_ack + self.window.cwnd as i64
        {
            let seq = self.last_sent + 1;
            self.last_sent = seq;
            self.send_segment(seq, now, out);
        }
    }

    /// Encode and queue one segment (data or FIN). Schedules a timer and
    /// nudges `rto` for data segments only; the FIN send does neither.
    fn send_segment(&mut self, seq: i64, now: Instant, out: &mut Vec<String>) {
        let message = if seq == self.n as i64 {
            Message::Fin
        } else {
            Message::Data {
                seq,
                line: self.lines[seq as usize].clone(),
                checksum: self.checksums[seq as usize].clone(),
            }
        };
        out.push(message.encode(&self.token));

        if seq < self.n as i64 {
            self.time_sent.insert(seq, now);
            self.timers.schedule(seq, now + self.rtt.rto());
            self.rtt.nudge();
        }
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}
