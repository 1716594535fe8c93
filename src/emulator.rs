//! Network emulator: per-round buffered forwarding between the sender
//! process and the in-process receiver, ECN stamping on overflow, and
//! deterministic fault injection (drop lists, synthesized triple ACKs).
//!
//! The receiver's own GET/ACK traffic never touches a socket — it is pushed
//! straight into the client-side buffer — so the only datagrams this module
//! ever actually reads off the wire are server-origin ones. That collapses
//! the reference implementation's per-direction receive threads into a
//! single round loop the `client` binary drives.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::packet_buffer::PacketBuffer;

const MAX_IDLE_RETRANSMITS: u32 = 5;
const IDLE_RETRANSMIT_INTERVAL: Duration = Duration::from_secs(2);
/// Stand-in for "unlimited": large enough that no real transfer saturates it.
const UNBOUNDED_CAPACITY: usize = 1_000_000_000;

#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub ecn_returned: u64,
    pub total_server_received: u64,
    pub round_trips: u64,
    pub server_received_after_completion: u64,
}

#[derive(Debug, Default)]
pub struct RoundEvents {
    /// Datagrams to actually send over UDP to the sender process.
    pub to_server: Vec<String>,
    /// Datagrams to deliver in-process to the receiver.
    pub to_receiver: Vec<String>,
    /// `true` once `MAX_IDLE_RETRANSMITS` consecutive idle rounds have
    /// elapsed with no response: the transfer is a hard failure.
    pub failed: bool,
}

pub struct Emulator {
    client_buffer: PacketBuffer,
    server_buffer: PacketBuffer,
    drop_client: HashSet<usize>,
    drop_server: HashSet<usize>,
    triple_ack: HashSet<usize>,
    resize_schedule: HashMap<usize, i64>,

    client_seen: usize,
    forwarded_count: usize,
    server_seen: usize,
    server_packet_rounds: usize,

    idle_deadline: Instant,
    idle_rounds: u32,
    last_client_datagram: Option<String>,
    completed: bool,
    /// Set once some round has had a client-origin datagram to dequeue (the
    /// initial `GET` counts). Mirrors the reference implementation's
    /// `transmission_started`, which gates `total_rounds` so the very first,
    /// GET-only round never counts as a round-trip.
    transmission_started: bool,

    stats: Stats,
}

impl Emulator {
    pub fn new(
        now: Instant,
        server_buffer_capacity: Option<usize>,
        drop_client: HashSet<usize>,
        drop_server: HashSet<usize>,
        triple_ack: HashSet<usize>,
        resize_schedule: HashMap<usize, i64>,
    ) -> Self {
        Self {
            client_buffer: PacketBuffer::new(UNBOUNDED_CAPACITY),
            server_buffer: PacketBuffer::new(server_buffer_capacity.unwrap_or(UNBOUNDED_CAPACITY)),
            drop_client,
            drop_server,
            triple_ack,
            resize_schedule,
            client_seen: 0,
            forwarded_count: 0,
            server_seen: 0,
            server_packet_rounds: 0,
            idle_deadline: now + IDLE_RETRANSMIT_INTERVAL,
            idle_rounds: 0,
            last_client_datagram: None,
            completed: false,
            transmission_started: false,
            stats: Stats::default(),
        }
    }

    /// Enqueue a client-origin datagram (GET, or an ACK the receiver just
    /// produced) for the next round's client-buffer drain.
    pub fn push_client_datagram(&mut self, datagram: String, from: std::net::SocketAddr) {
        self.client_buffer.enqueue(datagram, from);
    }

    /// Enqueue a server-origin datagram actually received off the UDP socket.
    pub fn push_server_datagram(&mut self, datagram: String, from: std::net::SocketAddr) {
        self.server_buffer.enqueue(datagram, from);
    }

    pub fn mark_complete(&mut self) {
        self.completed = true;
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Run one round: drain the client buffer (fully, before the server
    /// buffer), then the server buffer, applying drop lists, triple-ACK
    /// synthesis, ECN reflection, buffer resizing, and idle-retransmit
    /// bookkeeping.
    pub fn run_round(&mut self, now: Instant) -> RoundEvents {
        // Matches the reference's `if transmission_started: total_rounds +=
        // 1`: the round that only forwards the initial GET doesn't count,
        // and once the transfer has completed no further (grace) round
        // counts either.
        if self.transmission_started && !self.completed {
            self.stats.round_trips += 1;
        }
        let client_had_items = !self.client_buffer.is_empty();
        let server_had_items = !self.server_buffer.is_empty();
        if client_had_items {
            self.transmission_started = true;
        }

        let mut events = RoundEvents::default();
        let forwarded_any_client = self.drain_client(&mut events);
        if forwarded_any_client {
            self.idle_deadline = now + IDLE_RETRANSMIT_INTERVAL;
        }

        let delivered_nonecn = self.drain_server(&mut events);
        if delivered_nonecn {
            self.server_packet_rounds += 1;
            self.idle_rounds = 0;
            if let Some(delta) = self.resize_schedule.remove(&self.server_packet_rounds) {
                self.server_buffer.resize(delta);
            }
        }

        if !client_had_items && !server_had_items && now >= self.idle_deadline {
            if let Some(last) = self.last_client_datagram.clone() {
                // Re-enqueue for the next round's client drain, exactly like
                // any other client-origin datagram.
                let placeholder_addr: std::net::SocketAddr = "127.0.0.1:0".parse().unwrap();
                self.client_buffer.enqueue(last, placeholder_addr);
            }
            self.idle_rounds += 1;
            self.idle_deadline = now + IDLE_RETRANSMIT_INTERVAL;
            if self.idle_rounds >= MAX_IDLE_RETRANSMITS {
                events.failed = true;
            }
        }

        events
    }

    fn drain_client(&mut self, events: &mut RoundEvents) -> bool {
        let entries: Vec<_> = self.client_buffer.drain().collect();
        let mut forwarded_any = false;
        for entry in entries {
            self.client_seen += 1;
            if self.drop_client.contains(&self.client_seen) {
                continue;
            }
            self.forwarded_count += 1;
            forwarded_any = true;
            self.last_client_datagram = Some(entry.datagram.clone());

            if entry.datagram.contains("ACK") && self.triple_ack.contains(&self.forwarded_count) {
                for _ in 0..3 {
                    events.to_server.push(entry.datagram.clone());
                }
                self.forwarded_count += 2;
                // Faithful to the reference implementation's per-round loop:
                // any remaining client-buffer entries already drained this
                // round are simply discarded, not carried over.
                break;
            }
            events.to_server.push(entry.datagram);
        }
        forwarded_any
    }

    fn drain_server(&mut self, events: &mut RoundEvents) -> bool {
        let entries: Vec<_> = self.server_buffer.drain().collect();
        let mut delivered_any = false;
        // Counts entries processed so far *this round* that survived the
        // ECN/drop-list checks — it advances the lookahead index for every
        // subsequent entry in the same round, not just the first.
        let mut curr_forwarded = 0usize;
        for entry in entries {
            if entry.ecn {
                events.to_server.push(entry.datagram);
                self.stats.ecn_returned += 1;
                if self.completed {
                    self.stats.server_received_after_completion += 1;
                } else {
                    self.stats.total_server_received += 1;
                }
                continue;
            }
            self.server_seen += 1;
            // Dropped-by-list packets are excluded from the total: the
            // reference's `tot_srv_packets += 1` sits after the `if not
            // data: continue` that models this drop, so only the ECN,
            // triple-ack-drop, and delivered paths count.
            if self.drop_server.contains(&self.server_seen) {
                continue;
            }
            if self.completed {
                self.stats.server_received_after_completion += 1;
            } else {
                self.stats.total_server_received += 1;
            }
            let lookahead = self.forwarded_count + 1 + curr_forwarded;
            curr_forwarded += 1;
            if self.triple_ack.contains(&lookahead) {
                continue;
            }
            events.to_receiver.push(entry.datagram);
            delivered_any = true;
        }
        delivered_any
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> std::net::SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn drop_client_list_silently_discards_by_one_based_index() {
        let mut drop = HashSet::new();
        drop.insert(1);
        let mut e = Emulator::new(Instant::now(), None, drop, HashSet::new(), HashSet::new(), HashMap::new());
        e.push_client_datagram("[1.2.3.4:1] GET".to_string(), addr());
        let events = e.run_round(Instant::now());
        assert!(events.to_server.is_empty());
    }

    #[test]
    fn ecn_flagged_server_entries_are_reflected_not_delivered() {
        let mut e = Emulator::new(Instant::now(), Some(1), HashSet::new(), HashSet::new(), HashSet::new(), HashMap::new());
        e.push_server_datagram("[1.2.3.4:1] 0:a\n|cs".to_string(), addr());
        e.push_server_datagram("[1.2.3.4:1] 1:b\n|cs".to_string(), addr());
        let events = e.run_round(Instant::now());
        assert_eq!(events.to_receiver.len(), 1);
        assert_eq!(events.to_server.len(), 1);
        assert!(events.to_server[0].starts_with("ECN dropped "));
        assert_eq!(e.stats().ecn_returned, 1);
        // The ECN-reflected entry counts toward the total as well as the
        // delivered one: total_server_received = 2.
        assert_eq!(e.stats().total_server_received, 2);
    }

    #[test]
    fn dropped_server_packets_are_excluded_from_the_total() {
        let mut drop = HashSet::new();
        drop.insert(2);
        let mut e = Emulator::new(Instant::now(), None, HashSet::new(), drop, HashSet::new(), HashMap::new());
        e.push_server_datagram("[1.2.3.4:1] 0:a\n|cs".to_string(), addr());
        e.push_server_datagram("[1.2.3.4:1] 1:b\n|cs".to_string(), addr());
        e.push_server_datagram("[1.2.3.4:1] 2:c\n|cs".to_string(), addr());
        let events = e.run_round(Instant::now());
        // server-seen index 2 (the second datagram) is on the drop list and
        // must not be counted toward the total, unlike an ECN reflection.
        assert_eq!(events.to_receiver.len(), 2);
        assert_eq!(e.stats().total_server_received, 2);
    }

    #[test]
    fn triple_ack_lookahead_advances_per_entry_within_a_round() {
        // Two non-ECN server datagrams land in the same round; the trigger
        // set targets only the second one's round-local lookahead index.
        let mut triple = HashSet::new();
        triple.insert(2);
        let mut e = Emulator::new(Instant::now(), None, HashSet::new(), HashSet::new(), triple, HashMap::new());
        e.push_server_datagram("[1.2.3.4:1] 0:a\n|cs".to_string(), addr());
        e.push_server_datagram("[1.2.3.4:1] 1:b\n|cs".to_string(), addr());
        let events = e.run_round(Instant::now());
        assert_eq!(events.to_receiver.len(), 1);
        assert!(events.to_receiver[0].contains("0:a"));
    }

    #[test]
    fn triple_ack_trigger_tees_three_copies_and_stops_the_round() {
        let mut triple = HashSet::new();
        triple.insert(1);
        let mut e = Emulator::new(Instant::now(), None, HashSet::new(), HashSet::new(), triple, HashMap::new());
        e.push_client_datagram("[1.2.3.4:1] ACK 0".to_string(), addr());
        e.push_client_datagram("[1.2.3.4:1] ACK 1".to_string(), addr());
        let events = e.run_round(Instant::now());
        assert_eq!(events.to_server.len(), 3);
        assert!(events.to_server.iter().all(|m| m.ends_with("ACK 0")));
    }

    #[test]
    fn round_trips_skips_the_get_only_round_and_freezes_after_completion() {
        let start = Instant::now();
        let mut e = Emulator::new(start, None, HashSet::new(), HashSet::new(), HashSet::new(), HashMap::new());
        // Round 1: only the initial GET is in the client buffer. Per the
        // reference's `transmission_started` gate, this round doesn't count.
        e.push_client_datagram("[1.2.3.4:1] GET".to_string(), addr());
        e.run_round(start);
        assert_eq!(e.stats().round_trips, 0);

        // Round 2 onward counts normally.
        e.run_round(start);
        assert_eq!(e.stats().round_trips, 1);
        e.run_round(start);
        assert_eq!(e.stats().round_trips, 2);

        // Once the transfer is marked complete, further (grace) rounds must
        // not add to round_trips.
        e.mark_complete();
        e.run_round(start);
        e.run_round(start);
        assert_eq!(e.stats().round_trips, 2);
    }

    #[test]
    fn buffer_resize_schedule_applies_once_by_round_count() {
        let mut schedule = HashMap::new();
        schedule.insert(1, -1i64);
        let mut e = Emulator::new(Instant::now(), Some(2), HashSet::new(), HashSet::new(), HashSet::new(), schedule);
        e.push_server_datagram("[1.2.3.4:1] 0:a\n|cs".to_string(), addr());
        e.run_round(Instant::now());
        assert_eq!(e.server_buffer.capacity(), 1);
    }

    #[test]
    fn idle_rounds_eventually_fail_the_transfer() {
        let start = Instant::now();
        let mut e = Emulator::new(start, None, HashSet::new(), HashSet::new(), HashSet::new(), HashMap::new());
        e.push_client_datagram("[1.2.3.4:1] GET".to_string(), addr());
        let mut now = start;
        // First round forwards the GET and resets the idle deadline.
        e.run_round(now);
        let mut failed = false;
        for _ in 0..(MAX_IDLE_RETRANSMITS + 1) {
            now += IDLE_RETRANSMIT_INTERVAL + Duration::from_millis(1);
            let events = e.run_round(now);
            if events.failed {
                failed = true;
                break;
            }
        }
        assert!(failed);
    }
}
