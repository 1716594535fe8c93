//! The receiver's application logic: validate sequence, deliver in order,
//! acknowledge. Lives as a small collaborator rather than inside the
//! network emulator because its ACK semantics are a hard contract with the
//! sender controller on the other end of the wire.

use crate::codec::{self, Message};

#[derive(Debug)]
pub struct Receiver {
    last_ack: i64,
    lines: Vec<String>,
    done: bool,
}

impl Receiver {
    pub fn new() -> Self {
        Self {
            last_ack: -1,
            lines: Vec::new(),
            done: false,
        }
    }

    /// Reset receiver state for a new transfer.
    pub fn start(&mut self) {
        self.last_ack = -1;
        self.lines.clear();
        self.done = false;
    }

    /// Process one data segment, returning the cumulative ACK to send.
    pub fn on_data(&mut self, seq: i64, line: &str, checksum: &str) -> Message {
        if seq == self.last_ack + 1 && codec::checksum(line) == checksum {
            self.lines.push(line.to_string());
            self.last_ack = seq;
        }
        Message::Ack { n: self.last_ack }
    }

    pub fn on_fin(&mut self) -> Message {
        Message::AckFin
    }

    pub fn on_term_ack(&mut self) {
        self.done = true;
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn last_ack(&self) -> i64 {
        self.last_ack
    }

    pub fn received_lines(&self) -> &[String] {
        &self.lines
    }
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new()
    }
}
