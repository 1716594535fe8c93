//! Reliable, congestion-controlled file transfer over UDP.
//!
//! The crate is split into small, socket-free modules so the hard parts —
//! congestion control, RTO estimation, retransmission timers, and the wire
//! codec — can be unit tested without a network stack attached. The two
//! binaries (`sender`, `client`) own all the actual socket and file I/O and
//! wire these modules together into the two OS processes the protocol runs
//! as.

pub mod cli;
pub mod codec;
pub mod congestion;
pub mod controller;
pub mod emulator;
pub mod packet_buffer;
pub mod receiver;
pub mod rtt;
pub mod timers;
