//! Congestion-controlled sender: reads `server_file.txt`, binds a UDP
//! socket, and drives the `Controller` state machine from a single
//! event-loop thread — no locks, since nothing else ever touches its state.

use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use udp_reliable_transfer::cli::SenderArgs;
use udp_reliable_transfer::codec::{self, Message};
use udp_reliable_transfer::controller::Controller;

const SOURCE_FILE: &str = "server_file.txt";
const MIN_POLL: Duration = Duration::from_millis(1);
const DEFAULT_POLL: Duration = Duration::from_millis(200);
const MAX_DATAGRAM: usize = 2048;

fn main() -> Result<()> {
    let args = SenderArgs::parse();

    let content = std::fs::read_to_string(SOURCE_FILE)
        .with_context(|| format!("reading {SOURCE_FILE}"))?;
    let lines = codec::split_lines_keeping_newline(&content);
    println!("sender: loaded {} lines from {SOURCE_FILE}", lines.len());

    let bind_addr = SocketAddr::new(args.address, args.port);
    let socket = UdpSocket::bind(bind_addr)
        .with_context(|| format!("binding UDP socket on {bind_addr}"))?;
    println!("sender: listening on {bind_addr}");

    let mut controller = Controller::new();
    let mut peer: Option<SocketAddr> = None;
    let mut buf = [0u8; MAX_DATAGRAM];

    loop {
        let timeout = controller
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(DEFAULT_POLL)
            .max(MIN_POLL);
        socket
            .set_read_timeout(Some(timeout))
            .context("setting socket read timeout")?;

        match socket.recv_from(&mut buf) {
            Ok((n, from)) => {
                peer = Some(from);
                let text = String::from_utf8_lossy(&buf[..n]);
                if let Some((ecn, token, message)) = codec::parse_loose(&text) {
                    let now = Instant::now();
                    let outbound = if ecn {
                        let echoed = echoed_seq(&message, controller.segment_count());
                        controller.on_ecn(echoed, now)
                    } else {
                        dispatch(&mut controller, token, &lines, message, now)
                    };
                    send_all(&socket, from, &outbound)?;
                }
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => return Err(e).context("recv_from failed"),
        }

        let fired = controller.poll_timers(Instant::now());
        if !fired.is_empty() {
            if let Some(peer) = peer {
                send_all(&socket, peer, &fired)?;
            }
        }
    }
}

fn dispatch(
    controller: &mut Controller,
    token: String,
    lines: &[String],
    message: Message,
    now: Instant,
) -> Vec<String> {
    match message {
        Message::Get => {
            println!("sender: GET from {token}, starting transfer");
            controller.on_get(token, lines.to_vec(), now)
        }
        Message::Ack { n } => controller.on_ack(n, now),
        Message::AckFin => controller.on_ack_fin(now),
        // Data/Fin/TermAck never arrive un-ECN'd at the sender — it only
        // ever originates those itself.
        _ => Vec::new(),
    }
}

/// Recover the sequence number an ECN reflection refers to: the emulator
/// echoes the sender's own datagram verbatim, so the embedded `seq` is
/// right there for data, and FIN/TERM-ACK map to the two sentinel indices
/// just past the last real segment.
fn echoed_seq(message: &Message, n: usize) -> i64 {
    match message {
        Message::Data { seq, .. } => *seq,
        Message::Fin => n as i64,
        Message::TermAck => n as i64 + 1,
        _ => n as i64,
    }
}

fn send_all(socket: &UdpSocket, to: SocketAddr, datagrams: &[String]) -> Result<()> {
    for datagram in datagrams {
        socket
            .send_to(datagram.as_bytes(), to)
            .with_context(|| format!("sending to {to}"))?;
    }
    Ok(())
}
