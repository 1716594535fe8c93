//! Network emulator and receiver, hosted in one process: the receiver's
//! own GET/ACK traffic never leaves the process over a socket, it goes
//! straight into the emulator's client-side buffer, exactly as in the
//! reference implementation's single-process client.

use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use udp_reliable_transfer::cli::ClientArgs;
use udp_reliable_transfer::codec::{self, Message};
use udp_reliable_transfer::emulator::Emulator;
use udp_reliable_transfer::receiver::Receiver;

const MAX_DATAGRAM: usize = 2048;
const SOURCE_FILE: &str = "server_file.txt";
/// Extra rounds run after completion is detected, purely so a straggling
/// server retransmission still gets counted in the post-completion stat.
const GRACE_ROUNDS: u32 = 3;

fn main() -> Result<()> {
    let args = ClientArgs::parse();

    let bind_addr = SocketAddr::new(args.address, args.port);
    let socket =
        UdpSocket::bind(bind_addr).with_context(|| format!("binding UDP socket on {bind_addr}"))?;
    println!("client: listening on {bind_addr}");

    let server_addr: SocketAddr = args
        .server_address
        .parse()
        .with_context(|| format!("parsing --server-address '{}'", args.server_address))?;

    let queuing_delay = Duration::from_secs_f64(args.set_queue_delay.max(0.0));
    let token = bind_addr.to_string();

    let start = Instant::now();
    let mut emulator = Emulator::new(
        start,
        args.set_server_buffer_size,
        args.drop_client_packets,
        args.drop_server_packets,
        args.generate_three_dup_acks,
        args.set_server_buffer_size_changes,
    );
    let mut receiver = Receiver::new();
    receiver.start();

    emulator.push_client_datagram(Message::Get.encode(&token), bind_addr);

    let mut failed = false;
    let mut grace_rounds: Option<u32> = None;

    loop {
        receive_for_duration(&socket, queuing_delay, &mut emulator)?;

        let events = emulator.run_round(Instant::now());

        for datagram in &events.to_server {
            socket
                .send_to(datagram.as_bytes(), server_addr)
                .context("sending to server")?;
        }

        for datagram in &events.to_receiver {
            if let Some((_ecn, _token, message)) = codec::parse_strict(datagram) {
                match message {
                    Message::Data { seq, line, checksum } => {
                        let ack = receiver.on_data(seq, &line, &checksum);
                        emulator.push_client_datagram(ack.encode(&token), bind_addr);
                    }
                    Message::Fin => {
                        let ack = receiver.on_fin();
                        emulator.push_client_datagram(ack.encode(&token), bind_addr);
                    }
                    Message::TermAck => {
                        receiver.on_term_ack();
                    }
                    _ => {}
                }
            }
        }

        if events.failed {
            failed = true;
            break;
        }

        if receiver.is_done() && grace_rounds.is_none() {
            emulator.mark_complete();
            grace_rounds = Some(GRACE_ROUNDS);
        }
        if let Some(remaining) = grace_rounds {
            if remaining == 0 {
                break;
            }
            grace_rounds = Some(remaining - 1);
        }
    }

    let elapsed = start.elapsed();
    let stats = emulator.stats();

    if failed {
        std::fs::write(&args.output_file, "")
            .with_context(|| format!("emptying {}", args.output_file))?;
    } else {
        let content: String = receiver.received_lines().concat();
        std::fs::write(&args.output_file, content)
            .with_context(|| format!("writing {}", args.output_file))?;
    }

    let source_lines = std::fs::read_to_string(SOURCE_FILE)
        .ok()
        .map(|s| codec::split_lines_keeping_newline(&s))
        .unwrap_or_default();
    let diff_count = count_differing_lines(&source_lines, receiver.received_lines());

    println!("# Differing lines --> {diff_count}");
    println!("# ECN packets returned to server --> {}", stats.ecn_returned);
    println!(
        "# Total server datagrams received --> {}",
        stats.total_server_received
    );
    println!("# Round-trips to complete the flow --> {}", stats.round_trips);
    println!(
        "# Server datagrams received after completion --> {}",
        stats.server_received_after_completion
    );
    println!("# Total transfer time in seconds --> {:.3}", elapsed.as_secs_f64());

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

/// Simple line-by-line comparison, not a full diff: a boundary-stat helper,
/// not meant to reproduce `diff -y` semantics.
fn count_differing_lines(source: &[String], received: &[String]) -> usize {
    let max_len = source.len().max(received.len());
    (0..max_len)
        .filter(|&i| source.get(i) != received.get(i))
        .count()
}

fn receive_for_duration(
    socket: &UdpSocket,
    budget: Duration,
    emulator: &mut Emulator,
) -> Result<()> {
    let start = Instant::now();
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        let elapsed = start.elapsed();
        if elapsed >= budget {
            break;
        }
        let remaining = (budget - elapsed).max(Duration::from_millis(1));
        socket
            .set_read_timeout(Some(remaining))
            .context("setting socket read timeout")?;
        match socket.recv_from(&mut buf) {
            Ok((n, from)) => {
                let text = String::from_utf8_lossy(&buf[..n]).to_string();
                emulator.push_server_datagram(text, from);
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                break;
            }
            Err(e) => return Err(e).context("recv_from failed"),
        }
    }
    Ok(())
}
