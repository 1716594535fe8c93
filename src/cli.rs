//! Shared CLI argument definitions for the `sender` and `client` binaries:
//! `clap` derive structs plus the IP/port range validators both need.

use clap::Parser;
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};

const PORT_MIN: u16 = 32768;
const PORT_MAX: u16 = 61000;

/// Validates a dotted-quad IPv4 address for `--address`.
pub fn parse_ipv4(s: &str) -> Result<IpAddr, String> {
    let octets: Vec<&str> = s.split('.').collect();
    if octets.len() != 4 {
        return Err(format!("'{s}' is not a dotted-quad IPv4 address"));
    }
    let mut parsed = [0u8; 4];
    for (i, octet) in octets.iter().enumerate() {
        let n: u16 = octet
            .parse()
            .map_err(|_| format!("'{octet}' is not a valid octet in '{s}'"))?;
        if n > 255 {
            return Err(format!("octet '{octet}' in '{s}' is out of range 0-255"));
        }
        parsed[i] = n as u8;
    }
    Ok(IpAddr::V4(Ipv4Addr::new(
        parsed[0], parsed[1], parsed[2], parsed[3],
    )))
}

/// Validates a port for `--port`, in the ephemeral range this protocol uses.
pub fn parse_port(s: &str) -> Result<u16, String> {
    let port: u16 = s.parse().map_err(|_| format!("'{s}' is not a valid port"))?;
    if !(PORT_MIN..=PORT_MAX).contains(&port) {
        return Err(format!(
            "port {port} is out of range [{PORT_MIN}, {PORT_MAX}]"
        ));
    }
    Ok(port)
}

/// Parses a comma-separated list of 1-based packet indices, e.g. `"2,5,9"`.
pub fn parse_index_list(s: &str) -> Result<HashSet<usize>, String> {
    if s.is_empty() {
        return Ok(HashSet::new());
    }
    s.split(',')
        .map(|part| {
            part.trim()
                .parse::<usize>()
                .map_err(|_| format!("'{part}' is not a valid packet index"))
        })
        .collect()
}

/// Parses a buffer-size-change schedule, e.g. `"-1@3,2@7"` — at the 3rd round
/// containing a server packet, shrink capacity by 1; at the 7th, grow it by 2.
pub fn parse_resize_schedule(s: &str) -> Result<HashMap<usize, i64>, String> {
    if s.is_empty() {
        return Ok(HashMap::new());
    }
    let mut schedule = HashMap::new();
    for part in s.split(',') {
        let (delta, round) = part
            .trim()
            .split_once('@')
            .ok_or_else(|| format!("'{part}' is not of the form DELTA@ROUND"))?;
        let delta: i64 = delta
            .parse()
            .map_err(|_| format!("'{delta}' is not a valid delta"))?;
        let round: usize = round
            .parse()
            .map_err(|_| format!("'{round}' is not a valid round number"))?;
        schedule.insert(round, delta);
    }
    Ok(schedule)
}

#[derive(Parser, Debug)]
#[command(version, about = "Network emulator and receiver for the reliable UDP file transfer")]
pub struct ClientArgs {
    #[arg(short, long, default_value = "127.0.0.1", value_parser = parse_ipv4)]
    pub address: IpAddr,

    #[arg(short, long, default_value_t = 40023, value_parser = parse_port)]
    pub port: u16,

    #[arg(long, default_value = "127.0.0.1:50023")]
    pub server_address: String,

    #[arg(long, default_value = "client_file.txt")]
    pub output_file: String,

    #[arg(long, default_value = "", value_parser = parse_index_list)]
    pub drop_client_packets: HashSet<usize>,

    #[arg(long, default_value = "", value_parser = parse_index_list)]
    pub drop_server_packets: HashSet<usize>,

    #[arg(long, default_value = "", value_parser = parse_index_list)]
    pub generate_three_dup_acks: HashSet<usize>,

    #[arg(long, default_value_t = 0.1)]
    pub set_queue_delay: f64,

    #[arg(long)]
    pub set_server_buffer_size: Option<usize>,

    #[arg(long, default_value = "", value_parser = parse_resize_schedule)]
    pub set_server_buffer_size_changes: HashMap<usize, i64>,
}

#[derive(Parser, Debug)]
#[command(version, about = "Congestion-controlled sender for the reliable UDP file transfer")]
pub struct SenderArgs {
    #[arg(short, long, default_value = "127.0.0.1", value_parser = parse_ipv4)]
    pub address: IpAddr,

    #[arg(short, long, default_value_t = 50023, value_parser = parse_port)]
    pub port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_rejects_out_of_range_octet() {
        assert!(parse_ipv4("1.2.3.256").is_err());
    }

    #[test]
    fn port_rejects_outside_ephemeral_range() {
        assert!(parse_port("80").is_err());
        assert!(parse_port("40023").is_ok());
    }

    #[test]
    fn empty_index_list_parses_to_empty_set() {
        assert_eq!(parse_index_list("").unwrap(), HashSet::new());
    }

    #[test]
    fn index_list_parses_comma_separated_values() {
        let parsed = parse_index_list("2,5,9").unwrap();
        assert_eq!(parsed, HashSet::from([2, 5, 9]));
    }

    #[test]
    fn resize_schedule_maps_round_to_delta() {
        let parsed = parse_resize_schedule("-1@3,2@7").unwrap();
        assert_eq!(parsed.get(&3), Some(&-1));
        assert_eq!(parsed.get(&7), Some(&2));
    }
}
