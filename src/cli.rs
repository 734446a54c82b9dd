use crate::http::Level;
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;

/// httpcap: print the HTTP/1.x exchanges seen on the wire
#[derive(Parser, Debug, Default)]
#[command(name = "httpcap", version, about)]
pub struct Cli {
    /// Path to a TOML config file; flags given here override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Network interface to capture on ("any" captures on all of them)
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Read packets from a pcap file instead of capturing live
    #[arg(short = 'r', long)]
    pub file: Option<PathBuf>,

    /// Extra BPF expression, ANDed with the generated "tcp" filter
    #[arg(long)]
    pub bpf: Option<String>,

    /// Only connections with this ip:port ("10.0.0.1:80", ":8080", "[::1]:80")
    #[arg(long, value_parser = parse_endpoint_filter)]
    pub filter: Option<EndpointFilter>,

    /// Only connections with this IP on either side
    #[arg(long)]
    pub ip: Option<IpAddr>,

    /// Only connections with this port on either side
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Only requests whose Host matches (suffix match, or * and ? wildcards)
    #[arg(long)]
    pub host: Option<String>,

    /// Only requests whose URI matches (substring match, or * and ? wildcards)
    #[arg(long)]
    pub uri: Option<String>,

    /// Only responses with these status codes, e.g. "200:300-399"
    #[arg(long)]
    pub status: Option<String>,

    /// How much of each exchange to print
    #[arg(short, long, value_enum)]
    pub level: Option<Level>,

    /// Write transcripts to this file instead of stdout
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Also print each request as a curl command
    #[arg(long, overrides_with = "no_curl")]
    pub curl: bool,

    #[arg(long, hide = true, overrides_with = "curl")]
    pub no_curl: bool,

    /// Pretty-print JSON bodies
    #[arg(long, overrides_with = "no_pretty")]
    pub pretty: bool,

    #[arg(long, hide = true, overrides_with = "pretty")]
    pub no_pretty: bool,

    /// Print bodies of unrecognized content types
    #[arg(long, overrides_with = "no_force")]
    pub force: bool,

    #[arg(long, hide = true, overrides_with = "force")]
    pub no_force: bool,

    /// Largest body, in bytes, kept for display at --level all
    #[arg(long)]
    pub max_body: Option<usize>,

    /// Capture in promiscuous mode
    #[arg(long, overrides_with = "no_promiscuous")]
    pub promiscuous: bool,

    #[arg(long, hide = true, overrides_with = "promiscuous")]
    pub no_promiscuous: bool,

    /// Snapshot length (max bytes per packet to capture)
    #[arg(short, long)]
    pub snaplen: Option<i32>,

    /// Read timeout in milliseconds for the capture handle
    #[arg(short = 't', long)]
    pub timeout_ms: Option<i32>,

    /// Flush connections idle for this many seconds
    #[arg(long)]
    pub idle_secs: Option<u64>,

    /// Stop after this many packets (0 = unlimited)
    #[arg(short = 'c', long)]
    pub count: Option<u64>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// List available network interfaces and exit
    #[arg(long)]
    pub list_interfaces: bool,
}

/// `--filter` value: either half may be left out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointFilter {
    pub ip: Option<IpAddr>,
    pub port: Option<u16>,
}

fn parse_endpoint_filter(s: &str) -> Result<EndpointFilter, String> {
    let s = s.trim();
    let (ip, port) = if let Some(rest) = s.strip_prefix('[') {
        let (ip, rest) = rest
            .split_once(']')
            .ok_or_else(|| format!("missing ']' in {:?}", s))?;
        (ip, rest.strip_prefix(':').unwrap_or(rest))
    } else if s.matches(':').count() > 1 {
        // Bare IPv6 address without a port.
        (s, "")
    } else {
        match s.split_once(':') {
            Some((ip, port)) => (ip, port),
            None if s.parse::<IpAddr>().is_ok() => (s, ""),
            None => ("", s),
        }
    };

    let ip = match ip {
        "" => None,
        ip => Some(ip.parse::<IpAddr>().map_err(|e| format!("bad ip {:?}: {}", ip, e))?),
    };
    let port = match port {
        "" => None,
        port => Some(port.parse::<u16>().map_err(|e| format!("bad port {:?}: {}", port, e))?),
    };
    if ip.is_none() && port.is_none() {
        return Err("expected ip:port, ip or :port".into());
    }
    Ok(EndpointFilter { ip, port })
}
