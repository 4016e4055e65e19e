use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use tracing::Level;

use crate::capture::CaptureConfig;

/// Passive observer of SMC CLC handshakes on TCP connections.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Read packets from a capture file instead of a live interface.
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// The interface to listen on (default: first usable interface).
    #[arg(
        short = 'i',
        long = "iface",
        value_name = "IFACE",
        env = "SMCWATCH_IFACE"
    )]
    pub iface: Option<String>,

    /// Capture in promiscuous mode.
    #[arg(long, value_name = "BOOL", default_value_t = true, action = ArgAction::Set)]
    pub pcap_promisc: bool,

    /// Capture snapshot length in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = 2048)]
    pub pcap_snaplen: i32,

    /// Capture read timeout in milliseconds; 0 blocks forever.
    #[arg(long, value_name = "MS", default_value_t = 0)]
    pub pcap_timeout: i32,

    /// Stop after handling this many packets; 0 means unbounded.
    #[arg(long, value_name = "COUNT", default_value_t = 0)]
    pub pcap_maxpkts: usize,

    /// Stop after this many seconds of capture; 0 means unbounded.
    #[arg(long, value_name = "SECONDS", default_value_t = 0)]
    pub pcap_maxtime: u64,

    /// BPF filter expression applied to the capture.
    #[arg(long, value_name = "BPF")]
    pub pcap_filter: Option<String>,

    /// Print reserved values in messages.
    #[arg(long, value_name = "BOOL", default_value_t = false, action = ArgAction::Set)]
    pub show_reserved: bool,

    /// Prefix transcript lines with timestamps.
    #[arg(long, value_name = "BOOL", default_value_t = true, action = ArgAction::Set)]
    pub show_timestamps: bool,

    /// Print message hex dumps.
    #[arg(long, value_name = "BOOL", default_value_t = false, action = ArgAction::Set)]
    pub show_hex: bool,

    /// Serve output over HTTP on this listen address (e.g. "0.0.0.0:8000").
    #[arg(long, value_name = "ADDR", env = "SMCWATCH_HTTP")]
    pub http: Option<String>,

    /// Set the application's log level (e.g. "debug", "warn").
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        env = "SMCWATCH_LOG_LEVEL",
        default_value = "info",
        value_parser = parse_level
    )]
    pub log_level: Level,
}

fn parse_level(value: &str) -> Result<Level, String> {
    value.parse::<Level>().map_err(|e| e.to_string())
}

impl Cli {
    /// The capture source settings from the pcap flag group.
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            file: self.file.clone(),
            iface: self.iface.clone(),
            promisc: self.pcap_promisc,
            snaplen: self.pcap_snaplen,
            timeout_ms: self.pcap_timeout,
            filter: self.pcap_filter.clone(),
        }
    }

    /// The wall-clock capture bound, if one was set.
    pub fn max_time(&self) -> Option<Duration> {
        (self.pcap_maxtime > 0).then(|| Duration::from_secs(self.pcap_maxtime))
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser as _;

    use super::Cli;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["smcwatch"]).unwrap();
        assert!(cli.file.is_none());
        assert!(cli.iface.is_none());
        assert!(cli.pcap_promisc);
        assert_eq!(cli.pcap_snaplen, 2048);
        assert_eq!(cli.pcap_timeout, 0);
        assert_eq!(cli.pcap_maxpkts, 0);
        assert!(cli.max_time().is_none());
        assert!(cli.pcap_filter.is_none());
        assert!(!cli.show_reserved);
        assert!(cli.show_timestamps);
        assert!(!cli.show_hex);
        assert!(cli.http.is_none());
    }

    #[test]
    fn parses_capture_flags() {
        let cli = Cli::try_parse_from([
            "smcwatch",
            "-f",
            "capture.pcap",
            "--pcap-filter",
            "tcp and port 123",
            "--pcap-maxpkts",
            "10",
            "--pcap-maxtime",
            "5",
        ])
        .unwrap();
        let config = cli.capture_config();
        assert_eq!(config.file.unwrap().to_str(), Some("capture.pcap"));
        assert_eq!(config.filter.as_deref(), Some("tcp and port 123"));
        assert_eq!(cli.pcap_maxpkts, 10);
        assert_eq!(cli.max_time(), Some(std::time::Duration::from_secs(5)));
    }

    #[test]
    fn parses_display_flags() {
        let cli = Cli::try_parse_from([
            "smcwatch",
            "--show-timestamps",
            "false",
            "--show-reserved",
            "true",
            "--show-hex",
            "true",
        ])
        .unwrap();
        assert!(!cli.show_timestamps);
        assert!(cli.show_reserved);
        assert!(cli.show_hex);
    }

    #[test]
    fn parses_http_address() {
        let cli = Cli::try_parse_from(["smcwatch", "--http", "127.0.0.1:8000"]).unwrap();
        assert_eq!(cli.http.as_deref(), Some("127.0.0.1:8000"));
    }

    #[test]
    fn rejects_bad_log_level() {
        assert!(Cli::try_parse_from(["smcwatch", "--log-level", "noisy"]).is_err());
    }
}
