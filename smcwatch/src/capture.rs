//! Packet capture sources.
//!
//! Live interfaces and capture files both feed the pipeline through a
//! bounded channel of raw packets. The libpcap read loop is blocking, so it
//! runs on its own thread; dropping the receiving end stops it.

use std::{
    path::PathBuf,
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use pcap::{Activated, Capture};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::packet::LinkKind;

/// Packets queued between the capture thread and the handler task.
const CHANNEL_CAPACITY: usize = 1024;

/// Capture setup from the command line.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Read from this file instead of a live interface.
    pub file: Option<PathBuf>,
    /// Live capture interface; `None` picks the first usable one.
    pub iface: Option<String>,
    pub promisc: bool,
    pub snaplen: i32,
    /// Read timeout in milliseconds; 0 blocks forever.
    pub timeout_ms: i32,
    /// BPF filter expression.
    pub filter: Option<String>,
}

/// Errors that can occur while setting up a capture source
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No usable interface and none was named
    #[error("no usable capture interface found")]
    NoDevice,

    /// Failed to open the device or file
    #[error("failed to open capture on {target}: {source}")]
    Open {
        target: String,
        #[source]
        source: pcap::Error,
    },

    /// The BPF filter did not compile
    #[error("invalid capture filter {filter:?}: {source}")]
    Filter {
        filter: String,
        #[source]
        source: pcap::Error,
    },

    /// The source uses a link layer the parser does not speak
    #[error("unsupported link type {0}")]
    UnsupportedLinkType(i32),
}

/// One captured packet with its capture timestamp.
#[derive(Debug, Clone)]
pub struct CapturedPacket {
    pub ts: SystemTime,
    pub data: Vec<u8>,
}

/// A running capture feeding the packet channel.
pub struct CaptureSource {
    pub link: LinkKind,
    /// Startup line announcing the source.
    pub banner: String,
    pub packets: mpsc::Receiver<CapturedPacket>,
}

/// Opens the configured capture source and starts its read thread.
///
/// A capture file takes precedence over a live interface.
pub fn start(config: &CaptureConfig) -> Result<CaptureSource, CaptureError> {
    if let Some(path) = &config.file {
        let target = path.display().to_string();
        let capture = Capture::from_file(path).map_err(|source| CaptureError::Open {
            target: target.clone(),
            source,
        })?;
        activate(
            capture,
            format!("Reading packets from file {target}:"),
            config,
        )
    } else {
        let device = match &config.iface {
            Some(name) => name.clone(),
            None => default_device()?,
        };
        let capture = Capture::from_device(device.as_str())
            .and_then(|inactive| {
                inactive
                    .promisc(config.promisc)
                    .snaplen(config.snaplen)
                    .timeout(config.timeout_ms)
                    .open()
            })
            .map_err(|source| CaptureError::Open {
                target: device.clone(),
                source,
            })?;
        activate(capture, format!("Listening on interface {device}:"), config)
    }
}

fn activate<T: Activated + Send + 'static>(
    mut capture: Capture<T>,
    banner: String,
    config: &CaptureConfig,
) -> Result<CaptureSource, CaptureError> {
    if let Some(filter) = &config.filter {
        capture
            .filter(filter, true)
            .map_err(|source| CaptureError::Filter {
                filter: filter.clone(),
                source,
            })?;
    }

    let link = link_kind(capture.get_datalink())?;
    let (tx, packets) = mpsc::channel(CHANNEL_CAPACITY);
    thread::spawn(move || read_loop(capture, tx));

    Ok(CaptureSource {
        link,
        banner,
        packets,
    })
}

fn link_kind(linktype: pcap::Linktype) -> Result<LinkKind, CaptureError> {
    match linktype.0 {
        0 => Ok(LinkKind::Null),
        1 => Ok(LinkKind::Ethernet),
        12 | 101 => Ok(LinkKind::Raw),
        113 => Ok(LinkKind::LinuxSll),
        other => Err(CaptureError::UnsupportedLinkType(other)),
    }
}

/// Picks the first interface that is up, not loopback and has an address.
fn default_device() -> Result<String, CaptureError> {
    let interfaces = pnet::datalink::interfaces();
    interfaces
        .iter()
        .find(|iface| iface.is_up() && !iface.is_loopback() && !iface.ips.is_empty())
        .or_else(|| interfaces.first())
        .map(|iface| iface.name.clone())
        .ok_or(CaptureError::NoDevice)
}

fn read_loop<T: Activated>(mut capture: Capture<T>, tx: mpsc::Sender<CapturedPacket>) {
    loop {
        match capture.next_packet() {
            Ok(packet) => {
                let header = *packet.header;
                let ts = UNIX_EPOCH
                    + Duration::new(
                        header.ts.tv_sec.max(0) as u64,
                        (header.ts.tv_usec.max(0) as u32).saturating_mul(1000),
                    );
                let captured = CapturedPacket {
                    ts,
                    data: packet.data.to_vec(),
                };
                if tx.blocking_send(captured).is_err() {
                    // the handler is gone
                    break;
                }
            }
            Err(pcap::Error::TimeoutExpired) => continue,
            Err(pcap::Error::NoMorePackets) => {
                debug!("capture drained");
                break;
            }
            Err(e) => {
                warn!("capture read error: {e}");
                break;
            }
        }
    }
}
