//! Packet admission and the capture event loop.
//!
//! Every captured packet is parsed down to TCP; a flow is admitted to
//! reassembly when the segment carries the SMC TCP option or the flow is
//! already in the table. The loop multiplexes the packet channel against a
//! one-minute flush tick and enforces the optional packet-count and
//! wall-clock bounds.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use tokio::{signal, sync::mpsc, time};
use tracing::debug;

use crate::{
    assemble::Assembler,
    capture::CapturedPacket,
    flow::FlowTable,
    packet::{LinkKind, parser},
    sink::Sink,
};

/// Streams idle longer than this are flushed by the timer tick.
const FLUSH_AGE: Duration = Duration::from_secs(60);

/// Interval of the flush tick.
const FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// Inspects captured packets and drives the reassembler.
pub struct PacketHandler {
    link: LinkKind,
    assembler: Assembler,
    flows: Arc<FlowTable>,
    sink: Arc<Sink>,
    /// Stop after this many packets; 0 means unbounded.
    max_packets: usize,
    /// Stop after this much wall-clock time.
    max_time: Option<Duration>,
}

impl PacketHandler {
    pub fn new(
        link: LinkKind,
        assembler: Assembler,
        flows: Arc<FlowTable>,
        sink: Arc<Sink>,
        max_packets: usize,
        max_time: Option<Duration>,
    ) -> Self {
        PacketHandler {
            link,
            assembler,
            flows,
            sink,
            max_packets,
            max_time,
        }
    }

    /// Handles one captured packet: parse, admit, reassemble.
    ///
    /// Non-TCP and malformed packets are ignored.
    pub fn handle_packet(&mut self, data: &[u8], ts: SystemTime) {
        let pkt = match parser::parse_packet(self.link, data) {
            Ok(pkt) => pkt,
            Err(e) => {
                debug!("ignoring packet: {e}");
                return;
            }
        };

        if pkt.smc_option || self.flows.contains(&pkt.net, &pkt.transport) {
            self.flows.add(pkt.net, pkt.transport);
            self.assembler.push(&pkt, ts);
        }
    }

    /// Flushes streams idle for at least a minute and reports the counts.
    pub fn handle_timer(&mut self) {
        let cutoff = SystemTime::now() - FLUSH_AGE;
        let (flushed, closed) = self.assembler.flush_older_than(cutoff);
        if flushed > 0 {
            self.sink
                .print_line(&format!("Timer: flushed {flushed}, closed {closed} connections"));
        }
    }

    /// Runs the capture loop until the source drains, a bound is reached or
    /// the process is interrupted, then lets the framers finish.
    pub async fn run(mut self, mut packets: mpsc::Receiver<CapturedPacket>) {
        let mut ticker = time::interval_at(time::Instant::now() + FLUSH_INTERVAL, FLUSH_INTERVAL);
        let deadline = self.max_time.map(|max| time::Instant::now() + max);
        let mut count = 0usize;

        loop {
            tokio::select! {
                packet = packets.recv() => {
                    let Some(packet) = packet else { break };
                    self.handle_packet(&packet.data, packet.ts);
                    count += 1;
                    if self.max_packets > 0 && count >= self.max_packets {
                        debug!("capture packet limit reached");
                        break;
                    }
                }
                _ = ticker.tick() => self.handle_timer(),
                _ = wait_until(deadline) => {
                    debug!("capture time limit reached");
                    break;
                }
                _ = signal::ctrl_c() => {
                    debug!("interrupted");
                    break;
                }
            }
        }

        self.finish().await;
    }

    /// Closes all streams and waits for the framer tasks to drain.
    pub async fn finish(mut self) {
        self.assembler.close_all();
        self.assembler.join_all().await;
    }
}

async fn wait_until(deadline: Option<time::Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
