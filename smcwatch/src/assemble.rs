//! Bounded TCP reassembly for handshake streams.
//!
//! The assembler turns admitted TCP segments into per-direction in-order
//! byte streams. Each direction gets a pipe: the assembler owns the write
//! half, a spawned framer task owns the read half and sees end-of-stream
//! when the write half is dropped. Out-of-order segments are parked in a
//! bounded map; a stream that outgrows its bound is dropped rather than
//! allowed to grow, since everything we care about fits in the first couple
//! of kilobytes of a connection.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::SystemTime,
};

use bytes::Bytes;
use tokio::{
    io::{AsyncRead, ReadBuf},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::debug;

use crate::flow::{FlowTable, NetFlow, TransportFlow};
use crate::packet::TcpPacket;
use crate::sink::Sink;
use crate::stream::ClcStream;

/// Chunks buffered in a pipe before the writer considers the reader stuck.
const PIPE_CAPACITY: usize = 128;

/// Upper bound on out-of-order bytes parked per direction.
const MAX_PENDING_BYTES: usize = 64 * 1024;

/// One direction of one TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub net: NetFlow,
    pub transport: TransportFlow,
}

/// Creates a byte pipe between the assembler and a framer task.
pub fn stream_pipe() -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(PIPE_CAPACITY);
    (
        PipeWriter { tx },
        PipeReader {
            rx,
            pending: Bytes::new(),
        },
    )
}

/// Write half of a stream pipe. Dropping it signals end-of-stream.
#[derive(Debug)]
pub struct PipeWriter {
    tx: mpsc::Sender<Bytes>,
}

impl PipeWriter {
    /// Queues bytes without blocking; false means the pipe is full or the
    /// reader is gone and the stream should be dropped.
    pub fn send(&self, data: Bytes) -> bool {
        self.tx.try_send(data).is_ok()
    }
}

/// Read half of a stream pipe; yields queued bytes in order and
/// end-of-stream once the writer is dropped.
#[derive(Debug)]
pub struct PipeReader {
    rx: mpsc::Receiver<Bytes>,
    pending: Bytes,
}

impl AsyncRead for PipeReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.pending.is_empty() {
                let n = this.pending.len().min(buf.remaining());
                buf.put_slice(&this.pending.split_to(n));
                return Poll::Ready(Ok(()));
            }
            match this.rx.poll_recv(cx) {
                Poll::Ready(Some(bytes)) => this.pending = bytes,
                Poll::Ready(None) => return Poll::Ready(Ok(())), // end of stream
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

struct StreamState {
    writer: PipeWriter,
    /// Initial sequence number; offsets below are relative to it.
    isn: u32,
    /// Relative offset of the next in-order byte.
    next: u32,
    /// Out-of-order segments keyed by relative offset.
    pending: BTreeMap<u32, Bytes>,
    pending_bytes: usize,
    /// Relative offset of the FIN, once seen.
    fin: Option<u32>,
    last_seen: SystemTime,
}

/// Reassembles admitted segments into per-direction streams and spawns one
/// framer task per direction.
pub struct Assembler {
    streams: HashMap<StreamKey, StreamState>,
    flows: Arc<FlowTable>,
    sink: Arc<Sink>,
    tasks: Vec<JoinHandle<()>>,
}

impl Assembler {
    pub fn new(flows: Arc<FlowTable>, sink: Arc<Sink>) -> Self {
        Assembler {
            streams: HashMap::new(),
            flows,
            sink,
            tasks: Vec::new(),
        }
    }

    /// Feeds one admitted TCP segment into its stream, creating the stream
    /// and its framer task on first contact.
    pub fn push(&mut self, pkt: &TcpPacket, ts: SystemTime) {
        let key = StreamKey {
            net: pkt.net,
            transport: pkt.transport,
        };

        if !self.streams.contains_key(&key) {
            let (writer, reader) = stream_pipe();
            let framer = ClcStream::new(pkt.net, pkt.transport, reader);
            let sink = Arc::clone(&self.sink);
            let flows = Arc::clone(&self.flows);
            let (net, transport) = (pkt.net, pkt.transport);
            self.tasks.push(tokio::spawn(async move {
                framer.run(sink).await;
                // stream completion releases the flow-table entry
                flows.del(&net, &transport);
            }));

            // a SYN consumes one sequence number; without one we picked the
            // stream up mid-flight and data starts right here
            let isn = if pkt.syn {
                pkt.seq.wrapping_add(1)
            } else {
                pkt.seq
            };
            self.streams.insert(
                key,
                StreamState {
                    writer,
                    isn,
                    next: 0,
                    pending: BTreeMap::new(),
                    pending_bytes: 0,
                    fin: None,
                    last_seen: ts,
                },
            );
        }

        let Some(state) = self.streams.get_mut(&key) else {
            return;
        };
        state.last_seen = ts;

        let mut healthy = true;
        if !pkt.payload.is_empty() {
            let mut rel = pkt.seq.wrapping_sub(state.isn);
            if pkt.syn {
                rel = rel.wrapping_add(1);
            }
            healthy = state.accept(rel, pkt.payload.clone());
        }

        if pkt.fin {
            let mut end = pkt.seq.wrapping_sub(state.isn);
            if pkt.syn {
                end = end.wrapping_add(1);
            }
            state.fin = Some(end.wrapping_add(pkt.payload.len() as u32));
        }

        let finished = state.fin.is_some_and(|fin| state.next >= fin);
        if !healthy || finished || pkt.rst {
            self.streams.remove(&key);
        }
    }

    /// Force-closes streams without activity since `cutoff`.
    ///
    /// Returns the number of flushed directions and of distinct connections
    /// closed as a result.
    pub fn flush_older_than(&mut self, cutoff: SystemTime) -> (usize, usize) {
        let idle: Vec<StreamKey> = self
            .streams
            .iter()
            .filter(|(_, state)| state.last_seen < cutoff)
            .map(|(key, _)| *key)
            .collect();

        let mut connections = HashSet::new();
        for key in &idle {
            self.streams.remove(key);
            connections.insert(connection_id(key));
        }
        (idle.len(), connections.len())
    }

    /// Closes every stream; framers see end-of-stream and drain.
    pub fn close_all(&mut self) {
        self.streams.clear();
    }

    /// Waits for all spawned framer tasks to finish.
    pub async fn join_all(&mut self) {
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

impl StreamState {
    /// Places `data` at relative offset `rel`, delivering everything that
    /// became contiguous. Returns false when the stream must be dropped.
    fn accept(&mut self, rel: u32, data: Bytes) -> bool {
        if !self.deliver(rel, data) {
            return false;
        }

        // drain parked segments that the new data made contiguous
        while let Some((&first, _)) = self.pending.first_key_value() {
            if first > self.next {
                break;
            }
            let Some((rel, data)) = self.pending.pop_first() else {
                break;
            };
            self.pending_bytes -= data.len();
            if !self.deliver(rel, data) {
                return false;
            }
        }
        true
    }

    fn deliver(&mut self, rel: u32, mut data: Bytes) -> bool {
        if rel > self.next {
            // a gap: park the segment, within bounds
            self.pending_bytes += data.len();
            if self.pending_bytes > MAX_PENDING_BYTES {
                debug!("dropping stream: out-of-order buffer exhausted");
                return false;
            }
            if let Some(old) = self.pending.insert(rel, data) {
                self.pending_bytes -= old.len();
            }
            return true;
        }

        // retransmission or overlap: keep only the unseen tail
        let already = (self.next - rel) as usize;
        if already >= data.len() {
            return true;
        }
        let fresh = data.split_off(already);
        self.next = self.next.wrapping_add(fresh.len() as u32);
        if !self.writer.send(fresh) {
            debug!("dropping stream: framer not keeping up");
            return false;
        }
        true
    }
}

/// Canonical bidirectional identity of a connection, used only for
/// counting: both directions of one TCP connection map to the same id.
fn connection_id(key: &StreamKey) -> (NetFlow, TransportFlow) {
    let a = (key.net.src, key.transport.src);
    let b = (key.net.dst, key.transport.dst);
    if a <= b {
        (key.net, key.transport)
    } else {
        (
            NetFlow {
                src: key.net.dst,
                dst: key.net.src,
            },
            TransportFlow {
                src: key.transport.dst,
                dst: key.transport.src,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::sink::{Output, SharedBuffer};

    fn decode_hex(s: &str) -> Vec<u8> {
        let clean: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        (0..clean.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&clean[i..i + 2], 16).unwrap())
            .collect()
    }

    fn decline_bytes() -> Vec<u8> {
        decode_hex("e2d4c3d904001c10 2525252525252500 03030000 00000000 e2d4c3d9")
    }

    fn test_assembler() -> (Assembler, Arc<FlowTable>, SharedBuffer) {
        let flows = Arc::new(FlowTable::new());
        let buffer = SharedBuffer::new();
        let sink = Arc::new(Sink::new(
            Output::Buffer(buffer.clone()),
            false,
            false,
            false,
        ));
        (Assembler::new(Arc::clone(&flows), sink), flows, buffer)
    }

    fn segment(seq: u32, syn: bool, fin: bool, payload: &[u8]) -> TcpPacket {
        TcpPacket {
            net: NetFlow {
                src: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
                dst: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            },
            transport: TransportFlow {
                src: 12345,
                dst: 45678,
            },
            seq,
            syn,
            ack: !syn,
            fin,
            rst: false,
            smc_option: syn,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    #[tokio::test]
    async fn pipe_delivers_in_order_and_signals_eof() {
        let (writer, mut reader) = stream_pipe();
        assert!(writer.send(Bytes::from_static(b"hello ")));
        assert!(writer.send(Bytes::from_static(b"world")));
        drop(writer);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello world");
    }

    #[tokio::test]
    async fn in_order_segments_decode() {
        let (mut assembler, _, buffer) = test_assembler();
        let now = SystemTime::now();

        assembler.push(&segment(100, true, false, &[]), now);
        let msg = decline_bytes();
        assembler.push(&segment(101, false, false, &msg), now);
        assembler.push(&segment(101 + msg.len() as u32, false, true, &[]), now);

        assembler.join_all().await;
        let out = String::from_utf8(buffer.snapshot()).unwrap();
        assert_eq!(out.lines().count(), 1);
        assert!(out.contains("Decline: Eyecatcher: SMC-R"));
    }

    #[tokio::test]
    async fn out_of_order_segments_are_reordered() {
        let (mut assembler, _, buffer) = test_assembler();
        let now = SystemTime::now();
        let msg = decline_bytes();
        let (first, second) = msg.split_at(10);

        assembler.push(&segment(100, true, false, &[]), now);
        // second half arrives first
        assembler.push(&segment(111, false, false, second), now);
        assembler.push(&segment(101, false, false, first), now);
        assembler.push(&segment(101 + msg.len() as u32, false, true, &[]), now);

        assembler.join_all().await;
        let out = String::from_utf8(buffer.snapshot()).unwrap();
        assert!(out.contains("Decline: Eyecatcher: SMC-R"));
    }

    #[tokio::test]
    async fn retransmissions_are_deduplicated() {
        let (mut assembler, _, buffer) = test_assembler();
        let now = SystemTime::now();
        let msg = decline_bytes();

        assembler.push(&segment(100, true, false, &[]), now);
        assembler.push(&segment(101, false, false, &msg), now);
        // full retransmission of the same segment
        assembler.push(&segment(101, false, false, &msg), now);
        assembler.push(&segment(101 + msg.len() as u32, false, true, &[]), now);

        assembler.join_all().await;
        let out = String::from_utf8(buffer.snapshot()).unwrap();
        assert_eq!(out.lines().count(), 1);
    }

    #[tokio::test]
    async fn fin_completion_releases_flow_entry() {
        let (mut assembler, flows, _) = test_assembler();
        let now = SystemTime::now();
        let pkt = segment(100, true, false, &[]);
        flows.add(pkt.net, pkt.transport);

        assembler.push(&pkt, now);
        assembler.push(&segment(101, false, true, &[]), now);

        assembler.join_all().await;
        assert!(!flows.contains(&pkt.net, &pkt.transport));
    }

    #[tokio::test]
    async fn flush_closes_idle_streams() {
        let (mut assembler, _, buffer) = test_assembler();
        let old = SystemTime::now() - Duration::from_secs(120);

        assembler.push(&segment(100, true, false, &[]), old);
        let msg = decline_bytes();
        assembler.push(&segment(101, false, false, &msg), old);

        let cutoff = SystemTime::now() - Duration::from_secs(60);
        let (flushed, closed) = assembler.flush_older_than(cutoff);
        assert_eq!(flushed, 1);
        assert_eq!(closed, 1);
        assert!(assembler.flush_older_than(cutoff) == (0, 0));

        // the delivered bytes were still decoded before the close
        assembler.join_all().await;
        let out = String::from_utf8(buffer.snapshot()).unwrap();
        assert!(out.contains("Decline:"));
    }

    #[tokio::test]
    async fn both_directions_of_a_connection_count_once() {
        let (mut assembler, _, _) = test_assembler();
        let old = SystemTime::now() - Duration::from_secs(120);

        let fwd = segment(100, true, false, &[]);
        let mut rev = segment(200, true, false, &[]);
        rev.transport = TransportFlow {
            src: 45678,
            dst: 12345,
        };

        assembler.push(&fwd, old);
        assembler.push(&rev, old);

        let cutoff = SystemTime::now() - Duration::from_secs(60);
        let (flushed, closed) = assembler.flush_older_than(cutoff);
        assert_eq!(flushed, 2);
        assert_eq!(closed, 1);
        assembler.close_all();
        assembler.join_all().await;
    }
}
