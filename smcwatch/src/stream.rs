//! Per-direction CLC stream framer.
//!
//! One framer task consumes the reassembled byte stream of one flow
//! direction and emits decoded CLC messages in wire order. The scratch
//! buffer holds two maximum-size messages; a handshake never needs more,
//! and whatever follows it is data traffic the framer does not decode.

use std::sync::Arc;

use clc_types::{
    ClcMessage, HEADER_LEN, Header, HeaderError, MAX_MESSAGE_SIZE, MessageKind, dispatch, hex_dump,
};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use crate::flow::{NetFlow, TransportFlow};
use crate::sink::Sink;

/// Scratch buffer size: room for two maximum-size CLC messages per
/// flow/direction.
pub const CLC_MESSAGE_BUF_SIZE: usize = MAX_MESSAGE_SIZE as usize * 2;

/// Framer over one direction of a reassembled TCP stream.
pub struct ClcStream<R> {
    net: NetFlow,
    transport: TransportFlow,
    reader: R,
}

impl<R: AsyncRead + Unpin> ClcStream<R> {
    pub fn new(net: NetFlow, transport: TransportFlow, reader: R) -> Self {
        ClcStream {
            net,
            transport,
            reader,
        }
    }

    /// Runs the framing loop until end-of-stream or a framing error.
    ///
    /// `skip` marks the end of the region the next step needs: first a
    /// header preview, then the full body of the previewed message, then
    /// the next header. It grows strictly monotonically, so the loop
    /// terminates on every finite input.
    pub async fn run(mut self, sink: Arc<Sink>) {
        let mut buf = vec![0u8; CLC_MESSAGE_BUF_SIZE];
        let mut skip = HEADER_LEN;
        let mut total = 0usize;
        let mut eof = false;
        let mut pending: Option<(Header, MessageKind)> = None;

        loop {
            // fill the scratch buffer until the current target is reached
            while total < skip && !eof {
                match self.reader.read(&mut buf[total..]).await {
                    Ok(0) => eof = true,
                    Ok(n) => total += n,
                    Err(e) => {
                        warn!("error reading stream: {e}");
                        eof = true;
                    }
                }
            }

            // a previewed header whose body is now fully buffered
            if let Some((header, kind)) = pending.take() {
                let length = header.length as usize;
                if let Some(msg) = ClcMessage::parse(header, kind, &buf[skip - length..skip]) {
                    sink.print_message(&self.net, &self.transport, &msg);
                }
                // wait for the next handshake message
                skip += HEADER_LEN;
                continue;
            }

            // not enough data left for another header: done
            if total < skip {
                break;
            }

            // preview the next header
            let header = match Header::decode(&buf[skip - HEADER_LEN..skip]) {
                Ok(header) => header,
                Err(HeaderError::InvalidEyecatcher) => {
                    // ordinary post-handshake bytes, nothing to report
                    debug!("stream leaves CLC framing");
                    break;
                }
                Err(e) => {
                    warn!(
                        "error parsing CLC header: {e}\n{}",
                        hex_dump(&buf[skip - HEADER_LEN..skip])
                    );
                    break;
                }
            };
            let Some(kind) = dispatch(&header) else {
                warn!(
                    "unknown CLC message type\n{}",
                    hex_dump(&buf[skip - HEADER_LEN..skip])
                );
                break;
            };

            // advance to the end of the message so it can be decoded whole
            let length = header.length as usize;
            if skip + length - HEADER_LEN > buf.len() {
                debug!("CLC scratch buffer exhausted");
                break;
            }
            skip += length - HEADER_LEN;
            pending = Some((header, kind));
        }

        // discard everything after the handshake
        let mut scrap = [0u8; 1024];
        while !eof {
            match self.reader.read(&mut scrap).await {
                Ok(0) | Err(_) => eof = true,
                Ok(_) => {}
            }
        }
    }
}
