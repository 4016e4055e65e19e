//! Rendering sink: the single writer behind stdout or the HTTP buffer.
//!
//! Rendering is deterministic and depends only on three mode flags. Writers
//! always produce one complete line (plus optional hex dump) per call, so
//! concurrent framers never interleave partial lines.

use std::{
    fmt::Write as _,
    io::Write as _,
    sync::{Arc, Mutex},
};

use chrono::Local;
use clc_types::ClcMessage;

use crate::flow::{NetFlow, TransportFlow};

/// A growable output buffer shared between the sink and the HTTP server.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends bytes to the buffer.
    pub fn write(&self, bytes: &[u8]) {
        self.inner.lock().unwrap().extend_from_slice(bytes);
    }

    /// Returns a copy of the current contents.
    pub fn snapshot(&self) -> Vec<u8> {
        self.inner.lock().unwrap().clone()
    }

    /// Clears the buffer.
    pub fn reset(&self) {
        self.inner.lock().unwrap().clear();
    }
}

/// Where rendered lines go.
#[derive(Debug, Clone)]
pub enum Output {
    Stdout,
    Buffer(SharedBuffer),
}

/// Formats decoded messages and writes them to the output.
#[derive(Debug)]
pub struct Sink {
    output: Output,
    show_timestamps: bool,
    show_reserved: bool,
    show_hex: bool,
}

impl Sink {
    pub fn new(output: Output, show_timestamps: bool, show_reserved: bool, show_hex: bool) -> Self {
        Sink {
            output,
            show_timestamps,
            show_reserved,
            show_hex,
        }
    }

    /// Prints one transcript line for a decoded message, with the optional
    /// timestamp prefix and hex dump suffix.
    pub fn print_message(&self, net: &NetFlow, transport: &TransportFlow, msg: &ClcMessage) {
        let mut line = String::new();
        if self.show_timestamps {
            let _ = write!(line, "{}", Local::now().format("%H:%M:%S%.6f "));
        }
        let _ = writeln!(
            line,
            "{}:{} -> {}:{}: {}",
            net.src,
            transport.src,
            net.dst,
            transport.dst,
            msg.to_line(self.show_reserved)
        );
        if self.show_hex {
            line.push_str(&msg.dump());
        }
        self.write(line.as_bytes());
    }

    /// Prints a status line (startup banner, timer notices) verbatim.
    pub fn print_line(&self, text: &str) {
        self.write(format!("{text}\n").as_bytes());
    }

    fn write(&self, bytes: &[u8]) {
        match &self.output {
            Output::Stdout => {
                let mut stdout = std::io::stdout().lock();
                if let Err(e) = stdout.write_all(bytes).and_then(|()| stdout.flush()) {
                    eprintln!("error writing output: {e}");
                }
            }
            Output::Buffer(buffer) => buffer.write(bytes),
        }
    }
}
