//! Line-oriented text connection to the sensor bridge.
//!
//! The bridge streams one decimal reading per line and accepts three command
//! lines: `START`, `STOP` and `RESET`.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::runtime::MonitorEvent;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum UpstreamCommand {
    #[strum(serialize = "START")]
    Start,
    #[strum(serialize = "STOP")]
    Stop,
    #[strum(serialize = "RESET")]
    Reset,
}

/// Where the engine sends its control commands
pub trait CommandSink: Send {
    fn send(&mut self, cmd: UpstreamCommand);
}

/// Drops every command; used when running without a bridge
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl CommandSink for NullSink {
    fn send(&mut self, cmd: UpstreamCommand) {
        debug!("offline, dropping {cmd}");
    }
}

/// Keeps every command it was given, shared between clones
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<UpstreamCommand>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<UpstreamCommand> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl CommandSink for RecordingSink {
    fn send(&mut self, cmd: UpstreamCommand) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(cmd);
        }
    }
}

/// Write half of the TCP connection
#[derive(Debug)]
pub struct TcpCommandSink {
    stream: TcpStream,
}

impl CommandSink for TcpCommandSink {
    fn send(&mut self, cmd: UpstreamCommand) {
        let line = format!("{cmd}\n");
        if let Err(e) = self
            .stream
            .write_all(line.as_bytes())
            .and_then(|_| self.stream.flush())
        {
            warn!("failed to send {cmd} upstream: {e}");
        }
    }
}

/// An open connection to the bridge
#[derive(Debug)]
pub struct Upstream {
    addr: String,
    stream: TcpStream,
}

impl Upstream {
    pub fn connect(addr: &str) -> Result<Self> {
        let socket_addr = addr
            .to_socket_addrs()
            .map_err(|e| Error::Connection {
                addr: addr.to_string(),
                source: e,
            })?
            .next()
            .ok_or_else(|| Error::Connection {
                addr: addr.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "address did not resolve",
                ),
            })?;

        let stream =
            TcpStream::connect_timeout(&socket_addr, CONNECT_TIMEOUT).map_err(|e| {
                Error::Connection {
                    addr: addr.to_string(),
                    source: e,
                }
            })?;
        stream.set_nodelay(true)?;
        info!("connected to upstream {addr}");

        Ok(Self {
            addr: addr.to_string(),
            stream,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Split into the command writer and a reader thread that forwards every
    /// received line as a `MonitorEvent::Message`.
    pub fn split(self, tx: Sender<MonitorEvent>) -> Result<TcpCommandSink> {
        let read_half = self.stream.try_clone()?;
        spawn_reader(read_half, tx);
        Ok(TcpCommandSink {
            stream: self.stream,
        })
    }
}

/// Forward lines from any reader until EOF or error, then report the
/// disconnect once.
pub fn spawn_reader<R>(reader: R, tx: Sender<MonitorEvent>) -> thread::JoinHandle<()>
where
    R: std::io::Read + Send + 'static,
{
    thread::spawn(move || {
        let reader = BufReader::new(reader);
        for line in reader.lines() {
            match line {
                Ok(line) => {
                    if tx.send(MonitorEvent::Message(line)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!("upstream read failed: {e}");
                    break;
                }
            }
        }
        info!("upstream closed");
        let _ = tx.send(MonitorEvent::Disconnected);
    })
}
