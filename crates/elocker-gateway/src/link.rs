//! Byte links between tokio tasks and blocking serial ports.
//!
//! A [`Link`] is a pair of channels. Inbound bytes arrive as chunks on
//! `chunks` in the order they were read; outbound writes go through a
//! cloneable [`LinkWriter`] and are acknowledged once the port accepted
//! them. For a serial port one reader thread and one writer thread sit
//! behind the channels.

use bytes::Bytes;
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace};

use crate::error::TransportError;

const CHANNEL_CAPACITY: usize = 64;
const READ_BUFFER_SIZE: usize = 256;

/// Blocking read timeout; bounds how long the reader takes to notice shutdown.
const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// One outbound write and its acknowledgement.
#[derive(Debug)]
pub struct WriteRequest {
    pub bytes: Bytes,
    pub ack: oneshot::Sender<Result<(), TransportError>>,
}

/// Sending half of a link.
#[derive(Debug, Clone)]
pub struct LinkWriter {
    tx: mpsc::Sender<WriteRequest>,
}

impl LinkWriter {
    pub fn new(tx: mpsc::Sender<WriteRequest>) -> Self {
        Self { tx }
    }

    /// Write `bytes` and wait until the port has taken them.
    pub async fn write(&self, bytes: impl Into<Bytes>) -> Result<(), TransportError> {
        let (ack, done) = oneshot::channel();
        let request = WriteRequest {
            bytes: bytes.into(),
            ack,
        };
        self.tx
            .send(request)
            .await
            .map_err(|_| TransportError::Closed)?;
        done.await.map_err(|_| TransportError::Closed)?
    }
}

/// Both halves of a byte link.
#[derive(Debug)]
pub struct Link {
    pub writer: LinkWriter,
    pub chunks: mpsc::Receiver<Bytes>,
}

impl Link {
    pub fn into_parts(self) -> (LinkWriter, mpsc::Receiver<Bytes>) {
        (self.writer, self.chunks)
    }

    /// In-memory link plus the device side of it.
    pub fn pair(capacity: usize) -> (Link, DeviceEnd) {
        let (write_tx, requests) = mpsc::channel(capacity);
        let (inbound, chunks) = mpsc::channel(capacity);
        let link = Link {
            writer: LinkWriter::new(write_tx),
            chunks,
        };
        (link, DeviceEnd { requests, inbound })
    }
}

/// Device side of an in-memory [`Link`].
#[derive(Debug)]
pub struct DeviceEnd {
    pub requests: mpsc::Receiver<WriteRequest>,
    pub inbound: mpsc::Sender<Bytes>,
}

impl DeviceEnd {
    /// Accept the next write and return its bytes.
    pub async fn next_write(&mut self) -> Option<Bytes> {
        let request = self.requests.recv().await?;
        let _ = request.ack.send(Ok(()));
        Some(request.bytes)
    }

    /// Reject the next write with an I/O error.
    pub async fn fail_next_write(&mut self) -> Option<Bytes> {
        let request = self.requests.recv().await?;
        let _ = request
            .ack
            .send(Err(std::io::Error::other("device unplugged").into()));
        Some(request.bytes)
    }

    /// Deliver bytes as if read from the device.
    pub async fn send(&self, bytes: impl Into<Bytes>) -> bool {
        self.inbound.send(bytes.into()).await.is_ok()
    }
}

/// Open a serial port and bridge it into tokio.
///
/// `name` labels the I/O threads and log lines.
pub fn open_serial(name: &'static str, path: &str, baud_rate: u32) -> Result<Link, TransportError> {
    let port = serialport::new(path, baud_rate)
        .timeout(READ_TIMEOUT)
        .open()?;
    let reader = port.try_clone()?;

    info!(link = name, port = path, baud_rate, "Opened serial port");

    let (chunk_tx, chunks) = mpsc::channel(CHANNEL_CAPACITY);
    let (write_tx, write_rx) = mpsc::channel(CHANNEL_CAPACITY);

    std::thread::Builder::new()
        .name(format!("{name}-reader"))
        .spawn(move || read_loop(name, reader, chunk_tx))?;
    std::thread::Builder::new()
        .name(format!("{name}-writer"))
        .spawn(move || write_loop(name, port, write_rx))?;

    Ok(Link {
        writer: LinkWriter::new(write_tx),
        chunks,
    })
}

fn read_loop(name: &'static str, mut port: Box<dyn SerialPort>, chunks: mpsc::Sender<Bytes>) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        match port.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                trace!(link = name, len = n, "Read chunk");
                if chunks.blocking_send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                if chunks.is_closed() {
                    break;
                }
            }
            Err(e) => {
                error!(link = name, error = %e, "Serial read failed");
                break;
            }
        }
    }
    debug!(link = name, "Reader stopped");
}

fn write_loop(
    name: &'static str,
    mut port: Box<dyn SerialPort>,
    mut requests: mpsc::Receiver<WriteRequest>,
) {
    while let Some(request) = requests.blocking_recv() {
        let result = port
            .write_all(&request.bytes)
            .and_then(|()| port.flush())
            .map_err(TransportError::from);
        if let Err(e) = &result {
            error!(link = name, error = %e, "Serial write failed");
        }
        let _ = request.ack.send(result);
    }
    debug!(link = name, "Writer stopped");
}
