//! Line-oriented serial transport.
//!
//! A reader task owns the byte stream and pushes one [`TransportEvent::Line`] per
//! newline-terminated line onto a bounded channel, followed by a single
//! [`TransportEvent::Closed`] when the stream ends or fails. The session consumes the
//! channel in order, so it never touches the port directly.
//!
//! Any `AsyncRead` works as a source: `tokio_serial::SerialStream` in production,
//! `tokio::io::duplex` in tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use volta_daq::transport::{open_serial, SerialSettings};
//!
//! let settings = SerialSettings::new("/dev/ttyUSB0");
//! let mut transport = open_serial(&settings).await?;
//! while let Some(event) = transport.recv().await {
//!     println!("{event:?}");
//! }
//! ```

use crate::config::SerialConfig;
use crate::error::{AppResult, DaqError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Longest line the reader accepts, terminator included. Anything longer is noise
/// (wrong baud rate, missing terminator) and is dropped up to the next newline.
pub const MAX_LINE_LEN: usize = 1024;

/// What the reader task delivers to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One raw line, terminator included
    Line(String),
    /// The stream ended or failed; nothing follows
    Closed,
}

/// Settings for opening the measurement box port.
///
/// The box always talks 8N1 without flow control; only the speed is configurable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// Port path (e.g. "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Communication speed
    pub baud_rate: u32,
    /// How long stale input is drained right after opening
    pub discard_timeout: Duration,
    /// Lines buffered between reader task and consumer
    pub channel_capacity: usize,
}

impl SerialSettings {
    /// Settings for `port` with the box defaults (115200 baud).
    pub fn new(port: impl Into<String>) -> Self {
        Self::from_config(port, &SerialConfig::default())
    }

    /// Settings for `port` taking the remaining values from configuration.
    pub fn from_config(port: impl Into<String>, config: &SerialConfig) -> Self {
        Self {
            port: port.into(),
            baud_rate: config.baud_rate,
            discard_timeout: config.discard_timeout(),
            channel_capacity: config.channel_capacity.max(1),
        }
    }
}

/// Receiving end of a line stream, with exclusive ownership of its reader task.
#[derive(Debug)]
pub struct LineTransport {
    events: mpsc::Receiver<TransportEvent>,
    reader: Option<JoinHandle<()>>,
}

impl LineTransport {
    /// Start a reader task over `source`, buffering up to `capacity` lines.
    pub fn spawn<R>(source: R, capacity: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, events) = mpsc::channel(capacity.max(1));
        let reader = tokio::spawn(read_lines(source, tx));
        Self {
            events,
            reader: Some(reader),
        }
    }

    /// Next event in arrival order.
    ///
    /// Returns `None` once the transport is closed and drained, or after the reader task
    /// went away without reporting.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// Stop the reader task and refuse further lines.
    ///
    /// Idempotent: returns `true` only for the call that actually closed the transport.
    pub fn close(&mut self) -> bool {
        match self.reader.take() {
            Some(reader) => {
                reader.abort();
                self.events.close();
                tracing::debug!("Serial transport closed");
                true
            }
            None => false,
        }
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }
}

impl Drop for LineTransport {
    fn drop(&mut self) {
        self.close();
    }
}

async fn read_lines<R>(source: R, tx: mpsc::Sender<TransportEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(source);
    let mut buf = Vec::with_capacity(64);
    // Set while the rest of an over-long line is being skipped.
    let mut skipping = false;

    loop {
        buf.clear();
        let read = (&mut reader)
            .take(MAX_LINE_LEN as u64)
            .read_until(b'\n', &mut buf)
            .await;
        match read {
            Ok(0) => {
                tracing::debug!("Serial stream reached EOF");
                break;
            }
            Ok(n) => {
                let terminated = buf.last() == Some(&b'\n');
                if skipping {
                    skipping = !terminated;
                    continue;
                }
                if !terminated && n == MAX_LINE_LEN {
                    tracing::warn!(limit = MAX_LINE_LEN, "Discarding over-long serial line");
                    skipping = true;
                    continue;
                }
                // Invalid UTF-8 surfaces later as a malformed sample.
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(TransportEvent::Line(line)).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Serial read failed");
                break;
            }
        }
    }

    let _ = tx.send(TransportEvent::Closed).await;
}

/// Discard whatever the device sent before we started listening.
///
/// Reads for at most `timeout` in total, stopping early when the stream ends or goes
/// quiet for the rest of that time. Returns the number of bytes thrown away.
pub async fn discard_buffered<R>(port: &mut R, timeout: Duration) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut discard = [0u8; 256];
    let deadline = tokio::time::Instant::now() + timeout;
    let mut total = 0usize;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, port.read(&mut discard)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => total += n,
            Ok(Err(_)) | Err(_) => break,
        }
    }

    total
}

/// Open the measurement box port: 8N1, no flow control, DTR asserted.
///
/// Stale input is discarded before the reader task starts.
#[cfg(feature = "instrument_serial")]
pub async fn open_serial(settings: &SerialSettings) -> AppResult<LineTransport> {
    use tokio_serial::{SerialPort, SerialPortBuilderExt};

    let port_name = settings.port.clone();
    let baud_rate = settings.baud_rate;
    let unavailable = |reason: String| DaqError::TransportUnavailable {
        port: settings.port.clone(),
        reason,
    };

    let mut stream = tokio::task::spawn_blocking(move || {
        tokio_serial::new(&port_name, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
    })
    .await
    .map_err(|e| unavailable(format!("open task failed: {e}")))?
    .map_err(|e| unavailable(e.to_string()))?;

    stream
        .write_data_terminal_ready(true)
        .map_err(|e| unavailable(format!("failed to assert DTR: {e}")))?;

    let discarded = discard_buffered(&mut stream, settings.discard_timeout).await;
    if discarded > 0 {
        tracing::debug!(bytes = discarded, "Discarded stale serial input");
    }

    tracing::info!(port = %settings.port, baud = baud_rate, "Serial port opened");
    Ok(LineTransport::spawn(stream, settings.channel_capacity))
}

/// Serial access is compiled out.
#[cfg(not(feature = "instrument_serial"))]
pub async fn open_serial(_settings: &SerialSettings) -> AppResult<LineTransport> {
    Err(DaqError::SerialFeatureDisabled)
}

/// Name of the first serial port present on the system, if any.
#[cfg(feature = "instrument_serial")]
pub fn first_available_port() -> AppResult<Option<String>> {
    let ports = tokio_serial::available_ports().map_err(|e| DaqError::TransportUnavailable {
        port: "<discovery>".into(),
        reason: e.to_string(),
    })?;
    Ok(ports.into_iter().next().map(|p| p.port_name))
}

/// Serial access is compiled out.
#[cfg(not(feature = "instrument_serial"))]
pub fn first_available_port() -> AppResult<Option<String>> {
    Err(DaqError::SerialFeatureDisabled)
}
