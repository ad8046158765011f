//! Fixed-capacity sample buffer and its on-disk record.
//!
//! The buffer is sized for the whole session up front. Samples are appended in arrival
//! order and written out once, as plain text:
//!
//! ```text
//! 1700000000.123456 3.14
//! 1700000000.133502 3.15
//! ```
//!
//! Timestamps are Unix epoch seconds with six fractional digits, values have two.
//! Both always use a decimal point so downstream tooling can parse the file no matter
//! which locale the acquisition host runs under.

use crate::error::{AppResult, DaqError};
use chrono::{DateTime, Local};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// One timestamped reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Local wall-clock time the line arrived
    pub captured_at: DateTime<Local>,
    /// Parsed reading
    pub value: f64,
}

impl Sample {
    /// Create a sample.
    pub fn new(value: f64, captured_at: DateTime<Local>) -> Self {
        Self { captured_at, value }
    }

    /// Render the sample as one record line, without terminator.
    pub fn to_record(&self) -> String {
        format!("{} {:.2}", epoch_seconds(&self.captured_at), self.value)
    }
}

/// `<seconds>.<micros>` since the Unix epoch.
fn epoch_seconds(at: &DateTime<Local>) -> String {
    let micros = at.timestamp_micros();
    let sign = if micros < 0 { "-" } else { "" };
    let micros = micros.unsigned_abs();
    format!("{sign}{}.{:06}", micros / 1_000_000, micros % 1_000_000)
}

/// Parse one raw device line into a reading.
///
/// Surrounding whitespace (including the line terminator) is ignored and a comma is
/// accepted as decimal separator. Empty, non-numeric and non-finite input is rejected.
pub fn parse_sample(line: &str) -> AppResult<f64> {
    let trimmed = line.trim();
    let malformed = || DaqError::MalformedSample {
        line: trimmed.to_string(),
    };

    let value: f64 = trimmed.replace(',', ".").parse().map_err(|_| malformed())?;
    if !value.is_finite() {
        return Err(malformed());
    }
    Ok(value)
}

/// Ordered, bounded store of the samples collected during one session.
#[derive(Debug)]
pub struct SampleBuffer {
    samples: Vec<Sample>,
    capacity: usize,
}

impl SampleBuffer {
    /// Create an empty buffer for exactly `capacity` samples.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample in the next free slot.
    ///
    /// A full buffer rejects the sample and is left untouched.
    pub fn append(&mut self, value: f64, captured_at: DateTime<Local>) -> AppResult<()> {
        if self.is_complete() {
            return Err(DaqError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.samples.push(Sample::new(value, captured_at));
        Ok(())
    }

    /// Whether every slot is filled.
    pub fn is_complete(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// Number of samples collected so far.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether nothing has been collected yet.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of samples the buffer was sized for.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Collected samples in arrival order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Most recently appended sample.
    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// Write every collected sample to `writer`, one record per line.
    pub fn write_records<W: Write>(&self, mut writer: W) -> AppResult<usize> {
        for sample in &self.samples {
            writeln!(writer, "{}", sample.to_record())?;
        }
        writer.flush()?;
        Ok(self.samples.len())
    }

    /// Persist the buffer to `destination`, replacing any existing file.
    ///
    /// Consumes the buffer, so a session can only be finalized once. Returns the number
    /// of lines written.
    pub fn finalize(self, destination: &Path) -> AppResult<usize> {
        let file = File::create(destination)?;
        let written = self.write_records(BufWriter::new(file))?;
        tracing::info!(
            path = %destination.display(),
            samples = written,
            "Sample log written"
        );
        Ok(written)
    }
}
