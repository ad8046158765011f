//! One acquisition session, from open transport to written sample log.
//!
//! The session is the single writer of its [`SampleBuffer`]. It runs as one task:
//! wait the paced interval, take the next line from the transport (bounded by the read
//! timeout), parse it, append it. It stops when the buffer is full or the transport
//! closes, then closes the transport and writes the log. Both paths finalize exactly
//! once.
//!
//! Everything the host needs while the session runs lives in [`SessionProgress`], an
//! `Arc`-shared set of atomics. The host may read stale values; it only uses them to
//! size its own poll interval and to draw a status line.
//!
//! ```rust,ignore
//! let session = AcquisitionSession::new(plan, Duration::from_secs(1));
//! let progress = session.progress();
//! let task = tokio::spawn(async move { session.run(transport, &path).await });
//! progress.poll_until_finished(|p| println!("{}", p.status())).await;
//! let report = task.await??;
//! ```

use crate::buffer::{parse_sample, SampleBuffer};
use crate::error::{AppResult, DaqError};
use crate::pacing::{AcquisitionPlan, PaceScheduler};
use crate::progress::ProgressStatus;
use crate::transport::{LineTransport, TransportEvent};
use chrono::Local;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::Instant;

/// Shortest host poll interval; a zero wait would spin.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Stored samples between `debug` progress lines.
const PROGRESS_LOG_EVERY: usize = 1000;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Every planned sample was collected.
    Completed,
    /// The device went away first; whatever was collected has been written.
    TransportClosed,
}

/// Summary returned once the sample log is on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    /// Why the session stopped
    pub outcome: SessionOutcome,
    /// Lines written to the sample log
    pub samples_written: usize,
    /// Lines dropped because they did not parse
    pub malformed: usize,
    /// Time from transport open to finalize
    pub elapsed: Duration,
}

/// What happened to a single line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineOutcome {
    /// Parsed and stored.
    Stored(f64),
    /// Did not parse; logged and dropped.
    Dropped,
}

/// Lock-free view of a running session, shared with the host loop.
#[derive(Debug)]
pub struct SessionProgress {
    scheduler: PaceScheduler,
    collected: AtomicUsize,
    last_value: AtomicU64,
    opened_at: OnceLock<Instant>,
    finished: AtomicBool,
}

impl SessionProgress {
    fn new(scheduler: PaceScheduler) -> Self {
        Self {
            scheduler,
            collected: AtomicUsize::new(0),
            last_value: AtomicU64::new(0),
            opened_at: OnceLock::new(),
            finished: AtomicBool::new(false),
        }
    }

    /// Samples collected so far.
    pub fn collected(&self) -> usize {
        self.collected.load(Ordering::Acquire)
    }

    /// Samples the session expects.
    pub fn target(&self) -> usize {
        self.scheduler.plan().target_count()
    }

    /// Most recent reading, once at least one sample is in.
    pub fn last_value(&self) -> Option<f64> {
        (self.collected() > 0).then(|| f64::from_bits(self.last_value.load(Ordering::Acquire)))
    }

    /// When the transport became active, if it has.
    pub fn opened_at(&self) -> Option<Instant> {
        self.opened_at.get().copied()
    }

    /// Whether the session has finalized (successfully or not).
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Paced wait for the current state; the baseline before the session opens.
    pub fn next_wait(&self) -> Duration {
        match self.opened_at() {
            Some(opened_at) => self.scheduler.wait_since(opened_at, self.collected()),
            None => self.scheduler.baseline(),
        }
    }

    /// Current progress snapshot.
    pub fn status(&self) -> ProgressStatus {
        ProgressStatus {
            collected: self.collected(),
            target: self.target(),
            elapsed: self.opened_at().map(|t| t.elapsed()).unwrap_or_default(),
            last_value: self.last_value(),
        }
    }

    /// Host loop: sleep the paced interval between polls until the session finishes.
    ///
    /// `on_poll` runs once per wake-up and once more after the session finished.
    pub async fn poll_until_finished<F>(&self, mut on_poll: F)
    where
        F: FnMut(&SessionProgress),
    {
        while !self.is_finished() {
            on_poll(self);
            tokio::time::sleep(self.next_wait().max(MIN_POLL_INTERVAL)).await;
        }
        on_poll(self);
    }

    fn mark_opened(&self, at: Instant) -> Instant {
        *self.opened_at.get_or_init(|| at)
    }

    fn record(&self, collected: usize, value: f64) {
        self.last_value.store(value.to_bits(), Ordering::Release);
        self.collected.store(collected, Ordering::Release);
    }

    fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }
}

/// A single paced acquisition into a fixed-size buffer.
#[derive(Debug)]
pub struct AcquisitionSession {
    scheduler: PaceScheduler,
    buffer: SampleBuffer,
    progress: Arc<SessionProgress>,
    read_timeout: Duration,
    malformed: usize,
}

impl AcquisitionSession {
    /// Create a session for `plan`; `read_timeout` bounds each wait for a line.
    pub fn new(plan: AcquisitionPlan, read_timeout: Duration) -> Self {
        let scheduler = PaceScheduler::new(plan);
        Self {
            scheduler,
            buffer: SampleBuffer::with_capacity(plan.target_count()),
            progress: Arc::new(SessionProgress::new(scheduler)),
            read_timeout,
            malformed: 0,
        }
    }

    /// Shared handle for the host loop.
    pub fn progress(&self) -> Arc<SessionProgress> {
        Arc::clone(&self.progress)
    }

    /// Samples collected so far.
    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    /// Whether the planned number of samples is in.
    pub fn is_complete(&self) -> bool {
        self.buffer.is_complete()
    }

    /// Parse and store one raw line, stamped with the current local time.
    ///
    /// Recoverable parse failures are logged and dropped without touching the buffer.
    /// Appending to a full buffer fails with [`DaqError::CapacityExceeded`].
    pub fn handle_line(&mut self, raw: &str) -> AppResult<LineOutcome> {
        let value = match parse_sample(raw) {
            Ok(value) => value,
            Err(e) if e.is_recoverable() => {
                self.malformed += 1;
                tracing::warn!(error = %e, "Dropping sample");
                return Ok(LineOutcome::Dropped);
            }
            Err(e) => return Err(e),
        };

        self.buffer.append(value, Local::now())?;
        let collected = self.buffer.len();
        self.progress.record(collected, value);
        tracing::trace!(
            collected,
            target_count = self.buffer.capacity(),
            value,
            "Sample stored"
        );
        if collected % PROGRESS_LOG_EVERY == 0 || self.buffer.is_complete() {
            tracing::debug!(status = %self.progress.status(), "Progress");
        }
        Ok(LineOutcome::Stored(value))
    }

    /// Run until complete or until the transport closes, then write `destination`.
    ///
    /// The transport counts as opened when this is called. It is closed before the
    /// log is written, on every path.
    pub async fn run(
        mut self,
        mut transport: LineTransport,
        destination: &Path,
    ) -> AppResult<SessionReport> {
        let opened_at = self.progress.mark_opened(Instant::now());
        tracing::info!(
            target_count = self.buffer.capacity(),
            window_secs = self.scheduler.plan().window().as_secs(),
            "Acquisition started"
        );

        let outcome = self.collect(&mut transport, opened_at).await;
        transport.close();

        let progress = Arc::clone(&self.progress);
        let result = match outcome {
            Ok(outcome) => self.finalize(outcome, opened_at, destination),
            Err(e) => Err(e),
        };
        progress.mark_finished();
        if let Err(e) = &result {
            tracing::error!(error = %e, "Acquisition failed");
        }
        result
    }

    async fn collect(
        &mut self,
        transport: &mut LineTransport,
        opened_at: Instant,
    ) -> AppResult<SessionOutcome> {
        while !self.buffer.is_complete() {
            let wait = self.scheduler.wait_since(opened_at, self.buffer.len());
            tokio::time::sleep(wait).await;

            match tokio::time::timeout(self.read_timeout, transport.recv()).await {
                Err(_) => {
                    tracing::trace!("No data within read timeout");
                }
                Ok(Some(TransportEvent::Line(raw))) => {
                    self.handle_line(&raw)?;
                }
                Ok(Some(TransportEvent::Closed)) | Ok(None) => {
                    tracing::warn!(
                        error = %DaqError::TransportClosed,
                        collected = self.buffer.len(),
                        target_count = self.buffer.capacity(),
                        "Ending session early"
                    );
                    return Ok(SessionOutcome::TransportClosed);
                }
            }
        }
        Ok(SessionOutcome::Completed)
    }

    fn finalize(
        self,
        outcome: SessionOutcome,
        opened_at: Instant,
        destination: &Path,
    ) -> AppResult<SessionReport> {
        let samples_written = self.buffer.finalize(destination)?;
        let report = SessionReport {
            outcome,
            samples_written,
            malformed: self.malformed,
            elapsed: opened_at.elapsed(),
        };
        tracing::info!(
            outcome = ?report.outcome,
            samples = report.samples_written,
            malformed = report.malformed,
            elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            "Acquisition finished"
        );
        Ok(report)
    }
}
