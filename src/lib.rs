//! # Volta DAQ Core Library
//!
//! Paced acquisition of scalar readings (voltage, current) that a measurement box
//! streams line by line over a serial port. A session collects a fixed number of
//! samples spread across a fixed time window and writes them, timestamped, to a
//! plain-text log.
//!
//! ## Crate Structure
//!
//! - **`pacing`**: `AcquisitionPlan` (window + sample count) and the `PaceScheduler`
//!   that rebalances the remaining time across the remaining samples after every one.
//! - **`buffer`**: The fixed-capacity `SampleBuffer`, line parsing, and the on-disk
//!   record format.
//! - **`session`**: `AcquisitionSession`, the single consumer that ties transport,
//!   pacing and buffer together, plus the `SessionProgress` view for the host loop.
//! - **`transport`**: Serial port opening and the reader task that turns the byte
//!   stream into a channel of lines.
//! - **`progress`**: Status line formatting (percent, elapsed `mm:ss`, last value).
//! - **`config`**: Figment-based configuration (defaults, TOML file, environment).
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`error`**: The `DaqError` enum used across the crate.

pub mod buffer;
pub mod config;
pub mod error;
pub mod logging;
pub mod pacing;
pub mod progress;
pub mod session;
pub mod transport;

pub use buffer::{Sample, SampleBuffer};
pub use error::{AppResult, DaqError};
pub use pacing::{AcquisitionPlan, PaceScheduler};
pub use session::{AcquisitionSession, SessionOutcome, SessionProgress, SessionReport};
