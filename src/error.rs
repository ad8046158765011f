//! Custom error types for the acquisition library.
//!
//! `DaqError` is the single error type returned by every fallible operation in the
//! crate. It is built with `thiserror`, so the host binary can wrap it with
//! `anyhow` context without losing the original message.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment` while reading or merging configuration
//!   sources (TOML file, environment).
//! - **`Configuration`**: Semantic configuration errors that pass parsing but make no
//!   sense, such as a zero-length acquisition window.
//! - **`MalformedSample`**: A line from the device did not parse as a decimal reading.
//!   The session logs it and drops the sample.
//! - **`CapacityExceeded`**: An append was attempted on a full sample buffer. Reaching
//!   this means the caller skipped the completion check.
//! - **`TransportUnavailable`** / **`TransportClosed`**: The serial device could not be
//!   opened, or went away mid-session. Neither is retried.
//! - **`Io`**: Wraps `std::io::Error`, mainly failures writing the sample log.
//! - **`SerialFeatureDisabled`**: Serial access was requested from a build without the
//!   `instrument_serial` feature.

use thiserror::Error;

/// Convenience alias for results using the library error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Errors raised by the acquisition core and its collaborators.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Configuration sources could not be read or merged.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration values are present but invalid.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// A received line is not a decimal reading.
    #[error("Malformed sample: {line:?}")]
    MalformedSample {
        /// The offending line, without its terminator.
        line: String,
    },

    /// The sample buffer is already full.
    #[error("Sample buffer full: capacity {capacity} reached")]
    CapacityExceeded {
        /// Capacity of the buffer that rejected the sample.
        capacity: usize,
    },

    /// The serial device could not be opened.
    #[error("Serial port '{port}' unavailable: {reason}")]
    TransportUnavailable {
        /// Port identifier that was requested.
        port: String,
        /// Underlying failure.
        reason: String,
    },

    /// The serial device stopped delivering data.
    #[error("Serial transport closed")]
    TransportClosed,

    /// I/O failure, typically while writing the sample log.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial support was compiled out.
    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,
}

impl DaqError {
    /// Whether the session can keep running after this error.
    ///
    /// Only malformed samples are recoverable; everything else ends the session.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DaqError::MalformedSample { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_malformed_samples_are_recoverable() {
        let malformed = DaqError::MalformedSample {
            line: "abc".into(),
        };
        assert!(malformed.is_recoverable());
        assert!(!DaqError::CapacityExceeded { capacity: 3 }.is_recoverable());
        assert!(!DaqError::TransportClosed.is_recoverable());
    }

    #[test]
    fn messages_name_the_offending_input() {
        let err = DaqError::MalformedSample {
            line: "12x".into(),
        };
        assert_eq!(err.to_string(), "Malformed sample: \"12x\"");

        let err = DaqError::TransportUnavailable {
            port: "/dev/ttyUSB0".into(),
            reason: "permission denied".into(),
        };
        assert!(err.to_string().contains("/dev/ttyUSB0"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn io_errors_convert_with_question_mark() {
        fn fails() -> AppResult<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(DaqError::Io(_))));
    }
}
