//! Error types for the live timing core.
//!
//! All fallible operations in this crate return [`TimingError`]. The taxonomy
//! mirrors how failures are handled at runtime:
//!
//! - **Decode errors**: a malformed or truncated datagram. The datagram is
//!   dropped and the receive loop continues.
//! - **Enricher errors**: one enricher invocation failed. Its output is
//!   discarded, the rest of the pipeline still runs.
//! - **Channel errors**: a downstream consumer went away or the pipeline was
//!   cancelled while blocked on the persistence bus.
//! - **Fatal errors**: the UDP socket could not be bound or the receive loop
//!   failed. These terminate the event source.
//!
//! ```rust
//! use paddock::TimingError;
//!
//! let error = TimingError::decode("CarUpdate", "need 4 bytes at offset 26, have 2");
//! assert!(!error.is_retryable());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::net::SocketAddr;
use thiserror::Error;

/// Result type alias for timing operations.
pub type Result<T, E = TimingError> = std::result::Result<T, E>;

/// Main error type for the live timing core.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TimingError {
    #[error("Failed to decode {packet} packet: {details}")]
    Decode { packet: String, details: String },

    #[error("Failed to bind UDP socket on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error during {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Enricher '{enricher}' failed: {details}")]
    Enricher { enricher: String, details: String },

    #[error("Channel '{channel}' is closed")]
    ChannelClosed { channel: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Task '{task}' failed: {details}")]
    TaskFailed { task: String, details: String },

    #[error("Track configuration lookup failed for '{track}'")]
    TrackConfig {
        track: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl TimingError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            TimingError::Decode { .. } => false,
            TimingError::Bind { .. } => true,
            TimingError::Io { .. } => true,
            TimingError::Config { .. } => false,
            TimingError::Enricher { .. } => false,
            TimingError::ChannelClosed { .. } => false,
            TimingError::Cancelled => false,
            TimingError::TaskFailed { .. } => false,
            TimingError::TrackConfig { .. } => true,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            TimingError::Decode { .. } => vec![
                "Check that the server runs a compatible protocol version",
                "Verify no other software sends traffic to the plugin port",
            ],
            TimingError::Bind { .. } => vec![
                "Check that no other process listens on the plugin port",
                "Choose a different listen_port in the configuration",
                "Verify the process may bind UDP sockets",
            ],
            TimingError::Io { .. } => vec![
                "Check network connectivity to the server",
                "Verify the configured server endpoint",
            ],
            TimingError::Config { .. } => vec![
                "Review the configuration file against the documented keys",
                "Set both server_host and server_port or neither",
            ],
            TimingError::Enricher { .. } => {
                vec!["Inspect the logged enricher failure", "Verify track configuration data"]
            }
            TimingError::ChannelClosed { .. } => {
                vec!["Check that downstream consumers are still running"]
            }
            TimingError::Cancelled => vec!["Restart the pipeline if shutdown was not intended"],
            TimingError::TaskFailed { .. } => vec![
                "Inspect the logged panic for the failed task",
                "Restart the pipeline from the hosting process",
            ],
            TimingError::TrackConfig { .. } => vec![
                "Verify the track configuration source is reachable",
                "Check the track and layout names reported by the server",
            ],
        }
    }

    /// Create a decode error for the named packet kind.
    pub fn decode(packet: impl Into<String>, details: impl Into<String>) -> Self {
        TimingError::Decode { packet: packet.into(), details: details.into() }
    }

    /// Create a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        TimingError::Config { reason: reason.into() }
    }

    /// Create an enricher failure.
    pub fn enricher(enricher: impl Into<String>, details: impl Into<String>) -> Self {
        TimingError::Enricher { enricher: enricher.into(), details: details.into() }
    }

    /// Create a closed-channel error.
    pub fn channel_closed(channel: impl Into<String>) -> Self {
        TimingError::ChannelClosed { channel: channel.into() }
    }

    /// Create a failure for a processing task that did not finish cleanly.
    pub fn task_failed(task: impl Into<String>, details: impl Into<String>) -> Self {
        TimingError::TaskFailed { task: task.into(), details: details.into() }
    }

    /// Wrap an I/O error with the operation that produced it.
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        TimingError::Io { operation: operation.into(), source }
    }
}

impl From<std::io::Error> for TimingError {
    fn from(err: std::io::Error) -> Self {
        TimingError::Io { operation: "socket operation".to_string(), source: err }
    }
}

impl From<serde_yaml_ng::Error> for TimingError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        TimingError::Config { reason: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_carry_their_context(
            packet in "\\w+",
            details in ".*",
            reason in ".*",
            enricher in "\\w+",
          ) {
            let decode = TimingError::decode(packet.clone(), details.clone());
            let config = TimingError::config(reason.clone());
            let failed = TimingError::enricher(enricher.clone(), details.clone());

            let decode_msg = decode.to_string();
            prop_assert!(decode_msg.contains(&packet));
            prop_assert!(decode_msg.contains(&details));
            prop_assert!(config.to_string().contains(&reason));
            prop_assert!(failed.to_string().contains(&enricher));
          }

          #[test]
          fn io_conversion_preserves_source(message in ".*") {
            let io_err = std::io::Error::other(message.clone());
            let converted: TimingError = io_err.into();
            match converted {
              TimingError::Io { source, .. } => prop_assert_eq!(source.to_string(), message),
              _ => prop_assert!(false, "Expected Io error from io::Error conversion"),
            }
          }
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<TimingError>();

        let error = TimingError::channel_closed("realtime");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn bind_errors_chain_their_source() {
        let addr: SocketAddr = "0.0.0.0:9996".parse().unwrap();
        let error = TimingError::Bind {
            addr,
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(error.to_string().contains("0.0.0.0:9996"));
        let source = std::error::Error::source(&error).expect("bind error has a source");
        assert_eq!(source.to_string(), "in use");
    }

    #[test]
    fn recovery_methods_work() {
        let bind = TimingError::Bind {
            addr: "127.0.0.1:1".parse().unwrap(),
            source: std::io::Error::other("x"),
        };
        let decode = TimingError::decode("LapCompleted", "truncated");

        assert!(bind.is_retryable());
        assert!(!decode.is_retryable());
        assert!(!TimingError::Cancelled.is_retryable());
        assert!(!TimingError::task_failed("source", "panicked").is_retryable());

        for suggestion in bind.recovery_suggestions() {
            assert!(suggestion.len() > 5);
        }
        assert!(!decode.recovery_suggestions().is_empty());
    }

    #[test]
    fn yaml_errors_become_config_errors() {
        let err = serde_yaml_ng::from_str::<u32>("not: [a number").unwrap_err();
        let converted: TimingError = err.into();
        assert!(matches!(converted, TimingError::Config { .. }));
    }
}
