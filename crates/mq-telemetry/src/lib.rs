//! # MQ Telemetry
//!
//! Structured logging bootstrap for services embedding the consumer.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mq_telemetry::{init_logging, TelemetryConfig};
//!
//! fn main() {
//!     init_logging(&TelemetryConfig::from_env()).expect("Failed to init logging");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MQ_SERVICE_NAME` | `mq-consumer` | Service name in log lines |
//! | `MQ_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `MQ_CONSOLE_OUTPUT` | `true` | Write logs to the console |
//! | `MQ_JSON_LOGS` | `false` (`true` in containers) | JSON formatted logs |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::init_logging;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("A global tracing subscriber is already installed")]
    AlreadyInitialized,

    #[error("Invalid configuration: {0}")]
    Config(String),
}
