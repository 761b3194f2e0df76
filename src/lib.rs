//! httpmon - Passive HTTP Connection Reuse Monitor
//!
//! Watches network traffic on monitored ports and counts how many HTTP
//! requests each TCP connection carries before it closes, then reports
//! aggregate and per-destination distributions of that count.
//!
//! # Architecture
//!
//! ```text
//! capture (pcap + etherparse)      one producer thread per source
//!        │
//!        ▼
//! queue (crossbeam channel)        FIFO with shutdown sentinel
//!        │
//!        ▼
//! tracker                          in-flight request counts per connection
//!        │
//!        ▼
//! stats                            streaming aggregate + per destination
//!        │
//!        ▼
//! report                           fixed-width text output
//! ```
//!
//! The [`http`] module classifies whether a single HTTP message closes its
//! connection under HTTP/1.x persistence rules; it is independent of the
//! capture pipeline.

pub mod capture;
pub mod config;
pub mod http;
pub mod monitor;
pub mod queue;
pub mod report;
pub mod resolve;
pub mod stats;
pub mod tracker;

use thiserror::Error;

pub use capture::{DecodedPacket, Endpoint};
pub use config::MonitorConfig;
pub use monitor::Monitor;
pub use stats::{SharedStatistic, Statistic};
pub use tracker::{CompletedConnection, ConnectionTracker};

/// Monitor error types
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("capture error: {0}")]
    Capture(#[from] pcap::Error),

    #[error("no capture devices found (try running as root)")]
    NoDevices,

    #[error("config error: {0}")]
    Config(String),

    #[error("http message is still being parsed")]
    MessageInProcess,

    #[error("http message failed to parse")]
    MessageFailed,

    #[error("packet processing thread terminated abnormally")]
    Processor,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
