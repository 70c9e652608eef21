//! # Observability
//!
//! Structured logging for the Strata node. Block processing, rejected
//! messages and fatal halts are all reported through `tracing` events with
//! structured fields; this module installs the subscriber that renders
//! them.
//!
//! ```rust,ignore
//! use strata_node::observability::{init_logging, LogFormat};
//!
//! init_logging("info", LogFormat::Json);
//! ```

mod logging;

pub use logging::{init_logging, LogFormat};
