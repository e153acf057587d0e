//! Common utilities for hid-async
//!
//! This crate provides shared infrastructure for the HID layer: error
//! handling, tracing setup, and the channel bridge that carries reports from
//! a dedicated reader thread to an async consumer.

pub mod channel;
pub mod error;
pub mod logging;

pub use channel::{ReportSink, ReportStream, create_report_bridge};
pub use error::{Error, Result};
pub use logging::{setup_logging, setup_test_logging};
