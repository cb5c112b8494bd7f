//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the status sync crates:
//! - Logging and tracing bootstrap
//! - Configuration with fail-fast validation
//! - Event bus for session and credential lifecycle events
//!
//! Nothing in here performs I/O beyond writing logs; every other crate in
//! the workspace depends on it.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
