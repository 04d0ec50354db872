//! Process-wide tracing/logging setup.

pub mod logging;

pub use logging::{LogFormat, init};
