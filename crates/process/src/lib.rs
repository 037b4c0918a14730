//! Asynchronous subprocess plumbing for Plugin Forge
//!
//! This crate owns everything that touches `tokio::process`: building
//! argument vectors, spawning the external tool, streaming its combined
//! output incrementally, and reporting the exit code. Consumers receive
//! events over a channel and never block on pipe I/O themselves.

pub mod args;
pub mod error;
pub mod handle;

pub use args::{cmake_path, ArgumentList};
pub use error::{ProcessError, Result};
pub use handle::{ProcessEvent, ProcessHandle, ProcessStream};
