//! Event system for Plugin Forge
//!
//! The orchestrator reports progress exclusively through this crate:
//! session and step lifecycle, incremental tool output, capability
//! updates, and advisory messages. Surrounding UI code subscribes here
//! instead of polling process state.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::*;
