//! Domain types for Plugin Forge
//!
//! This crate holds the data model shared by the orchestrator and its
//! consumers: tool capabilities, project specifications, and identifier
//! legalization. Everything here is pure - no process I/O.

pub mod domain;
pub mod error;

pub use domain::capabilities::{parse_capabilities, CapabilityInfo};
pub use domain::project::{legalize_identifier, ProjectKind, ProjectSpec};
pub use error::{CoreError, Result};
