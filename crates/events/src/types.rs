//! Event types emitted by the orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping every event with an id and timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: Event,
}

impl EventEnvelope {
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// All events a session can emit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Session went busy: the first step of a chain is starting
    #[serde(rename = "session.started")]
    SessionStarted { step: String },

    /// Session returned to idle
    #[serde(rename = "session.ended")]
    SessionEnded { success: bool },

    /// One step of the chain began
    #[serde(rename = "step.started")]
    StepStarted { step: String },

    /// One step of the chain finished with the tool's exit code
    #[serde(rename = "step.finished")]
    StepFinished { step: String, code: i32 },

    /// Incremental tool output, lossily decoded for display
    #[serde(rename = "output.chunk")]
    OutputChunk { text: String },

    /// A capability probe succeeded and replaced the stored value
    #[serde(rename = "capabilities.updated")]
    CapabilitiesUpdated {
        version: String,
        generators: Vec<String>,
    },

    /// Reported-but-non-fatal condition (parse failure, spawn failure,
    /// refused precondition)
    #[serde(rename = "advisory")]
    Advisory { message: String },
}

impl Event {
    /// Step name carried by this event, if any
    pub fn step(&self) -> Option<&str> {
        match self {
            Event::SessionStarted { step } => Some(step),
            Event::StepStarted { step } => Some(step),
            Event::StepFinished { step, .. } => Some(step),
            _ => None,
        }
    }

    /// Whether this event marks the session going idle
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::SessionEnded { .. })
    }
}
