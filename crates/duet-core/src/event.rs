use serde::{Deserialize, Serialize};

use crate::model::{AgentRole, Turn, VerificationOutcome};

/// Typed events carried by a run's `data: <json>` stream.
///
/// The optional `turn` ordinal some events carry is informational; the
/// committed message's `turn_number` is authoritative.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    /// Remote lifecycle notice sent before the first turn.
    Status {
        #[serde(default)]
        status: String,
    },
    TurnStart {
        speaker: AgentRole,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        turn: Option<u32>,
    },
    /// Final-answer channel fragment.
    ContentDelta {
        speaker: AgentRole,
        delta: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        turn: Option<u32>,
    },
    /// Internal-reasoning channel fragment.
    ReasoningDelta {
        speaker: AgentRole,
        delta: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        turn: Option<u32>,
    },
    MessageComplete {
        message: Turn,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        turn: Option<u32>,
    },
    /// An agent asked to end the conversation early.
    VerificationRequested,
    VerificationStart,
    VerificationComplete {
        result: VerificationOutcome,
    },
    SimulationComplete,
    Error {
        #[serde(default)]
        message: String,
    },
    /// Any `type` this client does not know yet.
    #[serde(other)]
    Unknown,
}

impl SimEvent {
    /// Wire name of the event, `"unknown"` for unrecognized types.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::TurnStart { .. } => "turn_start",
            Self::ContentDelta { .. } => "content_delta",
            Self::ReasoningDelta { .. } => "reasoning_delta",
            Self::MessageComplete { .. } => "message_complete",
            Self::VerificationRequested => "verification_requested",
            Self::VerificationStart => "verification_start",
            Self::VerificationComplete { .. } => "verification_complete",
            Self::SimulationComplete => "simulation_complete",
            Self::Error { .. } => "error",
            Self::Unknown => "unknown",
        }
    }

    /// True for events after which the run produces nothing more.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SimulationComplete | Self::Error { .. })
    }
}
