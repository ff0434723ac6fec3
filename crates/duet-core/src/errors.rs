use crate::model::AgentRole;

/// Reasons a `SimulationConfig` is refused before any run starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_turns must be between 1 and {max}, got {value}")]
    MaxTurns { value: u32, max: u32 },
    #[error("first_speaker must be an agent, got {0}")]
    FirstSpeaker(AgentRole),
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("{0} model must not be empty")]
    EmptyModel(AgentRole),
    #[error("{0} max_tokens must be greater than 0")]
    ZeroMaxTokens(AgentRole),
}
