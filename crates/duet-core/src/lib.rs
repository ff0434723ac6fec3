//! Client-side core for observing two-agent ("candidate" / "sim") simulation
//! runs.
//!
//! A run's live stream is framed as `data: <json>` lines. The pieces here turn
//! that stream into state:
//!
//! ```text
//! chunks -> envelope::EventStream -> SimEvent -> reducer::reduce -> RunSnapshot
//!                                                                  \-> scorer::PassAtK
//! ```
//!
//! Nothing in this crate performs network I/O; see `duet-harness` for the
//! transport and the multi-run orchestrator.

/// Simulation config validation errors.
pub mod errors;
/// Stream event vocabulary.
pub mod event;
/// Line-framed envelope parser and lazy event stream.
pub mod envelope;
/// Wire and configuration types.
pub mod model;
/// Process-wide tracing setup.
pub mod observability;
/// Pure per-run state transitions.
pub mod reducer;
/// Pass@k aggregation.
pub mod scorer;
/// Per-run state snapshot.
pub mod snapshot;

pub use envelope::{EventStream, LineDecoder};
pub use errors::ConfigError;
pub use event::SimEvent;
pub use model::{
    AgentConfig, AgentRole, ModelCatalog, RemoteStatus, RunId, SimulationConfig, SimulationState,
    Turn, VerificationOutcome,
};
pub use reducer::{Notice, Transition, reduce, replay};
pub use scorer::PassAtK;
pub use snapshot::{RunPhase, RunSnapshot, RunStatus, SpeakerText, StreamingBuffers};
