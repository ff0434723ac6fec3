//! Common imports for driving a batch of runs.
pub use crate::{
    AbortHandle, BatchReport, HarnessError, HttpTransport, OrchestratorConfig, RunFailure,
    RunOrchestrator, RunSettlement, RunStore, SimulationTransport,
};
pub use duet_core::{PassAtK, RunPhase, RunSnapshot, SimulationConfig};
