//! Transport contract for the simulation server, plus the HTTP implementation.
//!
//! The orchestrator only depends on [`SimulationTransport`]; tests swap in an
//! in-memory implementation.
pub(crate) mod config;
mod http;

use std::pin::Pin;

use duet_core::{ModelCatalog, RunId, SimulationConfig, SimulationState};

use crate::errors::TransportError;

pub use config::ClientConfig;
pub use http::HttpTransport;

/// Raw chunks of a run's event stream, in arrival order. Ends when the server
/// closes the response.
pub type ChunkStream = Pin<
    Box<dyn futures::Stream<Item = Result<bytes::Bytes, TransportError>> + Send + 'static>,
>;

/// Operations the simulation server exposes.
#[async_trait::async_trait]
pub trait SimulationTransport: Send + Sync {
    /// Creates a fresh remote run bound to `config` and returns its id.
    async fn create_run(&self, config: &SimulationConfig) -> Result<RunId, TransportError>;

    /// Fetches the server's record of a run.
    async fn get_run(&self, run_id: &RunId) -> Result<SimulationState, TransportError>;

    /// Starts the run and opens its event stream.
    async fn stream_run(&self, run_id: &RunId) -> Result<ChunkStream, TransportError>;

    /// Replaces one committed turn's text. `reasoning: None` keeps the
    /// existing reasoning.
    async fn update_turn(
        &self,
        run_id: &RunId,
        turn_number: u32,
        content: &str,
        reasoning: Option<&str>,
    ) -> Result<(), TransportError>;

    /// Drops turns numbered `turn_number` and above so the run can resume
    /// from there.
    async fn rerun_from(&self, run_id: &RunId, turn_number: u32) -> Result<(), TransportError>;

    async fn list_models(&self) -> Result<ModelCatalog, TransportError>;
}
