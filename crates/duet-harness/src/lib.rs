//! Async client side of the duet simulation harness.
//!
//! [`RunOrchestrator`] starts `k` copies of one simulation against the server,
//! folds each run's event stream into a shared [`RunStore`], and scores the
//! batch once every run settles. The server is reached through the
//! [`SimulationTransport`] trait; [`HttpTransport`] is the production
//! implementation.
//!
//! # Running a batch
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use duet_harness::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), HarnessError> {
//! let orchestrator = RunOrchestrator::new(
//!     Arc::new(HttpTransport::from_env()?),
//!     OrchestratorConfig::from_env()?,
//! );
//!
//! let report = orchestrator
//!     .run_batch(&SimulationConfig::default(), 5)
//!     .await?;
//!
//! println!("{}", report.score);
//! # Ok(())
//! # }
//! ```

/// Public error types used by the harness API.
pub mod errors;
/// Batch preparation, per-run drivers, and post-run operations.
pub mod orchestrator;
/// Common imports for typical usage.
pub mod prelude;
/// Keyed run snapshot store.
pub mod store;
/// Server contract and HTTP client.
pub mod transport;

pub use errors::{HarnessError, RunFailure, TransportError};
pub use orchestrator::{
    AbortHandle, Batch, BatchReport, OrchestratorConfig, RunOrchestrator, RunSettlement,
};
pub use store::{RunMap, RunStore};
pub use transport::{ChunkStream, ClientConfig, HttpTransport, SimulationTransport};
