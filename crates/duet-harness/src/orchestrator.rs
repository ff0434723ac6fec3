//! Runs k independent copies of one simulation and folds each run's event
//! stream into the shared [`RunStore`].
//!
//! All runs of a batch are polled on the caller's task (`join_all`), so they
//! interleave cooperatively at I/O boundaries. Each run only ever touches its
//! own index in the store, and every update is derived from the latest stored
//! snapshot.
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{OnceCell, watch};
use tracing::{Instrument as _, debug, error, info, info_span, warn};

use duet_core::{
    EventStream, ModelCatalog, Notice, PassAtK, RunId, RunSnapshot, SimulationConfig, reduce,
};

use crate::errors::{HarnessError, RunFailure};
use crate::store::RunStore;
use crate::transport::SimulationTransport;
use crate::transport::config::env_secs;

/// Limits applied to every batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Largest accepted run count per batch.
    pub max_runs: usize,
    /// Per-run wall-clock limit covering creation and streaming. `None`
    /// waits indefinitely.
    pub run_deadline: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_runs: 10,
            run_deadline: None,
        }
    }
}

impl OrchestratorConfig {
    /// Reads `DUET_MAX_RUNS` and `DUET_RUN_DEADLINE_SECS`.
    pub fn from_env() -> Result<Self, HarnessError> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("DUET_MAX_RUNS")
            && !raw.trim().is_empty()
        {
            config.max_runs = raw.trim().parse().map_err(|e| {
                HarnessError::Config(format!("DUET_MAX_RUNS must be a positive integer: {e}"))
            })?;
        }
        config.run_deadline = env_secs("DUET_RUN_DEADLINE_SECS")?;
        if config.max_runs == 0 {
            return Err(HarnessError::Config("DUET_MAX_RUNS must be at least 1".into()));
        }
        Ok(config)
    }

    pub fn max_runs(mut self, max_runs: usize) -> Self {
        self.max_runs = max_runs;
        self
    }

    pub fn run_deadline(mut self, deadline: Duration) -> Self {
        self.run_deadline = Some(deadline);
        self
    }
}

/// Handle used to cancel every run of a batch.
#[derive(Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    /// Requests cancellation. Runs still in flight settle as
    /// `RunFailure::Cancelled`; runs already settled are unaffected.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Releases the orchestrator when a batch goes away. Runs the batch never
/// settled (it was dropped before or during `execute`) are marked finished
/// so no placeholder stays pending.
struct BatchGuard {
    running: Arc<AtomicBool>,
    store: RunStore,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.store.finish_all();
        self.running.store(false, Ordering::SeqCst);
    }
}

/// A validated batch whose placeholders already sit in the store.
pub struct Batch {
    id: uuid::Uuid,
    config: SimulationConfig,
    runs: usize,
    abort: AbortHandle,
    _guard: BatchGuard,
}

impl Batch {
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    pub fn runs(&self) -> usize {
        self.runs
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }
}

/// How one run's task ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunSettlement {
    /// The server sent `simulation_complete`.
    Completed,
    /// The stream closed without a terminal event.
    Closed,
    Failed(RunFailure),
}

impl RunSettlement {
    pub fn failure(&self) -> Option<&RunFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            Self::Completed | Self::Closed => None,
        }
    }
}

/// Outcome of a whole batch once every run has settled.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchReport {
    pub batch_id: uuid::Uuid,
    /// Settlement per run, by index.
    pub settlements: Vec<RunSettlement>,
    pub score: PassAtK,
}

impl BatchReport {
    /// `(index, failure)` for every failed run.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &RunFailure)> {
        self.settlements
            .iter()
            .enumerate()
            .filter_map(|(index, settlement)| settlement.failure().map(|f| (index, f)))
    }
}

pub struct RunOrchestrator {
    transport: Arc<dyn SimulationTransport>,
    config: OrchestratorConfig,
    store: RunStore,
    models: OnceCell<ModelCatalog>,
    running: Arc<AtomicBool>,
}

impl RunOrchestrator {
    pub fn new(transport: Arc<dyn SimulationTransport>, config: OrchestratorConfig) -> Self {
        Self {
            transport,
            config,
            store: RunStore::new(),
            models: OnceCell::new(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn store(&self) -> &RunStore {
        &self.store
    }

    pub fn snapshots(&self) -> Vec<RunSnapshot> {
        self.store.snapshots()
    }

    pub fn score(&self) -> PassAtK {
        self.store.score()
    }

    /// True from `prepare` until the batch has settled or been dropped.
    /// Dropping a prepared batch without executing it finishes its
    /// placeholders without a verdict.
    pub fn is_any_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Model catalog, fetched on first call and cached for the lifetime of
    /// this orchestrator.
    pub async fn models(&self) -> Result<&ModelCatalog, HarnessError> {
        self.models
            .get_or_try_init(|| async {
                let catalog = self.transport.list_models().await?;
                info!(
                    anthropic = catalog.anthropic.len(),
                    openai = catalog.openai.len(),
                    "loaded model catalog"
                );
                Ok::<_, HarnessError>(catalog)
            })
            .await
    }

    /// Validates a batch request and replaces the store with `runs` pending
    /// placeholders before any network activity.
    pub fn prepare(&self, config: &SimulationConfig, runs: usize) -> Result<Batch, HarnessError> {
        if runs == 0 || runs > self.config.max_runs {
            return Err(HarnessError::RunCount {
                requested: runs,
                max: self.config.max_runs,
            });
        }
        config.validate()?;
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(HarnessError::BatchInProgress);
        }
        let guard = BatchGuard {
            running: self.running.clone(),
            store: self.store.clone(),
        };

        self.store.reset(runs);
        let (abort_tx, _abort_rx) = watch::channel(false);
        let batch = Batch {
            id: uuid::Uuid::new_v4(),
            config: config.clone(),
            runs,
            abort: AbortHandle {
                tx: Arc::new(abort_tx),
            },
            _guard: guard,
        };
        info!(batch_id = %batch.id, runs, "prepared batch");
        Ok(batch)
    }

    /// Drives every run of `batch` to settlement. Never fails as a whole: a
    /// run's failure is recorded in its own settlement.
    pub async fn execute(&self, batch: Batch) -> BatchReport {
        let span = info_span!("batch", batch_id = %batch.id);
        let runs = (0..batch.runs).map(|index| {
            let abort_rx = batch.abort.tx.subscribe();
            self.drive_run(&batch.config, index, abort_rx)
                .instrument(info_span!(parent: &span, "run", run = index + 1))
        });
        let settlements = join_all(runs).await;
        let score = self.store.score();
        span.in_scope(|| info!(%score, "batch settled"));
        BatchReport {
            batch_id: batch.id,
            settlements,
            score,
        }
    }

    /// `prepare` followed by `execute`.
    pub async fn run_batch(
        &self,
        config: &SimulationConfig,
        runs: usize,
    ) -> Result<BatchReport, HarnessError> {
        let batch = self.prepare(config, runs)?;
        Ok(self.execute(batch).await)
    }

    async fn drive_run(
        &self,
        config: &SimulationConfig,
        index: usize,
        mut abort: watch::Receiver<bool>,
    ) -> RunSettlement {
        let pipeline = with_deadline(self.config.run_deadline, self.stream_run(config, index));
        let result = tokio::select! {
            biased;
            _ = aborted(&mut abort) => Err(RunFailure::Cancelled),
            result = pipeline => result,
        };
        match result {
            Ok(settlement) => settlement,
            Err(failure) => {
                error!(error = %failure, "run failed");
                self.store.apply(index, |s| (s.finished(), ()));
                RunSettlement::Failed(failure)
            }
        }
    }

    async fn stream_run(
        &self,
        config: &SimulationConfig,
        index: usize,
    ) -> Result<RunSettlement, RunFailure> {
        let run_id = self.transport.create_run(config).await?;
        info!(run_id = %run_id, "remote run created");
        self.store
            .apply(index, |s| (s.with_run_id(run_id.clone()), ()));

        let mut events = EventStream::new(self.transport.stream_run(&run_id).await?);
        while let Some(event) = events.next_event().await {
            let event = event?;
            let applied = self.store.apply(index, |s| {
                let transition = reduce(s, &event);
                let finished = transition.snapshot.is_finished();
                (transition.snapshot, (transition.notice, finished))
            });
            let Some((notice, finished)) = applied else {
                break;
            };
            if let Some(notice) = notice {
                report_notice(notice)?;
            }
            if finished {
                debug!(run_id = %run_id, "run finished");
                return Ok(RunSettlement::Completed);
            }
        }

        warn!(run_id = %run_id, "event stream closed before simulation_complete");
        self.store.apply(index, |s| (s.finished(), ()));
        Ok(RunSettlement::Closed)
    }

    /// Replaces one committed turn's text on the server and in the store.
    pub async fn edit_turn(
        &self,
        index: usize,
        turn_number: u32,
        content: &str,
        reasoning: Option<&str>,
    ) -> Result<(), HarnessError> {
        let run_id = self.settled_run_id(index)?;
        let unknown_turn = HarnessError::UnknownTurn { index, turn_number };
        if !self
            .store
            .get(index)
            .is_some_and(|s| s.turn(turn_number).is_some())
        {
            return Err(unknown_turn);
        }
        self.transport
            .update_turn(&run_id, turn_number, content, reasoning)
            .await?;
        let edited = self.store.apply(index, |s| {
            match s.with_turn_edited(turn_number, content, reasoning) {
                Some(next) => (next, true),
                None => (s.clone(), false),
            }
        });
        match edited {
            Some(true) => Ok(()),
            _ => Err(unknown_turn),
        }
    }

    /// Truncates the server-side conversation at `turn_number` and reloads.
    pub async fn rerun_from(
        &self,
        index: usize,
        turn_number: u32,
    ) -> Result<RunSnapshot, HarnessError> {
        let run_id = self.settled_run_id(index)?;
        self.transport.rerun_from(&run_id, turn_number).await?;
        self.reload(index).await
    }

    /// Replaces a settled run's turns and verdict with the server's record.
    pub async fn reload(&self, index: usize) -> Result<RunSnapshot, HarnessError> {
        let run_id = self.settled_run_id(index)?;
        let state = self.transport.get_run(&run_id).await?;
        self.store
            .apply(index, |s| {
                let next = s.with_remote_state(&state);
                (next.clone(), next)
            })
            .ok_or(HarnessError::UnknownRun(index))
    }

    fn settled_run_id(&self, index: usize) -> Result<RunId, HarnessError> {
        let snapshot = self
            .store
            .get(index)
            .ok_or(HarnessError::UnknownRun(index))?;
        let run_id = snapshot
            .run_id
            .clone()
            .ok_or(HarnessError::RunNotStarted(index))?;
        if !snapshot.is_finished() {
            return Err(HarnessError::RunInProgress(index));
        }
        Ok(run_id)
    }
}

fn report_notice(notice: Notice) -> Result<(), RunFailure> {
    match notice {
        Notice::RemoteFailure(message) => return Err(RunFailure::Remote { message }),
        Notice::TurnOutOfSequence { expected, received } => {
            warn!(expected, received, "dropped out-of-sequence message");
        }
        Notice::VerificationReplaced => {
            warn!("verification outcome replaced by a later verdict");
        }
        Notice::Ignored { event, reason } => debug!(event, reason, "ignored event"),
    }
    Ok(())
}

async fn with_deadline<F>(deadline: Option<Duration>, run: F) -> Result<RunSettlement, RunFailure>
where
    F: Future<Output = Result<RunSettlement, RunFailure>>,
{
    match deadline {
        Some(after) => tokio::time::timeout(after, run)
            .await
            .unwrap_or(Err(RunFailure::TimedOut { after })),
        None => run.await,
    }
}

/// Resolves once the batch is aborted; never resolves otherwise.
async fn aborted(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|aborted| *aborted).await.is_err() {
        std::future::pending::<()>().await;
    }
}
