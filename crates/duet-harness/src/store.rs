//! Shared collection of run snapshots keyed by run index.
//!
//! Every mutation goes through [`RunStore::apply`], which derives the new
//! snapshot from the latest stored one inside the channel's lock. Callers
//! never hold a copy that is later written back, so concurrent updates to
//! different indices cannot overwrite each other.
use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;

use duet_core::{PassAtK, RunSnapshot};

/// Snapshots by 0-based run index.
pub type RunMap = BTreeMap<usize, RunSnapshot>;

#[derive(Clone)]
pub struct RunStore {
    tx: Arc<watch::Sender<RunMap>>,
}

impl Default for RunStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(RunMap::new());
        Self { tx: Arc::new(tx) }
    }

    /// Replaces the whole collection with `count` empty running placeholders.
    pub fn reset(&self, count: usize) {
        let runs = (0..count)
            .map(|index| (index, RunSnapshot::pending(index + 1)))
            .collect();
        self.tx.send_replace(runs);
    }

    /// Replaces the snapshot at `index` with `update(latest)` and returns the
    /// update's side value. `None` when no run has that index.
    pub fn apply<R>(
        &self,
        index: usize,
        update: impl FnOnce(&RunSnapshot) -> (RunSnapshot, R),
    ) -> Option<R> {
        let mut result = None;
        self.tx.send_if_modified(|runs| {
            let Some(slot) = runs.get_mut(&index) else {
                return false;
            };
            let (next, value) = update(slot);
            let changed = !next.same_state(slot);
            *slot = next;
            result = Some(value);
            changed
        });
        result
    }

    /// Marks every run that has not finished yet as finished.
    pub fn finish_all(&self) {
        self.tx.send_if_modified(|runs| {
            let mut changed = false;
            for slot in runs.values_mut().filter(|s| !s.is_finished()) {
                *slot = slot.finished();
                changed = true;
            }
            changed
        });
    }

    pub fn get(&self, index: usize) -> Option<RunSnapshot> {
        self.tx.borrow().get(&index).cloned()
    }

    /// All snapshots ordered by index.
    pub fn snapshots(&self) -> Vec<RunSnapshot> {
        self.tx.borrow().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    /// Pass@k over the current snapshots.
    pub fn score(&self) -> PassAtK {
        PassAtK::compute(self.tx.borrow().values())
    }

    /// Receiver notified after every effective change.
    pub fn subscribe(&self) -> watch::Receiver<RunMap> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_core::{AgentRole, RunId, SimEvent, reduce};

    #[test]
    fn reset_materializes_numbered_placeholders() {
        let store = RunStore::new();
        store.reset(3);
        let runs = store.snapshots();
        assert_eq!(runs.len(), 3);
        assert_eq!(
            runs.iter().map(|r| r.run_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(runs.iter().all(|r| !r.is_finished() && r.run_id.is_none()));
    }

    #[test]
    fn apply_to_missing_index_is_none() {
        let store = RunStore::new();
        store.reset(1);
        assert_eq!(store.apply(5, |s| (s.finished(), ())), None);
        assert!(!store.get(0).expect("run 0").is_finished());
    }

    #[test]
    fn subscribers_see_changes_but_not_no_ops() {
        let store = RunStore::new();
        store.reset(2);
        let mut rx = store.subscribe();

        store.apply(1, |s| (s.clone(), ()));
        assert!(!rx.has_changed().expect("sender alive"));

        store.apply(1, |s| (s.with_run_id(RunId::new("r2")), ()));
        assert!(rx.has_changed().expect("sender alive"));
        assert_eq!(
            rx.borrow_and_update()[&1].run_id,
            Some(RunId::new("r2"))
        );
    }

    #[test]
    fn finish_all_settles_only_open_runs() {
        let store = RunStore::new();
        store.reset(3);
        store.apply(1, |s| (s.with_run_id(RunId::new("r2")).finished(), ()));
        let mut rx = store.subscribe();

        store.finish_all();
        assert!(rx.has_changed().expect("sender alive"));
        rx.borrow_and_update();
        assert!(store.snapshots().iter().all(RunSnapshot::is_finished));

        store.finish_all();
        assert!(!rx.has_changed().expect("sender alive"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_to_different_indices_are_all_kept() {
        let store = RunStore::new();
        store.reset(4);
        let mut tasks = Vec::new();
        for index in 0..4 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let speaker = if index % 2 == 0 {
                    AgentRole::Candidate
                } else {
                    AgentRole::Sim
                };
                store.apply(index, |s| {
                    let t = reduce(s, &SimEvent::TurnStart { speaker, turn: None });
                    (t.snapshot, ())
                });
                for _ in 0..200 {
                    store.apply(index, |s| {
                        let event = SimEvent::ContentDelta {
                            speaker,
                            delta: "x".into(),
                            turn: None,
                        };
                        (reduce(s, &event).snapshot, ())
                    });
                    tokio::task::yield_now().await;
                }
            }));
        }
        for task in tasks {
            task.await.expect("task");
        }

        for (index, run) in store.snapshots().iter().enumerate() {
            let text = if index % 2 == 0 {
                &run.streaming.content.candidate
            } else {
                &run.streaming.content.sim
            };
            assert_eq!(text.len(), 200, "run {index}");
        }
    }
}
