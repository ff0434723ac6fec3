use std::fmt;

use serde::Serialize;

use crate::snapshot::RunSnapshot;

/// Pass@k summary derived from a set of run snapshots.
///
/// Always recomputed from the snapshots; nothing here is stored between
/// updates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PassAtK {
    /// Runs in the batch (the `k`).
    pub total: usize,
    /// Runs with a verdict.
    pub completed: usize,
    pub passed: usize,
    /// Runs whose verdict was unsuccessful.
    pub failed: usize,
    /// Finished runs without a verdict.
    pub unresolved: usize,
    pub running: usize,
    /// `passed / completed * 100`, `0.0` when nothing completed.
    pub pass_rate: f64,
}

impl PassAtK {
    pub fn compute<'a>(runs: impl IntoIterator<Item = &'a RunSnapshot>) -> Self {
        let mut score = Self::default();
        for run in runs {
            score.total += 1;
            match (&run.outcome, run.is_finished()) {
                (Some(outcome), _) => {
                    score.completed += 1;
                    if outcome.success {
                        score.passed += 1;
                    } else {
                        score.failed += 1;
                    }
                }
                (None, true) => score.unresolved += 1,
                (None, false) => score.running += 1,
            }
        }
        if score.completed > 0 {
            score.pass_rate = score.passed as f64 / score.completed as f64 * 100.0;
        }
        score
    }
}

impl fmt::Display for PassAtK {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pass@{}: {} passed, {} failed, {} without verdict, {} running ({:.1}%)",
            self.total, self.passed, self.failed, self.unresolved, self.running, self.pass_rate
        )
    }
}
