//! Terminal output for `duet`.
use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use duet_core::{ModelCatalog, PassAtK, RunPhase, RunSnapshot, Turn};
use duet_harness::{BatchReport, RunMap};

/// One line per committed turn: `[run N] #T role: content`.
pub fn turn_line(run_number: usize, turn: &Turn) -> String {
    format!(
        "[run {run_number}] #{} {}: {}",
        turn.turn_number,
        turn.role,
        turn.content.trim()
    )
}

pub fn phase_label(phase: RunPhase) -> &'static str {
    match phase {
        RunPhase::Pending => "pending",
        RunPhase::Running => "running",
        RunPhase::Passed => "passed",
        RunPhase::Failed => "failed",
        RunPhase::NoVerdict => "no verdict",
    }
}

/// Prints turns as they are committed, each exactly once.
#[derive(Default)]
pub struct TurnPrinter {
    printed: HashMap<usize, Arc<Vec<Turn>>>,
}

impl TurnPrinter {
    /// Lines for turns that differ from what was last printed for each run.
    /// After a rerun or an edit, printing resumes from the first changed turn.
    pub fn new_lines(&mut self, runs: &RunMap) -> Vec<String> {
        let mut lines = Vec::new();
        for (index, run) in runs {
            let unchanged = self.printed.get(index).map_or(0, |printed| {
                printed
                    .iter()
                    .zip(run.turns.iter())
                    .take_while(|(a, b)| a == b)
                    .count()
            });
            lines.extend(
                run.turns[unchanged..]
                    .iter()
                    .map(|turn| turn_line(run.run_number, turn)),
            );
            self.printed.insert(*index, run.turns.clone());
        }
        lines
    }
}

/// Human-readable transcript of one run.
pub fn transcript(run: &RunSnapshot) -> String {
    let mut out = format!("run {} [{}]", run.run_number, phase_label(run.phase()));
    if let Some(id) = &run.run_id {
        out.push_str(&format!(" {id}"));
    }
    out.push('\n');
    for turn in run.turns.iter() {
        out.push_str(&format!("  #{} {}: {}\n", turn.turn_number, turn.role, turn.content.trim()));
        if let Some(reasoning) = turn.reasoning.as_deref().filter(|r| !r.trim().is_empty()) {
            out.push_str(&format!("     (reasoning) {}\n", reasoning.trim()));
        }
    }
    if let Some(outcome) = &run.outcome {
        let verdict = if outcome.success { "PASS" } else { "FAIL" };
        out.push_str(&format!("  verdict: {verdict}: {}\n", outcome.explanation.trim()));
    }
    out
}

pub fn summary(report: &BatchReport) -> String {
    let mut out = String::new();
    for (index, failure) in report.failures() {
        out.push_str(&format!("run {} failed: {failure}\n", index + 1));
    }
    out.push_str(&report.score.to_string());
    out
}

pub fn catalog(models: &ModelCatalog) -> String {
    let mut out = String::new();
    for (provider, names) in [("anthropic", &models.anthropic), ("openai", &models.openai)] {
        out.push_str(provider);
        out.push_str(":\n");
        for name in names {
            out.push_str(&format!("  {name}\n"));
        }
    }
    out
}

#[derive(Serialize)]
struct JsonReport<'a> {
    batch_id: String,
    score: &'a PassAtK,
    runs: &'a [RunSnapshot],
    failures: Vec<JsonFailure>,
}

#[derive(Serialize)]
struct JsonFailure {
    run_number: usize,
    error: String,
}

pub fn json_report(
    report: &BatchReport,
    runs: &[RunSnapshot],
) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&JsonReport {
        batch_id: report.batch_id.to_string(),
        score: &report.score,
        runs,
        failures: report
            .failures()
            .map(|(index, failure)| JsonFailure {
                run_number: index + 1,
                error: failure.to_string(),
            })
            .collect(),
    })
}
