use std::sync::Arc;

use serde::Serialize;

use crate::model::{AgentRole, RunId, SimulationState, Turn, VerificationOutcome};

/// One text accumulator per conversational agent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SpeakerText {
    pub candidate: String,
    pub sim: String,
}

impl SpeakerText {
    /// Text accumulated for `role`; `None` for `System`.
    pub fn get(&self, role: AgentRole) -> Option<&str> {
        match role {
            AgentRole::Candidate => Some(&self.candidate),
            AgentRole::Sim => Some(&self.sim),
            AgentRole::System => None,
        }
    }

    pub(crate) fn slot_mut(&mut self, role: AgentRole) -> Option<&mut String> {
        match role {
            AgentRole::Candidate => Some(&mut self.candidate),
            AgentRole::Sim => Some(&mut self.sim),
            AgentRole::System => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidate.is_empty() && self.sim.is_empty()
    }

    pub fn clear(&mut self) {
        self.candidate.clear();
        self.sim.clear();
    }
}

/// In-progress content and reasoning of the turn being streamed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StreamingBuffers {
    pub content: SpeakerText,
    pub reasoning: SpeakerText,
}

impl StreamingBuffers {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.reasoning.is_empty()
    }

    pub fn clear(&mut self) {
        self.content.clear();
        self.reasoning.clear();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Finished,
}

/// Display-level classification of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Placeholder waiting for its remote run id.
    Pending,
    Running,
    Passed,
    Failed,
    /// Finished without a verdict (errored, cancelled, or closed early).
    NoVerdict,
}

/// State of one run of a batch.
///
/// Snapshots are values: the reducer derives a new snapshot per event and the
/// committed turns are shared between successive snapshots until one of them
/// appends.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSnapshot {
    /// 1-based ordinal within the batch.
    pub run_number: usize,
    pub run_id: Option<RunId>,
    pub turns: Arc<Vec<Turn>>,
    pub streaming: StreamingBuffers,
    pub current_speaker: Option<AgentRole>,
    pub status: RunStatus,
    pub outcome: Option<VerificationOutcome>,
    /// The remote verifier is judging the conversation.
    pub verifying: bool,
}

impl RunSnapshot {
    /// Empty running placeholder.
    pub fn pending(run_number: usize) -> Self {
        Self {
            run_number,
            run_id: None,
            turns: Arc::new(Vec::new()),
            streaming: StreamingBuffers::default(),
            current_speaker: None,
            status: RunStatus::Running,
            outcome: None,
            verifying: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == RunStatus::Finished
    }

    pub fn phase(&self) -> RunPhase {
        match (&self.outcome, self.status) {
            (Some(outcome), _) if outcome.success => RunPhase::Passed,
            (Some(_), _) => RunPhase::Failed,
            (None, RunStatus::Finished) => RunPhase::NoVerdict,
            (None, RunStatus::Running) if self.run_id.is_none() => RunPhase::Pending,
            (None, RunStatus::Running) => RunPhase::Running,
        }
    }

    /// Turn number the next committed message must carry.
    pub fn next_turn_number(&self) -> u32 {
        self.turns.len() as u32 + 1
    }

    pub fn turn(&self, turn_number: u32) -> Option<&Turn> {
        self.turns.iter().find(|t| t.turn_number == turn_number)
    }

    /// Committed turns spoken by `role`, in order.
    pub fn turns_by(&self, role: AgentRole) -> impl Iterator<Item = &Turn> {
        self.turns.iter().filter(move |t| t.role == role)
    }

    pub fn with_run_id(&self, run_id: RunId) -> Self {
        Self {
            run_id: Some(run_id),
            ..self.clone()
        }
    }

    /// Terminal copy: finished, nobody speaking, nothing streaming.
    pub fn finished(&self) -> Self {
        let mut next = self.clone();
        next.finish();
        next
    }

    pub(crate) fn finish(&mut self) {
        self.status = RunStatus::Finished;
        self.current_speaker = None;
        self.verifying = false;
    }

    /// Equality that skips the per-turn comparison when both snapshots share
    /// the same committed-turn storage, which holds for every transition
    /// except a commit or an edit.
    pub fn same_state(&self, other: &Self) -> bool {
        self.status == other.status
            && self.current_speaker == other.current_speaker
            && self.verifying == other.verifying
            && self.run_number == other.run_number
            && self.run_id == other.run_id
            && self.outcome == other.outcome
            && self.streaming == other.streaming
            && (Arc::ptr_eq(&self.turns, &other.turns) || self.turns == other.turns)
    }

    /// Copy with one committed turn's text replaced; `None` when no turn has
    /// that number. `reasoning: None` keeps the existing reasoning.
    pub fn with_turn_edited(
        &self,
        turn_number: u32,
        content: &str,
        reasoning: Option<&str>,
    ) -> Option<Self> {
        let position = self
            .turns
            .iter()
            .position(|t| t.turn_number == turn_number)?;
        let mut next = self.clone();
        let turn = &mut Arc::make_mut(&mut next.turns)[position];
        turn.content = content.to_string();
        if let Some(reasoning) = reasoning {
            turn.reasoning = Some(reasoning.to_string());
        }
        Some(next)
    }

    /// Copy whose committed turns and verdict mirror the server's record.
    pub fn with_remote_state(&self, state: &SimulationState) -> Self {
        Self {
            run_id: Some(state.simulation_id.clone()),
            turns: Arc::new(state.messages.clone()),
            outcome: state.verification_result.clone(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn turn(n: u32, role: AgentRole, content: &str) -> Turn {
        Turn {
            role,
            content: content.into(),
            reasoning: Some("r".into()),
            timestamp: Utc::now(),
            turn_number: n,
        }
    }

    fn outcome(success: bool) -> VerificationOutcome {
        VerificationOutcome {
            success,
            explanation: String::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn same_state_matches_equality() {
        let base = RunSnapshot::pending(1).with_run_id(RunId::new("a"));
        let mut committed = base.clone();
        committed.turns = Arc::new(vec![turn(1, AgentRole::Candidate, "hi")]);

        let shared = committed.clone();
        assert!(Arc::ptr_eq(&shared.turns, &committed.turns));
        assert!(shared.same_state(&committed));

        let mut copied = committed.clone();
        copied.turns = Arc::new(committed.turns.as_ref().clone());
        assert!(copied.same_state(&committed));

        let edited = committed
            .with_turn_edited(1, "bye", None)
            .expect("turn 1");
        assert!(!edited.same_state(&committed));

        let mut streaming = committed.clone();
        streaming.streaming.content.sim.push('x');
        assert!(!streaming.same_state(&committed));
        assert!(!committed.finished().same_state(&committed));
    }

    #[test]
    fn phase_distinguishes_pending_running_and_terminal_cases() {
        let pending = RunSnapshot::pending(1);
        assert_eq!(pending.phase(), RunPhase::Pending);

        let running = pending.with_run_id(RunId::new("a"));
        assert_eq!(running.phase(), RunPhase::Running);
        assert_eq!(running.finished().phase(), RunPhase::NoVerdict);

        let mut judged = running.finished();
        judged.outcome = Some(outcome(true));
        assert_eq!(judged.phase(), RunPhase::Passed);
        judged.outcome = Some(outcome(false));
        assert_eq!(judged.phase(), RunPhase::Failed);
    }

    #[test]
    fn edit_replaces_one_turn_without_touching_previous_snapshot() {
        let mut snapshot = RunSnapshot::pending(1);
        snapshot.turns = Arc::new(vec![
            turn(1, AgentRole::Candidate, "hi"),
            turn(2, AgentRole::Sim, "hello"),
        ]);

        let edited = snapshot
            .with_turn_edited(2, "goodbye", None)
            .expect("turn exists");
        assert_eq!(edited.turn(2).map(|t| t.content.as_str()), Some("goodbye"));
        assert_eq!(edited.turn(2).and_then(|t| t.reasoning.as_deref()), Some("r"));
        assert_eq!(snapshot.turn(2).map(|t| t.content.as_str()), Some("hello"));

        let with_reasoning = edited
            .with_turn_edited(1, "hey", Some("new"))
            .expect("turn exists");
        assert_eq!(
            with_reasoning.turn(1).and_then(|t| t.reasoning.as_deref()),
            Some("new")
        );
        assert!(snapshot.with_turn_edited(9, "x", None).is_none());
    }

    #[test]
    fn turns_by_filters_role() {
        let mut snapshot = RunSnapshot::pending(1);
        snapshot.turns = Arc::new(vec![
            turn(1, AgentRole::Candidate, "a"),
            turn(2, AgentRole::Sim, "b"),
            turn(3, AgentRole::Candidate, "c"),
        ]);
        let contents: Vec<_> = snapshot
            .turns_by(AgentRole::Candidate)
            .map(|t| t.content.as_str())
            .collect();
        assert_eq!(contents, vec!["a", "c"]);
        assert_eq!(snapshot.next_turn_number(), 4);
    }

    #[test]
    fn system_role_has_no_buffer() {
        let mut text = SpeakerText::default();
        assert!(text.slot_mut(AgentRole::System).is_none());
        assert_eq!(text.get(AgentRole::System), None);
        assert_eq!(text.get(AgentRole::Sim), Some(""));
    }
}
