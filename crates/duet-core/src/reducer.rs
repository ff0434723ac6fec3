//! Pure per-run state transition: `(snapshot, event) -> snapshot'`.
use std::sync::Arc;

use crate::event::SimEvent;
use crate::snapshot::RunSnapshot;

/// Something the caller should report about an applied event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    /// The remote side ended the run with an `error` event.
    RemoteFailure(String),
    /// A completed message did not carry the next turn number and was not
    /// committed.
    TurnOutOfSequence { expected: u32, received: u32 },
    /// A second verdict replaced an earlier one.
    VerificationReplaced,
    /// The event had no effect.
    Ignored {
        event: &'static str,
        reason: &'static str,
    },
}

/// Result of applying one event.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub snapshot: RunSnapshot,
    pub notice: Option<Notice>,
}

impl Transition {
    fn applied(snapshot: RunSnapshot) -> Self {
        Self {
            snapshot,
            notice: None,
        }
    }

    fn ignored(prev: &RunSnapshot, event: &SimEvent, reason: &'static str) -> Self {
        Self {
            snapshot: prev.clone(),
            notice: Some(Notice::Ignored {
                event: event.kind(),
                reason,
            }),
        }
    }
}

/// Derives the snapshot that follows `prev` once `event` is applied.
///
/// `prev` is left untouched. Finished snapshots absorb every event.
pub fn reduce(prev: &RunSnapshot, event: &SimEvent) -> Transition {
    if prev.is_finished() {
        return Transition::ignored(prev, event, "run already finished");
    }

    let mut next = prev.clone();
    let notice = match event {
        SimEvent::Status { .. } | SimEvent::VerificationRequested => None,
        SimEvent::VerificationStart => {
            next.verifying = true;
            None
        }
        SimEvent::TurnStart { speaker, .. } => {
            if !speaker.is_agent() {
                return Transition::ignored(prev, event, "speaker is not an agent");
            }
            next.current_speaker = Some(*speaker);
            next.streaming.clear();
            None
        }
        SimEvent::ContentDelta { speaker, delta, .. } => {
            if next.current_speaker.is_none() {
                return Transition::ignored(prev, event, "no turn in progress");
            }
            let Some(buffer) = next.streaming.content.slot_mut(*speaker) else {
                return Transition::ignored(prev, event, "speaker is not an agent");
            };
            buffer.push_str(delta);
            None
        }
        SimEvent::ReasoningDelta { speaker, delta, .. } => {
            let Some(buffer) = next.streaming.reasoning.slot_mut(*speaker) else {
                return Transition::ignored(prev, event, "speaker is not an agent");
            };
            buffer.push_str(delta);
            None
        }
        SimEvent::MessageComplete { message, .. } => {
            next.streaming.clear();
            next.current_speaker = None;
            let expected = prev.next_turn_number();
            if message.turn_number == expected {
                Arc::make_mut(&mut next.turns).push(message.clone());
                None
            } else {
                Some(Notice::TurnOutOfSequence {
                    expected,
                    received: message.turn_number,
                })
            }
        }
        SimEvent::VerificationComplete { result } => {
            next.verifying = false;
            next.outcome
                .replace(result.clone())
                .map(|_| Notice::VerificationReplaced)
        }
        SimEvent::SimulationComplete => {
            next.finish();
            None
        }
        SimEvent::Error { message } => {
            next.finish();
            Some(Notice::RemoteFailure(message.clone()))
        }
        SimEvent::Unknown => return Transition::ignored(prev, event, "unrecognized event type"),
    };

    match notice {
        Some(notice) => Transition {
            snapshot: next,
            notice: Some(notice),
        },
        None => Transition::applied(next),
    }
}

/// Folds a whole event sequence, collecting the notices in order.
pub fn replay<'a>(
    initial: RunSnapshot,
    events: impl IntoIterator<Item = &'a SimEvent>,
) -> (RunSnapshot, Vec<Notice>) {
    let mut snapshot = initial;
    let mut notices = Vec::new();
    for event in events {
        let transition = reduce(&snapshot, event);
        snapshot = transition.snapshot;
        notices.extend(transition.notice);
    }
    (snapshot, notices)
}
