//! Line-framed event envelope: `data: <json>\n` over an arbitrary chunked
//! transport.
//!
//! [`LineDecoder`] is the synchronous core (push bytes, get events);
//! [`EventStream`] wraps any chunk stream into a lazy, single-pass event
//! stream that ends when the transport closes.
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures::{Stream, StreamExt as _};
use tracing::{debug, warn};

use crate::event::SimEvent;

/// Prefix that marks an event line; every other line is ignored.
pub const DATA_PREFIX: &str = "data: ";

/// Incremental decoder holding back the trailing partial line between chunks.
#[derive(Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    /// Appends a chunk and returns the events of every line it completed.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<SimEvent> {
        self.buf.extend_from_slice(chunk);
        let Some(last_newline) = self.buf.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let complete: Vec<u8> = self.buf.drain(..=last_newline).collect();
        complete
            .split(|b| *b == b'\n')
            .filter_map(|line| parse_line(&String::from_utf8_lossy(line)))
            .collect()
    }

    /// Bytes received after the last newline.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Drops an unterminated trailing line once the transport has closed.
    pub fn finish(&mut self) {
        if !self.buf.is_empty() {
            debug!(
                bytes = self.buf.len(),
                "discarding unterminated line at end of stream"
            );
            self.buf.clear();
        }
    }
}

/// Decodes one complete line. Non-`data:` lines and malformed payloads yield
/// `None`; malformed payloads are logged.
pub fn parse_line(line: &str) -> Option<SimEvent> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let payload = line.strip_prefix(DATA_PREFIX)?;
    match serde_json::from_str::<SimEvent>(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, payload, "skipping malformed event payload");
            None
        }
    }
}

/// Lazy event sequence over a chunk stream.
///
/// Events are yielded once each, in arrival order. A transport error is
/// yielded once and ends the stream; otherwise the stream ends when the
/// underlying transport does.
pub struct EventStream<S> {
    inner: S,
    decoder: LineDecoder,
    pending: VecDeque<SimEvent>,
    done: bool,
}

impl<S> EventStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: LineDecoder::default(),
            pending: VecDeque::new(),
            done: false,
        }
    }
}

impl<S, B, E> EventStream<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    /// Waits for the next event; `None` once the transport is exhausted.
    pub async fn next_event(&mut self) -> Option<Result<SimEvent, E>> {
        self.next().await
    }
}

impl<S, B, E> Stream for EventStream<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    type Item = Result<SimEvent, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if this.done {
                return Poll::Ready(None);
            }
            match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
                Some(Ok(chunk)) => {
                    let events = this.decoder.push_chunk(chunk.as_ref());
                    this.pending.extend(events);
                }
                Some(Err(err)) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(err)));
                }
                None => {
                    this.done = true;
                    this.decoder.finish();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AgentRole;
    use futures::executor::block_on;
    use futures::stream;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, String>> + Unpin {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(p.as_bytes().to_vec()))
                .collect::<Vec<_>>(),
        )
    }

    fn collect(parts: &[&str]) -> Vec<SimEvent> {
        block_on(EventStream::new(chunks(parts)).map(|r| r.expect("event")).collect())
    }

    #[test]
    fn decoder_handles_line_split_mid_payload() {
        let mut decoder = LineDecoder::default();
        assert!(decoder.push_chunk(b"data: {\"typ").is_empty());
        let events =
            decoder.push_chunk(b"e\":\"turn_start\",\"speaker\":\"candidate\"}\n");
        assert_eq!(
            events,
            vec![SimEvent::TurnStart {
                speaker: AgentRole::Candidate,
                turn: None
            }]
        );
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn one_chunk_may_carry_several_events_and_a_partial_tail() {
        let mut decoder = LineDecoder::default();
        let events = decoder.push_chunk(
            b"data: {\"type\":\"verification_start\"}\n\ndata: {\"type\":\"simulation_complete\"}\ndata: {\"ty",
        );
        assert_eq!(
            events,
            vec![SimEvent::VerificationStart, SimEvent::SimulationComplete]
        );
        assert_eq!(decoder.pending_len(), "data: {\"ty".len());
    }

    #[test]
    fn non_data_lines_and_malformed_payloads_are_skipped() {
        let events = collect(&[
            ": keep-alive\n",
            "event: message\n",
            "data: {not json}\n",
            "data:{\"type\":\"simulation_complete\"}\n",
            "data: {\"type\":\"error\",\"message\":\"boom\"}\r\n",
        ]);
        assert_eq!(
            events,
            vec![SimEvent::Error {
                message: "boom".into()
            }]
        );
    }

    #[test]
    fn multibyte_text_split_across_chunks_survives() {
        let line = "data: {\"type\":\"content_delta\",\"speaker\":\"sim\",\"delta\":\"héllo\"}\n";
        let bytes = line.as_bytes();
        let split = line.find('é').expect("e-acute") + 1;
        let parts: Vec<Result<Vec<u8>, String>> =
            vec![Ok(bytes[..split].to_vec()), Ok(bytes[split..].to_vec())];
        let events: Vec<SimEvent> = block_on(
            EventStream::new(stream::iter(parts))
                .map(|r| r.expect("event"))
                .collect(),
        );
        assert_eq!(
            events,
            vec![SimEvent::ContentDelta {
                speaker: AgentRole::Sim,
                delta: "héllo".into(),
                turn: None
            }]
        );
    }

    #[test]
    fn unterminated_trailing_line_is_dropped_at_close() {
        let events = collect(&[
            "data: {\"type\":\"verification_start\"}\n",
            "data: {\"type\":\"simulation_complete\"}",
        ]);
        assert_eq!(events, vec![SimEvent::VerificationStart]);
    }

    #[test]
    fn transport_error_is_yielded_once_then_stream_ends() {
        let parts: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"data: {\"type\":\"verification_start\"}\n".to_vec()),
            Err("connection reset".into()),
            Ok(b"data: {\"type\":\"simulation_complete\"}\n".to_vec()),
        ];
        let mut events = EventStream::new(stream::iter(parts));
        block_on(async {
            assert_eq!(
                events.next_event().await,
                Some(Ok(SimEvent::VerificationStart))
            );
            assert_eq!(
                events.next_event().await,
                Some(Err("connection reset".to_string()))
            );
            assert_eq!(events.next_event().await, None);
            assert_eq!(events.next_event().await, None);
        });
    }
}
