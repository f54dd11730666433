//! The event protocol between the engine and its callers.
//!
//! A query produces zero or more `token` events followed by exactly one
//! terminal outcome: `citation` then `end` on success, or a lone `error`.
//! Nothing is emitted after the terminal outcome.
//!
//! On the wire every event is a name plus a string payload, which maps
//! directly onto an SSE frame.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Payload of the `end` event.
pub const END_MESSAGE: &str = "Stream complete";

/// Receiving half of a query's event stream. Dropping it cancels the query.
pub type EventStream = mpsc::Receiver<StreamEvent>;

/// Where an answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CitationSource {
    #[serde(rename = "Internal Docs")]
    InternalDocs,
    #[serde(rename = "Hybrid")]
    Hybrid,
    #[serde(rename = "General LLM")]
    GeneralLlm,
}

impl std::fmt::Display for CitationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InternalDocs => "Internal Docs",
            Self::Hybrid => "Hybrid",
            Self::GeneralLlm => "General LLM",
        };
        f.write_str(s)
    }
}

/// Provenance attached to a successful answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub source: CitationSource,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Citation {
    pub fn new(source: CitationSource, confidence: Option<f64>) -> Self {
        Self {
            source,
            confidence,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// One event of a query's response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A fragment of answer text.
    Token(String),
    /// Provenance of the answer. Precedes `End`.
    Citation(Citation),
    /// Successful completion.
    End(String),
    /// Failure. Terminal on its own.
    Error(String),
}

impl StreamEvent {
    pub fn token(text: impl Into<String>) -> Self {
        Self::Token(text.into())
    }

    pub fn end() -> Self {
        Self::End(END_MESSAGE.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    /// Event name on the wire.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Token(_) => "token",
            Self::Citation(_) => "citation",
            Self::End(_) => "end",
            Self::Error(_) => "error",
        }
    }

    /// Event payload on the wire. Citations are JSON encoded.
    pub fn payload(&self) -> String {
        match self {
            Self::Token(text) | Self::End(text) | Self::Error(text) => text.clone(),
            Self::Citation(citation) => {
                serde_json::to_string(citation).unwrap_or_else(|_| "null".into())
            }
        }
    }

    /// `End` or `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End(_) | Self::Error(_))
    }
}

/// Errors decoding or sequencing protocol events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown event type '{0}'")]
    UnknownEvent(String),

    #[error("malformed citation payload: {0}")]
    MalformedCitation(String),

    #[error("'{event}' is not allowed after '{after}'")]
    OutOfOrder { event: String, after: String },

    #[error("stream ended without a terminal event")]
    Incomplete,
}

/// An event as a name and a string payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEvent {
    pub event: String,
    pub data: String,
}

impl From<&StreamEvent> for WireEvent {
    fn from(event: &StreamEvent) -> Self {
        Self {
            event: event.event_type().to_string(),
            data: event.payload(),
        }
    }
}

impl From<StreamEvent> for WireEvent {
    fn from(event: StreamEvent) -> Self {
        Self::from(&event)
    }
}

impl TryFrom<WireEvent> for StreamEvent {
    type Error = ProtocolError;

    fn try_from(wire: WireEvent) -> Result<Self, ProtocolError> {
        match wire.event.as_str() {
            "token" => Ok(Self::Token(wire.data)),
            "end" => Ok(Self::End(wire.data)),
            "error" => Ok(Self::Error(wire.data)),
            "citation" => serde_json::from_str(&wire.data)
                .map(Self::Citation)
                .map_err(|e| ProtocolError::MalformedCitation(e.to_string())),
            _ => Err(ProtocolError::UnknownEvent(wire.event)),
        }
    }
}

/// A whole response collapsed into one JSON object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregatedResponse {
    /// All token payloads concatenated in order.
    pub message: String,
    /// The parsed citation, or `null` when absent or unparsable.
    pub citation: Option<Citation>,
    /// Number of events seen, of every type.
    pub events: usize,
    /// The error message when the query failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AggregatedResponse {
    pub fn from_wire(events: &[WireEvent]) -> Self {
        let message = events
            .iter()
            .filter(|e| e.event == "token")
            .map(|e| e.data.as_str())
            .collect();

        let citation = events
            .iter()
            .find(|e| e.event == "citation")
            .and_then(|e| serde_json::from_str(&e.data).ok());

        let error = events
            .iter()
            .find(|e| e.event == "error")
            .map(|e| e.data.clone());

        Self {
            message,
            citation,
            events: events.len(),
            error,
        }
    }
}

/// Drain a stream to completion and aggregate it.
pub async fn aggregate(mut stream: EventStream) -> AggregatedResponse {
    let mut wire = Vec::new();
    while let Some(event) = stream.recv().await {
        wire.push(WireEvent::from(event));
    }
    AggregatedResponse::from_wire(&wire)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Streaming,
    Cited,
    Done,
}

/// Checks that a sequence of events follows the protocol.
#[derive(Debug)]
pub struct SequenceValidator {
    phase: Phase,
    last: Option<&'static str>,
}

impl Default for SequenceValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceValidator {
    pub fn new() -> Self {
        Self {
            phase: Phase::Streaming,
            last: None,
        }
    }

    /// Accept the next event, or explain why it can't follow the previous one.
    pub fn push(&mut self, event: &StreamEvent) -> Result<(), ProtocolError> {
        let next = match (self.phase, event) {
            (Phase::Streaming, StreamEvent::Token(_)) => Phase::Streaming,
            (Phase::Streaming, StreamEvent::Citation(_)) => Phase::Cited,
            (Phase::Streaming, StreamEvent::Error(_)) => Phase::Done,
            (Phase::Cited, StreamEvent::End(_)) => Phase::Done,
            _ => {
                return Err(ProtocolError::OutOfOrder {
                    event: event.event_type().to_string(),
                    after: self.last.unwrap_or("start").to_string(),
                });
            }
        };
        self.phase = next;
        self.last = Some(event.event_type());
        Ok(())
    }

    /// The sequence must have reached a terminal event.
    pub fn finish(&self) -> Result<(), ProtocolError> {
        if self.phase == Phase::Done {
            Ok(())
        } else {
            Err(ProtocolError::Incomplete)
        }
    }

    /// Validate a complete sequence.
    pub fn check(events: &[StreamEvent]) -> Result<(), ProtocolError> {
        let mut validator = Self::new();
        for event in events {
            validator.push(event)?;
        }
        validator.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn citation() -> Citation {
        Citation::new(CitationSource::InternalDocs, Some(0.82))
    }

    #[test]
    fn event_type_names() {
        assert_eq!(StreamEvent::token("x").event_type(), "token");
        assert_eq!(StreamEvent::Citation(citation()).event_type(), "citation");
        assert_eq!(StreamEvent::end().event_type(), "end");
        assert_eq!(StreamEvent::error("x").event_type(), "error");
    }

    #[test]
    fn citation_source_wire_names() {
        let json = serde_json::to_string(&CitationSource::GeneralLlm).unwrap();
        assert_eq!(json, r#""General LLM""#);
        let parsed: CitationSource = serde_json::from_str(r#""Internal Docs""#).unwrap();
        assert_eq!(parsed, CitationSource::InternalDocs);
        assert_eq!(CitationSource::Hybrid.to_string(), "Hybrid");
    }

    #[test]
    fn citation_payload_is_json() {
        let event = StreamEvent::Citation(
            Citation::new(CitationSource::InternalDocs, Some(0.0))
                .with_notes("no relevant context found"),
        );
        let payload: serde_json::Value = serde_json::from_str(&event.payload()).unwrap();
        assert_eq!(payload["source"], "Internal Docs");
        assert_eq!(payload["confidence"], 0.0);
        assert_eq!(payload["notes"], "no relevant context found");
    }

    #[test]
    fn citation_without_notes_omits_field() {
        let payload = StreamEvent::Citation(citation()).payload();
        assert!(!payload.contains("notes"));
    }

    #[test]
    fn end_payload() {
        assert_eq!(StreamEvent::end().payload(), "Stream complete");
    }

    #[test]
    fn wire_decode_of_every_kind() {
        for event in [
            StreamEvent::token("Hello"),
            StreamEvent::Citation(citation()),
            StreamEvent::end(),
            StreamEvent::error("boom"),
        ] {
            let decoded = StreamEvent::try_from(WireEvent::from(&event)).unwrap();
            assert_eq!(decoded, event);
        }
    }

    #[test]
    fn wire_decode_rejects_bad_input() {
        let unknown = WireEvent {
            event: "ping".into(),
            data: String::new(),
        };
        assert_eq!(
            StreamEvent::try_from(unknown),
            Err(ProtocolError::UnknownEvent("ping".into()))
        );

        let malformed = WireEvent {
            event: "citation".into(),
            data: "{not json".into(),
        };
        assert!(matches!(
            StreamEvent::try_from(malformed),
            Err(ProtocolError::MalformedCitation(_))
        ));
    }

    #[test]
    fn aggregate_concatenates_tokens_and_parses_citation() {
        let wire: Vec<WireEvent> = [
            StreamEvent::token("Pro "),
            StreamEvent::token("has 50GB."),
            StreamEvent::Citation(citation()),
            StreamEvent::end(),
        ]
        .iter()
        .map(WireEvent::from)
        .collect();

        let response = AggregatedResponse::from_wire(&wire);
        assert_eq!(response.message, "Pro has 50GB.");
        assert_eq!(response.citation, Some(citation()));
        assert_eq!(response.events, 4);
        assert!(response.error.is_none());
    }

    #[test]
    fn aggregate_tolerates_unparsable_citation() {
        let wire = vec![
            WireEvent {
                event: "citation".into(),
                data: "garbage".into(),
            },
            WireEvent::from(StreamEvent::end()),
        ];
        let response = AggregatedResponse::from_wire(&wire);
        assert!(response.citation.is_none());
        assert_eq!(response.events, 2);
    }

    #[test]
    fn aggregated_json_shape() {
        let response = AggregatedResponse::from_wire(&[WireEvent::from(StreamEvent::error("down"))]);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["message"], "");
        assert!(json["citation"].is_null());
        assert_eq!(json["events"], 1);
        assert_eq!(json["error"], "down");
    }

    #[tokio::test]
    async fn aggregate_drains_channel() {
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            let _ = tx.send(StreamEvent::token("a")).await;
            let _ = tx.send(StreamEvent::token("b")).await;
            let _ = tx.send(StreamEvent::Citation(citation())).await;
            let _ = tx.send(StreamEvent::end()).await;
        });
        let response = aggregate(rx).await;
        assert_eq!(response.message, "ab");
        assert_eq!(response.events, 4);
    }

    #[test]
    fn validator_accepts_success_and_failure_shapes() {
        assert!(SequenceValidator::check(&[
            StreamEvent::token("a"),
            StreamEvent::Citation(citation()),
            StreamEvent::end(),
        ])
        .is_ok());
        assert!(SequenceValidator::check(&[StreamEvent::Citation(citation()), StreamEvent::end()]).is_ok());
        assert!(SequenceValidator::check(&[StreamEvent::token("a"), StreamEvent::error("x")]).is_ok());
    }

    #[test]
    fn validator_rejects_events_after_terminal() {
        let err = SequenceValidator::check(&[StreamEvent::error("x"), StreamEvent::token("late")])
            .unwrap_err();
        assert_eq!(
            err,
            ProtocolError::OutOfOrder {
                event: "token".into(),
                after: "error".into()
            }
        );
    }

    #[test]
    fn validator_rejects_end_without_citation() {
        assert!(SequenceValidator::check(&[StreamEvent::token("a"), StreamEvent::end()]).is_err());
    }

    #[test]
    fn validator_rejects_unterminated_stream() {
        assert_eq!(
            SequenceValidator::check(&[StreamEvent::token("a")]),
            Err(ProtocolError::Incomplete)
        );
        assert_eq!(
            SequenceValidator::check(&[StreamEvent::token("a"), StreamEvent::Citation(citation())]),
            Err(ProtocolError::Incomplete)
        );
    }
}
