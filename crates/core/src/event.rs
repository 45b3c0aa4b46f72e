//! Streaming events: incremental progress reported by agents.
//!
//! Every `stream` call yields a lazy sequence of `Result<Event, AgentError>`
//! items. Per logical branch the sequence is either zero or more `Text`
//! events followed by exactly one `Done`, or a run truncated by a single
//! `Err` item. A consumer that stops pulling simply drops the stream.

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// What kind of progress an [`Event`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A chunk of output text.
    Text,
    /// The originating agent finished.
    Done,
    /// The originating agent failed.
    Error,
}

/// A single streamed item, tagged with the agent that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventType,

    pub agent_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
}

impl Event {
    pub fn text(agent_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: EventType::Text,
            agent_id: agent_id.into(),
            text: text.into(),
        }
    }

    pub fn done(agent_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: EventType::Done,
            agent_id: agent_id.into(),
            text: text.into(),
        }
    }

    /// An error report in event form, for transports that cannot carry
    /// `AgentError` values.
    pub fn error(agent_id: impl Into<String>, err: &AgentError) -> Self {
        Self {
            kind: EventType::Error,
            agent_id: agent_id.into(),
            text: err.to_string(),
        }
    }

    pub fn is_text(&self) -> bool {
        self.kind == EventType::Text
    }

    pub fn is_done(&self) -> bool {
        self.kind == EventType::Done
    }

    /// Wire name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            EventType::Text => "text",
            EventType::Done => "done",
            EventType::Error => "error",
        }
    }
}

/// The lazy, single-consumer sequence returned by [`Agent::stream`](crate::agent::Agent::stream).
///
/// Streams own everything they need, so each call produces an independent
/// sequence that can outlive the borrow of the agent that created it.
pub type EventStream = BoxStream<'static, Result<Event, AgentError>>;
