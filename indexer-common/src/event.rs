use std::fmt;
use std::str::FromStr;

use serde::{de::Visitor, Deserialize, Serialize};
use thiserror::Error;

/// Queue message attribute carrying the `X-Event-Type` header.
pub const EVENT_TYPE_ATTRIBUTE: &str = "eventType";
/// Queue message attribute carrying the `X-Event-Id` header.
pub const EVENT_ID_ATTRIBUTE: &str = "eventId";

/// Kinds of talk lifecycle events.
/// Anything we don't know about is kept as `Other` so newer producers don't break parsing.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub enum EventKind {
    TalkCreated,
    TalkUpdated,
    TalkPublished,
    TalkUnpublished,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::TalkCreated => "talk.created",
            EventKind::TalkUpdated => "talk.updated",
            EventKind::TalkPublished => "talk.published",
            EventKind::TalkUnpublished => "talk.unpublished",
            EventKind::Other(kind) => kind,
        }
    }
}

impl FromStr for EventKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "talk.created" => EventKind::TalkCreated,
            "talk.updated" => EventKind::TalkUpdated,
            "talk.published" => EventKind::TalkPublished,
            "talk.unpublished" => EventKind::TalkUnpublished,
            other => EventKind::Other(other.to_owned()),
        })
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

struct EventKindVisitor;

impl<'de> Visitor<'de> for EventKindVisitor {
    type Value = EventKind;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a talk event type string")
    }

    fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        match EventKind::from_str(s) {
            Ok(kind) => Ok(kind),
            Err(never) => match never {},
        }
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(EventKindVisitor)
    }
}

impl Serialize for EventKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum EventParseError {
    #[error("invalid event payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("event {event_id:?} has an empty entityId")]
    MissingEntityId { event_id: String },
}

/// A webhook notification about a change to a talk, as sent by the producer and stored
/// verbatim as the body of a queue message.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(default)]
    pub event_id: String,
    pub event_type: EventKind,
    /// The talk identifier.
    pub entity_id: String,
    #[serde(default)]
    pub conference_id: String,
}

impl WebhookEvent {
    /// Parse a raw queue message body.
    pub fn parse(body: &[u8]) -> Result<Self, EventParseError> {
        let event: WebhookEvent = serde_json::from_slice(body)?;

        if event.entity_id.is_empty() {
            return Err(EventParseError::MissingEntityId {
                event_id: event.event_id,
            });
        }

        Ok(event)
    }
}
