//! Support value objects
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

macro_rules! numeric_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub fn new(id: u64) -> Self { Self(id) }
            pub fn value(&self) -> u64 { self.0 }

            /// Read an id out of a stored meta value. Zero, blanks and
            /// non-numeric values are treated as "no id".
            pub fn from_meta(value: &Value) -> Option<Self> {
                let raw = match value {
                    Value::Number(n) => n.as_u64(),
                    Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                }?;
                (raw != 0).then_some(Self(raw))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
        }
    };
}

numeric_id!(
    /// Id of a content record. Tickets, replies and notes share this id space.
    RecordId
);
numeric_id!(CustomerId);
numeric_id!(
    /// Linked user account
    UserId
);
numeric_id!(AgentId);
numeric_id!(AttachmentId);

pub type TicketId = RecordId;
pub type ReplyId = RecordId;
pub type NoteId = RecordId;

/// Ticket lifecycle status.
///
/// Only the four known states carry labels and side effects; anything else
/// read from the record store is kept verbatim in `Other`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum TicketStatus {
    #[default]
    New,
    Open,
    Hold,
    Closed,
    Other(String),
}

impl TicketStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "new" => Self::New,
            "open" => Self::Open,
            "hold" => Self::Hold,
            "closed" => Self::Closed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::New => "new",
            Self::Open => "open",
            Self::Hold => "hold",
            Self::Closed => "closed",
            Self::Other(raw) => raw,
        }
    }

    pub fn is_closed(&self) -> bool { matches!(self, Self::Closed) }
}

impl From<&str> for TicketStatus {
    fn from(raw: &str) -> Self { Self::parse(raw) }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Intake channel the ticket was logged through (1 = website).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketSource(u32);

impl TicketSource {
    pub const WEBSITE: TicketSource = TicketSource(1);

    pub fn new(source: u32) -> Self { Self(source) }
    pub fn value(&self) -> u32 { self.0 }

    pub fn from_meta(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).map(Self),
            Value::String(s) => s.trim().parse().ok().map(Self),
            _ => None,
        }
    }
}

impl Default for TicketSource {
    fn default() -> Self { Self::WEBSITE }
}
