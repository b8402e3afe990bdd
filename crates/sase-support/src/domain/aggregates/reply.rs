//! Replies and notes are child records of a ticket

use crate::domain::value_objects::{AgentId, CustomerId, UserId};

/// Reply to be posted on a ticket
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewReply {
    pub response: String,
    pub author: Option<UserId>,
    pub customer_id: Option<CustomerId>,
    pub agent: Option<AgentId>,
    /// The reply resolves the ticket. Acting on it is up to the caller.
    pub close: bool,
}

impl NewReply {
    pub fn new(response: impl Into<String>) -> Self {
        Self { response: response.into(), ..Self::default() }
    }
}
