//! Ticket application service
//!
//! `TicketService` owns the ports and runs the hydration pipeline, the save
//! protocol, status transitions and reply/note creation.

mod hydrate;
mod replies;
mod save;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::application::status::{StatusMachine, TransitionOutcome};
use crate::config::SupportConfig;
use crate::domain::aggregates::{NewReply, PendingField, Ticket};
use crate::domain::services::SlaCalculator;
use crate::domain::value_objects::{NoteId, RecordId, ReplyId, TicketId, TicketStatus, UserId};
use crate::error::Result;
use crate::infrastructure::events::EventBus;
use crate::ports::inbound::TicketUseCases;
use crate::ports::outbound::{AttachmentStore, CustomerDirectory, MetaStore, RecordStore};

/// Label returned for tickets whose source is not in the source table
pub const UNKNOWN_SOURCE: &str = "Source could not be found";

/// Request context of a save
#[derive(Clone, Debug, Default)]
pub struct SaveContext {
    /// Authenticated user performing the save
    pub current_user: Option<UserId>,
    /// The save comes from a ticket submission by `current_user`
    pub submitting: bool,
    pub client_ip: Option<String>,
}

impl SaveContext {
    /// Context of an authenticated user submitting a new ticket
    pub fn submission(user: UserId) -> Self {
        Self { current_user: Some(user), submitting: true, client_ip: None }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }
}

/// What a save did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// Pending fields were processed
    pub saved: bool,
    /// A backing record was created
    pub created: bool,
    pub flushed: Vec<PendingField>,
    /// Fields whose flush failed. They are not retried or rolled back.
    pub failed: Vec<PendingField>,
    /// The consolidated metadata document was rewritten
    pub meta_written: bool,
    pub status: Option<TransitionOutcome>,
}

pub struct TicketService {
    records: Arc<dyn RecordStore>,
    meta: Arc<dyn MetaStore>,
    customers: Arc<dyn CustomerDirectory>,
    attachments: Arc<dyn AttachmentStore>,
    events: Arc<EventBus>,
    status: StatusMachine,
    config: Arc<SupportConfig>,
}

impl TicketService {
    pub fn new(
        records: Arc<dyn RecordStore>,
        meta: Arc<dyn MetaStore>,
        customers: Arc<dyn CustomerDirectory>,
        attachments: Arc<dyn AttachmentStore>,
        events: Arc<EventBus>,
        config: Arc<SupportConfig>,
    ) -> Self {
        let status = StatusMachine::new(records.clone(), events.clone(), config.clone());
        Self {
            records,
            meta,
            customers,
            attachments,
            events,
            status,
            config,
        }
    }

    pub fn status_machine(&self) -> &StatusMachine {
        &self.status
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn config(&self) -> &SupportConfig {
        &self.config
    }

    pub fn sla(&self) -> SlaCalculator {
        SlaCalculator::new(self.config.date_format.clone())
    }

    /// Transition a persisted ticket right away, outside of a save
    pub async fn update_status(&self, ticket: &mut Ticket, status: TicketStatus) -> Result<TransitionOutcome> {
        self.status.transition(ticket, status).await
    }

    /// Display name of the channel the ticket was logged through
    pub fn source_label(&self, ticket: &Ticket) -> String {
        self.config
            .source_label(ticket.source())
            .unwrap_or(UNKNOWN_SOURCE)
            .to_string()
    }

    async fn meta_value(&self, id: RecordId, key: &str) -> Result<Option<Value>> {
        Ok(self.meta.get(id, key).await?.filter(|v| !v.is_null()))
    }

    async fn write_meta(&self, id: RecordId, key: &str, value: Value) -> Result<()> {
        self.meta.set(id, key, value, None).await?;
        Ok(())
    }
}

#[async_trait]
impl TicketUseCases for TicketService {
    async fn hydrate(&self, id: TicketId) -> Result<Ticket> {
        TicketService::hydrate(self, id).await
    }

    async fn save(&self, ticket: &mut Ticket, ctx: &SaveContext) -> Result<SaveReport> {
        TicketService::save(self, ticket, ctx).await
    }

    async fn update_status(&self, ticket: &mut Ticket, status: TicketStatus) -> Result<TransitionOutcome> {
        TicketService::update_status(self, ticket, status).await
    }

    async fn add_reply(&self, ticket: &Ticket, reply: NewReply) -> Result<ReplyId> {
        TicketService::add_reply(self, ticket, reply).await
    }

    async fn add_note(&self, ticket: &Ticket, text: &str, author: Option<UserId>) -> Result<NoteId> {
        TicketService::add_note(self, ticket, text, author).await
    }

    async fn delete_note(&self, ticket: &Ticket, note: NoteId) -> Result<()> {
        TicketService::delete_note(self, ticket, note).await
    }
}
