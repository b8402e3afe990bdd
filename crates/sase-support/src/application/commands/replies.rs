//! Replies and internal notes

use serde_json::json;
use tracing::info;

use super::TicketService;
use crate::domain::aggregates::{NewReply, Ticket};
use crate::domain::events::TicketEvent;
use crate::domain::services::metadata::keys;
use crate::domain::value_objects::{NoteId, ReplyId, TicketId, UserId};
use crate::error::{Result, SupportError};
use crate::ports::outbound::{NewRecord, RecordKind};

const PUBLISHED: &str = "publish";

impl TicketService {
    /// Post a reply on a persisted ticket.
    ///
    /// A reply flagged `close` is marked as the resolution. The ticket status
    /// is left alone; closing it is up to the caller.
    pub async fn add_reply(&self, ticket: &Ticket, reply: NewReply) -> Result<ReplyId> {
        let ticket_id = persisted_id(ticket)?;
        if reply.response.trim().is_empty() {
            return Err(SupportError::Validation("reply has no response".into()));
        }

        let mut record = NewRecord::new(RecordKind::Reply, PUBLISHED);
        record.content = reply.response;
        record.parent = Some(ticket_id);
        record.author = reply.author;
        let reply_id = self.records.create(record).await?;

        let customer_id = reply.customer_id.or(ticket.customer_id);
        if let Some(customer_id) = customer_id {
            self.write_meta(reply_id, keys::REPLY_CUSTOMER_ID, json!(customer_id.value())).await?;
        }
        if let Some(agent) = reply.agent {
            self.write_meta(reply_id, keys::REPLY_AGENT, json!(agent.value())).await?;
        }
        self.write_meta(reply_id, keys::TICKET_KEY, json!(ticket.key)).await?;
        if reply.close {
            self.write_meta(reply_id, keys::REPLY_RESOLUTION, json!(true)).await?;
        }

        info!(ticket_id = %ticket_id, reply_id = %reply_id, resolves = reply.close, "Reply added");
        self.events
            .publish(TicketEvent::ReplyAdded { ticket_id, reply_id, resolves: reply.close })
            .await;
        Ok(reply_id)
    }

    pub async fn add_note(&self, ticket: &Ticket, text: &str, author: Option<UserId>) -> Result<NoteId> {
        let ticket_id = persisted_id(ticket)?;
        if text.trim().is_empty() {
            return Err(SupportError::Validation("note is empty".into()));
        }

        let mut record = NewRecord::new(RecordKind::Note, PUBLISHED);
        record.content = text.to_string();
        record.parent = Some(ticket_id);
        record.author = author;
        let note_id = self.records.create(record).await?;

        self.events.publish(TicketEvent::NoteAdded { ticket_id, note_id }).await;
        Ok(note_id)
    }

    /// Delete one of the ticket's notes. Anything else is `NotFound`.
    pub async fn delete_note(&self, ticket: &Ticket, note_id: NoteId) -> Result<()> {
        let ticket_id = persisted_id(ticket)?;
        let note = self
            .records
            .get(note_id)
            .await?
            .filter(|r| r.kind == RecordKind::Note && r.parent == Some(ticket_id))
            .ok_or_else(|| SupportError::NotFound(format!("note {note_id} on ticket {ticket_id}")))?;

        self.records.delete(note.id).await?;
        self.events.publish(TicketEvent::NoteDeleted { ticket_id, note_id }).await;
        Ok(())
    }
}

fn persisted_id(ticket: &Ticket) -> Result<TicketId> {
    ticket
        .id()
        .ok_or_else(|| SupportError::Validation("ticket has not been saved".into()))
}
