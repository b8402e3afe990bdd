//! Hydration pipeline

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use super::TicketService;
use crate::domain::aggregates::{Customer, FormSubmission, RequesterInfo, SlaBlock, Ticket};
use crate::domain::events::TicketEvent;
use crate::domain::services::metadata::{self, fields, keys, MetaDocument};
use crate::domain::value_objects::{
    AgentId, AttachmentId, CustomerId, RecordId, TicketId, TicketSource, TicketStatus, UserId,
};
use crate::error::{Result, SupportError};
use crate::ports::outbound::{Record, RecordKind};

impl TicketService {
    /// Load a ticket from the stores.
    ///
    /// Fails with `NotFound` when the record is missing or is not a ticket.
    /// The metadata document is fetched once and shared by every step.
    pub async fn hydrate(&self, id: TicketId) -> Result<Ticket> {
        let record = self
            .records
            .get(id)
            .await?
            .filter(|r| r.kind == RecordKind::Ticket)
            .ok_or_else(|| SupportError::NotFound(format!("ticket {id}")))?;
        let doc = metadata::as_document(self.meta.get(id, keys::TICKET_DATA).await?);

        let mut ticket = Ticket::new();
        ticket.id = Some(id);
        ticket.staged_id = Some(id);

        self.load_record(&mut ticket, &record);
        self.load_status(&mut ticket, &record).await?;
        self.load_children(&mut ticket, &doc).await?;
        self.load_identity(&mut ticket, &doc).await?;
        self.load_details(&mut ticket, &doc).await?;
        ticket.key = self.meta_string(id, keys::TICKET_KEY).await?;
        ticket.meta = doc;

        self.events.publish(TicketEvent::Hydrated { ticket_id: id }).await;
        debug!(ticket_id = %id, status = %ticket.status, "Ticket hydrated");
        Ok(ticket)
    }

    /// Like `hydrate`, but a failed lookup yields an empty ticket
    pub async fn hydrate_or_empty(&self, id: TicketId) -> Ticket {
        match self.hydrate(id).await {
            Ok(ticket) => ticket,
            Err(e) => {
                debug!(ticket_id = %id, error = %e, "Ticket not loaded");
                Ticket::new()
            }
        }
    }

    fn load_record(&self, ticket: &mut Ticket, record: &Record) {
        ticket.date = Some(record.created_at);
        ticket.modified_date = Some(record.modified_at);
        ticket.title = record.title.clone();
        ticket.content = record.content.clone();
    }

    async fn load_status(&self, ticket: &mut Ticket, record: &Record) -> Result<()> {
        let status = TicketStatus::parse(&record.status);
        ticket.status_label = self.config.status_label(&status);

        if status.is_closed() {
            let completed = self
                .meta_value(record.id, keys::COMPLETED_DATE)
                .await?
                .and_then(|v| serde_json::from_value::<DateTime<Utc>>(v).ok());
            ticket.resolved_date = Some(completed.unwrap_or(record.modified_at));
        }

        ticket.persisted_status = Some(status.clone());
        ticket.status = status;
        Ok(())
    }

    async fn load_children(&self, ticket: &mut Ticket, doc: &MetaDocument) -> Result<()> {
        let Some(id) = ticket.id else {
            return Ok(());
        };
        ticket.replies = self.records.children(id, RecordKind::Reply).await?.iter().map(|r| r.id).collect();
        ticket.notes = self.records.children(id, RecordKind::Note).await?.iter().map(|r| r.id).collect();
        ticket.files = metadata::read::<Vec<AttachmentId>>(doc, fields::FILES).unwrap_or_default();
        Ok(())
    }

    async fn load_identity(&self, ticket: &mut Ticket, doc: &MetaDocument) -> Result<()> {
        let Some(id) = ticket.id else {
            return Ok(());
        };

        ticket.ip = match metadata::read_str(doc, fields::USER_IP) {
            Some(ip) => ip.to_string(),
            None => self.meta_string(id, keys::USER_IP).await?,
        };
        ticket.agent = doc.get(fields::AGENT).and_then(AgentId::from_meta);
        ticket.customer_id = self
            .meta_value(id, keys::CUSTOMER_ID)
            .await?
            .and_then(|v| CustomerId::from_meta(&v));

        // Fetched once for the user id, email and requester info steps
        let customer = match ticket.customer_id {
            Some(customer_id) => self.customers.find_by_id(customer_id).await?,
            None => None,
        };

        ticket.user_id = self.resolve_user_id(id, customer.as_ref()).await?;

        ticket.email = self.meta_string(id, keys::USER_EMAIL).await?;
        if ticket.email.is_empty() {
            if let Some(customer) = &customer {
                ticket.email = customer.email.clone();
            }
        }

        ticket.user_info = requester_info(doc, ticket, customer.as_ref());
        ticket.first_name = ticket.user_info.first_name.clone();
        ticket.last_name = ticket.user_info.last_name.clone();
        Ok(())
    }

    /// Stored user id, repaired from the customer record when it is missing
    /// or disagrees with it. The repair write is best-effort.
    async fn resolve_user_id(&self, id: TicketId, customer: Option<&Customer>) -> Result<Option<UserId>> {
        let stored = self.meta_value(id, keys::USER_ID).await?.and_then(|v| UserId::from_meta(&v));
        let linked = customer.and_then(|c| c.user_id);

        let needs_repair = match (stored, linked) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(stored), Some(linked)) => stored != linked,
        };
        if !needs_repair {
            return Ok(stored);
        }

        if let Err(e) = self.write_meta(id, keys::USER_ID, metadata::to_json(&linked)).await {
            warn!(ticket_id = %id, error = %e, "Could not repair ticket user id");
        } else {
            debug!(ticket_id = %id, stored = ?stored, linked = ?linked, "Ticket user id repaired");
        }
        Ok(linked)
    }

    async fn load_details(&self, ticket: &mut Ticket, doc: &MetaDocument) -> Result<()> {
        let Some(id) = ticket.id else {
            return Ok(());
        };

        ticket.source = doc
            .get(fields::SOURCE)
            .and_then(TicketSource::from_meta)
            .unwrap_or_else(|| self.config.default_source());
        ticket.sla = metadata::read::<SlaBlock>(doc, fields::SLA).filter(|sla| !sla.is_empty());

        let form_id = self.meta_value(id, keys::FORM_ID).await?.and_then(|v| form_id(&v));
        let form_data = self.meta_value(id, keys::FORM_DATA).await?;
        ticket.form_data = match (form_id, form_data) {
            (Some(form_id), Some(Value::Object(data))) => Some(FormSubmission { form_id, data }),
            _ => None,
        };
        Ok(())
    }

    async fn meta_string(&self, id: RecordId, key: &str) -> Result<String> {
        Ok(self
            .meta_value(id, key)
            .await?
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default())
    }
}

fn form_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|id| *id != 0)
}

/// Stored requester block with gaps filled from the ticket, then from the
/// customer record
fn requester_info(doc: &MetaDocument, ticket: &Ticket, customer: Option<&Customer>) -> RequesterInfo {
    let mut info: RequesterInfo = metadata::read(doc, fields::USER_INFO).unwrap_or_default();

    if info.first_name.is_empty() {
        info.first_name = ticket.first_name.clone();
    }
    if info.last_name.is_empty() {
        info.last_name = ticket.last_name.clone();
    }
    if info.email.is_empty() {
        info.email = ticket.email.clone();
    }
    if info.id.is_none() {
        info.id = ticket.user_id;
    }

    if let Some(customer) = customer {
        let (first, last) = customer.split_name();
        if info.first_name.is_empty() {
            info.first_name = first;
        }
        if info.last_name.is_empty() {
            info.last_name = last;
        }
        if info.email.is_empty() {
            info.email = customer.email.clone();
        }
    }
    info
}
