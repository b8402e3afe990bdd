//! Save protocol

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{SaveContext, SaveReport, TicketService};
use crate::application::status::TransitionOutcome;
use crate::domain::aggregates::{Customer, NewCustomer, PendingField, Ticket};
use crate::domain::events::TicketEvent;
use crate::domain::services::metadata::{self, fields, keys, MetaDocument};
use crate::domain::services::{generate_ticket_key, SlaCalculator};
use crate::domain::value_objects::{TicketId, TicketStatus};
use crate::error::{Result, SupportError};
use crate::ports::outbound::{NewRecord, RecordKind, RecordUpdate};

impl TicketService {
    /// Persist a ticket.
    ///
    /// New tickets get their backing record first, and any ticket without a
    /// customer is linked to one before anything is flushed. Pending
    /// fields are then flushed one by one, the consolidated metadata document
    /// is merged and written if it changed, and the ticket is re-hydrated.
    pub async fn save(&self, ticket: &mut Ticket, ctx: &SaveContext) -> Result<SaveReport> {
        let mut report = SaveReport::default();

        if ticket.id.is_none() {
            self.insert_ticket(ticket, ctx).await?;
            report.created = true;
        }
        if ticket.reconcile_id() {
            debug!(ticket_id = ?ticket.id, "Staged ticket id reset before save");
        }
        let id = ticket
            .id
            .ok_or_else(|| SupportError::Persistence("ticket has no record id".into()))?;
        if ticket.customer_id.is_none() {
            self.link_customer(ticket, id, ctx).await?;
        }

        if ticket.pending.is_empty() {
            *ticket = self.hydrate(id).await?;
            return Ok(report);
        }

        for field in ticket.pending.drain() {
            match self.flush_field(ticket, id, field).await {
                Ok(outcome) => {
                    if outcome.is_some() {
                        report.status = outcome;
                    }
                    report.flushed.push(field);
                }
                Err(e) => {
                    warn!(ticket_id = %id, field = field.as_str(), error = %e, "Ticket field not saved");
                    report.failed.push(field);
                }
            }
        }

        if let Some(customer_id) = ticket.customer_id {
            if let Err(e) = self.customers.increment_ticket_count(customer_id).await {
                warn!(ticket_id = %id, customer_id = %customer_id, error = %e, "Customer ticket count not updated");
            }
        }

        report.meta_written = self.write_consolidated_meta(ticket, id).await?;
        report.saved = true;

        self.events
            .publish(TicketEvent::Saved { ticket_id: id, fields: report.flushed.clone() })
            .await;
        debug!(
            ticket_id = %id,
            flushed = report.flushed.len(),
            failed = report.failed.len(),
            meta_written = report.meta_written,
            "Ticket saved"
        );

        *ticket = self.hydrate(id).await?;
        Ok(report)
    }

    /// Create the backing record for a new ticket
    async fn insert_ticket(&self, ticket: &mut Ticket, ctx: &SaveContext) -> Result<()> {
        let now = Utc::now();

        if ticket.title.trim().is_empty() {
            ticket.title = self.config.new_ticket_title();
        }
        if ticket.ip.is_empty() {
            let ip = ctx
                .client_ip
                .clone()
                .filter(|ip| !ip.trim().is_empty())
                .unwrap_or_else(|| self.config.default_ip.clone());
            ticket.set_ip(ip);
        }
        if ticket.key.is_empty() {
            ticket.set_key(generate_ticket_key(&ticket.email, &self.config.key_secret, now));
        }
        if ticket.form_data.is_some() {
            ticket.pending.insert(PendingField::FormData);
        }
        let opened_at = ticket.date.unwrap_or(now);
        if ticket.sla.is_none() && self.config.sla.enabled {
            let sla = &self.config.sla;
            let targets = SlaCalculator::targets_from(opened_at, sla.respond_hours, sla.resolve_hours);
            ticket.sla = (!targets.is_empty()).then_some(targets);
        }
        if !ticket.new_files.is_empty() {
            ticket.pending.insert(PendingField::Files);
        }
        ticket.pending.insert(PendingField::Sla);

        self.events.publish(TicketEvent::Creating { email: ticket.email.clone() }).await;

        let mut record = NewRecord::new(RecordKind::Ticket, TicketStatus::New.as_str());
        record.title = ticket.title.clone();
        record.content = ticket.content.clone();
        record.author = ctx.current_user.or(ticket.user_id);
        record.created_at = Some(opened_at);

        let id = self.records.create(record).await.map_err(|e| {
            warn!(email = %ticket.email, error = %e, "Ticket record not created");
            SupportError::Persistence(e.to_string())
        })?;
        ticket.id = Some(id);
        ticket.staged_id = Some(id);
        ticket.persisted_status = Some(TicketStatus::New);
        ticket.awaiting_customer = true;
        Ok(())
    }

    /// Attach the ticket to its customer. Creation is complete once this
    /// succeeds; a failure leaves the ticket without a customer so the next
    /// save tries again.
    async fn link_customer(&self, ticket: &mut Ticket, id: TicketId, ctx: &SaveContext) -> Result<()> {
        let customer = self.resolve_customer(ticket, ctx).await?;
        self.customers.attach_ticket(customer.id, id).await?;
        ticket.set_customer_id(customer.id);

        if std::mem::take(&mut ticket.awaiting_customer) {
            info!(ticket_id = %id, customer_id = %customer.id, "Ticket created");
            self.events
                .publish(TicketEvent::Created { ticket_id: id, customer_id: customer.id })
                .await;
        } else {
            info!(ticket_id = %id, customer_id = %customer.id, "Ticket linked to customer");
        }
        Ok(())
    }

    /// Customer for a new ticket. A signed-in submitter keeps their own
    /// customer record; everyone else is matched or created by email.
    async fn resolve_customer(&self, ticket: &Ticket, ctx: &SaveContext) -> Result<Customer> {
        if let (true, Some(user)) = (ctx.submitting, ctx.current_user) {
            if let Some(customer) = self.customers.find_by_user_id(user).await? {
                if !ticket.email.is_empty() && !customer.has_email(&ticket.email) {
                    self.customers.add_alternate_email(customer.id, &ticket.email).await?;
                    debug!(customer_id = %customer.id, "Ticket email added to customer");
                }
                return Ok(customer);
            }
        }

        let name = format!("{} {}", ticket.first_name.trim(), ticket.last_name.trim());
        let customer = self
            .customers
            .find_or_create(NewCustomer {
                name: name.trim().to_string(),
                email: ticket.email.clone(),
                user_id: ticket.user_id,
            })
            .await?;
        Ok(customer)
    }

    /// Persist one pending field. Returns the transition outcome for `Status`.
    async fn flush_field(
        &self,
        ticket: &mut Ticket,
        id: TicketId,
        field: PendingField,
    ) -> Result<Option<TransitionOutcome>> {
        let stored = match field {
            PendingField::Status => {
                let to = ticket.status.clone();
                return self.status.transition(ticket, to).await.map(Some);
            }
            PendingField::Ip => self.write_meta(id, keys::USER_IP, json!(ticket.ip)).await,
            PendingField::CustomerId => {
                self.write_meta(id, keys::CUSTOMER_ID, metadata::to_json(&ticket.customer_id)).await
            }
            PendingField::UserId => self.write_meta(id, keys::USER_ID, metadata::to_json(&ticket.user_id)).await,
            PendingField::Key => self.write_meta(id, keys::TICKET_KEY, json!(ticket.key)).await,
            PendingField::ResolvedDate => {
                self.write_meta(id, keys::COMPLETED_DATE, metadata::to_json(&ticket.resolved_date)).await
            }
            PendingField::Sla => self.write_meta(id, keys::SLA, metadata::to_json(&ticket.sla)).await,
            PendingField::Email => {
                self.write_meta(id, keys::USER_EMAIL, json!(ticket.email)).await?;
                ticket.user_info.email = ticket.email.clone();
                Ok(())
            }
            PendingField::FirstName => {
                ticket.user_info.first_name = ticket.first_name.clone();
                Ok(())
            }
            PendingField::LastName => {
                ticket.user_info.last_name = ticket.last_name.clone();
                Ok(())
            }
            PendingField::FormData => match &ticket.form_data {
                Some(form) => {
                    self.write_meta(id, keys::FORM_ID, json!(form.form_id)).await?;
                    self.write_meta(id, keys::FORM_DATA, Value::Object(form.data.clone())).await
                }
                None => Ok(()),
            },
            PendingField::Date => {
                let update = RecordUpdate { created_at: ticket.date, ..Default::default() };
                self.update_record(id, update).await
            }
            PendingField::Title => {
                let update = RecordUpdate { title: Some(ticket.title.clone()), ..Default::default() };
                self.update_record(id, update).await
            }
            PendingField::Content => {
                let update = RecordUpdate { content: Some(ticket.content.clone()), ..Default::default() };
                self.update_record(id, update).await
            }
            PendingField::Files => self.attach_files(ticket, id).await,
            // Stored in the consolidated document only
            PendingField::Agent | PendingField::Source => Ok(()),
        };
        stored.map(|()| None)
    }

    async fn update_record(&self, id: TicketId, update: RecordUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }
        self.records.update(id, update).await?;
        Ok(())
    }

    /// Turn staged uploads into attachments. Files that fail stay staged.
    async fn attach_files(&self, ticket: &mut Ticket, id: TicketId) -> Result<()> {
        let mut failed = Vec::new();
        for file in std::mem::take(&mut ticket.new_files) {
            match self.attachments.attach(id, &file).await {
                Ok(attachment) => ticket.files.push(attachment),
                Err(e) => {
                    warn!(ticket_id = %id, file = %file.file_name, error = %e, "Attachment not stored");
                    failed.push(file);
                }
            }
        }

        if failed.is_empty() {
            return Ok(());
        }
        let count = failed.len();
        ticket.new_files = failed;
        Err(SupportError::Persistence(format!("{count} attachment(s) not stored")))
    }

    /// Merge the flushed fields over the stored document and write it if the
    /// result differs. Returns whether a write happened.
    async fn write_consolidated_meta(&self, ticket: &Ticket, id: TicketId) -> Result<bool> {
        let stored = metadata::as_document(self.meta.get(id, keys::TICKET_DATA).await?);

        let mut update = MetaDocument::new();
        update.insert(fields::AGENT.into(), metadata::to_json(&ticket.agent));
        update.insert(fields::SOURCE.into(), metadata::to_json(&ticket.source));
        update.insert(fields::SLA.into(), metadata::to_json(&ticket.sla));
        update.insert(fields::USER_INFO.into(), metadata::to_json(&ticket.user_info));
        update.insert(fields::USER_IP.into(), json!(ticket.ip));
        update.insert(fields::RESOLVED.into(), metadata::to_json(&ticket.resolved_date));
        update.insert(fields::FILES.into(), metadata::to_json(&ticket.files));

        let merged = metadata::merge_document(&stored, &update);
        if metadata::fingerprint(&merged) == metadata::fingerprint(&stored) {
            debug!(ticket_id = %id, "Ticket metadata unchanged, write skipped");
            return Ok(false);
        }

        self.meta
            .set(id, keys::TICKET_DATA, Value::Object(merged), None)
            .await
            .map_err(|e| SupportError::Persistence(e.to_string()))
    }
}
