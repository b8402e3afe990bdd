//! Ticket Aggregate
//!
//! In-memory view of one ticket with explicit dirty tracking. Every setter
//! stages its field in the pending set; `TicketService::save` flushes exactly
//! those fields and re-hydrates the ticket afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::domain::services::metadata::MetaDocument;
use crate::domain::value_objects::{
    AgentId, AttachmentId, CustomerId, NoteId, ReplyId, TicketId, TicketSource, TicketStatus, UserId,
};

/// Field identifiers tracked by the pending-change set.
///
/// Declaration order is flush order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PendingField {
    Date,
    Title,
    Content,
    Ip,
    CustomerId,
    UserId,
    FirstName,
    LastName,
    Email,
    Key,
    FormData,
    Agent,
    Source,
    Files,
    Sla,
    ResolvedDate,
    Status,
}

impl PendingField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Title => "title",
            Self::Content => "content",
            Self::Ip => "ip",
            Self::CustomerId => "customer_id",
            Self::UserId => "user_id",
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::Email => "email",
            Self::Key => "key",
            Self::FormData => "form_data",
            Self::Agent => "agent",
            Self::Source => "source",
            Self::Files => "files",
            Self::Sla => "sla",
            Self::ResolvedDate => "resolved_date",
            Self::Status => "status",
        }
    }
}

/// Set of fields mutated since the last successful save
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingChanges(BTreeSet<PendingField>);

impl PendingChanges {
    pub fn insert(&mut self, field: PendingField) { self.0.insert(field); }
    pub fn contains(&self, field: PendingField) -> bool { self.0.contains(&field) }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn iter(&self) -> impl Iterator<Item = PendingField> + '_ { self.0.iter().copied() }

    /// Empty the set, returning its fields in flush order
    pub fn drain(&mut self) -> Vec<PendingField> {
        std::mem::take(&mut self.0).into_iter().collect()
    }
}

/// Requester identity block stored under `user_info` in the metadata document.
///
/// Empty values are not serialized so a merge never blanks a stored value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequesterInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
}

/// Response and resolution deadlines
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_respond: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_resolve: Option<DateTime<Utc>>,
}

impl SlaBlock {
    pub fn is_empty(&self) -> bool {
        self.target_respond.is_none() && self.target_resolve.is_none()
    }
}

/// Front end form submission the ticket was logged from. The payload is opaque.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FormSubmission {
    pub form_id: u64,
    pub data: serde_json::Map<String, serde_json::Value>,
}

/// Upload staged on the ticket, resolved into an attachment on save
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingAttachment {
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    pub source_path: String,
}

/// Ticket aggregate root
#[derive(Clone, Debug, Default)]
pub struct Ticket {
    // Assigned once by the record store; never changed afterwards.
    pub(crate) id: Option<TicketId>,
    // Editable copy of the id, reset to `id` before every save.
    pub(crate) staged_id: Option<TicketId>,
    pub(crate) title: String,
    pub(crate) content: String,
    pub(crate) status: TicketStatus,
    // Status last read from or written to the record store. `None` until the
    // ticket has a backing record, so it never matches a real status.
    pub(crate) persisted_status: Option<TicketStatus>,
    pub(crate) status_label: String,
    pub(crate) date: Option<DateTime<Utc>>,
    pub(crate) modified_date: Option<DateTime<Utc>>,
    pub(crate) resolved_date: Option<DateTime<Utc>>,
    pub(crate) first_name: String,
    pub(crate) last_name: String,
    pub(crate) email: String,
    pub(crate) ip: String,
    pub(crate) user_id: Option<UserId>,
    pub(crate) customer_id: Option<CustomerId>,
    pub(crate) agent: Option<AgentId>,
    pub(crate) source: TicketSource,
    pub(crate) user_info: RequesterInfo,
    pub(crate) sla: Option<SlaBlock>,
    pub(crate) files: Vec<AttachmentId>,
    pub(crate) new_files: Vec<PendingAttachment>,
    pub(crate) replies: Vec<ReplyId>,
    pub(crate) notes: Vec<NoteId>,
    pub(crate) form_data: Option<FormSubmission>,
    pub(crate) key: String,
    pub(crate) meta: MetaDocument,
    pub(crate) pending: PendingChanges,
    // Record created but no customer linked yet
    pub(crate) awaiting_customer: bool,
}

impl Ticket {
    /// Blank ticket ready to be filled in and saved
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the ticket has no backing record. Failed lookups through
    /// `TicketService::hydrate_or_empty` return such a ticket.
    pub fn is_empty(&self) -> bool { self.id.is_none() }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn id(&self) -> Option<TicketId> { self.id }
    pub fn staged_id(&self) -> Option<TicketId> { self.staged_id }
    pub fn title(&self) -> &str { &self.title }
    pub fn content(&self) -> &str { &self.content }
    pub fn status(&self) -> &TicketStatus { &self.status }
    pub fn persisted_status(&self) -> Option<&TicketStatus> { self.persisted_status.as_ref() }
    pub fn status_label(&self) -> &str { &self.status_label }
    pub fn date(&self) -> Option<DateTime<Utc>> { self.date }
    pub fn modified_date(&self) -> Option<DateTime<Utc>> { self.modified_date }
    pub fn resolved_date(&self) -> Option<DateTime<Utc>> { self.resolved_date }
    pub fn first_name(&self) -> &str { &self.first_name }
    pub fn last_name(&self) -> &str { &self.last_name }
    pub fn email(&self) -> &str { &self.email }
    pub fn ip(&self) -> &str { &self.ip }
    pub fn user_id(&self) -> Option<UserId> { self.user_id }
    pub fn customer_id(&self) -> Option<CustomerId> { self.customer_id }
    pub fn agent(&self) -> Option<AgentId> { self.agent }
    pub fn source(&self) -> TicketSource { self.source }
    pub fn user_info(&self) -> &RequesterInfo { &self.user_info }
    pub fn sla(&self) -> Option<&SlaBlock> { self.sla.as_ref() }
    pub fn files(&self) -> &[AttachmentId] { &self.files }
    pub fn pending_files(&self) -> &[PendingAttachment] { &self.new_files }
    pub fn replies(&self) -> &[ReplyId] { &self.replies }
    pub fn notes(&self) -> &[NoteId] { &self.notes }
    pub fn form_data(&self) -> Option<&FormSubmission> { self.form_data.as_ref() }
    pub fn key(&self) -> &str { &self.key }
    pub fn meta(&self) -> &MetaDocument { &self.meta }
    pub fn pending(&self) -> &PendingChanges { &self.pending }
    pub fn is_dirty(&self) -> bool { !self.pending.is_empty() }

    // =========================================================================
    // Setters (each stages its field for the next save)
    // =========================================================================

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.pending.insert(PendingField::Title);
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.pending.insert(PendingField::Content);
    }

    /// Stage a status change. The transition itself runs through the
    /// status machine when the ticket is saved.
    pub fn set_status(&mut self, status: impl Into<TicketStatus>) {
        self.status = status.into();
        self.pending.insert(PendingField::Status);
    }

    pub fn set_date(&mut self, date: DateTime<Utc>) {
        self.date = Some(date);
        self.pending.insert(PendingField::Date);
    }

    pub fn set_resolved_date(&mut self, date: Option<DateTime<Utc>>) {
        self.resolved_date = date;
        self.pending.insert(PendingField::ResolvedDate);
    }

    pub fn set_first_name(&mut self, first_name: impl Into<String>) {
        self.first_name = first_name.into();
        self.pending.insert(PendingField::FirstName);
    }

    pub fn set_last_name(&mut self, last_name: impl Into<String>) {
        self.last_name = last_name.into();
        self.pending.insert(PendingField::LastName);
    }

    pub fn set_email(&mut self, email: impl Into<String>) {
        self.email = email.into().trim().to_string();
        self.pending.insert(PendingField::Email);
    }

    pub fn set_ip(&mut self, ip: impl Into<String>) {
        self.ip = ip.into();
        self.pending.insert(PendingField::Ip);
    }

    pub fn set_user_id(&mut self, user_id: Option<UserId>) {
        self.user_id = user_id;
        self.user_info.id = user_id;
        self.pending.insert(PendingField::UserId);
    }

    pub fn set_customer_id(&mut self, customer_id: CustomerId) {
        self.customer_id = Some(customer_id);
        self.pending.insert(PendingField::CustomerId);
    }

    pub fn set_agent(&mut self, agent: Option<AgentId>) {
        self.agent = agent;
        self.pending.insert(PendingField::Agent);
    }

    pub fn set_source(&mut self, source: TicketSource) {
        self.source = source;
        self.pending.insert(PendingField::Source);
    }

    pub fn set_sla(&mut self, sla: SlaBlock) {
        self.sla = (!sla.is_empty()).then_some(sla);
        self.pending.insert(PendingField::Sla);
    }

    pub fn set_key(&mut self, key: impl Into<String>) {
        self.key = key.into();
        self.pending.insert(PendingField::Key);
    }

    pub fn set_form_data(&mut self, form: FormSubmission) {
        self.form_data = Some(form);
        self.pending.insert(PendingField::FormData);
    }

    pub fn add_file(&mut self, file: PendingAttachment) {
        self.new_files.push(file);
        self.pending.insert(PendingField::Files);
    }

    /// Edit the mutable id copy. Persistence always uses the immutable id.
    pub fn set_staged_id(&mut self, id: TicketId) {
        self.staged_id = Some(id);
    }

    /// Reset the staged id to the immutable one. Returns true if they differed.
    pub(crate) fn reconcile_id(&mut self) -> bool {
        if self.staged_id == self.id {
            return false;
        }
        self.staged_id = self.id;
        true
    }
}
