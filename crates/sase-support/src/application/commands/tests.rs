use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;

use super::*;
use crate::application::status::NotUpdatedReason;
use crate::domain::aggregates::{Customer, FormSubmission, NewCustomer, PendingAttachment};
use crate::domain::services::metadata::keys;
use crate::domain::services::SlaTarget;
use crate::domain::value_objects::{AgentId, CustomerId, TicketSource};
use crate::error::SupportError;
use crate::infrastructure::events::EventLog;
use crate::infrastructure::persistence::{
    InMemoryAttachmentStore, InMemoryCustomerDirectory, InMemoryMetaStore, InMemoryRecordStore,
};
use crate::ports::outbound::{
    NewRecord, Record, RecordKind, RecordUpdate, RepoResult, RepositoryError,
};

struct Fixture {
    service: TicketService,
    records: Arc<InMemoryRecordStore>,
    meta: Arc<InMemoryMetaStore>,
    customers: Arc<InMemoryCustomerDirectory>,
    attachments: Arc<InMemoryAttachmentStore>,
    log: Arc<EventLog>,
}

fn fixture() -> Fixture {
    let records = Arc::new(InMemoryRecordStore::new());
    fixture_with(records.clone(), records)
}

fn fixture_with(records: Arc<InMemoryRecordStore>, store: Arc<dyn RecordStore>) -> Fixture {
    let customers = Arc::new(InMemoryCustomerDirectory::new());
    build_fixture(records, store, customers.clone(), customers, SupportConfig::default())
}

fn fixture_with_config(config: SupportConfig) -> Fixture {
    let records = Arc::new(InMemoryRecordStore::new());
    let customers = Arc::new(InMemoryCustomerDirectory::new());
    build_fixture(records.clone(), records, customers.clone(), customers, config)
}

fn build_fixture(
    records: Arc<InMemoryRecordStore>,
    store: Arc<dyn RecordStore>,
    customers: Arc<InMemoryCustomerDirectory>,
    directory: Arc<dyn CustomerDirectory>,
    config: SupportConfig,
) -> Fixture {
    let meta = Arc::new(InMemoryMetaStore::new());
    let attachments = Arc::new(InMemoryAttachmentStore::new());
    let bus = Arc::new(EventBus::new());
    let log = Arc::new(EventLog::new());
    bus.subscribe(log.clone());

    let service = TicketService::new(store, meta.clone(), directory, attachments.clone(), bus, Arc::new(config));
    Fixture { service, records, meta, customers, attachments, log }
}

fn draft(email: &str) -> Ticket {
    let mut ticket = Ticket::new();
    ticket.set_title("Printer on fire");
    ticket.set_content("Smoke everywhere");
    ticket.set_email(email);
    ticket.set_first_name("Jane");
    ticket.set_last_name("Doe");
    ticket
}

fn ctx() -> SaveContext {
    SaveContext::default().with_ip("10.0.0.1")
}

/// Record store whose creates always fail
struct RejectingRecords(Arc<InMemoryRecordStore>);

#[async_trait]
impl RecordStore for RejectingRecords {
    async fn create(&self, _record: NewRecord) -> RepoResult<RecordId> {
        Err(RepositoryError::StorageError("disk full".into()))
    }
    async fn update(&self, id: RecordId, update: RecordUpdate) -> RepoResult<()> {
        self.0.update(id, update).await
    }
    async fn get(&self, id: RecordId) -> RepoResult<Option<Record>> {
        self.0.get(id).await
    }
    async fn children(&self, parent: RecordId, kind: RecordKind) -> RepoResult<Vec<Record>> {
        self.0.children(parent, kind).await
    }
    async fn delete(&self, id: RecordId) -> RepoResult<()> {
        self.0.delete(id).await
    }
}

/// Customer directory whose first `find_or_create` fails
struct FlakyDirectory {
    inner: Arc<InMemoryCustomerDirectory>,
    failed: std::sync::atomic::AtomicBool,
}

impl FlakyDirectory {
    fn new(inner: Arc<InMemoryCustomerDirectory>) -> Self {
        Self { inner, failed: std::sync::atomic::AtomicBool::new(false) }
    }
}

#[async_trait]
impl CustomerDirectory for FlakyDirectory {
    async fn find_by_id(&self, id: CustomerId) -> RepoResult<Option<Customer>> {
        self.inner.find_by_id(id).await
    }
    async fn find_by_email(&self, email: &str) -> RepoResult<Option<Customer>> {
        self.inner.find_by_email(email).await
    }
    async fn find_by_user_id(&self, user_id: UserId) -> RepoResult<Option<Customer>> {
        self.inner.find_by_user_id(user_id).await
    }
    async fn create(&self, customer: NewCustomer) -> RepoResult<Customer> {
        self.inner.create(customer).await
    }
    async fn find_or_create(&self, customer: NewCustomer) -> RepoResult<Customer> {
        if !self.failed.swap(true, std::sync::atomic::Ordering::SeqCst) {
            return Err(RepositoryError::StorageError("directory unavailable".into()));
        }
        self.inner.find_or_create(customer).await
    }
    async fn add_alternate_email(&self, id: CustomerId, email: &str) -> RepoResult<()> {
        self.inner.add_alternate_email(id, email).await
    }
    async fn attach_ticket(&self, id: CustomerId, ticket: TicketId) -> RepoResult<()> {
        self.inner.attach_ticket(id, ticket).await
    }
    async fn increment_ticket_count(&self, id: CustomerId) -> RepoResult<u64> {
        self.inner.increment_ticket_count(id).await
    }
}

// =============================================================================
// Creation
// =============================================================================

#[tokio::test]
async fn test_new_ticket_is_created_with_customer() {
    let fx = fixture();
    let mut ticket = draft("a@x.com");

    let report = fx.service.save(&mut ticket, &ctx()).await.unwrap();
    assert!(report.created);
    assert!(report.saved);
    assert!(report.meta_written);
    assert!(report.failed.is_empty());

    assert!(!ticket.is_empty());
    assert!(!ticket.is_dirty());
    assert_eq!(ticket.status(), &TicketStatus::New);
    assert_eq!(ticket.status_label(), "New");
    assert_eq!(ticket.title(), "Printer on fire");
    assert_eq!(ticket.ip(), "10.0.0.1");
    assert_eq!(ticket.key().len(), 32);
    assert_eq!(ticket.user_info().first_name, "Jane");
    assert_eq!(ticket.user_info().email, "a@x.com");
    assert!(ticket.sla().is_some());

    let customer_id = ticket.customer_id().unwrap();
    let customer = fx.customers.find_by_id(customer_id).await.unwrap().unwrap();
    assert_eq!(customer.name, "Jane Doe");
    assert_eq!(customer.ticket_count, 1);
    assert_eq!(customer.ticket_ids, vec![ticket.id().unwrap()]);

    assert_eq!(fx.log.count("ticket.creating"), 1);
    assert_eq!(fx.log.count("ticket.created"), 1);
    assert_eq!(fx.log.count("ticket.saved"), 1);
    assert_eq!(fx.log.count("ticket.hydrated"), 1);
}

#[tokio::test]
async fn test_defaults_applied_on_creation() {
    let fx = fixture();
    let mut ticket = Ticket::new();
    ticket.set_email("a@x.com");

    fx.service.save(&mut ticket, &SaveContext::default()).await.unwrap();
    assert_eq!(ticket.title(), "New Ticket");
    assert_eq!(ticket.ip(), "127.0.0.1");
    assert_eq!(ticket.source(), TicketSource::WEBSITE);

    let sla = ticket.sla().unwrap();
    let opened = ticket.date().unwrap();
    assert_eq!(sla.target_respond, Some(opened + Duration::hours(4)));
    assert_eq!(sla.target_resolve, Some(opened + Duration::hours(48)));
}

#[tokio::test]
async fn test_tickets_with_same_email_share_customer() {
    let fx = fixture();
    let mut first = draft("a@x.com");
    let mut second = draft("A@x.com");

    fx.service.save(&mut first, &ctx()).await.unwrap();
    fx.service.save(&mut second, &ctx()).await.unwrap();

    assert_eq!(fx.customers.customer_count(), 1);
    assert_eq!(first.customer_id(), second.customer_id());
    let customer = fx.customers.find_by_email("a@x.com").await.unwrap().unwrap();
    assert_eq!(customer.ticket_count, 2);
    assert_eq!(customer.ticket_ids.len(), 2);
}

#[tokio::test]
async fn test_signed_in_submitter_keeps_customer() {
    let fx = fixture();
    let existing = fx
        .customers
        .create(NewCustomer { name: "Jane Doe".into(), email: "jane@x.com".into(), user_id: Some(UserId::new(7)) })
        .await
        .unwrap();

    let mut ticket = draft("jane.work@x.com");
    fx.service.save(&mut ticket, &SaveContext::submission(UserId::new(7))).await.unwrap();

    assert_eq!(ticket.customer_id(), Some(existing.id));
    assert_eq!(fx.customers.customer_count(), 1);
    let by_alternate = fx.customers.find_by_email("jane.work@x.com").await.unwrap().unwrap();
    assert_eq!(by_alternate.id, existing.id);
}

#[tokio::test]
async fn test_creation_failure_aborts_save() {
    let inner = Arc::new(InMemoryRecordStore::new());
    let fx = fixture_with(inner.clone(), Arc::new(RejectingRecords(inner)));
    let mut ticket = draft("a@x.com");

    let err = fx.service.save(&mut ticket, &ctx()).await.unwrap_err();
    assert!(matches!(err, SupportError::Persistence(_)));
    assert!(ticket.is_empty());
    assert_eq!(fx.customers.customer_count(), 0);
    assert_eq!(fx.meta.write_count(), 0);
    assert_eq!(fx.log.count("ticket.created"), 0);
}

#[tokio::test]
async fn test_failed_customer_link_is_retried() {
    let records = Arc::new(InMemoryRecordStore::new());
    let customers = Arc::new(InMemoryCustomerDirectory::new());
    let flaky = Arc::new(FlakyDirectory::new(customers.clone()));
    let fx = build_fixture(records.clone(), records, customers, flaky, SupportConfig::default());
    let mut ticket = draft("a@x.com");

    let err = fx.service.save(&mut ticket, &ctx()).await.unwrap_err();
    assert!(matches!(err, SupportError::Persistence(_)));
    let id = ticket.id().unwrap();
    assert!(ticket.customer_id().is_none());
    assert_eq!(fx.customers.customer_count(), 0);
    assert_eq!(fx.log.count("ticket.created"), 0);

    let report = fx.service.save(&mut ticket, &ctx()).await.unwrap();
    assert!(report.saved);
    assert!(!report.created);
    assert_eq!(ticket.id(), Some(id));

    let customer_id = ticket.customer_id().unwrap();
    let customer = fx.customers.find_by_id(customer_id).await.unwrap().unwrap();
    assert_eq!(fx.customers.customer_count(), 1);
    assert_eq!(customer.ticket_count, 1);
    assert_eq!(customer.ticket_ids, vec![id]);
    assert_eq!(fx.log.count("ticket.created"), 1);
    assert!(ticket.sla().is_some());
}

#[tokio::test]
async fn test_out_of_range_sla_target_is_left_unset() {
    let mut config = SupportConfig::default();
    config.sla.resolve_hours = u32::MAX;
    let fx = fixture_with_config(config);
    let mut ticket = draft("a@x.com");

    let report = fx.service.save(&mut ticket, &ctx()).await.unwrap();
    assert!(report.saved);
    let sla = ticket.sla().unwrap();
    assert!(sla.target_respond.is_some());
    assert_eq!(sla.target_resolve, None);
}

// =============================================================================
// Saving
// =============================================================================

#[tokio::test]
async fn test_second_save_performs_no_writes() {
    let fx = fixture();
    let mut ticket = draft("a@x.com");
    fx.service.save(&mut ticket, &ctx()).await.unwrap();

    let record_writes = fx.records.write_count();
    let meta_writes = fx.meta.write_count();

    let report = fx.service.save(&mut ticket, &ctx()).await.unwrap();
    assert!(!report.saved);
    assert!(report.flushed.is_empty());
    assert_eq!(fx.records.write_count(), record_writes);
    assert_eq!(fx.meta.write_count(), meta_writes);

    let customer = fx.customers.find_by_id(ticket.customer_id().unwrap()).await.unwrap().unwrap();
    assert_eq!(customer.ticket_count, 1);
}

#[tokio::test]
async fn test_unchanged_document_is_not_rewritten() {
    let fx = fixture();
    let mut ticket = draft("a@x.com");
    fx.service.save(&mut ticket, &ctx()).await.unwrap();
    let meta_writes = fx.meta.write_count();

    ticket.set_title("Printer on fire");
    let report = fx.service.save(&mut ticket, &ctx()).await.unwrap();

    assert!(report.saved);
    assert_eq!(report.flushed, vec![PendingField::Title]);
    assert!(!report.meta_written);
    assert_eq!(fx.meta.write_count(), meta_writes);
}

#[tokio::test]
async fn test_edits_round_trip_through_hydration() {
    let fx = fixture();
    let mut ticket = draft("a@x.com");
    fx.service.save(&mut ticket, &ctx()).await.unwrap();
    let id = ticket.id().unwrap();

    ticket.set_title("Printer fixed?");
    ticket.set_last_name("Smith");
    ticket.set_agent(Some(AgentId::new(3)));
    ticket.set_source(TicketSource::new(2));
    let report = fx.service.save(&mut ticket, &ctx()).await.unwrap();
    assert!(report.meta_written);

    let loaded = fx.service.hydrate(id).await.unwrap();
    assert_eq!(loaded.title(), "Printer fixed?");
    assert_eq!(loaded.first_name(), "Jane");
    assert_eq!(loaded.last_name(), "Smith");
    assert_eq!(loaded.agent(), Some(AgentId::new(3)));
    assert_eq!(fx.service.source_label(&loaded), "Email");
    assert_eq!(loaded.meta()["agent"], json!(3));

    // Agent and source live in the document only
    assert_eq!(fx.meta.get(id, "agent").await.unwrap(), None);
}

#[tokio::test]
async fn test_staged_status_survives_save() {
    let fx = fixture();
    let mut ticket = draft("a@x.com");
    ticket.set_status("open");

    let report = fx.service.save(&mut ticket, &ctx()).await.unwrap();
    assert_eq!(report.status, Some(TransitionOutcome::Updated));
    assert_eq!(ticket.status(), &TicketStatus::Open);
    assert_eq!(ticket.persisted_status(), Some(&TicketStatus::Open));
    assert_eq!(fx.log.count("ticket.opened"), 1);

    let loaded = fx.service.hydrate(ticket.id().unwrap()).await.unwrap();
    assert_eq!(loaded.status(), &TicketStatus::Open);

    ticket.set_status("open");
    let report = fx.service.save(&mut ticket, &ctx()).await.unwrap();
    assert_eq!(report.status, Some(TransitionOutcome::NotUpdated(NotUpdatedReason::Unchanged)));
    assert_eq!(fx.log.count("ticket.opened"), 1);
}

#[tokio::test]
async fn test_closed_ticket_resolved_date() {
    let fx = fixture();
    let mut ticket = draft("a@x.com");
    fx.service.save(&mut ticket, &ctx()).await.unwrap();

    let outcome = fx.service.update_status(&mut ticket, TicketStatus::Closed).await.unwrap();
    assert!(outcome.is_updated());
    let id = ticket.id().unwrap();

    let loaded = fx.service.hydrate(id).await.unwrap();
    assert_eq!(loaded.status_label(), "Closed");
    assert_eq!(loaded.resolved_date(), loaded.modified_date());

    let resolved_at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    ticket.set_resolved_date(Some(resolved_at));
    fx.service.save(&mut ticket, &ctx()).await.unwrap();
    assert_eq!(ticket.resolved_date(), Some(resolved_at));
}

#[tokio::test]
async fn test_staged_id_is_reconciled() {
    let fx = fixture();
    let mut ticket = draft("a@x.com");
    fx.service.save(&mut ticket, &ctx()).await.unwrap();
    let id = ticket.id().unwrap();

    ticket.set_staged_id(RecordId::new(999));
    ticket.set_title("Renamed");
    fx.service.save(&mut ticket, &ctx()).await.unwrap();

    assert_eq!(ticket.id(), Some(id));
    assert_eq!(ticket.staged_id(), Some(id));
    assert_eq!(fx.records.get(id).await.unwrap().unwrap().title, "Renamed");
    assert!(fx.records.get(RecordId::new(999)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_files_and_form_data() {
    let fx = fixture();
    let mut ticket = draft("a@x.com");
    ticket.add_file(PendingAttachment {
        file_name: "error.log".into(),
        content_type: "text/plain".into(),
        size: 120,
        source_path: "/tmp/error.log".into(),
    });
    let mut data = serde_json::Map::new();
    data.insert("printer_model".into(), json!("LaserJet"));
    ticket.set_form_data(FormSubmission { form_id: 12, data });

    fx.service.save(&mut ticket, &ctx()).await.unwrap();
    let id = ticket.id().unwrap();

    assert_eq!(ticket.files(), fx.attachments.attachments_for(id).as_slice());
    assert_eq!(ticket.files().len(), 1);
    assert!(ticket.pending_files().is_empty());

    let form = ticket.form_data().unwrap();
    assert_eq!(form.form_id, 12);
    assert_eq!(form.data["printer_model"], json!("LaserJet"));
}

#[tokio::test]
async fn test_failed_attachment_is_reported() {
    let fx = fixture();
    let mut ticket = draft("a@x.com");
    ticket.add_file(PendingAttachment {
        file_name: String::new(),
        content_type: "text/plain".into(),
        size: 0,
        source_path: "/tmp/x".into(),
    });

    let report = fx.service.save(&mut ticket, &ctx()).await.unwrap();
    assert!(report.saved);
    assert_eq!(report.failed, vec![PendingField::Files]);
    assert!(report.flushed.contains(&PendingField::Title));
}

// =============================================================================
// Hydration
// =============================================================================

#[tokio::test]
async fn test_hydrate_rejects_non_tickets() {
    let fx = fixture();
    let page = fx
        .records
        .create(NewRecord::new(RecordKind::Other("page".into()), "publish"))
        .await
        .unwrap();

    assert!(matches!(fx.service.hydrate(page).await, Err(SupportError::NotFound(_))));
    assert!(matches!(fx.service.hydrate(RecordId::new(404)).await, Err(SupportError::NotFound(_))));
    assert!(fx.service.hydrate_or_empty(page).await.is_empty());
}

#[tokio::test]
async fn test_user_id_repaired_from_customer() {
    let fx = fixture();
    fx.customers
        .create(NewCustomer { name: "Jane Doe".into(), email: "a@x.com".into(), user_id: Some(UserId::new(7)) })
        .await
        .unwrap();

    let mut ticket = draft("a@x.com");
    fx.service.save(&mut ticket, &ctx()).await.unwrap();
    let id = ticket.id().unwrap();

    assert_eq!(ticket.user_id(), Some(UserId::new(7)));
    assert_eq!(fx.meta.get(id, keys::USER_ID).await.unwrap(), Some(json!(7)));

    let meta_writes = fx.meta.write_count();
    fx.service.hydrate(id).await.unwrap();
    assert_eq!(fx.meta.write_count(), meta_writes);
}

#[tokio::test]
async fn test_email_falls_back_to_customer() {
    let fx = fixture();
    fx.customers
        .create(NewCustomer { name: "Jane Doe".into(), email: "Jane@X.com".into(), user_id: None })
        .await
        .unwrap();

    let mut ticket = draft("jane@x.com");
    fx.service.save(&mut ticket, &ctx()).await.unwrap();
    let id = ticket.id().unwrap();

    fx.meta.set(id, keys::USER_EMAIL, json!(""), None).await.unwrap();
    let loaded = fx.service.hydrate(id).await.unwrap();
    assert_eq!(loaded.email(), "Jane@X.com");
}

#[tokio::test]
async fn test_requester_names_fall_back_to_customer() {
    let fx = fixture();
    fx.customers
        .create(NewCustomer { name: "Jane van Dyke".into(), email: "a@x.com".into(), user_id: None })
        .await
        .unwrap();

    let mut ticket = Ticket::new();
    ticket.set_email("a@x.com");
    fx.service.save(&mut ticket, &ctx()).await.unwrap();

    assert_eq!(ticket.first_name(), "Jane");
    assert_eq!(ticket.last_name(), "van Dyke");
}

#[tokio::test]
async fn test_sla_rendering() {
    let fx = fixture();
    let mut ticket = draft("a@x.com");
    fx.service.save(&mut ticket, &ctx()).await.unwrap();

    let sla = fx.service.sla();
    let now = Utc::now();
    let remaining = sla.remaining(ticket.sla(), SlaTarget::Respond, now);
    assert!(!remaining.is_empty());
    assert!(!remaining.ends_with("ago"));

    let later = now + Duration::days(3);
    assert!(sla.remaining(ticket.sla(), SlaTarget::Resolve, later).ends_with(" ago"));
    assert!(!sla.format_target(ticket.sla(), SlaTarget::Resolve).is_empty());
}

// =============================================================================
// Replies & notes
// =============================================================================

#[tokio::test]
async fn test_replies_and_notes() {
    let fx = fixture();
    let mut ticket = draft("a@x.com");
    fx.service.save(&mut ticket, &ctx()).await.unwrap();
    let id = ticket.id().unwrap();

    let mut reply = NewReply::new("Have you tried turning it off?");
    reply.agent = Some(AgentId::new(3));
    reply.close = true;
    let reply_id = fx.service.add_reply(&ticket, reply).await.unwrap();

    assert_eq!(fx.meta.get(reply_id, keys::REPLY_RESOLUTION).await.unwrap(), Some(json!(true)));
    assert_eq!(fx.meta.get(reply_id, keys::TICKET_KEY).await.unwrap(), Some(json!(ticket.key())));
    assert_eq!(
        fx.meta.get(reply_id, keys::REPLY_CUSTOMER_ID).await.unwrap(),
        Some(json!(ticket.customer_id().unwrap().value()))
    );
    assert_eq!(fx.log.count("ticket.reply_added"), 1);

    let note_id = fx.service.add_note(&ticket, "Customer sounds upset", None).await.unwrap();
    let loaded = fx.service.hydrate(id).await.unwrap();
    assert_eq!(loaded.replies(), &[reply_id]);
    assert_eq!(loaded.notes(), &[note_id]);
    assert_eq!(loaded.status(), &TicketStatus::New);

    fx.service.delete_note(&loaded, note_id).await.unwrap();
    assert!(fx.service.hydrate(id).await.unwrap().notes().is_empty());
    assert_eq!(fx.log.count("ticket.note_deleted"), 1);
}

#[tokio::test]
async fn test_reply_and_note_validation() {
    let fx = fixture();
    let mut ticket = draft("a@x.com");

    assert!(matches!(
        fx.service.add_note(&ticket, "too early", None).await,
        Err(SupportError::Validation(_))
    ));

    fx.service.save(&mut ticket, &ctx()).await.unwrap();
    assert!(matches!(
        fx.service.add_reply(&ticket, NewReply::new("  ")).await,
        Err(SupportError::Validation(_))
    ));
    assert!(matches!(fx.service.add_note(&ticket, "", None).await, Err(SupportError::Validation(_))));

    let mut other = draft("b@x.com");
    fx.service.save(&mut other, &ctx()).await.unwrap();
    let foreign_note = fx.service.add_note(&other, "Other ticket", None).await.unwrap();
    assert!(matches!(
        fx.service.delete_note(&ticket, foreign_note).await,
        Err(SupportError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_use_case_trait_delegates() {
    let fx = fixture();
    let use_cases: &dyn TicketUseCases = &fx.service;

    let mut ticket = draft("a@x.com");
    use_cases.save(&mut ticket, &ctx()).await.unwrap();
    let outcome = use_cases.update_status(&mut ticket, TicketStatus::Hold).await.unwrap();
    assert!(outcome.is_updated());

    let loaded = use_cases.hydrate(ticket.id().unwrap()).await.unwrap();
    assert_eq!(loaded.status_label(), "On Hold");
    assert_eq!(fx.log.count("ticket.put_on_hold"), 1);
}
