//! In-memory port adapters (for testing and development)

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::domain::aggregates::customer::normalize_email;
use crate::domain::aggregates::{Customer, NewCustomer, PendingAttachment};
use crate::domain::value_objects::{AttachmentId, CustomerId, RecordId, TicketId, UserId};
use crate::ports::outbound::{
    AttachmentStore, CustomerDirectory, MetaStore, NewRecord, Record, RecordKind, RecordStore, RecordUpdate,
    RepoResult, RepositoryError,
};

// =============================================================================
// Records
// =============================================================================

/// In-memory content record store
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<RecordId, Record>>,
    next_id: AtomicU64,
    writes: AtomicUsize,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            writes: AtomicUsize::new(0),
        }
    }

    /// Creates, updates and deletes performed so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create(&self, record: NewRecord) -> RepoResult<RecordId> {
        let id = RecordId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let now = Utc::now();
        let created_at = record.created_at.unwrap_or(now);

        self.records.write().insert(
            id,
            Record {
                id,
                kind: record.kind,
                status: record.status,
                title: record.title,
                content: record.content,
                parent: record.parent,
                author: record.author,
                created_at,
                modified_at: created_at,
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn update(&self, id: RecordId, update: RecordUpdate) -> RepoResult<()> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("record {id}")))?;

        if let Some(status) = update.status {
            record.status = status;
        }
        if let Some(title) = update.title {
            record.title = title;
        }
        if let Some(content) = update.content {
            record.content = content;
        }
        if let Some(created_at) = update.created_at {
            record.created_at = created_at;
        }
        record.modified_at = update.modified_at.unwrap_or_else(Utc::now);

        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, id: RecordId) -> RepoResult<Option<Record>> {
        Ok(self.records.read().get(&id).cloned())
    }

    async fn children(&self, parent: RecordId, kind: RecordKind) -> RepoResult<Vec<Record>> {
        let mut children: Vec<_> = self
            .records
            .read()
            .values()
            .filter(|r| r.parent == Some(parent) && r.kind == kind)
            .cloned()
            .collect();
        children.sort_by_key(|r| (r.created_at, r.id));
        Ok(children)
    }

    async fn delete(&self, id: RecordId) -> RepoResult<()> {
        self.records
            .write()
            .remove(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("record {id}")))?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Meta
// =============================================================================

/// In-memory meta store keyed by `(record, key)`
#[derive(Default)]
pub struct InMemoryMetaStore {
    values: DashMap<(RecordId, String), Value>,
    writes: AtomicUsize,
}

impl InMemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetaStore for InMemoryMetaStore {
    async fn get(&self, entity: RecordId, key: &str) -> RepoResult<Option<Value>> {
        Ok(self.values.get(&(entity, key.to_string())).map(|v| v.value().clone()))
    }

    async fn set(&self, entity: RecordId, key: &str, value: Value, prev: Option<&Value>) -> RepoResult<bool> {
        // A missing value only matches an expected null
        match self.values.entry((entity, key.to_string())) {
            Entry::Occupied(mut slot) => {
                if prev.is_some_and(|prev| slot.get() != prev) {
                    return Ok(false);
                }
                slot.insert(value);
            }
            Entry::Vacant(slot) => {
                if prev.is_some_and(|prev| !prev.is_null()) {
                    return Ok(false);
                }
                slot.insert(value);
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

// =============================================================================
// Customers
// =============================================================================

#[derive(Default)]
struct DirectoryState {
    customers: BTreeMap<CustomerId, Customer>,
    next_id: u64,
}

impl DirectoryState {
    fn by_email(&self, email: &str) -> Option<&Customer> {
        self.customers.values().find(|c| c.has_email(email))
    }

    fn insert(&mut self, new: NewCustomer) -> Customer {
        self.next_id += 1;
        let customer = Customer {
            id: CustomerId::new(self.next_id),
            name: new.name.trim().to_string(),
            email: new.email.trim().to_string(),
            emails: Default::default(),
            user_id: new.user_id,
            ticket_count: 0,
            ticket_ids: Vec::new(),
            created_at: Utc::now(),
        };
        self.customers.insert(customer.id, customer.clone());
        customer
    }

    fn get_mut(&mut self, id: CustomerId) -> RepoResult<&mut Customer> {
        self.customers
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("customer {id}")))
    }
}

/// In-memory customer directory. Every call runs under one lock, which makes
/// `find_or_create` atomic.
#[derive(Default)]
pub struct InMemoryCustomerDirectory {
    state: Mutex<DirectoryState>,
}

impl InMemoryCustomerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn customer_count(&self) -> usize {
        self.state.lock().customers.len()
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryCustomerDirectory {
    async fn find_by_id(&self, id: CustomerId) -> RepoResult<Option<Customer>> {
        Ok(self.state.lock().customers.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<Option<Customer>> {
        Ok(self.state.lock().by_email(email).cloned())
    }

    async fn find_by_user_id(&self, user_id: UserId) -> RepoResult<Option<Customer>> {
        Ok(self
            .state
            .lock()
            .customers
            .values()
            .find(|c| c.user_id == Some(user_id))
            .cloned())
    }

    async fn create(&self, customer: NewCustomer) -> RepoResult<Customer> {
        let mut state = self.state.lock();
        if state.by_email(&customer.email).is_some() {
            return Err(RepositoryError::Conflict(format!("customer email {}", customer.email)));
        }
        Ok(state.insert(customer))
    }

    async fn find_or_create(&self, customer: NewCustomer) -> RepoResult<Customer> {
        let mut state = self.state.lock();
        if let Some(existing) = state.by_email(&customer.email) {
            return Ok(existing.clone());
        }
        Ok(state.insert(customer))
    }

    async fn add_alternate_email(&self, id: CustomerId, email: &str) -> RepoResult<()> {
        let email = normalize_email(email);
        let mut state = self.state.lock();
        let customer = state.get_mut(id)?;
        if !email.is_empty() && !customer.has_email(&email) {
            customer.emails.insert(email);
        }
        Ok(())
    }

    async fn attach_ticket(&self, id: CustomerId, ticket: TicketId) -> RepoResult<()> {
        let mut state = self.state.lock();
        let customer = state.get_mut(id)?;
        if !customer.ticket_ids.contains(&ticket) {
            customer.ticket_ids.push(ticket);
        }
        Ok(())
    }

    async fn increment_ticket_count(&self, id: CustomerId) -> RepoResult<u64> {
        let mut state = self.state.lock();
        let customer = state.get_mut(id)?;
        customer.ticket_count += 1;
        Ok(customer.ticket_count)
    }
}

// =============================================================================
// Attachments
// =============================================================================

/// In-memory attachment store
#[derive(Default)]
pub struct InMemoryAttachmentStore {
    files: RwLock<BTreeMap<AttachmentId, (TicketId, PendingAttachment)>>,
    next_id: AtomicU64,
}

impl InMemoryAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attachments_for(&self, ticket: TicketId) -> Vec<AttachmentId> {
        self.files
            .read()
            .iter()
            .filter(|(_, (owner, _))| *owner == ticket)
            .map(|(id, _)| *id)
            .collect()
    }
}

#[async_trait]
impl AttachmentStore for InMemoryAttachmentStore {
    async fn attach(&self, ticket: TicketId, file: &PendingAttachment) -> RepoResult<AttachmentId> {
        if file.file_name.trim().is_empty() {
            return Err(RepositoryError::StorageError("attachment has no file name".into()));
        }
        let id = AttachmentId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.files.write().insert(id, (ticket, file.clone()));
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_customer(email: &str) -> NewCustomer {
        NewCustomer { name: "Jane Doe".into(), email: email.into(), user_id: None }
    }

    #[tokio::test]
    async fn test_record_store_children_by_kind() {
        let store = InMemoryRecordStore::new();
        let ticket = store.create(NewRecord::new(RecordKind::Ticket, "new")).await.unwrap();

        let mut reply = NewRecord::new(RecordKind::Reply, "publish");
        reply.parent = Some(ticket);
        let reply_id = store.create(reply).await.unwrap();

        let mut note = NewRecord::new(RecordKind::Note, "publish");
        note.parent = Some(ticket);
        store.create(note).await.unwrap();

        let replies = store.children(ticket, RecordKind::Reply).await.unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].id, reply_id);
        assert_eq!(store.write_count(), 3);
    }

    #[tokio::test]
    async fn test_record_store_update_missing() {
        let store = InMemoryRecordStore::new();
        let err = store.update(RecordId::new(9), RecordUpdate::default()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
        assert!(store.delete(RecordId::new(9)).await.is_err());
    }

    #[tokio::test]
    async fn test_meta_store_respects_prev() {
        let store = InMemoryMetaStore::new();
        let id = RecordId::new(1);

        assert!(store.set(id, "k", json!(1), None).await.unwrap());
        assert!(!store.set(id, "k", json!(2), Some(&json!(5))).await.unwrap());
        assert!(store.set(id, "k", json!(3), Some(&json!(1))).await.unwrap());

        assert_eq!(store.get(id, "k").await.unwrap(), Some(json!(3)));
        assert_eq!(store.get(id, "other").await.unwrap(), None);
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_find_or_create_matches_case_insensitively() {
        let dir = InMemoryCustomerDirectory::new();
        let a = dir.find_or_create(new_customer("a@x.com")).await.unwrap();
        let b = dir.find_or_create(new_customer(" A@X.com")).await.unwrap();

        assert_eq!(a.id, b.id);
        assert_eq!(dir.customer_count(), 1);
        assert!(matches!(dir.create(new_customer("a@x.com")).await, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_find_or_create_yields_one_customer() {
        let dir = std::sync::Arc::new(InMemoryCustomerDirectory::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let dir = dir.clone();
                let email = if i % 2 == 0 { "race@x.com" } else { "RACE@x.com " };
                tokio::spawn(async move { dir.find_or_create(new_customer(email)).await })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(dir.customer_count(), 1);
    }

    #[tokio::test]
    async fn test_alternate_emails_and_counts() {
        let dir = InMemoryCustomerDirectory::new();
        let c = dir.create(new_customer("a@x.com")).await.unwrap();

        dir.add_alternate_email(c.id, "Work@X.com").await.unwrap();
        dir.add_alternate_email(c.id, "a@x.com").await.unwrap();
        assert_eq!(dir.find_by_email("work@x.com").await.unwrap().map(|c| c.id), Some(c.id));
        assert!(dir.find_by_email("").await.unwrap().is_none());

        dir.attach_ticket(c.id, RecordId::new(4)).await.unwrap();
        dir.attach_ticket(c.id, RecordId::new(4)).await.unwrap();
        assert_eq!(dir.increment_ticket_count(c.id).await.unwrap(), 1);

        let stored = dir.find_by_id(c.id).await.unwrap().unwrap();
        assert_eq!(stored.emails.len(), 1);
        assert_eq!(stored.ticket_ids, vec![RecordId::new(4)]);
        assert!(dir.increment_ticket_count(CustomerId::new(99)).await.is_err());
    }

    #[tokio::test]
    async fn test_attachment_store() {
        let store = InMemoryAttachmentStore::new();
        let file = PendingAttachment {
            file_name: "log.txt".into(),
            content_type: "text/plain".into(),
            size: 12,
            source_path: "/tmp/log.txt".into(),
        };
        let id = store.attach(RecordId::new(3), &file).await.unwrap();
        assert_eq!(store.attachments_for(RecordId::new(3)), vec![id]);

        let unnamed = PendingAttachment { file_name: " ".into(), ..file };
        assert!(store.attach(RecordId::new(3), &unnamed).await.is_err());
    }
}
