use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::models::{
    AuditLog, BillingItem, BillingSettings, Customer, Handover, Job, JobInvoice, JobNote,
    JobStatus, LeaveRequest, User,
};
use crate::store::{
    AuditFilter, CustomerFilter, HandoverFilter, InvoiceFilter, JobFilter, LeaveFilter, Store,
    UserFilter,
};

/// Rows keyed by id with a SERIAL-like counter.
struct Table<T> {
    rows: BTreeMap<i32, T>,
    next_id: i32,
}

impl<T: Clone> Table<T> {
    fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }

    fn insert(&mut self, row: &T, set_id: impl FnOnce(&mut T, i32)) -> T {
        let id = self.next_id;
        self.next_id += 1;
        let mut row = row.clone();
        set_id(&mut row, id);
        self.rows.insert(id, row.clone());
        row
    }

    fn get(&self, entity: &'static str, id: i32) -> Result<T> {
        self.rows
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(entity, id))
    }

    fn replace(&mut self, entity: &'static str, id: i32, row: &T) -> Result<T> {
        match self.rows.get_mut(&id) {
            Some(slot) => {
                *slot = row.clone();
                Ok(row.clone())
            }
            None => Err(Error::not_found(entity, id)),
        }
    }

    fn remove(&mut self, entity: &'static str, id: i32) -> Result<()> {
        self.rows
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(entity, id))
    }

    fn filtered(&self, keep: impl Fn(&T) -> bool) -> Vec<T> {
        self.rows.values().filter(|row| keep(row)).cloned().collect()
    }
}

struct State {
    jobs: Table<Job>,
    job_notes: Table<JobNote>,
    billing_items: Table<BillingItem>,
    invoices: Table<JobInvoice>,
    customers: Table<Customer>,
    users: Table<User>,
    leave_requests: Table<LeaveRequest>,
    handovers: Table<Handover>,
    audit_logs: Table<AuditLog>,
    settings: Option<BillingSettings>,
}

impl State {
    fn save_job(&mut self, job: &Job) -> Result<Job> {
        let stored = self.jobs.get("job", job.id)?;
        if stored.version != job.version {
            return Err(Error::Conflict {
                entity: "job",
                id: job.id,
            });
        }
        let mut next = job.clone();
        next.version += 1;
        self.jobs.replace("job", job.id, &next)
    }
}

/// In-process store for tests and offline CLI sessions.
pub struct MemoryStore {
    state: Mutex<State>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                jobs: Table::new(),
                job_notes: Table::new(),
                billing_items: Table::new(),
                invoices: Table::new(),
                customers: Table::new(),
                users: Table::new(),
                leave_requests: Table::new(),
                handovers: Table::new(),
                audit_logs: Table::new(),
                settings: None,
            }),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn limited<T>(mut rows: Vec<T>, limit: Option<i64>) -> Vec<T> {
    if let Some(limit) = limit {
        rows.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
    }
    rows
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn insert_job(&self, job: &Job) -> Result<Job> {
        let mut state = self.state.lock().await;
        Ok(state.jobs.insert(job, |row, id| {
            row.id = id;
            row.version = 0;
        }))
    }

    async fn get_job(&self, id: i32) -> Result<Job> {
        self.state.lock().await.jobs.get("job", id)
    }

    async fn update_job(&self, job: &Job) -> Result<Job> {
        self.state.lock().await.save_job(job)
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let state = self.state.lock().await;
        let mut jobs = state.jobs.filtered(|job| filter.matches(job));
        jobs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(limited(jobs, filter.limit))
    }

    async fn count_jobs_by_status(&self) -> Result<Vec<(JobStatus, i64)>> {
        let state = self.state.lock().await;
        let mut counts: BTreeMap<&'static str, (JobStatus, i64)> = BTreeMap::new();
        for job in state.jobs.rows.values() {
            counts.entry(job.status.as_str()).or_insert((job.status, 0)).1 += 1;
        }
        Ok(counts.into_values().collect())
    }

    async fn insert_job_note(&self, note: &JobNote) -> Result<JobNote> {
        let mut state = self.state.lock().await;
        state.jobs.get("job", note.job_id)?;
        Ok(state.job_notes.insert(note, |row, id| row.id = id))
    }

    async fn list_job_notes(&self, job_id: i32) -> Result<Vec<JobNote>> {
        let state = self.state.lock().await;
        let mut notes = state.job_notes.filtered(|note| note.job_id == job_id);
        notes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(notes)
    }

    async fn insert_billing_item(&self, item: &BillingItem) -> Result<BillingItem> {
        let mut state = self.state.lock().await;
        state.jobs.get("job", item.job_id)?;
        Ok(state.billing_items.insert(item, |row, id| row.id = id))
    }

    async fn get_billing_item(&self, id: i32) -> Result<BillingItem> {
        self.state.lock().await.billing_items.get("billing item", id)
    }

    async fn update_billing_item(&self, item: &BillingItem) -> Result<BillingItem> {
        self.state
            .lock()
            .await
            .billing_items
            .replace("billing item", item.id, item)
    }

    async fn delete_billing_item(&self, id: i32) -> Result<()> {
        self.state.lock().await.billing_items.remove("billing item", id)
    }

    async fn list_billing_items(&self, job_id: i32) -> Result<Vec<BillingItem>> {
        let state = self.state.lock().await;
        let mut items = state.billing_items.filtered(|item| item.job_id == job_id);
        items.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        Ok(items)
    }

    async fn billing_settings(&self) -> Result<BillingSettings> {
        Ok(self.state.lock().await.settings.clone().unwrap_or_default())
    }

    async fn save_billing_settings(&self, settings: &BillingSettings) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut saved = settings.clone();
        if let Some(stored) = &state.settings {
            saved.next_invoice_number = saved.next_invoice_number.max(stored.next_invoice_number);
        }
        state.settings = Some(saved);
        Ok(())
    }

    async fn claim_invoice_number(&self) -> Result<BillingSettings> {
        let mut state = self.state.lock().await;
        let settings = state.settings.get_or_insert_with(BillingSettings::default);
        let claimed = settings.clone();
        settings.next_invoice_number += 1;
        Ok(claimed)
    }

    async fn insert_invoice(&self, invoice: &JobInvoice) -> Result<JobInvoice> {
        let mut state = self.state.lock().await;
        if state
            .invoices
            .rows
            .values()
            .any(|existing| existing.invoice_number == invoice.invoice_number)
        {
            return Err(Error::validation(
                "invoice_number",
                format!("{} is already in use", invoice.invoice_number),
            ));
        }
        if state
            .invoices
            .rows
            .values()
            .any(|existing| existing.job_id == invoice.job_id)
        {
            return Err(Error::validation(
                "job_id",
                format!("job {} already has an invoice", invoice.job_id),
            ));
        }
        Ok(state.invoices.insert(invoice, |row, id| row.id = id))
    }

    async fn get_invoice(&self, id: i32) -> Result<JobInvoice> {
        self.state.lock().await.invoices.get("invoice", id)
    }

    async fn update_invoice(&self, invoice: &JobInvoice) -> Result<JobInvoice> {
        self.state
            .lock()
            .await
            .invoices
            .replace("invoice", invoice.id, invoice)
    }

    async fn delete_invoice(&self, id: i32) -> Result<()> {
        self.state.lock().await.invoices.remove("invoice", id)
    }

    async fn list_invoices(&self, filter: &InvoiceFilter) -> Result<Vec<JobInvoice>> {
        let state = self.state.lock().await;
        let mut invoices = state.invoices.filtered(|invoice| filter.matches(invoice));
        invoices.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(limited(invoices, filter.limit))
    }

    async fn insert_customer(&self, customer: &Customer) -> Result<Customer> {
        let mut state = self.state.lock().await;
        Ok(state.customers.insert(customer, |row, id| row.id = id))
    }

    async fn get_customer(&self, id: i32) -> Result<Customer> {
        self.state.lock().await.customers.get("customer", id)
    }

    async fn update_customer(&self, customer: &Customer) -> Result<Customer> {
        self.state
            .lock()
            .await
            .customers
            .replace("customer", customer.id, customer)
    }

    async fn list_customers(&self, filter: &CustomerFilter) -> Result<Vec<Customer>> {
        let state = self.state.lock().await;
        let mut customers = state.customers.filtered(|customer| filter.matches(customer));
        customers.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(customers)
    }

    async fn insert_user(&self, user: &User) -> Result<User> {
        let mut state = self.state.lock().await;
        if state.users.rows.values().any(|existing| existing.email == user.email) {
            return Err(Error::validation(
                "email",
                format!("{} is already registered", user.email),
            ));
        }
        Ok(state.users.insert(user, |row, id| row.id = id))
    }

    async fn get_user(&self, id: i32) -> Result<User> {
        self.state.lock().await.users.get("user", id)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .rows
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn update_user(&self, user: &User) -> Result<User> {
        self.state.lock().await.users.replace("user", user.id, user)
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>> {
        let state = self.state.lock().await;
        let mut users = state.users.filtered(|user| filter.matches(user));
        users.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn insert_leave_request(&self, request: &LeaveRequest) -> Result<LeaveRequest> {
        let mut state = self.state.lock().await;
        Ok(state.leave_requests.insert(request, |row, id| row.id = id))
    }

    async fn get_leave_request(&self, id: i32) -> Result<LeaveRequest> {
        self.state.lock().await.leave_requests.get("leave request", id)
    }

    async fn update_leave_request(&self, request: &LeaveRequest) -> Result<LeaveRequest> {
        self.state
            .lock()
            .await
            .leave_requests
            .replace("leave request", request.id, request)
    }

    async fn list_leave_requests(&self, filter: &LeaveFilter) -> Result<Vec<LeaveRequest>> {
        let state = self.state.lock().await;
        let mut requests = state.leave_requests.filtered(|request| filter.matches(request));
        requests.sort_by(|a, b| b.submitted.cmp(&a.submitted).then(b.id.cmp(&a.id)));
        Ok(requests)
    }

    async fn record_handover(&self, handover: &Handover, job: &Job) -> Result<(Handover, Job)> {
        let mut state = self.state.lock().await;
        let job = state.save_job(job)?;
        let handover = state.handovers.insert(handover, |row, id| row.id = id);
        Ok((handover, job))
    }

    async fn get_handover(&self, id: i32) -> Result<Handover> {
        self.state.lock().await.handovers.get("handover", id)
    }

    async fn list_handovers(&self, filter: &HandoverFilter) -> Result<Vec<Handover>> {
        let state = self.state.lock().await;
        let mut handovers = state.handovers.filtered(|handover| filter.matches(handover));
        handovers.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(handovers)
    }

    async fn insert_audit_log(&self, log: &AuditLog) -> Result<AuditLog> {
        let mut state = self.state.lock().await;
        Ok(state.audit_logs.insert(log, |row, id| row.id = id))
    }

    async fn get_audit_log(&self, id: i32) -> Result<AuditLog> {
        self.state.lock().await.audit_logs.get("audit log", id)
    }

    async fn list_audit_logs(&self, filter: &AuditFilter) -> Result<Vec<AuditLog>> {
        let state = self.state.lock().await;
        let mut logs = state.audit_logs.filtered(|log| filter.matches(log));
        logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(limited(logs, filter.limit))
    }
}
