//! Storage contract used by every service.
//!
//! Two implementations exist: [`crate::db::Database`] over PostgreSQL and
//! [`memory::MemoryStore`] held in process. Both must agree on ordering,
//! filtering and the optimistic `version` check for jobs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    AuditLog, BillingItem, BillingSettings, Customer, Handover, InvoiceStatus, Job, JobInvoice,
    JobNote, JobStatus, LeaveRequest, LeaveStatus, Role, User,
};

pub mod memory;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub driver_id: Option<i32>,
    pub customer_id: Option<i32>,
    pub limit: Option<i64>,
}

impl JobFilter {
    pub fn matches(&self, job: &Job) -> bool {
        self.status.is_none_or(|status| job.status == status)
            && self.driver_id.is_none_or(|id| job.driver_id == Some(id))
            && self.customer_id.is_none_or(|id| job.customer_id == Some(id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceFilter {
    pub job_id: Option<i32>,
    pub customer_id: Option<i32>,
    pub status: Option<InvoiceStatus>,
    pub limit: Option<i64>,
}

impl InvoiceFilter {
    pub fn matches(&self, invoice: &JobInvoice) -> bool {
        self.job_id.is_none_or(|id| invoice.job_id == id)
            && self.customer_id.is_none_or(|id| invoice.customer_id == Some(id))
            && self.status.is_none_or(|status| invoice.status == status)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerFilter {
    pub active_only: bool,
    pub category: Option<String>,
}

impl CustomerFilter {
    pub fn matches(&self, customer: &Customer) -> bool {
        (!self.active_only || customer.is_active)
            && self
                .category
                .as_ref()
                .is_none_or(|category| customer.category.as_ref() == Some(category))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub active_only: bool,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        self.role.is_none_or(|role| user.role == role) && (!self.active_only || user.is_active())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaveFilter {
    pub driver_id: Option<i32>,
    pub status: Option<LeaveStatus>,
}

impl LeaveFilter {
    pub fn matches(&self, request: &LeaveRequest) -> bool {
        self.driver_id.is_none_or(|id| request.driver_id == id)
            && self.status.is_none_or(|status| request.status == status)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandoverFilter {
    pub job_id: Option<i32>,
    /// Matches either side of the handover.
    pub driver_id: Option<i32>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl HandoverFilter {
    pub fn matches(&self, handover: &Handover) -> bool {
        self.job_id.is_none_or(|id| handover.job_id == id)
            && self
                .driver_id
                .is_none_or(|id| handover.from_driver_id == id || handover.to_driver_id == id)
            && self.from.is_none_or(|from| handover.timestamp >= from)
            && self.to.is_none_or(|to| handover.timestamp <= to)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    pub action: Option<String>,
    pub user_id: Option<i32>,
    pub resource: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl AuditFilter {
    pub fn matches(&self, log: &AuditLog) -> bool {
        self.action.as_ref().is_none_or(|action| &log.action == action)
            && self.user_id.is_none_or(|id| log.user_id == id)
            && self.resource.as_ref().is_none_or(|resource| &log.resource == resource)
            && self.from.is_none_or(|from| log.timestamp >= from)
            && self.to.is_none_or(|to| log.timestamp <= to)
    }
}

/// Persistence operations, one group per collection.
///
/// Inserts ignore the incoming `id` and return the stored record. Updates
/// replace the whole record. `update_job` and `record_handover` reject a job
/// whose `version` no longer matches storage with `Error::Conflict` and bump
/// the version on success.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    fn backend(&self) -> &'static str;

    async fn insert_job(&self, job: &Job) -> Result<Job>;
    async fn get_job(&self, id: i32) -> Result<Job>;
    async fn update_job(&self, job: &Job) -> Result<Job>;
    /// Newest `updated_at` first, ties broken by descending id.
    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>>;
    async fn count_jobs_by_status(&self) -> Result<Vec<(JobStatus, i64)>>;
    async fn insert_job_note(&self, note: &JobNote) -> Result<JobNote>;
    /// Oldest first.
    async fn list_job_notes(&self, job_id: i32) -> Result<Vec<JobNote>>;

    async fn insert_billing_item(&self, item: &BillingItem) -> Result<BillingItem>;
    async fn get_billing_item(&self, id: i32) -> Result<BillingItem>;
    async fn update_billing_item(&self, item: &BillingItem) -> Result<BillingItem>;
    async fn delete_billing_item(&self, id: i32) -> Result<()>;
    /// Newest `date` first, ties broken by descending id.
    async fn list_billing_items(&self, job_id: i32) -> Result<Vec<BillingItem>>;

    /// Stored settings, or the defaults when none were ever saved.
    async fn billing_settings(&self) -> Result<BillingSettings>;
    /// Never moves `next_invoice_number` backwards, even when racing a claim.
    async fn save_billing_settings(&self, settings: &BillingSettings) -> Result<()>;
    /// Atomically takes the next invoice number and advances the counter.
    /// Returns the settings as they were at the moment of the claim.
    async fn claim_invoice_number(&self) -> Result<BillingSettings>;

    async fn insert_invoice(&self, invoice: &JobInvoice) -> Result<JobInvoice>;
    async fn get_invoice(&self, id: i32) -> Result<JobInvoice>;
    async fn update_invoice(&self, invoice: &JobInvoice) -> Result<JobInvoice>;
    async fn delete_invoice(&self, id: i32) -> Result<()>;
    /// Newest `created_at` first.
    async fn list_invoices(&self, filter: &InvoiceFilter) -> Result<Vec<JobInvoice>>;

    async fn insert_customer(&self, customer: &Customer) -> Result<Customer>;
    async fn get_customer(&self, id: i32) -> Result<Customer>;
    async fn update_customer(&self, customer: &Customer) -> Result<Customer>;
    /// Sorted by name.
    async fn list_customers(&self, filter: &CustomerFilter) -> Result<Vec<Customer>>;

    /// Fails with `Error::Validation` when the e-mail is already taken.
    async fn insert_user(&self, user: &User) -> Result<User>;
    async fn get_user(&self, id: i32) -> Result<User>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn update_user(&self, user: &User) -> Result<User>;
    /// Sorted by name.
    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>>;

    async fn insert_leave_request(&self, request: &LeaveRequest) -> Result<LeaveRequest>;
    async fn get_leave_request(&self, id: i32) -> Result<LeaveRequest>;
    async fn update_leave_request(&self, request: &LeaveRequest) -> Result<LeaveRequest>;
    /// Newest `submitted` first.
    async fn list_leave_requests(&self, filter: &LeaveFilter) -> Result<Vec<LeaveRequest>>;

    /// Inserts the handover and saves the reassigned job in one unit.
    async fn record_handover(&self, handover: &Handover, job: &Job) -> Result<(Handover, Job)>;
    async fn get_handover(&self, id: i32) -> Result<Handover>;
    /// Newest first.
    async fn list_handovers(&self, filter: &HandoverFilter) -> Result<Vec<Handover>>;

    async fn insert_audit_log(&self, log: &AuditLog) -> Result<AuditLog>;
    async fn get_audit_log(&self, id: i32) -> Result<AuditLog>;
    /// Newest first.
    async fn list_audit_logs(&self, filter: &AuditFilter) -> Result<Vec<AuditLog>>;
}
