use std::sync::LazyLock;

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgListener, PgPoolOptions};
use sqlx::query::QueryAs;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{
    AuditLog, BillingItem, BillingSettings, Customer, Handover, Job, JobInvoice, JobNote,
    JobStatus, LeaveRequest, User,
};
use crate::services::feed::{JobEvent, JobFeed};
use crate::store::{
    AuditFilter, CustomerFilter, HandoverFilter, InvoiceFilter, JobFilter, LeaveFilter, Store,
    UserFilter,
};

/// Channel the `jobs` trigger notifies on. Payload is `<id>:<insert|update>`.
pub const JOB_CHANNEL: &str = "job_changes";

type PgQueryAs<'q, T> = QueryAs<'q, Postgres, T, PgArguments>;

const JOB_COLUMNS: &[&str] = &[
    "status",
    "stage",
    "driver_id",
    "customer_id",
    "customer_name",
    "customer_reference",
    "make",
    "model",
    "registration",
    "chassis_number",
    "color",
    "year",
    "collection_address",
    "collection_city",
    "collection_postcode",
    "collection_contact_name",
    "collection_contact_phone",
    "collection_notes",
    "delivery_address",
    "delivery_city",
    "delivery_postcode",
    "delivery_contact_name",
    "delivery_contact_phone",
    "delivery_notes",
    "mileage",
    "fuel_level",
    "collection_photos",
    "delivery_photos",
    "collection_signature",
    "delivery_signature",
    "abort_reason",
    "allocated_at",
    "unallocated_at",
    "collection_started_at",
    "collection_completed_at",
    "delivery_started_at",
    "delivery_completed_at",
    "last_handover_at",
    "created_at",
    "updated_at",
    "created_by",
    "updated_by",
];

const BILLING_ITEM_COLUMNS: &[&str] = &[
    "job_id",
    "item_type",
    "description",
    "quantity",
    "unit_price",
    "is_chargeable",
    "category",
    "date",
    "receipt_url",
    "notes",
    "created_by",
    "created_at",
    "updated_at",
];

const INVOICE_COLUMNS: &[&str] = &[
    "invoice_number",
    "job_id",
    "customer_id",
    "customer_name",
    "customer_email",
    "customer_phone",
    "billing_address",
    "items",
    "subtotal",
    "vat_rate",
    "vat_amount",
    "total",
    "status",
    "issue_date",
    "due_date",
    "sent_date",
    "paid_date",
    "paid_amount",
    "payment_reference",
    "payment_method",
    "notes",
    "created_by",
    "created_at",
    "updated_at",
];

const CUSTOMER_COLUMNS: &[&str] = &[
    "name",
    "category",
    "status",
    "address",
    "city",
    "postcode",
    "country",
    "website",
    "notes",
    "contacts",
    "is_active",
    "created_at",
    "updated_at",
    "created_by",
    "updated_by",
];

const USER_COLUMNS: &[&str] = &[
    "email",
    "name",
    "phone",
    "role",
    "status",
    "permissions",
    "license_number",
    "created_at",
    "updated_at",
];

const LEAVE_COLUMNS: &[&str] = &[
    "driver_id",
    "driver_name",
    "leave_type",
    "start_date",
    "end_date",
    "notes",
    "status",
    "submitted",
    "processed_by",
    "processed_at",
    "response_notes",
];

const HANDOVER_COLUMNS: &[&str] = &[
    "job_id",
    "vehicle",
    "from_driver_id",
    "from_driver",
    "to_driver_id",
    "to_driver",
    "timestamp",
    "location",
    "odometer",
    "reason",
    "reason_text",
    "notes",
    "from_signature",
    "to_signature",
    "from_signature_notes",
    "to_signature_notes",
    "recorded_by",
];

const AUDIT_COLUMNS: &[&str] = &[
    "action",
    "user_id",
    "user_name",
    "timestamp",
    "resource",
    "resource_id",
    "details",
];

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|index| format!("${index}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn insert_sql(table: &str, columns: &[&str]) -> String {
    format!(
        "INSERT INTO {table} ({}) VALUES ({}) RETURNING *",
        columns.join(", "),
        placeholders(columns.len())
    )
}

/// Whole-row update keyed by the parameter after the columns.
fn update_sql(table: &str, columns: &[&str]) -> String {
    format!(
        "UPDATE {table} SET ({}) = ({}) WHERE id = ${} RETURNING *",
        columns.join(", "),
        placeholders(columns.len()),
        columns.len() + 1
    )
}

static INSERT_JOB: LazyLock<String> = LazyLock::new(|| insert_sql("jobs", JOB_COLUMNS));
static UPDATE_JOB: LazyLock<String> = LazyLock::new(|| {
    format!(
        "UPDATE jobs SET ({}) = ({}), version = version + 1 WHERE id = ${} AND version = ${} RETURNING *",
        JOB_COLUMNS.join(", "),
        placeholders(JOB_COLUMNS.len()),
        JOB_COLUMNS.len() + 1,
        JOB_COLUMNS.len() + 2
    )
});
static INSERT_BILLING_ITEM: LazyLock<String> =
    LazyLock::new(|| insert_sql("job_billing_items", BILLING_ITEM_COLUMNS));
static UPDATE_BILLING_ITEM: LazyLock<String> =
    LazyLock::new(|| update_sql("job_billing_items", BILLING_ITEM_COLUMNS));
static INSERT_INVOICE: LazyLock<String> =
    LazyLock::new(|| insert_sql("job_invoices", INVOICE_COLUMNS));
static UPDATE_INVOICE: LazyLock<String> =
    LazyLock::new(|| update_sql("job_invoices", INVOICE_COLUMNS));
static INSERT_CUSTOMER: LazyLock<String> =
    LazyLock::new(|| insert_sql("customers", CUSTOMER_COLUMNS));
static UPDATE_CUSTOMER: LazyLock<String> =
    LazyLock::new(|| update_sql("customers", CUSTOMER_COLUMNS));
static INSERT_USER: LazyLock<String> = LazyLock::new(|| insert_sql("users", USER_COLUMNS));
static UPDATE_USER: LazyLock<String> = LazyLock::new(|| update_sql("users", USER_COLUMNS));
static INSERT_LEAVE: LazyLock<String> =
    LazyLock::new(|| insert_sql("leave_requests", LEAVE_COLUMNS));
static UPDATE_LEAVE: LazyLock<String> =
    LazyLock::new(|| update_sql("leave_requests", LEAVE_COLUMNS));
static INSERT_HANDOVER: LazyLock<String> =
    LazyLock::new(|| insert_sql("driver_handovers", HANDOVER_COLUMNS));
static INSERT_AUDIT: LazyLock<String> = LazyLock::new(|| insert_sql("audit_logs", AUDIT_COLUMNS));

fn bind_job<'q, T>(query: PgQueryAs<'q, T>, job: &'q Job) -> PgQueryAs<'q, T> {
    query
        .bind(job.status)
        .bind(job.stage)
        .bind(job.driver_id)
        .bind(job.customer_id)
        .bind(&job.customer_name)
        .bind(&job.customer_reference)
        .bind(&job.make)
        .bind(&job.model)
        .bind(&job.registration)
        .bind(&job.chassis_number)
        .bind(&job.color)
        .bind(job.year)
        .bind(&job.collection_address)
        .bind(&job.collection_city)
        .bind(&job.collection_postcode)
        .bind(&job.collection_contact_name)
        .bind(&job.collection_contact_phone)
        .bind(&job.collection_notes)
        .bind(&job.delivery_address)
        .bind(&job.delivery_city)
        .bind(&job.delivery_postcode)
        .bind(&job.delivery_contact_name)
        .bind(&job.delivery_contact_phone)
        .bind(&job.delivery_notes)
        .bind(job.mileage)
        .bind(&job.fuel_level)
        .bind(&job.collection_photos)
        .bind(&job.delivery_photos)
        .bind(&job.collection_signature)
        .bind(&job.delivery_signature)
        .bind(&job.abort_reason)
        .bind(job.allocated_at)
        .bind(job.unallocated_at)
        .bind(job.collection_started_at)
        .bind(job.collection_completed_at)
        .bind(job.delivery_started_at)
        .bind(job.delivery_completed_at)
        .bind(job.last_handover_at)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.created_by)
        .bind(job.updated_by)
}

fn bind_billing_item<'q, T>(query: PgQueryAs<'q, T>, item: &'q BillingItem) -> PgQueryAs<'q, T> {
    query
        .bind(item.job_id)
        .bind(item.item_type)
        .bind(&item.description)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.is_chargeable)
        .bind(&item.category)
        .bind(item.date)
        .bind(&item.receipt_url)
        .bind(&item.notes)
        .bind(item.created_by)
        .bind(item.created_at)
        .bind(item.updated_at)
}

fn bind_invoice<'q, T>(query: PgQueryAs<'q, T>, invoice: &'q JobInvoice) -> PgQueryAs<'q, T> {
    query
        .bind(&invoice.invoice_number)
        .bind(invoice.job_id)
        .bind(invoice.customer_id)
        .bind(&invoice.customer_name)
        .bind(&invoice.customer_email)
        .bind(&invoice.customer_phone)
        .bind(&invoice.billing_address)
        .bind(&invoice.items)
        .bind(invoice.subtotal)
        .bind(invoice.vat_rate)
        .bind(invoice.vat_amount)
        .bind(invoice.total)
        .bind(invoice.status)
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(invoice.sent_date)
        .bind(invoice.paid_date)
        .bind(invoice.paid_amount)
        .bind(&invoice.payment_reference)
        .bind(&invoice.payment_method)
        .bind(&invoice.notes)
        .bind(invoice.created_by)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
}

fn bind_customer<'q, T>(query: PgQueryAs<'q, T>, customer: &'q Customer) -> PgQueryAs<'q, T> {
    query
        .bind(&customer.name)
        .bind(&customer.category)
        .bind(customer.status)
        .bind(&customer.address)
        .bind(&customer.city)
        .bind(&customer.postcode)
        .bind(&customer.country)
        .bind(&customer.website)
        .bind(&customer.notes)
        .bind(&customer.contacts)
        .bind(customer.is_active)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .bind(customer.created_by)
        .bind(customer.updated_by)
}

fn bind_user<'q, T>(query: PgQueryAs<'q, T>, user: &'q User) -> PgQueryAs<'q, T> {
    query
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.phone)
        .bind(user.role)
        .bind(user.status)
        .bind(&user.permissions)
        .bind(&user.license_number)
        .bind(user.created_at)
        .bind(user.updated_at)
}

fn bind_leave<'q, T>(query: PgQueryAs<'q, T>, request: &'q LeaveRequest) -> PgQueryAs<'q, T> {
    query
        .bind(request.driver_id)
        .bind(&request.driver_name)
        .bind(request.leave_type)
        .bind(request.start_date)
        .bind(request.end_date)
        .bind(&request.notes)
        .bind(request.status)
        .bind(request.submitted)
        .bind(request.processed_by)
        .bind(request.processed_at)
        .bind(&request.response_notes)
}

fn bind_handover<'q, T>(query: PgQueryAs<'q, T>, handover: &'q Handover) -> PgQueryAs<'q, T> {
    query
        .bind(handover.job_id)
        .bind(&handover.vehicle)
        .bind(handover.from_driver_id)
        .bind(&handover.from_driver)
        .bind(handover.to_driver_id)
        .bind(&handover.to_driver)
        .bind(handover.timestamp)
        .bind(&handover.location)
        .bind(handover.odometer)
        .bind(handover.reason)
        .bind(&handover.reason_text)
        .bind(&handover.notes)
        .bind(&handover.from_signature)
        .bind(&handover.to_signature)
        .bind(&handover.from_signature_notes)
        .bind(&handover.to_signature_notes)
        .bind(handover.recorded_by)
}

fn bind_audit<'q, T>(query: PgQueryAs<'q, T>, log: &'q AuditLog) -> PgQueryAs<'q, T> {
    query
        .bind(&log.action)
        .bind(log.user_id)
        .bind(&log.user_name)
        .bind(log.timestamp)
        .bind(&log.resource)
        .bind(&log.resource_id)
        .bind(&log.details)
}

/// Maps a unique-constraint violation onto a validation error for `field`.
fn unique_violation(err: sqlx::Error, field: &'static str, value: &str) -> Error {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Error::validation(field, format!("{value} is already in use"))
        }
        _ => Error::Database(err),
    }
}

fn constraint(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint(),
        _ => None,
    }
}

/// Database connection pool
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new Database instance with a connection pool
    pub async fn new(config: &Config) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(config.database_url()?)
            .await?;

        Ok(Self { pool })
    }

    /// Apply the embedded migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Relays `NOTIFY job_changes` into `feed` so watchers see writes made by
    /// other processes.
    pub async fn forward_job_notifications(&self, feed: JobFeed) -> Result<JoinHandle<()>> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(JOB_CHANNEL).await?;
        info!(channel = JOB_CHANNEL, "listening for job changes");

        Ok(tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => match JobEvent::from_payload(notification.payload()) {
                        Some(event) => feed.publish(event),
                        None => warn!(payload = notification.payload(), "ignoring malformed job notification"),
                    },
                    Err(err) => {
                        warn!(error = %err, "job notification listener stopped");
                        break;
                    }
                }
            }
        }))
    }

    async fn fetch_job_row(&self, id: i32) -> Result<Option<Job>> {
        Ok(sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }
}

#[async_trait]
impl Store for Database {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    // Job operations
    async fn insert_job(&self, job: &Job) -> Result<Job> {
        let job = bind_job(sqlx::query_as::<_, Job>(&INSERT_JOB), job)
            .fetch_one(&self.pool)
            .await?;
        debug!(job_id = job.id, "inserted job");
        Ok(job)
    }

    async fn get_job(&self, id: i32) -> Result<Job> {
        self.fetch_job_row(id)
            .await?
            .ok_or_else(|| Error::not_found("job", id))
    }

    async fn update_job(&self, job: &Job) -> Result<Job> {
        let updated = bind_job(sqlx::query_as::<_, Job>(&UPDATE_JOB), job)
            .bind(job.id)
            .bind(job.version)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(job) => Ok(job),
            None if self.fetch_job_row(job.id).await?.is_some() => Err(Error::Conflict {
                entity: "job",
                id: job.id,
            }),
            None => Err(Error::not_found("job", job.id)),
        }
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM jobs WHERE TRUE");
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status);
        }
        if let Some(driver_id) = filter.driver_id {
            query.push(" AND driver_id = ").push_bind(driver_id);
        }
        if let Some(customer_id) = filter.customer_id {
            query.push(" AND customer_id = ").push_bind(customer_id);
        }
        query.push(" ORDER BY updated_at DESC, id DESC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit);
        }

        Ok(query.build_query_as::<Job>().fetch_all(&self.pool).await?)
    }

    async fn count_jobs_by_status(&self) -> Result<Vec<(JobStatus, i64)>> {
        Ok(sqlx::query_as::<_, (JobStatus, i64)>(
            "SELECT status, COUNT(*) FROM jobs GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_job_note(&self, note: &JobNote) -> Result<JobNote> {
        Ok(sqlx::query_as::<_, JobNote>(
            r#"
            INSERT INTO job_notes (job_id, author, content, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(note.job_id)
        .bind(&note.author)
        .bind(&note.content)
        .bind(note.created_at)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn list_job_notes(&self, job_id: i32) -> Result<Vec<JobNote>> {
        Ok(sqlx::query_as::<_, JobNote>(
            "SELECT * FROM job_notes WHERE job_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?)
    }

    // Billing item operations
    async fn insert_billing_item(&self, item: &BillingItem) -> Result<BillingItem> {
        Ok(
            bind_billing_item(sqlx::query_as::<_, BillingItem>(&INSERT_BILLING_ITEM), item)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn get_billing_item(&self, id: i32) -> Result<BillingItem> {
        sqlx::query_as::<_, BillingItem>("SELECT * FROM job_billing_items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("billing item", id))
    }

    async fn update_billing_item(&self, item: &BillingItem) -> Result<BillingItem> {
        bind_billing_item(sqlx::query_as::<_, BillingItem>(&UPDATE_BILLING_ITEM), item)
            .bind(item.id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("billing item", item.id))
    }

    async fn delete_billing_item(&self, id: i32) -> Result<()> {
        let result = sqlx::query("DELETE FROM job_billing_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("billing item", id));
        }
        Ok(())
    }

    async fn list_billing_items(&self, job_id: i32) -> Result<Vec<BillingItem>> {
        Ok(sqlx::query_as::<_, BillingItem>(
            "SELECT * FROM job_billing_items WHERE job_id = $1 ORDER BY date DESC, id DESC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?)
    }

    // Billing settings
    async fn billing_settings(&self) -> Result<BillingSettings> {
        let settings = sqlx::query_scalar::<_, Json<BillingSettings>>(
            "SELECT settings FROM billing_settings WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(settings.map(|Json(settings)| settings).unwrap_or_default())
    }

    async fn save_billing_settings(&self, settings: &BillingSettings) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let stored = sqlx::query_scalar::<_, Json<BillingSettings>>(
            "SELECT settings FROM billing_settings WHERE id = 1 FOR UPDATE",
        )
        .fetch_optional(&mut *tx)
        .await?;

        let mut saved = settings.clone();
        if let Some(Json(stored)) = stored {
            saved.next_invoice_number = saved.next_invoice_number.max(stored.next_invoice_number);
        }
        sqlx::query(
            r#"
            INSERT INTO billing_settings (id, settings) VALUES (1, $1)
            ON CONFLICT (id) DO UPDATE SET settings = EXCLUDED.settings
            "#,
        )
        .bind(Json(&saved))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn claim_invoice_number(&self) -> Result<BillingSettings> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO billing_settings (id, settings) VALUES (1, $1) ON CONFLICT (id) DO NOTHING")
            .bind(Json(BillingSettings::default()))
            .execute(&mut *tx)
            .await?;

        let Json(claimed) = sqlx::query_scalar::<_, Json<BillingSettings>>(
            "SELECT settings FROM billing_settings WHERE id = 1 FOR UPDATE",
        )
        .fetch_one(&mut *tx)
        .await?;

        let mut advanced = claimed.clone();
        advanced.next_invoice_number += 1;
        sqlx::query("UPDATE billing_settings SET settings = $1 WHERE id = 1")
            .bind(Json(&advanced))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(claimed)
    }

    // Invoice operations
    async fn insert_invoice(&self, invoice: &JobInvoice) -> Result<JobInvoice> {
        bind_invoice(sqlx::query_as::<_, JobInvoice>(&INSERT_INVOICE), invoice)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| match constraint(&err) {
                Some("job_invoices_job_id_key") => Error::validation(
                    "job_id",
                    format!("job {} already has an invoice", invoice.job_id),
                ),
                _ => unique_violation(err, "invoice_number", &invoice.invoice_number),
            })
    }

    async fn get_invoice(&self, id: i32) -> Result<JobInvoice> {
        sqlx::query_as::<_, JobInvoice>("SELECT * FROM job_invoices WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("invoice", id))
    }

    async fn update_invoice(&self, invoice: &JobInvoice) -> Result<JobInvoice> {
        bind_invoice(sqlx::query_as::<_, JobInvoice>(&UPDATE_INVOICE), invoice)
            .bind(invoice.id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("invoice", invoice.id))
    }

    async fn delete_invoice(&self, id: i32) -> Result<()> {
        let result = sqlx::query("DELETE FROM job_invoices WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("invoice", id));
        }
        Ok(())
    }

    async fn list_invoices(&self, filter: &InvoiceFilter) -> Result<Vec<JobInvoice>> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM job_invoices WHERE TRUE");
        if let Some(job_id) = filter.job_id {
            query.push(" AND job_id = ").push_bind(job_id);
        }
        if let Some(customer_id) = filter.customer_id {
            query.push(" AND customer_id = ").push_bind(customer_id);
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status);
        }
        query.push(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit);
        }

        Ok(query.build_query_as::<JobInvoice>().fetch_all(&self.pool).await?)
    }

    // Customer operations
    async fn insert_customer(&self, customer: &Customer) -> Result<Customer> {
        Ok(
            bind_customer(sqlx::query_as::<_, Customer>(&INSERT_CUSTOMER), customer)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn get_customer(&self, id: i32) -> Result<Customer> {
        sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("customer", id))
    }

    async fn update_customer(&self, customer: &Customer) -> Result<Customer> {
        bind_customer(sqlx::query_as::<_, Customer>(&UPDATE_CUSTOMER), customer)
            .bind(customer.id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("customer", customer.id))
    }

    async fn list_customers(&self, filter: &CustomerFilter) -> Result<Vec<Customer>> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM customers WHERE TRUE");
        if filter.active_only {
            query.push(" AND is_active");
        }
        if let Some(category) = &filter.category {
            query.push(" AND category = ").push_bind(category.clone());
        }
        query.push(" ORDER BY name ASC, id ASC");

        Ok(query.build_query_as::<Customer>().fetch_all(&self.pool).await?)
    }

    // User operations
    async fn insert_user(&self, user: &User) -> Result<User> {
        bind_user(sqlx::query_as::<_, User>(&INSERT_USER), user)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| unique_violation(err, "email", &user.email))
    }

    async fn get_user(&self, id: i32) -> Result<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("user", id))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_user(&self, user: &User) -> Result<User> {
        bind_user(sqlx::query_as::<_, User>(&UPDATE_USER), user)
            .bind(user.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| unique_violation(err, "email", &user.email))?
            .ok_or_else(|| Error::not_found("user", user.id))
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM users WHERE TRUE");
        if let Some(role) = filter.role {
            query.push(" AND role = ").push_bind(role);
        }
        if filter.active_only {
            query.push(" AND status IN ('active', 'on_leave')");
        }
        query.push(" ORDER BY name ASC, id ASC");

        Ok(query.build_query_as::<User>().fetch_all(&self.pool).await?)
    }

    // Leave request operations
    async fn insert_leave_request(&self, request: &LeaveRequest) -> Result<LeaveRequest> {
        Ok(
            bind_leave(sqlx::query_as::<_, LeaveRequest>(&INSERT_LEAVE), request)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn get_leave_request(&self, id: i32) -> Result<LeaveRequest> {
        sqlx::query_as::<_, LeaveRequest>("SELECT * FROM leave_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("leave request", id))
    }

    async fn update_leave_request(&self, request: &LeaveRequest) -> Result<LeaveRequest> {
        bind_leave(sqlx::query_as::<_, LeaveRequest>(&UPDATE_LEAVE), request)
            .bind(request.id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("leave request", request.id))
    }

    async fn list_leave_requests(&self, filter: &LeaveFilter) -> Result<Vec<LeaveRequest>> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM leave_requests WHERE TRUE");
        if let Some(driver_id) = filter.driver_id {
            query.push(" AND driver_id = ").push_bind(driver_id);
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status);
        }
        query.push(" ORDER BY submitted DESC, id DESC");

        Ok(query.build_query_as::<LeaveRequest>().fetch_all(&self.pool).await?)
    }

    // Handover operations
    async fn record_handover(&self, handover: &Handover, job: &Job) -> Result<(Handover, Job)> {
        // Start a transaction
        let mut tx = self.pool.begin().await?;

        let updated = bind_job(sqlx::query_as::<_, Job>(&UPDATE_JOB), job)
            .bind(job.id)
            .bind(job.version)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(Error::Conflict {
                entity: "job",
                id: job.id,
            })?;

        let recorded = bind_handover(sqlx::query_as::<_, Handover>(&INSERT_HANDOVER), handover)
            .fetch_one(&mut *tx)
            .await?;

        // Commit the transaction
        tx.commit().await?;

        Ok((recorded, updated))
    }

    async fn get_handover(&self, id: i32) -> Result<Handover> {
        sqlx::query_as::<_, Handover>("SELECT * FROM driver_handovers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("handover", id))
    }

    async fn list_handovers(&self, filter: &HandoverFilter) -> Result<Vec<Handover>> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM driver_handovers WHERE TRUE");
        if let Some(job_id) = filter.job_id {
            query.push(" AND job_id = ").push_bind(job_id);
        }
        if let Some(driver_id) = filter.driver_id {
            query
                .push(" AND (from_driver_id = ")
                .push_bind(driver_id)
                .push(" OR to_driver_id = ")
                .push_bind(driver_id)
                .push(")");
        }
        if let Some(from) = filter.from {
            query.push(" AND timestamp >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            query.push(" AND timestamp <= ").push_bind(to);
        }
        query.push(" ORDER BY timestamp DESC, id DESC");

        Ok(query.build_query_as::<Handover>().fetch_all(&self.pool).await?)
    }

    // Audit log operations
    async fn insert_audit_log(&self, log: &AuditLog) -> Result<AuditLog> {
        Ok(bind_audit(sqlx::query_as::<_, AuditLog>(&INSERT_AUDIT), log)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn get_audit_log(&self, id: i32) -> Result<AuditLog> {
        sqlx::query_as::<_, AuditLog>("SELECT * FROM audit_logs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("audit log", id))
    }

    async fn list_audit_logs(&self, filter: &AuditFilter) -> Result<Vec<AuditLog>> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM audit_logs WHERE TRUE");
        if let Some(action) = &filter.action {
            query.push(" AND action = ").push_bind(action.clone());
        }
        if let Some(user_id) = filter.user_id {
            query.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(resource) = &filter.resource {
            query.push(" AND resource = ").push_bind(resource.clone());
        }
        if let Some(from) = filter.from {
            query.push(" AND timestamp >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            query.push(" AND timestamp <= ").push_bind(to);
        }
        query.push(" ORDER BY timestamp DESC, id DESC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit);
        }

        Ok(query.build_query_as::<AuditLog>().fetch_all(&self.pool).await?)
    }
}

/// Connect to the database and bring the schema up to date.
pub async fn init(config: &Config) -> Result<Database> {
    let db = Database::new(config).await?;
    db.migrate().await?;
    info!("database connection established");

    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_statement_numbers_every_column() {
        let sql = insert_sql("audit_logs", AUDIT_COLUMNS);
        assert!(sql.starts_with("INSERT INTO audit_logs (action, user_id,"));
        assert!(sql.contains("$7)"));
        assert!(!sql.contains("$8"));
    }

    #[test]
    fn job_update_checks_id_and_version_after_columns() {
        let columns = JOB_COLUMNS.len();
        assert!(UPDATE_JOB.contains(&format!("WHERE id = ${} AND version = ${}", columns + 1, columns + 2)));
        assert!(UPDATE_JOB.contains("version = version + 1"));
    }
}
