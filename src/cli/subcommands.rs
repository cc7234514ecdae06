use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Subcommand};
use fleet_manager::models::{
    BillingItemType, HandoverReason, InvoiceStatus, JobStatus, LeaveType, Permission, Role,
};

/// What a driver reports when finishing a leg.
#[derive(Clone, Debug, Args)]
pub struct LegReportArgs {
    #[arg(long)]
    pub mileage: Option<i32>,
    #[arg(long)]
    pub fuel: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
    /// Photo URL; repeat for several
    #[arg(long = "photo")]
    pub photos: Vec<String>,
    /// Signature as an image data URL
    #[arg(long)]
    pub signature: Option<String>,
}

#[derive(Clone, Debug, Args)]
pub struct NewJobArgs {
    #[arg(long)]
    pub customer: Option<i32>,
    #[arg(long)]
    pub reference: Option<String>,
    #[arg(long)]
    pub registration: Option<String>,
    #[arg(long)]
    pub chassis: Option<String>,
    #[arg(long)]
    pub make: Option<String>,
    #[arg(long)]
    pub model: Option<String>,
    #[arg(long)]
    pub color: Option<String>,
    #[arg(long)]
    pub year: Option<i32>,
    #[arg(long = "from")]
    pub collection_address: String,
    #[arg(long = "from-postcode")]
    pub collection_postcode: Option<String>,
    #[arg(long = "from-contact")]
    pub collection_contact: Option<String>,
    #[arg(long = "to")]
    pub delivery_address: String,
    #[arg(long = "to-postcode")]
    pub delivery_postcode: Option<String>,
    #[arg(long = "to-contact")]
    pub delivery_contact: Option<String>,
}

/// Job commands.
#[derive(Clone, Debug, Subcommand)]
pub enum JobCommands {
    /// Create an unallocated job.
    Create(NewJobArgs),
    /// Get a job by id.
    Get { id: i32 },
    /// List jobs, newest change first.
    List {
        #[arg(long)]
        status: Option<JobStatus>,
        #[arg(long)]
        driver: Option<i32>,
        #[arg(long)]
        customer: Option<i32>,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Allocate a job to a driver.
    Allocate {
        id: i32,
        #[arg(long)]
        driver: i32,
    },
    /// Return a job to the unallocated pool.
    Unallocate { id: i32 },
    StartCollection { id: i32 },
    CompleteCollection {
        id: i32,
        #[command(flatten)]
        report: LegReportArgs,
    },
    StartDelivery { id: i32 },
    CompleteDelivery {
        id: i32,
        #[command(flatten)]
        report: LegReportArgs,
    },
    Cancel { id: i32 },
    Abort {
        id: i32,
        #[arg(long)]
        reason: String,
    },
    /// Attach a note to a job.
    Note { id: i32, content: String },
    /// List a job's notes, oldest first.
    Notes { id: i32 },
    /// Copy a job into a new unallocated one.
    Duplicate { id: i32 },
    /// Job counts by status.
    Stats,
}

#[derive(Clone, Debug, Args)]
pub struct BillingItemArgs {
    #[arg(long = "type", default_value = "charge")]
    pub item_type: BillingItemType,
    #[arg(long)]
    pub description: String,
    #[arg(long, default_value_t = 1.0)]
    pub quantity: f64,
    #[arg(long)]
    pub unit_price: f64,
    /// Record as an internal cost that is not billed to the customer
    #[arg(long)]
    pub non_chargeable: bool,
    #[arg(long, default_value = "general")]
    pub category: String,
    /// Defaults to today
    #[arg(long)]
    pub date: Option<NaiveDate>,
    #[arg(long)]
    pub receipt_url: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

/// Billing item and settings commands.
#[derive(Clone, Debug, Subcommand)]
pub enum BillingCommands {
    /// Add a billing item to a job.
    Add {
        #[arg(long)]
        job: i32,
        #[command(flatten)]
        item: BillingItemArgs,
    },
    /// Replace a billing item's details.
    Update {
        id: i32,
        #[command(flatten)]
        item: BillingItemArgs,
    },
    Delete { id: i32 },
    /// Items on a job, newest first.
    List {
        #[arg(long)]
        job: i32,
    },
    /// Chargeable and non-chargeable totals for a job.
    Summary {
        #[arg(long)]
        job: i32,
    },
    /// Whether a job is billed, invoiced or paid.
    Status {
        #[arg(long)]
        job: i32,
    },
    /// Show billing settings.
    Settings,
    /// Change billing settings.
    SetSettings {
        #[arg(long)]
        vat_rate: Option<f64>,
        #[arg(long)]
        payment_terms: Option<i32>,
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        next_number: Option<i32>,
    },
}

/// Invoice commands.
#[derive(Clone, Debug, Subcommand)]
pub enum InvoiceCommands {
    /// Invoice a job's chargeable items.
    Create {
        #[arg(long)]
        job: i32,
    },
    Get { id: i32 },
    /// Print the plain-text statement.
    Show { id: i32 },
    List {
        #[arg(long)]
        job: Option<i32>,
        #[arg(long)]
        customer: Option<i32>,
        #[arg(long)]
        status: Option<InvoiceStatus>,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Move an invoice to another status.
    Status { id: i32, status: InvoiceStatus },
    /// Record a payment and mark the invoice paid.
    Pay {
        id: i32,
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long)]
        reference: Option<String>,
        #[arg(long)]
        method: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Flag unpaid invoices past their due date.
    MarkOverdue {
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// E-mail the invoice to the customer.
    Email { id: i32 },
    /// E-mail a payment reminder for an overdue invoice.
    Remind { id: i32 },
    /// Delete a draft invoice.
    Delete { id: i32 },
    /// Invoice totals for the dashboard.
    Stats {
        #[arg(long)]
        today: Option<NaiveDate>,
    },
}

/// Handover commands.
#[derive(Clone, Debug, Subcommand)]
pub enum HandoverCommands {
    /// Record a handover in one go.
    Create {
        #[arg(long)]
        job: i32,
        #[arg(long)]
        location: String,
        #[arg(long)]
        odometer: i32,
        #[arg(long, default_value = "standard_break")]
        reason: HandoverReason,
        #[arg(long)]
        other_reason: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Receiving driver
        #[arg(long)]
        to: i32,
        #[arg(long, conflicts_with = "from_skip", required_unless_present = "from_skip")]
        from_signature: Option<String>,
        /// Why the handing-over driver did not sign
        #[arg(long)]
        from_skip: Option<String>,
        #[arg(long, conflicts_with = "to_skip", required_unless_present = "to_skip")]
        to_signature: Option<String>,
        /// Why the receiving driver did not sign
        #[arg(long)]
        to_skip: Option<String>,
    },
    Get { id: i32 },
    List {
        #[arg(long)]
        job: Option<i32>,
        #[arg(long)]
        driver: Option<i32>,
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        #[arg(long)]
        to: Option<DateTime<Utc>>,
    },
}

/// Leave commands.
#[derive(Clone, Debug, Subcommand)]
pub enum LeaveCommands {
    /// Request leave. Defaults to the acting driver.
    Submit {
        #[arg(long)]
        driver: Option<i32>,
        #[arg(long = "type", default_value = "holiday")]
        leave_type: LeaveType,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(long)]
        notes: Option<String>,
    },
    Approve {
        id: i32,
        #[arg(long)]
        notes: Option<String>,
    },
    Deny {
        id: i32,
        #[arg(long)]
        notes: Option<String>,
    },
    Cancel { id: i32 },
    Get { id: i32 },
    List {
        #[arg(long, conflicts_with = "driver")]
        pending: bool,
        #[arg(long)]
        driver: Option<i32>,
    },
}

/// User commands.
#[derive(Clone, Debug, Subcommand)]
pub enum UserCommands {
    /// Create the first administrator of an empty database.
    Bootstrap {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
    },
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        role: Role,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        license: Option<String>,
    },
    Get { id: i32 },
    List {
        #[arg(long)]
        role: Option<Role>,
        #[arg(long)]
        active: bool,
    },
    /// Edit profile fields.
    Update {
        id: i32,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        license: Option<String>,
    },
    /// Change role and reset permissions to its preset.
    Role { id: i32, role: Role },
    Grant { id: i32, permission: Permission },
    Revoke { id: i32, permission: Permission },
    Activate { id: i32 },
    Deactivate { id: i32 },
}

#[derive(Clone, Debug, Args)]
pub struct CustomerArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long)]
    pub address: Option<String>,
    #[arg(long)]
    pub city: Option<String>,
    #[arg(long)]
    pub postcode: Option<String>,
    #[arg(long)]
    pub country: Option<String>,
    #[arg(long)]
    pub website: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
    /// Primary contact name
    #[arg(long, requires = "contact_email")]
    pub contact_name: Option<String>,
    #[arg(long, requires = "contact_name")]
    pub contact_email: Option<String>,
    #[arg(long)]
    pub contact_phone: Option<String>,
}

/// Customer commands.
#[derive(Clone, Debug, Subcommand)]
pub enum CustomerCommands {
    Create(CustomerArgs),
    Update {
        id: i32,
        #[command(flatten)]
        details: CustomerArgs,
    },
    Get { id: i32 },
    /// Active customers, optionally in one category.
    List {
        #[arg(long)]
        category: Option<String>,
    },
    /// Soft-delete a customer.
    Deactivate { id: i32 },
}

/// Audit log commands.
#[derive(Clone, Debug, Subcommand)]
pub enum AuditCommands {
    List {
        #[arg(long)]
        action: Option<String>,
        #[arg(long)]
        user: Option<i32>,
        #[arg(long)]
        resource: Option<String>,
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        #[arg(long)]
        to: Option<DateTime<Utc>>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    Get { id: i32 },
}
