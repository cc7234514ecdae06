//! Use cases over a [`Store`]. Every operation takes the acting user and
//! checks their permissions before touching storage.

use std::sync::Arc;

use crate::email::Mailer;
use crate::error::{Error, Result};
use crate::models::User;
use crate::store::Store;

pub mod audit;
pub mod billing;
pub mod customers;
pub mod feed;
pub mod handovers;
pub mod jobs;
pub mod leave;
pub mod users;

pub use audit::AuditTrail;
pub use billing::{BillingService, BillingStats, BillingStatus, BillingSummary, InvoiceTotals};
pub use customers::CustomerService;
pub use feed::{JobEvent, JobEventKind, JobFeed, JobScope, JobWatch, merge_snapshots};
pub use handovers::{HandoverDetails, HandoverDraft, HandoverService, HandoverStep};
pub use jobs::{JobService, JobStats, StatusCount};
pub use leave::LeaveService;
pub use users::{ProfileUpdate, UserService};

/// Fails with `Forbidden` unless `actor` is active and `allowed` holds.
pub(crate) fn ensure(actor: &User, allowed: bool, action: &str) -> Result<()> {
    if actor.is_active() && allowed {
        Ok(())
    } else {
        Err(Error::forbidden(actor.id, action))
    }
}

/// Every service wired to one store and one job feed.
#[derive(Clone)]
pub struct Fleet {
    store: Arc<dyn Store>,
    pub feed: JobFeed,
    pub audit: AuditTrail,
    pub jobs: JobService,
    pub billing: BillingService,
    pub handovers: HandoverService,
    pub leave: LeaveService,
    pub users: UserService,
    pub customers: CustomerService,
}

impl Fleet {
    pub fn new(store: Arc<dyn Store>, mailer: Arc<dyn Mailer>) -> Self {
        let feed = JobFeed::new();
        let audit = AuditTrail::new(store.clone());
        let leave = LeaveService::new(store.clone(), audit.clone());

        Self {
            jobs: JobService::new(store.clone(), feed.clone(), audit.clone()),
            billing: BillingService::new(store.clone(), audit.clone(), mailer),
            handovers: HandoverService::new(store.clone(), feed.clone(), audit.clone(), leave.clone()),
            users: UserService::new(store.clone(), audit.clone()),
            customers: CustomerService::new(store.clone(), audit.clone()),
            leave,
            audit,
            feed,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Starts a live job list sized to what `user` may see.
    pub async fn watch_jobs(&self, user: &User) -> Result<JobWatch> {
        JobWatch::start(self.store.clone(), &self.feed, JobScope::for_user(user)).await
    }
}
