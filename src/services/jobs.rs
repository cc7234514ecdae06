use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use super::{AuditTrail, JobEvent, JobFeed, ensure};
use crate::error::{Error, Result};
use crate::models::{Job, JobNote, JobStatus, LegReport, NewJob, Permission, User};
use crate::store::{JobFilter, Store};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: JobStatus,
    pub count: i64,
}

/// Job counts for the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub total: i64,
    /// Everything not yet completed, aborted or cancelled.
    pub active: i64,
    pub by_status: Vec<StatusCount>,
}

impl JobStats {
    pub fn from_counts(counts: &[(JobStatus, i64)]) -> Self {
        let by_status = JobStatus::ALL
            .iter()
            .map(|&status| StatusCount {
                status,
                count: counts
                    .iter()
                    .filter(|(s, _)| *s == status)
                    .map(|(_, n)| n)
                    .sum(),
            })
            .collect::<Vec<_>>();
        let total = by_status.iter().map(|c| c.count).sum();
        let active = by_status
            .iter()
            .filter(|c| !c.status.is_terminal())
            .map(|c| c.count)
            .sum();

        Self {
            total,
            active,
            by_status,
        }
    }

    pub fn count(&self, status: JobStatus) -> i64 {
        self.by_status
            .iter()
            .find(|c| c.status == status)
            .map_or(0, |c| c.count)
    }
}

/// Job lifecycle: creation, allocation, the two legs and closure.
#[derive(Clone)]
pub struct JobService {
    store: Arc<dyn Store>,
    feed: JobFeed,
    audit: AuditTrail,
}

impl JobService {
    pub fn new(store: Arc<dyn Store>, feed: JobFeed, audit: AuditTrail) -> Self {
        Self { store, feed, audit }
    }

    pub async fn create_job(&self, actor: &User, new: NewJob) -> Result<Job> {
        ensure(actor, actor.can(Permission::CreateJobs), "create jobs")?;
        new.validate()?;

        let customer_name = match new.customer_id {
            Some(customer_id) => Some(self.store.get_customer(customer_id).await?.name),
            None => None,
        };

        let job = Job::from_new(new, customer_name, actor.id, Utc::now());
        let job = self.store.insert_job(&job).await?;
        info!(job_id = job.id, actor = actor.id, "job created");

        self.audit
            .note(
                actor,
                "job.create",
                "job",
                job.id,
                json!({ "vehicle": job.vehicle_label(), "customer_id": job.customer_id }),
            )
            .await;
        self.feed.publish(JobEvent::created(job.id));

        Ok(job)
    }

    pub async fn get_job(&self, actor: &User, job_id: i32) -> Result<Job> {
        let job = self.store.get_job(job_id).await?;
        ensure(actor, can_view(actor, &job), "view this job")?;
        Ok(job)
    }

    /// Jobs visible to `actor`, newest change first. Users without
    /// `can_view_all_jobs` only see their own jobs, plus the unallocated pool
    /// when they may view it.
    pub async fn list_jobs(&self, actor: &User, filter: &JobFilter) -> Result<Vec<Job>> {
        ensure(actor, true, "list jobs")?;
        if actor.can(Permission::ViewAllJobs) {
            return self.store.list_jobs(filter).await;
        }

        let pool_requested = filter.status == Some(JobStatus::Unallocated)
            && filter.driver_id.is_none()
            && actor.can(Permission::ViewUnallocated);
        if pool_requested {
            return self.store.list_jobs(filter).await;
        }

        if filter.driver_id.is_some_and(|id| id != actor.id) {
            return Err(Error::forbidden(actor.id, "view other drivers' jobs"));
        }
        let own = JobFilter {
            driver_id: Some(actor.id),
            ..filter.clone()
        };
        self.store.list_jobs(&own).await
    }

    pub async fn allocate(&self, actor: &User, job_id: i32, driver_id: i32) -> Result<Job> {
        let self_allocation = actor.id == driver_id && actor.can(Permission::ViewUnallocated);
        ensure(
            actor,
            actor.can(Permission::AllocateJobs) || self_allocation,
            "allocate jobs",
        )?;

        let driver = self.store.get_user(driver_id).await?;
        if !driver.is_driver() || !driver.is_active() {
            return Err(Error::validation(
                "driver_id",
                format!("user {driver_id} is not an active driver"),
            ));
        }

        let now = Utc::now();
        self.apply(actor, job_id, "job.allocate", |job| {
            job.allocate(driver_id, actor.id, now)
        })
        .await
    }

    pub async fn unallocate(&self, actor: &User, job_id: i32) -> Result<Job> {
        ensure(actor, actor.can(Permission::AllocateJobs), "unallocate jobs")?;
        let now = Utc::now();
        self.apply(actor, job_id, "job.unallocate", |job| {
            job.unallocate(actor.id, now)
        })
        .await
    }

    pub async fn start_collection(&self, actor: &User, job_id: i32) -> Result<Job> {
        let now = Utc::now();
        self.apply(actor, job_id, "job.collection.start", |job| {
            ensure_driver_or_editor(actor, job)?;
            job.start_collection(actor.id, now)
        })
        .await
    }

    pub async fn complete_collection(
        &self,
        actor: &User,
        job_id: i32,
        report: LegReport,
    ) -> Result<Job> {
        let now = Utc::now();
        self.apply(actor, job_id, "job.collection.complete", |job| {
            ensure_driver_or_editor(actor, job)?;
            job.complete_collection(report, actor.id, now)
        })
        .await
    }

    pub async fn start_delivery(&self, actor: &User, job_id: i32) -> Result<Job> {
        let now = Utc::now();
        self.apply(actor, job_id, "job.delivery.start", |job| {
            ensure_driver_or_editor(actor, job)?;
            job.start_delivery(actor.id, now)
        })
        .await
    }

    pub async fn complete_delivery(
        &self,
        actor: &User,
        job_id: i32,
        report: LegReport,
    ) -> Result<Job> {
        let now = Utc::now();
        self.apply(actor, job_id, "job.delivery.complete", |job| {
            ensure_driver_or_editor(actor, job)?;
            job.complete_delivery(report, actor.id, now)
        })
        .await
    }

    pub async fn cancel(&self, actor: &User, job_id: i32) -> Result<Job> {
        ensure(actor, actor.can(Permission::EditJobs), "cancel jobs")?;
        let now = Utc::now();
        self.apply(actor, job_id, "job.cancel", |job| job.cancel(actor.id, now))
            .await
    }

    pub async fn abort(&self, actor: &User, job_id: i32, reason: String) -> Result<Job> {
        ensure(actor, actor.can(Permission::EditJobs), "abort jobs")?;
        let now = Utc::now();
        self.apply(actor, job_id, "job.abort", |job| {
            job.abort(reason, actor.id, now)
        })
        .await
    }

    pub async fn add_note(&self, actor: &User, job_id: i32, content: &str) -> Result<JobNote> {
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::validation("content", "note must not be empty"));
        }
        let job = self.get_job(actor, job_id).await?;

        let note = JobNote {
            id: 0,
            job_id: job.id,
            author: actor.name.clone(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        let note = self.store.insert_job_note(&note).await?;
        self.audit
            .note(actor, "job.note", "job", job_id, json!({ "note_id": note.id }))
            .await;

        Ok(note)
    }

    pub async fn list_notes(&self, actor: &User, job_id: i32) -> Result<Vec<JobNote>> {
        self.get_job(actor, job_id).await?;
        self.store.list_job_notes(job_id).await
    }

    /// Copies vehicle, legs and customer into a new unallocated job.
    pub async fn duplicate_job(&self, actor: &User, job_id: i32) -> Result<Job> {
        let source = self.get_job(actor, job_id).await?;
        let copy = self.create_job(actor, source.duplicate()).await?;
        info!(source = job_id, job_id = copy.id, "job duplicated");
        Ok(copy)
    }

    pub async fn dashboard_stats(&self, actor: &User) -> Result<JobStats> {
        ensure(actor, actor.can(Permission::ViewReports), "view job statistics")?;
        let counts = self.store.count_jobs_by_status().await?;
        Ok(JobStats::from_counts(&counts))
    }

    /// Loads, mutates and saves a job under the optimistic version check,
    /// then audits and publishes the change.
    async fn apply<F>(&self, actor: &User, job_id: i32, action: &'static str, change: F) -> Result<Job>
    where
        F: FnOnce(&mut Job) -> Result<()> + Send,
    {
        let mut job = self.store.get_job(job_id).await?;
        let from = job.status;

        if let Err(err) = change(&mut job) {
            warn!(job_id, action, actor = actor.id, error = %err, "job change rejected");
            return Err(err);
        }

        let job = self.store.update_job(&job).await?;
        info!(job_id, action, from = %from, to = %job.status, "job updated");

        self.audit
            .note(
                actor,
                action,
                "job",
                job_id,
                json!({ "from": from, "to": job.status, "driver_id": job.driver_id }),
            )
            .await;
        self.feed.publish(JobEvent::updated(job_id));

        Ok(job)
    }
}

fn can_view(actor: &User, job: &Job) -> bool {
    actor.can(Permission::ViewAllJobs)
        || job.driver_id == Some(actor.id)
        || (job.status == JobStatus::Unallocated && actor.can(Permission::ViewUnallocated))
}

fn ensure_driver_or_editor(actor: &User, job: &Job) -> Result<()> {
    ensure(
        actor,
        job.driver_id == Some(actor.id) || actor.can(Permission::EditJobs),
        "work this job",
    )
}
