//! Live job lists.
//!
//! Services publish a [`JobEvent`] after every job write. A [`JobWatch`]
//! re-runs its scope's queries whenever an event arrives and exposes the
//! latest snapshot through a `watch` channel.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{Job, JobStatus, Permission, User};
use crate::store::{JobFilter, Store};

const FEED_CAPACITY: usize = 256;
const ALL_JOBS_LIMIT: i64 = 100;
const DRIVER_JOBS_LIMIT: i64 = 50;
const SPLIT_LIMIT: i64 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    Created,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobEvent {
    pub job_id: i32,
    pub kind: JobEventKind,
}

impl JobEvent {
    pub fn created(job_id: i32) -> Self {
        Self {
            job_id,
            kind: JobEventKind::Created,
        }
    }

    pub fn updated(job_id: i32) -> Self {
        Self {
            job_id,
            kind: JobEventKind::Updated,
        }
    }

    /// Parses a `<id>:<insert|update>` notification payload.
    pub fn from_payload(payload: &str) -> Option<Self> {
        let (id, op) = payload.split_once(':')?;
        let job_id = id.trim().parse().ok()?;
        match op.trim() {
            "insert" => Some(Self::created(job_id)),
            "update" => Some(Self::updated(job_id)),
            _ => None,
        }
    }
}

/// In-process fan-out of job changes.
#[derive(Clone)]
pub struct JobFeed {
    sender: broadcast::Sender<JobEvent>,
}

impl Default for JobFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl JobFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: JobEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

/// Which jobs a watcher sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobScope {
    /// Latest 100 jobs of any status.
    All,
    /// Latest 50 jobs assigned to the driver.
    Driver(i32),
    /// Latest 25 assigned to the driver merged with the latest 25 unallocated.
    DriverAndUnallocated(i32),
}

impl JobScope {
    pub fn for_user(user: &User) -> Self {
        if user.can(Permission::ViewAllJobs) {
            JobScope::All
        } else if user.can(Permission::ViewUnallocated) {
            JobScope::DriverAndUnallocated(user.id)
        } else {
            JobScope::Driver(user.id)
        }
    }

    pub async fn load(&self, store: &dyn Store) -> Result<Vec<Job>> {
        match *self {
            JobScope::All => {
                store
                    .list_jobs(&JobFilter {
                        limit: Some(ALL_JOBS_LIMIT),
                        ..JobFilter::default()
                    })
                    .await
            }
            JobScope::Driver(driver_id) => {
                store
                    .list_jobs(&JobFilter {
                        driver_id: Some(driver_id),
                        limit: Some(DRIVER_JOBS_LIMIT),
                        ..JobFilter::default()
                    })
                    .await
            }
            JobScope::DriverAndUnallocated(driver_id) => {
                let assigned = store
                    .list_jobs(&JobFilter {
                        driver_id: Some(driver_id),
                        limit: Some(SPLIT_LIMIT),
                        ..JobFilter::default()
                    })
                    .await?;
                let unallocated = store
                    .list_jobs(&JobFilter {
                        status: Some(JobStatus::Unallocated),
                        limit: Some(SPLIT_LIMIT),
                        ..JobFilter::default()
                    })
                    .await?;
                Ok(merge_snapshots(assigned, unallocated))
            }
        }
    }
}

/// Concatenates both lists, keeps the first copy of each id and orders by
/// `updated_at` descending, then id descending.
pub fn merge_snapshots(driver: Vec<Job>, unallocated: Vec<Job>) -> Vec<Job> {
    let mut seen = HashSet::new();
    let mut merged: Vec<Job> = driver
        .into_iter()
        .chain(unallocated)
        .filter(|job| seen.insert(job.id))
        .collect();
    merged.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
    merged
}

/// A live view over one [`JobScope`]. Dropping it stops the refresh task.
pub struct JobWatch {
    scope: JobScope,
    snapshots: watch::Receiver<Vec<Job>>,
    task: JoinHandle<()>,
}

impl JobWatch {
    /// Loads the first snapshot, then refreshes after every feed event.
    pub async fn start(store: Arc<dyn Store>, feed: &JobFeed, scope: JobScope) -> Result<Self> {
        // Subscribe first so nothing published during the initial load is lost.
        let mut events = feed.subscribe();
        let initial = scope.load(store.as_ref()).await?;
        let (sender, snapshots) = watch::channel(initial);

        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => debug!(job_id = event.job_id, ?scope, "refreshing job watch"),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, ?scope, "job watch lagged, refreshing")
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                match scope.load(store.as_ref()).await {
                    Ok(jobs) => {
                        if sender.send(jobs).is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(?scope, error = %err, "job watch refresh failed"),
                }
            }
        });

        Ok(Self {
            scope,
            snapshots,
            task,
        })
    }

    pub fn scope(&self) -> JobScope {
        self.scope
    }

    pub fn current(&self) -> Vec<Job> {
        self.snapshots.borrow().clone()
    }

    /// Waits for the next snapshot. `None` once the refresh task has ended.
    pub async fn changed(&mut self) -> Option<Vec<Job>> {
        self.snapshots.changed().await.ok()?;
        Some(self.snapshots.borrow_and_update().clone())
    }
}

impl Drop for JobWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::models::NewJob;

    fn job(id: i32, minutes: i64) -> Job {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes);
        let mut job = Job::from_new(
            NewJob {
                registration: Some(format!("REG{id}")),
                collection_address: "A".into(),
                delivery_address: "B".into(),
                ..NewJob::default()
            },
            None,
            1,
            at,
        );
        job.id = id;
        job
    }

    #[test]
    fn merge_dedupes_and_orders_newest_first() {
        let driver = vec![job(1, 10), job(2, 30)];
        let unallocated = vec![job(2, 0), job(3, 20)];

        let merged = merge_snapshots(driver, unallocated);
        let ids: Vec<_> = merged.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        // The driver's copy of job 2 won.
        assert_eq!(merged[0].updated_at, job(2, 30).updated_at);
    }

    #[test]
    fn merge_breaks_ties_by_descending_id() {
        let merged = merge_snapshots(vec![job(4, 5)], vec![job(9, 5), job(7, 5)]);
        let ids: Vec<_> = merged.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![9, 7, 4]);
    }

    #[test]
    fn notification_payloads_parse() {
        assert_eq!(JobEvent::from_payload("12:insert"), Some(JobEvent::created(12)));
        assert_eq!(JobEvent::from_payload("7:update"), Some(JobEvent::updated(7)));
        assert_eq!(JobEvent::from_payload("7:delete"), None);
        assert_eq!(JobEvent::from_payload("nope"), None);
    }
}
