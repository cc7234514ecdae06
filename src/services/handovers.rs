//! Driver handovers: a three-step draft (details, drivers, sign-off) that is
//! submitted as one atomic write of the handover record and the job's new
//! driver.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::{AuditTrail, JobEvent, JobFeed, LeaveService, ensure};
use crate::error::{Error, Result};
use crate::models::{Handover, HandoverReason, HandoverSignature, Job, Permission, User};
use crate::store::{HandoverFilter, Store};

/// Step one of a handover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoverDetails {
    pub job_id: i32,
    pub location: String,
    pub odometer: i32,
    pub reason: HandoverReason,
    /// Required when `reason` is `other`.
    pub other_reason: Option<String>,
    pub notes: Option<String>,
}

impl HandoverDetails {
    pub fn validate(&self) -> Result<()> {
        if self.location.trim().is_empty() {
            return Err(Error::validation("location", "must not be empty"));
        }
        if self.odometer < 0 {
            return Err(Error::validation("odometer", "must not be negative"));
        }
        if self.reason == HandoverReason::Other
            && self.other_reason.as_deref().is_none_or(|text| text.trim().is_empty())
        {
            return Err(Error::validation("other_reason", "describe the reason for the handover"));
        }
        Ok(())
    }

    fn reason_text(&self) -> String {
        match (&self.reason, &self.other_reason) {
            (HandoverReason::Other, Some(text)) => text.trim().to_string(),
            (reason, _) => reason.label().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoverStep {
    Drivers,
    Confirmation,
    Ready,
}

/// A handover being assembled. Built by [`HandoverService::begin`].
#[derive(Debug, Clone)]
pub struct HandoverDraft {
    details: HandoverDetails,
    job: Job,
    from_driver: User,
    to_driver: Option<User>,
    signatures: Option<(HandoverSignature, HandoverSignature)>,
}

impl HandoverDraft {
    pub fn step(&self) -> HandoverStep {
        match (&self.to_driver, &self.signatures) {
            (None, _) => HandoverStep::Drivers,
            (Some(_), None) => HandoverStep::Confirmation,
            (Some(_), Some(_)) => HandoverStep::Ready,
        }
    }

    pub fn details(&self) -> &HandoverDetails {
        &self.details
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn from_driver(&self) -> &User {
        &self.from_driver
    }

    pub fn to_driver(&self) -> Option<&User> {
        self.to_driver.as_ref()
    }

    /// Step three: both sides sign or record why they did not.
    pub fn confirm(&mut self, from: HandoverSignature, to: HandoverSignature) -> Result<()> {
        if self.to_driver.is_none() {
            return Err(Error::validation("to_driver", "choose the receiving driver first"));
        }
        check_signature("from_signature", &from)?;
        check_signature("to_signature", &to)?;
        self.signatures = Some((from, to));
        Ok(())
    }
}

fn check_signature(field: &'static str, signature: &HandoverSignature) -> Result<()> {
    match signature {
        HandoverSignature::Signed(data) if !data.starts_with("data:") || data.len() <= "data:".len() => {
            Err(Error::validation(field, "signature must be an image data URL"))
        }
        HandoverSignature::Skipped(note) if note.trim().is_empty() => {
            Err(Error::validation(field, "a skipped signature needs a note"))
        }
        _ => Ok(()),
    }
}

#[derive(Clone)]
pub struct HandoverService {
    store: Arc<dyn Store>,
    feed: JobFeed,
    audit: AuditTrail,
    leave: LeaveService,
}

impl HandoverService {
    pub fn new(store: Arc<dyn Store>, feed: JobFeed, audit: AuditTrail, leave: LeaveService) -> Self {
        Self {
            store,
            feed,
            audit,
            leave,
        }
    }

    /// Step one: validates the details and snapshots the job and its
    /// current driver.
    pub async fn begin(&self, actor: &User, details: HandoverDetails) -> Result<HandoverDraft> {
        details.validate()?;
        let job = self.store.get_job(details.job_id).await?;

        let from_driver_id = match job.driver_id {
            Some(driver_id) if job.status.is_in_progress() => driver_id,
            _ => {
                return Err(Error::validation(
                    "job_id",
                    format!("job {} in status `{}` cannot be handed over", job.id, job.status),
                ));
            }
        };
        ensure_may_hand_over(actor, from_driver_id)?;
        let from_driver = self.store.get_user(from_driver_id).await?;

        Ok(HandoverDraft {
            details,
            job,
            from_driver,
            to_driver: None,
            signatures: None,
        })
    }

    /// Step two: picks the receiving driver. Choosing again resets any
    /// signatures.
    pub async fn choose_driver(&self, draft: &mut HandoverDraft, to_driver_id: i32) -> Result<()> {
        if to_driver_id == draft.from_driver.id {
            return Err(Error::validation(
                "to_driver",
                "the receiving driver must differ from the current driver",
            ));
        }
        let driver = self.store.get_user(to_driver_id).await?;
        if !driver.is_driver() || !driver.is_active() {
            return Err(Error::validation(
                "to_driver",
                format!("{} is not an active driver", driver.name),
            ));
        }
        if self
            .leave
            .is_on_leave(to_driver_id, Utc::now().date_naive())
            .await?
        {
            return Err(Error::validation(
                "to_driver",
                format!("{} is on approved leave today", driver.name),
            ));
        }

        draft.to_driver = Some(driver);
        draft.signatures = None;
        Ok(())
    }

    /// Writes the handover and reassigns the job in one unit. Fails with
    /// `Conflict` when the job changed after the draft was started.
    pub async fn submit(&self, actor: &User, draft: HandoverDraft) -> Result<(Handover, Job)> {
        ensure_may_hand_over(actor, draft.from_driver.id)?;
        let (Some(to_driver), Some((from_signature, to_signature))) =
            (draft.to_driver, draft.signatures)
        else {
            return Err(Error::validation("handover", "the draft is incomplete"));
        };

        let now = Utc::now();
        let mut job = draft.job;
        job.reassign(to_driver.id, actor.id, now)?;

        let handover = Handover {
            id: 0,
            job_id: job.id,
            vehicle: job.vehicle_label(),
            from_driver_id: draft.from_driver.id,
            from_driver: draft.from_driver.name.clone(),
            to_driver_id: to_driver.id,
            to_driver: to_driver.name.clone(),
            timestamp: now,
            location: draft.details.location.trim().to_string(),
            odometer: draft.details.odometer,
            reason: draft.details.reason,
            reason_text: draft.details.reason_text(),
            notes: draft.details.notes.clone(),
            from_signature: from_signature.signature().map(str::to_string),
            to_signature: to_signature.signature().map(str::to_string),
            from_signature_notes: from_signature.skip_note().map(str::to_string),
            to_signature_notes: to_signature.skip_note().map(str::to_string),
            recorded_by: actor.id,
        };

        let (handover, job) = self
            .store
            .record_handover(&handover, &job)
            .await
            .inspect_err(|err| warn!(job_id = job.id, error = %err, "handover rejected"))?;
        info!(
            handover_id = handover.id,
            job_id = job.id,
            from = handover.from_driver_id,
            to = handover.to_driver_id,
            "handover recorded"
        );

        self.audit
            .note(
                actor,
                "handover.create",
                "handover",
                handover.id,
                json!({
                    "job_id": job.id,
                    "from_driver_id": handover.from_driver_id,
                    "to_driver_id": handover.to_driver_id,
                    "reason": handover.reason,
                }),
            )
            .await;
        self.feed.publish(JobEvent::updated(job.id));

        Ok((handover, job))
    }

    pub async fn get(&self, actor: &User, handover_id: i32) -> Result<Handover> {
        let handover = self.store.get_handover(handover_id).await?;
        ensure(
            actor,
            actor.can(Permission::ViewAllJobs)
                || handover.from_driver_id == actor.id
                || handover.to_driver_id == actor.id,
            "view this handover",
        )?;
        Ok(handover)
    }

    /// Newest first. Drivers without `can_view_all_jobs` only see their own.
    pub async fn list(&self, actor: &User, filter: &HandoverFilter) -> Result<Vec<Handover>> {
        if actor.can(Permission::ViewAllJobs) {
            return self.store.list_handovers(filter).await;
        }
        ensure(
            actor,
            filter.driver_id.is_none_or(|id| id == actor.id),
            "view other drivers' handovers",
        )?;
        let own = HandoverFilter {
            driver_id: Some(actor.id),
            ..filter.clone()
        };
        self.store.list_handovers(&own).await
    }
}

/// The driver holding the job, or anyone who may edit jobs.
fn ensure_may_hand_over(actor: &User, from_driver_id: i32) -> Result<()> {
    ensure(
        actor,
        from_driver_id == actor.id || actor.can(Permission::EditJobs),
        "hand over this job",
    )
}
