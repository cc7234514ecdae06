use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

text_enum! {
    /// Where a transport job is in its lifecycle.
    pub enum JobStatus {
        Unallocated => "unallocated",
        Allocated => "allocated",
        Collected => "collected",
        Delivered => "delivered",
        Completed => "completed",
        Aborted => "aborted",
        Cancelled => "cancelled",
    }
}

impl JobStatus {
    /// Returns true when `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Unallocated, Allocated)
                | (Unallocated, Cancelled)
                | (Allocated, Unallocated)
                | (Allocated, Collected)
                | (Allocated, Aborted)
                | (Allocated, Cancelled)
                | (Collected, Delivered)
                | (Collected, Aborted)
                | (Delivered, Completed)
                | (Delivered, Aborted)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Aborted | JobStatus::Cancelled
        )
    }

    /// A driver is attached and the vehicle is somewhere between collection
    /// and delivery.
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            JobStatus::Allocated | JobStatus::Collected | JobStatus::Delivered
        )
    }
}

text_enum! {
    /// Finer-grained progress marker within a status.
    pub enum JobStage {
        CollectionComplete => "collection-complete",
        InTransit => "in-transit",
        ReadyForDelivery => "ready-for-delivery",
        AwaitingConfirmation => "awaiting-confirmation",
    }
}

/// Input for a new transport job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewJob {
    pub customer_id: Option<i32>,
    pub customer_reference: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub registration: Option<String>,
    pub chassis_number: Option<String>,
    pub color: Option<String>,
    pub year: Option<i32>,
    pub collection_address: String,
    pub collection_city: Option<String>,
    pub collection_postcode: Option<String>,
    pub collection_contact_name: Option<String>,
    pub collection_contact_phone: Option<String>,
    pub collection_notes: Option<String>,
    pub delivery_address: String,
    pub delivery_city: Option<String>,
    pub delivery_postcode: Option<String>,
    pub delivery_contact_name: Option<String>,
    pub delivery_contact_phone: Option<String>,
    pub delivery_notes: Option<String>,
}

impl NewJob {
    pub fn validate(&self) -> Result<()> {
        if self.collection_address.trim().is_empty() {
            return Err(Error::validation("collection_address", "must not be empty"));
        }
        if self.delivery_address.trim().is_empty() {
            return Err(Error::validation("delivery_address", "must not be empty"));
        }
        if self.registration.is_none() && self.chassis_number.is_none() {
            return Err(Error::validation(
                "vehicle",
                "either a registration or a chassis number is required",
            ));
        }
        Ok(())
    }
}

/// What a driver records at the end of a collection or delivery leg.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegReport {
    pub mileage: Option<i32>,
    pub fuel_level: Option<String>,
    pub notes: Option<String>,
    pub photos: Vec<String>,
    pub signature: Option<String>,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct Job {
    pub id: i32,
    pub status: JobStatus,
    pub stage: Option<JobStage>,
    pub driver_id: Option<i32>,
    pub customer_id: Option<i32>,
    pub customer_name: Option<String>,
    pub customer_reference: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub registration: Option<String>,
    pub chassis_number: Option<String>,
    pub color: Option<String>,
    pub year: Option<i32>,
    pub collection_address: String,
    pub collection_city: Option<String>,
    pub collection_postcode: Option<String>,
    pub collection_contact_name: Option<String>,
    pub collection_contact_phone: Option<String>,
    pub collection_notes: Option<String>,
    pub delivery_address: String,
    pub delivery_city: Option<String>,
    pub delivery_postcode: Option<String>,
    pub delivery_contact_name: Option<String>,
    pub delivery_contact_phone: Option<String>,
    pub delivery_notes: Option<String>,
    pub mileage: Option<i32>,
    pub fuel_level: Option<String>,
    pub collection_photos: Vec<String>,
    pub delivery_photos: Vec<String>,
    pub collection_signature: Option<String>,
    pub delivery_signature: Option<String>,
    pub abort_reason: Option<String>,
    pub allocated_at: Option<DateTime<Utc>>,
    pub unallocated_at: Option<DateTime<Utc>>,
    pub collection_started_at: Option<DateTime<Utc>>,
    pub collection_completed_at: Option<DateTime<Utc>>,
    pub delivery_started_at: Option<DateTime<Utc>>,
    pub delivery_completed_at: Option<DateTime<Utc>>,
    pub last_handover_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<i32>,
    pub updated_by: Option<i32>,
    pub version: i32,
}

impl Job {
    /// Builds an unsaved, unallocated job. The store assigns `id`.
    pub fn from_new(new: NewJob, customer_name: Option<String>, actor: i32, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            status: JobStatus::Unallocated,
            stage: None,
            driver_id: None,
            customer_id: new.customer_id,
            customer_name,
            customer_reference: new.customer_reference,
            make: new.make,
            model: new.model,
            registration: new.registration,
            chassis_number: new.chassis_number,
            color: new.color,
            year: new.year,
            collection_address: new.collection_address,
            collection_city: new.collection_city,
            collection_postcode: new.collection_postcode,
            collection_contact_name: new.collection_contact_name,
            collection_contact_phone: new.collection_contact_phone,
            collection_notes: new.collection_notes,
            delivery_address: new.delivery_address,
            delivery_city: new.delivery_city,
            delivery_postcode: new.delivery_postcode,
            delivery_contact_name: new.delivery_contact_name,
            delivery_contact_phone: new.delivery_contact_phone,
            delivery_notes: new.delivery_notes,
            mileage: None,
            fuel_level: None,
            collection_photos: Vec::new(),
            delivery_photos: Vec::new(),
            collection_signature: None,
            delivery_signature: None,
            abort_reason: None,
            allocated_at: None,
            unallocated_at: None,
            collection_started_at: None,
            collection_completed_at: None,
            delivery_started_at: None,
            delivery_completed_at: None,
            last_handover_at: None,
            created_at: now,
            updated_at: now,
            created_by: Some(actor),
            updated_by: Some(actor),
            version: 0,
        }
    }

    /// The descriptive part of this job, ready to be saved as a fresh copy.
    pub fn duplicate(&self) -> NewJob {
        NewJob {
            customer_id: self.customer_id,
            customer_reference: self.customer_reference.clone(),
            make: self.make.clone(),
            model: self.model.clone(),
            registration: self.registration.clone(),
            chassis_number: self.chassis_number.clone(),
            color: self.color.clone(),
            year: self.year,
            collection_address: self.collection_address.clone(),
            collection_city: self.collection_city.clone(),
            collection_postcode: self.collection_postcode.clone(),
            collection_contact_name: self.collection_contact_name.clone(),
            collection_contact_phone: self.collection_contact_phone.clone(),
            collection_notes: self.collection_notes.clone(),
            delivery_address: self.delivery_address.clone(),
            delivery_city: self.delivery_city.clone(),
            delivery_postcode: self.delivery_postcode.clone(),
            delivery_contact_name: self.delivery_contact_name.clone(),
            delivery_contact_phone: self.delivery_contact_phone.clone(),
            delivery_notes: self.delivery_notes.clone(),
        }
    }

    /// Short human label, registration first.
    pub fn vehicle_label(&self) -> String {
        let vehicle = [self.make.as_deref(), self.model.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        match (&self.registration, vehicle.is_empty()) {
            (Some(reg), true) => reg.clone(),
            (Some(reg), false) => format!("{reg} ({vehicle})"),
            (None, _) => self
                .chassis_number
                .clone()
                .unwrap_or_else(|| format!("job {}", self.id)),
        }
    }

    fn touch(&mut self, actor: i32, now: DateTime<Utc>) {
        self.updated_at = now;
        self.updated_by = Some(actor);
    }

    fn transition(&mut self, next: JobStatus, actor: i32, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::transition("job", self.status, next));
        }
        self.status = next;
        self.touch(actor, now);
        Ok(())
    }

    pub fn allocate(&mut self, driver_id: i32, actor: i32, now: DateTime<Utc>) -> Result<()> {
        self.transition(JobStatus::Allocated, actor, now)?;
        self.driver_id = Some(driver_id);
        self.allocated_at = Some(now);
        Ok(())
    }

    pub fn unallocate(&mut self, actor: i32, now: DateTime<Utc>) -> Result<()> {
        self.transition(JobStatus::Unallocated, actor, now)?;
        self.driver_id = None;
        self.allocated_at = None;
        self.unallocated_at = Some(now);
        Ok(())
    }

    pub fn start_collection(&mut self, actor: i32, now: DateTime<Utc>) -> Result<()> {
        self.transition(JobStatus::Collected, actor, now)?;
        self.collection_started_at = Some(now);
        Ok(())
    }

    pub fn complete_collection(
        &mut self,
        report: LegReport,
        actor: i32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.status != JobStatus::Collected || self.collection_completed_at.is_some() {
            return Err(Error::transition("job", self.status, JobStage::InTransit));
        }
        self.stage = Some(JobStage::InTransit);
        self.collection_completed_at = Some(now);
        self.apply_report(report, Leg::Collection);
        self.touch(actor, now);
        Ok(())
    }

    pub fn start_delivery(&mut self, actor: i32, now: DateTime<Utc>) -> Result<()> {
        if self.status == JobStatus::Collected && self.collection_completed_at.is_none() {
            return Err(Error::validation(
                "job",
                "collection must be completed before delivery starts",
            ));
        }
        self.transition(JobStatus::Delivered, actor, now)?;
        self.stage = Some(JobStage::ReadyForDelivery);
        self.delivery_started_at = Some(now);
        Ok(())
    }

    pub fn complete_delivery(
        &mut self,
        report: LegReport,
        actor: i32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.transition(JobStatus::Completed, actor, now)?;
        self.stage = Some(JobStage::AwaitingConfirmation);
        self.delivery_completed_at = Some(now);
        self.apply_report(report, Leg::Delivery);
        Ok(())
    }

    pub fn cancel(&mut self, actor: i32, now: DateTime<Utc>) -> Result<()> {
        self.transition(JobStatus::Cancelled, actor, now)
    }

    pub fn abort(&mut self, reason: String, actor: i32, now: DateTime<Utc>) -> Result<()> {
        if reason.trim().is_empty() {
            return Err(Error::validation("reason", "an abort reason is required"));
        }
        self.transition(JobStatus::Aborted, actor, now)?;
        self.abort_reason = Some(reason);
        Ok(())
    }

    /// Moves custody to another driver without changing status.
    pub fn reassign(&mut self, driver_id: i32, actor: i32, now: DateTime<Utc>) -> Result<()> {
        if !self.status.is_in_progress() || self.driver_id.is_none() {
            return Err(Error::validation(
                "job",
                format!("job {} in status `{}` cannot be handed over", self.id, self.status),
            ));
        }
        self.driver_id = Some(driver_id);
        self.last_handover_at = Some(now);
        self.touch(actor, now);
        Ok(())
    }

    fn apply_report(&mut self, report: LegReport, leg: Leg) {
        if report.mileage.is_some() {
            self.mileage = report.mileage;
        }
        if report.fuel_level.is_some() {
            self.fuel_level = report.fuel_level;
        }
        match leg {
            Leg::Collection => {
                if report.notes.is_some() {
                    self.collection_notes = report.notes;
                }
                self.collection_photos.extend(report.photos);
                if report.signature.is_some() {
                    self.collection_signature = report.signature;
                }
            }
            Leg::Delivery => {
                if report.notes.is_some() {
                    self.delivery_notes = report.notes;
                }
                self.delivery_photos.extend(report.photos);
                if report.signature.is_some() {
                    self.delivery_signature = report.signature;
                }
            }
        }
    }
}

enum Leg {
    Collection,
    Delivery,
}

/// Free-text note attached to a job.
#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct JobNote {
    pub id: i32,
    pub job_id: i32,
    pub author: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        let new = NewJob {
            registration: Some("AB12 CDE".into()),
            make: Some("Ford".into()),
            model: Some("Transit".into()),
            collection_address: "1 Dock Road".into(),
            delivery_address: "9 Mill Lane".into(),
            ..NewJob::default()
        };
        Job::from_new(new, None, 1, Utc::now())
    }

    #[test]
    fn terminal_statuses_have_no_successors() {
        for from in [JobStatus::Completed, JobStatus::Aborted, JobStatus::Cancelled] {
            assert!(from.is_terminal());
            for to in JobStatus::ALL {
                assert!(!from.can_transition_to(*to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn full_lifecycle_sets_stages_and_timestamps() {
        let mut job = job();
        let now = Utc::now();
        job.allocate(7, 1, now).unwrap();
        assert_eq!(job.driver_id, Some(7));
        job.start_collection(7, now).unwrap();
        job.complete_collection(
            LegReport {
                mileage: Some(42_000),
                photos: vec!["front.jpg".into()],
                ..LegReport::default()
            },
            7,
            now,
        )
        .unwrap();
        assert_eq!(job.stage, Some(JobStage::InTransit));
        job.start_delivery(7, now).unwrap();
        assert_eq!(job.stage, Some(JobStage::ReadyForDelivery));
        job.complete_delivery(LegReport::default(), 7, now).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.stage, Some(JobStage::AwaitingConfirmation));
        assert_eq!(job.mileage, Some(42_000));
        assert_eq!(job.collection_photos, vec!["front.jpg".to_string()]);
        assert!(job.delivery_completed_at.is_some());
    }

    #[test]
    fn delivery_requires_completed_collection() {
        let mut job = job();
        let now = Utc::now();
        job.allocate(7, 1, now).unwrap();
        job.start_collection(7, now).unwrap();
        let err = job.start_delivery(7, now).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(job.status, JobStatus::Collected);
    }

    #[test]
    fn unallocated_job_cannot_be_collected() {
        let mut job = job();
        let err = job.start_collection(1, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[test]
    fn unallocate_clears_driver() {
        let mut job = job();
        let now = Utc::now();
        job.allocate(3, 1, now).unwrap();
        job.unallocate(1, now).unwrap();
        assert_eq!(job.driver_id, None);
        assert_eq!(job.allocated_at, None);
        assert!(job.unallocated_at.is_some());
    }

    #[test]
    fn reassign_only_while_in_progress() {
        let mut job = job();
        let now = Utc::now();
        assert!(job.reassign(9, 1, now).is_err());
        job.allocate(3, 1, now).unwrap();
        job.reassign(9, 1, now).unwrap();
        assert_eq!(job.driver_id, Some(9));
        assert_eq!(job.status, JobStatus::Allocated);
    }

    #[test]
    fn status_round_trips_through_text() {
        assert_eq!("in-transit".parse::<JobStage>().unwrap(), JobStage::InTransit);
        assert!("loaded".parse::<JobStatus>().is_err());
    }

    #[test]
    fn vehicle_label_prefers_registration() {
        assert_eq!(job().vehicle_label(), "AB12 CDE (Ford Transit)");
    }
}
