use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

text_enum! {
    pub enum LeaveType {
        Holiday => "holiday",
        Sick => "sick",
        Personal => "personal",
        Bereavement => "bereavement",
        Other => "other",
    }
}

text_enum! {
    pub enum LeaveStatus {
        Pending => "pending",
        Approved => "approved",
        Denied => "denied",
        Cancelled => "cancelled",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLeaveRequest {
    pub driver_id: i32,
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub notes: Option<String>,
}

impl NewLeaveRequest {
    pub fn validate(&self) -> Result<()> {
        if self.end_date < self.start_date {
            return Err(Error::validation(
                "end_date",
                format!("{} is before start date {}", self.end_date, self.start_date),
            ));
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct LeaveRequest {
    pub id: i32,
    pub driver_id: i32,
    pub driver_name: String,
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub notes: Option<String>,
    pub status: LeaveStatus,
    pub submitted: DateTime<Utc>,
    pub processed_by: Option<i32>,
    pub processed_at: Option<DateTime<Utc>>,
    pub response_notes: Option<String>,
}

impl LeaveRequest {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    /// Inclusive length of the request in calendar days.
    pub fn days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    /// Records an admin decision on a pending request.
    pub fn decide(
        &mut self,
        decision: LeaveStatus,
        processed_by: i32,
        response_notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.status != LeaveStatus::Pending {
            return Err(Error::transition("leave request", self.status, decision));
        }
        self.status = decision;
        self.processed_by = Some(processed_by);
        self.processed_at = Some(now);
        self.response_notes = response_notes;
        Ok(())
    }
}
