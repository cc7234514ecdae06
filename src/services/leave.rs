use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::json;
use tracing::info;

use super::{AuditTrail, ensure};
use crate::error::{Error, Result};
use crate::models::{LeaveRequest, LeaveStatus, NewLeaveRequest, Permission, User};
use crate::store::{LeaveFilter, Store};

#[derive(Clone)]
pub struct LeaveService {
    store: Arc<dyn Store>,
    audit: AuditTrail,
}

impl LeaveService {
    pub fn new(store: Arc<dyn Store>, audit: AuditTrail) -> Self {
        Self { store, audit }
    }

    /// Drivers may only submit for themselves; managers may submit for anyone.
    pub async fn submit(&self, actor: &User, request: NewLeaveRequest) -> Result<LeaveRequest> {
        ensure(
            actor,
            request.driver_id == actor.id || is_manager(actor),
            "request leave for another driver",
        )?;
        request.validate()?;
        let driver = self.store.get_user(request.driver_id).await?;

        let leave = LeaveRequest {
            id: 0,
            driver_id: driver.id,
            driver_name: driver.name.clone(),
            leave_type: request.leave_type,
            start_date: request.start_date,
            end_date: request.end_date,
            notes: request.notes,
            status: LeaveStatus::Pending,
            submitted: Utc::now(),
            processed_by: None,
            processed_at: None,
            response_notes: None,
        };
        let leave = self.store.insert_leave_request(&leave).await?;
        info!(leave_id = leave.id, driver_id = leave.driver_id, days = leave.days(), "leave requested");
        self.audit
            .note(
                actor,
                "leave.submit",
                "leave_request",
                leave.id,
                json!({ "type": leave.leave_type, "start": leave.start_date, "end": leave.end_date }),
            )
            .await;

        Ok(leave)
    }

    pub async fn approve(
        &self,
        actor: &User,
        leave_id: i32,
        response_notes: Option<String>,
    ) -> Result<LeaveRequest> {
        self.decide(actor, leave_id, LeaveStatus::Approved, response_notes)
            .await
    }

    pub async fn deny(
        &self,
        actor: &User,
        leave_id: i32,
        response_notes: Option<String>,
    ) -> Result<LeaveRequest> {
        self.decide(actor, leave_id, LeaveStatus::Denied, response_notes)
            .await
    }

    /// Withdraws a pending request. Open to the requesting driver and admins.
    pub async fn cancel(&self, actor: &User, leave_id: i32) -> Result<LeaveRequest> {
        let mut leave = self.store.get_leave_request(leave_id).await?;
        ensure(
            actor,
            leave.driver_id == actor.id || actor.is_admin(),
            "cancel this leave request",
        )?;
        if leave.status != LeaveStatus::Pending {
            return Err(Error::transition("leave request", leave.status, LeaveStatus::Cancelled));
        }
        leave.status = LeaveStatus::Cancelled;
        leave.processed_by = Some(actor.id);
        leave.processed_at = Some(Utc::now());

        let leave = self.store.update_leave_request(&leave).await?;
        info!(leave_id, "leave request cancelled");
        self.audit
            .note(actor, "leave.cancel", "leave_request", leave_id, json!({}))
            .await;
        Ok(leave)
    }

    pub async fn get(&self, actor: &User, leave_id: i32) -> Result<LeaveRequest> {
        let leave = self.store.get_leave_request(leave_id).await?;
        ensure(
            actor,
            leave.driver_id == actor.id || is_manager(actor),
            "view this leave request",
        )?;
        Ok(leave)
    }

    pub async fn list_all(&self, actor: &User) -> Result<Vec<LeaveRequest>> {
        ensure(actor, is_manager(actor), "view all leave requests")?;
        self.store.list_leave_requests(&LeaveFilter::default()).await
    }

    pub async fn list_pending(&self, actor: &User) -> Result<Vec<LeaveRequest>> {
        ensure(actor, is_manager(actor), "view pending leave requests")?;
        self.store
            .list_leave_requests(&LeaveFilter {
                status: Some(LeaveStatus::Pending),
                ..LeaveFilter::default()
            })
            .await
    }

    pub async fn list_for_driver(&self, actor: &User, driver_id: i32) -> Result<Vec<LeaveRequest>> {
        ensure(
            actor,
            driver_id == actor.id || is_manager(actor),
            "view another driver's leave",
        )?;
        self.store
            .list_leave_requests(&LeaveFilter {
                driver_id: Some(driver_id),
                ..LeaveFilter::default()
            })
            .await
    }

    /// True when an approved request covers `date`.
    pub async fn is_on_leave(&self, driver_id: i32, date: NaiveDate) -> Result<bool> {
        let approved = self
            .store
            .list_leave_requests(&LeaveFilter {
                driver_id: Some(driver_id),
                status: Some(LeaveStatus::Approved),
            })
            .await?;
        Ok(approved.iter().any(|leave| leave.covers(date)))
    }

    async fn decide(
        &self,
        actor: &User,
        leave_id: i32,
        decision: LeaveStatus,
        response_notes: Option<String>,
    ) -> Result<LeaveRequest> {
        ensure(actor, is_manager(actor), "decide leave requests")?;
        let mut leave = self.store.get_leave_request(leave_id).await?;
        leave.decide(decision, actor.id, response_notes, Utc::now())?;

        let leave = self.store.update_leave_request(&leave).await?;
        info!(leave_id, status = %leave.status, actor = actor.id, "leave request decided");
        self.audit
            .note(
                actor,
                "leave.decide",
                "leave_request",
                leave_id,
                json!({ "status": leave.status, "driver_id": leave.driver_id }),
            )
            .await;
        Ok(leave)
    }
}

fn is_manager(actor: &User) -> bool {
    actor.is_admin() || actor.can(Permission::ManageUsers)
}
