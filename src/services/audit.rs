use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use super::ensure;
use crate::error::Result;
use crate::models::{AuditLog, Permission, User};
use crate::store::{AuditFilter, Store};

/// Append-only record of who changed what.
#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn Store>,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn record(
        &self,
        actor: &User,
        action: &str,
        resource: &str,
        resource_id: Option<String>,
        details: Value,
    ) -> Result<AuditLog> {
        let log = AuditLog {
            id: 0,
            action: action.to_string(),
            user_id: actor.id,
            user_name: actor.name.clone(),
            timestamp: Utc::now(),
            resource: resource.to_string(),
            resource_id,
            details,
        };
        let log = self.store.insert_audit_log(&log).await?;
        debug!(audit_id = log.id, action, resource, "audit entry written");
        Ok(log)
    }

    /// Like [`AuditTrail::record`] but a failed write only logs a warning;
    /// the change being audited has already been stored.
    pub(crate) async fn note(
        &self,
        actor: &User,
        action: &str,
        resource: &str,
        resource_id: impl ToString,
        details: Value,
    ) {
        let resource_id = resource_id.to_string();
        if let Err(err) = self
            .record(actor, action, resource, Some(resource_id.clone()), details)
            .await
        {
            warn!(action, resource, resource_id, error = %err, "failed to write audit entry");
        }
    }

    pub async fn list(&self, actor: &User, filter: &AuditFilter) -> Result<Vec<AuditLog>> {
        ensure_auditor(actor)?;
        self.store.list_audit_logs(filter).await
    }

    pub async fn get(&self, actor: &User, id: i32) -> Result<AuditLog> {
        ensure_auditor(actor)?;
        self.store.get_audit_log(id).await
    }
}

fn ensure_auditor(actor: &User) -> Result<()> {
    ensure(
        actor,
        actor.is_admin() || actor.can(Permission::ViewReports),
        "view audit logs",
    )
}
