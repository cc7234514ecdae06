use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct AuditLog {
    pub id: i32,
    pub action: String,
    pub user_id: i32,
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
    pub resource: String,
    pub resource_id: Option<String>,
    pub details: serde_json::Value,
}
