use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

text_enum! {
    /// Why custody of a vehicle changed hands.
    pub enum HandoverReason {
        StandardBreak => "standard_break",
        Emergency => "emergency",
        PlannedRotation => "planned_rotation",
        Other => "other",
    }
}

impl HandoverReason {
    pub fn label(&self) -> &'static str {
        match self {
            HandoverReason::StandardBreak => "Standard Break",
            HandoverReason::Emergency => "Emergency",
            HandoverReason::PlannedRotation => "Planned Rotation",
            HandoverReason::Other => "Other",
        }
    }
}

/// One side of the handover sign-off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HandoverSignature {
    /// Captured signature as an image data URL.
    Signed(String),
    /// Signature waived; the note says why.
    Skipped(String),
}

impl HandoverSignature {
    pub fn signature(&self) -> Option<&str> {
        match self {
            HandoverSignature::Signed(data) => Some(data),
            HandoverSignature::Skipped(_) => None,
        }
    }

    pub fn skip_note(&self) -> Option<&str> {
        match self {
            HandoverSignature::Signed(_) => None,
            HandoverSignature::Skipped(note) => Some(note),
        }
    }
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct Handover {
    pub id: i32,
    pub job_id: i32,
    pub vehicle: String,
    pub from_driver_id: i32,
    pub from_driver: String,
    pub to_driver_id: i32,
    pub to_driver: String,
    pub timestamp: DateTime<Utc>,
    pub location: String,
    pub odometer: i32,
    pub reason: HandoverReason,
    /// Free text when `reason` is `other`, otherwise the reason label.
    pub reason_text: String,
    pub notes: Option<String>,
    pub from_signature: Option<String>,
    pub to_signature: Option<String>,
    pub from_signature_notes: Option<String>,
    pub to_signature_notes: Option<String>,
    pub recorded_by: i32,
}
