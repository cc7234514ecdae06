use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

text_enum! {
    pub enum BillingItemType {
        Expense => "expense",
        Charge => "charge",
        InitialCost => "initial_cost",
        AdditionalFee => "additional_fee",
    }
}

/// Input for a billing line attached to a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBillingItem {
    pub job_id: i32,
    pub item_type: BillingItemType,
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub is_chargeable: bool,
    /// e.g. fuel, tolls, transport, storage, handling
    pub category: String,
    pub date: NaiveDate,
    pub receipt_url: Option<String>,
    pub notes: Option<String>,
}

impl NewBillingItem {
    pub fn validate(&self) -> Result<()> {
        if self.description.trim().is_empty() {
            return Err(Error::validation("description", "must not be empty"));
        }
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(Error::validation("quantity", "must be greater than zero"));
        }
        if !self.unit_price.is_finite() || self.unit_price < 0.0 {
            return Err(Error::validation("unit_price", "must not be negative"));
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct BillingItem {
    pub id: i32,
    pub job_id: i32,
    pub item_type: BillingItemType,
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub is_chargeable: bool,
    pub category: String,
    pub date: NaiveDate,
    pub receipt_url: Option<String>,
    pub notes: Option<String>,
    pub created_by: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BillingItem {
    pub fn from_new(new: NewBillingItem, actor: i32, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            job_id: new.job_id,
            item_type: new.item_type,
            description: new.description,
            quantity: new.quantity,
            unit_price: new.unit_price,
            is_chargeable: new.is_chargeable,
            category: new.category,
            date: new.date,
            receipt_url: new.receipt_url,
            notes: new.notes,
            created_by: actor,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn line_total(&self) -> f64 {
        self.quantity * self.unit_price
    }
}
