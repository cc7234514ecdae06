use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use crate::error::{Error, Result};
use crate::models::BillingItem;

text_enum! {
    pub enum InvoiceStatus {
        Draft => "draft",
        Sent => "sent",
        Viewed => "viewed",
        Outstanding => "outstanding",
        Paid => "paid",
        Overdue => "overdue",
    }
}

impl InvoiceStatus {
    pub fn can_transition_to(self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, next),
            (Draft, Sent)
                | (Sent, Viewed)
                | (Sent, Outstanding)
                | (Sent, Overdue)
                | (Sent, Paid)
                | (Viewed, Outstanding)
                | (Viewed, Overdue)
                | (Viewed, Paid)
                | (Outstanding, Overdue)
                | (Outstanding, Paid)
                | (Overdue, Paid)
        )
    }

    /// Issued to the customer and not yet settled.
    pub fn is_unpaid(self) -> bool {
        matches!(
            self,
            InvoiceStatus::Sent
                | InvoiceStatus::Viewed
                | InvoiceStatus::Outstanding
                | InvoiceStatus::Overdue
        )
    }

    /// Statuses that flip to overdue once the due date passes.
    pub fn can_become_overdue(self) -> bool {
        matches!(
            self,
            InvoiceStatus::Sent | InvoiceStatus::Viewed | InvoiceStatus::Outstanding
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingAddress {
    pub address: String,
    pub city: String,
    pub postcode: String,
    pub country: String,
}

/// Settlement details recorded when an invoice is paid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Payment {
    pub amount: Option<f64>,
    pub reference: Option<String>,
    pub method: Option<String>,
    pub date: Option<NaiveDate>,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct JobInvoice {
    pub id: i32,
    pub invoice_number: String,
    pub job_id: i32,
    pub customer_id: Option<i32>,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub billing_address: Option<Json<BillingAddress>>,
    pub items: Json<Vec<BillingItem>>,
    pub subtotal: f64,
    pub vat_rate: f64,
    pub vat_amount: f64,
    pub total: f64,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub sent_date: Option<NaiveDate>,
    pub paid_date: Option<NaiveDate>,
    pub paid_amount: Option<f64>,
    pub payment_reference: Option<String>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    pub created_by: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobInvoice {
    pub fn is_overdue_on(&self, today: NaiveDate) -> bool {
        self.status.can_become_overdue() && self.due_date < today
    }

    /// Whole days between issue and payment.
    pub fn payment_days(&self) -> Option<i64> {
        self.paid_date.map(|paid| (paid - self.issue_date).num_days())
    }

    pub fn set_status(&mut self, next: InvoiceStatus, today: NaiveDate, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::transition("invoice", self.status, next));
        }
        if next == InvoiceStatus::Sent && self.sent_date.is_none() {
            self.sent_date = Some(today);
        }
        if next == InvoiceStatus::Paid && self.paid_date.is_none() {
            self.paid_date = Some(today);
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    pub fn record_payment(&mut self, payment: Payment, today: NaiveDate, now: DateTime<Utc>) -> Result<()> {
        if let Some(amount) = payment.amount {
            if !amount.is_finite() || amount <= 0.0 {
                return Err(Error::validation("amount", "payment must be positive"));
            }
        }
        if let Some(date) = payment.date {
            self.paid_date = Some(date);
        }
        self.set_status(InvoiceStatus::Paid, today, now)?;
        self.paid_amount = Some(payment.amount.unwrap_or(self.total));
        self.payment_reference = payment.reference;
        self.payment_method = payment.method;
        Ok(())
    }
}
