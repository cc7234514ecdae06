use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Longest payment term an invoice may carry.
pub const MAX_PAYMENT_TERMS_DAYS: i32 = 365;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyDetails {
    pub name: String,
    pub address: String,
    pub city: String,
    pub postcode: String,
    pub country: String,
    pub company_number: String,
    pub vat_number: Option<String>,
    pub email: String,
    pub phone: String,
    pub website: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankDetails {
    pub bank_name: String,
    pub account_name: String,
    pub sort_code: String,
    pub account_number: String,
}

/// Subject/body templates with `{{placeholder}}` markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailTemplates {
    pub invoice_subject: String,
    pub invoice_body: String,
    pub reminder_subject: String,
    pub reminder_body: String,
}

/// Company-wide billing configuration. A single row in storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingSettings {
    /// Percentage, e.g. `20.0` for 20 % VAT.
    pub vat_rate: f64,
    pub payment_terms_days: i32,
    pub invoice_prefix: String,
    pub next_invoice_number: i32,
    pub company: CompanyDetails,
    pub bank: BankDetails,
    pub templates: EmailTemplates,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            vat_rate: 20.0,
            payment_terms_days: 30,
            invoice_prefix: "INV-".to_string(),
            next_invoice_number: 1,
            company: CompanyDetails {
                name: "NI VEHICLE LOGISTICS LTD".to_string(),
                address: "55-59 Adelaide Street".to_string(),
                city: "Belfast".to_string(),
                postcode: "BT2 8FE".to_string(),
                country: "Northern Ireland".to_string(),
                company_number: "NI684159".to_string(),
                vat_number: None,
                email: "info@nivehiclelogistics.com".to_string(),
                phone: "+44 28 9024 4747".to_string(),
                website: None,
            },
            bank: BankDetails {
                bank_name: "Example Bank".to_string(),
                account_name: "NI VEHICLE LOGISTICS LTD".to_string(),
                sort_code: "00-00-00".to_string(),
                account_number: "12345678".to_string(),
            },
            templates: EmailTemplates {
                invoice_subject: "Invoice {{invoiceNumber}} from {{companyName}}".to_string(),
                invoice_body: "Dear {{customerName}},\n\nPlease find attached invoice {{invoiceNumber}} for £{{total}}.\n\nPayment is due by {{dueDate}}.\n\nThank you for your business.".to_string(),
                reminder_subject: "Payment Reminder - Invoice {{invoiceNumber}}".to_string(),
                reminder_body: "Dear {{customerName}},\n\nThis is a friendly reminder that invoice {{invoiceNumber}} for £{{total}} is now overdue.\n\nPlease arrange payment at your earliest convenience.".to_string(),
            },
        }
    }
}

impl BillingSettings {
    /// Formats `number` with the configured prefix, zero-padded to six digits.
    pub fn format_invoice_number(&self, number: i32) -> String {
        format!("{}{:06}", self.invoice_prefix, number)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.vat_rate) {
            return Err(Error::validation("vat_rate", "must be between 0 and 100"));
        }
        if !(0..=MAX_PAYMENT_TERMS_DAYS).contains(&self.payment_terms_days) {
            return Err(Error::validation(
                "payment_terms_days",
                format!("must be between 0 and {MAX_PAYMENT_TERMS_DAYS}"),
            ));
        }
        if self.next_invoice_number < 1 {
            return Err(Error::validation("next_invoice_number", "must be at least 1"));
        }
        Ok(())
    }

    /// Due date for an invoice issued on `issued`.
    pub fn due_date(&self, issued: NaiveDate) -> Result<NaiveDate> {
        issued
            .checked_add_signed(Duration::days(i64::from(self.payment_terms_days)))
            .ok_or_else(|| Error::validation("payment_terms_days", "due date is out of range"))
    }
}
