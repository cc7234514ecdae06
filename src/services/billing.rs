//! Billing items, invoices and the billing dashboard.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::types::Json;
use tracing::{info, warn};

use super::{AuditTrail, ensure};
use crate::email::{Mailer, OutgoingEmail, TextAttachment, render_template};
use crate::error::{Error, Result};
use crate::models::{
    BillingAddress, BillingItem, BillingSettings, InvoiceStatus, JobInvoice, NewBillingItem,
    Payment, Permission, User, round_money,
};
use crate::statement::{render_statement, statement_filename};
use crate::store::{InvoiceFilter, Store};

/// Item totals partitioned by the chargeable flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BillingSummary {
    pub chargeable_total: f64,
    pub non_chargeable_total: f64,
    pub total: f64,
    pub chargeable_count: usize,
    pub non_chargeable_count: usize,
}

impl BillingSummary {
    pub fn from_items(items: &[BillingItem]) -> Self {
        let (chargeable, other): (Vec<&BillingItem>, Vec<&BillingItem>) =
            items.iter().partition(|item| item.is_chargeable);
        let sum = |items: &[&BillingItem]| round_money(items.iter().map(|i| i.line_total()).sum());

        let chargeable_total = sum(chargeable.as_slice());
        let non_chargeable_total = sum(other.as_slice());
        Self {
            chargeable_total,
            non_chargeable_total,
            total: round_money(chargeable_total + non_chargeable_total),
            chargeable_count: chargeable.len(),
            non_chargeable_count: other.len(),
        }
    }
}

/// Money on an invoice. `total` is always `subtotal + vat_amount`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InvoiceTotals {
    pub subtotal: f64,
    pub vat_rate: f64,
    pub vat_amount: f64,
    pub total: f64,
}

impl InvoiceTotals {
    pub fn compute(items: &[BillingItem], vat_rate: f64) -> Self {
        let subtotal = round_money(items.iter().map(BillingItem::line_total).sum());
        let vat_amount = round_money(subtotal * vat_rate / 100.0);
        Self {
            subtotal,
            vat_rate,
            vat_amount,
            total: round_money(subtotal + vat_amount),
        }
    }
}

/// Where a job stands in billing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    NotBilled,
    /// Items recorded, no invoice yet.
    Pending,
    Invoiced,
    Paid,
}

impl BillingStatus {
    pub fn derive(has_items: bool, invoice: Option<&JobInvoice>) -> Self {
        match invoice {
            Some(invoice) if invoice.status == InvoiceStatus::Paid => BillingStatus::Paid,
            Some(_) => BillingStatus::Invoiced,
            None if has_items => BillingStatus::Pending,
            None => BillingStatus::NotBilled,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BillingStats {
    pub total_outstanding: f64,
    pub total_paid: f64,
    pub overdue_count: usize,
    pub overdue_amount: f64,
    pub invoiced_this_month: f64,
    pub paid_this_month: f64,
    pub average_payment_days: i64,
}

impl BillingStats {
    pub fn from_invoices(invoices: &[JobInvoice], today: NaiveDate) -> Self {
        let same_month = |date: NaiveDate| date.year() == today.year() && date.month() == today.month();
        let paid_amount = |invoice: &JobInvoice| invoice.paid_amount.unwrap_or(invoice.total);

        let mut stats = BillingStats::default();
        let mut payment_days = Vec::new();

        for invoice in invoices {
            if invoice.status.is_unpaid() {
                stats.total_outstanding += invoice.total;
            }
            if invoice.status == InvoiceStatus::Overdue || invoice.is_overdue_on(today) {
                stats.overdue_count += 1;
                stats.overdue_amount += invoice.total;
            }
            if same_month(invoice.issue_date) {
                stats.invoiced_this_month += invoice.total;
            }
            if invoice.status == InvoiceStatus::Paid {
                stats.total_paid += paid_amount(invoice);
                if invoice.paid_date.is_some_and(same_month) {
                    stats.paid_this_month += paid_amount(invoice);
                }
                payment_days.extend(invoice.payment_days());
            }
        }

        if !payment_days.is_empty() {
            let mean = payment_days.iter().sum::<i64>() as f64 / payment_days.len() as f64;
            stats.average_payment_days = mean.round() as i64;
        }
        stats.total_outstanding = round_money(stats.total_outstanding);
        stats.total_paid = round_money(stats.total_paid);
        stats.overdue_amount = round_money(stats.overdue_amount);
        stats.invoiced_this_month = round_money(stats.invoiced_this_month);
        stats.paid_this_month = round_money(stats.paid_this_month);
        stats
    }
}

#[derive(Clone)]
pub struct BillingService {
    store: Arc<dyn Store>,
    audit: AuditTrail,
    mailer: Arc<dyn Mailer>,
}

impl BillingService {
    pub fn new(store: Arc<dyn Store>, audit: AuditTrail, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            store,
            audit,
            mailer,
        }
    }

    // Billing items

    pub async fn add_item(&self, actor: &User, new: NewBillingItem) -> Result<BillingItem> {
        ensure(actor, actor.can(Permission::CreateExpenses), "record billing items")?;
        new.validate()?;
        self.store.get_job(new.job_id).await?;

        let item = BillingItem::from_new(new, actor.id, Utc::now());
        let item = self.store.insert_billing_item(&item).await?;
        info!(item_id = item.id, job_id = item.job_id, "billing item added");
        self.audit
            .note(
                actor,
                "billing.item.create",
                "billing_item",
                item.id,
                json!({ "job_id": item.job_id, "amount": item.line_total() }),
            )
            .await;

        Ok(item)
    }

    /// Replaces an item's details. The item stays on its original job.
    pub async fn update_item(
        &self,
        actor: &User,
        item_id: i32,
        changes: NewBillingItem,
    ) -> Result<BillingItem> {
        let mut item = self.store.get_billing_item(item_id).await?;
        ensure_item_owner(actor, &item)?;
        changes.validate()?;

        item.item_type = changes.item_type;
        item.description = changes.description;
        item.quantity = changes.quantity;
        item.unit_price = changes.unit_price;
        item.is_chargeable = changes.is_chargeable;
        item.category = changes.category;
        item.date = changes.date;
        item.receipt_url = changes.receipt_url;
        item.notes = changes.notes;
        item.updated_at = Utc::now();

        let item = self.store.update_billing_item(&item).await?;
        self.audit
            .note(
                actor,
                "billing.item.update",
                "billing_item",
                item.id,
                json!({ "job_id": item.job_id, "amount": item.line_total() }),
            )
            .await;
        Ok(item)
    }

    pub async fn delete_item(&self, actor: &User, item_id: i32) -> Result<()> {
        let item = self.store.get_billing_item(item_id).await?;
        ensure_item_owner(actor, &item)?;
        self.store.delete_billing_item(item_id).await?;
        info!(item_id, job_id = item.job_id, "billing item deleted");
        self.audit
            .note(
                actor,
                "billing.item.delete",
                "billing_item",
                item_id,
                json!({ "job_id": item.job_id }),
            )
            .await;
        Ok(())
    }

    /// Newest `date` first.
    pub async fn items_for_job(&self, actor: &User, job_id: i32) -> Result<Vec<BillingItem>> {
        ensure(
            actor,
            actor.can(Permission::CreateExpenses) || actor.can(Permission::ApproveExpenses),
            "view billing items",
        )?;
        self.store.list_billing_items(job_id).await
    }

    pub async fn summary(&self, actor: &User, job_id: i32) -> Result<BillingSummary> {
        let items = self.items_for_job(actor, job_id).await?;
        Ok(BillingSummary::from_items(&items))
    }

    // Invoices

    /// Bills every chargeable item on the job. The invoice number is claimed
    /// from settings before the insert, so a failed insert leaves a gap.
    pub async fn create_invoice_from_job(&self, actor: &User, job_id: i32) -> Result<JobInvoice> {
        ensure_billing(actor)?;
        let job = self.store.get_job(job_id).await?;

        let existing = self.invoice_for_job(job_id).await?;
        if let Some(invoice) = existing {
            return Err(Error::validation(
                "job_id",
                format!("job {job_id} is already invoiced as {}", invoice.invoice_number),
            ));
        }

        let items: Vec<BillingItem> = self
            .store
            .list_billing_items(job_id)
            .await?
            .into_iter()
            .filter(|item| item.is_chargeable)
            .collect();
        if items.is_empty() {
            return Err(Error::validation(
                "items",
                format!("job {job_id} has no chargeable billing items"),
            ));
        }

        let customer = match job.customer_id {
            Some(customer_id) => Some(self.store.get_customer(customer_id).await?),
            None => None,
        };

        let now = Utc::now();
        let today = now.date_naive();
        // Checked before the claim so a bad term never burns a number.
        self.store.billing_settings().await?.due_date(today)?;

        let settings = self.store.claim_invoice_number().await?;
        let invoice_number = settings.format_invoice_number(settings.next_invoice_number);
        let totals = InvoiceTotals::compute(&items, settings.vat_rate);
        let due_date = settings.due_date(today)?;

        let billing_address = customer.as_ref().and_then(|c| {
            c.address.as_ref().map(|address| {
                Json(BillingAddress {
                    address: address.clone(),
                    city: c.city.clone().unwrap_or_default(),
                    postcode: c.postcode.clone().unwrap_or_default(),
                    country: c.country.clone().unwrap_or_default(),
                })
            })
        });
        let contact = customer.as_ref().and_then(|c| c.primary_contact());

        let invoice = JobInvoice {
            id: 0,
            invoice_number,
            job_id,
            customer_id: job.customer_id,
            customer_name: customer
                .as_ref()
                .map(|c| c.name.clone())
                .or(job.customer_name.clone())
                .unwrap_or_else(|| "Unknown customer".to_string()),
            customer_email: contact.map(|c| c.email.clone()),
            customer_phone: contact.and_then(|c| c.phone.clone()),
            billing_address,
            items: Json(items),
            subtotal: totals.subtotal,
            vat_rate: totals.vat_rate,
            vat_amount: totals.vat_amount,
            total: totals.total,
            status: InvoiceStatus::Draft,
            issue_date: today,
            due_date,
            sent_date: None,
            paid_date: None,
            paid_amount: None,
            payment_reference: None,
            payment_method: None,
            notes: None,
            created_by: actor.id,
            created_at: now,
            updated_at: now,
        };

        let invoice = self.store.insert_invoice(&invoice).await?;
        info!(
            invoice_id = invoice.id,
            invoice_number = %invoice.invoice_number,
            job_id,
            total = invoice.total,
            "invoice created"
        );
        self.audit
            .note(
                actor,
                "invoice.create",
                "invoice",
                invoice.id,
                json!({ "invoice_number": invoice.invoice_number, "job_id": job_id, "total": invoice.total }),
            )
            .await;

        Ok(invoice)
    }

    pub async fn get_invoice(&self, actor: &User, invoice_id: i32) -> Result<JobInvoice> {
        ensure_billing(actor)?;
        self.store.get_invoice(invoice_id).await
    }

    pub async fn list_invoices(&self, actor: &User, filter: &InvoiceFilter) -> Result<Vec<JobInvoice>> {
        ensure_billing(actor)?;
        self.store.list_invoices(filter).await
    }

    pub async fn set_status(
        &self,
        actor: &User,
        invoice_id: i32,
        status: InvoiceStatus,
    ) -> Result<JobInvoice> {
        ensure_billing(actor)?;
        let mut invoice = self.store.get_invoice(invoice_id).await?;
        let from = invoice.status;
        let now = Utc::now();
        invoice.set_status(status, now.date_naive(), now)?;
        self.save_status_change(actor, invoice, from).await
    }

    pub async fn record_payment(
        &self,
        actor: &User,
        invoice_id: i32,
        payment: Payment,
    ) -> Result<JobInvoice> {
        ensure_billing(actor)?;
        let mut invoice = self.store.get_invoice(invoice_id).await?;
        let from = invoice.status;
        let now = Utc::now();
        invoice.record_payment(payment, now.date_naive(), now)?;
        self.save_status_change(actor, invoice, from).await
    }

    /// Moves every sent, viewed or outstanding invoice past its due date to
    /// overdue. Returns the invoices that changed.
    pub async fn mark_overdue(&self, actor: &User, today: NaiveDate) -> Result<Vec<JobInvoice>> {
        ensure_billing(actor)?;
        let invoices = self.store.list_invoices(&InvoiceFilter::default()).await?;

        let mut changed = Vec::new();
        for mut invoice in invoices.into_iter().filter(|i| i.is_overdue_on(today)) {
            let from = invoice.status;
            invoice.set_status(InvoiceStatus::Overdue, today, Utc::now())?;
            changed.push(self.save_status_change(actor, invoice, from).await?);
        }
        if !changed.is_empty() {
            info!(count = changed.len(), %today, "invoices marked overdue");
        }
        Ok(changed)
    }

    /// Sends the invoice e-mail with the statement attached. A draft becomes
    /// sent once the mail is out.
    pub async fn email_invoice(&self, actor: &User, invoice_id: i32) -> Result<JobInvoice> {
        ensure_billing(actor)?;
        let invoice = self.store.get_invoice(invoice_id).await?;
        let settings = self.store.billing_settings().await?;
        let templates = &settings.templates;

        let email = compose(
            &invoice,
            &settings,
            &templates.invoice_subject,
            &templates.invoice_body,
        )?;
        self.mailer.send(email).await?;
        info!(invoice_number = %invoice.invoice_number, "invoice e-mailed");

        if invoice.status == InvoiceStatus::Draft {
            return self
                .set_status(actor, invoice_id, InvoiceStatus::Sent)
                .await;
        }
        self.audit
            .note(
                actor,
                "invoice.email",
                "invoice",
                invoice_id,
                json!({ "to": invoice.customer_email }),
            )
            .await;
        Ok(invoice)
    }

    pub async fn send_reminder(&self, actor: &User, invoice_id: i32) -> Result<JobInvoice> {
        ensure_billing(actor)?;
        let invoice = self.store.get_invoice(invoice_id).await?;
        let today = Utc::now().date_naive();
        if invoice.status != InvoiceStatus::Overdue && !invoice.is_overdue_on(today) {
            return Err(Error::validation(
                "status",
                format!("invoice {} is not overdue", invoice.invoice_number),
            ));
        }

        let settings = self.store.billing_settings().await?;
        let templates = &settings.templates;
        let email = compose(
            &invoice,
            &settings,
            &templates.reminder_subject,
            &templates.reminder_body,
        )?;
        self.mailer.send(email).await?;
        info!(invoice_number = %invoice.invoice_number, "payment reminder sent");

        self.audit
            .note(
                actor,
                "invoice.reminder",
                "invoice",
                invoice_id,
                json!({ "to": invoice.customer_email }),
            )
            .await;
        Ok(invoice)
    }

    /// Only drafts can be deleted.
    pub async fn delete_invoice(&self, actor: &User, invoice_id: i32) -> Result<()> {
        ensure_billing(actor)?;
        let invoice = self.store.get_invoice(invoice_id).await?;
        if invoice.status != InvoiceStatus::Draft {
            warn!(invoice_id, status = %invoice.status, "refusing to delete issued invoice");
            return Err(Error::validation(
                "status",
                format!("invoice {} has been issued and cannot be deleted", invoice.invoice_number),
            ));
        }
        self.store.delete_invoice(invoice_id).await?;
        self.audit
            .note(
                actor,
                "invoice.delete",
                "invoice",
                invoice_id,
                json!({ "invoice_number": invoice.invoice_number }),
            )
            .await;
        Ok(())
    }

    pub async fn dashboard_stats(&self, actor: &User, today: NaiveDate) -> Result<BillingStats> {
        ensure_billing(actor)?;
        let invoices = self.store.list_invoices(&InvoiceFilter::default()).await?;
        Ok(BillingStats::from_invoices(&invoices, today))
    }

    pub async fn job_billing_status(&self, actor: &User, job_id: i32) -> Result<BillingStatus> {
        ensure_billing(actor)?;
        let has_items = !self.store.list_billing_items(job_id).await?.is_empty();
        let invoice = self.invoice_for_job(job_id).await?;
        Ok(BillingStatus::derive(has_items, invoice.as_ref()))
    }

    // Settings

    pub async fn settings(&self, actor: &User) -> Result<BillingSettings> {
        ensure_billing(actor)?;
        self.store.billing_settings().await
    }

    pub async fn update_settings(&self, actor: &User, settings: BillingSettings) -> Result<BillingSettings> {
        ensure(actor, actor.is_admin(), "change billing settings")?;
        settings.validate()?;
        let current = self.store.billing_settings().await?;
        if settings.next_invoice_number < current.next_invoice_number {
            return Err(Error::validation(
                "next_invoice_number",
                format!("must not go below {}", current.next_invoice_number),
            ));
        }

        self.store.save_billing_settings(&settings).await?;
        info!(actor = actor.id, "billing settings updated");
        self.audit
            .note(
                actor,
                "billing.settings.update",
                "billing_settings",
                1,
                json!({ "vat_rate": settings.vat_rate, "payment_terms_days": settings.payment_terms_days }),
            )
            .await;
        Ok(settings)
    }

    async fn invoice_for_job(&self, job_id: i32) -> Result<Option<JobInvoice>> {
        let mut invoices = self
            .store
            .list_invoices(&InvoiceFilter {
                job_id: Some(job_id),
                limit: Some(1),
                ..InvoiceFilter::default()
            })
            .await?;
        Ok(invoices.pop())
    }

    async fn save_status_change(
        &self,
        actor: &User,
        invoice: JobInvoice,
        from: InvoiceStatus,
    ) -> Result<JobInvoice> {
        let invoice = self.store.update_invoice(&invoice).await?;
        info!(invoice_id = invoice.id, from = %from, to = %invoice.status, "invoice status changed");
        self.audit
            .note(
                actor,
                "invoice.status",
                "invoice",
                invoice.id,
                json!({ "from": from, "to": invoice.status }),
            )
            .await;
        Ok(invoice)
    }
}

fn ensure_billing(actor: &User) -> Result<()> {
    ensure(actor, actor.can(Permission::ApproveExpenses), "manage invoices")
}

fn ensure_item_owner(actor: &User, item: &BillingItem) -> Result<()> {
    ensure(
        actor,
        actor.can(Permission::ApproveExpenses)
            || (item.created_by == actor.id && actor.can(Permission::CreateExpenses)),
        "change this billing item",
    )
}

fn compose(
    invoice: &JobInvoice,
    settings: &BillingSettings,
    subject: &str,
    body: &str,
) -> Result<OutgoingEmail> {
    let to = invoice.customer_email.clone().ok_or_else(|| {
        Error::validation(
            "customer_email",
            format!("invoice {} has no customer e-mail", invoice.invoice_number),
        )
    })?;

    let total = format!("{:.2}", invoice.total);
    let due_date = invoice.due_date.format("%d/%m/%Y").to_string();
    let values = [
        ("invoiceNumber", invoice.invoice_number.as_str()),
        ("companyName", settings.company.name.as_str()),
        ("customerName", invoice.customer_name.as_str()),
        ("total", total.as_str()),
        ("dueDate", due_date.as_str()),
    ];

    Ok(OutgoingEmail {
        to,
        subject: render_template(subject, &values),
        body: render_template(body, &values),
        attachment: Some(TextAttachment {
            filename: statement_filename(invoice),
            content: render_statement(invoice, settings),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BillingItemType;

    fn item(quantity: f64, unit_price: f64, is_chargeable: bool) -> BillingItem {
        let now = Utc::now();
        BillingItem {
            id: 0,
            job_id: 1,
            item_type: BillingItemType::Charge,
            description: "transport".into(),
            quantity,
            unit_price,
            is_chargeable,
            category: "transport".into(),
            date: now.date_naive(),
            receipt_url: None,
            notes: None,
            created_by: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn invoice(status: InvoiceStatus, issue: NaiveDate, due: NaiveDate, total: f64) -> JobInvoice {
        let now = Utc::now();
        JobInvoice {
            id: 0,
            invoice_number: "INV-000001".into(),
            job_id: 1,
            customer_id: None,
            customer_name: "Customer".into(),
            customer_email: None,
            customer_phone: None,
            billing_address: None,
            items: Json(Vec::new()),
            subtotal: total,
            vat_rate: 0.0,
            vat_amount: 0.0,
            total,
            status,
            issue_date: issue,
            due_date: due,
            sent_date: None,
            paid_date: None,
            paid_amount: None,
            payment_reference: None,
            payment_method: None,
            notes: None,
            created_by: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn invoice_total_equals_subtotal_plus_vat() {
        let items = [item(2.0, 45.5, true), item(1.0, 19.99, true)];
        let totals = InvoiceTotals::compute(&items, 20.0);
        assert_eq!(totals.subtotal, 110.99);
        assert_eq!(totals.vat_amount, 22.2);
        assert_eq!(totals.total, round_money(totals.subtotal + totals.vat_amount));
    }

    #[test]
    fn vat_rounds_to_pence() {
        let totals = InvoiceTotals::compute(&[item(1.0, 10.05, true)], 17.5);
        assert_eq!(totals.vat_amount, 1.76);
        assert_eq!(totals.total, 11.81);
    }

    #[test]
    fn summary_partitions_by_chargeable_flag() {
        let items = [item(1.0, 100.0, true), item(3.0, 5.0, false), item(2.0, 12.5, true)];
        let summary = BillingSummary::from_items(&items);
        assert_eq!(summary.chargeable_total, 125.0);
        assert_eq!(summary.non_chargeable_total, 15.0);
        assert_eq!(summary.total, 140.0);
        assert_eq!(summary.chargeable_count, 2);
        assert_eq!(summary.non_chargeable_count, 1);
    }

    #[test]
    fn billing_status_follows_invoice() {
        let paid = invoice(InvoiceStatus::Paid, date(2024, 1, 1), date(2024, 1, 31), 10.0);
        let sent = invoice(InvoiceStatus::Sent, date(2024, 1, 1), date(2024, 1, 31), 10.0);
        assert_eq!(BillingStatus::derive(false, None), BillingStatus::NotBilled);
        assert_eq!(BillingStatus::derive(true, None), BillingStatus::Pending);
        assert_eq!(BillingStatus::derive(true, Some(&sent)), BillingStatus::Invoiced);
        assert_eq!(BillingStatus::derive(true, Some(&paid)), BillingStatus::Paid);
    }

    #[test]
    fn dashboard_stats_split_outstanding_paid_and_overdue() {
        let today = date(2024, 6, 15);
        let mut paid = invoice(InvoiceStatus::Paid, date(2024, 6, 1), date(2024, 7, 1), 120.0);
        paid.paid_date = Some(date(2024, 6, 11));
        let mut paid_earlier = invoice(InvoiceStatus::Paid, date(2024, 4, 1), date(2024, 5, 1), 80.0);
        paid_earlier.paid_date = Some(date(2024, 4, 21));
        paid_earlier.paid_amount = Some(75.0);

        let invoices = [
            paid,
            paid_earlier,
            invoice(InvoiceStatus::Sent, date(2024, 5, 1), date(2024, 5, 31), 50.0),
            invoice(InvoiceStatus::Overdue, date(2024, 3, 1), date(2024, 3, 31), 30.0),
            invoice(InvoiceStatus::Outstanding, date(2024, 6, 10), date(2024, 7, 10), 20.0),
            invoice(InvoiceStatus::Draft, date(2024, 6, 12), date(2024, 7, 12), 999.0),
        ];
        let stats = BillingStats::from_invoices(&invoices, today);

        assert_eq!(stats.total_outstanding, 100.0);
        assert_eq!(stats.total_paid, 195.0);
        assert_eq!(stats.overdue_count, 2);
        assert_eq!(stats.overdue_amount, 80.0);
        assert_eq!(stats.invoiced_this_month, 1139.0);
        assert_eq!(stats.paid_this_month, 120.0);
        // 10 and 20 days
        assert_eq!(stats.average_payment_days, 15);
    }

    #[test]
    fn overdue_figures_cover_swept_and_unswept_invoices() {
        let today = date(2024, 6, 15);
        let past_due = date(2024, 6, 1);
        let mut paid_late = invoice(InvoiceStatus::Paid, date(2024, 5, 1), past_due, 7.0);
        paid_late.paid_date = Some(today);

        let invoices = [
            invoice(InvoiceStatus::Sent, date(2024, 5, 1), past_due, 1.0),
            invoice(InvoiceStatus::Viewed, date(2024, 5, 1), past_due, 2.0),
            invoice(InvoiceStatus::Outstanding, date(2024, 5, 1), past_due, 4.0),
            // Already swept; due date no longer matters.
            invoice(InvoiceStatus::Overdue, date(2024, 6, 10), date(2024, 7, 10), 8.0),
            // Due today is not yet late.
            invoice(InvoiceStatus::Sent, date(2024, 5, 15), today, 16.0),
            invoice(InvoiceStatus::Draft, date(2024, 5, 1), past_due, 32.0),
            paid_late,
        ];
        let stats = BillingStats::from_invoices(&invoices, today);

        assert_eq!(stats.overdue_count, 4);
        assert_eq!(stats.overdue_amount, 15.0);
    }

    #[test]
    fn composed_mail_fills_placeholders_and_attaches_statement() {
        let mut invoice = invoice(InvoiceStatus::Draft, date(2024, 6, 1), date(2024, 7, 1), 180.0);
        invoice.customer_email = Some("accounts@customer.example".into());
        let settings = BillingSettings::default();

        let email = compose(
            &invoice,
            &settings,
            &settings.templates.invoice_subject,
            &settings.templates.invoice_body,
        )
        .unwrap();

        assert_eq!(email.subject, format!("Invoice INV-000001 from {}", settings.company.name));
        assert!(email.body.contains("£180.00"));
        assert!(email.body.contains("01/07/2024"));
        assert_eq!(email.attachment.unwrap().filename, "invoice_INV-000001.txt");
    }

    #[test]
    fn composing_without_customer_email_fails() {
        let invoice = invoice(InvoiceStatus::Draft, date(2024, 6, 1), date(2024, 7, 1), 1.0);
        let settings = BillingSettings::default();
        let result = compose(&invoice, &settings, "s", "b");
        assert!(matches!(result, Err(Error::Validation { field: "customer_email", .. })));
    }
}
