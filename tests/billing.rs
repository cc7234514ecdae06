mod common;

use chrono::{Duration, Utc};
use fleet_manager::Error;
use fleet_manager::models::{InvoiceStatus, Job, JobInvoice, MAX_PAYMENT_TERMS_DAYS, Payment};
use fleet_manager::services::BillingStatus;
use fleet_manager::store::{InvoiceFilter, Store};

use common::{Harness, harness, new_item};

/// Two chargeable lines worth 345.50 and a 20.00 internal cost.
async fn billed_job(h: &Harness, registration: &str) -> Job {
    let customer = h.customer("Harbour Motors").await;
    let job = h.job_for(&customer, registration).await;
    let billing = &h.fleet.billing;
    billing
        .add_item(&h.dispatcher, new_item(job.id, "Belfast to Derry", 2.0, 150.0, true))
        .await
        .unwrap();
    billing
        .add_item(&h.dispatcher, new_item(job.id, "Ferry fare", 1.0, 45.5, true))
        .await
        .unwrap();
    billing
        .add_item(&h.dispatcher, new_item(job.id, "Driver lunch", 1.0, 20.0, false))
        .await
        .unwrap();
    job
}

async fn invoice(h: &Harness, registration: &str) -> JobInvoice {
    let job = billed_job(h, registration).await;
    h.fleet
        .billing
        .create_invoice_from_job(&h.dispatcher, job.id)
        .await
        .unwrap()
}

async fn status(h: &Harness, job_id: i32) -> BillingStatus {
    h.fleet
        .billing
        .job_billing_status(&h.dispatcher, job_id)
        .await
        .unwrap()
}

#[tokio::test]
async fn invoice_bills_only_chargeable_items() {
    let h = harness().await;
    let invoice = invoice(&h, "AB12 CDE").await;
    let today = Utc::now().date_naive();

    assert_eq!(invoice.invoice_number, "INV-000001");
    assert_eq!(invoice.status, InvoiceStatus::Draft);
    assert_eq!(invoice.items.len(), 2);
    assert!(invoice.items.iter().all(|item| item.is_chargeable));
    assert_eq!(invoice.subtotal, 345.5);
    assert_eq!(invoice.vat_rate, 20.0);
    assert_eq!(invoice.vat_amount, 69.1);
    assert_eq!(invoice.total, 414.6);
    assert_eq!(invoice.issue_date, today);
    assert_eq!(invoice.due_date, today + Duration::days(30));

    assert_eq!(invoice.customer_name, "Harbour Motors");
    assert_eq!(invoice.customer_email.as_deref(), Some("accounts@dealer.test"));
    let address = invoice.billing_address.as_ref().unwrap();
    assert_eq!(address.postcode, "BT1 1AA");
}

#[tokio::test]
async fn invoice_numbers_advance_per_invoice() {
    let h = harness().await;
    let first = invoice(&h, "ONE").await;
    let second = invoice(&h, "TWO").await;

    assert_eq!(first.invoice_number, "INV-000001");
    assert_eq!(second.invoice_number, "INV-000002");

    let settings = h.fleet.billing.settings(&h.dispatcher).await.unwrap();
    assert_eq!(settings.next_invoice_number, 3);
}

#[tokio::test]
async fn a_job_is_invoiced_once() {
    let h = harness().await;
    let invoice = invoice(&h, "AB12 CDE").await;

    let err = h
        .fleet
        .billing
        .create_invoice_from_job(&h.dispatcher, invoice.job_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { field: "job_id", .. }), "got {err:?}");
}

#[tokio::test]
async fn storage_refuses_a_second_invoice_for_a_job() {
    let h = harness().await;
    let first = invoice(&h, "AB12 CDE").await;

    let mut second = first.clone();
    second.invoice_number = "INV-000999".to_string();
    let err = h.fleet.store().insert_invoice(&second).await.unwrap_err();
    assert!(matches!(err, Error::Validation { field: "job_id", .. }), "got {err:?}");

    let invoices = h
        .fleet
        .billing
        .list_invoices(
            &h.dispatcher,
            &InvoiceFilter {
                job_id: Some(first.job_id),
                ..InvoiceFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(invoices.len(), 1);
}

#[tokio::test]
async fn jobs_without_chargeable_items_cannot_be_invoiced() {
    let h = harness().await;
    let job = h.job("AB12 CDE").await;
    let billing = &h.fleet.billing;

    let err = billing
        .create_invoice_from_job(&h.dispatcher, job.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { field: "items", .. }), "got {err:?}");

    billing
        .add_item(&h.dispatcher, new_item(job.id, "Fuel", 1.0, 60.0, false))
        .await
        .unwrap();
    let err = billing
        .create_invoice_from_job(&h.dispatcher, job.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { field: "items", .. }), "got {err:?}");

    // A refused invoice must not consume a number.
    let settings = billing.settings(&h.dispatcher).await.unwrap();
    assert_eq!(settings.next_invoice_number, 1);
}

#[tokio::test]
async fn invoice_lifecycle_from_email_to_payment() {
    let h = harness().await;
    let billing = &h.fleet.billing;
    let draft = invoice(&h, "AB12 CDE").await;
    let today = Utc::now().date_naive();

    let err = billing
        .set_status(&h.dispatcher, draft.id, InvoiceStatus::Paid)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }), "got {err:?}");

    let sent = billing.email_invoice(&h.dispatcher, draft.id).await.unwrap();
    assert_eq!(sent.status, InvoiceStatus::Sent);
    assert_eq!(sent.sent_date, Some(today));

    let outbox = h.mailer.sent();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].to, "accounts@dealer.test");
    assert_eq!(outbox[0].subject, "Invoice INV-000001 from NI VEHICLE LOGISTICS LTD");
    assert!(outbox[0].body.contains("£414.60"));
    let attachment = outbox[0].attachment.as_ref().unwrap();
    assert_eq!(attachment.filename, "invoice_INV-000001.txt");
    assert!(attachment.content.contains("INV-000001"));

    let paid = billing
        .record_payment(
            &h.dispatcher,
            draft.id,
            Payment {
                amount: None,
                reference: Some("BACS 0042".to_string()),
                method: Some("bank transfer".to_string()),
                date: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);
    assert_eq!(paid.paid_amount, Some(414.6));
    assert_eq!(paid.paid_date, Some(today));
    assert_eq!(paid.payment_reference.as_deref(), Some("BACS 0042"));

    let stats = billing.dashboard_stats(&h.dispatcher, today).await.unwrap();
    assert_eq!(stats.total_paid, 414.6);
    assert_eq!(stats.paid_this_month, 414.6);
    assert_eq!(stats.total_outstanding, 0.0);
    assert_eq!(stats.average_payment_days, 0);
}

#[tokio::test]
async fn overdue_invoices_are_flagged_and_chased() {
    let h = harness().await;
    let billing = &h.fleet.billing;
    let draft = invoice(&h, "AB12 CDE").await;
    let later = draft.due_date + Duration::days(1);

    let err = billing.send_reminder(&h.dispatcher, draft.id).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }), "got {err:?}");

    // Drafts never become overdue.
    assert!(billing.mark_overdue(&h.dispatcher, later).await.unwrap().is_empty());

    billing.email_invoice(&h.dispatcher, draft.id).await.unwrap();
    assert!(
        billing
            .mark_overdue(&h.dispatcher, draft.due_date)
            .await
            .unwrap()
            .is_empty()
    );

    let changed = billing.mark_overdue(&h.dispatcher, later).await.unwrap();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].status, InvoiceStatus::Overdue);

    let stats = billing.dashboard_stats(&h.dispatcher, later).await.unwrap();
    assert_eq!(stats.overdue_count, 1);
    assert_eq!(stats.overdue_amount, 414.6);
    assert_eq!(stats.total_outstanding, 414.6);

    billing.send_reminder(&h.dispatcher, draft.id).await.unwrap();
    let outbox = h.mailer.sent();
    assert_eq!(outbox.len(), 2);
    assert_eq!(outbox[1].subject, "Payment Reminder - Invoice INV-000001");
}

#[tokio::test]
async fn only_drafts_can_be_deleted() {
    let h = harness().await;
    let billing = &h.fleet.billing;
    let draft = invoice(&h, "AB12 CDE").await;

    billing.delete_invoice(&h.dispatcher, draft.id).await.unwrap();
    let err = billing.get_invoice(&h.dispatcher, draft.id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }), "got {err:?}");

    // The job can be invoiced again; the deleted number is not reused.
    let again = billing
        .create_invoice_from_job(&h.dispatcher, draft.job_id)
        .await
        .unwrap();
    assert_eq!(again.invoice_number, "INV-000002");

    billing.email_invoice(&h.dispatcher, again.id).await.unwrap();
    let err = billing.delete_invoice(&h.dispatcher, again.id).await.unwrap_err();
    assert!(matches!(err, Error::Validation { field: "status", .. }), "got {err:?}");
}

#[tokio::test]
async fn invoices_without_a_customer_address_cannot_be_emailed() {
    let h = harness().await;
    let job = h.job("AB12 CDE").await;
    let billing = &h.fleet.billing;
    billing
        .add_item(&h.dispatcher, new_item(job.id, "Transport", 1.0, 100.0, true))
        .await
        .unwrap();
    let invoice = billing
        .create_invoice_from_job(&h.dispatcher, job.id)
        .await
        .unwrap();
    assert_eq!(invoice.customer_name, "Unknown customer");

    let err = billing.email_invoice(&h.dispatcher, invoice.id).await.unwrap_err();
    assert!(matches!(err, Error::Validation { field: "customer_email", .. }), "got {err:?}");
    assert!(h.mailer.sent().is_empty());

    let unchanged = billing.get_invoice(&h.dispatcher, invoice.id).await.unwrap();
    assert_eq!(unchanged.status, InvoiceStatus::Draft);
}

#[tokio::test]
async fn billing_status_follows_the_job() {
    let h = harness().await;
    let billing = &h.fleet.billing;
    let job = h.job("AB12 CDE").await;

    assert_eq!(status(&h, job.id).await, BillingStatus::NotBilled);

    billing
        .add_item(&h.dispatcher, new_item(job.id, "Transport", 1.0, 100.0, true))
        .await
        .unwrap();
    assert_eq!(status(&h, job.id).await, BillingStatus::Pending);

    let invoice = billing
        .create_invoice_from_job(&h.dispatcher, job.id)
        .await
        .unwrap();
    assert_eq!(status(&h, job.id).await, BillingStatus::Invoiced);

    billing
        .set_status(&h.dispatcher, invoice.id, InvoiceStatus::Sent)
        .await
        .unwrap();
    billing
        .set_status(&h.dispatcher, invoice.id, InvoiceStatus::Paid)
        .await
        .unwrap();
    assert_eq!(status(&h, job.id).await, BillingStatus::Paid);
}

#[tokio::test]
async fn summary_splits_chargeable_costs() {
    let h = harness().await;
    let job = billed_job(&h, "AB12 CDE").await;

    let summary = h.fleet.billing.summary(&h.dispatcher, job.id).await.unwrap();
    assert_eq!(summary.chargeable_total, 345.5);
    assert_eq!(summary.non_chargeable_total, 20.0);
    assert_eq!(summary.total, 365.5);
    assert_eq!(summary.chargeable_count, 2);
    assert_eq!(summary.non_chargeable_count, 1);
}

#[tokio::test]
async fn drivers_record_expenses_but_do_not_invoice() {
    let h = harness().await;
    let billing = &h.fleet.billing;
    let job = h.job("AB12 CDE").await;

    let item = billing
        .add_item(&h.alice, new_item(job.id, "Parking", 1.0, 8.5, false))
        .await
        .unwrap();
    assert_eq!(item.created_by, h.alice.id);

    let err = billing
        .add_item(&h.alice, new_item(job.id, "Parking", 0.0, 8.5, false))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { field: "quantity", .. }), "got {err:?}");

    let err = billing
        .update_item(&h.bob, item.id, new_item(job.id, "Parking", 1.0, 80.0, false))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden { .. }), "got {err:?}");

    let updated = billing
        .update_item(&h.alice, item.id, new_item(job.id, "Parking", 1.0, 9.0, false))
        .await
        .unwrap();
    assert_eq!(updated.unit_price, 9.0);

    let err = billing
        .create_invoice_from_job(&h.alice, job.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden { .. }), "got {err:?}");

    let err = billing
        .list_invoices(&h.alice, &InvoiceFilter::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden { .. }), "got {err:?}");

    billing.delete_item(&h.alice, item.id).await.unwrap();
    assert!(billing.items_for_job(&h.alice, job.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn settings_are_admin_only_and_validated() {
    let h = harness().await;
    let billing = &h.fleet.billing;
    let mut settings = billing.settings(&h.admin).await.unwrap();

    settings.vat_rate = 150.0;
    let err = billing
        .update_settings(&h.admin, settings.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { field: "vat_rate", .. }), "got {err:?}");

    settings.vat_rate = 0.0;
    settings.invoice_prefix = "NIV-".to_string();
    settings.next_invoice_number = 100;
    let err = billing
        .update_settings(&h.dispatcher, settings.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden { .. }), "got {err:?}");

    billing.update_settings(&h.admin, settings).await.unwrap();
    let invoice = invoice(&h, "AB12 CDE").await;
    assert_eq!(invoice.invoice_number, "NIV-000100");
    assert_eq!(invoice.vat_amount, 0.0);
    assert_eq!(invoice.total, invoice.subtotal);
}

#[tokio::test]
async fn payment_terms_are_capped() {
    let h = harness().await;
    let billing = &h.fleet.billing;
    let mut settings = billing.settings(&h.admin).await.unwrap();

    settings.payment_terms_days = 200_000_000;
    let err = billing
        .update_settings(&h.admin, settings.clone())
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Validation { field: "payment_terms_days", .. }),
        "got {err:?}"
    );

    settings.payment_terms_days = MAX_PAYMENT_TERMS_DAYS;
    billing.update_settings(&h.admin, settings).await.unwrap();
    let invoice = invoice(&h, "AB12 CDE").await;
    assert_eq!(
        invoice.due_date,
        invoice.issue_date + Duration::days(i64::from(MAX_PAYMENT_TERMS_DAYS))
    );
}

#[tokio::test]
async fn invoice_counter_never_moves_back() {
    let h = harness().await;
    let billing = &h.fleet.billing;
    let first = invoice(&h, "AB12 CDE").await;
    billing.delete_invoice(&h.dispatcher, first.id).await.unwrap();

    let mut settings = billing.settings(&h.admin).await.unwrap();
    assert_eq!(settings.next_invoice_number, 2);
    settings.next_invoice_number = 1;
    let err = billing
        .update_settings(&h.admin, settings.clone())
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Validation { field: "next_invoice_number", .. }),
        "got {err:?}"
    );

    // A direct save cannot rewind the counter either.
    h.fleet.store().save_billing_settings(&settings).await.unwrap();

    let again = billing
        .create_invoice_from_job(&h.dispatcher, first.job_id)
        .await
        .unwrap();
    assert_eq!(again.invoice_number, "INV-000002");
}
