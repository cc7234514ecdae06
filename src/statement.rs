use std::fmt::Write;

use crate::models::{BillingSettings, JobInvoice};

const RULE: &str = "------------------------------------------------------------------------";

/// File name used when the statement travels as an attachment.
pub fn statement_filename(invoice: &JobInvoice) -> String {
    format!("invoice_{}.txt", invoice.invoice_number)
}

/// Renders a fixed-width plain-text statement for `invoice`.
pub fn render_statement(invoice: &JobInvoice, settings: &BillingSettings) -> String {
    let mut content = String::new();
    // Writing into a String cannot fail.
    let _ = write_statement(&mut content, invoice, settings);
    content
}

fn write_statement(
    out: &mut String,
    invoice: &JobInvoice,
    settings: &BillingSettings,
) -> std::fmt::Result {
    let company = &settings.company;

    // Company header
    writeln!(out, "{}", company.name)?;
    writeln!(out, "{}", company.address)?;
    writeln!(out, "{} {}", company.city, company.postcode)?;
    writeln!(out, "{}", company.country)?;
    writeln!(out, "{} | {}", company.phone, company.email)?;
    write!(out, "Company No. {}", company.company_number)?;
    if let Some(vat_number) = &company.vat_number {
        write!(out, " | VAT No. {vat_number}")?;
    }
    writeln!(out)?;
    writeln!(out, "{RULE}")?;

    writeln!(out, "INVOICE {}", invoice.invoice_number)?;
    writeln!(out, "Issued:   {}", invoice.issue_date.format("%d/%m/%Y"))?;
    writeln!(out, "Due:      {}", invoice.due_date.format("%d/%m/%Y"))?;
    writeln!(out, "Status:   {}", invoice.status)?;
    writeln!(out)?;

    writeln!(out, "Invoice for")?;
    writeln!(out, "  {}", invoice.customer_name)?;
    if let Some(address) = &invoice.billing_address {
        writeln!(out, "  {}", address.address)?;
        writeln!(out, "  {} {}", address.city, address.postcode)?;
        if !address.country.is_empty() {
            writeln!(out, "  {}", address.country)?;
        }
    }
    if let Some(email) = &invoice.customer_email {
        writeln!(out, "  {email}")?;
    }
    writeln!(out, "{RULE}")?;

    writeln!(
        out,
        "{:<40} {:>8} {:>10} {:>10}",
        "Description", "Qty", "Unit", "Amount"
    )?;
    for item in invoice.items.iter() {
        writeln!(
            out,
            "{:<40} {:>8} {:>10.2} {:>10.2}",
            truncate(&item.description, 40),
            item.quantity,
            item.unit_price,
            item.line_total()
        )?;
    }
    writeln!(out, "{RULE}")?;

    writeln!(out, "{:>60} {:>10.2}", "Subtotal", invoice.subtotal)?;
    writeln!(
        out,
        "{:>60} {:>10.2}",
        format!("VAT ({}%)", invoice.vat_rate),
        invoice.vat_amount
    )?;
    writeln!(out, "{:>60} {:>10.2}", "Total (GBP)", invoice.total)?;
    if let Some(paid) = invoice.paid_amount {
        writeln!(out, "{:>60} {:>10.2}", "Paid", paid)?;
    }
    writeln!(out)?;

    let bank = &settings.bank;
    writeln!(out, "Payable to")?;
    writeln!(out, "  {}", bank.account_name)?;
    writeln!(out, "  {}", bank.bank_name)?;
    writeln!(out, "  Sort code: {}", bank.sort_code)?;
    writeln!(out, "  Account:   {}", bank.account_number)?;
    writeln!(out, "  Reference: {}", invoice.invoice_number)?;

    if let Some(notes) = &invoice.notes {
        writeln!(out)?;
        writeln!(out, "Notes: {notes}")?;
    }

    Ok(())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(width - 1).collect();
        cut.push('~');
        cut
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use sqlx::types::Json;

    use super::*;
    use crate::models::{BillingItem, BillingItemType, InvoiceStatus};

    fn invoice() -> JobInvoice {
        let now = Utc::now();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        JobInvoice {
            id: 1,
            invoice_number: "INV-000042".into(),
            job_id: 9,
            customer_id: None,
            customer_name: "Harbour Motors".into(),
            customer_email: Some("accounts@harbour.example".into()),
            customer_phone: None,
            billing_address: None,
            items: Json(vec![BillingItem {
                id: 1,
                job_id: 9,
                item_type: BillingItemType::Charge,
                description: "Belfast to Dublin transport".into(),
                quantity: 1.0,
                unit_price: 150.0,
                is_chargeable: true,
                category: "transport".into(),
                date,
                receipt_url: None,
                notes: None,
                created_by: 1,
                created_at: now,
                updated_at: now,
            }]),
            subtotal: 150.0,
            vat_rate: 20.0,
            vat_amount: 30.0,
            total: 180.0,
            status: InvoiceStatus::Draft,
            issue_date: date,
            due_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
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

    #[test]
    fn statement_lists_totals_and_bank_details() {
        let settings = BillingSettings::default();
        let text = render_statement(&invoice(), &settings);

        assert!(text.starts_with(&settings.company.name));
        assert!(text.contains("INVOICE INV-000042"));
        assert!(text.contains("Belfast to Dublin transport"));
        assert!(text.contains("180.00"));
        assert!(text.contains("Due:      31/03/2024"));
        assert!(text.contains(&settings.bank.sort_code));
    }

    #[test]
    fn long_descriptions_are_cut_to_column_width() {
        let cut = truncate(&"x".repeat(50), 40);
        assert_eq!(cut.chars().count(), 40);
        assert!(cut.ends_with('~'));
    }

    #[test]
    fn attachment_name_uses_invoice_number() {
        assert_eq!(statement_filename(&invoice()), "invoice_INV-000042.txt");
    }
}
