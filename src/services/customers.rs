use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::info;

use super::{AuditTrail, ensure};
use crate::error::Result;
use crate::models::{Customer, CustomerStatus, NewCustomer, Permission, User, normalize_contacts};
use crate::store::{CustomerFilter, Store};

#[derive(Clone)]
pub struct CustomerService {
    store: Arc<dyn Store>,
    audit: AuditTrail,
}

impl CustomerService {
    pub fn new(store: Arc<dyn Store>, audit: AuditTrail) -> Self {
        Self { store, audit }
    }

    pub async fn create(&self, actor: &User, mut new: NewCustomer) -> Result<Customer> {
        ensure(actor, actor.can(Permission::ManageCompanies), "create customers")?;
        new.validate()?;
        normalize_contacts(&mut new.contacts);

        let now = Utc::now();
        let customer = Customer {
            id: 0,
            name: new.name.trim().to_string(),
            category: new.category,
            status: CustomerStatus::Active,
            address: new.address,
            city: new.city,
            postcode: new.postcode,
            country: new.country,
            website: new.website,
            notes: new.notes,
            contacts: sqlx::types::Json(new.contacts),
            is_active: true,
            created_at: now,
            updated_at: now,
            created_by: Some(actor.id),
            updated_by: Some(actor.id),
        };
        let customer = self.store.insert_customer(&customer).await?;
        info!(customer_id = customer.id, name = %customer.name, "customer created");
        self.audit
            .note(actor, "customer.create", "customer", customer.id, json!({ "name": customer.name }))
            .await;
        Ok(customer)
    }

    /// Replaces the customer's details, keeping status and history.
    pub async fn update(&self, actor: &User, customer_id: i32, mut changes: NewCustomer) -> Result<Customer> {
        ensure(actor, actor.can(Permission::ManageCompanies), "edit customers")?;
        changes.validate()?;
        normalize_contacts(&mut changes.contacts);

        let mut customer = self.store.get_customer(customer_id).await?;
        customer.name = changes.name.trim().to_string();
        customer.category = changes.category;
        customer.address = changes.address;
        customer.city = changes.city;
        customer.postcode = changes.postcode;
        customer.country = changes.country;
        customer.website = changes.website;
        customer.notes = changes.notes;
        customer.contacts = sqlx::types::Json(changes.contacts);
        customer.updated_at = Utc::now();
        customer.updated_by = Some(actor.id);

        let customer = self.store.update_customer(&customer).await?;
        self.audit
            .note(actor, "customer.update", "customer", customer_id, json!({ "name": customer.name }))
            .await;
        Ok(customer)
    }

    pub async fn get(&self, actor: &User, customer_id: i32) -> Result<Customer> {
        ensure(actor, true, "view customers")?;
        self.store.get_customer(customer_id).await
    }

    pub async fn list_active(&self, actor: &User) -> Result<Vec<Customer>> {
        ensure(actor, true, "list customers")?;
        self.store
            .list_customers(&CustomerFilter {
                active_only: true,
                ..CustomerFilter::default()
            })
            .await
    }

    pub async fn list_by_category(&self, actor: &User, category: &str) -> Result<Vec<Customer>> {
        ensure(actor, true, "list customers")?;
        self.store
            .list_customers(&CustomerFilter {
                active_only: true,
                category: Some(category.to_string()),
            })
            .await
    }

    /// Soft delete: the record stays for existing jobs and invoices.
    pub async fn deactivate(&self, actor: &User, customer_id: i32) -> Result<Customer> {
        ensure(actor, actor.can(Permission::ManageCompanies), "deactivate customers")?;
        let mut customer = self.store.get_customer(customer_id).await?;
        customer.is_active = false;
        customer.status = CustomerStatus::Inactive;
        customer.updated_at = Utc::now();
        customer.updated_by = Some(actor.id);

        let customer = self.store.update_customer(&customer).await?;
        info!(customer_id, "customer deactivated");
        self.audit
            .note(actor, "customer.deactivate", "customer", customer_id, json!({}))
            .await;
        Ok(customer)
    }
}
