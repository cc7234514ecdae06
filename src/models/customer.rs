use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use crate::error::{Error, Result};

text_enum! {
    pub enum CustomerStatus {
        Active => "active",
        Inactive => "inactive",
        Pending => "pending",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerContact {
    pub name: String,
    pub position: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub is_primary: bool,
}

/// Input for creating or replacing a customer's details.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub category: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postcode: Option<String>,
    pub country: Option<String>,
    pub website: Option<String>,
    pub notes: Option<String>,
    pub contacts: Vec<CustomerContact>,
}

impl NewCustomer {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("name", "must not be empty"));
        }
        if let Some(contact) = self.contacts.iter().find(|c| !c.email.contains('@')) {
            return Err(Error::validation(
                "contacts",
                format!("`{}` is not an e-mail address", contact.email),
            ));
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct Customer {
    pub id: i32,
    pub name: String,
    pub category: Option<String>,
    pub status: CustomerStatus,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postcode: Option<String>,
    pub country: Option<String>,
    pub website: Option<String>,
    pub notes: Option<String>,
    pub contacts: Json<Vec<CustomerContact>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<i32>,
    pub updated_by: Option<i32>,
}

impl Customer {
    pub fn primary_contact(&self) -> Option<&CustomerContact> {
        self.contacts.iter().find(|c| c.is_primary)
    }
}

/// Keeps exactly one primary contact: the first one flagged, else the first
/// in the list.
pub fn normalize_contacts(contacts: &mut [CustomerContact]) {
    let primary = contacts.iter().position(|c| c.is_primary).unwrap_or(0);
    for (index, contact) in contacts.iter_mut().enumerate() {
        contact.is_primary = index == primary;
    }
}
