#![allow(dead_code)]

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use fleet_manager::Fleet;
use fleet_manager::email::{Mailer, MemoryMailer};
use fleet_manager::models::{
    BillingItemType, Customer, CustomerContact, Job, NewBillingItem, NewCustomer, NewJob,
    NewUser, Role, User,
};
use fleet_manager::store::memory::MemoryStore;

/// A fleet over the in-memory store with a small staff already on the books.
pub struct Harness {
    pub fleet: Fleet,
    pub mailer: Arc<MemoryMailer>,
    pub admin: User,
    pub dispatcher: User,
    pub alice: User,
    pub bob: User,
    pub carol: User,
}

pub async fn harness() -> Harness {
    let mailer = Arc::new(MemoryMailer::new());
    let fleet = Fleet::new(
        Arc::new(MemoryStore::new()),
        mailer.clone() as Arc<dyn Mailer>,
    );

    let admin = fleet
        .users
        .bootstrap(new_user("admin@fleet.test", "Ada Admin", Role::SuperAdmin))
        .await
        .unwrap();
    let dispatcher = fleet
        .users
        .create_user(&admin, new_user("desk@fleet.test", "Dee Dispatch", Role::SystemUser))
        .await
        .unwrap();
    let alice = fleet
        .users
        .create_user(&admin, new_user("alice@fleet.test", "Alice Driver", Role::Driver))
        .await
        .unwrap();
    let bob = fleet
        .users
        .create_user(&admin, new_user("bob@fleet.test", "Bob Driver", Role::Driver))
        .await
        .unwrap();
    let carol = fleet
        .users
        .create_user(&admin, new_user("carol@fleet.test", "Carol Contractor", Role::Contractor))
        .await
        .unwrap();

    Harness {
        fleet,
        mailer,
        admin,
        dispatcher,
        alice,
        bob,
        carol,
    }
}

pub fn new_user(email: &str, name: &str, role: Role) -> NewUser {
    NewUser {
        email: email.to_string(),
        name: name.to_string(),
        phone: None,
        role,
        license_number: None,
    }
}

pub fn new_job(registration: &str) -> NewJob {
    NewJob {
        registration: Some(registration.to_string()),
        make: Some("Ford".to_string()),
        model: Some("Transit".to_string()),
        collection_address: "1 Dock Road, Belfast".to_string(),
        delivery_address: "9 Quay Street, Derry".to_string(),
        ..NewJob::default()
    }
}

pub fn new_item(job_id: i32, description: &str, quantity: f64, unit_price: f64, is_chargeable: bool) -> NewBillingItem {
    NewBillingItem {
        job_id,
        item_type: BillingItemType::Charge,
        description: description.to_string(),
        quantity,
        unit_price,
        is_chargeable,
        category: "transport".to_string(),
        date: Utc::now().date_naive(),
        receipt_url: None,
        notes: None,
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

impl Harness {
    pub async fn customer(&self, name: &str) -> Customer {
        self.fleet
            .customers
            .create(
                &self.admin,
                NewCustomer {
                    name: name.to_string(),
                    category: Some("dealer".to_string()),
                    address: Some("12 Main Street".to_string()),
                    city: Some("Belfast".to_string()),
                    postcode: Some("BT1 1AA".to_string()),
                    country: Some("Northern Ireland".to_string()),
                    website: None,
                    notes: None,
                    contacts: vec![CustomerContact {
                        name: "Accounts".to_string(),
                        position: None,
                        email: "accounts@dealer.test".to_string(),
                        phone: Some("028 9000 0000".to_string()),
                        is_primary: true,
                    }],
                },
            )
            .await
            .unwrap()
    }

    pub async fn job(&self, registration: &str) -> Job {
        self.fleet
            .jobs
            .create_job(&self.dispatcher, new_job(registration))
            .await
            .unwrap()
    }

    pub async fn job_for(&self, customer: &Customer, registration: &str) -> Job {
        let new = NewJob {
            customer_id: Some(customer.id),
            ..new_job(registration)
        };
        self.fleet.jobs.create_job(&self.dispatcher, new).await.unwrap()
    }

    /// A job allocated to `driver` with collection under way.
    pub async fn collected_job(&self, registration: &str, driver: &User) -> Job {
        let job = self.job(registration).await;
        self.fleet
            .jobs
            .allocate(&self.dispatcher, job.id, driver.id)
            .await
            .unwrap();
        self.fleet.jobs.start_collection(driver, job.id).await.unwrap()
    }
}
