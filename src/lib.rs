//! Back office for a vehicle transport fleet: jobs and their collection and
//! delivery legs, driver handovers, billing and invoices, leave, users and
//! customers, with every change written to an audit log.

pub mod models;

pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod services;
pub mod statement;
pub mod store;

pub use error::{Error, Result};
pub use services::Fleet;
