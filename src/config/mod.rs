use dotenvy::dotenv;
use serde::Deserialize;

use crate::error::{Error, Result};

fn default_max_connections() -> u32 {
    5
}

/// Configuration for the application
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Database connection URL
    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub db_max_connections: u32,

    pub smtp_server: Option<String>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    /// Sender address on outgoing invoices.
    pub smtp_from: Option<String>,

    /// Tracing filter directives, e.g. `fleet_manager=debug`.
    pub fleet_log: Option<String>,
}

/// Everything needed to open an SMTP relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub server: String,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Variables from a `.env` file are loaded first when one exists.
    pub fn load() -> Result<Self> {
        dotenv().ok();
        Self::from_iter(std::env::vars())
    }

    /// Deserializes configuration from explicit key/value pairs.
    pub fn from_iter(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        envy::from_iter::<_, Config>(vars).map_err(|err| Error::Config(err.to_string()))
    }

    /// Get a direct reference to the database URL
    pub fn database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| Error::Config("DATABASE_URL is not set".into()))
    }

    /// SMTP settings, present only when all four keys are set.
    pub fn smtp(&self) -> Option<SmtpSettings> {
        Some(SmtpSettings {
            server: self.smtp_server.clone()?,
            username: self.smtp_username.clone()?,
            password: self.smtp_password.clone()?,
            from: self.smtp_from.clone()?,
        })
    }
}

/// Initialize environment variables and load configuration
pub fn init() -> Result<Config> {
    Config::load()
}
