//! Settings for the optional admin-alert notifier, kept separate from
//! `ev_core::config::StationConfig` since these are secrets (SMTP
//! credentials) layered from the environment over the TOML file, the way
//! the teacher's `EmailSettings` are populated and never committed to a
//! config file in an example.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_address: String,
    pub use_tls: bool,
    pub admin_recipients: Vec<String>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: 587,
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_address: "station@example.invalid".to_owned(),
            use_tls: true,
            admin_recipients: Vec::new(),
        }
    }
}

impl AlertConfig {
    /// Layers SMTP credentials from the environment over whatever the TOML
    /// file provided, so they never need to live in the config file itself.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(host) = std::env::var("EV_SMTP_HOST") {
            self.smtp_host = host;
        }
        if let Ok(port) = std::env::var("EV_SMTP_PORT")
            && let Ok(port) = port.parse()
        {
            self.smtp_port = port;
        }
        if let Ok(user) = std::env::var("EV_SMTP_USERNAME") {
            self.smtp_username = user;
        }
        if let Ok(pass) = std::env::var("EV_SMTP_PASSWORD") {
            self.smtp_password = pass;
        }
        if let Ok(from) = std::env::var("EV_SMTP_FROM") {
            self.from_address = from;
        }
        self
    }
}
