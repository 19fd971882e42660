use std::env;
use std::net::SocketAddr;

use crate::error::AppError;

pub const DEFAULT_ROBLE_BASE_URL: &str = "https://roble-api.openlab.uninorte.edu.co";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://course_groups.db?mode=rwc";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub roble_base_url: String,
    pub project_id: String,
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub compensate_on_failure: bool,
}

impl AppConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let project_id = lookup("ROBLE_PROJECT_ID")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| AppError::Config("ROBLE_PROJECT_ID is not set".to_string()))?;
        let roble_base_url = lookup("ROBLE_BASE_URL").unwrap_or_else(|| DEFAULT_ROBLE_BASE_URL.to_string());
        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let raw_addr = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr
            .parse::<SocketAddr>()
            .map_err(|e| AppError::Config(format!("BIND_ADDR '{}' is invalid: {}", raw_addr, e)))?;

        let compensate_on_failure = match lookup("ROBLE_COMPENSATE") {
            None => true,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(AppError::Config(format!("ROBLE_COMPENSATE '{}' is not a boolean", raw))),
            },
        };

        Ok(Self {
            roble_base_url,
            project_id,
            database_url,
            bind_addr,
            compensate_on_failure,
        })
    }
}
