use std::env;
use anyhow::{Context, Result};

/// Markers treated as "no fixed Moodle URL configured".
const UNSET_MARKERS: [&str; 2] = ["", "*"];

#[derive(Debug, Clone)]
pub struct Config {
    pub moodle_url: Option<String>,
    pub endpoints_file: String,
    pub service_port: u16,
    pub service_host: String,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let moodle_url = env::var("MOODLE_URL")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !UNSET_MARKERS.contains(&v.as_str()));

        let endpoints_file =
            env::var("ENDPOINTS_FILE").unwrap_or_else(|_| "endpoints.json".to_string());

        let service_port = env::var("SERVICE_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("SERVICE_PORT must be a valid port number (0-65535)")?;

        let service_host = env::var("SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        let request_timeout_secs = env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u64>()
            .context("REQUEST_TIMEOUT_SECS must be a number of seconds")?;

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Config {
            moodle_url,
            endpoints_file,
            service_port,
            service_host,
            allowed_origins,
            request_timeout_secs,
            log_level,
        })
    }

    pub fn log_startup(&self) {
        tracing::info!("Configuration loaded:");
        tracing::info!(
            "  Moodle URL: {}",
            self.moodle_url
                .as_deref()
                .unwrap_or("not configured (clients must pass moodle_url per request)")
        );
        tracing::info!("  Endpoints file: {}", self.endpoints_file);
        tracing::info!("  Allowed origins: {}", self.allowed_origins.join(", "));
        tracing::info!("  Outbound timeout: {}s", self.request_timeout_secs);
        tracing::info!(
            "  Service listening on: {}:{}",
            self.service_host,
            self.service_port
        );
    }
}
