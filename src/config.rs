use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub data_dir: String,
    pub record_store_url: String,
    pub proctoring_api_url: String,
    pub proctoring_api_key: Option<String>,
    pub proctoring_model: String,
    pub proctoring_timeout_secs: u64,
    pub transmit_timeout_secs: u64,
    pub time_warning_seconds: u64,
    pub report_utc_offset_minutes: i32,
    pub connectivity_probe_secs: u64,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            data_dir: get_env_or("DATA_DIR", "./data"),
            record_store_url: get_env_or("RECORD_STORE_URL", "http://127.0.0.1:8080"),
            proctoring_api_url: get_env_or(
                "PROCTORING_API_URL",
                "https://openrouter.ai/api/v1/chat/completions",
            ),
            proctoring_api_key: env::var("PROCTORING_API_KEY").ok().filter(|k| !k.is_empty()),
            proctoring_model: get_env_or("PROCTORING_MODEL", "deepseek/deepseek-chat-v3.1:free"),
            proctoring_timeout_secs: get_env_parse_or("PROCTORING_TIMEOUT_SECS", 20)?,
            transmit_timeout_secs: get_env_parse_or("TRANSMIT_TIMEOUT_SECS", 15)?,
            time_warning_seconds: get_env_parse_or("TIME_WARNING_SECONDS", 60)?,
            report_utc_offset_minutes: get_env_parse_or("REPORT_UTC_OFFSET_MINUTES", 0)?,
            connectivity_probe_secs: get_env_parse_or("CONNECTIVITY_PROBE_SECS", 10)?,
        })
    }

    /// Fixed offset used to decide where calendar weeks and months begin.
    pub fn report_offset(&self) -> Result<chrono::FixedOffset> {
        chrono::FixedOffset::east_opt(self.report_utc_offset_minutes * 60).ok_or_else(|| {
            Error::Config(format!(
                "REPORT_UTC_OFFSET_MINUTES out of range: {}",
                self.report_utc_offset_minutes
            ))
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}
