use std::net::SocketAddr;
use std::path::PathBuf;

use http_adapter::DEFAULT_BASE_URL;

use crate::web::session::CookiePolicy;

lazy_static::lazy_static! {
    pub static ref PROJECT_NAME: String = String::from("Forseer").to_uppercase();
    pub static ref DATA_FOLDER_ENV: String = format!("{}_DATA", PROJECT_NAME.clone());
}

const DEFAULT_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_SESSION_HOURS: u64 = 72;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub key: String,
    pub value: String,
    pub reason: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Invalid value {:?} for {}: {}",
            self.value, self.key, self.reason
        )
    }
}

impl std::error::Error for ConfigError {}

/// Settings of the web client, read from `FORSEER_*` environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_url: String,
    pub addr: SocketAddr,
    pub secure_cookies: bool,
    pub session_hours: u64,
    pub demo: bool,
    pub static_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    /// # Errors
    /// - `ConfigError` naming the first variable that does not parse
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// # Errors
    /// - `ConfigError` naming the first variable that does not parse
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| {
            let key = format!("{}_{name}", PROJECT_NAME.as_str());
            let value = lookup(&key).filter(|value| !value.trim().is_empty());
            (key, value)
        };

        let api_url = var("API_URL")
            .1
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let addr: SocketAddr = match var("ADDR") {
            (key, Some(value)) => value
                .trim()
                .parse::<SocketAddr>()
                .map_err(|e| invalid(&key, &value, e))?,
            (_, None) => DEFAULT_ADDR
                .parse::<SocketAddr>()
                .map_err(|e| invalid("default address", DEFAULT_ADDR, e))?,
        };

        let secure_cookies = match var("SECURE_COOKIES") {
            (key, Some(value)) => parse_flag(&key, &value)?,
            (_, None) => true,
        };

        let session_hours = match var("SESSION_HOURS") {
            (key, Some(value)) => match value.trim().parse::<u64>() {
                Ok(0) => return Err(invalid(&key, &value, "must be at least 1")),
                Ok(hours) if hours.checked_mul(60 * 60).is_none() => {
                    return Err(invalid(&key, &value, "too large"));
                }
                Ok(hours) => hours,
                Err(e) => return Err(invalid(&key, &value, e)),
            },
            (_, None) => DEFAULT_SESSION_HOURS,
        };

        let demo = match var("DEMO") {
            (key, Some(value)) => parse_flag(&key, &value)?,
            (_, None) => false,
        };

        let static_dir = var("STATIC_DIR").1.map_or_else(
            || PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/static")),
            PathBuf::from,
        );

        Ok(Self {
            api_url,
            addr,
            secure_cookies,
            session_hours,
            demo,
            static_dir,
            data_dir: get_data_dir(&lookup),
        })
    }

    #[must_use]
    pub fn cookie_policy(&self) -> CookiePolicy {
        CookiePolicy {
            secure: self.secure_cookies,
            max_age_secs: self.session_hours.saturating_mul(60 * 60),
        }
    }
}

fn invalid(key: &str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value, "expected true or false")),
    }
}

/// Get the data directory for the application
pub fn get_data_dir(lookup: &impl Fn(&str) -> Option<String>) -> PathBuf {
    let project_name = PROJECT_NAME.clone().to_lowercase();

    if let Some(data_dir) = lookup(DATA_FOLDER_ENV.as_str()) {
        PathBuf::from(data_dir)
    } else if let Some(data_dir) = lookup("XDG_DATA_HOME") {
        PathBuf::from(data_dir).join(&project_name)
    } else if let Some(home_dir) = lookup("HOME") {
        PathBuf::from(home_dir)
            .join(".local")
            .join("share")
            .join(&project_name)
    } else {
        // Fallback to current directory if no home directory is found
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(&project_name)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("HOME", "/home/ada")]).unwrap();
        assert_eq!(config.api_url, "http://localhost:8080/v1");
        assert_eq!(config.addr, "127.0.0.1:3000".parse().unwrap());
        assert!(config.secure_cookies);
        assert!(!config.demo);
        assert_eq!(config.cookie_policy().max_age_secs, 72 * 3600);
        assert_eq!(
            config.data_dir,
            PathBuf::from("/home/ada/.local/share/forseer")
        );
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("FORSEER_API_URL", "https://api.forseer.dev/v1"),
            ("FORSEER_ADDR", "0.0.0.0:8000"),
            ("FORSEER_SECURE_COOKIES", "false"),
            ("FORSEER_SESSION_HOURS", "1"),
            ("FORSEER_DEMO", "yes"),
            ("FORSEER_DATA", "/var/lib/forseer"),
            ("XDG_DATA_HOME", "/xdg"),
        ])
        .unwrap();
        assert_eq!(config.api_url, "https://api.forseer.dev/v1");
        assert_eq!(config.addr.port(), 8000);
        assert!(!config.secure_cookies);
        assert!(config.demo);
        assert_eq!(config.cookie_policy().max_age_secs, 3600);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/forseer"));
    }

    #[test]
    fn test_invalid_values() {
        let error = config_from(&[("FORSEER_ADDR", "localhost")]).unwrap_err();
        assert_eq!(error.key, "FORSEER_ADDR");

        let error = config_from(&[("FORSEER_SECURE_COOKIES", "maybe")]).unwrap_err();
        assert_eq!(error.reason, "expected true or false");

        assert!(config_from(&[("FORSEER_SESSION_HOURS", "0")]).is_err());
        assert!(config_from(&[("FORSEER_SESSION_HOURS", "-3")]).is_err());

        let error = config_from(&[("FORSEER_SESSION_HOURS", "18446744073709551615")]).unwrap_err();
        assert_eq!(error.key, "FORSEER_SESSION_HOURS");
        assert_eq!(error.reason, "too large");
    }
}
