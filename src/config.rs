use crate::timekey::Zone;
use chrono::FixedOffset;
use std::{env, time::Duration};
use thiserror::Error;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_SOURCE_URL: &str = "http://localhost:8000/api";
const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid {name}: '{value}'")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub source_url: String,
    pub source_timeout: Duration,
    pub zone: Zone,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = match lookup("PORT") {
            Some(value) => value.trim().parse().map_err(|_| invalid("PORT", value))?,
            None => DEFAULT_PORT,
        };

        let source_url = lookup("CLICK_SOURCE_URL").unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string());

        let source_timeout = match lookup("CLICK_SOURCE_TIMEOUT_SECS") {
            Some(value) => value
                .trim()
                .parse()
                .map(Duration::from_secs)
                .map_err(|_| invalid("CLICK_SOURCE_TIMEOUT_SECS", value))?,
            None => Duration::from_secs(DEFAULT_SOURCE_TIMEOUT_SECS),
        };

        // Unset means the host's local zone.
        let zone = match lookup("LINK_STATS_UTC_OFFSET") {
            Some(value) => parse_offset(&value)
                .map(Zone::Fixed)
                .ok_or_else(|| invalid("LINK_STATS_UTC_OFFSET", value))?,
            None => Zone::Local,
        };

        Ok(Self {
            port,
            source_url,
            source_timeout,
            zone,
        })
    }
}

fn invalid(name: &'static str, value: String) -> ConfigError {
    ConfigError { name, value }
}

/// `±HH:MM` / `±HHMM` as chrono parses `%z`, plus `Z`, `UTC` and bare `±HH`.
pub fn parse_offset(value: &str) -> Option<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }
    if value.len() == 3 && value.is_char_boundary(1) && value[1..].bytes().all(|b| b.is_ascii_digit()) {
        return format!("{value}:00").parse().ok();
    }
    value.parse().ok()
}
