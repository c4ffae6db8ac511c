/*
 * This file is part of ipmi-temp-monitor.
 *
 * Copyright (C) 2025 ipmi-temp-monitor contributors
 *
 * ipmi-temp-monitor is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * ipmi-temp-monitor is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with ipmi-temp-monitor. If not, see <https://www.gnu.org/licenses/>.
 */

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::error::{MonitorError, Result};

pub const DEFAULT_HOST: &str = "192.168.1.100";
pub const DEFAULT_USER: &str = "admin";
pub const DEFAULT_PASSWORD: &str = "password";
pub const DEFAULT_SENSOR: &str = "Ambient Temp";
pub const DEFAULT_MAX_TEMP: i32 = 30;
pub const DEFAULT_WARN_TEMP: i32 = 27;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_LOG_FILE: &str = "/var/log/ipmi-temp-monitor.log";
pub const DEFAULT_IPMITOOL: &str = "ipmitool";
pub const DEFAULT_HIGH_RPM: u32 = 1920;
pub const DEFAULT_LOW_RPM: u32 = 1560;
pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 2;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Nominal RPM -> controller speed code.
pub fn default_fan_speeds() -> BTreeMap<u32, String> {
    BTreeMap::from([
        (1920, "0x07".to_string()),
        (1800, "0x06".to_string()),
        (1680, "0x05".to_string()),
        (1560, "0x04".to_string()),
    ])
}

/// Process-wide settings, resolved once at startup and never mutated.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub sensor: String,
    pub max_temp: i32,
    pub warn_temp: i32,
    pub poll_interval: Duration,
    pub log_file: PathBuf,
    pub ipmitool: String,
    pub fan_speeds: BTreeMap<u32, String>,
    pub high_rpm: u32,
    pub low_rpm: u32,
    pub retries: u32,
    pub retry_delay: Duration,
    pub command_timeout: Duration,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            user: DEFAULT_USER.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            sensor: DEFAULT_SENSOR.to_string(),
            max_temp: DEFAULT_MAX_TEMP,
            warn_temp: DEFAULT_WARN_TEMP,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            ipmitool: DEFAULT_IPMITOOL.to_string(),
            fan_speeds: default_fan_speeds(),
            high_rpm: DEFAULT_HIGH_RPM,
            low_rpm: DEFAULT_LOW_RPM,
            retries: DEFAULT_RETRIES,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            command_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Build and validate a configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build and validate a configuration from an arbitrary key lookup.
    ///
    /// Unset keys take their defaults. Malformed numbers and a malformed
    /// `FANSPEEDS` table fall back to defaults silently; only the semantic
    /// checks in [`Config::validate`] can reject the result.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let int = |key: &str, default: i64| -> i64 {
            lookup(key)
                .and_then(|v| v.trim().parse::<i64>().ok())
                .unwrap_or(default)
        };
        let unsigned = |key: &str, default: u64| -> u64 {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };

        let fan_speeds = lookup("FANSPEEDS")
            .and_then(|raw| parse_fan_speeds(&raw))
            .unwrap_or_else(default_fan_speeds);

        let cfg = Self {
            host: text("IPMIHOST", DEFAULT_HOST),
            user: text("IPMIUSER", DEFAULT_USER),
            password: text("IPMIPW", DEFAULT_PASSWORD),
            sensor: text("SENSOR", DEFAULT_SENSOR),
            max_temp: clamp_i32(int("MAXTEMP", DEFAULT_MAX_TEMP as i64), DEFAULT_MAX_TEMP),
            warn_temp: clamp_i32(int("WARNTEMP", DEFAULT_WARN_TEMP as i64), DEFAULT_WARN_TEMP),
            poll_interval: Duration::from_secs(unsigned("POLLINTERVAL", DEFAULT_POLL_INTERVAL_SECS)),
            log_file: PathBuf::from(text("LOGFILE", DEFAULT_LOG_FILE)),
            ipmitool: text("IPMITOOL", DEFAULT_IPMITOOL),
            fan_speeds,
            high_rpm: clamp_u32(unsigned("FAN_HIGH_RPM", DEFAULT_HIGH_RPM as u64), DEFAULT_HIGH_RPM),
            low_rpm: clamp_u32(unsigned("FAN_LOW_RPM", DEFAULT_LOW_RPM as u64), DEFAULT_LOW_RPM),
            retries: clamp_u32(unsigned("RETRIES", DEFAULT_RETRIES as u64), DEFAULT_RETRIES),
            retry_delay: Duration::from_secs(unsigned("RETRY_DELAY", DEFAULT_RETRY_DELAY_SECS)),
            command_timeout: Duration::from_secs(unsigned("IPMI_TIMEOUT", DEFAULT_TIMEOUT_SECS)),
            log_filter: text("IPMI_LOG", DEFAULT_LOG_FILTER),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(MonitorError::invalid_config("IPMIHOST", "must not be empty"));
        }
        if self.user.trim().is_empty() {
            return Err(MonitorError::invalid_config("IPMIUSER", "must not be empty"));
        }
        if self.sensor.trim().is_empty() {
            return Err(MonitorError::invalid_config("SENSOR", "must not be empty"));
        }
        if self.warn_temp > self.max_temp {
            return Err(MonitorError::invalid_config(
                "WARNTEMP",
                format!("{} exceeds MAXTEMP {}", self.warn_temp, self.max_temp),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(MonitorError::invalid_config("POLLINTERVAL", "must be at least 1 second"));
        }
        if self.retries == 0 {
            return Err(MonitorError::invalid_config("RETRIES", "must be at least 1"));
        }
        if self.command_timeout.is_zero() {
            return Err(MonitorError::invalid_config("IPMI_TIMEOUT", "must be at least 1 second"));
        }
        for (rpm, code) in &self.fan_speeds {
            if !is_speed_code(code) {
                return Err(MonitorError::invalid_config(
                    "FANSPEEDS",
                    format!("code {:?} for {} RPM is not a hex byte like 0x07", code, rpm),
                ));
            }
        }
        if !self.fan_speeds.contains_key(&self.high_rpm) {
            return Err(MonitorError::invalid_config(
                "FAN_HIGH_RPM",
                format!("{} RPM has no entry in FANSPEEDS", self.high_rpm),
            ));
        }
        if !self.fan_speeds.contains_key(&self.low_rpm) {
            return Err(MonitorError::invalid_config(
                "FAN_LOW_RPM",
                format!("{} RPM has no entry in FANSPEEDS", self.low_rpm),
            ));
        }
        Ok(())
    }

    /// Speed code for the tier used when the temperature is in the warning band.
    pub fn high_speed_code(&self) -> &str {
        self.fan_speeds.get(&self.high_rpm).map(String::as_str).unwrap_or_default()
    }

    /// Speed code for the tier used when the temperature is fine.
    pub fn low_speed_code(&self) -> &str {
        self.fan_speeds.get(&self.low_rpm).map(String::as_str).unwrap_or_default()
    }
}

/// Parse a `FANSPEEDS` JSON object such as `{"1920": "0x07", "1560": "0x04"}`.
pub fn parse_fan_speeds(raw: &str) -> Option<BTreeMap<u32, String>> {
    let parsed: BTreeMap<String, String> = serde_json::from_str(raw).ok()?;
    parsed
        .into_iter()
        .map(|(rpm, code)| rpm.trim().parse::<u32>().ok().map(|rpm| (rpm, code.trim().to_string())))
        .collect()
}

fn is_speed_code(s: &str) -> bool {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => !hex.is_empty() && hex.len() <= 2 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

fn clamp_i32(v: i64, default: i32) -> i32 {
    i32::try_from(v).unwrap_or(default)
}

fn clamp_u32(v: u64, default: u32) -> u32 {
    u32::try_from(v).unwrap_or(default)
}
