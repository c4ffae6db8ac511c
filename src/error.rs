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

//! Unified error handling for ipmi-temp-monitor
//!
//! Every fallible operation in the library returns [`MonitorError`]. None of
//! these errors terminate the daemon once it is running: the control loop logs
//! them and carries on with the next tick. Only configuration and log setup
//! failures are fatal, and those surface before the loop starts.

use std::io;
use std::num::ParseIntError;
use std::path::PathBuf;

/// Result type alias using MonitorError
pub type Result<T> = std::result::Result<T, MonitorError>;

#[derive(thiserror::Error, Debug)]
pub enum MonitorError {
    // ============================================================================
    // Command Execution Errors
    // ============================================================================
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: io::Error,
    },

    #[error("IPMI command {args:?} failed ({status}). Output: {output}")]
    CommandFailed {
        args: Vec<String>,
        status: String,
        output: String,
    },

    #[error("IPMI command {args:?} timed out after {seconds}s")]
    Timeout {
        args: Vec<String>,
        seconds: u64,
    },

    #[error("Failed to run IPMI command {args:?} after {attempts} attempts")]
    RetriesExhausted {
        args: Vec<String>,
        attempts: u32,
    },

    // ============================================================================
    // Sensor Errors
    // ============================================================================
    #[error("Error running IPMI temperature command for {sensor}: {reason}")]
    SensorRead {
        sensor: String,
        reason: String,
    },

    #[error("Temperature reading not found in output: {output}")]
    SensorNotFound {
        output: String,
    },

    #[error("Error parsing temperature {token:?}: {source}")]
    SensorParse {
        token: String,
        source: ParseIntError,
    },

    // ============================================================================
    // Startup Errors
    // ============================================================================
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    #[error("Failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        source: io::Error,
    },
}

impl MonitorError {
    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a sensor read error from anything displayable
    pub fn sensor_read(sensor: impl Into<String>, reason: impl ToString) -> Self {
        Self::SensorRead {
            sensor: sensor.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether retrying the same command could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Spawn { .. } | Self::CommandFailed { .. } | Self::Timeout { .. }
        )
    }
}
