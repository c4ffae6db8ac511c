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

//! IPMI command surface
//!
//! Everything that talks to the BMC goes through [`CommandRunner`], a narrow
//! async seam that takes the command part of an `ipmitool` argument vector
//! and returns the exit status plus the combined output. [`IpmiTool`] is the
//! real implementation; tests substitute scripted runners.
//!
//! [`Executor`] sits on top of the runner, classifies each result and logs
//! every invocation regardless of outcome.

use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{MonitorError, Result};

/// Response code the BMC returns for some raw fan commands that still apply.
pub const BENIGN_RESPONSE_CODE: &str = "rsp=0xcc";
/// Message that accompanies [`BENIGN_RESPONSE_CODE`].
pub const BENIGN_RESPONSE_MESSAGE: &str = "Invalid data field in request";

/// The fixed command vocabulary sent to the BMC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpmiCommand {
    /// `sdr get <sensor>`
    SensorGet(String),
    /// Hand fan control back to the BMC.
    FanAuto,
    /// Take manual control of the fans.
    FanManual,
    /// Set all fans to a device-specific speed code.
    FanSpeed(String),
}

impl IpmiCommand {
    pub fn args(&self) -> Vec<String> {
        let words: &[&str] = match self {
            IpmiCommand::SensorGet(_) => &["sdr", "get"],
            IpmiCommand::FanAuto => &["raw", "0x30", "0x30", "0x01", "0x01"],
            IpmiCommand::FanManual => &["raw", "0x30", "0x30", "0x01", "0x00"],
            IpmiCommand::FanSpeed(_) => &["raw", "0x30", "0x30", "0x02", "0xff"],
        };
        let mut args: Vec<String> = words.iter().map(|s| s.to_string()).collect();
        match self {
            IpmiCommand::SensorGet(sensor) => args.push(sensor.clone()),
            IpmiCommand::FanSpeed(code) => args.push(code.clone()),
            IpmiCommand::FanAuto | IpmiCommand::FanManual => {}
        }
        args
    }
}

impl fmt::Display for IpmiCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpmiCommand::SensorGet(sensor) => write!(f, "sensor-get({})", sensor),
            IpmiCommand::FanAuto => write!(f, "fan-auto"),
            IpmiCommand::FanManual => write!(f, "fan-manual"),
            IpmiCommand::FanSpeed(code) => write!(f, "fan-speed({})", code),
        }
    }
}

/// What came back from one client invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// stdout followed by stderr.
    pub output: String,
}

impl RawOutput {
    pub fn new(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            output: output.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    fn status_text(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit status: {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Executes one command against the BMC.
///
/// `Err` means the client could not be run at all (missing binary, timeout);
/// a client that ran and failed is an `Ok` with a non-zero exit code.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, args: &[String]) -> Result<RawOutput>;
}

#[async_trait]
impl<R: CommandRunner + ?Sized> CommandRunner for Arc<R> {
    async fn run(&self, args: &[String]) -> Result<RawOutput> {
        (**self).run(args).await
    }
}

/// `ipmitool -I lanplus` against a single BMC.
#[derive(Clone)]
pub struct IpmiTool {
    program: String,
    host: String,
    user: String,
    password: String,
    timeout: Duration,
}

impl fmt::Debug for IpmiTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpmiTool")
            .field("program", &self.program)
            .field("host", &self.host)
            .field("user", &self.user)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl IpmiTool {
    pub fn new(config: &Config) -> Self {
        Self {
            program: config.ipmitool.clone(),
            host: config.host.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
            timeout: config.command_timeout,
        }
    }

    /// Full argument vector including the connection parameters.
    pub fn full_args(&self, args: &[String]) -> Vec<String> {
        let mut full = vec![
            "-I".to_string(),
            "lanplus".to_string(),
            "-H".to_string(),
            self.host.clone(),
            "-U".to_string(),
            self.user.clone(),
            "-P".to_string(),
            self.password.clone(),
        ];
        full.extend(args.iter().cloned());
        full
    }
}

#[async_trait]
impl CommandRunner for IpmiTool {
    async fn run(&self, args: &[String]) -> Result<RawOutput> {
        let child = Command::new(&self.program)
            .args(self.full_args(args))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let out = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(out)) => out,
            Ok(Err(source)) => {
                return Err(MonitorError::Spawn {
                    program: self.program.clone(),
                    source,
                })
            }
            Err(_) => {
                return Err(MonitorError::Timeout {
                    args: args.to_vec(),
                    seconds: self.timeout.as_secs(),
                })
            }
        };

        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&out.stderr));
        Ok(RawOutput {
            exit_code: out.status.code(),
            output,
        })
    }
}

/// How a finished invocation is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Non-zero exit carrying the BMC's harmless `rsp=0xcc` response.
    Benign,
    Failed,
}

/// Classify a finished invocation.
///
/// Some BMC firmware answers certain raw fan commands with
/// `rsp=0xcc Invalid data field in request` even though the setting applied.
/// Both fragments must be present; nothing else is treated as benign.
pub fn classify(raw: &RawOutput) -> Outcome {
    if raw.success() {
        Outcome::Success
    } else if raw.output.contains(BENIGN_RESPONSE_CODE) && raw.output.contains(BENIGN_RESPONSE_MESSAGE) {
        Outcome::Benign
    } else {
        Outcome::Failed
    }
}

/// Runs commands and turns raw results into `Ok(output)` or an error.
pub struct Executor<R> {
    runner: R,
}

impl<R: CommandRunner> Executor<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Run `command` once. Benign responses count as success.
    pub async fn execute(&self, command: &IpmiCommand) -> Result<String> {
        let args = command.args();
        let raw = match self.runner.run(&args).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Error running IPMI command {:?}: {}", args, e);
                return Err(e);
            }
        };

        match classify(&raw) {
            Outcome::Success => {
                info!("IPMI command {:?} successful. Output: {}", args, raw.output.trim_end());
                Ok(raw.output)
            }
            Outcome::Benign => {
                info!(
                    "IPMI command {:?} executed with a minor error ({}), continuing. Output: {}",
                    args,
                    BENIGN_RESPONSE_CODE,
                    raw.output.trim_end()
                );
                Ok(raw.output)
            }
            Outcome::Failed => {
                warn!(
                    "Error running IPMI command {:?}: {}. Output: {}",
                    args,
                    raw.status_text(),
                    raw.output.trim_end()
                );
                Err(MonitorError::CommandFailed {
                    status: raw.status_text(),
                    args,
                    output: raw.output,
                })
            }
        }
    }
}
