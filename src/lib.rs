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

//! ipmi-temp-monitor - temperature-driven fan control over IPMI
//!
//! Polls one BMC temperature sensor through `ipmitool` and switches the
//! server's fans between BMC-automatic control and fixed manual tiers.

pub mod config;
pub mod control;
pub mod error;
pub mod ipmi;
pub mod logger;
pub mod retry;
pub mod sensor;
pub mod supervisor;

pub use config::Config;
pub use control::{decide, ControlLoop, FanAction, TempStatus, TickOutcome};
pub use error::{MonitorError, Result};
pub use ipmi::{CommandRunner, Executor, IpmiCommand, IpmiTool, RawOutput};
pub use retry::RetryPolicy;
pub use sensor::{parse_sensor_reading, read_temperature, TemperatureReading};
pub use supervisor::{Shutdown, Supervisor};
