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

use std::time::Duration;

use tracing::{error, warn};

use crate::config::Config;
use crate::error::{MonitorError, Result};
use crate::ipmi::{CommandRunner, Executor, IpmiCommand};

/// Bounded retry with exponential backoff.
///
/// The first retry waits `initial_delay`, each further one doubles the wait.
/// No sleep follows the final attempt. Only state-setting commands are
/// wrapped, and all of them are idempotent, so repeating one is always safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, initial_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            initial_delay,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.retries, config.retry_delay)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        self.initial_delay.saturating_mul(1u32 << shift)
    }

    /// Run `command` until it succeeds or the attempt budget is spent.
    pub async fn run<R: CommandRunner>(&self, executor: &Executor<R>, command: &IpmiCommand) -> Result<String> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match executor.execute(command).await {
                Ok(output) => return Ok(output),
                Err(e) => e,
            };

            if !err.is_transient() {
                error!("IPMI command {} failed permanently: {}", command, err);
                return Err(err);
            }
            if attempt >= self.attempts {
                break;
            }

            let delay = self.delay_after(attempt);
            warn!(
                "Attempt {}/{}: Error running IPMI command {}: {} (retrying in {:?})",
                attempt, self.attempts, command, err, delay
            );
            tokio::time::sleep(delay).await;
        }

        error!("IPMI command {} failed after {} attempts", command, self.attempts);
        Err(MonitorError::RetriesExhausted {
            args: command.args(),
            attempts: self.attempts,
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}
