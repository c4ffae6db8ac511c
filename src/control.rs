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

//! Fan Control Loop
//!
//! One tick = read the sensor, pick an action from the two thresholds, issue
//! the action's commands, sleep for the poll interval.
//!
//! # Behavior
//! - **Always command, never diff**: the fan mode and speed are re-sent on
//!   every tick, even when nothing changed. No fan state is remembered between
//!   ticks, so a BMC that drifted (reset, manual ipmitool use) is put back on
//!   the next poll.
//! - **No action on bad data**: a failed read skips the whole action step.
//! - **Graceful degradation**: a command that exhausts its retries is logged
//!   and the tick continues; nothing here ends the loop except shutdown.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::ipmi::{CommandRunner, Executor, IpmiCommand};
use crate::retry::RetryPolicy;
use crate::sensor::{read_temperature, TemperatureReading};
use crate::supervisor::Shutdown;

/// Threshold band a reading falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempStatus {
    /// `reading <= warn`
    Ok,
    /// `warn < reading <= max`
    Warn,
    /// `reading > max`
    Bad,
}

impl fmt::Display for TempStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TempStatus::Ok => write!(f, "OK"),
            TempStatus::Warn => write!(f, "WARN"),
            TempStatus::Bad => write!(f, "BAD"),
        }
    }
}

/// What to do about one reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanAction {
    /// Hand control back to the BMC.
    Auto,
    /// Take manual control and pin the fans to `speed_code`.
    Manual { rpm: u32, speed_code: String },
}

impl FanAction {
    /// Commands to issue, in order. Mode is always set before speed.
    pub fn commands(&self) -> Vec<IpmiCommand> {
        match self {
            FanAction::Auto => vec![IpmiCommand::FanAuto],
            FanAction::Manual { speed_code, .. } => vec![
                IpmiCommand::FanManual,
                IpmiCommand::FanSpeed(speed_code.clone()),
            ],
        }
    }
}

/// Decision for one reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub status: TempStatus,
    pub action: FanAction,
}

pub fn classify_temperature(celsius: i32, warn_temp: i32, max_temp: i32) -> TempStatus {
    if celsius > max_temp {
        TempStatus::Bad
    } else if celsius > warn_temp {
        TempStatus::Warn
    } else {
        TempStatus::Ok
    }
}

/// Map a reading to an action using the configured thresholds and tiers.
pub fn decide(celsius: i32, config: &Config) -> Decision {
    let status = classify_temperature(celsius, config.warn_temp, config.max_temp);
    let action = match status {
        TempStatus::Bad => FanAction::Auto,
        TempStatus::Warn => FanAction::Manual {
            rpm: config.high_rpm,
            speed_code: config.high_speed_code().to_string(),
        },
        TempStatus::Ok => FanAction::Manual {
            rpm: config.low_rpm,
            speed_code: config.low_speed_code().to_string(),
        },
    };
    Decision { status, action }
}

/// Result of one tick, for callers that want to observe the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The sensor could not be read; no command was issued.
    ReadFailed,
    /// A decision was made and its commands were issued.
    Acted {
        reading: TemperatureReading,
        decision: Decision,
        /// Commands that exhausted their retries.
        failed_commands: usize,
    },
}

pub struct ControlLoop<R> {
    config: Arc<Config>,
    executor: Executor<R>,
    retry: RetryPolicy,
    shutdown: Shutdown,
}

impl<R: CommandRunner> ControlLoop<R> {
    pub fn new(config: Arc<Config>, runner: R, shutdown: Shutdown) -> Self {
        let retry = RetryPolicy::from_config(&config);
        Self {
            config,
            executor: Executor::new(runner),
            retry,
            shutdown,
        }
    }

    /// Poll until shutdown is requested.
    pub async fn run(&self) {
        info!(
            "Monitoring {} every {:?} (warn > {}°C, max > {}°C)",
            self.config.sensor, self.config.poll_interval, self.config.warn_temp, self.config.max_temp
        );

        while !self.shutdown.is_triggered() {
            self.tick().await;

            if self.shutdown.sleep(self.config.poll_interval).await {
                break;
            }
        }

        info!("Fan control loop stopped");
    }

    /// One read-decide-act pass. Never sleeps for the poll interval itself.
    pub async fn tick(&self) -> TickOutcome {
        let reading = match read_temperature(&self.executor, &self.config.sensor).await {
            Ok(reading) => reading,
            Err(e) => {
                error!("Error getting temperature: {}", e);
                return TickOutcome::ReadFailed;
            }
        };

        info!("Current temperature ({}): {}°C", reading.sensor, reading.celsius);

        let decision = decide(reading.celsius, &self.config);
        match &decision.action {
            FanAction::Auto => info!(
                "Temperature is {} ({}°C). Setting fans to auto.",
                decision.status, reading.celsius
            ),
            FanAction::Manual { rpm, speed_code } => info!(
                "Temperature is {} ({}°C). Setting fans to manual at {} RPM ({}).",
                decision.status, reading.celsius, rpm, speed_code
            ),
        }

        // Mode and speed are independent retried operations: a failed mode
        // switch does not stop the speed command.
        let mut failed_commands = 0;
        for command in decision.action.commands() {
            if let Err(e) = self.retry.run(&self.executor, &command).await {
                warn!("Giving up on {} until next tick: {}", command, e);
                failed_commands += 1;
            }
        }

        TickOutcome::Acted {
            reading,
            decision,
            failed_commands,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipmi::{MockCommandRunner, RawOutput};
    use std::sync::Mutex;
    use std::time::Duration;

    fn sdr(celsius: i32) -> String {
        format!(" Sensor ID : Ambient Temp (0xe)\n Sensor Reading : {} (+/- 0) degrees C\n", celsius)
    }

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
            max_temp: 30,
            warn_temp: 27,
            retry_delay: Duration::from_millis(10),
            ..Config::default()
        })
    }

    /// Mock that answers `sdr get` with `celsius` and records everything else.
    fn recording_runner(celsius: i32, fan_exit: i32, log: Arc<Mutex<Vec<Vec<String>>>>) -> MockCommandRunner {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(move |args| {
            if args.first().map(String::as_str) == Some("sdr") {
                return Ok(RawOutput::new(0, sdr(celsius)));
            }
            log.lock().unwrap().push(args.to_vec());
            Ok(RawOutput::new(fan_exit, "rsp=0xc3 timeout"))
        });
        runner
    }

    #[test]
    fn test_threshold_precedence() {
        assert_eq!(classify_temperature(31, 27, 30), TempStatus::Bad);
        assert_eq!(classify_temperature(30, 27, 30), TempStatus::Warn);
        assert_eq!(classify_temperature(28, 27, 30), TempStatus::Warn);
        assert_eq!(classify_temperature(27, 27, 30), TempStatus::Ok);
        assert_eq!(classify_temperature(-10, 27, 30), TempStatus::Ok);
        // warn == max leaves no warning band
        assert_eq!(classify_temperature(30, 30, 30), TempStatus::Ok);
        assert_eq!(classify_temperature(31, 30, 30), TempStatus::Bad);
    }

    #[test]
    fn test_decide_maps_tiers() {
        let cfg = test_config();
        assert_eq!(decide(32, &cfg).action, FanAction::Auto);
        assert_eq!(
            decide(28, &cfg).action,
            FanAction::Manual { rpm: 1920, speed_code: "0x07".into() }
        );
        assert_eq!(
            decide(20, &cfg).action,
            FanAction::Manual { rpm: 1560, speed_code: "0x04".into() }
        );
    }

    #[test]
    fn test_action_commands_order() {
        assert_eq!(FanAction::Auto.commands(), vec![IpmiCommand::FanAuto]);
        let manual = FanAction::Manual { rpm: 1560, speed_code: "0x04".into() };
        assert_eq!(
            manual.commands(),
            vec![IpmiCommand::FanManual, IpmiCommand::FanSpeed("0x04".into())]
        );
    }

    #[test]
    fn test_every_reading_maps_to_expected_commands() {
        let cfg = test_config();
        for celsius in -20..=60 {
            let commands = decide(celsius, &cfg).action.commands();
            if celsius > cfg.max_temp {
                assert_eq!(commands, vec![IpmiCommand::FanAuto], "reading {}", celsius);
            } else if celsius > cfg.warn_temp {
                assert_eq!(
                    commands,
                    vec![IpmiCommand::FanManual, IpmiCommand::FanSpeed("0x07".into())],
                    "reading {}",
                    celsius
                );
            } else {
                assert_eq!(
                    commands,
                    vec![IpmiCommand::FanManual, IpmiCommand::FanSpeed("0x04".into())],
                    "reading {}",
                    celsius
                );
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_warn_sets_manual_then_high() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let lp = ControlLoop::new(test_config(), recording_runner(28, 0, log.clone()), Shutdown::new());

        let outcome = lp.tick().await;

        assert!(matches!(outcome, TickOutcome::Acted { failed_commands: 0, .. }));
        assert_eq!(
            *log.lock().unwrap(),
            vec![IpmiCommand::FanManual.args(), IpmiCommand::FanSpeed("0x07".into()).args()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_failed_mode_switch_still_sends_speed() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let lp = ControlLoop::new(test_config(), recording_runner(20, 1, log.clone()), Shutdown::new());

        let outcome = lp.tick().await;

        assert!(matches!(outcome, TickOutcome::Acted { failed_commands: 2, .. }));
        let log = log.lock().unwrap();
        // three attempts each, mode first
        assert_eq!(log.len(), 6);
        assert!(log[..3].iter().all(|a| *a == IpmiCommand::FanManual.args()));
        assert!(log[3..].iter().all(|a| *a == IpmiCommand::FanSpeed("0x04".into()).args()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_read_failure_issues_nothing() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|args| args.first().map(String::as_str) == Some("sdr"))
            .times(1)
            .returning(|_| Ok(RawOutput::new(0, " Sensor ID : Ambient Temp (0xe)\n")));

        let lp = ControlLoop::new(test_config(), runner, Shutdown::new());
        assert_eq!(lp.tick().await, TickOutcome::ReadFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_returns_after_shutdown() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Shutdown::new();
        let lp = ControlLoop::new(test_config(), recording_runner(20, 0, log.clone()), shutdown.clone());

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(150)).await;
            trigger.trigger();
        });
        lp.run().await;

        // ticks at 0s, 60s and 120s; shutdown lands during the third sleep
        assert_eq!(log.lock().unwrap().len(), 6);
    }
}
