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

//! ipmi-temp-monitor daemon
//!
//! Reads its configuration from the environment, logs to stdout and an
//! append-only file, and supervises the fan control loop until SIGINT/SIGTERM.

use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{info, warn};

use ipmi_temp_monitor::control::TickOutcome;
use ipmi_temp_monitor::logger::{init_logging, install_panic_hook};
use ipmi_temp_monitor::{Config, ControlLoop, IpmiTool, Shutdown, Supervisor};

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// CLI
// ============================================================================

fn print_help() {
    eprintln!("ipmi-temp-monitor {} - temperature-driven IPMI fan control", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    ipmi-temp-monitor [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("        --once          Run a single poll, then exit");
    eprintln!("    -v, --version       Print version");
    eprintln!("    -h, --help          Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    IPMIHOST, IPMIUSER, IPMIPW   BMC address and credentials");
    eprintln!("    SENSOR                       Sensor to poll (default: Ambient Temp)");
    eprintln!("    MAXTEMP, WARNTEMP            Thresholds in °C (default: 30, 27)");
    eprintln!("    POLLINTERVAL                 Seconds between polls (default: 60)");
    eprintln!("    FANSPEEDS                    JSON RPM -> speed code table");
    eprintln!("    FAN_HIGH_RPM, FAN_LOW_RPM    Tiers for WARN and OK (default: 1920, 1560)");
    eprintln!("    RETRIES, RETRY_DELAY         Attempts per command and first backoff in seconds");
    eprintln!("    IPMI_TIMEOUT                 Seconds before an ipmitool call is killed");
    eprintln!("    IPMITOOL                     Client binary (default: ipmitool)");
    eprintln!("    LOGFILE                      Log file (default: /var/log/ipmi-temp-monitor.log)");
    eprintln!("    IPMI_LOG                     Log level (trace, debug, info, warn, error)");
}

enum Mode {
    Daemon,
    Once,
}

fn parse_args() -> Mode {
    let mut mode = Mode::Daemon;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                println!("ipmi-temp-monitor {}", VERSION);
                std::process::exit(0);
            }
            "--once" => mode = Mode::Once,
            other => {
                eprintln!("Unknown argument: {}", other);
                print_help();
                std::process::exit(1);
            }
        }
    }
    mode
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mode = parse_args();

    let config = Arc::new(Config::from_env().context("invalid configuration")?);
    init_logging(&config.log_file, &config.log_filter).context("logging setup failed")?;
    install_panic_hook();

    info!("STARTUP: ipmi-temp-monitor {} starting", VERSION);
    info!(
        "STARTUP: configuration {}",
        serde_json::to_string(config.as_ref()).unwrap_or_default()
    );

    let runner = Arc::new(IpmiTool::new(&config));
    let shutdown = Shutdown::new();

    if let Mode::Once = mode {
        let control = ControlLoop::new(config.clone(), runner, shutdown);
        return match control.tick().await {
            TickOutcome::ReadFailed => bail!("temperature could not be read"),
            TickOutcome::Acted { failed_commands, .. } if failed_commands > 0 => {
                bail!("{} fan command(s) failed", failed_commands)
            }
            TickOutcome::Acted { .. } => Ok(()),
        };
    }

    let signal_shutdown = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("SIGNAL: Received SIGINT/SIGTERM - shutting down gracefully");
        signal_shutdown.trigger();
        std::process::exit(0);
    }) {
        warn!("Failed to set signal handler: {}. Shutdown via signals may not work cleanly.", e);
    }

    let restarts = Supervisor::new(config, runner, shutdown).run().await;
    info!("SHUTDOWN: stopped after {} restart(s)", restarts);
    Ok(())
}
