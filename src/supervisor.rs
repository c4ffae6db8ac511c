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

//! Crash supervision and shutdown
//!
//! The [`Supervisor`] is a flat loop: build a fresh [`ControlLoop`], run it as
//! its own task, and if that task panics log it and build another one. Call
//! depth stays constant no matter how many times the loop crashes.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::config::Config;
use crate::control::ControlLoop;
use crate::ipmi::CommandRunner;

/// Pause between a crash and the restart that follows it.
pub const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Cloneable shutdown flag that sleeping tasks can wait on.
#[derive(Clone, Debug)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request shutdown. Safe to call from any thread, any number of times.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Sleep for `duration`, waking early on shutdown.
    /// Returns true if shutdown was requested.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        if *rx.borrow_and_update() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_triggered(),
            _ = rx.changed() => true,
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Supervisor<R> {
    config: Arc<Config>,
    runner: Arc<R>,
    shutdown: Shutdown,
    restart_delay: Duration,
}

impl<R: CommandRunner + 'static> Supervisor<R> {
    pub fn new(config: Arc<Config>, runner: Arc<R>, shutdown: Shutdown) -> Self {
        Self {
            config,
            runner,
            shutdown,
            restart_delay: RESTART_DELAY,
        }
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// Run the control loop until shutdown. Returns the number of restarts.
    pub async fn run(&self) -> u32 {
        let mut restarts = 0;

        while !self.shutdown.is_triggered() {
            let control = ControlLoop::new(self.config.clone(), self.runner.clone(), self.shutdown.clone());
            let handle = tokio::spawn(async move { control.run().await });

            match handle.await {
                Ok(()) => break,
                Err(e) if e.is_panic() => {
                    restarts += 1;
                    error!(
                        "Program crashed with error: {}. Restarting (restart #{})...",
                        panic_message(e.into_panic()),
                        restarts
                    );
                    if self.shutdown.sleep(self.restart_delay).await {
                        break;
                    }
                }
                Err(e) => {
                    error!("Control loop task ended unexpectedly: {}", e);
                    break;
                }
            }
        }

        info!("Supervisor stopped after {} restart(s)", restarts);
        restarts
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
