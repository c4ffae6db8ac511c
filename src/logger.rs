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

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing::Subscriber;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{MonitorError, Result};

/// Open the log file for appending, creating it (and its directory) if needed.
pub fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            let _ = fs::create_dir_all(parent);
        }
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| MonitorError::LogFile {
            path: path.to_path_buf(),
            source,
        })
}

/// Subscriber that sends every event to stdout and to `file`.
///
/// Lines carry a timestamp, level, source file and line number. The file layer
/// never emits ANSI escapes. An unparsable `filter` falls back to `info`.
pub fn build_subscriber(file: File, filter: &str) -> impl Subscriber + Send + Sync + 'static {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_file(true)
                .with_line_number(true),
        )
        .with(
            fmt::layer()
                .with_target(false)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
}

/// Install [`build_subscriber`] globally, appending to `path`.
///
/// Fails only when the log file cannot be opened.
pub fn init_logging(path: &Path, filter: &str) -> Result<()> {
    let file = open_log_file(path)?;

    if let Err(e) = build_subscriber(file, filter).try_init() {
        eprintln!(
            "ipmi-temp-monitor: a logger is already installed, {} will not receive events: {}",
            path.display(),
            e
        );
    }
    Ok(())
}

/// Route panics through tracing so they land in the log file as well.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        tracing::error!("PANIC at {}: {}", location, message);
    }));
}
