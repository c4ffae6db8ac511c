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

//! Temperature reading over `ipmitool sdr get`
//!
//! The reading is scraped from ipmitool's human-readable report, e.g.
//!
//! ```text
//!  Sensor ID              : Ambient Temp (0xe)
//!  Entity ID              : 7.1 (System Board)
//!  Sensor Type (Threshold)  : Temperature (0x01)
//!  Sensor Reading        : 28 (+/- 0) degrees C
//!  Status                : ok
//! ```
//!
//! [`parse_sensor_reading`] is the only code that knows this layout.

use std::time::SystemTime;

use tracing::debug;

use crate::error::{MonitorError, Result};
use crate::ipmi::{CommandRunner, Executor, IpmiCommand};

/// Marker of the line that carries the value.
pub const READING_FIELD: &str = "Sensor Reading";

/// Index of the value among the whitespace-separated tokens of that line:
/// `Sensor`, `Reading`, `:`, `<value>`.
pub const READING_TOKEN_INDEX: usize = 3;

/// One poll result. Lives for a single control-loop tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemperatureReading {
    pub sensor: String,
    pub celsius: i32,
    pub taken_at: SystemTime,
}

/// Extract the integer reading from `sdr get` output.
///
/// Lines containing [`READING_FIELD`] with too few tokens are skipped, so a
/// later well-formed line can still match.
pub fn parse_sensor_reading(output: &str) -> Result<i32> {
    for line in output.lines() {
        if !line.contains(READING_FIELD) {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if let Some(token) = parts.get(READING_TOKEN_INDEX) {
            return token.parse::<i32>().map_err(|source| MonitorError::SensorParse {
                token: token.to_string(),
                source,
            });
        }
    }
    Err(MonitorError::SensorNotFound {
        output: output.trim().to_string(),
    })
}

/// Query `sensor` once and parse its reading.
pub async fn read_temperature<R: CommandRunner>(executor: &Executor<R>, sensor: &str) -> Result<TemperatureReading> {
    let output = executor
        .execute(&IpmiCommand::SensorGet(sensor.to_string()))
        .await
        .map_err(|e| MonitorError::sensor_read(sensor, e))?;

    let celsius = parse_sensor_reading(&output)?;
    debug!("Parsed {} reading: {}", sensor, celsius);

    Ok(TemperatureReading {
        sensor: sensor.to_string(),
        celsius,
        taken_at: SystemTime::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipmi::{MockCommandRunner, RawOutput};

    const SDR_OUTPUT: &str = "\
 Sensor ID              : Ambient Temp (0xe)
 Entity ID              : 7.1 (System Board)
 Sensor Type (Threshold)  : Temperature (0x01)
 Sensor Reading        : 28 (+/- 0) degrees C
 Status                : ok
 Lower Non-Recoverable : na
 Upper Critical        : 42.000
";

    #[test]
    fn test_parses_reading() {
        assert_eq!(parse_sensor_reading(SDR_OUTPUT).unwrap(), 28);
        assert_eq!(parse_sensor_reading("Sensor Reading : 28 degrees C").unwrap(), 28);
    }

    #[test]
    fn test_negative_reading() {
        assert_eq!(parse_sensor_reading(" Sensor Reading : -5 (+/- 0) degrees C").unwrap(), -5);
    }

    #[test]
    fn test_missing_line_is_not_found() {
        let err = parse_sensor_reading(" Sensor ID : Ambient Temp (0xe)\n Status : ok\n").unwrap_err();
        assert!(matches!(err, MonitorError::SensorNotFound { .. }));
        assert!(matches!(parse_sensor_reading(""), Err(MonitorError::SensorNotFound { .. })));
    }

    #[test]
    fn test_non_numeric_token_is_parse_error() {
        let err = parse_sensor_reading(" Sensor Reading : No Reading\n").unwrap_err();
        match err {
            MonitorError::SensorParse { token, .. } => assert_eq!(token, "No"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            parse_sensor_reading("Sensor Reading : 28.5 degrees C"),
            Err(MonitorError::SensorParse { .. })
        ));
    }

    #[test]
    fn test_short_line_is_skipped() {
        let output = "Sensor Reading :\n Sensor Reading : 31 (+/- 0) degrees C\n";
        assert_eq!(parse_sensor_reading(output).unwrap(), 31);
        assert!(matches!(
            parse_sensor_reading("Sensor Reading :"),
            Err(MonitorError::SensorNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_temperature_queries_configured_sensor() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|args| args.to_vec() == IpmiCommand::SensorGet("Inlet Temp".into()).args())
            .times(1)
            .returning(|_| Ok(RawOutput::new(0, SDR_OUTPUT)));

        let reading = read_temperature(&Executor::new(runner), "Inlet Temp").await.unwrap();
        assert_eq!(reading.sensor, "Inlet Temp");
        assert_eq!(reading.celsius, 28);
    }

    #[tokio::test]
    async fn test_read_temperature_execution_failure() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .times(1)
            .returning(|_| Ok(RawOutput::new(1, "Error: Unable to establish IPMI v2 / RMCP+ session")));

        let err = read_temperature(&Executor::new(runner), "Ambient Temp").await.unwrap_err();
        match err {
            MonitorError::SensorRead { sensor, reason } => {
                assert_eq!(sensor, "Ambient Temp");
                assert!(reason.contains("RMCP+"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
