use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("pin {pin} is assigned to both {first} and {second}")]
    DuplicatePin {
        pin: u8,
        first: &'static str,
        second: &'static str,
    },
    #[error("camera command cannot be empty")]
    EmptyCameraCommand,
    #[error("invalid config json: {0}")]
    Parse(#[from] serde_json::Error),
}

const MAX_RUN_TIME_SECS: u64 = 3_600;
const MAX_FLUSH_INTERVAL_HOURS: u64 = 24 * 365;

/// BCM pin numbers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PinConfig {
    pub pump: u8,
    pub led_a: u8,
    pub led_b: u8,
    pub switch: u8,
    pub trigger: u8,
    pub echo: u8,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            pump: 26,
            led_a: 5,
            led_b: 6,
            switch: 22,
            trigger: 19,
            echo: 13,
        }
    }
}

impl PinConfig {
    fn named(&self) -> [(&'static str, u8); 6] {
        [
            ("pump", self.pump),
            ("led_a", self.led_a),
            ("led_b", self.led_b),
            ("switch", self.switch),
            ("trigger", self.trigger),
            ("echo", self.echo),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PumpConfig {
    pub run_time_secs: u64,
    pub flush_interval_hours: u64,
    pub switch_poll_ms: u64,
    /// The relay board energises the pump when its input is pulled low.
    pub relay_active_low: bool,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            run_time_secs: 25,
            flush_interval_hours: 48,
            switch_poll_ms: 500,
            relay_active_low: true,
        }
    }
}

impl PumpConfig {
    pub fn run_time(&self) -> Duration {
        Duration::from_secs(self.run_time_secs)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_hours.saturating_mul(3_600))
    }

    pub fn switch_poll_interval(&self) -> Duration {
        Duration::from_millis(self.switch_poll_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SensorConfig {
    pub timeout_ms: u64,
    pub trigger_pulse_us: u64,
    pub speed_of_sound_cm_s: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10,
            trigger_pulse_us: 1,
            speed_of_sound_cm_s: 34_300.0,
        }
    }
}

impl SensorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn trigger_pulse(&self) -> Duration {
        Duration::from_micros(self.trigger_pulse_us)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CameraConfig {
    pub command: String,
    pub args: Vec<String>,
    pub output_path: PathBuf,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            command: "libcamera-jpeg".to_string(),
            args: vec![
                "--tuning-file".to_string(),
                "/usr/share/libcamera/ipa/raspberrypi/imx219_noir.json".to_string(),
            ],
            output_path: PathBuf::from("/tmp/image.jpeg"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub web_root: PathBuf,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            web_root: PathBuf::from("/home/pi/static"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StationConfig {
    pub pins: PinConfig,
    pub pump: PumpConfig,
    pub sensor: SensorConfig,
    pub camera: CameraConfig,
    pub http: HttpConfig,
}

impl StationConfig {
    pub fn from_json(raw: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(raw)?)
    }

    pub fn sanitize(&mut self) {
        if self.pump.run_time_secs == 0 {
            self.pump.run_time_secs = PumpConfig::default().run_time_secs;
        }
        self.pump.run_time_secs = self.pump.run_time_secs.min(MAX_RUN_TIME_SECS);
        if self.pump.flush_interval_hours == 0 {
            self.pump.flush_interval_hours = PumpConfig::default().flush_interval_hours;
        }
        self.pump.flush_interval_hours =
            self.pump.flush_interval_hours.min(MAX_FLUSH_INTERVAL_HOURS);
        self.pump.switch_poll_ms = self.pump.switch_poll_ms.clamp(10, 60_000);

        self.sensor.timeout_ms = self.sensor.timeout_ms.clamp(1, 1_000);
        self.sensor.trigger_pulse_us = self.sensor.trigger_pulse_us.clamp(1, 100);
        if !self.sensor.speed_of_sound_cm_s.is_finite() || self.sensor.speed_of_sound_cm_s <= 0.0
        {
            self.sensor.speed_of_sound_cm_s = SensorConfig::default().speed_of_sound_cm_s;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let pins = self.pins.named();
        for (index, (first, pin)) in pins.iter().enumerate() {
            if let Some((second, _)) = pins[index + 1..].iter().find(|(_, other)| other == pin) {
                return Err(ConfigError::DuplicatePin {
                    pin: *pin,
                    first: *first,
                    second: *second,
                });
            }
        }

        if self.camera.command.trim().is_empty() {
            return Err(ConfigError::EmptyCameraCommand);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_station_wiring() {
        let config = StationConfig::default();

        assert_eq!(config.pins.pump, 26);
        assert_eq!(config.pins.switch, 22);
        assert_eq!(config.pump.run_time(), Duration::from_secs(25));
        assert_eq!(config.pump.flush_interval(), Duration::from_secs(48 * 3_600));
        assert_eq!(config.pump.switch_poll_interval(), Duration::from_millis(500));
        assert_eq!(config.sensor.timeout(), Duration::from_millis(10));
        assert_eq!(config.http.port, 8080);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config =
            StationConfig::from_json(br#"{"http": {"port": 9090}, "pins": {"pump": 17}}"#)
                .unwrap();

        assert_eq!(config.http.port, 9090);
        assert_eq!(config.http.web_root, PathBuf::from("/home/pi/static"));
        assert_eq!(config.pins.pump, 17);
        assert_eq!(config.pins.echo, 13);
        assert_eq!(config.pump, PumpConfig::default());
    }

    #[test]
    fn sanitize_replaces_zero_intervals() {
        let mut config = StationConfig::default();
        config.pump.run_time_secs = 0;
        config.pump.flush_interval_hours = 0;
        config.pump.switch_poll_ms = 0;
        config.sensor.timeout_ms = 0;
        config.sensor.speed_of_sound_cm_s = f64::NAN;

        config.sanitize();

        assert_eq!(config.pump.run_time_secs, 25);
        assert_eq!(config.pump.flush_interval_hours, 48);
        assert_eq!(config.pump.switch_poll_ms, 10);
        assert_eq!(config.sensor.timeout_ms, 1);
        assert_eq!(config.sensor.speed_of_sound_cm_s, 34_300.0);
    }

    #[test]
    fn sanitize_caps_oversized_intervals() {
        let json = br#"{"pump":{"flush_interval_hours":4000000000000000,"run_time_secs":9999999}}"#;
        let mut config = StationConfig::from_json(json).unwrap();

        config.sanitize();

        assert_eq!(config.pump.flush_interval_hours, 24 * 365);
        assert_eq!(config.pump.run_time_secs, 3_600);
        assert_eq!(config.pump.flush_interval(), Duration::from_secs(24 * 365 * 3_600));
    }

    #[test]
    fn flush_interval_saturates_instead_of_overflowing() {
        let pump = PumpConfig {
            flush_interval_hours: u64::MAX,
            ..PumpConfig::default()
        };

        assert_eq!(pump.flush_interval(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn duplicate_pins_are_rejected() {
        let mut config = StationConfig::default();
        config.pins.echo = config.pins.trigger;

        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "pin 19 is assigned to both trigger and echo");
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            StationConfig::from_json(b"{not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
