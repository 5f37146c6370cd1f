// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Configuration file handling.
//!
//! The daemon reads TOML from `/etc/pwm-fan/config.toml` by default. Files
//! ending in `.json` are read in the older flat `fan_config.json` layout.
//! Everything is validated once into [`Settings`] before the control loop
//! starts; nothing is reloaded afterwards.

use crate::actuator::{ConnectOptions, OutputChannel};
use crate::curve::LinearCurve;
use crate::error::ConfigError;
use crate::gpio;
use crate::sensor::{DEFAULT_TEMP_PATH, TempScale};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/pwm-fan/config.toml";

pub const DEFAULT_TEMP_OFF: f64 = 35.0;
pub const DEFAULT_TEMP_FULL: f64 = 65.0;
pub const DEFAULT_DUTY_MIN: u8 = 0;
pub const DEFAULT_DUTY_MAX: u8 = 255;
pub const DEFAULT_HYSTERESIS: f64 = 2.0;
pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 10.0;

/// Hardware PWM0 on the Raspberry Pi header (GPIO 12/18).
pub const DEFAULT_OUTPUT_CHANNEL: &str = "pwmchip0/pwm0";

/// 25 kHz, the standard 4-pin PC fan PWM frequency.
pub const DEFAULT_PERIOD_NS: u64 = 40_000;

/// Longest accepted pwmchip period (1 Hz).
pub const MAX_PERIOD_NS: u64 = 1_000_000_000;

pub const DEFAULT_IO_TIMEOUT_MS: u64 = 2000;

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level configuration as stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub control: ControlConfig,

    #[serde(default)]
    pub sensor: SensorConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// Curve thresholds, hysteresis and cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// At or below this temperature the fan runs at `duty_min`.
    #[serde(default = "default_temp_off")]
    pub temp_off: f64,

    /// At or above this temperature the fan runs at `duty_max`.
    #[serde(default = "default_temp_full")]
    pub temp_full: f64,

    #[serde(default = "default_duty_min")]
    pub duty_min: u8,

    #[serde(default = "default_duty_max")]
    pub duty_max: u8,

    /// Width in °C of the band around the last decision point in which
    /// the duty is not recomputed.
    #[serde(default = "default_hysteresis")]
    pub hysteresis_band: f64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            temp_off: DEFAULT_TEMP_OFF,
            temp_full: DEFAULT_TEMP_FULL,
            duty_min: DEFAULT_DUTY_MIN,
            duty_max: DEFAULT_DUTY_MAX,
            hysteresis_band: DEFAULT_HYSTERESIS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

/// Where the temperature comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    #[serde(default = "default_temp_path")]
    pub path: PathBuf,

    #[serde(default)]
    pub scale: TempScale,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_TEMP_PATH),
            scale: TempScale::default(),
        }
    }
}

/// Which PWM output is driven.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// `hwmonN/pwmM`, `pwmchipN/pwmM` or `gpioN`. Takes precedence over `fan_gpio_pin`;
    /// when neither is set [`DEFAULT_OUTPUT_CHANNEL`] is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    /// Raspberry Pi BCM pin number. Pins with a hardware PWM channel use
    /// it; any other pin gets software PWM.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fan_gpio_pin: Option<u8>,

    /// PWM period for pwmchip outputs, in nanoseconds.
    #[serde(default = "default_period_ns")]
    pub period_ns: u64,

    /// Software PWM frequency for GPIO pins without hardware PWM.
    #[serde(default = "default_gpio_frequency")]
    pub gpio_frequency_hz: f64,

    /// Whether to hand hwmon outputs back to firmware control on exit.
    #[serde(default = "default_true")]
    pub restore_auto: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            channel: None,
            fan_gpio_pin: None,
            period_ns: DEFAULT_PERIOD_NS,
            gpio_frequency_hz: gpio::DEFAULT_FREQUENCY_HZ,
            restore_auto: true,
        }
    }
}

/// Daemon-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Upper bound on each temperature read and duty write.
    #[serde(default = "default_io_timeout")]
    pub io_timeout_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            io_timeout_ms: DEFAULT_IO_TIMEOUT_MS,
        }
    }
}

// ---------------------------------------------------------------------------
// Validated settings
// ---------------------------------------------------------------------------

/// Everything the control loop needs, already checked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlSettings {
    pub curve: LinearCurve,
    pub hysteresis_band: f64,
    pub poll_interval: Duration,
    pub io_timeout: Duration,
}

/// The full validated configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub control: ControlSettings,
    pub channel: OutputChannel,
    pub connect: ConnectOptions,
    pub sensor_path: PathBuf,
    pub sensor_scale: TempScale,
}

impl Config {
    /// Check every field and produce the settings the daemon runs with.
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        let c = &self.control;
        let curve = LinearCurve::new(c.temp_off, c.temp_full, c.duty_min, c.duty_max)?;

        if !c.hysteresis_band.is_finite() || c.hysteresis_band < 0.0 {
            return Err(ConfigError::Hysteresis(c.hysteresis_band));
        }

        let poll_interval = Duration::try_from_secs_f64(c.poll_interval_secs)
            .ok()
            .filter(|d| !d.is_zero())
            .ok_or(ConfigError::PollInterval(c.poll_interval_secs))?;

        if self.daemon.io_timeout_ms == 0 {
            return Err(ConfigError::IoTimeout);
        }

        let o = &self.output;
        if o.period_ns == 0 || o.period_ns > MAX_PERIOD_NS {
            return Err(ConfigError::Period {
                value: o.period_ns,
                max: MAX_PERIOD_NS,
            });
        }
        if !o.gpio_frequency_hz.is_finite() || o.gpio_frequency_hz <= 0.0 {
            return Err(ConfigError::GpioFrequency(o.gpio_frequency_hz));
        }

        Ok(Settings {
            control: ControlSettings {
                curve,
                hysteresis_band: c.hysteresis_band,
                poll_interval,
                io_timeout: Duration::from_millis(self.daemon.io_timeout_ms),
            },
            channel: o.resolve_channel()?,
            connect: ConnectOptions {
                park_duty: c.duty_min,
                period_ns: o.period_ns,
                restore_auto: o.restore_auto,
                gpio_frequency_hz: o.gpio_frequency_hz,
            },
            sensor_path: self.sensor.path.clone(),
            sensor_scale: self.sensor.scale,
        })
    }
}

impl OutputConfig {
    pub fn resolve_channel(&self) -> Result<OutputChannel, ConfigError> {
        if let Some(channel) = &self.channel {
            return Ok(channel.parse()?);
        }
        match self.fan_gpio_pin {
            Some(pin) => gpio_channel(pin),
            None => Ok(DEFAULT_OUTPUT_CHANNEL.parse()?),
        }
    }
}

/// Map a Raspberry Pi BCM pin to the channel that drives it: the hardware
/// PWM channel where the pin has one, software PWM otherwise.
pub fn gpio_channel(pin: u8) -> Result<OutputChannel, ConfigError> {
    match pin {
        12 | 18 => Ok(OutputChannel::PwmChip { chip: 0, channel: 0 }),
        13 | 19 => Ok(OutputChannel::PwmChip { chip: 0, channel: 1 }),
        0..=gpio::MAX_BCM_PIN => Ok(OutputChannel::Gpio { pin }),
        _ => Err(ConfigError::GpioOutOfRange(pin)),
    }
}

// ---------------------------------------------------------------------------
// Legacy JSON layout
// ---------------------------------------------------------------------------

/// Flat upper-case keys as found in `fan_config.json`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct LegacyConfig {
    fan_gpio_pin: Option<u8>,
    temp_off: Option<f64>,
    temp_full: Option<f64>,
    pwm_min: Option<u8>,
    pwm_max: Option<u8>,
    sleep_interval: Option<f64>,
    hysteresis: Option<f64>,
    temp_file: Option<PathBuf>,
}

impl From<LegacyConfig> for Config {
    fn from(legacy: LegacyConfig) -> Self {
        let mut config = Config::default();
        let control = &mut config.control;

        config.output.fan_gpio_pin = legacy.fan_gpio_pin;
        control.temp_off = legacy.temp_off.unwrap_or(control.temp_off);
        control.temp_full = legacy.temp_full.unwrap_or(control.temp_full);
        control.duty_min = legacy.pwm_min.unwrap_or(control.duty_min);
        control.duty_max = legacy.pwm_max.unwrap_or(control.duty_max);
        control.poll_interval_secs = legacy.sleep_interval.unwrap_or(control.poll_interval_secs);
        control.hysteresis_band = legacy.hysteresis.unwrap_or(control.hysteresis_band);
        if let Some(path) = legacy.temp_file {
            config.sensor.path = path;
        }
        config
    }
}

// ---------------------------------------------------------------------------
// Load / Save
// ---------------------------------------------------------------------------

/// Load config from a file, or return the default if the file doesn't exist.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::info!("No config file at {}, using defaults", path.display());
            return Ok(Config::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let parse_err = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };
    let config = if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str::<LegacyConfig>(&contents)
            .map(Config::from)
            .map_err(|e| parse_err(e.to_string()))?
    } else {
        toml::from_str::<Config>(&contents).map_err(|e| parse_err(e.to_string()))?
    };

    log::info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Save config to a TOML file, creating parent directories if needed.
pub fn save_config(path: &Path, config: &Config) -> Result<(), ConfigError> {
    let write_err = |message: String| ConfigError::Write {
        path: path.to_path_buf(),
        message,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
    }
    let contents = toml::to_string_pretty(config).map_err(|e| write_err(e.to_string()))?;
    fs::write(path, contents).map_err(|e| write_err(e.to_string()))?;

    log::info!("Saved config to {}", path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn default_temp_off() -> f64 {
    DEFAULT_TEMP_OFF
}

fn default_temp_full() -> f64 {
    DEFAULT_TEMP_FULL
}

fn default_duty_min() -> u8 {
    DEFAULT_DUTY_MIN
}

fn default_duty_max() -> u8 {
    DEFAULT_DUTY_MAX
}

fn default_hysteresis() -> f64 {
    DEFAULT_HYSTERESIS
}

fn default_poll_interval() -> f64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_temp_path() -> PathBuf {
    PathBuf::from(DEFAULT_TEMP_PATH)
}

fn default_period_ns() -> u64 {
    DEFAULT_PERIOD_NS
}

fn default_gpio_frequency() -> f64 {
    gpio::DEFAULT_FREQUENCY_HZ
}

fn default_io_timeout() -> u64 {
    DEFAULT_IO_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Config::default().validate().unwrap();
        assert_eq!(settings.control.poll_interval, Duration::from_secs(10));
        assert_eq!(settings.control.curve.duty_min(), 0);
        assert_eq!(settings.control.curve.duty_max(), 255);
        assert_eq!(settings.channel, OutputChannel::PwmChip { chip: 0, channel: 0 });
        assert_eq!(settings.connect.park_duty, 0);
        assert_eq!(settings.sensor_path, PathBuf::from(DEFAULT_TEMP_PATH));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [control]
            temp_off = 45.0
            poll_interval_secs = 2.5

            [output]
            channel = "hwmon2/pwm1"
            "#,
        )
        .unwrap();
        assert_eq!(config.control.temp_off, 45.0);
        assert_eq!(config.control.temp_full, DEFAULT_TEMP_FULL);
        assert_eq!(config.sensor.scale, TempScale::Millidegrees);

        let settings = config.validate().unwrap();
        assert_eq!(settings.control.poll_interval, Duration::from_millis(2500));
        assert_eq!(
            settings.channel,
            OutputChannel::Hwmon {
                device: "hwmon2".into(),
                index: 1
            }
        );
    }

    #[test_case(|c: &mut Config| { c.control.temp_full = c.control.temp_off; } ; "temp_full equal to temp_off")]
    #[test_case(|c: &mut Config| { c.control.temp_full = 20.0; } ; "temp_full below temp_off")]
    #[test_case(|c: &mut Config| { c.control.duty_min = 200; c.control.duty_max = 100; } ; "duty_min above duty_max")]
    #[test_case(|c: &mut Config| { c.control.poll_interval_secs = 0.0; } ; "zero interval")]
    #[test_case(|c: &mut Config| { c.control.poll_interval_secs = -1.0; } ; "negative interval")]
    #[test_case(|c: &mut Config| { c.control.poll_interval_secs = f64::NAN; } ; "nan interval")]
    #[test_case(|c: &mut Config| { c.control.hysteresis_band = -0.5; } ; "negative hysteresis")]
    #[test_case(|c: &mut Config| { c.daemon.io_timeout_ms = 0; } ; "zero io timeout")]
    #[test_case(|c: &mut Config| { c.output.channel = Some("gpio28".into()); } ; "bad channel")]
    #[test_case(|c: &mut Config| { c.output.fan_gpio_pin = Some(40); } ; "gpio pin off the header")]
    #[test_case(|c: &mut Config| { c.output.period_ns = 0; } ; "zero period")]
    #[test_case(|c: &mut Config| { c.output.period_ns = 100_000_000_000_000_000; } ; "period too long")]
    #[test_case(|c: &mut Config| { c.output.gpio_frequency_hz = 0.0; } ; "zero gpio frequency")]
    #[test_case(|c: &mut Config| { c.output.gpio_frequency_hz = f64::INFINITY; } ; "infinite gpio frequency")]
    fn test_rejects(mutate: fn(&mut Config)) {
        let mut config = Config::default();
        mutate(&mut config);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_hysteresis_is_allowed() {
        let mut config = Config::default();
        config.control.hysteresis_band = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test_case(18 => matches Ok(OutputChannel::PwmChip { chip: 0, channel: 0 }))]
    #[test_case(12 => matches Ok(OutputChannel::PwmChip { chip: 0, channel: 0 }))]
    #[test_case(13 => matches Ok(OutputChannel::PwmChip { chip: 0, channel: 1 }))]
    #[test_case(19 => matches Ok(OutputChannel::PwmChip { chip: 0, channel: 1 }))]
    #[test_case(15 => matches Ok(OutputChannel::Gpio { pin: 15 }))]
    #[test_case(4 => matches Ok(OutputChannel::Gpio { pin: 4 }))]
    #[test_case(27 => matches Ok(OutputChannel::Gpio { pin: 27 }))]
    #[test_case(28 => matches Err(ConfigError::GpioOutOfRange(28)))]
    fn test_gpio_channel(pin: u8) -> Result<OutputChannel, ConfigError> {
        gpio_channel(pin)
    }

    #[test]
    fn test_channel_wins_over_gpio_pin() {
        let output = OutputConfig {
            channel: Some("hwmon0/pwm2".into()),
            fan_gpio_pin: Some(13),
            ..OutputConfig::default()
        };
        assert_eq!(
            output.resolve_channel().unwrap(),
            OutputChannel::Hwmon {
                device: "hwmon0".into(),
                index: 2
            }
        );
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.control.temp_off, DEFAULT_TEMP_OFF);
    }

    #[test]
    fn test_load_legacy_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fan_config.json");
        fs::write(
            &path,
            r#"{ "FAN_GPIO_PIN": 18, "TEMP_OFF": 40, "PWM_MAX": 200,
                 "SLEEP_INTERVAL": 5, "TEMP_FILE": "/tmp/temp" }"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.control.temp_off, 40.0);
        assert_eq!(config.control.temp_full, DEFAULT_TEMP_FULL);
        assert_eq!(config.control.duty_max, 200);
        assert_eq!(config.control.poll_interval_secs, 5.0);
        assert_eq!(config.sensor.path, PathBuf::from("/tmp/temp"));

        let settings = config.validate().unwrap();
        assert_eq!(settings.channel, OutputChannel::PwmChip { chip: 0, channel: 0 });
    }

    #[test]
    fn test_legacy_json_default_pin_uses_software_pwm() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fan_config.json");
        fs::write(&path, r#"{ "FAN_GPIO_PIN": 15 }"#).unwrap();

        let settings = load_config(&path).unwrap().validate().unwrap();
        assert_eq!(settings.channel, OutputChannel::Gpio { pin: 15 });
        assert_eq!(settings.connect.gpio_frequency_hz, gpio::DEFAULT_FREQUENCY_HZ);
    }

    #[test]
    fn test_period_limits() {
        let mut config = Config::default();
        config.output.period_ns = MAX_PERIOD_NS;
        assert_eq!(config.validate().unwrap().connect.period_ns, MAX_PERIOD_NS);

        config.output.period_ns = MAX_PERIOD_NS + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Period { value, .. }) if value == MAX_PERIOD_NS + 1
        ));
    }

    #[test]
    fn test_huge_period_from_toml_is_rejected() {
        let config: Config = toml::from_str("[output]\nperiod_ns = 100000000000000000").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Period { .. })));
    }

    #[test]
    fn test_malformed_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[control\ntemp_off = ").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config.toml");
        let mut config = Config::default();
        config.control.hysteresis_band = 3.0;
        config.sensor.scale = TempScale::Degrees;

        save_config(&path, &config).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.control.hysteresis_band, 3.0);
        assert_eq!(loaded.sensor.scale, TempScale::Degrees);
        assert_eq!(loaded.output.channel, None);
        assert_eq!(loaded.output.period_ns, DEFAULT_PERIOD_NS);
    }
}
