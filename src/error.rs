// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Error types shared by the controller and its collaborators.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Rejected configuration. Always fatal, raised before the loop starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("failed to write config {path}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("temp_full ({temp_full}°C) must be greater than temp_off ({temp_off}°C)")]
    TempRange { temp_off: f64, temp_full: f64 },

    #[error("duty_min ({duty_min}) must not exceed duty_max ({duty_max})")]
    DutyRange { duty_min: u8, duty_max: u8 },

    #[error("poll interval must be a positive number of seconds, got {0}")]
    PollInterval(f64),

    #[error("hysteresis band must be a finite value >= 0, got {0}")]
    Hysteresis(f64),

    #[error("io_timeout_ms must be greater than zero")]
    IoTimeout,

    #[error("{field} must be a finite temperature, got {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("PWM period must be between 1 and {max} ns, got {value}")]
    Period { value: u64, max: u64 },

    #[error("GPIO PWM frequency must be a positive number of Hz, got {0}")]
    GpioFrequency(f64),

    #[error("GPIO pin {0} is out of range (0-27)")]
    GpioOutOfRange(u8),

    #[error(transparent)]
    Channel(#[from] ActuatorError),
}

/// A single failed temperature sample. Never fatal.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("temperature source {0} does not exist")]
    Missing(PathBuf),

    #[error("could not parse temperature from {raw:?}")]
    Parse { raw: String },

    #[error("temperature reading is not finite")]
    NotFinite,

    #[error("error reading temperature: {0}")]
    Io(#[from] io::Error),

    #[error("temperature read timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors from acquiring or driving a PWM output.
#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("unrecognised output channel {0:?} (expected hwmonN/pwmM, pwmchipN/pwmM or gpioN)")]
    UnknownChannel(String),

    #[error("output channel {channel} not found at {path}")]
    ChannelNotFound { channel: String, path: PathBuf },

    #[error("I/O error on {channel}: {source}")]
    Io {
        channel: String,
        #[source]
        source: io::Error,
    },

    #[error("GPIO {pin}: {source}")]
    Gpio {
        pin: u8,
        #[source]
        source: rppal::gpio::Error,
    },

    #[error("duty write timed out after {0:?}")]
    Timeout(Duration),

    #[error("output has already been released")]
    Released,
}

impl ActuatorError {
    /// Wrap an I/O error, promoting `NotFound` to [`ActuatorError::ChannelNotFound`].
    pub(crate) fn from_io(channel: &str, path: PathBuf, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            ActuatorError::ChannelNotFound {
                channel: channel.to_string(),
                path,
            }
        } else {
            ActuatorError::Io {
                channel: channel.to_string(),
                source,
            }
        }
    }

    /// True when the output has gone away and further writes cannot succeed.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            ActuatorError::ChannelNotFound { .. } | ActuatorError::Released
        )
    }
}
