// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! PWM actuator abstraction and channel selection.

use crate::error::ActuatorError;
use crate::gpio::{self, GpioPwm};
use crate::hwmon::{self, HwmonPwm};
use crate::pwmchip::{self, PwmChipPwm};
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::str::FromStr;

/// Duty values are expressed on a 0..=255 scale regardless of backend.
pub const PWM_FULL_SCALE: u8 = 255;

/// An acquired output that accepts duty-cycle commands.
///
/// `release` consumes the handle, so a channel is released at most once.
pub trait Actuator {
    fn set_duty(&mut self, duty: u8) -> impl Future<Output = Result<(), ActuatorError>> + Send;

    fn release(self) -> impl Future<Output = Result<(), ActuatorError>> + Send;
}

/// Identifies a physical PWM output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChannel {
    /// `hwmonN/pwmM`
    Hwmon { device: String, index: u32 },
    /// `pwmchipN/pwmM`
    PwmChip { chip: u32, channel: u32 },
    /// `gpioN`, software PWM on a BCM pin
    Gpio { pin: u8 },
}

impl FromStr for OutputChannel {
    type Err = ActuatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || ActuatorError::UnknownChannel(s.to_string());

        if let Some(pin) = s.trim().strip_prefix("gpio") {
            return match pin.parse::<u8>() {
                Ok(pin) if pin <= gpio::MAX_BCM_PIN => Ok(OutputChannel::Gpio { pin }),
                _ => Err(unknown()),
            };
        }

        let (parent, leaf) = s.trim().split_once('/').ok_or_else(unknown)?;
        let index: u32 = leaf
            .strip_prefix("pwm")
            .and_then(|n| n.parse().ok())
            .ok_or_else(unknown)?;

        if let Some(chip) = parent.strip_prefix("pwmchip") {
            let chip = chip.parse().map_err(|_| unknown())?;
            return Ok(OutputChannel::PwmChip {
                chip,
                channel: index,
            });
        }

        match parent.strip_prefix("hwmon") {
            Some(n) if n.parse::<u32>().is_ok() && index >= 1 => Ok(OutputChannel::Hwmon {
                device: parent.to_string(),
                index,
            }),
            _ => Err(unknown()),
        }
    }
}

impl fmt::Display for OutputChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputChannel::Hwmon { device, index } => write!(f, "{device}/pwm{index}"),
            OutputChannel::PwmChip { chip, channel } => write!(f, "pwmchip{chip}/pwm{channel}"),
            OutputChannel::Gpio { pin } => write!(f, "gpio{pin}"),
        }
    }
}

/// Backend-independent settings used when acquiring a channel.
#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions {
    /// Duty written if the handle is dropped without being released.
    pub park_duty: u8,
    /// PWM period for pwmchip channels.
    pub period_ns: u64,
    /// Hand hwmon channels back to firmware control on release.
    pub restore_auto: bool,
    /// Software PWM frequency for GPIO pins.
    pub gpio_frequency_hz: f64,
}

/// A concrete output.
#[derive(Debug)]
pub enum PwmOutput {
    Hwmon(HwmonPwm),
    PwmChip(PwmChipPwm),
    Gpio(GpioPwm),
}

impl PwmOutput {
    /// Acquire `channel` under the standard sysfs roots.
    pub async fn connect(channel: &OutputChannel, opts: ConnectOptions) -> Result<Self, ActuatorError> {
        Self::connect_in(
            Path::new(hwmon::HWMON_ROOT),
            Path::new(pwmchip::PWM_ROOT),
            channel,
            opts,
        )
        .await
    }

    pub async fn connect_in(
        hwmon_root: &Path,
        pwm_root: &Path,
        channel: &OutputChannel,
        opts: ConnectOptions,
    ) -> Result<Self, ActuatorError> {
        match channel {
            OutputChannel::Hwmon { device, index } => {
                HwmonPwm::open(hwmon_root, device, *index, opts.park_duty, opts.restore_auto)
                    .await
                    .map(PwmOutput::Hwmon)
            }
            OutputChannel::PwmChip { chip, channel } => {
                PwmChipPwm::open(pwm_root, *chip, *channel, opts.period_ns, opts.park_duty)
                    .await
                    .map(PwmOutput::PwmChip)
            }
            OutputChannel::Gpio { pin } => {
                GpioPwm::open(*pin, opts.gpio_frequency_hz, opts.park_duty).map(PwmOutput::Gpio)
            }
        }
    }

    pub fn id(&self) -> &str {
        match self {
            PwmOutput::Hwmon(p) => p.id(),
            PwmOutput::PwmChip(p) => p.id(),
            PwmOutput::Gpio(p) => p.id(),
        }
    }
}

impl Actuator for PwmOutput {
    fn set_duty(&mut self, duty: u8) -> impl Future<Output = Result<(), ActuatorError>> + Send {
        async move {
            match self {
                PwmOutput::Hwmon(p) => p.set_duty(duty).await,
                PwmOutput::PwmChip(p) => p.set_duty(duty).await,
                PwmOutput::Gpio(p) => p.set_duty(duty).await,
            }
        }
    }

    fn release(self) -> impl Future<Output = Result<(), ActuatorError>> + Send {
        async move {
            match self {
                PwmOutput::Hwmon(p) => p.release().await,
                PwmOutput::PwmChip(p) => p.release().await,
                PwmOutput::Gpio(p) => p.release().await,
            }
        }
    }
}
