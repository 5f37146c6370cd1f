// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Software PWM on a Raspberry Pi GPIO pin.
//!
//! Used for BCM pins without a hardware PWM channel. The pulse train is
//! generated by a background thread owned by the pin, so it only lasts as
//! long as the handle does.

use crate::actuator::{Actuator, PWM_FULL_SCALE};
use crate::error::ActuatorError;
use rppal::gpio::{Gpio, OutputPin};
use std::fmt;
use std::future::Future;

/// Highest BCM pin on the 40-pin header.
pub const MAX_BCM_PIN: u8 = 27;

/// pigpio's default software PWM frequency.
pub const DEFAULT_FREQUENCY_HZ: f64 = 800.0;

/// Fraction of the period the pin is high for a 0-255 duty.
pub fn duty_fraction(duty: u8) -> f64 {
    f64::from(duty) / f64::from(PWM_FULL_SCALE)
}

/// A GPIO pin driven with software PWM.
pub struct GpioPwm {
    id: String,
    pin: OutputPin,
    frequency_hz: f64,
    park_duty: u8,
    released: bool,
}

impl GpioPwm {
    /// Claim BCM `pin` as an output, driven low until the first duty write.
    pub fn open(pin: u8, frequency_hz: f64, park_duty: u8) -> Result<Self, ActuatorError> {
        let gpio_err = |source| ActuatorError::Gpio { pin, source };
        let mut output = Gpio::new().map_err(gpio_err)?.get(pin).map_err(gpio_err)?.into_output_low();
        // Drop handles parking itself
        output.set_reset_on_drop(false);

        let id = format!("gpio{pin}");
        log::info!("Acquired {id} with software PWM at {frequency_hz} Hz");
        Ok(Self {
            id,
            pin: output,
            frequency_hz,
            park_duty,
            released: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn write(&mut self, duty: u8) -> Result<(), ActuatorError> {
        let pin = self.pin.pin();
        self.pin
            .set_pwm_frequency(self.frequency_hz, duty_fraction(duty))
            .map_err(|source| ActuatorError::Gpio { pin, source })
    }

    fn stop(&mut self, level_high: bool) -> Result<(), ActuatorError> {
        let pin = self.pin.pin();
        self.pin
            .clear_pwm()
            .map_err(|source| ActuatorError::Gpio { pin, source })?;
        if level_high {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        Ok(())
    }
}

impl fmt::Debug for GpioPwm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpioPwm")
            .field("id", &self.id)
            .field("frequency_hz", &self.frequency_hz)
            .field("park_duty", &self.park_duty)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl Actuator for GpioPwm {
    fn set_duty(&mut self, duty: u8) -> impl Future<Output = Result<(), ActuatorError>> + Send {
        std::future::ready(self.write(duty))
    }

    fn release(mut self) -> impl Future<Output = Result<(), ActuatorError>> + Send {
        self.released = true;
        let result = self.stop(false);
        if result.is_ok() {
            log::info!("Stopped PWM on {}", self.id);
        }
        std::future::ready(result)
    }
}

impl Drop for GpioPwm {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // The pulse thread dies with the handle, so a non-zero park duty
        // can only be held as a steady high level.
        let high = self.park_duty > 0;
        log::warn!(
            "{} dropped without release, parking {}",
            self.id,
            if high { "high" } else { "low" }
        );
        if let Err(e) = self.stop(high) {
            log::error!("Failed to park {}: {e}", self.id);
        }
    }
}
