// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! The sampling and actuation loop.
//!
//! Each tick reads the temperature, decides through two gates whether the
//! fan needs a new duty, and writes it. The hysteresis gate limits how often
//! the duty is recomputed; the actuation gate limits how often the output is
//! actually written, since a recompute can land on the duty already set.
//!
//! The controller owns the actuator from [`Controller::new`] until
//! [`Controller::shutdown`], which always parks the fan at `duty_min` and
//! releases the output exactly once.

use crate::actuator::Actuator;
use crate::config::ControlSettings;
use crate::error::{ActuatorError, SensorError};
use crate::sensor::TemperatureSource;
use std::future::Future;
use std::pin::pin;
use std::time::Duration;
use tokio::time;

/// Lifecycle of a [`Controller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Output acquired, nothing written yet.
    Uninitialized,
    /// Initial write done; ticks are being taken.
    Running,
    /// Stop requested or output lost; the final write and release are in progress.
    ShuttingDown,
    /// Output released. No further writes are possible.
    Stopped,
}

/// Decision state carried from one tick to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopState {
    /// Last duty successfully written to the output.
    pub last_commanded_duty: Option<u8>,
    /// Temperature at which that duty was chosen. Stays anchored until the
    /// next write, however far individual readings drift in between.
    pub last_reference_temp: Option<f64>,
}

/// What a single tick did.
#[derive(Debug)]
pub enum TickOutcome {
    /// No reading this tick.
    Unavailable(SensorError),
    /// Reading inside the hysteresis band; duty not recomputed.
    Held { temp_c: f64 },
    /// Recomputed duty equals the one already set.
    Unchanged { temp_c: f64, duty: u8 },
    /// New duty written.
    Actuated { temp_c: f64, duty: u8 },
    /// Write failed; the loop carries on.
    WriteFailed(ActuatorError),
    /// The output is gone; the loop must stop.
    Lost(ActuatorError),
}

/// Why [`Controller::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The shutdown future completed.
    Requested,
    /// The output became unusable.
    ActuatorLost,
}

pub struct Controller<S, A> {
    settings: ControlSettings,
    source: S,
    actuator: Option<A>,
    state: LoopState,
    phase: Phase,
}

impl<S: TemperatureSource, A: Actuator> Controller<S, A> {
    /// Take ownership of an acquired actuator. Nothing is written until
    /// [`start`](Self::start).
    pub fn new(settings: ControlSettings, source: S, actuator: A) -> Self {
        Self {
            settings,
            source,
            actuator: Some(actuator),
            state: LoopState::default(),
            phase: Phase::Uninitialized,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Force the output to `duty_min` and enter [`Phase::Running`].
    ///
    /// If the first write fails the actuator is released and the controller
    /// stops; there is no known output state to run from.
    pub async fn start(&mut self) -> Result<(), ActuatorError> {
        let duty_min = self.settings.curve.duty_min();
        let result = match self.actuator.as_mut() {
            Some(actuator) => write_duty(actuator, duty_min, self.settings.io_timeout).await,
            None => Err(ActuatorError::Released),
        };

        if let Err(e) = result {
            log::error!("Failed to set initial duty {duty_min}: {e}");
            self.release().await;
            self.phase = Phase::Stopped;
            return Err(e);
        }

        self.state = LoopState {
            last_commanded_duty: Some(duty_min),
            last_reference_temp: None,
        };
        self.phase = Phase::Running;
        log::info!("PWM fan controller started at duty {duty_min}");
        Ok(())
    }

    /// Run one read / decide / write cycle.
    pub async fn tick(&mut self) -> TickOutcome {
        let temp_c = match self.read_temperature().await {
            Ok(t) => t,
            Err(e) => {
                log::debug!("Temperature unavailable, skipping tick: {e}");
                return TickOutcome::Unavailable(e);
            }
        };

        if !self.outside_band(temp_c) {
            log::debug!("Temp: {temp_c:.1}°C within hysteresis band, holding");
            return TickOutcome::Held { temp_c };
        }

        let duty = self.settings.curve.duty_for(temp_c);
        if self.state.last_commanded_duty == Some(duty) {
            log::debug!("Temp: {temp_c:.1}°C -> duty unchanged ({duty})");
            return TickOutcome::Unchanged { temp_c, duty };
        }

        let result = match self.actuator.as_mut() {
            Some(actuator) => write_duty(actuator, duty, self.settings.io_timeout).await,
            None => Err(ActuatorError::Released),
        };
        match result {
            Ok(()) => {
                self.state.last_commanded_duty = Some(duty);
                self.state.last_reference_temp = Some(temp_c);
                log::info!("Temp: {temp_c:.1}°C -> duty set to {duty}");
                TickOutcome::Actuated { temp_c, duty }
            }
            Err(e) if e.is_unrecoverable() => {
                log::error!("Lost output while setting duty {duty}: {e}");
                TickOutcome::Lost(e)
            }
            Err(e) => {
                log::error!("Failed to set duty {duty}: {e}");
                TickOutcome::WriteFailed(e)
            }
        }
    }

    /// Tick every poll interval until `shutdown` completes or the output is
    /// lost, then shut down.
    ///
    /// `shutdown` is checked before every tick, so a stop request takes
    /// effect within one poll interval. Starts the controller first if
    /// [`start`](Self::start) has not been called.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<StopReason, ActuatorError>
    where
        F: Future<Output = ()>,
    {
        if self.phase == Phase::Uninitialized {
            self.start().await?;
        }

        let mut shutdown = pin!(shutdown);
        let mut wait = Duration::ZERO;
        let reason = loop {
            tokio::select! {
                biased;
                () = &mut shutdown => break StopReason::Requested,
                () = time::sleep(wait) => {}
            }

            if let TickOutcome::Lost(_) = self.tick().await {
                break StopReason::ActuatorLost;
            }
            wait = self.settings.poll_interval;
        };

        self.shutdown().await;
        Ok(reason)
    }

    /// Park the fan at `duty_min` and release the output.
    ///
    /// A failed final write is logged, not returned. Calling this again
    /// after the controller has stopped does nothing.
    pub async fn shutdown(&mut self) {
        if self.phase == Phase::Stopped {
            return;
        }
        self.phase = Phase::ShuttingDown;

        let duty_min = self.settings.curve.duty_min();
        if let Some(actuator) = self.actuator.as_mut() {
            log::info!("Setting fan duty to {duty_min} before exiting");
            match write_duty(actuator, duty_min, self.settings.io_timeout).await {
                Ok(()) => self.state.last_commanded_duty = Some(duty_min),
                Err(e) => log::error!("Error parking fan during shutdown: {e}"),
            }
        }

        self.release().await;
        self.phase = Phase::Stopped;
        log::info!("Fan controller stopped");
    }

    async fn read_temperature(&mut self) -> Result<f64, SensorError> {
        let limit = self.settings.io_timeout;
        time::timeout(limit, self.source.read())
            .await
            .unwrap_or(Err(SensorError::Timeout(limit)))
    }

    fn outside_band(&self, temp_c: f64) -> bool {
        match self.state.last_reference_temp {
            None => true,
            Some(reference) => {
                let half_band = millidegrees(self.settings.hysteresis_band / 2.0);
                millidegrees((temp_c - reference).abs()) >= half_band
            }
        }
    }

    async fn release(&mut self) {
        let Some(actuator) = self.actuator.take() else {
            return;
        };
        match time::timeout(self.settings.io_timeout, actuator.release()).await {
            Ok(Ok(())) => log::info!("Output released"),
            Ok(Err(e)) => log::error!("Error releasing output: {e}"),
            Err(_) => log::error!("Releasing output timed out"),
        }
    }
}

/// Whole millidegrees, the resolution sysfs reports temperatures in.
fn millidegrees(celsius: f64) -> i64 {
    (celsius * 1000.0).round() as i64
}

async fn write_duty<A: Actuator>(actuator: &mut A, duty: u8, limit: Duration) -> Result<(), ActuatorError> {
    time::timeout(limit, actuator.set_duty(duty))
        .await
        .unwrap_or(Err(ActuatorError::Timeout(limit)))
}
