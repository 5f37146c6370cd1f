// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! hwmon sysfs PWM outputs.
//!
//! An hwmon channel is a `pwmN` file taking raw values 0-255 plus a
//! `pwmN_enable` mode file (1 = manual, 2 = automatic). Acquiring a channel
//! switches it to manual; releasing it optionally hands it back to the
//! firmware.

use crate::actuator::Actuator;
use crate::error::ActuatorError;
use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

pub const HWMON_ROOT: &str = "/sys/class/hwmon";

const PWM_ENABLE_MANUAL: u8 = 1;
const PWM_ENABLE_AUTO: u8 = 2;

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// A PWM channel found under an hwmon device.
#[derive(Debug, Clone, PartialEq)]
pub struct HwmonOutput {
    /// Channel id usable as `output.channel`, e.g. "hwmon3/pwm1"
    pub id: String,
    /// Driver name from the device's `name` file
    pub driver: String,
    /// Label of the matching fan input, if the driver provides one
    pub label: Option<String>,
}

/// A temperature input found under an hwmon device.
#[derive(Debug, Clone, PartialEq)]
pub struct HwmonTemp {
    pub id: String,
    pub driver: String,
    pub label: Option<String>,
    /// Absolute path to `tempN_input` (millidegrees)
    pub input_path: PathBuf,
}

/// List every `pwmN` file below `root`, sorted by id.
pub fn discover_outputs(root: &Path) -> io::Result<Vec<HwmonOutput>> {
    let mut outputs = Vec::new();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let dir = entry.path();
        let driver = read_trimmed(&dir.join("name")).unwrap_or_default();
        let basename = entry.file_name().to_string_lossy().to_string();

        for n in 1..=16 {
            if !dir.join(format!("pwm{n}")).exists() {
                break;
            }
            outputs.push(HwmonOutput {
                id: format!("{basename}/pwm{n}"),
                driver: driver.clone(),
                label: read_trimmed(&dir.join(format!("fan{n}_label"))),
            });
        }
    }

    outputs.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(outputs)
}

/// List every `tempN_input` file below `root`, sorted by id.
pub fn discover_temps(root: &Path) -> io::Result<Vec<HwmonTemp>> {
    let mut temps = Vec::new();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let dir = entry.path();
        let driver = read_trimmed(&dir.join("name")).unwrap_or_default();
        let basename = entry.file_name().to_string_lossy().to_string();

        for n in 1..=32 {
            let input_path = dir.join(format!("temp{n}_input"));
            if !input_path.exists() {
                break;
            }
            temps.push(HwmonTemp {
                id: format!("{basename}/temp{n}"),
                driver: driver.clone(),
                label: read_trimmed(&dir.join(format!("temp{n}_label"))),
                input_path,
            });
        }
    }

    temps.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(temps)
}

// ---------------------------------------------------------------------------
// Actuator
// ---------------------------------------------------------------------------

/// An acquired hwmon PWM channel held in manual mode.
#[derive(Debug)]
pub struct HwmonPwm {
    id: String,
    pwm_path: PathBuf,
    enable_path: PathBuf,
    park_duty: u8,
    restore_auto: bool,
    released: bool,
}

impl HwmonPwm {
    /// Acquire `device/pwm{index}` below `root` and switch it to manual mode.
    pub async fn open(
        root: &Path,
        device: &str,
        index: u32,
        park_duty: u8,
        restore_auto: bool,
    ) -> Result<Self, ActuatorError> {
        let id = format!("{device}/pwm{index}");
        let dir = root.join(device);
        let pwm_path = dir.join(format!("pwm{index}"));
        let enable_path = dir.join(format!("pwm{index}_enable"));

        if !pwm_path.exists() {
            return Err(ActuatorError::ChannelNotFound {
                channel: id,
                path: pwm_path,
            });
        }

        tokio::fs::write(&enable_path, PWM_ENABLE_MANUAL.to_string())
            .await
            .map_err(|e| ActuatorError::from_io(&id, enable_path.clone(), e))?;

        log::info!("Acquired {id} in manual mode");
        Ok(Self {
            id,
            pwm_path,
            enable_path,
            park_duty,
            restore_auto,
            released: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Actuator for HwmonPwm {
    fn set_duty(&mut self, duty: u8) -> impl Future<Output = Result<(), ActuatorError>> + Send {
        async move {
            tokio::fs::write(&self.pwm_path, duty.to_string())
                .await
                .map_err(|e| ActuatorError::from_io(&self.id, self.pwm_path.clone(), e))
        }
    }

    fn release(mut self) -> impl Future<Output = Result<(), ActuatorError>> + Send {
        async move {
            self.released = true;
            if !self.restore_auto {
                return Ok(());
            }
            tokio::fs::write(&self.enable_path, PWM_ENABLE_AUTO.to_string())
                .await
                .map_err(|e| ActuatorError::from_io(&self.id, self.enable_path.clone(), e))?;
            log::info!("Restored {} to automatic control", self.id);
            Ok(())
        }
    }
}

impl Drop for HwmonPwm {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        log::warn!("{} dropped without release, parking at {}", self.id, self.park_duty);
        if let Err(e) = fs::write(&self.pwm_path, self.park_duty.to_string()) {
            log::error!("Failed to park {}: {e}", self.id);
        }
        if self.restore_auto {
            if let Err(e) = fs::write(&self.enable_path, PWM_ENABLE_AUTO.to_string()) {
                log::error!("Failed to restore automatic control for {}: {e}", self.id);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}
