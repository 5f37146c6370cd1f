// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! PWM class outputs under `/sys/class/pwm`.
//!
//! Channels are exported on demand, programmed with a fixed period, and
//! driven by writing `duty_cycle` in nanoseconds. Duty values are scaled
//! from the 0-255 range onto the period.

use crate::actuator::{Actuator, PWM_FULL_SCALE};
use crate::error::ActuatorError;
use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const PWM_ROOT: &str = "/sys/class/pwm";

/// How long to wait for udev to create the channel directory after export.
const EXPORT_SETTLE_TIMEOUT: Duration = Duration::from_millis(1000);
const EXPORT_POLL: Duration = Duration::from_millis(20);

/// A channel of a PWM chip, exported or not.
#[derive(Debug, Clone, PartialEq)]
pub struct PwmChipOutput {
    /// Channel id usable as `output.channel`, e.g. "pwmchip0/pwm1"
    pub id: String,
    pub exported: bool,
}

/// List every channel of every chip below `root`, sorted by id.
pub fn discover_outputs(root: &Path) -> io::Result<Vec<PwmChipOutput>> {
    let mut outputs = Vec::new();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let chip = entry.file_name().to_string_lossy().to_string();
        if !chip.starts_with("pwmchip") {
            continue;
        }
        let npwm = fs::read_to_string(entry.path().join("npwm"))
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
            .unwrap_or(0);

        for n in 0..npwm {
            outputs.push(PwmChipOutput {
                id: format!("{chip}/pwm{n}"),
                exported: entry.path().join(format!("pwm{n}")).is_dir(),
            });
        }
    }

    outputs.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(outputs)
}

/// Scale a 0-255 duty onto a period in nanoseconds. Never exceeds `period_ns`.
pub fn duty_to_ns(duty: u8, period_ns: u64) -> u64 {
    let ns = u128::from(duty) * u128::from(period_ns) / u128::from(PWM_FULL_SCALE);
    // duty <= 255, so ns <= period_ns
    ns as u64
}

/// An exported and enabled PWM channel.
#[derive(Debug)]
pub struct PwmChipPwm {
    id: String,
    channel_dir: PathBuf,
    period_ns: u64,
    park_duty: u8,
    released: bool,
}

impl PwmChipPwm {
    /// Export (if needed), program and enable `pwmchip{chip}/pwm{channel}`.
    pub async fn open(
        root: &Path,
        chip: u32,
        channel: u32,
        period_ns: u64,
        park_duty: u8,
    ) -> Result<Self, ActuatorError> {
        let id = format!("pwmchip{chip}/pwm{channel}");
        let chip_dir = root.join(format!("pwmchip{chip}"));
        let channel_dir = chip_dir.join(format!("pwm{channel}"));

        if !is_dir(&chip_dir).await {
            return Err(ActuatorError::ChannelNotFound {
                channel: id,
                path: chip_dir,
            });
        }

        if !is_dir(&channel_dir).await {
            let export = chip_dir.join("export");
            tokio::fs::write(&export, channel.to_string())
                .await
                .map_err(|e| ActuatorError::from_io(&id, export.clone(), e))?;
            if !wait_for_dir(&channel_dir).await {
                return Err(ActuatorError::ChannelNotFound {
                    channel: id,
                    path: channel_dir,
                });
            }
            log::debug!("Exported {id}");
        }

        let pwm = Self {
            id,
            channel_dir,
            period_ns,
            park_duty,
            released: false,
        };

        // duty_cycle must never exceed period, so zero it before reprogramming
        pwm.write_attr("duty_cycle", "0").await?;
        pwm.write_attr("period", &period_ns.to_string()).await?;
        pwm.write_attr("enable", "1").await?;

        log::info!("Acquired {} with period {period_ns} ns", pwm.id);
        Ok(pwm)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    async fn write_attr(&self, attr: &str, value: &str) -> Result<(), ActuatorError> {
        let path = self.channel_dir.join(attr);
        tokio::fs::write(&path, value)
            .await
            .map_err(|e| ActuatorError::from_io(&self.id, path, e))
    }
}

impl Actuator for PwmChipPwm {
    fn set_duty(&mut self, duty: u8) -> impl Future<Output = Result<(), ActuatorError>> + Send {
        let ns = duty_to_ns(duty, self.period_ns);
        async move { self.write_attr("duty_cycle", &ns.to_string()).await }
    }

    fn release(mut self) -> impl Future<Output = Result<(), ActuatorError>> + Send {
        async move {
            self.released = true;
            self.write_attr("enable", "0").await?;
            log::info!("Disabled {}", self.id);
            Ok(())
        }
    }
}

impl Drop for PwmChipPwm {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        log::warn!("{} dropped without release, parking at {}", self.id, self.park_duty);
        let ns = duty_to_ns(self.park_duty, self.period_ns);
        if let Err(e) = fs::write(self.channel_dir.join("duty_cycle"), ns.to_string()) {
            log::error!("Failed to park {}: {e}", self.id);
        }
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir())
}

/// Poll until `dir` exists or the export settle timeout passes.
async fn wait_for_dir(dir: &Path) -> bool {
    let deadline = tokio::time::Instant::now() + EXPORT_SETTLE_TIMEOUT;
    loop {
        if is_dir(dir).await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(EXPORT_POLL).await;
    }
}
