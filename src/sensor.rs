// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Temperature sources.
//!
//! A source produces one reading per call. A failed read is an ordinary
//! outcome that the control loop skips over, so every failure is returned
//! as a [`SensorError`] rather than escalated.

use crate::error::SensorError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

/// Default CPU temperature file on Raspberry Pi and most ARM boards.
pub const DEFAULT_TEMP_PATH: &str = "/sys/class/thermal/thermal_zone0/temp";

pub const THERMAL_ROOT: &str = "/sys/class/thermal";

/// Unit of the raw value exposed by a temperature file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TempScale {
    /// Thousandths of a degree, as used by thermal zones and hwmon.
    #[default]
    Millidegrees,
    /// Whole degrees Celsius.
    Degrees,
}

/// Anything that can be sampled for a temperature in degrees Celsius.
pub trait TemperatureSource {
    fn read(&mut self) -> impl Future<Output = Result<f64, SensorError>> + Send;
}

/// A sysfs-style file holding a single numeric temperature value.
#[derive(Debug, Clone)]
pub struct SysfsTemperature {
    path: PathBuf,
    scale: TempScale,
}

impl SysfsTemperature {
    pub fn new(path: impl Into<PathBuf>, scale: TempScale) -> Self {
        Self {
            path: path.into(),
            scale,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TemperatureSource for SysfsTemperature {
    fn read(&mut self) -> impl Future<Output = Result<f64, SensorError>> + Send {
        let path = self.path.clone();
        let scale = self.scale;
        async move {
            let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    SensorError::Missing(path.clone())
                } else {
                    SensorError::Io(e)
                }
            })?;
            parse_reading(&raw, scale)
        }
    }
}

/// A kernel thermal zone, e.g. `thermal_zone0` of type `cpu-thermal`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermalZone {
    pub name: String,
    pub kind: Option<String>,
    /// Absolute path to the zone's `temp` file (millidegrees)
    pub temp_path: PathBuf,
}

/// List every `thermal_zoneN` below `root` that exposes a `temp` file.
pub fn discover_thermal_zones(root: &Path) -> io::Result<Vec<ThermalZone>> {
    let mut zones = Vec::new();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        let temp_path = entry.path().join("temp");
        if !name.starts_with("thermal_zone") || !temp_path.exists() {
            continue;
        }
        let kind = fs::read_to_string(entry.path().join("type"))
            .ok()
            .map(|s| s.trim().to_string());
        zones.push(ThermalZone {
            name,
            kind,
            temp_path,
        });
    }

    zones.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(zones)
}

/// Convert the raw text of a temperature file into degrees Celsius.
pub fn parse_reading(raw: &str, scale: TempScale) -> Result<f64, SensorError> {
    let trimmed = raw.trim();
    let value: f64 = trimmed.parse().map_err(|_| SensorError::Parse {
        raw: trimmed.to_string(),
    })?;
    if !value.is_finite() {
        return Err(SensorError::NotFinite);
    }

    Ok(match scale {
        TempScale::Millidegrees => value / 1000.0,
        TempScale::Degrees => value,
    })
}
