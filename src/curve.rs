// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Temperature to duty-cycle mapping.
//!
//! The fan is held at `duty_min` up to `temp_off`, at `duty_max` from
//! `temp_full` upwards, and linearly interpolated in between. Interpolated
//! values are rounded half away from zero.

use crate::error::ConfigError;

/// A two-point linear fan curve with saturation at both ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearCurve {
    temp_off: f64,
    temp_full: f64,
    duty_min: u8,
    duty_max: u8,
}

impl LinearCurve {
    /// Build a curve, rejecting inverted or degenerate ranges.
    pub fn new(temp_off: f64, temp_full: f64, duty_min: u8, duty_max: u8) -> Result<Self, ConfigError> {
        for (field, value) in [("temp_off", temp_off), ("temp_full", temp_full)] {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { field, value });
            }
        }
        if temp_full <= temp_off {
            return Err(ConfigError::TempRange { temp_off, temp_full });
        }
        if duty_min > duty_max {
            return Err(ConfigError::DutyRange { duty_min, duty_max });
        }

        Ok(Self {
            temp_off,
            temp_full,
            duty_min,
            duty_max,
        })
    }

    pub fn temp_off(&self) -> f64 {
        self.temp_off
    }

    pub fn temp_full(&self) -> f64 {
        self.temp_full
    }

    pub fn duty_min(&self) -> u8 {
        self.duty_min
    }

    pub fn duty_max(&self) -> u8 {
        self.duty_max
    }

    /// Duty cycle for a temperature in degrees Celsius.
    ///
    /// A NaN reading maps to `duty_max`.
    pub fn duty_for(&self, temp_c: f64) -> u8 {
        if temp_c.is_nan() {
            return self.duty_max;
        }
        if temp_c <= self.temp_off {
            return self.duty_min;
        }
        if temp_c >= self.temp_full {
            return self.duty_max;
        }

        let span_t = self.temp_full - self.temp_off;
        let span_d = f64::from(self.duty_max - self.duty_min);
        let offset = ((temp_c - self.temp_off) * span_d / span_t).round();
        let duty = f64::from(self.duty_min) + offset;

        duty.clamp(f64::from(self.duty_min), f64::from(self.duty_max)) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn reference_curve() -> LinearCurve {
        LinearCurve::new(45.0, 65.0, 0, 255).unwrap()
    }

    #[test_case(45.0 => 0 ; "at temp_off")]
    #[test_case(65.0 => 255 ; "at temp_full")]
    #[test_case(55.0 => 128 ; "midpoint rounds half away from zero")]
    #[test_case(50.0 => 64 ; "quarter point")]
    #[test_case(60.0 => 191 ; "three quarter point")]
    #[test_case(-20.0 => 0 ; "far below range")]
    #[test_case(110.0 => 255 ; "far above range")]
    fn test_reference_points(temp: f64) -> u8 {
        reference_curve().duty_for(temp)
    }

    #[test]
    fn test_tie_rounds_up() {
        // 1°C over a 2°C span of 1 duty step is exactly 0.5
        let curve = LinearCurve::new(40.0, 42.0, 10, 11).unwrap();
        assert_eq!(curve.duty_for(41.0), 11);
        assert_eq!(curve.duty_for(40.99), 10);
    }

    #[test]
    fn test_offset_duty_range() {
        let curve = LinearCurve::new(35.0, 65.0, 60, 200).unwrap();
        assert_eq!(curve.duty_for(20.0), 60);
        assert_eq!(curve.duty_for(50.0), 130);
        assert_eq!(curve.duty_for(80.0), 200);
    }

    #[test]
    fn test_flat_duty_range() {
        let curve = LinearCurve::new(35.0, 65.0, 90, 90).unwrap();
        for t in [0.0, 35.0, 50.0, 65.0, 99.0] {
            assert_eq!(curve.duty_for(t), 90);
        }
    }

    #[test]
    fn test_monotonic_over_domain() {
        let curve = reference_curve();
        let mut prev = curve.duty_for(0.0);
        let mut t = 0.0;
        while t <= 100.0 {
            let duty = curve.duty_for(t);
            assert!(duty >= prev, "duty dropped from {prev} to {duty} at {t}°C");
            prev = duty;
            t += 0.01;
        }
    }

    #[test]
    fn test_nan_runs_fan_at_max() {
        assert_eq!(reference_curve().duty_for(f64::NAN), 255);
    }

    #[test_case(65.0, 45.0, 0, 255 ; "inverted temperatures")]
    #[test_case(50.0, 50.0, 0, 255 ; "equal temperatures")]
    #[test_case(45.0, 65.0, 200, 100 ; "inverted duty range")]
    #[test_case(f64::NAN, 65.0, 0, 255 ; "nan threshold")]
    #[test_case(45.0, f64::INFINITY, 0, 255 ; "infinite threshold")]
    fn test_rejects_invalid(temp_off: f64, temp_full: f64, duty_min: u8, duty_max: u8) {
        assert!(LinearCurve::new(temp_off, temp_full, duty_min, duty_max).is_err());
    }
}
