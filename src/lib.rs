// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Temperature-driven PWM fan control for Linux.
//!
//! A [`controller::Controller`] samples a [`sensor::TemperatureSource`],
//! maps the reading through a [`curve::LinearCurve`] and drives an
//! [`actuator::Actuator`], with hysteresis to keep the fan from hunting.
//! The `pwm-fand` binary wires these to sysfs and to process signals.

pub mod actuator;
pub mod config;
pub mod controller;
pub mod curve;
pub mod error;
pub mod gpio;
pub mod hwmon;
pub mod pwmchip;
pub mod sensor;
