// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! pwm-fand: system service that samples CPU temperature and drives a
//! single PWM fan output until it is told to stop.

use anyhow::{Context, bail};
use clap::Parser;
use nix::unistd::Uid;
use pwm_fan_control::actuator::PwmOutput;
use pwm_fan_control::config::{self, Settings};
use pwm_fan_control::controller::{Controller, StopReason};
use pwm_fan_control::hwmon;
use pwm_fan_control::pwmchip;
use pwm_fan_control::sensor::{self, SysfsTemperature, TemperatureSource};
use std::path::{Path, PathBuf};
use tokio::signal::unix::{SignalKind, signal};
use tokio::time;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "pwm-fand", about = "Temperature-driven PWM fan controller")]
struct Cli {
    /// Path to the configuration file (.toml, or legacy .json).
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the output channel, e.g. "pwmchip0/pwm0", "hwmon3/pwm1" or "gpio15".
    #[arg(long)]
    channel: Option<String>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long)]
    verbose: bool,

    /// List PWM outputs and temperature sensors on this machine, then exit.
    #[arg(long)]
    list_outputs: bool,

    /// Write the effective configuration to the config path, then exit.
    #[arg(long)]
    write_config: bool,

    /// Validate the configuration and show the duty for the current
    /// temperature without touching the fan.
    #[arg(long)]
    check: bool,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    if cli.list_outputs {
        list_outputs();
        return Ok(());
    }

    let mut cfg = config::load_config(&cli.config)?;
    if let Some(channel) = cli.channel {
        cfg.output.channel = Some(channel);
    }

    if cli.write_config {
        config::save_config(&cli.config, &cfg)?;
        return Ok(());
    }

    let settings = cfg.validate().context("Invalid configuration")?;
    let source = SysfsTemperature::new(&settings.sensor_path, settings.sensor_scale);

    if cli.check {
        return check(&settings, source).await;
    }

    if !Uid::effective().is_root() {
        log::warn!("Not running as root, writes to {} may be refused", settings.channel);
    }

    // Install handlers before touching the output so a stop request is
    // never lost between acquisition and the first tick.
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let shutdown = async move {
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        log::info!("Signal received, shutting down");
    };

    let io_timeout = settings.control.io_timeout;
    let output = time::timeout(io_timeout, PwmOutput::connect(&settings.channel, settings.connect))
        .await
        .with_context(|| format!("Timed out acquiring {}", settings.channel))?
        .with_context(|| format!("Could not acquire {}", settings.channel))?;

    log::info!(
        "Controlling {} from {}: {:.1}°C -> {} .. {:.1}°C -> {}, every {:?}",
        output.id(),
        settings.sensor_path.display(),
        settings.control.curve.temp_off(),
        settings.control.curve.duty_min(),
        settings.control.curve.temp_full(),
        settings.control.curve.duty_max(),
        settings.control.poll_interval,
    );

    let mut controller = Controller::new(settings.control, source, output);
    let reason = controller
        .run(shutdown)
        .await
        .context("Could not bring the fan to a known state")?;

    match reason {
        StopReason::Requested => Ok(()),
        StopReason::ActuatorLost => bail!("Output {} disappeared", settings.channel),
    }
}

// ---------------------------------------------------------------------------
// One-shot modes
// ---------------------------------------------------------------------------

async fn check(settings: &Settings, mut source: SysfsTemperature) -> anyhow::Result<()> {
    let control = &settings.control;
    println!("output:      {}", settings.channel);
    println!("sensor:      {} ({:?})", source.path().display(), settings.sensor_scale);
    println!(
        "curve:       {:.1}°C -> {}, {:.1}°C -> {}",
        control.curve.temp_off(),
        control.curve.duty_min(),
        control.curve.temp_full(),
        control.curve.duty_max()
    );
    println!("hysteresis:  {:.1}°C", control.hysteresis_band);
    println!("interval:    {:?}", control.poll_interval);

    let temp = source
        .read()
        .await
        .with_context(|| format!("Could not read {}", source.path().display()))?;
    println!("temperature: {temp:.1}°C -> duty {}", control.curve.duty_for(temp));
    Ok(())
}

fn list_outputs() {
    let hwmon_root = Path::new(hwmon::HWMON_ROOT);

    println!("PWM outputs:");
    match pwmchip::discover_outputs(Path::new(pwmchip::PWM_ROOT)) {
        Ok(outputs) => {
            for out in outputs {
                let state = if out.exported { "exported" } else { "not exported" };
                println!("  {:<20} {state}", out.id);
            }
        }
        Err(e) => log::warn!("Failed to scan {}: {e}", pwmchip::PWM_ROOT),
    }
    match hwmon::discover_outputs(hwmon_root) {
        Ok(outputs) => {
            for out in outputs {
                let label = out.label.as_deref().unwrap_or("-");
                println!("  {:<20} {} ({label})", out.id, out.driver);
            }
        }
        Err(e) => log::warn!("Failed to scan {}: {e}", hwmon::HWMON_ROOT),
    }

    println!("Temperature sensors:");
    match sensor::discover_thermal_zones(Path::new(sensor::THERMAL_ROOT)) {
        Ok(zones) => {
            for zone in zones {
                let kind = zone.kind.as_deref().unwrap_or("-");
                println!("  {:<40} {kind}", zone.temp_path.display());
            }
        }
        Err(e) => log::warn!("Failed to scan {}: {e}", sensor::THERMAL_ROOT),
    }
    match hwmon::discover_temps(hwmon_root) {
        Ok(temps) => {
            for t in temps {
                let label = t.label.as_deref().unwrap_or("-");
                println!("  {:<40} {} ({label})", t.input_path.display(), t.driver);
            }
        }
        Err(e) => log::warn!("Failed to scan {}: {e}", hwmon::HWMON_ROOT),
    }
}
