use anyhow::Result;

use crate::command::CommandConfig;
use crate::heartbeat::HeartbeatConfig;
use crate::telemetry::TelemetryConfig;

pub fn check_telemetry(cfg: &TelemetryConfig) -> Result<()> {
    anyhow::ensure!(cfg.period_s.is_finite() && cfg.period_s > 0.0, "telemetry.period_s must be > 0");
    anyhow::ensure!(cfg.period_s <= 10.0, "telemetry.period_s should be <= 10s");
    Ok(())
}

pub fn check_heartbeat(cfg: &HeartbeatConfig) -> Result<()> {
    anyhow::ensure!(cfg.period_s.is_finite() && cfg.period_s > 0.0, "heartbeat.period_s must be > 0");
    anyhow::ensure!(cfg.disconnect_periods >= 1, "heartbeat.disconnect_periods must be >= 1");
    // MAVLink peers expect 1Hz; a long gap looks like a dead link to the vehicle too
    anyhow::ensure!(cfg.period_s <= 5.0, "heartbeat.period_s should be <= 5s");
    Ok(())
}

pub fn check_command(cfg: &CommandConfig) -> Result<()> {
    cfg.validate()?;
    anyhow::ensure!(cfg.yaw_rate_dps <= 90.0, "command.yaw_rate_dps too high (max 90)");
    anyhow::ensure!(
        cfg.altitude_rate_mps >= 0.1 && cfg.altitude_rate_mps <= 10.0,
        "command.altitude_rate_mps out of range (0.1..10)"
    );
    Ok(())
}

pub fn check_queue_capacity(capacity: usize) -> Result<()> {
    anyhow::ensure!(capacity >= 1, "workers.queue_capacity must be >= 1");
    Ok(())
}
