use mavlink::common::MavCmd;
use navlink_fc::{CommandTarget, MavTransport};
use navlink_proto::command::{CommandOutput, Target};
use navlink_proto::telemetry::Snapshot;
use serde::Deserialize;
use tracing::{error, info};

use crate::error::{ConfigError, EngineError};

pub const ALTITUDE_TOLERANCE_M: f64 = 0.5;
pub const YAW_TOLERANCE_DEG: f64 = 5.0;

#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    pub target: Target,
    /// Climb/descend rate sent with MAV_CMD_CONDITION_CHANGE_ALT, m/s
    #[serde(default = "default_altitude_rate")]
    pub altitude_rate_mps: f32,
    /// Turn rate sent with MAV_CMD_CONDITION_YAW, deg/s
    #[serde(default = "default_yaw_rate")]
    pub yaw_rate_dps: f32,
    #[serde(default = "default_target_sys")]
    pub target_sys: u8,
    #[serde(default)]
    pub target_comp: u8,
}

fn default_altitude_rate() -> f32 {
    1.0
}

fn default_yaw_rate() -> f32 {
    5.0
}

fn default_target_sys() -> u8 {
    1
}

impl CommandConfig {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            altitude_rate_mps: default_altitude_rate(),
            yaw_rate_dps: default_yaw_rate(),
            target_sys: default_target_sys(),
            target_comp: 0,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.target;
        if !(t.x.is_finite() && t.y.is_finite() && t.z.is_finite()) {
            return Err(ConfigError::InvalidTarget);
        }
        for (name, value) in [
            ("command.altitude_rate_mps", self.altitude_rate_mps),
            ("command.yaw_rate_dps", self.yaw_rate_dps),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidRate { name, value });
            }
        }
        Ok(())
    }
}

/// Running sum of velocity samples, for the operator log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct VelocityStats {
    sum: [f64; 3],
    samples: u64,
}

impl VelocityStats {
    pub fn add(&mut self, (vx, vy, vz): (f32, f32, f32)) {
        self.sum[0] += vx as f64;
        self.sum[1] += vy as f64;
        self.sum[2] += vz as f64;
        self.samples += 1;
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn mean(&self) -> Option<[f64; 3]> {
        if self.samples == 0 {
            return None;
        }
        let n = self.samples as f64;
        Some([self.sum[0] / n, self.sum[1] / n, self.sum[2] / n])
    }
}

/// Bearing from (x, y) to the target in the local frame, radians, counter-clockwise from +x.
pub fn bearing_rad(x: f64, y: f64, target: &Target) -> f64 {
    (target.y - y).atan2(target.x - x)
}

/// Wrap an angle in radians into (-pi, pi].
pub fn wrap_pi(angle: f64) -> f64 {
    let w = angle.sin().atan2(angle.cos());
    if w <= -std::f64::consts::PI {
        w + 2.0 * std::f64::consts::PI
    } else {
        w
    }
}

/// Turns one snapshot into at most one corrective command toward a fixed target.
///
/// Altitude is corrected first; heading is only considered once altitude is
/// within [`ALTITUDE_TOLERANCE_M`], so a single command is in flight per cycle.
pub struct CommandEngine<T> {
    transport: T,
    target: Target,
    addr: CommandTarget,
    altitude_rate_mps: f32,
    yaw_rate_dps: f32,
    velocity: VelocityStats,
}

impl<T: MavTransport> CommandEngine<T> {
    pub fn new(transport: T, cfg: &CommandConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            transport,
            target: cfg.target,
            addr: CommandTarget { system: cfg.target_sys, component: cfg.target_comp },
            altitude_rate_mps: cfg.altitude_rate_mps,
            yaw_rate_dps: cfg.yaw_rate_dps,
            velocity: VelocityStats::default(),
        })
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn velocity_stats(&self) -> &VelocityStats {
        &self.velocity
    }

    pub fn run(&mut self, snap: &Snapshot) -> Result<CommandOutput, EngineError> {
        let Some(vel) = snap.velocity() else {
            error!("command: telemetry missing velocity data");
            return Err(EngineError::MissingData("velocity"));
        };

        self.velocity.add(vel);
        if let Some([vx, vy, vz]) = self.velocity.mean() {
            info!(
                "command: average velocity x={:.2} y={:.2} z={:.2} (n={})",
                vx,
                vy,
                vz,
                self.velocity.samples()
            );
        }

        let Some(z) = snap.z() else {
            error!("command: telemetry missing altitude data");
            return Err(EngineError::MissingData("altitude"));
        };

        let delta_z = self.target.z - z as f64;
        if delta_z.abs() > ALTITUDE_TOLERANCE_M {
            let params = [self.altitude_rate_mps, 0.0, 0.0, 0.0, 0.0, 0.0, self.target.z as f32];
            if let Err(e) =
                self.transport.send_command(self.addr, MavCmd::MAV_CMD_CONDITION_CHANGE_ALT, params)
            {
                error!("command: failed to send altitude command: {}", e);
                return Err(e.into());
            }
            info!("command: altitude change {:.2} m toward z={:.2}", delta_z, self.target.z);
            return Ok(CommandOutput::AltitudeChange(delta_z));
        }

        let (Some(x), Some(y), Some(yaw)) = (snap.x(), snap.y(), snap.yaw()) else {
            error!("command: telemetry missing position or yaw data");
            return Err(EngineError::MissingData("position or yaw"));
        };

        let desired = bearing_rad(x as f64, y as f64, &self.target);
        let yaw_diff = wrap_pi(desired - yaw as f64).to_degrees();

        if yaw_diff.abs() > YAW_TOLERANCE_DEG {
            // param4 = 1: relative to current heading
            let params = [yaw_diff as f32, self.yaw_rate_dps, 0.0, 1.0, 0.0, 0.0, 0.0];
            if let Err(e) = self.transport.send_command(self.addr, MavCmd::MAV_CMD_CONDITION_YAW, params) {
                error!("command: failed to send yaw command: {}", e);
                return Err(e.into());
            }
            info!("command: yaw change {:.1} deg (bearing {:.1} deg)", yaw_diff, desired.to_degrees());
            return Ok(CommandOutput::YawChange(yaw_diff));
        }

        Ok(CommandOutput::NoAction)
    }
}
