use mavlink::common::MavMessage;
use navlink_fc::{MavTransport, MessageKind};
use navlink_proto::telemetry::{Attitude, PositionNed, Snapshot};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, error};

use crate::error::{period, ConfigError, FuseError};

const TELEMETRY_KINDS: [MessageKind; 2] = [MessageKind::LocalPositionNed, MessageKind::Attitude];

/// Sleep between empty non-blocking polls.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Sampling window per snapshot, seconds
    pub period_s: f64,
}

/// Merges LOCAL_POSITION_NED and ATTITUDE seen during one sampling window into a [`Snapshot`].
pub struct TelemetryFuser<T> {
    transport: T,
    window: Duration,
}

impl<T: MavTransport> TelemetryFuser<T> {
    pub fn new(transport: T, window: Duration) -> Result<Self, ConfigError> {
        if window.is_zero() {
            return Err(ConfigError::InvalidPeriod { name: "telemetry window", value: 0.0 });
        }
        Ok(Self { transport, window })
    }

    pub fn from_config(transport: T, cfg: &TelemetryConfig) -> Result<Self, ConfigError> {
        Self::new(transport, period("telemetry.period_s", cfg.period_s)?)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Drain the link for one window and fuse the latest message of each kind.
    ///
    /// `time_since_boot` is the timestamp of the last message observed, whatever
    /// its kind; it stays `Some(0)` when the window was silent.
    pub fn run(&mut self) -> Result<Snapshot, FuseError> {
        let start = Instant::now();
        let mut position = None;
        let mut attitude = None;
        let mut latest_ms = 0u32;

        while start.elapsed() < self.window {
            let msg = match self.transport.recv_match(&TELEMETRY_KINDS, None) {
                Ok(Some(msg)) => msg,
                Ok(None) => {
                    std::thread::sleep(POLL_INTERVAL);
                    continue;
                }
                Err(e) => {
                    error!("telemetry: failed to receive mavlink message: {}", e);
                    return Err(e.into());
                }
            };

            match msg {
                MavMessage::LOCAL_POSITION_NED(p) => {
                    latest_ms = p.time_boot_ms;
                    position = Some(PositionNed { x: p.x, y: p.y, z: p.z, vx: p.vx, vy: p.vy, vz: p.vz });
                }
                MavMessage::ATTITUDE(a) => {
                    latest_ms = a.time_boot_ms;
                    attitude = Some(Attitude {
                        roll: a.roll,
                        pitch: a.pitch,
                        yaw: a.yaw,
                        rollspeed: a.rollspeed,
                        pitchspeed: a.pitchspeed,
                        yawspeed: a.yawspeed,
                    });
                }
                _ => {}
            }
        }

        let snap = Snapshot { time_since_boot: Some(latest_ms), position, attitude };
        debug!("telemetry: {:?}", snap);
        Ok(snap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{attitude_msg, heartbeat_msg, position_msg};
    use navlink_fc::mock::MockTransport;
    use navlink_fc::TransportError;

    const WINDOW: Duration = Duration::from_millis(20);

    #[test]
    fn rejects_zero_window() {
        assert!(TelemetryFuser::new(MockTransport::new(), Duration::ZERO).is_err());
        let cfg = TelemetryConfig { period_s: -0.5 };
        assert!(TelemetryFuser::from_config(MockTransport::new(), &cfg).is_err());
    }

    #[test]
    fn silent_window_yields_empty_snapshot() {
        let mut fuser = TelemetryFuser::new(MockTransport::new(), WINDOW).unwrap();
        let snap = fuser.run().unwrap();
        assert!(snap.is_empty());
        assert_eq!(snap.time_since_boot, Some(0));
    }

    #[test]
    fn same_position_twice_without_attitude() {
        let mock = MockTransport::new();
        mock.push(position_msg(1500, 1.0, 2.0, -3.0));
        mock.push(position_msg(1500, 1.0, 2.0, -3.0));
        let mut fuser = TelemetryFuser::new(mock.clone(), WINDOW).unwrap();

        let snap = fuser.run().unwrap();
        assert_eq!(snap.time_since_boot, Some(1500));
        assert_eq!(snap.z(), Some(-3.0));
        assert_eq!(snap.velocity(), Some((0.5, -0.5, 0.0)));
        assert!(snap.attitude.is_none());
        assert_eq!(mock.pending(), 0);
    }

    #[test]
    fn last_write_wins_per_kind_and_latest_arrival_stamps() {
        let mock = MockTransport::new();
        mock.push(position_msg(100, 1.0, 1.0, 1.0));
        mock.push(attitude_msg(150, 0.3));
        mock.push(heartbeat_msg());
        mock.push(position_msg(200, 2.0, 2.0, 2.0));
        mock.push(attitude_msg(250, 0.6));
        let mut fuser = TelemetryFuser::new(mock, WINDOW).unwrap();

        let snap = fuser.run().unwrap();
        assert_eq!(snap.time_since_boot, Some(250));
        assert_eq!(snap.x(), Some(2.0));
        assert_eq!(snap.yaw(), Some(0.6));
    }

    #[test]
    fn timestamp_follows_arrival_order_not_magnitude() {
        let mock = MockTransport::new();
        mock.push(attitude_msg(900, 0.0));
        mock.push(position_msg(800, 0.0, 0.0, 0.0));
        let mut fuser = TelemetryFuser::new(mock, WINDOW).unwrap();

        assert_eq!(fuser.run().unwrap().time_since_boot, Some(800));
    }

    #[test]
    fn read_error_aborts_pass() {
        let mock = MockTransport::new();
        mock.push(position_msg(100, 1.0, 1.0, 1.0));
        mock.push_error(TransportError::Recv("crc".into()));
        let mut fuser = TelemetryFuser::new(mock.clone(), WINDOW).unwrap();

        let err = fuser.run().unwrap_err();
        assert_eq!(err, FuseError::Transport(TransportError::Recv("crc".into())));

        // next pass starts fresh
        let snap = fuser.run().unwrap();
        assert!(snap.is_empty());
    }

    #[test]
    fn pass_lasts_about_one_window() {
        let mut fuser = TelemetryFuser::new(MockTransport::new(), WINDOW).unwrap();
        let start = Instant::now();
        fuser.run().unwrap();
        assert!(start.elapsed() >= WINDOW);
    }
}
