use serde::{Deserialize, Serialize};

/// Local NED position and velocity, taken together from one LOCAL_POSITION_NED.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionNed {
    pub x: f32,  // m
    pub y: f32,  // m
    pub z: f32,  // m
    pub vx: f32, // m/s
    pub vy: f32, // m/s
    pub vz: f32, // m/s
}

/// Attitude and body rates, taken together from one ATTITUDE.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attitude {
    pub roll: f32,       // rad
    pub pitch: f32,      // rad
    pub yaw: f32,        // rad
    pub rollspeed: f32,  // rad/s
    pub pitchspeed: f32, // rad/s
    pub yawspeed: f32,   // rad/s
}

/// One fused telemetry reading. Each source group is either fully present or absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub time_since_boot: Option<u32>, // ms
    pub position: Option<PositionNed>,
    pub attitude: Option<Attitude>,
}

impl Snapshot {
    /// True when no message contributed to this snapshot.
    pub fn is_empty(&self) -> bool {
        self.position.is_none() && self.attitude.is_none()
    }

    pub fn x(&self) -> Option<f32> {
        self.position.map(|p| p.x)
    }

    pub fn y(&self) -> Option<f32> {
        self.position.map(|p| p.y)
    }

    pub fn z(&self) -> Option<f32> {
        self.position.map(|p| p.z)
    }

    /// (vx, vy, vz) in m/s
    pub fn velocity(&self) -> Option<(f32, f32, f32)> {
        self.position.map(|p| (p.vx, p.vy, p.vz))
    }

    pub fn yaw(&self) -> Option<f32> {
        self.attitude.map(|a| a.yaw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_is_empty() {
        let s = Snapshot::default();
        assert!(s.is_empty());
        assert_eq!(s.time_since_boot, None);
        assert_eq!(s.velocity(), None);
        assert_eq!(s.yaw(), None);
    }

    #[test]
    fn accessors_follow_source_groups() {
        let s = Snapshot {
            time_since_boot: Some(1200),
            position: Some(PositionNed { x: 1.0, y: 2.0, z: -3.0, vx: 0.5, vy: 0.0, vz: -0.1 }),
            attitude: None,
        };
        assert!(!s.is_empty());
        assert_eq!(s.z(), Some(-3.0));
        assert_eq!(s.velocity(), Some((0.5, 0.0, -0.1)));
        assert_eq!(s.yaw(), None);
    }
}
