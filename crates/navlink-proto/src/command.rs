use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Fixed navigation target in the local NED frame (meters).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Target {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// The single corrective action decided for one snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandOutput {
    NoAction,
    /// target.z - current z, meters
    AltitudeChange(f64),
    /// signed relative yaw, degrees in (-180, 180]
    YawChange(f64),
}

impl fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // {:?} keeps the trailing ".0" on whole numbers
        match self {
            CommandOutput::NoAction => f.write_str("NO ACTION"),
            CommandOutput::AltitudeChange(dz) => write!(f, "CHANGE_ALTITUDE: {:?}", dz),
            CommandOutput::YawChange(deg) => write!(f, "CHANGING_YAW: {:?}", deg),
        }
    }
}

impl Serialize for CommandOutput {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}
