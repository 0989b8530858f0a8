pub mod autodetect;
pub mod mav;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod transport;
mod wire;

pub use transport::{CommandTarget, MavTransport, MessageKind, TransportError};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct FcConfig {
    /// Any mavlink address, e.g. "udpin:0.0.0.0:14550" (SITL) or "tcpout:127.0.0.1:5760".
    /// Takes precedence over the serial settings below.
    pub url: Option<String>,

    /// If true, navlink will probe candidate serial ports/bauds and pick the first
    /// that yields MAVLink HEARTBEAT.
    #[serde(default)]
    pub autodetect: bool,

    /// When autodetect=false: fixed port config
    pub serial_dev: Option<String>,
    pub baud: Option<u32>,

    /// Autodetect candidates (paths). Example:
    /// ["/dev/serial0","/dev/ttyAMA0","/dev/ttyS0","/dev/ttyUSB0","/dev/ttyACM0"]
    pub candidate_devs: Option<Vec<String>>,

    /// Autodetect candidate baud rates (common ArduPilot telemetry values).
    pub candidate_bauds: Option<Vec<u32>>,

    /// Heartbeat wait per probe attempt
    pub heartbeat_timeout_ms: Option<u64>,

    /// MAVLink ids we send as (ground station side)
    #[serde(default = "default_sys_id")]
    pub sys_id: u8,
    #[serde(default)]
    pub comp_id: u8,
}

fn default_sys_id() -> u8 {
    255
}
