use mavlink::common::{
    MavAutopilot, MavMessage, MavModeFlag, MavState, MavType, ATTITUDE_DATA, HEARTBEAT_DATA,
    LOCAL_POSITION_NED_DATA,
};
use navlink_proto::telemetry::{Attitude, PositionNed, Snapshot};

pub fn position_msg(time_boot_ms: u32, x: f32, y: f32, z: f32) -> MavMessage {
    MavMessage::LOCAL_POSITION_NED(LOCAL_POSITION_NED_DATA {
        time_boot_ms,
        x,
        y,
        z,
        vx: 0.5,
        vy: -0.5,
        vz: 0.0,
    })
}

pub fn attitude_msg(time_boot_ms: u32, yaw: f32) -> MavMessage {
    MavMessage::ATTITUDE(ATTITUDE_DATA {
        time_boot_ms,
        roll: 0.01,
        pitch: -0.02,
        yaw,
        rollspeed: 0.0,
        pitchspeed: 0.0,
        yawspeed: 0.1,
    })
}

pub fn heartbeat_msg() -> MavMessage {
    MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_QUADROTOR,
        autopilot: MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA,
        base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
        system_status: MavState::MAV_STATE_ACTIVE,
        mavlink_version: 3,
    })
}

/// Snapshot at (x, y, z) with zero velocity, facing `yaw` radians.
pub fn snapshot(x: f32, y: f32, z: f32, yaw: f32) -> Snapshot {
    Snapshot {
        time_since_boot: Some(1000),
        position: Some(PositionNed { x, y, z, vx: 0.0, vy: 0.0, vz: 0.0 }),
        attitude: Some(Attitude {
            roll: 0.0,
            pitch: 0.0,
            yaw,
            rollspeed: 0.0,
            pitchspeed: 0.0,
            yawspeed: 0.0,
        }),
    }
}
