use std::time::Duration;

use mavlink::common::{MavCmd, MavMessage, COMMAND_LONG_DATA};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("mavlink send failed: {0}")]
    Send(String),
    #[error("mavlink receive failed: {0}")]
    Recv(String),
    #[error("mavlink link closed")]
    Closed,
}

/// Message types the pipeline reads. Everything else is dropped at the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Heartbeat,
    LocalPositionNed,
    Attitude,
}

impl MessageKind {
    pub fn of(msg: &MavMessage) -> Option<Self> {
        match msg {
            MavMessage::HEARTBEAT(_) => Some(MessageKind::Heartbeat),
            MavMessage::LOCAL_POSITION_NED(_) => Some(MessageKind::LocalPositionNed),
            MavMessage::ATTITUDE(_) => Some(MessageKind::Attitude),
            _ => None,
        }
    }

    pub fn matches(msg: &MavMessage, kinds: &[MessageKind]) -> bool {
        MessageKind::of(msg).map(|k| kinds.contains(&k)).unwrap_or(false)
    }
}

/// Addressee of a COMMAND_LONG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTarget {
    pub system: u8,
    pub component: u8,
}

impl Default for CommandTarget {
    fn default() -> Self {
        Self { system: 1, component: 0 }
    }
}

/// Send/receive capability of a MAVLink link.
pub trait MavTransport: Send {
    fn send(&mut self, msg: &MavMessage) -> Result<(), TransportError>;

    /// Next message whose kind is in `kinds`; non-matching messages are discarded.
    /// `timeout = None` polls without blocking, `Some(t)` waits up to `t`.
    /// `Ok(None)` means nothing matching arrived in time.
    fn recv_match(
        &mut self,
        kinds: &[MessageKind],
        timeout: Option<Duration>,
    ) -> Result<Option<MavMessage>, TransportError>;

    fn send_command(
        &mut self,
        target: CommandTarget,
        command: MavCmd,
        params: [f32; 7],
    ) -> Result<(), TransportError> {
        let cmd = COMMAND_LONG_DATA {
            target_system: target.system,
            target_component: target.component,
            command: command.into(),
            confirmation: 0,
            param1: params[0],
            param2: params[1],
            param3: params[2],
            param4: params[3],
            param5: params[4],
            param6: params[5],
            param7: params[6],
        };
        self.send(&MavMessage::COMMAND_LONG(cmd))
    }
}

impl<T: MavTransport + ?Sized> MavTransport for Box<T> {
    fn send(&mut self, msg: &MavMessage) -> Result<(), TransportError> {
        (**self).send(msg)
    }

    fn recv_match(
        &mut self,
        kinds: &[MessageKind],
        timeout: Option<Duration>,
    ) -> Result<Option<MavMessage>, TransportError> {
        (**self).recv_match(kinds, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavlink::common::{ATTITUDE_DATA, SYSTEM_TIME_DATA};

    #[test]
    fn kind_of_known_and_unknown_messages() {
        let att = MavMessage::ATTITUDE(ATTITUDE_DATA {
            time_boot_ms: 10,
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
            rollspeed: 0.0,
            pitchspeed: 0.0,
            yawspeed: 0.0,
        });
        assert_eq!(MessageKind::of(&att), Some(MessageKind::Attitude));
        assert!(MessageKind::matches(&att, &[MessageKind::LocalPositionNed, MessageKind::Attitude]));
        assert!(!MessageKind::matches(&att, &[MessageKind::Heartbeat]));

        let other = MavMessage::SYSTEM_TIME(SYSTEM_TIME_DATA { time_unix_usec: 0, time_boot_ms: 10 });
        assert_eq!(MessageKind::of(&other), None);
    }
}
