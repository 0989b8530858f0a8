use mavlink::common::{MavAutopilot, MavMessage, MavModeFlag, MavState, MavType, HEARTBEAT_DATA};
use navlink_fc::{MavTransport, MessageKind, TransportError};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{period, ConfigError};

#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatConfig {
    /// Expected heartbeat interval, seconds. Also the send interval of our own heartbeat.
    pub period_s: f64,
    /// Consecutive missed periods before the link is declared lost.
    pub disconnect_periods: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
}

/// Liveness of the vehicle link with hysteresis over missed heartbeats.
///
/// Starts `Disconnected`. One received heartbeat connects and clears the miss
/// counter; only `disconnect_period` consecutive misses disconnect again.
pub struct HeartbeatMonitor<T> {
    transport: T,
    period: Duration,
    disconnect_period: u32,
    missed: u32,
    state: LinkState,
}

impl<T: MavTransport> HeartbeatMonitor<T> {
    pub fn new(transport: T, period: Duration, disconnect_period: u32) -> Result<Self, ConfigError> {
        if period.is_zero() {
            return Err(ConfigError::InvalidPeriod { name: "heartbeat period", value: 0.0 });
        }
        if disconnect_period == 0 {
            return Err(ConfigError::ZeroDisconnectPeriod);
        }
        Ok(Self {
            transport,
            period,
            disconnect_period,
            missed: 0,
            state: LinkState::Disconnected,
        })
    }

    pub fn from_config(transport: T, cfg: &HeartbeatConfig) -> Result<Self, ConfigError> {
        Self::new(transport, period("heartbeat.period_s", cfg.period_s)?, cfg.disconnect_periods)
    }

    /// Wait up to one period for a heartbeat and return the connected verdict.
    ///
    /// Heartbeats already queued on the transport are drained first and count
    /// as a single reception, so a backlog never outlives a silent vehicle.
    /// A transport error reports `false` and leaves the counter and state alone.
    pub fn run(&mut self) -> bool {
        match self.poll() {
            Err(e) => {
                error!("heartbeat: failed to receive heartbeat: {}", e);
                return false;
            }
            Ok(true) => {
                debug!("heartbeat: received");
                self.missed = 0;
                if self.state == LinkState::Disconnected {
                    info!("heartbeat: connection established");
                    self.state = LinkState::Connected;
                }
            }
            Ok(false) => {
                self.missed = self.missed.saturating_add(1);
                match self.state {
                    LinkState::Connected => {
                        warn!("heartbeat: missed #{}", self.missed);
                        if self.missed >= self.disconnect_period {
                            error!("heartbeat: connection lost after {} missed periods", self.missed);
                            self.state = LinkState::Disconnected;
                        }
                    }
                    LinkState::Disconnected => debug!("heartbeat: missed #{}", self.missed),
                }
            }
        }
        self.state == LinkState::Connected
    }

    /// Whether a heartbeat arrived, queued or within one period.
    fn poll(&mut self) -> Result<bool, TransportError> {
        let mut backlog = 0u32;
        loop {
            match self.transport.recv_match(&[MessageKind::Heartbeat], None) {
                Ok(Some(_)) => backlog += 1,
                Ok(None) => break,
                // the backlog already proves liveness for this period
                Err(e) if backlog > 0 => {
                    warn!("heartbeat: receive failed after backlog: {}", e);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        if backlog > 0 {
            if backlog > 1 {
                debug!("heartbeat: drained {} queued heartbeats", backlog);
            }
            return Ok(true);
        }
        let got = self.transport.recv_match(&[MessageKind::Heartbeat], Some(self.period))?;
        Ok(got.is_some())
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn missed(&self) -> u32 {
        self.missed
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

/// Sends our own keep-alive so the vehicle sees a ground station.
pub struct HeartbeatEmitter<T> {
    transport: T,
}

impl<T: MavTransport> HeartbeatEmitter<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Send one heartbeat. Failures are logged and reported, never fatal.
    pub fn run(&mut self) -> bool {
        let hb = HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_GCS,
            autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
            base_mode: MavModeFlag::empty(),
            system_status: MavState::MAV_STATE_UNINIT,
            mavlink_version: 3,
        };
        match self.transport.send(&MavMessage::HEARTBEAT(hb)) {
            Ok(()) => {
                debug!("heartbeat: sent");
                true
            }
            Err(e) => {
                error!("heartbeat: failed to send heartbeat: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{heartbeat_msg, position_msg};
    use navlink_fc::mock::MockTransport;

    const PERIOD: Duration = Duration::from_millis(10);

    fn monitor(disconnect_period: u32) -> (MockTransport, HeartbeatMonitor<MockTransport>) {
        let mock = MockTransport::new();
        let mon = HeartbeatMonitor::new(mock.clone(), PERIOD, disconnect_period).unwrap();
        (mock, mon)
    }

    #[test]
    fn rejects_bad_config() {
        assert_eq!(
            HeartbeatMonitor::new(MockTransport::new(), PERIOD, 0).err(),
            Some(ConfigError::ZeroDisconnectPeriod)
        );
        assert!(HeartbeatMonitor::new(MockTransport::new(), Duration::ZERO, 3).is_err());
        let cfg = HeartbeatConfig { period_s: f64::NAN, disconnect_periods: 3 };
        assert!(HeartbeatMonitor::from_config(MockTransport::new(), &cfg).is_err());
    }

    #[test]
    fn starts_disconnected_until_first_heartbeat() {
        let (mock, mut mon) = monitor(3);
        assert_eq!(mon.state(), LinkState::Disconnected);
        assert!(!mon.run());

        mock.push(heartbeat_msg());
        assert!(mon.run());
        assert_eq!(mon.state(), LinkState::Connected);
        assert_eq!(mon.missed(), 0);
    }

    #[test]
    fn hysteresis_flips_on_threshold_miss() {
        let (mock, mut mon) = monitor(5);
        mock.push(heartbeat_msg());
        assert!(mon.run());

        for i in 1..5 {
            assert!(mon.run(), "still connected after {} misses", i);
        }
        assert_eq!(mon.missed(), 4);
        assert!(!mon.run());
        assert_eq!(mon.state(), LinkState::Disconnected);
        assert_eq!(mon.missed(), 5);

        // keeps reporting false while silent
        assert!(!mon.run());
    }

    #[test]
    fn single_heartbeat_resets_counter() {
        let (mock, mut mon) = monitor(3);
        mock.push(heartbeat_msg());
        mon.run();
        mon.run();
        mon.run();
        assert_eq!(mon.missed(), 2);

        mock.push(heartbeat_msg());
        assert!(mon.run());
        assert_eq!(mon.missed(), 0);

        // lost, then recovered by one heartbeat
        for _ in 0..3 {
            mon.run();
        }
        assert_eq!(mon.state(), LinkState::Disconnected);
        mock.push(heartbeat_msg());
        assert!(mon.run());
        assert_eq!(mon.state(), LinkState::Connected);
    }

    #[test]
    fn wrong_message_type_counts_as_miss() {
        let (mock, mut mon) = monitor(3);
        mock.push(position_msg(10, 0.0, 0.0, 0.0));
        assert!(!mon.run());
        assert_eq!(mon.missed(), 1);
    }

    #[test]
    fn transport_error_does_not_touch_state() {
        let (mock, mut mon) = monitor(3);
        mock.push(heartbeat_msg());
        mon.run();
        mon.run();
        assert_eq!(mon.missed(), 1);

        mock.push_error(TransportError::Closed);
        assert!(!mon.run());
        assert_eq!(mon.missed(), 1);
        assert_eq!(mon.state(), LinkState::Connected);
    }

    #[test]
    fn queued_burst_counts_once_then_silence_disconnects() {
        let (mock, mut mon) = monitor(2);
        for _ in 0..20 {
            mock.push(heartbeat_msg());
        }
        assert!(mon.run());
        assert_eq!(mock.pending(), 0);

        let verdicts: Vec<bool> = (0..20).map(|_| mon.run()).collect();
        assert_eq!(verdicts.iter().filter(|v| **v).count(), 1);
        assert!(!verdicts[1]);
        assert_eq!(mon.state(), LinkState::Disconnected);
    }

    #[test]
    fn buffered_link_heartbeats_do_not_outlive_silence() {
        use mavlink::MavHeader;
        use navlink_fc::mav::FcLink;

        let link = FcLink::connect("udpin:127.0.0.1:14665", 255, 0).unwrap();
        let handle = link.handle(&[MessageKind::Heartbeat]);
        let peer = mavlink::connect::<MavMessage>("udpout:127.0.0.1:14665").unwrap();
        for seq in 0..20u8 {
            let hdr = MavHeader { system_id: 1, component_id: 1, sequence: seq };
            peer.send(&hdr, &heartbeat_msg()).unwrap();
        }
        drop(peer);
        std::thread::sleep(Duration::from_millis(200));

        let mut mon = HeartbeatMonitor::new(handle, Duration::from_millis(20), 2).unwrap();
        let verdicts: Vec<bool> = (0..20).map(|_| mon.run()).collect();
        assert!(verdicts[0]);
        assert!(verdicts.iter().filter(|v| **v).count() <= 2, "verdicts: {:?}", verdicts);
        assert!(!verdicts[19]);
    }

    #[test]
    fn error_behind_queued_heartbeat_still_counts_as_received() {
        let (mock, mut mon) = monitor(3);
        mock.push(heartbeat_msg());
        mock.push_error(TransportError::Recv("glitch".into()));
        assert!(mon.run());
        assert_eq!(mon.missed(), 0);
    }

    #[test]
    fn emitter_sends_gcs_heartbeat() {
        let mock = MockTransport::new();
        let mut em = HeartbeatEmitter::new(mock.clone());
        assert!(em.run());
        assert!(em.run());

        let sent = mock.sent();
        assert_eq!(sent.len(), 2);
        match &sent[0] {
            MavMessage::HEARTBEAT(hb) => {
                assert_eq!(hb.mavtype, MavType::MAV_TYPE_GCS);
                assert_eq!(hb.autopilot, MavAutopilot::MAV_AUTOPILOT_INVALID);
            }
            other => panic!("expected heartbeat, got {:?}", other),
        }
    }

    #[test]
    fn emitter_reports_send_failure() {
        let mock = MockTransport::new();
        mock.fail_sends(Some(TransportError::Send("port gone".into())));
        let mut em = HeartbeatEmitter::new(mock.clone());
        assert!(!em.run());

        mock.fail_sends(None);
        assert!(em.run());
        assert_eq!(mock.sent().len(), 1);
    }
}
