use anyhow::{Context, Result};
use mavlink::{common::MavMessage, error::MessageReadError, MavHeader};
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::transport::{MavTransport, MessageKind, TransportError};
use crate::wire::{self, is_poll_timeout, Conn};

/// Per-handle inbound queue depth.
const HANDLE_QUEUE: usize = 256;

struct Subscriber {
    kinds: Vec<MessageKind>,
    tx: SyncSender<MavMessage>,
}

/// Shared send path: one connection, one sequence counter.
#[derive(Clone)]
struct Outbound {
    conn: Conn,
    sys_id: u8,
    comp_id: u8,
    sequence: Arc<AtomicU8>,
}

impl Outbound {
    fn send(&self, msg: &MavMessage) -> Result<(), TransportError> {
        let hdr = MavHeader {
            system_id: self.sys_id,
            component_id: self.comp_id,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        self.conn
            .send(&hdr, msg)
            .map(|_| ())
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

/// A MAVLink connection shared by several pipeline components.
///
/// A dedicated reader thread receives every message and hands a copy to each
/// subscribed [`LinkHandle`] whose kind filter matches. Sends go straight to
/// the connection, which serializes writers itself.
///
/// Dropping the link stops the reader and waits for it; every receiving
/// handle then reports `Closed`. The connection itself closes once the last
/// handle is gone too.
pub struct FcLink {
    out: Outbound,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    alive: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl FcLink {
    /// Open a serial flight controller link.
    pub fn open(dev: &str, baud: u32, sys_id: u8, comp_id: u8) -> Result<Self> {
        Self::connect(&format!("serial:{}:{}", dev, baud), sys_id, comp_id)
            .with_context(|| format!("open fc serial device {}", dev))
    }

    /// Connect using any mavlink address (`serial:`, `udpin:`, `tcpout:` ...).
    pub fn connect(url: &str, sys_id: u8, comp_id: u8) -> Result<Self> {
        let conn = wire::connect(url).with_context(|| format!("mavlink connect {}", url))?;

        let subscribers: Arc<Mutex<Vec<Subscriber>>> = Arc::new(Mutex::new(Vec::new()));
        let alive = Arc::new(AtomicBool::new(true));
        let stop = Arc::new(AtomicBool::new(false));

        let reader = Reader {
            conn: conn.clone(),
            subscribers: subscribers.clone(),
            alive: alive.clone(),
            stop: stop.clone(),
        };
        let reader = std::thread::Builder::new()
            .name("fc-reader".into())
            .spawn(move || reader.run())
            .context("spawn fc reader thread")?;

        info!("fc: connected {}", url);
        Ok(Self {
            out: Outbound { conn, sys_id, comp_id, sequence: Arc::new(AtomicU8::new(0)) },
            subscribers,
            alive,
            stop,
            reader: Some(reader),
        })
    }

    /// New transport handle receiving only `kinds`. Pass `&[]` for a send-only handle.
    pub fn handle(&self, kinds: &[MessageKind]) -> LinkHandle {
        let (tx, rx) = mpsc::sync_channel(HANDLE_QUEUE);
        if !kinds.is_empty() && self.is_alive() {
            let mut subs = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
            subs.push(Subscriber { kinds: kinds.to_vec(), tx });
        }
        // A send-only handle keeps no subscription; its receiver reports Closed.
        LinkHandle { out: self.out.clone(), rx }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

impl Drop for FcLink {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("fc: reader thread panicked");
            }
        }
    }
}

struct Reader {
    conn: Conn,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    alive: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl Reader {
    fn run(self) {
        while !self.stop.load(Ordering::Acquire) {
            match self.conn.recv() {
                Ok((_hdr, msg)) => self.dispatch(msg),
                Err(e) if is_poll_timeout(&e) => {}
                Err(MessageReadError::Io(e)) if is_fatal(e.kind()) => {
                    warn!("fc: reader stopped: {}", e);
                    break;
                }
                Err(e) => {
                    debug!("fc: recv error (ignored): {}", e);
                }
            }
        }
        self.alive.store(false, Ordering::Release);
        // dropping the senders wakes every handle with Closed
        self.subscribers.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }

    fn dispatch(&self, msg: MavMessage) {
        let Some(kind) = MessageKind::of(&msg) else { return };
        let mut subs = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
        subs.retain(|s| {
            if !s.kinds.contains(&kind) {
                return true;
            }
            match s.tx.try_send(msg.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    debug!("fc: handle queue full, dropping {:?}", kind);
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            }
        });
    }
}

fn is_fatal(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
    )
}

/// One component's view of an [`FcLink`].
pub struct LinkHandle {
    out: Outbound,
    rx: Receiver<MavMessage>,
}

impl MavTransport for LinkHandle {
    fn send(&mut self, msg: &MavMessage) -> Result<(), TransportError> {
        self.out.send(msg)
    }

    fn recv_match(
        &mut self,
        kinds: &[MessageKind],
        timeout: Option<Duration>,
    ) -> Result<Option<MavMessage>, TransportError> {
        let Some(timeout) = timeout else {
            loop {
                match self.rx.try_recv() {
                    Ok(msg) if MessageKind::matches(&msg, kinds) => return Ok(Some(msg)),
                    Ok(_) => continue,
                    Err(TryRecvError::Empty) => return Ok(None),
                    Err(TryRecvError::Disconnected) => return Err(TransportError::Closed),
                }
            }
        };

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            match self.rx.recv_timeout(remaining) {
                Ok(msg) if MessageKind::matches(&msg, kinds) => return Ok(Some(msg)),
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => return Err(TransportError::Closed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavlink::common::{MavAutopilot, MavModeFlag, MavState, MavType, HEARTBEAT_DATA};

    fn heartbeat() -> MavMessage {
        MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_QUADROTOR,
            autopilot: MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA,
            base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        })
    }

    #[test]
    fn udp_heartbeat_reaches_only_subscribed_handles() {
        let link = FcLink::connect("udpin:127.0.0.1:14661", 255, 0).unwrap();
        let mut hb = link.handle(&[MessageKind::Heartbeat]);
        let mut telem = link.handle(&[MessageKind::LocalPositionNed, MessageKind::Attitude]);

        let peer = mavlink::connect::<MavMessage>("udpout:127.0.0.1:14661").unwrap();
        let hdr = MavHeader { system_id: 1, component_id: 1, sequence: 0 };
        peer.send(&hdr, &heartbeat()).unwrap();

        let got = hb.recv_match(&[MessageKind::Heartbeat], Some(Duration::from_secs(2))).unwrap();
        assert!(matches!(got, Some(MavMessage::HEARTBEAT(_))));

        let none = telem
            .recv_match(&[MessageKind::LocalPositionNed], Some(Duration::from_millis(50)))
            .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn send_only_handle_reports_closed_on_recv() {
        let link = FcLink::connect("udpin:127.0.0.1:14662", 255, 0).unwrap();
        let mut tx_only = link.handle(&[]);
        let res = tx_only.recv_match(&[MessageKind::Heartbeat], None);
        assert_eq!(res, Err(TransportError::Closed));
    }

    #[test]
    fn dropped_link_releases_its_port() {
        let link = FcLink::connect("udpin:127.0.0.1:14663", 255, 0).unwrap();
        drop(link);
        let again = FcLink::connect("udpin:127.0.0.1:14663", 255, 0);
        assert!(again.is_ok(), "reconnect failed: {:#}", again.err().unwrap());
    }

    #[test]
    fn dropped_link_closes_receiving_handles() {
        let link = FcLink::connect("udpin:127.0.0.1:14664", 255, 0).unwrap();
        let mut hb = link.handle(&[MessageKind::Heartbeat]);
        drop(link);
        let res = hb.recv_match(&[MessageKind::Heartbeat], Some(Duration::from_secs(1)));
        assert_eq!(res, Err(TransportError::Closed));
    }
}
