use anyhow::Result;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::mav::FcLink;
use crate::transport::{MavTransport, MessageKind};

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub dev: String,
    pub baud: u32,
    pub hb_seen: bool,
    pub elapsed_ms: u64,
    pub note: String,
}

pub struct AutodetectResult {
    pub chosen: Option<(String, u32)>,
    /// The open link on the chosen port, reused by the caller. Reopening would
    /// race the probe's reader thread for the device.
    pub link: Option<FcLink>,
    pub probes: Vec<ProbeResult>,
}

pub fn default_candidate_devs() -> Vec<String> {
    vec![
        "/dev/serial0".into(),
        "/dev/ttyAMA0".into(),
        "/dev/ttyS0".into(),
        "/dev/ttyUSB0".into(),
        "/dev/ttyUSB1".into(),
        "/dev/ttyACM0".into(),
        "/dev/ttyACM1".into(),
    ]
}

pub fn default_candidate_bauds() -> Vec<u32> {
    vec![57600, 115200, 230400, 921600]
}

/// Probe every (device, baud) pair until one yields a HEARTBEAT within `heartbeat_timeout`.
pub fn autodetect_fc(
    candidate_devs: Vec<String>,
    candidate_bauds: Vec<u32>,
    heartbeat_timeout: Duration,
    sys_id: u8,
    comp_id: u8,
) -> Result<AutodetectResult> {
    let mut probes = Vec::new();

    for dev in candidate_devs {
        for baud in &candidate_bauds {
            let start = Instant::now();
            let mut hb_seen = false;
            let mut opened = None;

            let note = match FcLink::open(&dev, *baud, sys_id, comp_id) {
                Ok(link) => {
                    let mut handle = link.handle(&[MessageKind::Heartbeat]);
                    match handle.recv_match(&[MessageKind::Heartbeat], Some(heartbeat_timeout)) {
                        Ok(Some(_)) => {
                            hb_seen = true;
                            opened = Some(link);
                            "heartbeat".to_string()
                        }
                        Ok(None) => "no heartbeat".to_string(),
                        Err(e) => format!("link error: {}", e),
                    }
                }
                Err(e) => {
                    warn!("fc autodetect probe failed dev={} baud={} err={:#}", dev, baud, e);
                    format!("open/connect failed: {:#}", e)
                }
            };

            probes.push(ProbeResult {
                dev: dev.clone(),
                baud: *baud,
                hb_seen,
                elapsed_ms: start.elapsed().as_millis() as u64,
                note,
            });

            if hb_seen {
                info!("fc autodetect: OK {} @ {}", dev, baud);
                return Ok(AutodetectResult { chosen: Some((dev, *baud)), link: opened, probes });
            }
        }
    }

    Ok(AutodetectResult { chosen: None, link: None, probes })
}
