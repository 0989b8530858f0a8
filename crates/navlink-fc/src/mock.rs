//! Scripted in-memory transport.
//!
//! Clones share state, so a test can keep one clone to script input and
//! inspect what a component sent through the other.

use mavlink::common::MavMessage;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::transport::{MavTransport, MessageKind, TransportError};

#[derive(Debug)]
enum Incoming {
    Msg(MavMessage),
    Err(TransportError),
}

#[derive(Debug, Default)]
struct MockState {
    incoming: VecDeque<Incoming>,
    sent: Vec<MavMessage>,
    send_error: Option<TransportError>,
}

#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Queue a message for a later `recv_match`.
    pub fn push(&self, msg: MavMessage) {
        self.lock().incoming.push_back(Incoming::Msg(msg));
    }

    /// Queue a receive failure; it is returned once, in order with messages.
    pub fn push_error(&self, err: TransportError) {
        self.lock().incoming.push_back(Incoming::Err(err));
    }

    /// Make every following send fail with `err` (`None` restores success).
    pub fn fail_sends(&self, err: Option<TransportError>) {
        self.lock().send_error = err;
    }

    pub fn sent(&self) -> Vec<MavMessage> {
        self.lock().sent.clone()
    }

    pub fn pending(&self) -> usize {
        self.lock().incoming.len()
    }
}

impl MavTransport for MockTransport {
    fn send(&mut self, msg: &MavMessage) -> Result<(), TransportError> {
        let mut st = self.lock();
        if let Some(e) = &st.send_error {
            return Err(e.clone());
        }
        st.sent.push(msg.clone());
        Ok(())
    }

    /// Never sleeps: an exhausted script behaves like an expired timeout.
    fn recv_match(
        &mut self,
        kinds: &[MessageKind],
        _timeout: Option<Duration>,
    ) -> Result<Option<MavMessage>, TransportError> {
        let mut st = self.lock();
        while let Some(next) = st.incoming.pop_front() {
            match next {
                Incoming::Msg(msg) if MessageKind::matches(&msg, kinds) => return Ok(Some(msg)),
                Incoming::Msg(_) => continue,
                Incoming::Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}
