//! Connection backends whose `recv` gives up after [`POLL`].
//!
//! The UDP and serial connections behind `mavlink::connect` block in `recv`
//! until a frame arrives, so a reader thread on a silent link could never be
//! stopped and would keep the socket or device open. These return
//! `TimedOut`/`WouldBlock` instead. TCP (already polling) and the rest still go
//! through `mavlink::connect`.

use mavlink::common::MavMessage;
use mavlink::error::{MessageReadError, MessageWriteError};
use mavlink::{read_versioned_msg, write_versioned_msg, MavConnection, MavHeader, MavlinkVersion};
use std::io::{self, Cursor, ErrorKind};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_serial::SerialPort;

/// Longest a single `recv` blocks.
pub(crate) const POLL: Duration = Duration::from_millis(100);

pub(crate) type Conn = Arc<dyn MavConnection<MavMessage> + Send + Sync>;

pub(crate) fn connect(url: &str) -> io::Result<Conn> {
    if let Some(addr) = url.strip_prefix("udpin:") {
        let socket = UdpSocket::bind(resolve(addr)?)?;
        return Ok(Arc::new(UdpWire::new(socket, None)?));
    }
    if let Some(addr) = url.strip_prefix("udpout:") {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        return Ok(Arc::new(UdpWire::new(socket, Some(resolve(addr)?))?));
    }
    if let Some(addr) = url.strip_prefix("udpbcast:") {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_broadcast(true)?;
        return Ok(Arc::new(UdpWire::new(socket, Some(resolve(addr)?))?));
    }
    if let Some(rest) = url.strip_prefix("serial:") {
        let (dev, baud) = rest
            .rsplit_once(':')
            .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "expected serial:<dev>:<baud>"))?;
        let baud: u32 = baud
            .parse()
            .map_err(|_| io::Error::new(ErrorKind::InvalidInput, format!("invalid baud {}", baud)))?;
        return Ok(Arc::new(SerialWire::open(dev, baud)?));
    }
    Ok(Arc::from(mavlink::connect::<MavMessage>(url)?))
}

/// Whether a receive error only means the poll interval ran out.
pub(crate) fn is_poll_timeout(e: &MessageReadError) -> bool {
    matches!(e, MessageReadError::Io(io) if matches!(io.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock))
}

fn resolve(addr: &str) -> io::Result<SocketAddr> {
    addr.to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, format!("no address for {}", addr)))
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

struct UdpRead {
    socket: UdpSocket,
    buf: Vec<u8>,
    /// Unparsed rest of the last datagram.
    pending: Cursor<Vec<u8>>,
}

/// UDP endpoint. Without a fixed destination it answers the last sender.
struct UdpWire {
    reader: Mutex<UdpRead>,
    writer: UdpSocket,
    dest: Mutex<Option<SocketAddr>>,
    reply_to_sender: bool,
    version: MavlinkVersion,
}

impl UdpWire {
    fn new(socket: UdpSocket, dest: Option<SocketAddr>) -> io::Result<Self> {
        socket.set_read_timeout(Some(POLL))?;
        Ok(Self {
            reader: Mutex::new(UdpRead {
                socket: socket.try_clone()?,
                buf: vec![0; 65536],
                pending: Cursor::new(Vec::new()),
            }),
            writer: socket,
            reply_to_sender: dest.is_none(),
            dest: Mutex::new(dest),
            version: MavlinkVersion::V2,
        })
    }
}

impl MavConnection<MavMessage> for UdpWire {
    fn recv(&self) -> Result<(MavHeader, MavMessage), MessageReadError> {
        let mut guard = lock(&self.reader);
        let rd = &mut *guard;
        loop {
            while (rd.pending.position() as usize) < rd.pending.get_ref().len() {
                match read_versioned_msg(&mut rd.pending, self.version) {
                    Ok(frame) => return Ok(frame),
                    // a well-formed frame we cannot decode; later frames may still parse
                    Err(MessageReadError::Parse(_)) => continue,
                    // truncated tail: frames never span datagrams
                    Err(MessageReadError::Io(_)) => break,
                }
            }

            let (n, src) = rd.socket.recv_from(&mut rd.buf)?;
            rd.pending = Cursor::new(rd.buf[..n].to_vec());
            if self.reply_to_sender {
                *lock(&self.dest) = Some(src);
            }
        }
    }

    fn send(&self, header: &MavHeader, data: &MavMessage) -> Result<usize, MessageWriteError> {
        let Some(dest) = *lock(&self.dest) else {
            // nobody has talked to us yet
            return Ok(0);
        };
        let mut frame = Vec::with_capacity(280);
        write_versioned_msg(&mut frame, self.version, *header, data)?;
        Ok(self.writer.send_to(&frame, dest)?)
    }

    fn set_protocol_version(&mut self, version: MavlinkVersion) {
        self.version = version;
    }

    fn get_protocol_version(&self) -> MavlinkVersion {
        self.version
    }
}

/// Serial port with separate read and write handles, so a waiting reader
/// never holds up a send.
struct SerialWire {
    reader: Mutex<Box<dyn SerialPort>>,
    writer: Mutex<Box<dyn SerialPort>>,
    version: MavlinkVersion,
}

impl SerialWire {
    fn open(dev: &str, baud: u32) -> io::Result<Self> {
        let port = tokio_serial::new(dev, baud).timeout(POLL).open().map_err(io::Error::from)?;
        Ok(Self {
            reader: Mutex::new(port.try_clone().map_err(io::Error::from)?),
            writer: Mutex::new(port),
            version: MavlinkVersion::V2,
        })
    }
}

impl MavConnection<MavMessage> for SerialWire {
    fn recv(&self) -> Result<(MavHeader, MavMessage), MessageReadError> {
        read_versioned_msg(&mut *lock(&self.reader), self.version)
    }

    fn send(&self, header: &MavHeader, data: &MavMessage) -> Result<usize, MessageWriteError> {
        write_versioned_msg(&mut *lock(&self.writer), self.version, *header, data)
    }

    fn set_protocol_version(&mut self, version: MavlinkVersion) {
        self.version = version;
    }

    fn get_protocol_version(&self) -> MavlinkVersion {
        self.version
    }
}
