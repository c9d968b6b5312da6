use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, warn};

use crate::error::{LinkError, LinkResult};
use crate::proto::{FrameCodec, Packet};
use crate::stats::LinkStats;
use crate::transport::Transport;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Packet-level access to one device over one transport.
///
/// Strictly one request in flight: every `send_packet` must be followed by its
/// `receive_packet` before the next send. Not synchronised; share it through
/// [`SharedConnection`].
pub struct ConnectionManager {
    name: String,
    transport: Box<dyn Transport>,
    codec: FrameCodec,
    timeout: Duration,
    stats: LinkStats,
}

impl ConnectionManager {
    pub fn new(name: impl Into<String>, transport: Box<dyn Transport>, codec: FrameCodec) -> Self {
        Self {
            name: name.into(),
            transport,
            codec,
            timeout: DEFAULT_TIMEOUT,
            stats: LinkStats::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn open(&mut self) -> bool {
        self.transport.open()
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    pub fn close(&mut self) {
        self.transport.close()
    }

    /// Serialize, frame and write `packet`. Anything still queued from an earlier,
    /// abandoned exchange is discarded first.
    pub fn send_packet(&mut self, packet: &Packet) -> bool {
        let stale = self.transport.discard_pending();
        self.stats.add_stale(stale);

        let frame = self.codec.wrap(&packet.serialize());
        debug!(
            "[{}] tx {} {}",
            self.name,
            packet.opcode(),
            String::from_utf8_lossy(&frame).trim_end()
        );
        if self.transport.write(&frame) {
            self.stats.add_sent(frame.len());
            true
        } else {
            warn!("[{}] write of {} failed", self.name, packet.opcode());
            self.stats.inc_write_failure();
            false
        }
    }

    pub fn receive_packet(&mut self) -> LinkResult<Packet> {
        let result = self
            .transport
            .read(self.timeout)
            .and_then(|frame| {
                debug!(
                    "[{}] rx {}",
                    self.name,
                    String::from_utf8_lossy(&frame).trim_end()
                );
                let bytes = self.codec.unwrap(&frame)?;
                Packet::deserialize(&bytes).map(|p| (p, frame.len()))
            });

        match &result {
            Ok((_, wire_len)) => self.stats.add_received(*wire_len),
            Err(LinkError::Timeout(_)) => self.stats.inc_timeout(),
            Err(LinkError::InvalidFraming(_)) => self.stats.inc_bad_framing(),
            Err(LinkError::MalformedPacket(_)) => self.stats.inc_malformed(),
            Err(_) => {}
        }
        if let Err(e) = &result {
            warn!("[{}] receive: {}", self.name, e);
        }
        result.map(|(p, _)| p)
    }

    /// One request/response round trip.
    pub fn exchange(&mut self, packet: &Packet) -> LinkResult<Packet> {
        if !self.send_packet(packet) {
            return Err(LinkError::Transport(format!(
                "{}: write of {} failed",
                self.name,
                packet.opcode()
            )));
        }
        self.receive_packet()
    }
}

/// Mutex-guarded handle shared by everything that talks to one device.
#[derive(Clone)]
pub struct SharedConnection(Arc<Mutex<ConnectionManager>>);

impl SharedConnection {
    pub fn new(manager: ConnectionManager) -> Self {
        Self(Arc::new(Mutex::new(manager)))
    }

    /// Lock the link. Hold the guard across a send/receive pair.
    pub fn lock(&self) -> MutexGuard<'_, ConnectionManager> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn exchange(&self, packet: &Packet) -> LinkResult<Packet> {
        self.lock().exchange(packet)
    }
}
