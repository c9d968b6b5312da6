//! Typed operations on the two bench devices.
//!
//! [`Device`] carries the operations both firmwares share. [`Receiver`] and [`Stand`]
//! add the commands specific to the unit under test and the signal generator.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};

use crate::connection::SharedConnection;
use crate::error::{LinkError, LinkResult};
use crate::proto::{Opcode, Packet};

mod receiver;
mod stand;

pub use receiver::Receiver;
pub use stand::Stand;

/// Measurement channels reported by the receiver.
pub const CHANNELS: usize = 4;

/// Highest raw level a channel can report.
pub const FULL_SCALE: u16 = 4095;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Error => "error",
        })
    }
}

/// Identity reported by `ReadInfo`: `model;firmware;scheme;id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub model: String,
    pub firmware: String,
    pub scheme: String,
    pub id: String,
}

impl DeviceInfo {
    pub fn parse(text: &str) -> Option<Self> {
        let fields: Vec<&str> = text
            .trim_matches(|c: char| c.is_whitespace() || c == '\0')
            .split(';')
            .map(str::trim)
            .collect();
        match fields.as_slice() {
            [model, firmware, scheme, id] if fields.iter().all(|f| !f.is_empty()) => Some(Self {
                model: model.to_string(),
                firmware: firmware.to_string(),
                scheme: scheme.to_string(),
                id: id.to_string(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "model={} firmware={} scheme={} id={}",
            self.model, self.firmware, self.scheme, self.id
        )
    }
}

/// Argument carried by a set-type command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Byte(u8),
    Scalar(u32),
    Array(Vec<u16>),
}

impl Value {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Value::Byte(b) => vec![*b],
            Value::Scalar(v) => v.to_be_bytes().to_vec(),
            Value::Array(vs) => vs.iter().flat_map(|v| v.to_be_bytes()).collect(),
        }
    }
}

/// Decode `CHANNELS` big-endian u16 values.
pub fn decode_array(opcode: Opcode, payload: &[u8]) -> LinkResult<[u16; CHANNELS]> {
    if payload.len() != CHANNELS * 2 {
        return Err(LinkError::BadPayload {
            opcode: opcode.name(),
            reason: format!("{} bytes, expected {}", payload.len(), CHANNELS * 2),
        });
    }
    let mut out = [0u16; CHANNELS];
    for (v, pair) in out.iter_mut().zip(payload.chunks_exact(2)) {
        *v = u16::from_be_bytes([pair[0], pair[1]]);
    }
    Ok(out)
}

fn expect_opcode(reply: &Packet, want: Opcode) -> LinkResult<()> {
    if reply.opcode() == want {
        Ok(())
    } else {
        Err(LinkError::UnexpectedResponse(format!(
            "expected {}, got {}",
            want,
            reply.opcode()
        )))
    }
}

/// Operations common to every bench device.
pub struct Device {
    name: &'static str,
    link: SharedConnection,
    info: Option<DeviceInfo>,
}

impl Device {
    pub fn new(name: &'static str, link: SharedConnection) -> Self {
        Self {
            name,
            link,
            info: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn link(&self) -> &SharedConnection {
        &self.link
    }

    /// Identity from the last successful `read_info`.
    pub fn info(&self) -> Option<&DeviceInfo> {
        self.info.as_ref()
    }

    /// Send a command. Opcodes that the firmware acknowledges have their `Ack`
    /// received and checked before the link is released.
    pub fn set(&self, opcode: Opcode, value: Option<Value>) -> LinkResult<()> {
        let payload = value.as_ref().map(Value::encode).unwrap_or_default();
        let request = Packet::new(opcode, payload);
        let mut link = self.link.lock();
        if !opcode.expects_ack() {
            return if link.send_packet(&request) {
                Ok(())
            } else {
                Err(LinkError::Transport(format!("{}: write failed", self.name)))
            };
        }
        let reply = link.exchange(&request)?;
        drop(link);

        let echoed = reply.payload() == opcode.code().to_be_bytes();
        match reply.opcode() {
            Opcode::Ack if echoed => {
                debug!("[{}] {} {:?} acked", self.name, opcode, value);
                Ok(())
            }
            Opcode::Nack => Err(LinkError::UnexpectedResponse(format!(
                "{} rejected {}",
                self.name, opcode
            ))),
            other => Err(LinkError::UnexpectedResponse(format!(
                "{} answered {} with {}",
                self.name, opcode, other
            ))),
        }
    }

    /// Query a per-channel array.
    pub fn get_array(&self, opcode: Opcode) -> LinkResult<[u16; CHANNELS]> {
        let reply = self.link.exchange(&Packet::empty(opcode))?;
        expect_opcode(&reply, opcode)?;
        decode_array(opcode, reply.payload())
    }

    /// Ask the device to identify itself. On success the identity is kept.
    pub fn read_info(&mut self) -> bool {
        let reply = match self.link.exchange(&Packet::empty(Opcode::ReadInfo)) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("[{}] read info: {}", self.name, e);
                return false;
            }
        };
        if reply.opcode() != Opcode::ReadInfo {
            warn!("[{}] read info answered with {}", self.name, reply.opcode());
            return false;
        }
        let text = String::from_utf8_lossy(reply.payload());
        match DeviceInfo::parse(&text) {
            Some(info) => {
                info!("[{}] {}", self.name, info);
                self.info = Some(info);
                true
            }
            None => {
                warn!("[{}] unparseable info {:?}", self.name, text);
                false
            }
        }
    }

    /// Liveness probe: the device must echo the current time back unchanged.
    pub fn check_connection_status(&self) -> ConnectionStatus {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or_default();
        self.probe(now)
    }

    fn probe(&self, stamp: u32) -> ConnectionStatus {
        let sent = stamp.to_be_bytes();
        match self.link.exchange(&Packet::new(Opcode::StatusCheck, sent.to_vec())) {
            Ok(reply) if reply.opcode() == Opcode::StatusCheck && reply.payload() == sent => {
                ConnectionStatus::Connected
            }
            Ok(reply) => {
                warn!(
                    "[{}] status echo mismatch: {} {:02x?}",
                    self.name,
                    reply.opcode(),
                    reply.payload()
                );
                ConnectionStatus::Error
            }
            Err(LinkError::InvalidFraming(_) | LinkError::MalformedPacket(_)) => {
                ConnectionStatus::Error
            }
            Err(_) => ConnectionStatus::Disconnected,
        }
    }
}
