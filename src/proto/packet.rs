use crc::{CRC_16_UMTS, Crc};

use super::opcode::Opcode;
use crate::error::{LinkError, LinkResult};

/// CRC-16 with polynomial 0x8005, zero init, no reflection and no final XOR.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_UMTS);

pub const HEADER_LEN: usize = 4;

pub fn crc16(bytes: &[u8]) -> u16 {
    CRC16.checksum(bytes)
}

fn packet_crc(opcode: Opcode, payload: &[u8]) -> u16 {
    let mut digest = CRC16.digest();
    digest.update(&opcode.code().to_be_bytes());
    digest.update(payload);
    digest.finalize()
}

/// One logical request or response unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    opcode: Opcode,
    check: u16,
    payload: Vec<u8>,
}

impl Packet {
    pub fn new(opcode: Opcode, payload: impl Into<Vec<u8>>) -> Self {
        let payload = payload.into();
        let check = packet_crc(opcode, &payload);
        Self {
            opcode,
            check,
            payload,
        }
    }

    pub fn empty(opcode: Opcode) -> Self {
        Self::new(opcode, Vec::new())
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn check(&self) -> u16 {
        self.check
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// `check(2B BE) ++ opcode(2B BE) ++ payload`. The check is always recomputed.
    pub fn serialize(&self) -> Vec<u8> {
        let check = packet_crc(self.opcode, &self.payload);
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&check.to_be_bytes());
        out.extend_from_slice(&self.opcode.code().to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn deserialize(bytes: &[u8]) -> LinkResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(LinkError::MalformedPacket(format!(
                "{} bytes, need at least {}",
                bytes.len(),
                HEADER_LEN
            )));
        }
        let check = u16::from_be_bytes([bytes[0], bytes[1]]);
        let code = u16::from_be_bytes([bytes[2], bytes[3]]);
        let opcode = Opcode::from_code(code)
            .ok_or_else(|| LinkError::MalformedPacket(format!("unknown opcode 0x{code:04x}")))?;
        let payload = bytes[HEADER_LEN..].to_vec();

        let calc = packet_crc(opcode, &payload);
        if calc != check {
            return Err(LinkError::MalformedPacket(format!(
                "check {calc:04x}!={check:04x}"
            )));
        }
        Ok(Self {
            opcode,
            check,
            payload,
        })
    }
}
