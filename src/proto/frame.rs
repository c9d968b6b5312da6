use std::fmt::Write;
use std::str::FromStr;

use crate::error::{LinkError, LinkResult};

pub const OPEN_DELIM: u8 = b':';

/// Terminator sequence appended after the hex body.
///
/// Firmware builds disagree on this value, so it is chosen at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloseDelim {
    #[default]
    CrLf,
    Lf,
    Cr,
}

impl CloseDelim {
    pub fn bytes(self) -> &'static [u8] {
        match self {
            CloseDelim::CrLf => b"\r\n",
            CloseDelim::Lf => b"\n",
            CloseDelim::Cr => b"\r",
        }
    }
}

impl FromStr for CloseDelim {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "crlf" => Ok(CloseDelim::CrLf),
            "lf" => Ok(CloseDelim::Lf),
            "cr" => Ok(CloseDelim::Cr),
            _ => Err(()),
        }
    }
}

/// ASCII-hex line framing: `OPEN ++ hex(payload) ++ CLOSE`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec {
    close: CloseDelim,
}

impl FrameCodec {
    pub fn new(close: CloseDelim) -> Self {
        Self { close }
    }

    pub fn close_delim(&self) -> &'static [u8] {
        self.close.bytes()
    }

    pub fn wrap(&self, payload: &[u8]) -> Vec<u8> {
        let close = self.close.bytes();
        let mut hex = String::with_capacity(payload.len() * 2);
        for b in payload {
            let _ = write!(hex, "{:02x}", b);
        }
        let mut out = Vec::with_capacity(1 + hex.len() + close.len());
        out.push(OPEN_DELIM);
        out.extend_from_slice(hex.as_bytes());
        out.extend_from_slice(close);
        out
    }

    pub fn unwrap(&self, frame: &[u8]) -> LinkResult<Vec<u8>> {
        let close = self.close.bytes();
        if frame.first() != Some(&OPEN_DELIM) {
            return Err(LinkError::InvalidFraming("missing open delimiter"));
        }
        if frame.len() < 1 + close.len() || !frame.ends_with(close) {
            return Err(LinkError::InvalidFraming("missing close delimiter"));
        }
        let body = &frame[1..frame.len() - close.len()];
        if body.len() % 2 != 0 {
            return Err(LinkError::InvalidFraming("odd hex length"));
        }
        body.chunks_exact(2)
            .map(|pair| match (hex_val(pair[0]), hex_val(pair[1])) {
                (Some(hi), Some(lo)) => Ok((hi << 4) | lo),
                _ => Err(LinkError::InvalidFraming("bad hex digit")),
            })
            .collect()
    }
}

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}
