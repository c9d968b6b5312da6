//! In-process stand-ins for the two bench devices.
//!
//! A [`SimTransport`] answers each written frame synchronously and queues the reply
//! the way the serial listener would. [`Bench`] ties a simulated stand to a simulated
//! receiver so that generator settings show up in the receiver's channel readings.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use log::{debug, warn};

use crate::device::{CHANNELS, FULL_SCALE};
use crate::error::LinkResult;
use crate::proto::{FrameCodec, Opcode, Packet};
use crate::transport::{RX_QUEUE_DEPTH, Transport, drain, recv_bounded};

type ByteResponder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

/// Packet-level behaviour of a simulated device.
pub trait DeviceModel: Send {
    /// Reply to one request, or `None` to stay silent.
    fn handle(&mut self, request: Packet) -> Option<Packet>;
}

impl<F> DeviceModel for F
where
    F: FnMut(Packet) -> Option<Packet> + Send,
{
    fn handle(&mut self, request: Packet) -> Option<Packet> {
        self(request)
    }
}

pub struct SimTransport {
    responder: ByteResponder,
    open: bool,
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl SimTransport {
    /// Reply at byte level: whatever `f` returns is delivered verbatim.
    pub fn raw(f: impl FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static) -> Self {
        let (tx, rx) = bounded(RX_QUEUE_DEPTH);
        Self {
            responder: Box::new(f),
            open: false,
            tx,
            rx,
        }
    }

    /// Never answers.
    pub fn silent() -> Self {
        Self::raw(|_| None)
    }

    /// Decode each request with `codec`, hand it to `model`, frame the reply.
    /// Requests that fail to decode are ignored, as real firmware does.
    pub fn device(codec: FrameCodec, mut model: impl DeviceModel + 'static) -> Self {
        Self::raw(move |bytes| {
            let payload = codec.unwrap(bytes).ok()?;
            let request = Packet::deserialize(&payload).ok()?;
            let reply = model.handle(request)?;
            Some(codec.wrap(&reply.serialize()))
        })
    }

    /// Handle for pushing unsolicited bytes into the receive queue.
    pub fn injector(&self) -> Sender<Vec<u8>> {
        self.tx.clone()
    }
}

impl Transport for SimTransport {
    fn open(&mut self) -> bool {
        self.open = true;
        true
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn read(&mut self, timeout: Duration) -> LinkResult<Vec<u8>> {
        recv_bounded(&self.rx, timeout)
    }

    fn write(&mut self, bytes: &[u8]) -> bool {
        if !self.open {
            return false;
        }
        if let Some(reply) = (self.responder)(bytes) {
            if let Err(TrySendError::Full(_)) = self.tx.try_send(reply) {
                warn!("[sim] rx queue full, reply dropped");
            }
        }
        true
    }

    fn discard_pending(&mut self) -> usize {
        drain(&self.rx)
    }

    fn close(&mut self) {
        self.open = false;
    }
}

/// Physical state shared by the simulated stand and receiver.
#[derive(Debug, Clone)]
pub struct BenchState {
    pub voltage_mv: u32,
    pub frequency_hz: u32,
    pub output_on: bool,
    pub channel_mask: u8,
    pub gain: u32,
    /// Per-channel sensitivity around nominal.
    pub channel_gain: [f64; CHANNELS],
    /// Input voltage that reads as full scale at unity gain.
    pub full_scale_mv: f64,
    /// Corner of the receiver's second-order low-pass response.
    pub cutoff_hz: f64,
    pub receiver_online: bool,
    pub stand_online: bool,
}

impl Default for BenchState {
    fn default() -> Self {
        Self {
            voltage_mv: 0,
            frequency_hz: 1000,
            output_on: false,
            channel_mask: 0x0f,
            gain: 1,
            channel_gain: [1.0, 0.98, 1.02, 0.99],
            full_scale_mv: 2000.0,
            cutoff_hz: 1000.0,
            receiver_online: true,
            stand_online: true,
        }
    }
}

impl BenchState {
    fn response(&self) -> f64 {
        let r = self.frequency_hz as f64 / self.cutoff_hz;
        1.0 / (1.0 + r * r)
    }

    /// Signal seen at each receiver input, in millivolts.
    pub fn magnitudes_mv(&self) -> [f64; CHANNELS] {
        let mut out = [0.0; CHANNELS];
        if !self.output_on {
            return out;
        }
        let base = self.voltage_mv as f64 * self.gain as f64 * self.response();
        for (ch, v) in out.iter_mut().enumerate() {
            if self.channel_mask & (1 << ch) != 0 {
                *v = base * self.channel_gain[ch];
            }
        }
        out
    }

    pub fn levels(&self) -> [u16; CHANNELS] {
        let mut out = [0u16; CHANNELS];
        for (level, mv) in out.iter_mut().zip(self.magnitudes_mv()) {
            let counts = (mv / self.full_scale_mv * FULL_SCALE as f64).round();
            *level = counts.clamp(0.0, FULL_SCALE as f64) as u16;
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct Bench {
    state: Arc<Mutex<BenchState>>,
}

impl Default for Bench {
    fn default() -> Self {
        Self::new(BenchState::default())
    }
}

impl Bench {
    pub fn new(state: BenchState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, BenchState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn receiver_transport(&self, codec: FrameCodec) -> SimTransport {
        SimTransport::device(
            codec,
            ReceiverModel {
                state: self.state.clone(),
            },
        )
    }

    pub fn stand_transport(&self, codec: FrameCodec) -> SimTransport {
        SimTransport::device(
            codec,
            StandModel {
                state: self.state.clone(),
            },
        )
    }
}

fn lock(state: &Mutex<BenchState>) -> MutexGuard<'_, BenchState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

fn ack(op: Opcode) -> Packet {
    Packet::new(Opcode::Ack, op.code().to_be_bytes().to_vec())
}

fn nack(op: Opcode) -> Packet {
    Packet::new(Opcode::Nack, op.code().to_be_bytes().to_vec())
}

fn read_u32(payload: &[u8]) -> Option<u32> {
    payload.try_into().ok().map(u32::from_be_bytes)
}

fn encode_array(values: impl IntoIterator<Item = u16>) -> Vec<u8> {
    values.into_iter().flat_map(|v| v.to_be_bytes()).collect()
}

struct ReceiverModel {
    state: Arc<Mutex<BenchState>>,
}

impl DeviceModel for ReceiverModel {
    fn handle(&mut self, request: Packet) -> Option<Packet> {
        let mut st = lock(&self.state);
        if !st.receiver_online {
            return None;
        }
        let op = request.opcode();
        debug!("[sim] receiver <- {}", op);
        let reply = match op {
            Opcode::StatusCheck => Packet::new(op, request.payload().to_vec()),
            Opcode::ReadInfo => Packet::new(op, b"RX-4;2.3.1;B;000417".to_vec()),
            Opcode::GetLevels => Packet::new(op, encode_array(st.levels())),
            Opcode::GetMagnitudes => Packet::new(
                op,
                encode_array(st.magnitudes_mv().map(|mv| mv.round().min(u16::MAX as f64) as u16)),
            ),
            Opcode::SetChannelMask => match request.payload() {
                [mask] => {
                    st.channel_mask = *mask;
                    ack(op)
                }
                _ => nack(op),
            },
            Opcode::SetGain => match read_u32(request.payload()) {
                Some(g) if g > 0 => {
                    st.gain = g;
                    ack(op)
                }
                _ => nack(op),
            },
            Opcode::ResetReceiver => {
                st.channel_mask = 0x0f;
                st.gain = 1;
                ack(op)
            }
            _ => nack(op),
        };
        Some(reply)
    }
}

struct StandModel {
    state: Arc<Mutex<BenchState>>,
}

impl DeviceModel for StandModel {
    fn handle(&mut self, request: Packet) -> Option<Packet> {
        let mut st = lock(&self.state);
        if !st.stand_online {
            return None;
        }
        let op = request.opcode();
        debug!("[sim] stand <- {}", op);
        let reply = match op {
            Opcode::StatusCheck => Packet::new(op, request.payload().to_vec()),
            Opcode::ReadInfo => Packet::new(op, b"GEN-2;1.0.7;A;000052".to_vec()),
            Opcode::SetVoltage => match read_u32(request.payload()) {
                Some(mv) => {
                    st.voltage_mv = mv;
                    ack(op)
                }
                None => nack(op),
            },
            Opcode::SetFrequency => match read_u32(request.payload()) {
                Some(hz) if hz > 0 => {
                    st.frequency_hz = hz;
                    ack(op)
                }
                _ => nack(op),
            },
            Opcode::OutputOn => {
                st.output_on = true;
                ack(op)
            }
            Opcode::OutputOff => {
                st.output_on = false;
                ack(op)
            }
            _ => nack(op),
        };
        Some(reply)
    }
}
