use std::ops::{Deref, DerefMut};

use super::{CHANNELS, Device, FULL_SCALE, Value};
use crate::connection::SharedConnection;
use crate::error::LinkResult;
use crate::proto::Opcode;

/// The unit under test.
pub struct Receiver {
    dev: Device,
}

impl Receiver {
    pub fn new(link: SharedConnection) -> Self {
        Self {
            dev: Device::new("receiver", link),
        }
    }

    /// Raw channel levels, `0..=FULL_SCALE`.
    pub fn levels(&self) -> LinkResult<[u16; CHANNELS]> {
        self.dev.get_array(Opcode::GetLevels)
    }

    /// Channel levels as a percentage of full scale.
    pub fn levels_pct(&self) -> LinkResult<[f64; CHANNELS]> {
        Ok(self.levels()?.map(|l| l as f64 * 100.0 / FULL_SCALE as f64))
    }

    pub fn magnitudes(&self) -> LinkResult<[u16; CHANNELS]> {
        self.dev.get_array(Opcode::GetMagnitudes)
    }

    /// Enable the channels whose bits are set.
    pub fn set_channel_mask(&self, mask: u8) -> LinkResult<()> {
        self.dev.set(Opcode::SetChannelMask, Some(Value::Byte(mask)))
    }

    pub fn set_gain(&self, gain: u32) -> LinkResult<()> {
        self.dev.set(Opcode::SetGain, Some(Value::Scalar(gain)))
    }

    pub fn reset(&self) -> LinkResult<()> {
        self.dev.set(Opcode::ResetReceiver, None)
    }
}

impl Deref for Receiver {
    type Target = Device;
    fn deref(&self) -> &Device {
        &self.dev
    }
}

impl DerefMut for Receiver {
    fn deref_mut(&mut self) -> &mut Device {
        &mut self.dev
    }
}
