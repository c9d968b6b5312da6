use std::ops::{Deref, DerefMut};

use super::{Device, Value};
use crate::connection::SharedConnection;
use crate::error::LinkResult;
use crate::proto::Opcode;

/// The signal generator driving the receiver inputs.
pub struct Stand {
    dev: Device,
}

impl Stand {
    pub fn new(link: SharedConnection) -> Self {
        Self {
            dev: Device::new("stand", link),
        }
    }

    pub fn set_voltage(&self, millivolts: u32) -> LinkResult<()> {
        self.dev.set(Opcode::SetVoltage, Some(Value::Scalar(millivolts)))
    }

    pub fn set_frequency(&self, hz: u32) -> LinkResult<()> {
        self.dev.set(Opcode::SetFrequency, Some(Value::Scalar(hz)))
    }

    pub fn output(&self, on: bool) -> LinkResult<()> {
        let op = if on { Opcode::OutputOn } else { Opcode::OutputOff };
        self.dev.set(op, None)
    }
}

impl Deref for Stand {
    type Target = Device;
    fn deref(&self) -> &Device {
        &self.dev
    }
}

impl DerefMut for Stand {
    fn deref_mut(&mut self) -> &mut Device {
        &mut self.dev
    }
}
