use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::time::Duration;

use crate::error::{LinkError, LinkResult};

pub const DEFAULT_BAUD: u32 = 115_200;

/// Poll interval of the listener's blocking read; bounds how long `close` waits.
pub const LISTEN_POLL: Duration = Duration::from_millis(50);

/// Open a line at 8N1 without flow control.
pub fn open_port(dev: &str, baud: u32) -> LinkResult<Box<dyn SerialPort>> {
    let builder = serialport::new(dev, baud)
        .timeout(LISTEN_POLL)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None);

    let port = builder
        .open()
        .map_err(|e| LinkError::Transport(format!("open {}: {}", dev, e)))?;
    port.clear(serialport::ClearBuffer::All)
        .map_err(|e| LinkError::Transport(format!("clear {}: {}", dev, e)))?;
    Ok(port)
}
