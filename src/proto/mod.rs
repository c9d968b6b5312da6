pub mod frame;
pub mod opcode;
pub mod packet;

pub use frame::{CloseDelim, FrameCodec, OPEN_DELIM};
pub use opcode::Opcode;
pub use packet::{Packet, crc16};
