//! Host side of a receiver test bench.
//!
//! Two serial devices, the receiver under test and a signal-generating stand, speak a
//! half-duplex request/response protocol: CRC-checked packets carried as ASCII-hex
//! lines. On top of the link sits a sequencer that runs measurement cases against
//! both devices.
//!
//! Layers, bottom up: [`transport`], [`proto`], [`connection`], [`device`], [`test`].

pub mod connection;
pub mod device;
pub mod error;
pub mod port;
pub mod proto;
pub mod sim;
pub mod stats;
pub mod test;
pub mod transport;

pub use connection::{ConnectionManager, SharedConnection};
pub use error::{LinkError, LinkResult, TestError};
pub use proto::{Opcode, Packet};
