use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::time::Duration;

use bench_link::port::DEFAULT_BAUD;
use bench_link::proto::{CloseDelim, FrameCodec, Opcode};

#[derive(Parser, Debug, Clone)]
#[command(name = "bench-link", about = "Receiver bench controller (stand + unit under test)")]
pub struct Cli {
    /// Log frame traffic (overrides RUST_LOG)
    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Read identity of both devices
    Info(LinkOpts),
    /// Liveness probe of both devices
    Status(LinkOpts),
    /// Run the standard test suite
    Run(RunOpts),
    /// Send one opcode to a device and print the reply
    Send(SendOpts),
}

#[derive(Args, Debug, Clone)]
pub struct LinkOpts {
    /// Receiver (unit under test) serial device
    #[arg(long, default_value = "/dev/ttyUSB0")]
    pub receiver: String,
    /// Stand (signal generator) serial device
    #[arg(long, default_value = "/dev/ttyUSB1")]
    pub stand: String,
    /// Baud rate
    #[arg(long, default_value_t = DEFAULT_BAUD)]
    pub baud: u32,
    /// Per-exchange response timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub timeout_ms: u64,
    /// Frame terminator: crlf, lf or cr
    #[arg(long, default_value = "crlf")]
    pub close_delim: String,
    /// Talk to the in-process simulated bench instead of serial ports
    #[arg(long, default_value_t = false)]
    pub sim: bool,
}

impl LinkOpts {
    pub fn codec(&self) -> anyhow::Result<FrameCodec> {
        let close: CloseDelim = self
            .close_delim
            .parse()
            .map_err(|_| anyhow!("close-delim must be crlf, lf or cr"))?;
        Ok(FrameCodec::new(close))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunOpts {
    #[command(flatten)]
    pub link: LinkOpts,
    /// Case ids to disable (repeatable)
    #[arg(long)]
    pub skip: Vec<u32>,
    /// Settling time after each stimulus change, milliseconds
    #[arg(long, default_value_t = 200)]
    pub settle_ms: u64,
    /// Print the suite and exit
    #[arg(long, default_value_t = false)]
    pub list: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Receiver,
    Stand,
}

#[derive(Args, Debug, Clone)]
pub struct SendOpts {
    #[command(flatten)]
    pub link: LinkOpts,
    /// Device to address
    #[arg(long, value_enum, default_value_t = Target::Receiver)]
    pub target: Target,
    /// Opcode name (e.g. get-levels) or hex code (e.g. 0x0010)
    pub opcode: String,
    /// Payload as hex digits
    #[arg(long, default_value = "")]
    pub data: String,
}

impl SendOpts {
    pub fn opcode(&self) -> anyhow::Result<Opcode> {
        self.opcode
            .parse()
            .map_err(|_| anyhow!("unknown opcode {}", self.opcode))
    }

    pub fn payload(&self) -> anyhow::Result<Vec<u8>> {
        let hex = self.data.trim();
        if !hex.is_ascii() || hex.len() % 2 != 0 {
            return Err(anyhow!("--data must be an even number of hex digits"));
        }
        (0..hex.len())
            .step_by(2)
            .map(|i| {
                u8::from_str_radix(&hex[i..i + 2], 16)
                    .with_context(|| format!("bad hex in --data at {}", i))
            })
            .collect()
    }
}
