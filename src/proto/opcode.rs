use std::fmt;

/// Command identifiers shared by the host and both device firmwares.
///
/// The numeric values are the wire encoding. New opcodes are appended at the end;
/// existing values never move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    // ---- Common ----
    StatusCheck = 0x0000,
    ReadInfo = 0x0001,
    Ack = 0x0002,
    Nack = 0x0003,

    // ---- Receiver ----
    GetLevels = 0x0010,
    GetMagnitudes = 0x0011,
    SetChannelMask = 0x0012,
    SetGain = 0x0013,
    ResetReceiver = 0x0014,

    // ---- Stand ----
    SetVoltage = 0x0020,
    SetFrequency = 0x0021,
    OutputOn = 0x0022,
    OutputOff = 0x0023,
}

impl Opcode {
    const ALL: [Opcode; 13] = [
        Opcode::StatusCheck,
        Opcode::ReadInfo,
        Opcode::Ack,
        Opcode::Nack,
        Opcode::GetLevels,
        Opcode::GetMagnitudes,
        Opcode::SetChannelMask,
        Opcode::SetGain,
        Opcode::ResetReceiver,
        Opcode::SetVoltage,
        Opcode::SetFrequency,
        Opcode::OutputOn,
        Opcode::OutputOff,
    ];

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.code() == code)
    }

    /// Set-type commands the firmware answers with an `Ack` echoing the opcode.
    pub fn expects_ack(self) -> bool {
        matches!(
            self,
            Opcode::SetChannelMask
                | Opcode::SetGain
                | Opcode::ResetReceiver
                | Opcode::SetVoltage
                | Opcode::SetFrequency
                | Opcode::OutputOn
                | Opcode::OutputOff
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::StatusCheck => "status-check",
            Opcode::ReadInfo => "read-info",
            Opcode::Ack => "ack",
            Opcode::Nack => "nack",
            Opcode::GetLevels => "get-levels",
            Opcode::GetMagnitudes => "get-magnitudes",
            Opcode::SetChannelMask => "set-channel-mask",
            Opcode::SetGain => "set-gain",
            Opcode::ResetReceiver => "reset-receiver",
            Opcode::SetVoltage => "set-voltage",
            Opcode::SetFrequency => "set-frequency",
            Opcode::OutputOn => "output-on",
            Opcode::OutputOff => "output-off",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Opcode {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_ascii_lowercase();
        if let Some(hex) = s.strip_prefix("0x") {
            return u16::from_str_radix(hex, 16)
                .ok()
                .and_then(Opcode::from_code)
                .ok_or(());
        }
        Self::ALL.iter().copied().find(|op| op.name() == s).ok_or(())
    }
}
