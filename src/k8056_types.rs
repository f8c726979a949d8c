use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::time::Duration;

pub const STX: u8 = 13;
pub const BAUD_RATE: u32 = 2400;
pub const DEFAULT_ADDRESS: CardAddress = 1;

/// Address of a card on the shared bus.
pub type CardAddress = u8;

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Instruction {
    SetRelay,
    ClearRelay,
    ToggleRelay,
    SetAddress,
    SendByte,
    EmergencyStop,
    ForceAddress,
    DisplayAddress,
}

impl Instruction {
    pub fn code(&self) -> u8 {
        match self {
            Instruction::SetRelay => b'S',
            Instruction::ClearRelay => b'C',
            Instruction::ToggleRelay => b'T',
            Instruction::SetAddress => b'A',
            Instruction::SendByte => b'B',
            Instruction::EmergencyStop => b'E',
            Instruction::ForceAddress => b'F',
            Instruction::DisplayAddress => b'D',
        }
    }
}

/// Relay 1-8, or 9 for every relay of a card.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct RelayIndex(u8);

impl RelayIndex {
    pub const ALL: RelayIndex = RelayIndex(9);

    pub fn new(relay: u8) -> Option<RelayIndex> {
        match relay {
            1..=9 => Some(RelayIndex(relay)),
            _ => None,
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    /// Data byte of set/clear/toggle frames, the relay as ASCII digit.
    pub fn data_byte(&self) -> u8 {
        self.0 + b'0'
    }
}

impl Display for RelayIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

/// One transmission to the card: `[STX, address, instruction, data, checksum]`.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct Frame([u8; 5]);

impl Frame {
    pub fn new(address: CardAddress, instruction: Instruction, data: u8) -> Frame {
        let instruction = instruction.code();
        Frame([
            STX,
            address,
            instruction,
            data,
            checksum(address, instruction, data),
        ])
    }

    pub fn address(&self) -> CardAddress {
        self.0[1]
    }

    pub fn instruction(&self) -> u8 {
        self.0[2]
    }

    pub fn data(&self) -> u8 {
        self.0[3]
    }

    pub fn checksum(&self) -> u8 {
        self.0[4]
    }

    pub fn as_bytes(&self) -> &[u8; 5] {
        &self.0
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let [stx, address, instruction, data, checksum] = self.0;
        write!(
            f,
            "[{:02X} {:02X} {:02X} {:02X} {:02X}]",
            stx, address, instruction, data, checksum
        )
    }
}

pub fn checksum(address: u8, instruction: u8, data: u8) -> u8 {
    243u8
        .wrapping_sub(instruction)
        .wrapping_sub(data)
        .wrapping_sub(address)
}

/// Every frame is written `repeat + 1` times with `wait` after each write.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DriverConfig {
    pub repeat: u32,
    pub wait: Duration,
}

impl DriverConfig {
    pub fn new(repeat: u32, wait: Duration) -> DriverConfig {
        DriverConfig { repeat, wait }
    }

    pub fn transmissions(&self) -> u32 {
        self.repeat.saturating_add(1)
    }
}
