//! Logical commands and the command table
//!
//! Every command the chip driver may issue is listed here together with the
//! 3-byte prefix the board expects in front of the arguments
//! (`[selector, nargs + 1, nresp]`) and the completion predicate the poll
//! loop waits for after sending it.

use crate::completion::Completion;
use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical command identifier (the chip's opcode)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum CommandId {
    PowerUp = 0x01,
    GetRevision = 0x10,
    PowerDown = 0x11,
    SetProperty = 0x12,
    GetProperty = 0x13,
    GetInterruptStatus = 0x14,
    TuneFrequency = 0x30,
    TunePower = 0x31,
    TuneMeasure = 0x32,
    TuneStatus = 0x33,
    AsqStatus = 0x34,
    RdsBuffer = 0x35,
    RdsPs = 0x36,
}

impl CommandId {
    /// All known commands, in opcode order
    pub const ALL: [CommandId; 13] = [
        CommandId::PowerUp,
        CommandId::GetRevision,
        CommandId::PowerDown,
        CommandId::SetProperty,
        CommandId::GetProperty,
        CommandId::GetInterruptStatus,
        CommandId::TuneFrequency,
        CommandId::TunePower,
        CommandId::TuneMeasure,
        CommandId::TuneStatus,
        CommandId::AsqStatus,
        CommandId::RdsBuffer,
        CommandId::RdsPs,
    ];

    /// Opcode as sent on the I2C side
    pub const fn opcode(self) -> u8 {
        self as u8
    }

    /// Classify an opcode
    pub fn from_opcode(opcode: u8) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|id| id.opcode() == opcode)
            .ok_or(ProtocolError::UnknownCommand(opcode))
    }

    /// Kebab-case name used in configuration and logs
    pub const fn name(self) -> &'static str {
        match self {
            CommandId::PowerUp => "power-up",
            CommandId::GetRevision => "get-revision",
            CommandId::PowerDown => "power-down",
            CommandId::SetProperty => "set-property",
            CommandId::GetProperty => "get-property",
            CommandId::GetInterruptStatus => "get-interrupt-status",
            CommandId::TuneFrequency => "tune-frequency",
            CommandId::TunePower => "tune-power",
            CommandId::TuneMeasure => "tune-measure",
            CommandId::TuneStatus => "tune-status",
            CommandId::AsqStatus => "asq-status",
            CommandId::RdsBuffer => "rds-buffer",
            CommandId::RdsPs => "rds-ps",
        }
    }

    /// Table entry for this command
    pub fn entry(self) -> &'static CommandEntry {
        // The table holds every variant, in declaration order.
        &COMMAND_TABLE[self.table_index()]
    }

    fn table_index(self) -> usize {
        match self {
            CommandId::PowerUp => 0,
            CommandId::GetRevision => 1,
            CommandId::PowerDown => 2,
            CommandId::SetProperty => 3,
            CommandId::GetProperty => 4,
            CommandId::GetInterruptStatus => 5,
            CommandId::TuneFrequency => 6,
            CommandId::TunePower => 7,
            CommandId::TuneMeasure => 8,
            CommandId::TuneStatus => 9,
            CommandId::AsqStatus => 10,
            CommandId::RdsBuffer => 11,
            CommandId::RdsPs => 12,
        }
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CommandId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|id| id.name() == s)
            .ok_or_else(|| ProtocolError::UnknownCommandName(s.to_string()))
    }
}

impl TryFrom<u8> for CommandId {
    type Error = ProtocolError;

    fn try_from(opcode: u8) -> Result<Self> {
        Self::from_opcode(opcode)
    }
}

/// One row of the command table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEntry {
    /// Command this row describes
    pub id: CommandId,
    /// Wire prefix: selector, argument count + 1, response count
    pub prefix: [u8; 3],
    /// Predicate the poll loop waits for after sending
    pub completion: Completion,
}

impl CommandEntry {
    const fn new(id: CommandId, selector: u8, nargs: u8, nresp: u8, completion: Completion) -> Self {
        Self {
            id,
            prefix: [selector, nargs + 1, nresp],
            completion,
        }
    }

    /// Selector byte of the prefix
    pub const fn selector(&self) -> u8 {
        self.prefix[0]
    }

    /// Number of argument bytes the chip expects after the opcode
    pub const fn arg_count(&self) -> usize {
        (self.prefix[1] - 1) as usize
    }

    /// Number of response bytes the chip returns (status byte included)
    pub const fn response_count(&self) -> usize {
        self.prefix[2] as usize
    }
}

/// The command table, one row per [`CommandId`] in declaration order
pub static COMMAND_TABLE: [CommandEntry; 13] = [
    CommandEntry::new(CommandId::PowerUp, 0x00, 2, 1, Completion::ClearToSend),
    CommandEntry::new(CommandId::GetRevision, 0x03, 0, 9, Completion::ClearToSend),
    CommandEntry::new(CommandId::PowerDown, 0x00, 0, 1, Completion::Accepted),
    CommandEntry::new(CommandId::SetProperty, 0x00, 5, 1, Completion::ClearToSend),
    CommandEntry::new(CommandId::GetProperty, 0x00, 3, 4, Completion::ClearToSend),
    CommandEntry::new(CommandId::GetInterruptStatus, 0x03, 0, 1, Completion::ClearToSend),
    CommandEntry::new(CommandId::TuneFrequency, 0x03, 3, 1, Completion::ClearToSend),
    CommandEntry::new(CommandId::TunePower, 0x03, 4, 1, Completion::ClearToSend),
    CommandEntry::new(CommandId::TuneMeasure, 0x03, 4, 1, Completion::ClearToSend),
    CommandEntry::new(CommandId::TuneStatus, 0x00, 1, 8, Completion::ClearToSend),
    CommandEntry::new(CommandId::AsqStatus, 0x03, 1, 5, Completion::ClearToSend),
    CommandEntry::new(CommandId::RdsBuffer, 0x03, 7, 6, Completion::ClearToSend),
    CommandEntry::new(CommandId::RdsPs, 0x00, 5, 1, Completion::ClearToSend),
];

/// Look up the table row for a raw opcode
pub fn lookup(opcode: u8) -> Result<&'static CommandEntry> {
    CommandId::from_opcode(opcode).map(CommandId::entry)
}
