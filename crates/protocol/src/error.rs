//! Protocol error types

use thiserror::Error;

/// Protocol-level errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Opcode has no entry in the command table
    #[error("Unknown command opcode: {0:#04x}")]
    UnknownCommand(u8),

    /// Unrecognised command name (configuration keys, CLI input)
    #[error("Unknown command name: {0}")]
    UnknownCommandName(String),

    /// Argument payload does not fit behind the 5-byte command header
    #[error("Arguments too long: {len} bytes (max: {max})")]
    ArgumentsTooLong { len: usize, max: usize },

    /// Startup payload does not fit behind the frame marker
    #[error("Startup payload too long: {len} bytes (max: {max})")]
    PayloadTooLong { len: usize, max: usize },
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;
