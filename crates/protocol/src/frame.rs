//! Wire frame construction
//!
//! Every control transfer carries exactly [`BUFFER_LENGTH`] bytes. Logical
//! commands are laid out as
//!
//! ```text
//! 0      1      2..5            5..5+n   rest
//! 0x3f   0x06   command prefix  args     zero
//! ```
//!
//! while startup steps put their raw payload directly after the marker.

use crate::command::{CommandEntry, CommandId};
use crate::constants::{
    BUFFER_LENGTH, COMMAND_HEADER_LENGTH, FRAME_MARKER, MAX_ARGS, MAX_STARTUP_PAYLOAD,
    SEND_COMMAND_MARKER,
};
use crate::error::{ProtocolError, Result};
use crate::startup::StartStep;

/// A full, zero-padded frame ready for a control transfer
#[derive(Clone, PartialEq, Eq)]
pub struct WireFrame([u8; BUFFER_LENGTH]);

impl WireFrame {
    /// Frame a logical command with its argument payload
    pub fn command(id: CommandId, args: &[u8]) -> Result<Self> {
        Self::for_entry(id.entry(), args)
    }

    /// Frame a command from an already resolved table row
    pub fn for_entry(entry: &CommandEntry, args: &[u8]) -> Result<Self> {
        if args.len() > MAX_ARGS {
            return Err(ProtocolError::ArgumentsTooLong {
                len: args.len(),
                max: MAX_ARGS,
            });
        }

        let mut bytes = [0u8; BUFFER_LENGTH];
        bytes[0] = FRAME_MARKER;
        bytes[1] = SEND_COMMAND_MARKER;
        bytes[2..COMMAND_HEADER_LENGTH].copy_from_slice(&entry.prefix);
        bytes[COMMAND_HEADER_LENGTH..COMMAND_HEADER_LENGTH + args.len()].copy_from_slice(args);
        Ok(Self(bytes))
    }

    /// Frame one step of the startup sequence
    pub fn startup(step: &StartStep) -> Result<Self> {
        Self::raw(step.payload)
    }

    /// Marker followed by an arbitrary payload
    pub fn raw(payload: &[u8]) -> Result<Self> {
        if payload.len() > MAX_STARTUP_PAYLOAD {
            return Err(ProtocolError::PayloadTooLong {
                len: payload.len(),
                max: MAX_STARTUP_PAYLOAD,
            });
        }

        let mut bytes = [0u8; BUFFER_LENGTH];
        bytes[0] = FRAME_MARKER;
        bytes[1..1 + payload.len()].copy_from_slice(payload);
        Ok(Self(bytes))
    }

    /// Wrap bytes captured from the wire
    pub fn from_bytes(bytes: [u8; BUFFER_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; BUFFER_LENGTH] {
        &self.0
    }

    pub fn into_bytes(self) -> [u8; BUFFER_LENGTH] {
        self.0
    }

    pub fn marker(&self) -> u8 {
        self.0[0]
    }

    /// Command prefix (bytes 2..5); meaningless for startup frames
    pub fn prefix(&self) -> [u8; 3] {
        [self.0[2], self.0[3], self.0[4]]
    }

    /// First `len` argument bytes of a command frame
    pub fn args(&self, len: usize) -> &[u8] {
        let end = (COMMAND_HEADER_LENGTH + len).min(BUFFER_LENGTH);
        &self.0[COMMAND_HEADER_LENGTH..end]
    }

    pub fn is_command(&self) -> bool {
        self.0[0] == FRAME_MARKER && self.0[1] == SEND_COMMAND_MARKER
    }
}

impl AsRef<[u8]> for WireFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for WireFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Trailing padding is noise in logs.
        let used = self
            .0
            .iter()
            .rposition(|b| *b != 0)
            .map_or(1, |last| last + 1);
        write!(f, "WireFrame({:02x?}", &self.0[..used])?;
        if used < BUFFER_LENGTH {
            write!(f, " + {} zero", BUFFER_LENGTH - used)?;
        }
        f.write_str(")")
    }
}

/// Frame a logical command, looking up its prefix by raw opcode
pub fn frame_command(opcode: u8, args: &[u8]) -> Result<WireFrame> {
    let entry = crate::command::lookup(opcode)?;
    WireFrame::for_entry(entry, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::Completion;

    #[test]
    fn test_power_up_frame() {
        let frame = WireFrame::command(CommandId::PowerUp, &[0x00, 0x03]).unwrap();
        let bytes = frame.as_bytes();
        assert_eq!(&bytes[..7], &[0x3f, 0x06, 0x00, 0x03, 0x01, 0x00, 0x03]);
        assert!(bytes[7..].iter().all(|b| *b == 0));
        assert_eq!(bytes.len(), BUFFER_LENGTH);
    }

    #[test]
    fn test_frame_command_unknown_opcode() {
        assert_eq!(
            frame_command(0x99, &[]),
            Err(ProtocolError::UnknownCommand(0x99))
        );
    }

    #[test]
    fn test_arguments_too_long() {
        let args = [0u8; MAX_ARGS + 1];
        assert!(matches!(
            WireFrame::command(CommandId::RdsBuffer, &args),
            Err(ProtocolError::ArgumentsTooLong { len: 60, max: 59 })
        ));
        assert!(WireFrame::command(CommandId::RdsBuffer, &args[..MAX_ARGS]).is_ok());
    }

    #[test]
    fn test_startup_frame_layout() {
        let step = StartStep {
            payload: &[0x06, 0x03, 0x03, 0x08, 0x01, 0x0f],
            completion: Completion::Accepted,
        };
        let frame = WireFrame::startup(&step).unwrap();
        assert_eq!(
            &frame.as_bytes()[..8],
            &[0x3f, 0x06, 0x03, 0x03, 0x08, 0x01, 0x0f, 0x00]
        );
    }

    #[test]
    fn test_debug_trims_padding() {
        let frame = WireFrame::command(CommandId::GetRevision, &[]).unwrap();
        let rendered = format!("{:?}", frame);
        assert!(rendered.contains("3f, 06, 03, 01, 09"));
        assert!(rendered.contains("59 zero"));
    }
}
