//! Command framer
//!
//! Turns a logical command into a wire frame, pushes it through the
//! transport and waits for the completion predicate the command is tagged
//! with. Everything here runs with the session already locked.

use crate::error::Result;
use crate::instance::Session;
use crate::transport::{PollOutcome, poll_until_ready};
use protocol::{BUFFER_LENGTH, CTS, CommandId, HEADER_LENGTH, WireFrame};
use tracing::debug;

/// Parsed reply to a logical command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub id: CommandId,
    /// Response bytes after the 2-byte header, status byte first
    pub payload: Vec<u8>,
    pub outcome: PollOutcome,
}

impl CommandResponse {
    /// Chip status byte (0 when nothing came back)
    pub fn status(&self) -> u8 {
        self.payload.first().copied().unwrap_or(0)
    }

    pub fn is_clear_to_send(&self) -> bool {
        self.status() & CTS != 0
    }
}

/// Build the frame for `id`
///
/// Argument counts that differ from the table are passed through; the chip
/// firmware decides whether it accepts them.
pub fn frame_command(id: CommandId, args: &[u8]) -> Result<WireFrame> {
    let entry = id.entry();
    if args.len() != entry.arg_count() {
        debug!(
            "{} framed with {} argument byte(s), table expects {}",
            id,
            args.len(),
            entry.arg_count()
        );
    }
    Ok(WireFrame::for_entry(entry, args)?)
}

/// Send `frame` and poll until the completion configured for `id` holds
pub fn send_and_await(session: &mut Session, id: CommandId, frame: &WireFrame) -> Result<PollOutcome> {
    let completion = session.settings().completion_for(id);
    let policy = session.settings().command_poll;
    let (transport, buffer) = session.split();

    buffer.copy_from_slice(frame.as_bytes());
    transport.send(&buffer[..])?;

    let outcome = poll_until_ready(transport, buffer, &completion, &policy)?;
    debug!(
        "{} -> status {:#04x} after {} poll(s)",
        id,
        buffer[HEADER_LENGTH],
        outcome.attempts()
    );
    Ok(outcome)
}

/// Frame, send and await `id`, returning the table's response count
pub fn execute(session: &mut Session, id: CommandId, args: &[u8]) -> Result<CommandResponse> {
    let frame = frame_command(id, args)?;
    let outcome = send_and_await(session, id, &frame)?;
    let payload = response_payload(session.buffer(), id.entry().response_count()).to_vec();

    Ok(CommandResponse {
        id,
        payload,
        outcome,
    })
}

/// Bytes following the 2-byte header, truncated to `len`
pub fn response_payload(buffer: &[u8; BUFFER_LENGTH], len: usize) -> &[u8] {
    let end = (HEADER_LENGTH + len).min(BUFFER_LENGTH);
    &buffer[HEADER_LENGTH..end]
}
