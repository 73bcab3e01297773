//! Completion predicates for the poll-until-ready loop
//!
//! The board answers every control read with a frame whose byte 1 echoes the
//! transfer state and whose byte 2 carries the chip status. Which bytes mean
//! "done" depends on what was sent, so each command and startup step is
//! tagged with a [`Completion`] instead of the poll loop branching per call.

use crate::constants::CTS;
use serde::{Deserialize, Serialize};

/// A single masked byte comparison against a response frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteCheck {
    /// Offset into the response frame
    pub offset: usize,
    /// Bits of the byte that take part in the comparison
    pub mask: u8,
    /// Expected value after masking
    pub expected: u8,
}

impl ByteCheck {
    /// Byte at `offset` must equal `expected` exactly
    pub const fn equals(offset: usize, expected: u8) -> Self {
        Self {
            offset,
            mask: 0xff,
            expected,
        }
    }

    /// Every bit of `mask` must be set at `offset`
    pub const fn bits_set(offset: usize, mask: u8) -> Self {
        Self {
            offset,
            mask,
            expected: mask,
        }
    }

    /// Evaluate against a response; out-of-range offsets never match
    pub fn matches(&self, response: &[u8]) -> bool {
        response
            .get(self.offset)
            .is_some_and(|byte| byte & self.mask == self.expected)
    }
}

/// Transfer accepted by the board: byte 1 is zero
const TRANSFER_ACCEPTED: ByteCheck = ByteCheck::equals(1, 0);

/// Chip reports clear-to-send in its status byte
const STATUS_CTS: ByteCheck = ByteCheck::bits_set(2, CTS);

/// Chip status byte fully cleared
const STATUS_ZERO: ByteCheck = ByteCheck::equals(2, 0);

/// Named completion predicate
///
/// Configured in kebab-case, e.g. `"clear-to-send"` or
/// `{ clear-to-send-echo = { offset = 9, value = 8 } }`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Completion {
    /// Byte 1 == 0
    Accepted,
    /// Byte 1 == 0 and CTS set in byte 2
    #[default]
    ClearToSend,
    /// Byte 1 == 0 and byte 2 == 0
    StatusCleared,
    /// Clear-to-send plus an echoed byte at a fixed offset
    ClearToSendEcho { offset: usize, value: u8 },
}

impl Completion {
    /// The byte checks that must all hold for the predicate to be satisfied
    pub fn checks(&self) -> impl Iterator<Item = ByteCheck> {
        let (status, echo) = match *self {
            Completion::Accepted => (None, None),
            Completion::ClearToSend => (Some(STATUS_CTS), None),
            Completion::StatusCleared => (Some(STATUS_ZERO), None),
            Completion::ClearToSendEcho { offset, value } => {
                (Some(STATUS_CTS), Some(ByteCheck::equals(offset, value)))
            }
        };
        [Some(TRANSFER_ACCEPTED), status, echo].into_iter().flatten()
    }

    /// Evaluate the predicate against a response frame
    pub fn is_satisfied(&self, response: &[u8]) -> bool {
        self.checks().all(|check| check.matches(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(bytes: &[u8]) -> [u8; 64] {
        let mut frame = [0u8; 64];
        frame[..bytes.len()].copy_from_slice(bytes);
        frame
    }

    #[test]
    fn test_accepted_only_looks_at_byte_one() {
        assert!(Completion::Accepted.is_satisfied(&response(&[0x3f, 0x00, 0x12])));
        assert!(!Completion::Accepted.is_satisfied(&response(&[0x3f, 0x01])));
    }

    #[test]
    fn test_clear_to_send_requires_status_bit() {
        assert!(Completion::ClearToSend.is_satisfied(&response(&[0x3f, 0x00, 0x80])));
        assert!(Completion::ClearToSend.is_satisfied(&response(&[0x3f, 0x00, 0x81])));
        assert!(!Completion::ClearToSend.is_satisfied(&response(&[0x3f, 0x00, 0x00])));
        assert!(!Completion::ClearToSend.is_satisfied(&response(&[0x3f, 0x02, 0x80])));
    }

    #[test]
    fn test_status_cleared() {
        assert!(Completion::StatusCleared.is_satisfied(&response(&[0x3f, 0x00, 0x00])));
        assert!(!Completion::StatusCleared.is_satisfied(&response(&[0x3f, 0x00, 0x80])));
    }

    #[test]
    fn test_clear_to_send_echo() {
        let completion = Completion::ClearToSendEcho {
            offset: 9,
            value: 0x08,
        };
        let mut frame = response(&[0x3f, 0x00, 0x80]);
        assert!(!completion.is_satisfied(&frame));
        frame[9] = 0x08;
        assert!(completion.is_satisfied(&frame));
    }

    #[test]
    fn test_short_response_never_matches() {
        assert!(!Completion::ClearToSend.is_satisfied(&[0x3f, 0x00]));
        assert!(!Completion::Accepted.is_satisfied(&[]));
    }

    #[test]
    fn test_checks_count() {
        assert_eq!(Completion::Accepted.checks().count(), 1);
        assert_eq!(Completion::ClearToSend.checks().count(), 2);
        let echo = Completion::ClearToSendEcho {
            offset: 9,
            value: 0x08,
        };
        assert_eq!(echo.checks().count(), 3);
    }
}
