//! Start sequence table
//!
//! Low-level bring-up writes replayed once, in order, when the board is
//! attached. They are not logical chip commands: the payload goes straight
//! after the frame marker. The sequence mirrors what the vendor's Windows tool
//! sends on connect and when pressing "Initialize" and "Get Config".

use crate::completion::Completion;

/// One bring-up step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartStep {
    /// Bytes placed at offset 1 of the frame
    pub payload: &'static [u8],
    /// Predicate the response must satisfy before the next step
    pub completion: Completion,
}

impl StartStep {
    /// Step whose completion follows from its leading byte
    pub const fn new(payload: &'static [u8]) -> Self {
        Self {
            payload,
            completion: completion_for(payload),
        }
    }

    pub const fn len(&self) -> usize {
        self.payload.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Completion the board traces show for a given leading payload byte
pub const fn completion_for(payload: &[u8]) -> Completion {
    if payload.is_empty() {
        return Completion::Accepted;
    }
    match payload[0] {
        0x32 => Completion::StatusCleared,
        0x12 | 0x14 => Completion::ClearToSend,
        0x06 => Completion::ClearToSendEcho {
            offset: 9,
            value: 0x08,
        },
        _ => Completion::Accepted,
    }
}

/// Ordered bring-up sequence
pub static START_SEQUENCE: [StartStep; 38] = [
    StartStep::new(&[0x03]),
    StartStep::new(&[0x32, 0x7f]),
    StartStep::new(&[0x06, 0x03, 0x03, 0x08, 0x01, 0x0f]),
    StartStep::new(&[0x14, 0x02]),
    StartStep::new(&[0x09, 0x90]),
    StartStep::new(&[0x08, 0x90, 0xfa]),
    StartStep::new(&[0x36, 0x01]),
    StartStep::new(&[0x05, 0x03]),
    StartStep::new(&[0x06, 0x00, 0x06, 0x0e, 0x01, 0x0f, 0x05]),
    StartStep::new(&[0x12]),
    // Initialize
    StartStep::new(&[0x03]),
    StartStep::new(&[0x01]),
    StartStep::new(&[0x09, 0x90]),
    StartStep::new(&[0x08, 0x90, 0xfa]),
    StartStep::new(&[0x34]),
    StartStep::new(&[0x35, 0x01]),
    StartStep::new(&[0x36, 0x01]),
    StartStep::new(&[0x30, 0x09]),
    StartStep::new(&[0x30, 0x06, 0x00, 0xe2]),
    StartStep::new(&[0x31, 0x01, 0x30]),
    StartStep::new(&[0x31, 0x04, 0x09]),
    StartStep::new(&[0x05, 0x08]),
    StartStep::new(&[0x06, 0x08]),
    StartStep::new(&[0x12]),
    // Get Config
    StartStep::new(&[0x03]),
    StartStep::new(&[0x01]),
    StartStep::new(&[0x09, 0x90]),
    StartStep::new(&[0x08, 0x90, 0xfa]),
    StartStep::new(&[0x34]),
    StartStep::new(&[0x35, 0x01]),
    StartStep::new(&[0x36, 0x01]),
    StartStep::new(&[0x30, 0x09]),
    StartStep::new(&[0x30, 0x06, 0x00, 0xe2]),
    StartStep::new(&[0x31, 0x01, 0x30]),
    StartStep::new(&[0x31, 0x04, 0x09]),
    StartStep::new(&[0x05, 0x08]),
    StartStep::new(&[0x06, 0x08]),
    StartStep::new(&[0x12]),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_STARTUP_PAYLOAD;

    #[test]
    fn test_steps_fit_in_frame() {
        for step in START_SEQUENCE.iter() {
            assert!(!step.is_empty());
            assert!(step.len() <= 8);
            assert!(step.len() <= MAX_STARTUP_PAYLOAD);
        }
    }

    #[test]
    fn test_completion_derivation() {
        assert_eq!(START_SEQUENCE[0].completion, Completion::Accepted);
        assert_eq!(START_SEQUENCE[1].completion, Completion::StatusCleared);
        assert_eq!(
            START_SEQUENCE[2].completion,
            Completion::ClearToSendEcho {
                offset: 9,
                value: 0x08
            }
        );
        assert_eq!(START_SEQUENCE[3].completion, Completion::ClearToSend);
        assert_eq!(START_SEQUENCE[9].completion, Completion::ClearToSend);
    }
}
