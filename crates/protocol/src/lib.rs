//! Wire protocol of the Si4713 USB FM transmitter board
//!
//! This crate is I/O free. It describes how logical chip commands and the
//! bring-up sequence are laid out in the board's fixed 64-byte HID control
//! frames, and which response bytes signal completion.
//!
//! # Example
//!
//! ```
//! use protocol::{CommandId, WireFrame};
//!
//! let frame = WireFrame::command(CommandId::PowerUp, &[0x00, 0x03]).unwrap();
//! assert_eq!(&frame.as_bytes()[..7], &[0x3f, 0x06, 0x00, 0x03, 0x01, 0x00, 0x03]);
//! ```
//!
//! # Completion predicates
//!
//! ```
//! use protocol::Completion;
//!
//! let mut response = [0u8; 64];
//! response[0] = 0x3f;
//! response[2] = 0x80;
//! assert!(Completion::ClearToSend.is_satisfied(&response));
//! ```

pub mod command;
pub mod completion;
pub mod constants;
pub mod error;
pub mod frame;
pub mod i2c;
pub mod startup;

pub use command::{COMMAND_TABLE, CommandEntry, CommandId, lookup};
pub use completion::{ByteCheck, Completion};
pub use constants::*;
pub use error::{ProtocolError, Result};
pub use frame::{WireFrame, frame_command};
pub use i2c::{Direction, Functionality, Segment};
pub use startup::{START_SEQUENCE, StartStep, completion_for};
