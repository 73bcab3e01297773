//! Userspace driver for the Si4713 USB FM transmitter board
//!
//! The board hides an Si4713 behind a HID microcontroller that has no I2C
//! passthrough. This crate emulates the I2C adapter the chip driver expects
//! by re-framing each chip command into the board's fixed 64-byte control
//! transfer format and busy-polling the board until it reports completion.
//!
//! Layering, bottom-up:
//! - [`transport`]: raw send/receive over USB control transfers
//! - [`instance`]: per-device session (transport + buffer) under one lock
//! - [`framer`] and [`startup`]: logical commands and the bring-up sequence
//! - [`bridge`]: I2C transactions mapped onto logical commands
//! - [`lifecycle`]: attach and detach
//! - [`chip`] and [`node`]: the chip client and modulator node on top

pub mod bridge;
pub mod chip;
pub mod config;
pub mod error;
pub mod framer;
pub mod instance;
pub mod lifecycle;
pub mod logging;
pub mod node;
pub mod startup;
pub mod test_utils;
pub mod transport;
pub mod usb;

pub use bridge::{I2cAdapter, I2cBridge};
pub use chip::Si4713;
pub use config::{DriverConfig, load_config};
pub use error::{DriverError, Result};
pub use instance::{DriverInstance, InstanceId, InstanceSettings, Session};
pub use lifecycle::{AttachedDevice, on_attach, on_detach};
pub use logging::setup_logging;
pub use node::{Capabilities, ChipSubdevice, ModulatorNode};
pub use startup::{SequencerState, StartupReport, StartupSequencer};
pub use transport::{PollOutcome, PollPolicy, Transport, UsbTransport, poll_until_ready};
