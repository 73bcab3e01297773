//! Driver error types

use protocol::ProtocolError;
use thiserror::Error;

// errno values the chip driver side expects (Linux numbering)
const EIO: i32 = 5;
const ENOMEM: i32 = 12;
const EBUSY: i32 = 16;
const ENODEV: i32 = 19;
const EINVAL: i32 = 22;
const EOPNOTSUPP: i32 = 95;
const ETIMEDOUT: i32 = 110;

#[derive(Debug, Error)]
pub enum DriverError {
    /// Control transfer failed in libusb
    #[error("USB {op} failed: {source}")]
    Usb {
        op: &'static str,
        #[source]
        source: rusb::Error,
    },

    /// Control transfer moved fewer bytes than the frame holds
    #[error("Short USB {op}: {actual} of {expected} bytes")]
    ShortTransfer {
        op: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I2C write whose first byte is not a known command
    #[error("Unsupported command: {0:#04x}")]
    UnsupportedCommand(u8),

    /// Segment shape the board cannot express
    #[error("Unsupported transaction: {0}")]
    UnsupportedTransaction(String),

    #[error("Invalid length {len} (max: {max})")]
    InvalidLength { len: usize, max: usize },

    #[error("Failed to allocate device buffer")]
    AllocationFailure,

    #[error("Device disconnected")]
    Disconnected,

    /// Poll loop ran out of attempts (strict polling only)
    #[error("Device not ready after {attempts} attempts")]
    NotReady { attempts: u32 },

    #[error("Startup sequence failed at step {step}: {source}")]
    StartupFailed {
        step: usize,
        #[source]
        source: Box<DriverError>,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Chip answered without clear-to-send
    #[error("Chip busy (status {status:#04x})")]
    ChipBusy { status: u8 },

    /// Chip set the error bit in its status
    #[error("Chip rejected command (status {status:#04x})")]
    ChipRejected { status: u8 },

    #[error("Startup sequence already ran")]
    StartupAlreadyRan,

    #[error("Device lock poisoned")]
    LockPoisoned,
}

impl DriverError {
    /// Negative errno as returned to an I2C client
    pub fn errno(&self) -> i32 {
        let errno = match self {
            DriverError::Usb {
                source: rusb::Error::NoDevice,
                ..
            } => ENODEV,
            DriverError::Usb {
                source: rusb::Error::Timeout,
                ..
            } => ETIMEDOUT,
            DriverError::Usb { .. } | DriverError::ShortTransfer { .. } => EIO,
            DriverError::Protocol(_)
            | DriverError::UnsupportedCommand(_)
            | DriverError::InvalidLength { .. }
            | DriverError::InvalidArgument(_) => EINVAL,
            DriverError::ChipBusy { .. } => EBUSY,
            DriverError::ChipRejected { .. } => EIO,
            DriverError::UnsupportedTransaction(_) => EOPNOTSUPP,
            DriverError::AllocationFailure => ENOMEM,
            DriverError::Disconnected => ENODEV,
            DriverError::NotReady { .. } => ETIMEDOUT,
            DriverError::StartupFailed { source, .. } => return source.errno(),
            DriverError::StartupAlreadyRan => EINVAL,
            DriverError::LockPoisoned => EIO,
        };
        -errno
    }

    /// True for the transport failure class (libusb error or short transfer)
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            DriverError::Usb { .. } | DriverError::ShortTransfer { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        let io = DriverError::ShortTransfer {
            op: "send",
            expected: 64,
            actual: 10,
        };
        assert_eq!(io.errno(), -EIO);
        assert!(io.is_io());

        assert_eq!(DriverError::UnsupportedCommand(0x42).errno(), -EINVAL);
        assert_eq!(
            DriverError::UnsupportedTransaction("three segments".into()).errno(),
            -EOPNOTSUPP
        );
        assert_eq!(DriverError::Disconnected.errno(), -ENODEV);
        assert_eq!(DriverError::AllocationFailure.errno(), -ENOMEM);
    }

    #[test]
    fn test_startup_failure_keeps_cause() {
        let err = DriverError::StartupFailed {
            step: 3,
            source: Box::new(DriverError::Usb {
                op: "send",
                source: rusb::Error::Pipe,
            }),
        };
        assert_eq!(err.errno(), -EIO);
        let msg = format!("{}", err);
        assert!(msg.contains("step 3"));
    }

    #[test]
    fn test_usb_no_device_maps_to_enodev() {
        let err = DriverError::Usb {
            op: "receive",
            source: rusb::Error::NoDevice,
        };
        assert_eq!(err.errno(), -ENODEV);
    }
}
