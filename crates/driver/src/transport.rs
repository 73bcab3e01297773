//! USB control-transfer transport
//!
//! The board speaks HID feature reports over endpoint 0: every request is a
//! SET_REPORT carrying one 64-byte frame and every answer is a GET_REPORT into
//! the same buffer. [`Transport`] is the seam the rest of the driver is
//! written against; [`UsbTransport`] is the libusb implementation.

use crate::error::{DriverError, Result};
use protocol::{
    BUFFER_LENGTH, Completion, REQUEST_IN, REQUEST_INDEX, REQUEST_OUT, REQUEST_TYPE_IN,
    REQUEST_TYPE_OUT, REQUEST_VALUE,
};
use rusb::{Context, DeviceHandle};
use std::time::Duration;
use tracing::{trace, warn};

/// Default timeout for a single control transfer
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Raw send/receive primitive over the board's control pipe
pub trait Transport: Send {
    /// Host-to-device transfer of the whole buffer
    fn send(&mut self, buffer: &[u8]) -> Result<()>;

    /// Device-to-host transfer filling the whole buffer
    fn receive(&mut self, buffer: &mut [u8]) -> Result<()>;
}

/// libusb-backed transport
///
/// Owns the opened device handle. The claimed interface is released and the
/// kernel driver reattached when the transport is dropped.
pub struct UsbTransport {
    handle: DeviceHandle<Context>,
    interface: u8,
    timeout: Duration,
    kernel_driver_detached: bool,
}

impl UsbTransport {
    pub(crate) fn new(
        handle: DeviceHandle<Context>,
        interface: u8,
        timeout: Duration,
        kernel_driver_detached: bool,
    ) -> Self {
        Self {
            handle,
            interface,
            timeout,
            kernel_driver_detached,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Transport for UsbTransport {
    fn send(&mut self, buffer: &[u8]) -> Result<()> {
        trace!(
            "Control OUT: request_type={:#x}, request={:#x}, value={:#x}, len={}",
            REQUEST_TYPE_OUT,
            REQUEST_OUT,
            REQUEST_VALUE,
            buffer.len()
        );

        let written = self
            .handle
            .write_control(
                REQUEST_TYPE_OUT,
                REQUEST_OUT,
                REQUEST_VALUE,
                REQUEST_INDEX,
                buffer,
                self.timeout,
            )
            .map_err(|source| DriverError::Usb { op: "send", source })?;

        check_length("send", buffer.len(), written)
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<()> {
        trace!(
            "Control IN: request_type={:#x}, request={:#x}, value={:#x}, len={}",
            REQUEST_TYPE_IN,
            REQUEST_IN,
            REQUEST_VALUE,
            buffer.len()
        );

        let expected = buffer.len();
        let read = self
            .handle
            .read_control(
                REQUEST_TYPE_IN,
                REQUEST_IN,
                REQUEST_VALUE,
                REQUEST_INDEX,
                buffer,
                self.timeout,
            )
            .map_err(|source| DriverError::Usb {
                op: "receive",
                source,
            })?;

        check_length("receive", expected, read)
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(self.interface) {
            warn!("Failed to release interface {}: {}", self.interface, e);
        }

        if self.kernel_driver_detached {
            crate::usb::reattach_kernel_driver(&self.handle, self.interface);
        }
    }
}

fn check_length(op: &'static str, expected: usize, actual: usize) -> Result<()> {
    if actual < expected {
        warn!("Short control transfer ({}): {} of {} bytes", op, actual, expected);
        return Err(DriverError::ShortTransfer {
            op,
            expected,
            actual,
        });
    }
    Ok(())
}

/// How a poll-until-ready loop is paced and bounded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep between two receive attempts
    pub interval: Duration,
    /// Receive attempts before giving up
    pub max_attempts: u32,
    /// Raise [`DriverError::NotReady`] instead of returning the last response
    pub fail_on_exhaustion: bool,
}

impl PollPolicy {
    /// Bring-up steps: short budget
    pub const STARTUP: PollPolicy = PollPolicy {
        interval: Duration::from_millis(3),
        max_attempts: 15,
        fail_on_exhaustion: false,
    };

    /// Logical commands: tuning can keep the chip busy for a while
    pub const COMMAND: PollPolicy = PollPolicy {
        interval: Duration::from_millis(3),
        max_attempts: 100,
        fail_on_exhaustion: false,
    };
}

/// Result of a poll loop that did not hit a transfer error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Completion predicate held on the given attempt
    Ready { attempts: u32 },
    /// Attempts ran out; the buffer holds the last response
    Exhausted { attempts: u32 },
}

impl PollOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready { .. })
    }

    pub fn attempts(&self) -> u32 {
        match *self {
            PollOutcome::Ready { attempts } | PollOutcome::Exhausted { attempts } => attempts,
        }
    }
}

/// Receive into `buffer` until `completion` holds or the budget is spent
///
/// A failing receive aborts the loop. Running out of attempts returns
/// [`PollOutcome::Exhausted`] with the last response left in the buffer,
/// unless the policy asks for a hard failure.
pub fn poll_until_ready<T: Transport + ?Sized>(
    transport: &mut T,
    buffer: &mut [u8; BUFFER_LENGTH],
    completion: &Completion,
    policy: &PollPolicy,
) -> Result<PollOutcome> {
    let budget = policy.max_attempts.max(1);

    for attempt in 1..=budget {
        transport.receive(buffer)?;

        if completion.is_satisfied(buffer) {
            trace!("Ready after {} attempt(s): {:?}", attempt, completion);
            return Ok(PollOutcome::Ready { attempts: attempt });
        }

        if attempt < budget && !policy.interval.is_zero() {
            std::thread::sleep(policy.interval);
        }
    }

    warn!(
        "Device not ready after {} attempts (waiting for {:?}, last status {:#04x}/{:#04x})",
        budget, completion, buffer[1], buffer[2]
    );

    if policy.fail_on_exhaustion {
        Err(DriverError::NotReady { attempts: budget })
    } else {
        Ok(PollOutcome::Exhausted { attempts: budget })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ScriptedTransport, cts_response, pending_response};

    fn fast(max_attempts: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::ZERO,
            max_attempts,
            fail_on_exhaustion: false,
        }
    }

    #[test]
    fn test_check_length() {
        assert!(check_length("send", 64, 64).is_ok());
        assert!(matches!(
            check_length("send", 64, 12),
            Err(DriverError::ShortTransfer {
                expected: 64,
                actual: 12,
                ..
            })
        ));
    }

    #[test]
    fn test_poll_ready_on_third_attempt() {
        let (mut transport, log) = ScriptedTransport::new();
        transport.push_response(pending_response());
        transport.push_response(pending_response());
        transport.push_response(cts_response(&[]));

        let mut buffer = [0u8; BUFFER_LENGTH];
        let outcome =
            poll_until_ready(&mut transport, &mut buffer, &Completion::ClearToSend, &fast(10))
                .unwrap();

        assert_eq!(outcome, PollOutcome::Ready { attempts: 3 });
        assert_eq!(log.receive_count(), 3);
    }

    #[test]
    fn test_poll_exhaustion_returns_last_response() {
        let (mut transport, log) = ScriptedTransport::new();
        transport.set_default_response(pending_response());

        let mut buffer = [0u8; BUFFER_LENGTH];
        let outcome =
            poll_until_ready(&mut transport, &mut buffer, &Completion::ClearToSend, &fast(5))
                .unwrap();

        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 5 });
        assert!(!outcome.is_ready());
        assert_eq!(log.receive_count(), 5);
        assert_eq!(buffer, pending_response());
    }

    #[test]
    fn test_poll_exhaustion_strict() {
        let (mut transport, _log) = ScriptedTransport::new();
        transport.set_default_response(pending_response());

        let policy = PollPolicy {
            fail_on_exhaustion: true,
            ..fast(4)
        };
        let mut buffer = [0u8; BUFFER_LENGTH];
        let result = poll_until_ready(&mut transport, &mut buffer, &Completion::Accepted, &policy);

        assert!(matches!(result, Err(DriverError::NotReady { attempts: 4 })));
    }

    #[test]
    fn test_poll_receive_error_aborts() {
        let (mut transport, log) = ScriptedTransport::new();
        transport.push_response(pending_response());
        transport.fail_receive_after(1);

        let mut buffer = [0u8; BUFFER_LENGTH];
        let result =
            poll_until_ready(&mut transport, &mut buffer, &Completion::ClearToSend, &fast(10));

        assert!(result.unwrap_err().is_io());
        assert_eq!(log.receive_count(), 2);
    }

    #[test]
    fn test_zero_budget_still_polls_once() {
        let (mut transport, log) = ScriptedTransport::new();
        transport.push_response(cts_response(&[]));

        let mut buffer = [0u8; BUFFER_LENGTH];
        let outcome =
            poll_until_ready(&mut transport, &mut buffer, &Completion::ClearToSend, &fast(0))
                .unwrap();

        assert!(outcome.is_ready());
        assert_eq!(log.receive_count(), 1);
    }
}
