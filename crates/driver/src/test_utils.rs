//! Test utilities for the driver
//!
//! Provides a scripted [`Transport`] double that records every call and
//! answers receives from a queue, falling back to a responder that emulates
//! a healthy board.
//!
//! # Example
//!
//! ```
//! use driver::test_utils::{ScriptedTransport, cts_response};
//! use driver::transport::Transport;
//!
//! let (mut transport, log) = ScriptedTransport::new();
//! transport.push_response(cts_response(&[0x0d]));
//!
//! let mut buffer = [0u8; 64];
//! transport.receive(&mut buffer).unwrap();
//! assert_eq!(&buffer[..4], &[0x3f, 0x00, 0x80, 0x0d]);
//! assert_eq!(log.receive_count(), 1);
//! ```

use crate::error::{DriverError, Result};
use crate::transport::Transport;
use protocol::{BUFFER_LENGTH, CTS, FRAME_MARKER};
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

pub type Frame = [u8; BUFFER_LENGTH];

/// One recorded transport call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Send(Frame),
    Receive,
}

/// Shared view of the calls a [`ScriptedTransport`] has seen
#[derive(Debug, Clone, Default)]
pub struct TransportLog {
    calls: Arc<Mutex<Vec<TransportCall>>>,
}

impl TransportLog {
    fn lock(&self) -> MutexGuard<'_, Vec<TransportCall>> {
        // A panicking test thread must not hide the log from the others.
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: TransportCall) {
        self.lock().push(call);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().clone()
    }

    pub fn sent_frames(&self) -> Vec<Frame> {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                TransportCall::Send(frame) => Some(*frame),
                TransportCall::Receive => None,
            })
            .collect()
    }

    pub fn send_count(&self) -> usize {
        self.sent_frames().len()
    }

    pub fn receive_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|call| matches!(call, TransportCall::Receive))
            .count()
    }

    pub fn call_count(&self) -> usize {
        self.lock().len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

type Responder = Box<dyn FnMut(&Frame) -> Frame + Send>;

/// Scripted transport double
pub struct ScriptedTransport {
    log: TransportLog,
    responses: VecDeque<Frame>,
    responder: Responder,
    last_sent: Frame,
    sends: usize,
    receives: usize,
    fail_send_after: Option<usize>,
    fail_receive_after: Option<usize>,
    gate: Option<(Sender<()>, Receiver<()>)>,
}

impl ScriptedTransport {
    /// New transport emulating a healthy board, plus its call log
    pub fn new() -> (Self, TransportLog) {
        let log = TransportLog::default();
        let transport = Self {
            log: log.clone(),
            responses: VecDeque::new(),
            responder: Box::new(healthy_board_response),
            last_sent: [0; BUFFER_LENGTH],
            sends: 0,
            receives: 0,
            fail_send_after: None,
            fail_receive_after: None,
            gate: None,
        };
        (transport, log)
    }

    /// Queue a response for the next receive
    pub fn push_response(&mut self, frame: Frame) {
        self.responses.push_back(frame);
    }

    /// Answer every unqueued receive with the same frame
    pub fn set_default_response(&mut self, frame: Frame) {
        self.responder = Box::new(move |_| frame);
    }

    /// Answer unqueued receives from the last sent frame
    pub fn set_responder(&mut self, responder: impl FnMut(&Frame) -> Frame + Send + 'static) {
        self.responder = Box::new(responder);
    }

    /// Let `count` sends succeed, then fail every following one
    pub fn fail_send_after(&mut self, count: usize) {
        self.fail_send_after = Some(count);
    }

    /// Let `count` receives succeed, then fail every following one
    pub fn fail_receive_after(&mut self, count: usize) {
        self.fail_receive_after = Some(count);
    }

    /// Block the next receive until the returned gate is released
    pub fn block_next_receive(&mut self) -> ReceiveGate {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        self.gate = Some((entered_tx, release_rx));
        ReceiveGate {
            entered: entered_rx,
            release: release_tx,
        }
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, buffer: &[u8]) -> Result<()> {
        let mut frame = [0u8; BUFFER_LENGTH];
        let len = buffer.len().min(BUFFER_LENGTH);
        frame[..len].copy_from_slice(&buffer[..len]);
        self.log.record(TransportCall::Send(frame));

        self.sends += 1;
        if self.fail_send_after.is_some_and(|limit| self.sends > limit) {
            return Err(DriverError::Usb {
                op: "send",
                source: rusb::Error::Pipe,
            });
        }

        self.last_sent = frame;
        Ok(())
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<()> {
        self.log.record(TransportCall::Receive);

        if let Some((entered, release)) = self.gate.take() {
            let _ = entered.send(());
            let _ = release.recv();
        }

        self.receives += 1;
        if self.fail_receive_after.is_some_and(|limit| self.receives > limit) {
            return Err(DriverError::Usb {
                op: "receive",
                source: rusb::Error::Io,
            });
        }

        let frame = match self.responses.pop_front() {
            Some(frame) => frame,
            None => (self.responder)(&self.last_sent),
        };
        let len = buffer.len().min(BUFFER_LENGTH);
        buffer[..len].copy_from_slice(&frame[..len]);
        Ok(())
    }
}

/// Test-side handle of a blocked receive
pub struct ReceiveGate {
    entered: Receiver<()>,
    release: Sender<()>,
}

impl ReceiveGate {
    /// Wait until the transport is parked inside the receive
    pub fn wait_entered(&self, timeout: Duration) -> bool {
        self.entered.recv_timeout(timeout).is_ok()
    }

    /// Let the blocked receive complete
    pub fn release(self) {
        let _ = self.release.send(());
    }
}

/// Response with `payload` starting at offset 2 (status byte first)
pub fn response(payload: &[u8]) -> Frame {
    let mut frame = [0u8; BUFFER_LENGTH];
    frame[0] = FRAME_MARKER;
    frame[2..2 + payload.len()].copy_from_slice(payload);
    frame
}

/// Accepted response with CTS set and `data` following the status byte
pub fn cts_response(data: &[u8]) -> Frame {
    let mut frame = response(&[CTS]);
    frame[3..3 + data.len()].copy_from_slice(data);
    frame
}

/// Response the board gives while the transfer is still in progress
pub fn pending_response() -> Frame {
    let mut frame = [0u8; BUFFER_LENGTH];
    frame[0] = FRAME_MARKER;
    frame[1] = 0x01;
    frame
}

/// What a healthy board answers after `sent`
///
/// Satisfies every completion preset the command and start tables use.
pub fn healthy_board_response(sent: &Frame) -> Frame {
    if sent[1] == 0x32 {
        return response(&[0x00]);
    }
    let mut frame = cts_response(&[]);
    frame[9] = 0x08;
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{CommandId, Completion, START_SEQUENCE, WireFrame};

    #[test]
    fn test_healthy_board_satisfies_start_sequence() {
        for step in START_SEQUENCE.iter() {
            let frame = WireFrame::startup(step).unwrap();
            let answer = healthy_board_response(frame.as_bytes());
            assert!(step.completion.is_satisfied(&answer), "{:?}", step);
        }
    }

    #[test]
    fn test_healthy_board_satisfies_commands() {
        for id in CommandId::ALL {
            let frame = WireFrame::command(id, &[]).unwrap();
            let answer = healthy_board_response(frame.as_bytes());
            assert!(id.entry().completion.is_satisfied(&answer), "{}", id);
        }
    }

    #[test]
    fn test_queue_beats_responder() {
        let (mut transport, log) = ScriptedTransport::new();
        transport.push_response(pending_response());

        let mut buffer = [0u8; BUFFER_LENGTH];
        transport.receive(&mut buffer).unwrap();
        assert!(!Completion::Accepted.is_satisfied(&buffer));
        transport.receive(&mut buffer).unwrap();
        assert!(Completion::ClearToSend.is_satisfied(&buffer));
        assert_eq!(log.receive_count(), 2);
    }

    #[test]
    fn test_fail_send_after() {
        let (mut transport, log) = ScriptedTransport::new();
        transport.fail_send_after(1);

        assert!(transport.send(&[0u8; BUFFER_LENGTH]).is_ok());
        assert!(transport.send(&[0u8; BUFFER_LENGTH]).is_err());
        assert_eq!(log.send_count(), 2);
    }
}
