//! Startup sequencer
//!
//! Replays the start sequence table against the raw transport when a board
//! is attached. A failed sequence is not retried in place: the device has to
//! be detached and attached again.

use crate::error::{DriverError, Result};
use crate::instance::Session;
use crate::transport::{PollOutcome, poll_until_ready};
use protocol::WireFrame;
use tracing::{debug, info, warn};

/// Where the sequencer stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    NotStarted,
    /// Currently sending or awaiting the given step
    Running(usize),
    Ready,
    /// Step that failed
    Failed(usize),
}

/// Summary of a completed bring-up
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupReport {
    /// Steps sent
    pub steps: usize,
    /// Steps whose poll loop ran out of attempts without the expected reply
    pub exhausted: Vec<usize>,
}

/// Single-shot replay of the start sequence
#[derive(Debug)]
pub struct StartupSequencer {
    state: SequencerState,
}

impl StartupSequencer {
    pub fn new() -> Self {
        Self {
            state: SequencerState::NotStarted,
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// Send every step in order, waiting for each step's completion
    pub fn run(&mut self, session: &mut Session) -> Result<StartupReport> {
        if self.state != SequencerState::NotStarted {
            return Err(DriverError::StartupAlreadyRan);
        }

        let steps = session.settings().start_sequence;
        let policy = session.settings().startup_poll;
        let mut report = StartupReport::default();

        info!("Running start sequence ({} steps)", steps.len());

        for (index, step) in steps.iter().enumerate() {
            self.state = SequencerState::Running(index);

            let result = WireFrame::startup(step)
                .map_err(DriverError::from)
                .and_then(|frame| {
                    let (transport, buffer) = session.split();
                    buffer.copy_from_slice(frame.as_bytes());
                    transport.send(&buffer[..])?;
                    poll_until_ready(transport, buffer, &step.completion, &policy)
                });

            match result {
                Ok(PollOutcome::Ready { attempts }) => {
                    debug!("Start step {} ready after {} poll(s)", index, attempts);
                }
                Ok(PollOutcome::Exhausted { attempts }) => {
                    warn!(
                        "Start step {} ({:02x?}) not confirmed after {} polls, continuing",
                        index, step.payload, attempts
                    );
                    report.exhausted.push(index);
                }
                Err(e) => {
                    warn!("Start step {} failed: {}", index, e);
                    self.state = SequencerState::Failed(index);
                    return Err(DriverError::StartupFailed {
                        step: index,
                        source: Box::new(e),
                    });
                }
            }

            report.steps += 1;
        }

        self.state = SequencerState::Ready;
        info!("Start sequence complete");
        Ok(report)
    }
}

impl Default for StartupSequencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{DriverInstance, InstanceSettings};
    use crate::test_utils::{ScriptedTransport, pending_response};
    use crate::transport::PollPolicy;
    use protocol::{FRAME_MARKER, START_SEQUENCE, StartStep};
    use std::time::Duration;

    static SHORT_SEQUENCE: [StartStep; 3] = [
        StartStep::new(&[0x03]),
        StartStep::new(&[0x32, 0x7f]),
        StartStep::new(&[0x12]),
    ];

    fn settings(sequence: &'static [StartStep]) -> InstanceSettings {
        let fast = PollPolicy {
            interval: Duration::ZERO,
            max_attempts: 15,
            fail_on_exhaustion: false,
        };
        InstanceSettings {
            startup_poll: fast,
            command_poll: fast,
            start_sequence: sequence,
            ..InstanceSettings::default()
        }
    }

    #[test]
    fn test_full_sequence_in_order() {
        let (transport, log) = ScriptedTransport::new();
        let instance = DriverInstance::new(Box::new(transport), settings(&START_SEQUENCE)).unwrap();
        let mut sequencer = StartupSequencer::new();

        let report = instance.with_session(|s| sequencer.run(s)).unwrap();

        assert_eq!(sequencer.state(), SequencerState::Ready);
        assert_eq!(report.steps, START_SEQUENCE.len());
        assert!(report.exhausted.is_empty());

        let sent = log.sent_frames();
        assert_eq!(sent.len(), START_SEQUENCE.len());
        for (frame, step) in sent.iter().zip(START_SEQUENCE.iter()) {
            assert_eq!(frame[0], FRAME_MARKER);
            assert_eq!(&frame[1..1 + step.len()], step.payload);
            assert!(frame[1 + step.len()..].iter().all(|b| *b == 0));
        }
    }

    #[test]
    fn test_send_failure_fails_sequence() {
        let (mut transport, log) = ScriptedTransport::new();
        transport.fail_send_after(1);
        let instance = DriverInstance::new(Box::new(transport), settings(&SHORT_SEQUENCE)).unwrap();
        let mut sequencer = StartupSequencer::new();

        let err = instance.with_session(|s| sequencer.run(s)).unwrap_err();

        assert!(matches!(err, DriverError::StartupFailed { step: 1, .. }));
        assert_eq!(sequencer.state(), SequencerState::Failed(1));
        assert_eq!(log.send_count(), 2);
    }

    #[test]
    fn test_exhausted_step_is_not_fatal() {
        let (mut transport, log) = ScriptedTransport::new();
        transport.set_default_response(pending_response());
        let instance = DriverInstance::new(Box::new(transport), settings(&SHORT_SEQUENCE)).unwrap();
        let mut sequencer = StartupSequencer::new();

        let report = instance.with_session(|s| sequencer.run(s)).unwrap();

        assert_eq!(report.exhausted, vec![0, 1, 2]);
        assert_eq!(log.receive_count(), 3 * 15);
        assert_eq!(sequencer.state(), SequencerState::Ready);
    }

    #[test]
    fn test_sequencer_is_single_shot() {
        let (transport, _log) = ScriptedTransport::new();
        let instance = DriverInstance::new(Box::new(transport), settings(&SHORT_SEQUENCE)).unwrap();
        let mut sequencer = StartupSequencer::new();

        instance.with_session(|s| sequencer.run(s)).unwrap();
        let again = instance.with_session(|s| sequencer.run(s));
        assert!(matches!(again, Err(DriverError::StartupAlreadyRan)));
    }
}
