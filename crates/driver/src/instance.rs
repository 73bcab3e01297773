//! Driver instance: the per-device owner of the transport and the buffer
//!
//! All traffic to one board goes through a single [`Session`] guarded by one
//! mutex. Holding the lock is the only way to touch the buffer or the
//! transport, so at most one control transaction (and its poll loop) is in
//! flight per device. Teardown takes the same lock, waits for any running
//! transaction, and drops the session; later calls see
//! [`DriverError::Disconnected`].

use crate::error::{DriverError, Result};
use crate::transport::{PollPolicy, Transport};
use protocol::{BUFFER_LENGTH, CommandId, Completion, START_SEQUENCE, StartStep};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, TryLockError};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info};

static NEXT_INSTANCE_ID: AtomicU32 = AtomicU32::new(1);

/// Process-unique instance identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(pub u32);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "si4713-{}", self.0)
    }
}

/// Protocol knobs fixed for the lifetime of an instance
#[derive(Debug, Clone)]
pub struct InstanceSettings {
    /// Poll policy for each bring-up step
    pub startup_poll: PollPolicy,
    /// Poll policy after each logical command
    pub command_poll: PollPolicy,
    /// Per-command completion overrides of the command table
    pub completion_overrides: HashMap<CommandId, Completion>,
    /// Bring-up steps replayed on attach
    pub start_sequence: &'static [StartStep],
}

impl InstanceSettings {
    /// Completion predicate in effect for `id`
    pub fn completion_for(&self, id: CommandId) -> Completion {
        self.completion_overrides
            .get(&id)
            .copied()
            .unwrap_or(id.entry().completion)
    }
}

impl Default for InstanceSettings {
    fn default() -> Self {
        Self {
            startup_poll: PollPolicy::STARTUP,
            command_poll: PollPolicy::COMMAND,
            completion_overrides: HashMap::new(),
            start_sequence: &START_SEQUENCE,
        }
    }
}

/// Exclusive access to one board's transport and buffer
pub struct Session {
    transport: Box<dyn Transport>,
    buffer: Box<[u8; BUFFER_LENGTH]>,
    settings: InstanceSettings,
}

impl Session {
    pub fn settings(&self) -> &InstanceSettings {
        &self.settings
    }

    pub fn buffer(&self) -> &[u8; BUFFER_LENGTH] {
        &self.buffer
    }

    /// Transport and buffer borrowed together
    pub fn split(&mut self) -> (&mut (dyn Transport + 'static), &mut [u8; BUFFER_LENGTH]) {
        (self.transport.as_mut(), &mut self.buffer)
    }
}

/// One attached board
pub struct DriverInstance {
    id: InstanceId,
    session: Mutex<Option<Session>>,
}

impl DriverInstance {
    /// Allocate the device buffer and take ownership of the transport
    pub fn new(transport: Box<dyn Transport>, settings: InstanceSettings) -> Result<Self> {
        let buffer = allocate_buffer()?;
        let id = InstanceId(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed));
        debug!("Allocated instance {}", id);

        Ok(Self {
            id,
            session: Mutex::new(Some(Session {
                transport,
                buffer,
                settings,
            })),
        })
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Run `f` with the session locked
    ///
    /// Blocks while another transaction holds the lock. Fails with
    /// [`DriverError::Disconnected`] once the instance has been shut down.
    pub fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> Result<R>) -> Result<R> {
        let mut guard = self.session.lock().map_err(|_| DriverError::LockPoisoned)?;
        let session = guard.as_mut().ok_or(DriverError::Disconnected)?;
        f(session)
    }

    /// Whether the session is still available
    pub fn is_live(&self) -> bool {
        self.session
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Wait for the in-flight transaction, then release transport and buffer
    ///
    /// Returns false if the instance had already been shut down.
    pub fn shutdown(&self) -> bool {
        // Poisoning only means a transaction panicked; teardown still has to run.
        let mut guard = self.session.lock().unwrap_or_else(|e| e.into_inner());
        let released = guard.take().is_some();
        if released {
            info!("Instance {} released", self.id);
        }
        released
    }
}

impl fmt::Debug for DriverInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never block here: formatting may happen while this thread holds the lock.
        let state = match self.session.try_lock() {
            Ok(guard) if guard.is_some() => "live",
            Ok(_) => "released",
            Err(TryLockError::WouldBlock) => "busy",
            Err(TryLockError::Poisoned(_)) => "poisoned",
        };
        f.debug_struct("DriverInstance")
            .field("id", &self.id)
            .field("state", &state)
            .finish()
    }
}

fn allocate_buffer() -> Result<Box<[u8; BUFFER_LENGTH]>> {
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(BUFFER_LENGTH)
        .map_err(|_| DriverError::AllocationFailure)?;
    bytes.resize(BUFFER_LENGTH, 0u8);
    bytes
        .into_boxed_slice()
        .try_into()
        .map_err(|_| DriverError::AllocationFailure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedTransport;

    fn instance() -> DriverInstance {
        let (transport, _log) = ScriptedTransport::new();
        DriverInstance::new(Box::new(transport), InstanceSettings::default()).unwrap()
    }

    #[test]
    fn test_instance_ids_are_unique() {
        let a = instance();
        let b = instance();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_buffer_starts_zeroed() {
        let instance = instance();
        instance
            .with_session(|session| {
                assert!(session.buffer().iter().all(|b| *b == 0));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_shutdown_disconnects() {
        let instance = instance();
        assert!(instance.is_live());
        assert!(instance.shutdown());
        assert!(!instance.is_live());
        assert!(!instance.shutdown());

        let result = instance.with_session(|_| Ok(()));
        assert!(matches!(result, Err(DriverError::Disconnected)));
    }

    #[test]
    fn test_debug_inside_session_does_not_block() {
        let instance = instance();
        let inside = instance
            .with_session(|_| Ok(format!("{:?}", instance)))
            .unwrap();
        assert!(inside.contains("busy"), "{}", inside);
        assert!(format!("{:?}", instance).contains("live"));

        instance.shutdown();
        assert!(format!("{:?}", instance).contains("released"));
    }

    #[test]
    fn test_completion_override() {
        let mut settings = InstanceSettings::default();
        assert_eq!(
            settings.completion_for(CommandId::GetRevision),
            Completion::ClearToSend
        );

        settings
            .completion_overrides
            .insert(CommandId::GetRevision, Completion::Accepted);
        assert_eq!(
            settings.completion_for(CommandId::GetRevision),
            Completion::Accepted
        );
        assert_eq!(
            settings.completion_for(CommandId::PowerUp),
            Completion::ClearToSend
        );
    }
}
