//! Attach and detach
//!
//! `on_attach` allocates the instance, runs the start sequence and only then
//! hands out the I2C adapter; a failed bring-up leaves nothing registered.
//! `on_detach` unregisters the adapter first and then releases the instance,
//! waiting for any transaction that still holds the device lock.

use crate::bridge::I2cBridge;
use crate::error::Result;
use crate::instance::{DriverInstance, InstanceId, InstanceSettings};
use crate::startup::{StartupReport, StartupSequencer};
use crate::transport::Transport;
use std::sync::Arc;
use tracing::{info, warn};

/// A board that passed bring-up
#[derive(Debug)]
pub struct AttachedDevice {
    instance: Arc<DriverInstance>,
    adapter: Option<I2cBridge>,
    startup: StartupReport,
}

impl AttachedDevice {
    pub fn id(&self) -> InstanceId {
        self.instance.id()
    }

    /// The registered I2C adapter (None once unregistered)
    pub fn adapter(&self) -> Option<I2cBridge> {
        self.adapter.clone()
    }

    pub fn startup_report(&self) -> &StartupReport {
        &self.startup
    }

    pub fn instance(&self) -> &Arc<DriverInstance> {
        &self.instance
    }
}

/// Bring up a newly attached board
pub fn on_attach<T: Transport + 'static>(
    transport: T,
    settings: InstanceSettings,
) -> Result<AttachedDevice> {
    let instance = Arc::new(DriverInstance::new(Box::new(transport), settings)?);
    info!("Attaching {}", instance.id());

    let mut sequencer = StartupSequencer::new();
    let startup = match instance.with_session(|session| sequencer.run(session)) {
        Ok(report) => report,
        Err(e) => {
            warn!("Bring-up of {} failed: {}", instance.id(), e);
            instance.shutdown();
            return Err(e);
        }
    };

    if !startup.exhausted.is_empty() {
        warn!(
            "{}: {} start step(s) were not confirmed by the board",
            instance.id(),
            startup.exhausted.len()
        );
    }

    let adapter = I2cBridge::new(&instance);
    info!("Registered adapter '{}'", adapter.name());

    Ok(AttachedDevice {
        instance,
        adapter: Some(adapter),
        startup,
    })
}

/// Tear down an attached board
///
/// Blocks until an in-flight transaction releases the device lock. Adapter
/// clones held elsewhere fail with `Disconnected` from then on.
pub fn on_detach(mut device: AttachedDevice) {
    let id = device.id();

    if let Some(adapter) = device.adapter.take() {
        info!("Unregistered adapter '{}'", adapter.name());
    }

    if device.instance.shutdown() {
        info!("Detached {}", id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;
    use crate::test_utils::ScriptedTransport;
    use crate::transport::PollPolicy;
    use std::time::Duration;

    fn fast_settings() -> InstanceSettings {
        let fast = PollPolicy {
            interval: Duration::ZERO,
            max_attempts: 15,
            fail_on_exhaustion: false,
        };
        InstanceSettings {
            startup_poll: fast,
            command_poll: fast,
            ..InstanceSettings::default()
        }
    }

    #[test]
    fn test_attach_and_detach() {
        let (transport, _log) = ScriptedTransport::new();
        let device = on_attach(transport, fast_settings()).unwrap();
        let adapter = device.adapter().expect("adapter registered");
        let instance = Arc::clone(device.instance());

        adapter.write(0x63, &[0x14]).unwrap();
        on_detach(device);

        assert!(!instance.is_live());
        assert!(matches!(
            adapter.write(0x63, &[0x14]),
            Err(DriverError::Disconnected)
        ));
    }

    #[test]
    fn test_failed_startup_releases_instance() {
        let (mut transport, log) = ScriptedTransport::new();
        transport.fail_send_after(2);

        let err = on_attach(transport, fast_settings()).unwrap_err();
        assert!(matches!(err, DriverError::StartupFailed { step: 2, .. }));
        assert_eq!(log.send_count(), 3);
    }
}
