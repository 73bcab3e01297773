//! Emulated I2C adapter
//!
//! The chip driver talks I2C: it writes a command (opcode + arguments) and
//! reads the response back. The board has no I2C passthrough, so writes are
//! classified by opcode and re-framed as logical commands, and reads are
//! served from the response the board hands back on the control pipe.
//!
//! Only the transaction shapes the board can express are accepted: one read,
//! one write, or a write followed by a read at the same address.

use crate::error::{DriverError, Result};
use crate::framer;
use crate::instance::{DriverInstance, InstanceId, Session};
use protocol::{CommandId, Direction, Functionality, HEADER_LENGTH, MAX_ARGS, MAX_READ, Segment};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// What a chip driver needs from an I2C bus
pub trait I2cAdapter: Send + Sync {
    /// Execute `segments` as one transaction, returning how many completed
    fn transfer(&self, segments: &mut [Segment]) -> Result<usize>;

    /// Capabilities advertised to the client
    fn functionality(&self) -> Functionality;
}

/// I2C adapter backed by a driver instance
///
/// Holds a non-owning reference: once the instance is gone every call fails
/// with [`DriverError::Disconnected`].
#[derive(Debug, Clone)]
pub struct I2cBridge {
    instance: Weak<DriverInstance>,
    id: InstanceId,
}

impl I2cBridge {
    pub fn new(instance: &Arc<DriverInstance>) -> Self {
        Self {
            instance: Arc::downgrade(instance),
            id: instance.id(),
        }
    }

    /// Adapter name as registered with the chip driver
    pub fn name(&self) -> String {
        format!("{} i2c", self.id)
    }

    fn instance(&self) -> Result<Arc<DriverInstance>> {
        self.instance.upgrade().ok_or(DriverError::Disconnected)
    }

    /// Single-segment write: `bytes[0]` is the opcode, the rest its arguments
    pub fn write(&self, address: u16, bytes: &[u8]) -> Result<()> {
        let command = classify(bytes)?;
        self.instance()?
            .with_session(|session| write_locked(session, address, command, &bytes[1..]))
    }

    /// Single-segment read of `buf.len()` bytes from the current response
    pub fn read(&self, address: u16, buf: &mut [u8]) -> Result<()> {
        check_read_len(buf.len())?;
        self.instance()?
            .with_session(|session| read_locked(session, address, buf))
    }

    /// Execute a one- or two-segment transaction
    pub fn transfer(&self, segments: &mut [Segment]) -> Result<usize> {
        match segments {
            [single] => {
                match single.direction {
                    Direction::Write => self.write(single.address, &single.data)?,
                    Direction::Read => self.read(single.address, &mut single.data)?,
                }
                Ok(1)
            }
            [first, second] => {
                if first.address != second.address {
                    return Err(DriverError::UnsupportedTransaction(format!(
                        "segments address {:#04x} and {:#04x}",
                        first.address, second.address
                    )));
                }
                if first.direction != Direction::Write || second.direction != Direction::Read {
                    return Err(DriverError::UnsupportedTransaction(format!(
                        "{:?} followed by {:?}",
                        first.direction, second.direction
                    )));
                }

                let command = classify(&first.data)?;
                check_read_len(second.len())?;

                // Both halves under one lock: nothing can slip in between.
                self.instance()?.with_session(|session| {
                    write_locked(session, first.address, command, &first.data[1..])?;
                    read_locked(session, second.address, &mut second.data)
                })?;
                Ok(2)
            }
            _ => Err(DriverError::UnsupportedTransaction(format!(
                "{} segments",
                segments.len()
            ))),
        }
    }

    /// Plain I2C only: no SMBus emulation, no 10-bit addressing
    pub fn functionality(&self) -> Functionality {
        Functionality::I2C
    }
}

impl I2cAdapter for I2cBridge {
    fn transfer(&self, segments: &mut [Segment]) -> Result<usize> {
        I2cBridge::transfer(self, segments)
    }

    fn functionality(&self) -> Functionality {
        I2cBridge::functionality(self)
    }
}

fn classify(bytes: &[u8]) -> Result<CommandId> {
    let (&opcode, args) = bytes.split_first().ok_or(DriverError::InvalidLength {
        len: 0,
        max: MAX_ARGS + 1,
    })?;
    let command =
        CommandId::from_opcode(opcode).map_err(|_| DriverError::UnsupportedCommand(opcode))?;
    if args.len() > MAX_ARGS {
        return Err(DriverError::InvalidLength {
            len: bytes.len(),
            max: MAX_ARGS + 1,
        });
    }
    Ok(command)
}

fn check_read_len(len: usize) -> Result<()> {
    if len > MAX_READ {
        return Err(DriverError::InvalidLength { len, max: MAX_READ });
    }
    Ok(())
}

fn write_locked(session: &mut Session, address: u16, command: CommandId, args: &[u8]) -> Result<()> {
    trace!("i2c write {:#04x}: {} {:02x?}", address, command, args);
    let response = framer::execute(session, command, args)?;
    debug!(
        "{} accepted (status {:#04x}, ready: {})",
        command,
        response.status(),
        response.outcome.is_ready()
    );
    Ok(())
}

fn read_locked(session: &mut Session, address: u16, buf: &mut [u8]) -> Result<()> {
    let (transport, buffer) = session.split();
    transport.receive(&mut buffer[..])?;
    buf.copy_from_slice(&buffer[HEADER_LENGTH..HEADER_LENGTH + buf.len()]);
    trace!("i2c read {:#04x}: {:02x?}", address, buf);
    Ok(())
}
