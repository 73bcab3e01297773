//! Si4713 chip client
//!
//! A thin client speaking the chip's command set over any [`I2cAdapter`].
//! Every call is one write-then-read transaction: opcode and arguments out,
//! status byte and response back. Argument packing only; tuning behaviour is
//! owned by the chip firmware.

use crate::bridge::I2cAdapter;
use crate::error::{DriverError, Result};
use crate::node::{ChipSubdevice, Modulator, TxSubchannels};
use byteorder::{BigEndian, ByteOrder};
use protocol::{CTS, CommandId, Functionality, Segment};
use tracing::debug;

/// Error bit in the chip status byte
pub const STATUS_ERR: u8 = 0x40;

/// POWER_UP argument 1: GPO2 output enable, transmit function
const POWER_UP_TX: u8 = 0x42;
/// POWER_UP argument 2: analog audio input
const POWER_UP_ANALOG: u8 = 0x50;

/// Transmit component enable property (pilot, stereo, RDS)
pub const PROP_TX_COMPONENT_ENABLE: u16 = 0x2100;

/// Lowest and highest tunable frequency in kHz
pub const FREQ_MIN_KHZ: u32 = 76_000;
pub const FREQ_MAX_KHZ: u32 = 108_000;
/// Tuning step in kHz
pub const FREQ_STEP_KHZ: u32 = 50;

/// Reply to GET_REV
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipRevision {
    pub part_number: u8,
    pub firmware: [u8; 2],
    pub patch: u16,
    pub component: [u8; 2],
    pub chip_revision: u8,
}

impl ChipRevision {
    fn parse(response: &[u8]) -> Self {
        Self {
            part_number: response[1],
            firmware: [response[2], response[3]],
            patch: BigEndian::read_u16(&response[4..6]),
            component: [response[6], response[7]],
            chip_revision: response[8],
        }
    }
}

/// Reply to TX_TUNE_STATUS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuneStatus {
    /// Tuned frequency in kHz
    pub frequency_khz: u32,
    /// Output power in dBuV
    pub power: u8,
    pub antenna_capacitor: u8,
    pub noise_level: u8,
}

impl TuneStatus {
    fn parse(response: &[u8]) -> Self {
        Self {
            frequency_khz: u32::from(BigEndian::read_u16(&response[2..4])) * 10,
            power: response[5],
            antenna_capacitor: response[6],
            noise_level: response[7],
        }
    }
}

/// Client for one Si4713 behind an I2C adapter
pub struct Si4713<A> {
    adapter: A,
    address: u16,
}

impl<A: I2cAdapter> Si4713<A> {
    pub fn new(adapter: A, address: u16) -> Self {
        Self { adapter, address }
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    /// What the underlying adapter can carry
    pub fn functionality(&self) -> Functionality {
        self.adapter.functionality()
    }

    /// Send one command and read back `id`'s response bytes
    pub fn send_command(&self, id: CommandId, args: &[u8]) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(1 + args.len());
        data.push(id.opcode());
        data.extend_from_slice(args);

        let mut segments = [
            Segment::write(self.address, data),
            Segment::read(self.address, id.entry().response_count()),
        ];
        self.adapter.transfer(&mut segments)?;
        let response = std::mem::take(&mut segments[1].data);

        let status = response.first().copied().unwrap_or(0);
        debug!("{} status {:#04x}", id, status);
        if status & CTS == 0 {
            return Err(DriverError::ChipBusy { status });
        }
        if status & STATUS_ERR != 0 {
            return Err(DriverError::ChipRejected { status });
        }
        Ok(response)
    }

    pub fn power_up(&self) -> Result<()> {
        self.send_command(CommandId::PowerUp, &[POWER_UP_TX, POWER_UP_ANALOG])
            .map(drop)
    }

    pub fn power_down(&self) -> Result<()> {
        self.send_command(CommandId::PowerDown, &[]).map(drop)
    }

    pub fn revision(&self) -> Result<ChipRevision> {
        let response = self.send_command(CommandId::GetRevision, &[])?;
        Ok(ChipRevision::parse(&response))
    }

    pub fn set_property(&self, property: u16, value: u16) -> Result<()> {
        let mut args = [0u8; 5];
        BigEndian::write_u16(&mut args[1..3], property);
        BigEndian::write_u16(&mut args[3..5], value);
        self.send_command(CommandId::SetProperty, &args).map(drop)
    }

    pub fn get_property(&self, property: u16) -> Result<u16> {
        let mut args = [0u8; 3];
        BigEndian::write_u16(&mut args[1..3], property);
        let response = self.send_command(CommandId::GetProperty, &args)?;
        Ok(BigEndian::read_u16(&response[2..4]))
    }

    /// Tune the transmitter; `khz` must be on the 50 kHz grid within the FM band
    pub fn tune_frequency(&self, khz: u32) -> Result<()> {
        if !(FREQ_MIN_KHZ..=FREQ_MAX_KHZ).contains(&khz) || khz % FREQ_STEP_KHZ != 0 {
            return Err(DriverError::InvalidArgument(format!(
                "frequency {} kHz outside {}..={} in {} kHz steps",
                khz, FREQ_MIN_KHZ, FREQ_MAX_KHZ, FREQ_STEP_KHZ
            )));
        }

        let mut args = [0u8; 3];
        // Range check above keeps khz / 10 within u16.
        BigEndian::write_u16(&mut args[1..3], (khz / 10) as u16);
        self.send_command(CommandId::TuneFrequency, &args).map(drop)
    }

    /// Output power in dBuV, antenna capacitor 0 for automatic
    pub fn tune_power(&self, power: u8, antenna_capacitor: u8) -> Result<()> {
        self.send_command(CommandId::TunePower, &[0, 0, power, antenna_capacitor])
            .map(drop)
    }

    pub fn tune_status(&self, clear_interrupt: bool) -> Result<TuneStatus> {
        let response = self.send_command(CommandId::TuneStatus, &[u8::from(clear_interrupt)])?;
        Ok(TuneStatus::parse(&response))
    }
}

impl<A: I2cAdapter> ChipSubdevice for Si4713<A> {
    fn g_modulator(&self) -> Result<Modulator> {
        let components = self.get_property(PROP_TX_COMPONENT_ENABLE)?;
        Ok(Modulator::fm(TxSubchannels::from_components(components)))
    }

    fn s_modulator(&self, modulator: &Modulator) -> Result<()> {
        self.set_property(
            PROP_TX_COMPONENT_ENABLE,
            modulator.txsubchans.to_components(),
        )
    }

    fn g_frequency(&self) -> Result<u32> {
        Ok(self.tune_status(false)?.frequency_khz)
    }

    fn s_frequency(&self, khz: u32) -> Result<()> {
        self.tune_frequency(khz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Adapter answering from a fixed list, recording writes
    struct FakeAdapter {
        writes: Mutex<Vec<Vec<u8>>>,
        replies: Mutex<Vec<Vec<u8>>>,
    }

    impl FakeAdapter {
        fn new(replies: Vec<Vec<u8>>) -> Self {
            Self {
                writes: Mutex::new(Vec::new()),
                replies: Mutex::new(replies.into_iter().rev().collect()),
            }
        }
    }

    impl I2cAdapter for &FakeAdapter {
        fn transfer(&self, segments: &mut [Segment]) -> Result<usize> {
            self.writes.lock().unwrap().push(segments[0].data.clone());
            let reply = self.replies.lock().unwrap().pop().unwrap_or_default();
            let read = &mut segments[1].data;
            let len = read.len().min(reply.len());
            read[..len].copy_from_slice(&reply[..len]);
            Ok(segments.len())
        }

        fn functionality(&self) -> Functionality {
            Functionality::I2C
        }
    }

    #[test]
    fn test_tune_frequency_packs_big_endian() {
        let adapter = FakeAdapter::new(vec![vec![0x80]]);
        let chip = Si4713::new(&adapter, 0x63);
        chip.tune_frequency(98_100).unwrap();

        let writes = adapter.writes.lock().unwrap();
        assert_eq!(writes[0], vec![0x30, 0x00, 0x26, 0x52]);
    }

    #[test]
    fn test_tune_frequency_out_of_band() {
        let adapter = FakeAdapter::new(vec![]);
        let chip = Si4713::new(&adapter, 0x63);
        assert!(matches!(
            chip.tune_frequency(120_000),
            Err(DriverError::InvalidArgument(_))
        ));
        assert!(chip.tune_frequency(98_125).is_err());
        assert!(adapter.writes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_revision_parse() {
        let adapter = FakeAdapter::new(vec![vec![
            0x80, 0x0d, b'3', b'0', 0x12, 0x34, b'2', b'0', 0x43,
        ]]);
        let chip = Si4713::new(&adapter, 0x63);
        let rev = chip.revision().unwrap();
        assert_eq!(rev.part_number, 0x0d);
        assert_eq!(&rev.firmware, b"30");
        assert_eq!(rev.patch, 0x1234);
        assert_eq!(rev.chip_revision, 0x43);
    }

    #[test]
    fn test_busy_and_rejected_status() {
        let adapter = FakeAdapter::new(vec![vec![0x00], vec![0xc0]]);
        let chip = Si4713::new(&adapter, 0x63);
        assert!(matches!(
            chip.power_up(),
            Err(DriverError::ChipBusy { status: 0x00 })
        ));
        assert!(matches!(
            chip.power_up(),
            Err(DriverError::ChipRejected { status: 0xc0 })
        ));
    }

    #[test]
    fn test_tune_status_parse() {
        let adapter = FakeAdapter::new(vec![vec![0x80, 0x00, 0x26, 0x52, 0x00, 115, 0x20, 0x05]]);
        let chip = Si4713::new(&adapter, 0x63);
        let status = chip.tune_status(true).unwrap();
        assert_eq!(status.frequency_khz, 98_100);
        assert_eq!(status.power, 115);
        assert_eq!(adapter.writes.lock().unwrap()[0], vec![0x33, 0x01]);
    }

    #[test]
    fn test_set_property_args() {
        let adapter = FakeAdapter::new(vec![vec![0x80]]);
        let chip = Si4713::new(&adapter, 0x63);
        chip.set_property(PROP_TX_COMPONENT_ENABLE, 0x0007).unwrap();
        assert_eq!(
            adapter.writes.lock().unwrap()[0],
            vec![0x12, 0x00, 0x21, 0x00, 0x00, 0x07]
        );
    }
}
