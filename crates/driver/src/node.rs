//! Modulator device node
//!
//! The user-facing radio node: reports what the device can do and forwards
//! modulator and frequency requests to the chip subdevice unchanged.

use crate::error::{DriverError, Result};
use std::fmt;

/// Driver name reported in capabilities
pub const DRIVER_NAME: &str = "radio-si4713-usb";
/// Card name reported in capabilities
pub const CARD_NAME: &str = "Si4713 FM Radio Transmitter";

/// Device capability bits (V4L2 numbering)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CapabilityFlags(u32);

impl CapabilityFlags {
    pub const TUNER: CapabilityFlags = CapabilityFlags(0x0001_0000);
    pub const RADIO: CapabilityFlags = CapabilityFlags(0x0004_0000);
    pub const MODULATOR: CapabilityFlags = CapabilityFlags(0x0008_0000);
    pub const RDS_OUTPUT: CapabilityFlags = CapabilityFlags(0x0000_0800);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: CapabilityFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: CapabilityFlags) -> CapabilityFlags {
        CapabilityFlags(self.0 | other.0)
    }
}

impl fmt::Debug for CapabilityFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        for (flag, name) in [
            (Self::TUNER, "TUNER"),
            (Self::RADIO, "RADIO"),
            (Self::MODULATOR, "MODULATOR"),
            (Self::RDS_OUTPUT, "RDS_OUTPUT"),
        ] {
            if self.contains(flag) {
                names.push(name);
            }
        }
        write!(f, "CapabilityFlags({})", names.join(" | "))
    }
}

/// Answer to a capability query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub driver: String,
    pub card: String,
    pub bus_info: String,
    pub flags: CapabilityFlags,
}

/// Which subchannels the transmitter carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxSubchannels {
    pub stereo: bool,
    pub rds: bool,
}

impl TxSubchannels {
    const PILOT: u16 = 0x0001;
    const LEFT_MINUS_RIGHT: u16 = 0x0002;
    const RDS: u16 = 0x0004;

    /// Decode the chip's component-enable property
    pub fn from_components(components: u16) -> Self {
        Self {
            stereo: components & Self::LEFT_MINUS_RIGHT != 0,
            rds: components & Self::RDS != 0,
        }
    }

    /// Encode as the chip's component-enable property
    pub fn to_components(self) -> u16 {
        let mut components = 0;
        if self.stereo {
            components |= Self::PILOT | Self::LEFT_MINUS_RIGHT;
        }
        if self.rds {
            components |= Self::RDS;
        }
        components
    }
}

/// Modulator description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modulator {
    pub index: u32,
    pub name: String,
    /// Lowest frequency in kHz
    pub range_low_khz: u32,
    /// Highest frequency in kHz
    pub range_high_khz: u32,
    pub txsubchans: TxSubchannels,
}

impl Modulator {
    /// The FM modulator of the Si4713
    pub fn fm(txsubchans: TxSubchannels) -> Self {
        Self {
            index: 0,
            name: "FM Modulator".to_string(),
            range_low_khz: crate::chip::FREQ_MIN_KHZ,
            range_high_khz: crate::chip::FREQ_MAX_KHZ,
            txsubchans,
        }
    }
}

/// Operations the node forwards to the chip driver
pub trait ChipSubdevice {
    fn g_modulator(&self) -> Result<Modulator>;
    fn s_modulator(&self, modulator: &Modulator) -> Result<()>;
    /// Current frequency in kHz
    fn g_frequency(&self) -> Result<u32>;
    fn s_frequency(&self, khz: u32) -> Result<()>;
}

impl<C: ChipSubdevice + ?Sized> ChipSubdevice for &C {
    fn g_modulator(&self) -> Result<Modulator> {
        (**self).g_modulator()
    }

    fn s_modulator(&self, modulator: &Modulator) -> Result<()> {
        (**self).s_modulator(modulator)
    }

    fn g_frequency(&self) -> Result<u32> {
        (**self).g_frequency()
    }

    fn s_frequency(&self, khz: u32) -> Result<()> {
        (**self).s_frequency(khz)
    }
}

/// The exposed modulator node
pub struct ModulatorNode<C> {
    subdev: C,
    bus_info: String,
}

impl<C: ChipSubdevice> ModulatorNode<C> {
    pub fn new(subdev: C, bus_info: impl Into<String>) -> Self {
        Self {
            subdev,
            bus_info: bus_info.into(),
        }
    }

    /// Transmit-only: modulator with RDS output, never a tuner or receiver
    pub fn querycap(&self) -> Capabilities {
        Capabilities {
            driver: DRIVER_NAME.to_string(),
            card: CARD_NAME.to_string(),
            bus_info: self.bus_info.clone(),
            flags: CapabilityFlags::MODULATOR.union(CapabilityFlags::RDS_OUTPUT),
        }
    }

    pub fn g_modulator(&self, index: u32) -> Result<Modulator> {
        check_index(index)?;
        self.subdev.g_modulator()
    }

    pub fn s_modulator(&self, modulator: &Modulator) -> Result<()> {
        check_index(modulator.index)?;
        self.subdev.s_modulator(modulator)
    }

    pub fn g_frequency(&self, index: u32) -> Result<u32> {
        check_index(index)?;
        self.subdev.g_frequency()
    }

    pub fn s_frequency(&self, index: u32, khz: u32) -> Result<()> {
        check_index(index)?;
        self.subdev.s_frequency(khz)
    }

    pub fn subdev(&self) -> &C {
        &self.subdev
    }
}

fn check_index(index: u32) -> Result<()> {
    if index != 0 {
        return Err(DriverError::InvalidArgument(format!(
            "modulator index {}",
            index
        )));
    }
    Ok(())
}
