//! I2C transaction shapes the bridge understands

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of one segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Read,
    Write,
}

/// One direction-tagged buffer at a slave address
///
/// Read segments carry a zeroed buffer of the requested length which the
/// bridge fills in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub address: u16,
    pub direction: Direction,
    pub data: Vec<u8>,
}

impl Segment {
    pub fn write(address: u16, data: impl Into<Vec<u8>>) -> Self {
        Self {
            address,
            direction: Direction::Write,
            data: data.into(),
        }
    }

    pub fn read(address: u16, len: usize) -> Self {
        Self {
            address,
            direction: Direction::Read,
            data: vec![0; len],
        }
    }

    pub fn is_read(&self) -> bool {
        self.direction == Direction::Read
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Adapter functionality bits, numbered as Linux' `I2C_FUNC_*`
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Functionality(u32);

impl Functionality {
    /// Plain I2C transfers
    pub const I2C: Functionality = Functionality(0x0000_0001);
    /// 10-bit addressing
    pub const TEN_BIT_ADDR: Functionality = Functionality(0x0000_0002);
    /// SMBus quick command
    pub const SMBUS_QUICK: Functionality = Functionality(0x0001_0000);
    /// SMBus block read
    pub const SMBUS_READ_BLOCK_DATA: Functionality = Functionality(0x0100_0000);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Functionality) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Functionality) -> Functionality {
        Functionality(self.0 | other.0)
    }
}

impl fmt::Debug for Functionality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Functionality({:#010x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_constructors() {
        let write = Segment::write(0x63, vec![0x10]);
        assert!(!write.is_read());
        assert_eq!(write.data, vec![0x10]);

        let read = Segment::read(0x63, 16);
        assert!(read.is_read());
        assert_eq!(read.len(), 16);
        assert!(read.data.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_functionality_contains() {
        let func = Functionality::I2C;
        assert!(func.contains(Functionality::I2C));
        assert!(!func.contains(Functionality::SMBUS_QUICK));
        assert!(func.union(Functionality::SMBUS_QUICK).contains(Functionality::SMBUS_QUICK));
    }
}
