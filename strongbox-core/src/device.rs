//! Device descriptors
//!
//! A [`Device`] names the bus, the peripheral address on that bus and the
//! speed class the peripheral wants. It is supplied fresh on every call;
//! the engine keeps nothing of it between transactions.

use strongbox_hal::Speed;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// First byte prefix of a 10-bit address header (`11110xx`)
const TEN_BIT_PREFIX: u8 = 0xF0;

/// Identifier of one physical bus (index into the bus arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BusId(pub u8);

impl BusId {
    /// Arena index
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Peripheral bus address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Address {
    /// 7-bit address, unshifted (0x00..=0x7F)
    SevenBit(u8),
    /// 10-bit address (0x000..=0x3FF)
    TenBit(u16),
}

impl Address {
    /// Address fits its addressing mode
    pub const fn is_valid(self) -> bool {
        match self {
            Address::SevenBit(addr) => addr <= 0x7F,
            Address::TenBit(addr) => addr <= 0x3FF,
        }
    }

    /// Uses the two-byte 10-bit header
    pub const fn is_ten_bit(self) -> bool {
        matches!(self, Address::TenBit(_))
    }

    /// First byte sent after a START
    ///
    /// 7-bit: `addr << 1 | R/W`. 10-bit: `11110 | addr[9:8] | R/W`.
    pub const fn header(self, read: bool) -> u8 {
        let rw = read as u8;
        match self {
            Address::SevenBit(addr) => (addr << 1) | rw,
            Address::TenBit(addr) => TEN_BIT_PREFIX | (((addr >> 7) as u8) & 0x06) | rw,
        }
    }

    /// Second header byte of a 10-bit address (`addr[7:0]`)
    ///
    /// Returns `None` for 7-bit addresses.
    pub const fn ten_bit_low(self) -> Option<u8> {
        match self {
            Address::SevenBit(_) => None,
            Address::TenBit(addr) => Some((addr & 0xFF) as u8),
        }
    }
}

/// Target peripheral on a given bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Device {
    /// Bus the peripheral sits on
    pub bus: BusId,
    /// Peripheral address
    pub address: Address,
    /// Speed class the peripheral supports
    pub speed: Speed,
}

impl Device {
    /// Standard-speed device
    pub const fn new(bus: BusId, address: Address) -> Self {
        Self {
            bus,
            address,
            speed: Speed::Standard,
        }
    }

    /// Standard-speed device with a 7-bit address
    pub const fn seven_bit(bus: BusId, address: u8) -> Self {
        Self::new(bus, Address::SevenBit(address))
    }

    /// Standard-speed device with a 10-bit address
    pub const fn ten_bit(bus: BusId, address: u16) -> Self {
        Self::new(bus, Address::TenBit(address))
    }

    /// Same device at a different speed class
    pub const fn with_speed(mut self, speed: Speed) -> Self {
        self.speed = speed;
        self
    }
}
