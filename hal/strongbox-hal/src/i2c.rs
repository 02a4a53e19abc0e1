//! I2C peripheral abstractions
//!
//! Models an interrupt-flag driven I2C master peripheral at register level:
//! a pending-flag register, an interrupt-enable register, a command
//! register, TX/RX data registers and a clock divisor. Chip HALs implement
//! [`I2cRegisters`] on top of their PAC; the transaction engine in
//! `strongbox-core` only ever talks to the hardware through this trait.

use core::ops::{BitOr, BitOrAssign};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Interrupt flag bits, shared by the pending-flag and enable registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Flags(u32);

impl Flags {
    /// START condition transmitted
    pub const START: Self = Self(1 << 0);
    /// Repeated START condition transmitted
    pub const RSTART: Self = Self(1 << 1);
    /// Address matched (slave mode)
    pub const ADDR: Self = Self(1 << 2);
    /// Transfer completed
    pub const TXC: Self = Self(1 << 3);
    /// Transmit buffer level
    pub const TXBL: Self = Self(1 << 4);
    /// Receive data valid
    pub const RXDATAV: Self = Self(1 << 5);
    /// ACK received from the addressed device
    pub const ACK: Self = Self(1 << 6);
    /// NACK received from the addressed device
    pub const NACK: Self = Self(1 << 7);
    /// Master STOP condition sent
    pub const MSTOP: Self = Self(1 << 8);
    /// Arbitration lost
    pub const ARBLOST: Self = Self(1 << 9);
    /// Misplaced START/STOP seen on the bus
    pub const BUSERR: Self = Self(1 << 10);

    /// Conditions that abort a transfer without a STOP
    pub const ERRORS: Self = Self(Self::ARBLOST.0 | Self::BUSERR.0);

    /// Every flag the peripheral defines
    pub const ALL: Self = Self((1 << 11) - 1);

    /// No flags set
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw register value
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Build from a raw register value, dropping undefined bits
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// True if no flag is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every flag in `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any flag in `other` is set
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Flags set in either value
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Flags of `self` not present in `other`
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Clear the flags in `other`
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for Flags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Command register bits
///
/// Writing a command is a one-shot action; the register reads back as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Command(u8);

impl Command {
    /// Send START (or repeated START when the bus is already owned)
    pub const START: Self = Self(1 << 0);
    /// Send STOP
    pub const STOP: Self = Self(1 << 1);
    /// ACK the byte being received
    pub const ACK: Self = Self(1 << 2);
    /// NACK the byte being received (or the next one, if none is pending)
    pub const NACK: Self = Self(1 << 3);
    /// Continue a stalled transmission
    pub const CONT: Self = Self(1 << 4);
    /// Abort the current transfer and release the bus
    pub const ABORT: Self = Self(1 << 5);
    /// Flush the transmit buffer
    pub const CLEAR_TX: Self = Self(1 << 6);
    /// Clear pending commands
    pub const CLEAR_PC: Self = Self(1 << 7);

    /// Raw register value
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True if every command bit in `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Command {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// SCL low:high period ratio
///
/// The peripheral clocks SCL low for `low` and high for `high` prescaled
/// cycles. Asymmetric ratios give the longer low period that fast mode
/// devices need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ClockMode {
    /// 4:4, standard mode
    Standard,
    /// 6:3, fast mode
    Asymmetric,
    /// 11:6, fast mode plus
    Fast,
}

impl ClockMode {
    /// Low period in prescaled cycles
    pub const fn low(self) -> u32 {
        match self {
            ClockMode::Standard => 4,
            ClockMode::Asymmetric => 6,
            ClockMode::Fast => 11,
        }
    }

    /// High period in prescaled cycles
    pub const fn high(self) -> u32 {
        match self {
            ClockMode::Standard => 4,
            ClockMode::Asymmetric => 3,
            ClockMode::Fast => 6,
        }
    }

    /// Combined low + high period
    pub const fn period(self) -> u32 {
        self.low() + self.high()
    }
}

/// Bus speed class requested by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Speed {
    /// 100 kHz
    #[default]
    Standard,
    /// 400 kHz
    Fast,
    /// 1 MHz
    FastPlus,
    /// Any other SCL frequency in Hz
    Custom(u32),
}

impl Speed {
    /// Target SCL frequency in Hz
    pub const fn hz(self) -> u32 {
        match self {
            Speed::Standard => 100_000,
            Speed::Fast => 400_000,
            Speed::FastPlus => 1_000_000,
            Speed::Custom(hz) => hz,
        }
    }

    /// Clock ratio mode used to reach this speed
    pub const fn clock_mode(self) -> ClockMode {
        match self.hz() {
            0..=100_000 => ClockMode::Standard,
            100_001..=400_000 => ClockMode::Asymmetric,
            _ => ClockMode::Fast,
        }
    }
}

/// Register-level access to one I2C master peripheral
///
/// Every method maps onto a single register access. Implementations must
/// not block and must not add protocol logic of their own.
pub trait I2cRegisters {
    /// Read the pending interrupt flags
    fn flags(&mut self) -> Flags;

    /// Clear the given pending flags
    fn clear_flags(&mut self, flags: Flags);

    /// Enable the given interrupt sources (in addition to those already enabled)
    fn enable_interrupts(&mut self, flags: Flags);

    /// Disable all interrupt sources
    fn disable_interrupts(&mut self);

    /// Write the command register
    fn command(&mut self, command: Command);

    /// Write one byte into the transmit data register
    fn write_data(&mut self, byte: u8);

    /// Read the receive data register
    fn read_data(&mut self) -> u8;

    /// Peripheral reports an ongoing transfer
    fn is_busy(&mut self) -> bool;

    /// Program the SCL low:high ratio
    fn set_clock_mode(&mut self, mode: ClockMode);

    /// Program the clock divisor
    fn set_clock_divisor(&mut self, divisor: u16);

    /// Enable or disable the peripheral
    fn set_enabled(&mut self, enabled: bool);
}

impl<T: I2cRegisters + ?Sized> I2cRegisters for &mut T {
    fn flags(&mut self) -> Flags {
        (**self).flags()
    }

    fn clear_flags(&mut self, flags: Flags) {
        (**self).clear_flags(flags)
    }

    fn enable_interrupts(&mut self, flags: Flags) {
        (**self).enable_interrupts(flags)
    }

    fn disable_interrupts(&mut self) {
        (**self).disable_interrupts()
    }

    fn command(&mut self, command: Command) {
        (**self).command(command)
    }

    fn write_data(&mut self, byte: u8) {
        (**self).write_data(byte)
    }

    fn read_data(&mut self) -> u8 {
        (**self).read_data()
    }

    fn is_busy(&mut self) -> bool {
        (**self).is_busy()
    }

    fn set_clock_mode(&mut self, mode: ClockMode) {
        (**self).set_clock_mode(mode)
    }

    fn set_clock_divisor(&mut self, divisor: u16) {
        (**self).set_clock_divisor(divisor)
    }

    fn set_enabled(&mut self, enabled: bool) {
        (**self).set_enabled(enabled)
    }
}
