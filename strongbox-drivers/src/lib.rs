//! Chip-facing adapters over the I2C transaction engine
//!
//! This crate connects the bus manager in `strongbox-core` to the code
//! that talks to actual chips:
//!
//! - [`BusDevice`]: `embedded-hal-async` I2C (7-bit and 10-bit addresses)
//!   on a shared bus
//! - [`CriticalGroup`]: several transactions to one chip with no other
//!   traffic in between

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod critical;
pub mod i2c;

pub use critical::CriticalGroup;
pub use i2c::BusDevice;
