//! Strongbox Hardware Abstraction Layer
//!
//! This crate defines the register-level interface that chip-specific HALs
//! implement for their I2C master peripherals. The transaction engine and
//! every bus consumer above it are written against these traits only, so
//! the same engine runs on silicon and against the simulated peripheral
//! used in host tests.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Consumers (fuel gauge, SE, touch, ...) │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  strongbox-drivers (embedded-hal-async) │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  strongbox-core (transaction engine)    │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  strongbox-hal (this crate - registers) │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Traits
//!
//! - [`i2c::I2cRegisters`] - I2C master register block

#![no_std]
#![deny(unsafe_code)]

pub mod i2c;

pub use i2c::{ClockMode, Command, Flags, I2cRegisters, Speed};
