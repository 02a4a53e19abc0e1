//! Board-agnostic I2C master transaction engine
//!
//! This crate contains everything between a register block and the chip
//! drivers that talk over it:
//!
//! - Transaction state machine shared by both front-ends
//! - Blocking (deadline-bounded) and stepped (caller-driven) front-ends
//! - Bus resource manager with init, transfer and critical locks
//! - Bus arena keyed by bus identifier
//! - Clock divisor computation
//! - Per-bus performance counters
//!
//! With the `sim` feature it also exports a simulated register block for
//! host-side tests of code built on top of the engine.

#![cfg_attr(not(any(test, feature = "sim")), no_std)]
#![deny(unsafe_code)]

pub mod arena;
pub mod bus;
pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod stats;
pub mod transfer;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use arena::Buses;
pub use bus::{BusSettings, CriticalGuard, I2cBus, SteppedSession};
pub use clock::ClockSetting;
pub use config::{BusConfig, PollMode, Role};
pub use device::{Address, BusId, Device};
pub use error::I2cError;
pub use stats::StatsSnapshot;
pub use transfer::{Segment, Sequence, State, TransferResult};
