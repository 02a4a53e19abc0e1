//! Per-bus configuration
//!
//! Fixed at bring-up, one [`BusConfig`] per physical bus. The clock ratio
//! is not part of it; that follows from each device's speed class when
//! the frequency is applied.

use heapless::String;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum bus label length
pub const MAX_LABEL_LEN: usize = 16;

/// Default transaction deadline
pub const DEFAULT_TIMEOUT_MS: u32 = 50;

/// Default peripheral reference clock (HFPER)
pub const DEFAULT_REFERENCE_CLOCK_HZ: u32 = 38_400_000;

/// What the peripheral may be asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Role {
    /// Master only
    #[default]
    Master,
    /// May also be addressed as a slave (stricter clock requirements)
    SlaveCapable,
}

/// How the blocking driver waits between flag polls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PollMode {
    /// Busy-poll without giving up the CPU
    #[default]
    Spin,
    /// Yield to the executor between polls
    Yield,
}

/// Bus configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BusConfig {
    /// Label used in log output
    pub label: String<MAX_LABEL_LEN>,
    /// Peripheral reference clock in Hz
    pub reference_clock_hz: u32,
    /// Master or slave-capable
    pub role: Role,
    /// Deadline of one blocking transaction
    pub timeout_ms: u32,
    /// Wait strategy of the blocking driver
    pub poll: PollMode,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            label: String::new(),
            reference_clock_hz: DEFAULT_REFERENCE_CLOCK_HZ,
            role: Role::Master,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            poll: PollMode::Spin,
        }
    }
}

impl BusConfig {
    /// Default configuration with a log label
    ///
    /// Labels longer than [`MAX_LABEL_LEN`] are truncated.
    pub fn labelled(label: &str) -> Self {
        let mut config = Self::default();
        for ch in label.chars() {
            if config.label.push(ch).is_err() {
                break;
            }
        }
        config
    }

    /// Same configuration with another reference clock
    pub fn with_reference_clock(mut self, hz: u32) -> Self {
        self.reference_clock_hz = hz;
        self
    }

    /// Same configuration with another role
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Same configuration with another deadline
    pub fn with_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Same configuration with another poll mode
    pub fn with_poll(mut self, poll: PollMode) -> Self {
        self.poll = poll;
        self
    }
}
