//! Error type for callers that prefer `Result`
//!
//! The engine itself reports [`TransferResult`] codes; [`I2cError`] is the
//! `Err` side of [`TransferResult::into_result`] and plugs into
//! `embedded-hal`'s error model.
//!
//! [`TransferResult`]: crate::transfer::TransferResult
//! [`TransferResult::into_result`]: crate::transfer::TransferResult::into_result

use embedded_hal::i2c::{Error, ErrorKind, NoAcknowledgeSource};

/// Failed I2C transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2cError {
    /// NACK received (address or data)
    Nack,
    /// Arbitration lost
    ArbitrationLost,
    /// Misplaced START/STOP on the bus
    Bus,
    /// Deadline passed with the transaction still running
    Timeout,
    /// Request rejected before any bus activity
    UsageFault,
    /// Engine inconsistency
    SoftwareFault,
}

impl Error for I2cError {
    fn kind(&self) -> ErrorKind {
        match self {
            I2cError::Nack => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown),
            I2cError::ArbitrationLost => ErrorKind::ArbitrationLoss,
            I2cError::Bus => ErrorKind::Bus,
            I2cError::Timeout | I2cError::UsageFault | I2cError::SoftwareFault => ErrorKind::Other,
        }
    }
}
