//! I2C master transaction engine
//!
//! One state machine ([`machine::Context`]) drives every transaction. It is
//! advanced one flag-poll at a time and pulls its buffers from a
//! [`SegmentSource`]. Two front-ends feed it:
//!
//! - [`blocking`] hands over a whole two-buffer [`Sequence`] up front and
//!   polls until the transaction ends or a deadline passes.
//! - [`stepped`] hands over one chained [`Segment`] per call and returns
//!   after every step, so an interrupt handler or a poller can drive it.

pub mod blocking;
pub mod machine;
pub mod sequence;
pub mod stepped;

pub use machine::Context;
pub use sequence::{Continuation, Direction, Segment, SegmentSource, Sequence};

use crate::error::I2cError;

/// Outcome of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferResult {
    /// Still running (or the deadline passed before it finished)
    InProgress,
    /// Completed successfully
    Done,
    /// The addressed device NACKed the address or a data byte
    Nack,
    /// Another master won arbitration
    ArbLost,
    /// Misplaced START/STOP detected on the bus
    BusErr,
    /// Rejected before touching the bus (zero-length read, unknown bus, bad address)
    UsageFault,
    /// The engine reached an inconsistent internal state
    SwFault,
}

impl TransferResult {
    /// Transaction has ended, successfully or not
    pub fn is_terminal(self) -> bool {
        self != TransferResult::InProgress
    }

    /// Transaction ended successfully
    pub fn is_success(self) -> bool {
        self == TransferResult::Done
    }

    /// Map to a `Result`, treating `InProgress` as a timeout
    pub fn into_result(self) -> Result<(), I2cError> {
        match self {
            TransferResult::Done => Ok(()),
            TransferResult::InProgress => Err(I2cError::Timeout),
            TransferResult::Nack => Err(I2cError::Nack),
            TransferResult::ArbLost => Err(I2cError::ArbitrationLost),
            TransferResult::BusErr => Err(I2cError::Bus),
            TransferResult::UsageFault => Err(I2cError::UsageFault),
            TransferResult::SwFault => Err(I2cError::SoftwareFault),
        }
    }
}

/// Transaction state
///
/// ```text
/// StartAddrSend -> AddrWfAckNack -> [AddrWf2ndAckNack] -> DataSend <-> DataWfAckNack
///                                                      \-> WfData
/// DataSend -> RStartAddrSend -> RAddrWfAckNack -> WfData | DataSend
/// DataSend | WfData -> WfStopSent -> Done
/// DataSend | WfData -> WfTransferResume -> (next segment)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Send the address header behind the initial START
    StartAddrSend,
    /// Wait for the address header to be acknowledged
    AddrWfAckNack,
    /// Wait for the second byte of a 10-bit address to be acknowledged
    AddrWf2ndAckNack,
    /// Send a repeated START and the address header
    RStartAddrSend,
    /// Wait for the repeated-start address header to be acknowledged
    RAddrWfAckNack,
    /// Send the next data byte
    DataSend,
    /// Wait for the last data byte to be acknowledged
    DataWfAckNack,
    /// Wait for a data byte from the device
    WfData,
    /// Wait for the STOP condition to go out
    WfStopSent,
    /// Segment finished without STOP; waiting for the caller's next segment
    WfTransferResume,
    /// Transaction over, result available
    Done,
}
