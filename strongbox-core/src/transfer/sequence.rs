//! Transfer descriptions and the buffer supply seam of the state machine
//!
//! The state machine never holds on to caller buffers. Each time it needs
//! bytes to send or room to receive, it asks a [`SegmentSource`] for buffer
//! `index` and, once that buffer is used up, what comes next.

/// Direction flags of a two-buffer sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Write buffer 0
    Write,
    /// Read into buffer 0
    Read,
    /// Write buffer 0, repeated START, read into buffer 1
    WriteRead,
    /// Write buffer 0 then buffer 1, no repeated START
    WriteWrite,
}

/// Two-buffer transfer used by the blocking driver
#[derive(Debug, PartialEq, Eq)]
pub enum Sequence<'a> {
    /// Write only
    Write(&'a [u8]),
    /// Read only; the buffer must not be empty
    Read(&'a mut [u8]),
    /// Write, repeated START, read; the read buffer must not be empty
    WriteRead(&'a [u8], &'a mut [u8]),
    /// Two writes back to back in one transaction
    WriteWrite(&'a [u8], &'a [u8]),
}

impl Sequence<'_> {
    /// Direction flags of this sequence
    pub fn direction(&self) -> Direction {
        match self {
            Sequence::Write(_) => Direction::Write,
            Sequence::Read(_) => Direction::Read,
            Sequence::WriteRead(..) => Direction::WriteRead,
            Sequence::WriteWrite(..) => Direction::WriteWrite,
        }
    }
}

/// Buffer of one chained segment
#[derive(Debug, PartialEq, Eq)]
pub enum SegmentBuffer<'a> {
    /// Bytes to transmit
    Tx(&'a [u8]),
    /// Room for received bytes
    Rx(&'a mut [u8]),
}

/// One buffer's worth of a chained transaction, used by the stepped engine
///
/// A logical transaction is a series of segments supplied call by call.
/// Only the final one carries `last`, which is what makes the engine send
/// STOP instead of parking in [`State::WfTransferResume`].
///
/// [`State::WfTransferResume`]: super::State::WfTransferResume
#[derive(Debug, PartialEq, Eq)]
pub struct Segment<'a> {
    buffer: SegmentBuffer<'a>,
    last: bool,
}

impl<'a> Segment<'a> {
    /// Transmit segment
    pub fn write(bytes: &'a [u8], last: bool) -> Self {
        Self {
            buffer: SegmentBuffer::Tx(bytes),
            last,
        }
    }

    /// Receive segment
    pub fn read(buffer: &'a mut [u8], last: bool) -> Self {
        Self {
            buffer: SegmentBuffer::Rx(buffer),
            last,
        }
    }

    /// No read phase in this segment
    pub fn tx_only(&self) -> bool {
        matches!(self.buffer, SegmentBuffer::Tx(_))
    }

    /// Final segment of the chain
    pub fn is_last(&self) -> bool {
        self.last
    }

    /// Segment length in bytes
    pub fn len(&self) -> usize {
        match &self.buffer {
            SegmentBuffer::Tx(bytes) => bytes.len(),
            SegmentBuffer::Rx(buffer) => buffer.len(),
        }
    }

    /// Segment carries no bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What follows once a buffer is used up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Continuation {
    /// Carry on with buffer `index + 1`, nothing on the bus
    NextBuffer,
    /// Repeated START, then read into buffer `index + 1`
    RepeatedStartRead,
    /// Send STOP
    Stop,
    /// Hand control back to the caller without STOP
    Park,
}

/// Supplies buffers to the state machine
pub trait SegmentSource {
    /// Usable as given (every read buffer holds at least one byte)
    fn is_valid(&self) -> bool;

    /// Bytes to send for buffer `index`, `None` if it is not a transmit buffer
    fn tx(&self, index: usize) -> Option<&[u8]>;

    /// Room to receive into for buffer `index`, `None` if it is not a receive buffer
    fn rx(&mut self, index: usize) -> Option<&mut [u8]>;

    /// Length of receive buffer `index`
    fn rx_len(&self, index: usize) -> Option<usize>;

    /// What follows once buffer `index` is exhausted
    fn after(&self, index: usize) -> Continuation;

    /// Buffer `index` receives the final bytes of the transaction, so its
    /// last byte must be NACKed
    fn ends_read(&self, index: usize) -> bool;

    /// Buffer `index` is a receive buffer
    fn is_rx(&self, index: usize) -> bool {
        self.rx_len(index).is_some()
    }

    /// Buffer `index` is a single final byte, whose NACK has to be armed
    /// before its address header goes out
    fn is_single_final_byte(&self, index: usize) -> bool {
        self.rx_len(index) == Some(1) && self.ends_read(index)
    }
}

impl SegmentSource for Sequence<'_> {
    fn is_valid(&self) -> bool {
        match self {
            Sequence::Read(rx) | Sequence::WriteRead(_, rx) => !rx.is_empty(),
            Sequence::Write(_) | Sequence::WriteWrite(..) => true,
        }
    }

    fn tx(&self, index: usize) -> Option<&[u8]> {
        match (self, index) {
            (Sequence::Write(tx), 0)
            | (Sequence::WriteRead(tx, _), 0)
            | (Sequence::WriteWrite(tx, _), 0)
            | (Sequence::WriteWrite(_, tx), 1) => Some(*tx),
            _ => None,
        }
    }

    fn rx(&mut self, index: usize) -> Option<&mut [u8]> {
        match (self, index) {
            (Sequence::Read(rx), 0) | (Sequence::WriteRead(_, rx), 1) => Some(&mut **rx),
            _ => None,
        }
    }

    fn rx_len(&self, index: usize) -> Option<usize> {
        match (self, index) {
            (Sequence::Read(rx), 0) | (Sequence::WriteRead(_, rx), 1) => Some(rx.len()),
            _ => None,
        }
    }

    fn after(&self, index: usize) -> Continuation {
        match (self, index) {
            (Sequence::WriteRead(..), 0) => Continuation::RepeatedStartRead,
            (Sequence::WriteWrite(..), 0) => Continuation::NextBuffer,
            _ => Continuation::Stop,
        }
    }

    fn ends_read(&self, index: usize) -> bool {
        matches!(
            (self, index),
            (Sequence::Read(_), 0) | (Sequence::WriteRead(..), 1)
        )
    }
}

impl SegmentSource for Segment<'_> {
    fn is_valid(&self) -> bool {
        self.tx_only() || !self.is_empty()
    }

    fn tx(&self, index: usize) -> Option<&[u8]> {
        match (&self.buffer, index) {
            (SegmentBuffer::Tx(bytes), 0) => Some(*bytes),
            _ => None,
        }
    }

    fn rx(&mut self, index: usize) -> Option<&mut [u8]> {
        match (&mut self.buffer, index) {
            (SegmentBuffer::Rx(buffer), 0) => Some(&mut **buffer),
            _ => None,
        }
    }

    fn rx_len(&self, index: usize) -> Option<usize> {
        match (&self.buffer, index) {
            (SegmentBuffer::Rx(buffer), 0) => Some(buffer.len()),
            _ => None,
        }
    }

    fn after(&self, _index: usize) -> Continuation {
        if self.last {
            Continuation::Stop
        } else {
            Continuation::Park
        }
    }

    fn ends_read(&self, index: usize) -> bool {
        index == 0 && self.last && !self.tx_only()
    }
}
