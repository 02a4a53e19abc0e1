//! Transaction state machine
//!
//! [`Context`] is the per-bus transaction record. Both driver front-ends run
//! the same machine; they only differ in how buffers reach it (see
//! [`SegmentSource`]).
//!
//! Every call to [`Context::advance`] samples the flag register, handles
//! whatever the hardware has signalled and keeps going for as long as the
//! next state needs no new hardware event. It returns as soon as the
//! machine has to wait for a flag.

use strongbox_hal::{Command, Flags, I2cRegisters};

use super::sequence::{Continuation, SegmentSource};
use super::{State, TransferResult};
use crate::device::Address;

/// Interrupt sources used while a transaction runs
const TRANSFER_INTERRUPTS: Flags = Flags::NACK
    .union(Flags::ACK)
    .union(Flags::MSTOP)
    .union(Flags::RXDATAV)
    .union(Flags::ERRORS);

/// Whether the machine can make progress without another flag poll
enum Flow {
    Continue,
    Wait,
}

/// Per-bus transaction context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Context {
    state: State,
    result: TransferResult,
    address: Address,
    /// Byte offset within the active buffer
    offset: usize,
    /// Active buffer index
    index: usize,
    /// A received byte is parked un-acknowledged at a segment boundary
    parked_rx: bool,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Idle context
    pub const fn new() -> Self {
        Self {
            state: State::Done,
            result: TransferResult::Done,
            address: Address::SevenBit(0),
            offset: 0,
            index: 0,
            parked_rx: false,
        }
    }

    /// Current state
    pub fn state(&self) -> State {
        self.state
    }

    /// Result so far (`InProgress` until the machine reaches `Done`)
    pub fn result(&self) -> TransferResult {
        self.result
    }

    /// A transaction is running on this context
    pub fn is_active(&self) -> bool {
        self.state != State::Done
    }

    /// Validate a new transaction and prepare the peripheral for it
    ///
    /// Rejected transactions return `UsageFault` without a single register
    /// access. Otherwise the peripheral is flushed, its flags cleared, the
    /// transfer interrupts enabled and START issued; the machine is left in
    /// [`State::StartAddrSend`] and `InProgress` is returned.
    pub fn begin<R, S>(&mut self, regs: &mut R, address: Address, source: &S) -> TransferResult
    where
        R: I2cRegisters + ?Sized,
        S: SegmentSource + ?Sized,
    {
        if !address.is_valid() || !source.is_valid() {
            self.reject();
            return self.result;
        }

        // Single master: a busy peripheral is left over from an earlier
        // transaction (or reset), not another master.
        if regs.is_busy() {
            regs.command(Command::ABORT);
        }

        self.state = State::StartAddrSend;
        self.result = TransferResult::InProgress;
        self.address = address;
        self.offset = 0;
        self.index = 0;
        self.parked_rx = false;

        regs.command(Command::CLEAR_PC | Command::CLEAR_TX);
        if regs.flags().contains(Flags::RXDATAV) {
            let _ = regs.read_data();
        }
        regs.clear_flags(Flags::ALL);
        regs.enable_interrupts(TRANSFER_INTERRUPTS);
        regs.command(Command::START);

        self.result
    }

    /// Mark the context as rejected without touching the hardware
    pub fn reject(&mut self) {
        self.state = State::Done;
        self.result = TransferResult::UsageFault;
        self.offset = 0;
        self.index = 0;
        self.parked_rx = false;
    }

    /// Advance the machine as far as the pending flags allow
    ///
    /// Returns `InProgress` until the machine reaches [`State::Done`], then
    /// the terminal result.
    pub fn advance<R, S>(&mut self, regs: &mut R, source: &mut S) -> TransferResult
    where
        R: I2cRegisters + ?Sized,
        S: SegmentSource + ?Sized,
    {
        while self.state != State::Done {
            let pending = regs.flags();

            // The peripheral has already dropped the bus, so no STOP
            if pending.intersects(Flags::ERRORS) {
                self.result = if pending.contains(Flags::ARBLOST) {
                    TransferResult::ArbLost
                } else {
                    TransferResult::BusErr
                };
                self.state = State::Done;
                break;
            }

            match self.step(regs, source, pending) {
                Flow::Continue => continue,
                Flow::Wait => break,
            }
        }

        self.finish(regs)
    }

    /// Pick up the next chained segment after [`State::WfTransferResume`]
    ///
    /// Writes continue on the bus as they are; a change of direction goes
    /// through a repeated START. A byte parked at the end of a read segment
    /// is ACKed when more reading follows and NACKed otherwise.
    pub fn resume<R, S>(&mut self, regs: &mut R, source: &S)
    where
        R: I2cRegisters + ?Sized,
        S: SegmentSource + ?Sized,
    {
        if self.state != State::WfTransferResume {
            return;
        }

        self.index = 0;
        self.offset = 0;
        let reading = source.is_rx(0);

        if !source.is_valid() {
            self.result = TransferResult::UsageFault;
            if self.parked_rx {
                regs.command(Command::NACK);
            }
            self.parked_rx = false;
            self.state = State::WfStopSent;
            regs.command(Command::STOP);
            return;
        }

        self.state = match (self.parked_rx, reading) {
            (false, false) => State::DataSend,
            (false, true) => State::RStartAddrSend,
            (true, true) => {
                regs.command(Command::ACK);
                if source.is_single_final_byte(0) {
                    regs.command(Command::NACK);
                }
                State::WfData
            }
            (true, false) => {
                regs.command(Command::NACK);
                State::RStartAddrSend
            }
        };
        self.parked_rx = false;
    }

    fn step<R, S>(&mut self, regs: &mut R, source: &mut S, pending: Flags) -> Flow
    where
        R: I2cRegisters + ?Sized,
        S: SegmentSource + ?Sized,
    {
        match self.state {
            State::StartAddrSend => {
                // A 10-bit header always starts as a write; the read bit is
                // sent after the repeated START.
                let header = match self.address {
                    Address::TenBit(_) => self.address.header(false),
                    Address::SevenBit(_) => {
                        let reading = source.is_rx(self.index);
                        if reading && source.is_single_final_byte(self.index) {
                            regs.command(Command::NACK);
                        }
                        self.address.header(reading)
                    }
                };
                self.state = State::AddrWfAckNack;
                regs.write_data(header);
                Flow::Wait
            }

            State::AddrWfAckNack => {
                if pending.contains(Flags::NACK) {
                    regs.clear_flags(Flags::NACK);
                    self.stop_with(regs, TransferResult::Nack)
                } else if pending.contains(Flags::ACK) {
                    regs.clear_flags(Flags::ACK);
                    if let Some(low) = self.address.ten_bit_low() {
                        self.state = State::AddrWf2ndAckNack;
                        regs.write_data(low);
                        Flow::Wait
                    } else {
                        self.enter_data_phase(source)
                    }
                } else {
                    Flow::Wait
                }
            }

            State::AddrWf2ndAckNack => {
                if pending.contains(Flags::NACK) {
                    regs.clear_flags(Flags::NACK);
                    self.stop_with(regs, TransferResult::Nack)
                } else if pending.contains(Flags::ACK) {
                    regs.clear_flags(Flags::ACK);
                    self.state = if source.is_rx(self.index) {
                        State::RStartAddrSend
                    } else {
                        State::DataSend
                    };
                    Flow::Continue
                } else {
                    Flow::Wait
                }
            }

            State::RStartAddrSend => {
                let reading = source.is_rx(self.index);
                if reading && source.is_single_final_byte(self.index) {
                    regs.command(Command::NACK);
                }
                self.state = State::RAddrWfAckNack;
                regs.command(Command::START);
                regs.write_data(self.address.header(reading));
                Flow::Wait
            }

            State::RAddrWfAckNack => {
                if pending.contains(Flags::NACK) {
                    regs.clear_flags(Flags::NACK);
                    self.stop_with(regs, TransferResult::Nack)
                } else if pending.contains(Flags::ACK) {
                    regs.clear_flags(Flags::ACK);
                    match self.address.ten_bit_low() {
                        // Switching to a 10-bit write needs the full header again
                        Some(low) if !source.is_rx(self.index) => {
                            self.state = State::AddrWf2ndAckNack;
                            regs.write_data(low);
                            Flow::Wait
                        }
                        _ => self.enter_data_phase(source),
                    }
                } else {
                    Flow::Wait
                }
            }

            State::DataSend => {
                let Some(tx) = source.tx(self.index) else {
                    return self.software_fault();
                };

                if let Some(&byte) = tx.get(self.offset) {
                    self.offset += 1;
                    self.state = State::DataWfAckNack;
                    regs.write_data(byte);
                    return Flow::Wait;
                }

                match source.after(self.index) {
                    Continuation::Stop => {
                        self.state = State::WfStopSent;
                        regs.command(Command::STOP);
                        Flow::Wait
                    }
                    Continuation::Park => {
                        self.state = State::WfTransferResume;
                        Flow::Wait
                    }
                    Continuation::NextBuffer => {
                        // Re-enter in case the next buffer is empty
                        self.index += 1;
                        self.offset = 0;
                        Flow::Continue
                    }
                    Continuation::RepeatedStartRead => {
                        self.index += 1;
                        self.offset = 0;
                        self.state = State::RStartAddrSend;
                        Flow::Continue
                    }
                }
            }

            State::DataWfAckNack => {
                if pending.contains(Flags::NACK) {
                    regs.clear_flags(Flags::NACK);
                    self.stop_with(regs, TransferResult::Nack)
                } else if pending.contains(Flags::ACK) {
                    regs.clear_flags(Flags::ACK);
                    self.state = State::DataSend;
                    Flow::Continue
                } else {
                    Flow::Wait
                }
            }

            State::WfData => {
                if !pending.contains(Flags::RXDATAV) {
                    return Flow::Wait;
                }

                let byte = regs.read_data();
                regs.clear_flags(Flags::RXDATAV);

                let index = self.index;
                let ends_read = source.ends_read(index);
                let Some(rx) = source.rx(index) else {
                    return self.software_fault();
                };
                let len = rx.len();

                // Never write past the buffer, even if the flags arrive out of order
                if let Some(slot) = rx.get_mut(self.offset) {
                    *slot = byte;
                    self.offset += 1;
                }

                if self.offset >= len {
                    match source.after(index) {
                        Continuation::Stop => {
                            self.state = State::WfStopSent;
                            regs.command(Command::STOP);
                        }
                        Continuation::Park => {
                            self.parked_rx = true;
                            self.state = State::WfTransferResume;
                        }
                        Continuation::NextBuffer | Continuation::RepeatedStartRead => {
                            return self.software_fault();
                        }
                    }
                } else {
                    regs.command(Command::ACK);
                    // Arm the NACK before the final byte arrives
                    if len > 1 && self.offset == len - 1 && ends_read {
                        regs.command(Command::NACK);
                    }
                }
                Flow::Wait
            }

            State::WfStopSent => {
                if pending.contains(Flags::MSTOP) {
                    regs.clear_flags(Flags::MSTOP);
                    self.state = State::Done;
                    Flow::Continue
                } else {
                    Flow::Wait
                }
            }

            State::WfTransferResume | State::Done => Flow::Wait,
        }
    }

    /// First data state after the address phase
    fn enter_data_phase<S>(&mut self, source: &S) -> Flow
    where
        S: SegmentSource + ?Sized,
    {
        self.state = if source.is_rx(self.index) {
            State::WfData
        } else {
            State::DataSend
        };
        Flow::Continue
    }

    fn stop_with<R>(&mut self, regs: &mut R, result: TransferResult) -> Flow
    where
        R: I2cRegisters + ?Sized,
    {
        self.result = result;
        self.state = State::WfStopSent;
        regs.command(Command::STOP);
        Flow::Wait
    }

    fn software_fault(&mut self) -> Flow {
        self.result = TransferResult::SwFault;
        self.state = State::Done;
        Flow::Continue
    }

    fn finish<R>(&mut self, regs: &mut R) -> TransferResult
    where
        R: I2cRegisters + ?Sized,
    {
        if self.state != State::Done {
            return TransferResult::InProgress;
        }

        regs.disable_interrupts();
        if self.result == TransferResult::InProgress {
            self.result = TransferResult::Done;
        }
        self.result
    }
}
