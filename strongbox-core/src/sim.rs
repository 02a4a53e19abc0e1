//! Simulated I2C peripheral for host tests
//!
//! [`SimBus`] implements [`I2cRegisters`] and plays both the master
//! peripheral and the devices hanging off the bus. It answers address
//! headers and data bytes the way real devices do, hands out read data
//! byte by byte as the master ACKs, and records everything that happened on
//! the wire. Flags are raised immediately, so every wait state resolves on
//! the next poll.
//!
//! Tests keep a [`SimProbe`] to inspect or poke the simulation after the
//! `SimBus` itself has been moved into a bus.

use std::cell::RefCell;
use std::rc::Rc;
use std::vec::Vec;

use strongbox_hal::{ClockMode, Command, Flags, I2cRegisters};

use crate::device::Address;

/// One event on the simulated wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wire {
    /// START from idle
    Start,
    /// START while the bus is owned
    RepeatedStart,
    /// STOP
    Stop,
    /// Byte sent by the master and the device's answer
    Tx { byte: u8, ack: bool },
    /// Byte sent by the device and the master's answer
    Rx { byte: u8, ack: bool },
}

/// A device on the simulated bus
#[derive(Debug, Clone, Default)]
pub struct SimDevice {
    address: Option<Address>,
    data: Vec<u8>,
    cursor: usize,
    received: Vec<u8>,
    nack_address: bool,
    nack_data_at: Option<usize>,
    unresponsive: bool,
    arbitration_lost_at: Option<usize>,
    bus_error_at: Option<usize>,
    read_fault_at: Option<(usize, Flags)>,
    stop_fault: Option<Flags>,
}

impl SimDevice {
    /// Device answering to a 7-bit address
    pub fn seven_bit(address: u8) -> Self {
        Self {
            address: Some(Address::SevenBit(address)),
            ..Self::default()
        }
    }

    /// Device answering to a 10-bit address
    pub fn ten_bit(address: u16) -> Self {
        Self {
            address: Some(Address::TenBit(address)),
            ..Self::default()
        }
    }

    /// Bytes returned on reads; past the end the device sends 0xFF
    pub fn with_data(mut self, data: &[u8]) -> Self {
        self.data = data.to_vec();
        self
    }

    /// NACK its own address
    pub fn nack_address(mut self) -> Self {
        self.nack_address = true;
        self
    }

    /// NACK the `n`-th data byte written to it (0-based)
    pub fn nack_data_at(mut self, n: usize) -> Self {
        self.nack_data_at = Some(n);
        self
    }

    /// Never answer its address with either ACK or NACK
    pub fn unresponsive(mut self) -> Self {
        self.unresponsive = true;
        self
    }

    /// Lose arbitration when the `n`-th byte of a transaction is sent
    /// (0 is the address header)
    pub fn arbitration_lost_at(mut self, n: usize) -> Self {
        self.arbitration_lost_at = Some(n);
        self
    }

    /// Raise a bus error when the `n`-th byte of a transaction is sent
    pub fn bus_error_at(mut self, n: usize) -> Self {
        self.bus_error_at = Some(n);
        self
    }

    /// Raise `fault` instead of sending the `n`-th byte read in a
    /// transaction (0-based)
    pub fn fault_on_read(mut self, n: usize, fault: Flags) -> Self {
        self.read_fault_at = Some((n, fault));
        self
    }

    /// Raise `fault` instead of completing STOP
    pub fn fault_on_stop(mut self, fault: Flags) -> Self {
        self.stop_fault = Some(fault);
        self
    }

    fn ten_bit_high(&self) -> Option<u8> {
        match self.address {
            Some(Address::TenBit(addr)) => Some(((addr >> 8) & 0x03) as u8),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Address,
    TenBitLow { high: u8 },
    Write { device: usize },
    Read { device: usize },
    /// Address not acknowledged; waiting for STOP
    Ignored,
    /// Arbitration lost or bus error; the bus is gone
    Released,
}

#[derive(Debug)]
struct SimState {
    devices: Vec<SimDevice>,
    flags: Flags,
    enabled_irqs: Flags,
    busy: bool,
    enabled: bool,
    divisor: Option<u16>,
    mode: Option<ClockMode>,
    phase: Phase,
    rx: Option<u8>,
    awaiting_response: Option<usize>,
    nack_armed: bool,
    prearmed_nacks: usize,
    tx_count: usize,
    rx_count: usize,
    ten_bit_selected: Option<usize>,
    wire: Vec<Wire>,
    commands: Vec<Command>,
}

impl SimState {
    fn fault_at(&self, count: usize) -> Option<Flags> {
        self.devices.iter().find_map(|dev| {
            if dev.arbitration_lost_at == Some(count) {
                Some(Flags::ARBLOST)
            } else if dev.bus_error_at == Some(count) {
                Some(Flags::BUSERR)
            } else {
                None
            }
        })
    }

    /// The peripheral drops the bus and reports `fault`
    fn release(&mut self, fault: Flags) {
        self.flags |= fault;
        self.phase = Phase::Released;
        self.busy = false;
        self.awaiting_response = None;
        self.nack_armed = false;
    }

    fn answer(&mut self, byte: u8, ack: bool) {
        self.wire.push(Wire::Tx { byte, ack });
        self.flags |= if ack { Flags::ACK } else { Flags::NACK };
    }

    fn address_byte(&mut self, byte: u8) {
        let read = byte & 1 == 1;

        if byte & 0xF8 == 0xF0 {
            let high = (byte >> 1) & 0x03;
            if read {
                match self.ten_bit_selected {
                    Some(device) if self.devices[device].ten_bit_high() == Some(high) => {
                        self.answer(byte, true);
                        self.phase = Phase::Read { device };
                        self.deliver(device);
                    }
                    _ => {
                        self.answer(byte, false);
                        self.phase = Phase::Ignored;
                    }
                }
            } else if self.devices.iter().any(|dev| dev.ten_bit_high() == Some(high)) {
                self.answer(byte, true);
                self.phase = Phase::TenBitLow { high };
            } else {
                self.answer(byte, false);
                self.phase = Phase::Ignored;
            }
            return;
        }

        let target = Address::SevenBit(byte >> 1);
        match self.devices.iter().position(|dev| dev.address == Some(target)) {
            Some(device) if self.devices[device].unresponsive => {
                self.wire.push(Wire::Tx { byte, ack: false });
                self.phase = Phase::Ignored;
            }
            Some(device) if !self.devices[device].nack_address => {
                self.answer(byte, true);
                if read {
                    self.phase = Phase::Read { device };
                    self.deliver(device);
                } else {
                    self.phase = Phase::Write { device };
                }
            }
            _ => {
                self.answer(byte, false);
                self.phase = Phase::Ignored;
            }
        }
    }

    fn ten_bit_low(&mut self, high: u8, byte: u8) {
        let target = Address::TenBit((u16::from(high) << 8) | u16::from(byte));
        match self.devices.iter().position(|dev| dev.address == Some(target)) {
            Some(device) if self.devices[device].unresponsive => {
                self.wire.push(Wire::Tx { byte, ack: false });
                self.phase = Phase::Ignored;
            }
            Some(device) if !self.devices[device].nack_address => {
                self.answer(byte, true);
                self.ten_bit_selected = Some(device);
                self.phase = Phase::Write { device };
            }
            _ => {
                self.answer(byte, false);
                self.phase = Phase::Ignored;
            }
        }
    }

    fn data_byte(&mut self, device: usize, byte: u8) {
        let dev = &mut self.devices[device];
        let ack = dev.nack_data_at != Some(dev.received.len());
        dev.received.push(byte);
        self.answer(byte, ack);
    }

    fn deliver(&mut self, device: usize) {
        let count = self.rx_count;
        self.rx_count += 1;
        if let Some((_, fault)) = self.devices[device].read_fault_at.filter(|(at, _)| *at == count) {
            self.release(fault);
            return;
        }

        let dev = &mut self.devices[device];
        let byte = dev.data.get(dev.cursor).copied().unwrap_or(0xFF);
        dev.cursor += 1;

        self.wire.push(Wire::Rx { byte, ack: true });
        self.rx = Some(byte);
        self.flags |= Flags::RXDATAV;

        if self.nack_armed {
            self.nack_armed = false;
            self.respond(self.wire.len() - 1, false);
        } else {
            self.awaiting_response = Some(self.wire.len() - 1);
        }
    }

    fn respond(&mut self, at: usize, ack: bool) {
        if let Some(Wire::Rx { ack: slot, .. }) = self.wire.get_mut(at) {
            *slot = ack;
        }
    }

    fn command(&mut self, command: Command) {
        self.commands.push(command);

        if command.contains(Command::ABORT) {
            self.phase = Phase::Idle;
            self.busy = false;
            self.rx = None;
            self.awaiting_response = None;
            self.nack_armed = false;
        }

        if command.contains(Command::START) {
            match self.phase {
                Phase::Idle | Phase::Released => {
                    self.wire.push(Wire::Start);
                    self.tx_count = 0;
                    self.rx_count = 0;
                    self.ten_bit_selected = None;
                }
                _ => self.wire.push(Wire::RepeatedStart),
            }
            self.busy = true;
            self.phase = Phase::Address;
        }

        if command.contains(Command::ACK) {
            if let Some(at) = self.awaiting_response.take() {
                self.respond(at, true);
                if let Phase::Read { device } = self.phase {
                    self.deliver(device);
                }
            }
        }

        if command.contains(Command::NACK) {
            match self.awaiting_response.take() {
                Some(at) => self.respond(at, false),
                None => {
                    self.nack_armed = true;
                    self.prearmed_nacks += 1;
                }
            }
        }

        if command.contains(Command::STOP) {
            if let Some(fault) = self.devices.iter().find_map(|dev| dev.stop_fault) {
                self.release(fault);
                return;
            }
            self.wire.push(Wire::Stop);
            self.phase = Phase::Idle;
            self.busy = false;
            self.awaiting_response = None;
            self.nack_armed = false;
            self.flags |= Flags::MSTOP;
        }
    }

    fn write_data(&mut self, byte: u8) {
        let count = self.tx_count;
        self.tx_count += 1;

        if let Some(fault) = self.fault_at(count) {
            self.release(fault);
            return;
        }

        match self.phase {
            Phase::Address => self.address_byte(byte),
            Phase::TenBitLow { high } => self.ten_bit_low(high, byte),
            Phase::Write { device } => self.data_byte(device, byte),
            _ => self.wire.push(Wire::Tx { byte, ack: false }),
        }
    }
}

/// Simulated register block
#[derive(Debug)]
pub struct SimBus {
    state: Rc<RefCell<SimState>>,
}

impl SimBus {
    /// Bus with a single device on it
    pub fn new(device: SimDevice) -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState {
                devices: std::vec![device],
                flags: Flags::empty(),
                enabled_irqs: Flags::empty(),
                busy: false,
                enabled: false,
                divisor: None,
                mode: None,
                phase: Phase::Idle,
                rx: None,
                awaiting_response: None,
                nack_armed: false,
                prearmed_nacks: 0,
                tx_count: 0,
                rx_count: 0,
                ten_bit_selected: None,
                wire: Vec::new(),
                commands: Vec::new(),
            })),
        }
    }

    /// Add another device to the bus
    pub fn with_device(self, device: SimDevice) -> Self {
        self.state.borrow_mut().devices.push(device);
        self
    }

    /// Inspection handle sharing this simulation
    pub fn probe(&self) -> SimProbe {
        SimProbe {
            state: Rc::clone(&self.state),
        }
    }
}

impl I2cRegisters for SimBus {
    fn flags(&mut self) -> Flags {
        self.state.borrow().flags
    }

    fn clear_flags(&mut self, flags: Flags) {
        self.state.borrow_mut().flags.remove(flags);
    }

    fn enable_interrupts(&mut self, flags: Flags) {
        self.state.borrow_mut().enabled_irqs |= flags;
    }

    fn disable_interrupts(&mut self) {
        self.state.borrow_mut().enabled_irqs = Flags::empty();
    }

    fn command(&mut self, command: Command) {
        self.state.borrow_mut().command(command);
    }

    fn write_data(&mut self, byte: u8) {
        self.state.borrow_mut().write_data(byte);
    }

    fn read_data(&mut self) -> u8 {
        let mut state = self.state.borrow_mut();
        state.flags.remove(Flags::RXDATAV);
        state.rx.take().unwrap_or(0)
    }

    fn is_busy(&mut self) -> bool {
        self.state.borrow().busy
    }

    fn set_clock_mode(&mut self, mode: ClockMode) {
        self.state.borrow_mut().mode = Some(mode);
    }

    fn set_clock_divisor(&mut self, divisor: u16) {
        self.state.borrow_mut().divisor = Some(divisor);
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.state.borrow_mut().enabled = enabled;
    }
}

/// Shared view of a [`SimBus`]
#[derive(Debug, Clone)]
pub struct SimProbe {
    state: Rc<RefCell<SimState>>,
}

impl SimProbe {
    /// Everything seen on the wire so far
    pub fn wire(&self) -> Vec<Wire> {
        self.state.borrow().wire.clone()
    }

    /// Every command register write so far
    pub fn commands(&self) -> Vec<Command> {
        self.state.borrow().commands.clone()
    }

    /// Data bytes written to the first device
    pub fn received(&self) -> Vec<u8> {
        self.state.borrow().devices[0].received.clone()
    }

    /// Data bytes written to the device at `address`
    pub fn received_by(&self, address: Address) -> Vec<u8> {
        self.state
            .borrow()
            .devices
            .iter()
            .find(|dev| dev.address == Some(address))
            .map(|dev| dev.received.clone())
            .unwrap_or_default()
    }

    /// Master's answer to every byte it received, in order
    pub fn rx_acks(&self) -> Vec<bool> {
        self.state
            .borrow()
            .wire
            .iter()
            .filter_map(|event| match event {
                Wire::Rx { ack, .. } => Some(*ack),
                _ => None,
            })
            .collect()
    }

    /// Data bytes the master sent, in order (address headers excluded)
    pub fn tx_stream(&self) -> Vec<u8> {
        let state = self.state.borrow();
        let mut bytes = Vec::new();
        let mut header = false;
        for event in &state.wire {
            match event {
                Wire::Start | Wire::RepeatedStart => header = true,
                Wire::Tx { byte, .. } if header => {
                    // A 10-bit write header carries a second address byte
                    header = byte & 0xF9 == 0xF0;
                }
                Wire::Tx { byte, .. } => bytes.push(*byte),
                _ => {}
            }
        }
        bytes
    }

    /// START conditions of either kind
    pub fn starts(&self) -> usize {
        self.state
            .borrow()
            .wire
            .iter()
            .filter(|event| matches!(event, Wire::Start | Wire::RepeatedStart))
            .count()
    }

    /// NACK commands that arrived before the byte they answer
    pub fn prearmed_nacks(&self) -> usize {
        self.state.borrow().prearmed_nacks
    }

    /// Any interrupt source enabled
    pub fn interrupts_enabled(&self) -> bool {
        !self.state.borrow().enabled_irqs.is_empty()
    }

    /// Last programmed clock divisor
    pub fn clock_divisor(&self) -> Option<u16> {
        self.state.borrow().divisor
    }

    /// Last programmed clock ratio
    pub fn clock_mode(&self) -> Option<ClockMode> {
        self.state.borrow().mode
    }

    /// Peripheral enable bit
    pub fn enabled(&self) -> bool {
        self.state.borrow().enabled
    }

    /// Peripheral reports busy until the next ABORT or STOP
    pub fn force_busy(&self) {
        self.state.borrow_mut().busy = true;
    }

    /// Another master takes the bus, or the line glitches, right now
    pub fn release_bus(&self, fault: Flags) {
        self.state.borrow_mut().release(fault);
    }

    /// Leave a stale byte in the receive register
    pub fn inject_stale_rx(&self, byte: u8) {
        let mut state = self.state.borrow_mut();
        state.rx = Some(byte);
        state.flags |= Flags::RXDATAV;
    }
}
