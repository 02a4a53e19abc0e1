//! Fixed set of buses indexed by [`BusId`]
//!
//! Sized at compile time to the number of physical buses on the board.
//! Every device-level call looks its bus up here; an id outside the arena
//! is a usage fault and never reaches a register.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Duration;
use strongbox_hal::I2cRegisters;

use crate::bus::{CriticalGuard, I2cBus, SteppedSession};
use crate::clock::ClockSetting;
use crate::config::BusConfig;
use crate::device::{BusId, Device};
use crate::error::I2cError;
use crate::transfer::{Sequence, TransferResult};

/// All buses of the board
pub struct Buses<M: RawMutex, R, const N: usize> {
    buses: [I2cBus<M, R>; N],
}

impl<M: RawMutex, R: I2cRegisters, const N: usize> Buses<M, R, N> {
    /// One bus per register block; bus `i` gets `BusId(i)`
    ///
    /// # Panics
    ///
    /// If `N` exceeds the range of [`BusId`].
    pub fn new(ports: [(R, BusConfig); N]) -> Self {
        assert!(N <= usize::from(u8::MAX) + 1, "too many buses");

        let mut next = 0u8;
        let buses = ports.map(|(regs, config)| {
            let bus = I2cBus::new(BusId(next), regs, config);
            next = next.wrapping_add(1);
            bus
        });
        Self { buses }
    }

    /// Number of buses
    pub const fn len(&self) -> usize {
        N
    }

    /// Arena holds no bus at all
    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    /// Bus with identifier `id`
    pub fn bus(&self, id: BusId) -> Option<&I2cBus<M, R>> {
        self.buses.get(id.index())
    }

    /// Every bus, in id order
    pub fn iter(&self) -> impl Iterator<Item = &I2cBus<M, R>> {
        self.buses.iter()
    }

    /// [`I2cBus::transfer`] on `device`'s bus
    pub async fn transfer(&self, device: &Device, seq: &mut Sequence<'_>, timeout: Duration) -> TransferResult {
        match self.bus(device.bus) {
            Some(bus) => bus.transfer(device, seq, timeout).await,
            None => TransferResult::UsageFault,
        }
    }

    /// [`I2cBus::transfer_critical`] on `device`'s bus
    pub async fn transfer_critical(
        &self,
        device: &Device,
        seq: &mut Sequence<'_>,
        timeout: Duration,
    ) -> TransferResult {
        match self.bus(device.bus) {
            Some(bus) => bus.transfer_critical(device, seq, timeout).await,
            None => TransferResult::UsageFault,
        }
    }

    /// Take the critical lock of `device`'s bus
    pub async fn enter_critical(&self, device: &Device) -> Result<CriticalGuard<'_, M>, I2cError> {
        match self.bus(device.bus) {
            Some(bus) => Ok(bus.enter_critical().await),
            None => Err(I2cError::UsageFault),
        }
    }

    /// Release a critical lock taken with [`enter_critical`](Self::enter_critical)
    pub fn exit_critical(&self, guard: CriticalGuard<'_, M>) {
        drop(guard);
    }

    /// [`I2cBus::set_bus_frequency`] on `device`'s bus
    pub async fn set_bus_frequency(&self, device: &Device) -> Result<ClockSetting, I2cError> {
        match self.bus(device.bus) {
            Some(bus) => bus.set_bus_frequency(device).await,
            None => Err(I2cError::UsageFault),
        }
    }

    /// Stepped session on `device`'s bus
    pub async fn begin_stepped(&self, device: &Device) -> Result<SteppedSession<'_, M, R>, I2cError> {
        match self.bus(device.bus) {
            Some(bus) => Ok(bus.begin_stepped().await),
            None => Err(I2cError::UsageFault),
        }
    }

    /// Stepped session on `device`'s bus, `None` if the bus is busy
    pub fn try_begin_stepped(&self, device: &Device) -> Result<Option<SteppedSession<'_, M, R>>, I2cError> {
        self.bus(device.bus)
            .map(I2cBus::try_begin_stepped)
            .ok_or(I2cError::UsageFault)
    }
}
