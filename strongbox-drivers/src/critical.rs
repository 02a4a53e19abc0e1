//! Atomic groups of transactions
//!
//! Some chips need several transactions back to back with nothing else on
//! the bus in between, such as a fuel gauge that has to be unsealed with
//! two key writes right before a configuration write. A [`CriticalGroup`]
//! holds the bus's critical lock for its whole lifetime; every transfer
//! made through it skips the lock, every transfer made elsewhere waits.

use embassy_sync::blocking_mutex::raw::RawMutex;
use strongbox_core::transfer::Sequence;
use strongbox_core::{CriticalGuard, Device, I2cBus, I2cError};
use strongbox_hal::I2cRegisters;

/// Critical lock of one bus plus the device the group talks to
pub struct CriticalGroup<'a, M: RawMutex, R> {
    bus: &'a I2cBus<M, R>,
    device: Device,
    guard: CriticalGuard<'a, M>,
}

impl<'a, M: RawMutex, R: I2cRegisters> CriticalGroup<'a, M, R> {
    /// Wait for the critical lock of `bus` and open a group for `device`
    ///
    /// Fails with `UsageFault` if `device` is on another bus.
    pub async fn begin(bus: &'a I2cBus<M, R>, device: Device) -> Result<Self, I2cError> {
        if device.bus != bus.id() {
            return Err(I2cError::UsageFault);
        }
        let guard = bus.enter_critical().await;
        Ok(Self { bus, device, guard })
    }

    /// Write `bytes`
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), I2cError> {
        self.run(Sequence::Write(bytes)).await
    }

    /// Write `head` then `tail` in one transaction
    pub async fn write_write(&mut self, head: &[u8], tail: &[u8]) -> Result<(), I2cError> {
        self.run(Sequence::WriteWrite(head, tail)).await
    }

    /// Read into `buffer`
    pub async fn read(&mut self, buffer: &mut [u8]) -> Result<(), I2cError> {
        self.run(Sequence::Read(buffer)).await
    }

    /// Write `bytes`, repeated START, read into `buffer`
    pub async fn write_read(&mut self, bytes: &[u8], buffer: &mut [u8]) -> Result<(), I2cError> {
        self.run(Sequence::WriteRead(bytes, buffer)).await
    }

    /// Close the group and release the critical lock
    pub fn finish(self) {
        self.bus.exit_critical(self.guard);
    }

    async fn run(&mut self, mut seq: Sequence<'_>) -> Result<(), I2cError> {
        self.bus
            .transfer_critical(&self.device, &mut seq, self.bus.timeout())
            .await
            .into_result()
    }
}
