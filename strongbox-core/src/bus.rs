//! Bus resource manager
//!
//! One [`I2cBus`] per physical bus, created at bring-up and never torn
//! down. It owns the register block and the transaction context and guards
//! them with three independent locks:
//!
//! - the init lock, taken only while the clock or the enable bit changes;
//! - the transfer lock, held for one whole logical transaction, so at most
//!   one transaction runs on the bus;
//! - the critical lock, held by callers across a group of transactions
//!   that must not interleave with other traffic.
//!
//! Whenever more than one is held they are taken critical before init
//! before transfer; any of them may be skipped. None of them time out.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use embassy_time::{Duration, Instant};
use strongbox_hal::I2cRegisters;

use crate::clock::{self, ClockSetting};
use crate::config::{BusConfig, PollMode};
use crate::device::{BusId, Device};
use crate::error::I2cError;
use crate::stats::{BusStats, StatsSnapshot};
use crate::transfer::{blocking, stepped, Context, Segment, Sequence, State, TransferResult};

/// Bus-level settings guarded by the init lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusSettings {
    /// Clock currently programmed, if any
    pub clock: Option<ClockSetting>,
    /// Peripheral enabled
    pub enabled: bool,
}

/// Register block plus the transaction running on it
struct Port<R> {
    regs: R,
    ctx: Context,
}

/// Proof that the critical lock of a bus is held
///
/// Dropping it (or handing it to [`I2cBus::exit_critical`]) releases the lock.
pub struct CriticalGuard<'a, M: RawMutex> {
    _guard: MutexGuard<'a, M, ()>,
}

/// One physical bus
pub struct I2cBus<M: RawMutex, R> {
    id: BusId,
    config: BusConfig,
    settings: Mutex<M, BusSettings>,
    port: Mutex<M, Port<R>>,
    critical: Mutex<M, ()>,
    stats: BusStats,
}

impl<M: RawMutex, R: I2cRegisters> I2cBus<M, R> {
    /// Bus `id` driving `regs`
    pub const fn new(id: BusId, regs: R, config: BusConfig) -> Self {
        Self {
            id,
            config,
            settings: Mutex::new(BusSettings {
                clock: None,
                enabled: false,
            }),
            port: Mutex::new(Port {
                regs,
                ctx: Context::new(),
            }),
            critical: Mutex::new(()),
            stats: BusStats::new(),
        }
    }

    /// Bus identifier
    pub fn id(&self) -> BusId {
        self.id
    }

    /// Configuration fixed at bring-up
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Deadline of one blocking transaction
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.config.timeout_ms))
    }

    /// Performance counters
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Zero the performance counters
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Copy of the current bus settings
    pub async fn settings(&self) -> BusSettings {
        *self.settings.lock().await
    }

    /// Run a two-buffer transaction
    ///
    /// Waits for any critical group in progress on the bus to finish first.
    pub async fn transfer(&self, device: &Device, seq: &mut Sequence<'_>, timeout: Duration) -> TransferResult {
        let _critical = self.critical.lock().await;
        self.transfer_critical(device, seq, timeout).await
    }

    /// Run a two-buffer transaction without touching the critical lock
    ///
    /// For use between [`enter_critical`](Self::enter_critical) and
    /// [`exit_critical`](Self::exit_critical).
    pub async fn transfer_critical(
        &self,
        device: &Device,
        seq: &mut Sequence<'_>,
        timeout: Duration,
    ) -> TransferResult {
        if device.bus != self.id {
            self.stats.record(TransferResult::UsageFault, 0);
            return TransferResult::UsageFault;
        }

        let mut port = self.port.lock().await;
        let Port { regs, ctx } = &mut *port;

        let started = Instant::now();
        let result = match self.config.poll {
            PollMode::Spin => blocking::transfer(regs, ctx, device.address, seq, timeout),
            PollMode::Yield => blocking::transfer_yielding(regs, ctx, device.address, seq, timeout).await,
        };
        self.stats.record(result, started.elapsed().as_micros());

        if result == TransferResult::InProgress {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "i2c {}: {} timed out in {}",
                self.config.label.as_str(),
                device.address,
                ctx.state()
            );
        }
        result
    }

    /// Take the critical lock for a group of transactions
    pub async fn enter_critical(&self) -> CriticalGuard<'_, M> {
        CriticalGuard {
            _guard: self.critical.lock().await,
        }
    }

    /// Release the critical lock
    pub fn exit_critical(&self, guard: CriticalGuard<'_, M>) {
        drop(guard);
    }

    /// Program the clock for `device`'s speed class
    ///
    /// # Panics
    ///
    /// If the reference clock cannot produce the requested speed (see
    /// [`clock::divisor`]).
    pub async fn set_bus_frequency(&self, device: &Device) -> Result<ClockSetting, I2cError> {
        if device.bus != self.id {
            return Err(I2cError::UsageFault);
        }

        let mut settings = self.settings.lock().await;
        let setting = clock::setting(
            self.config.reference_clock_hz,
            device.speed.hz(),
            device.speed.clock_mode(),
            self.config.role,
        );
        if settings.clock == Some(setting) {
            return Ok(setting);
        }

        let mut port = self.port.lock().await;
        port.regs.set_clock_mode(setting.mode);
        port.regs.set_clock_divisor(setting.divisor);
        settings.clock = Some(setting);

        #[cfg(feature = "defmt")]
        defmt::debug!(
            "i2c {}: {} Hz requested, {} Hz actual (div {})",
            self.config.label.as_str(),
            device.speed.hz(),
            clock::actual_frequency(self.config.reference_clock_hz, setting.mode, setting.divisor),
            setting.divisor
        );
        Ok(setting)
    }

    /// Enable or disable the peripheral
    pub async fn enable(&self, enabled: bool) {
        let mut settings = self.settings.lock().await;
        let mut port = self.port.lock().await;
        port.regs.set_enabled(enabled);
        settings.enabled = enabled;
    }

    /// Take the transfer lock for a stepped transaction
    pub async fn begin_stepped(&self) -> SteppedSession<'_, M, R> {
        SteppedSession::new(self, self.port.lock().await)
    }

    /// Take the transfer lock for a stepped transaction if it is free
    pub fn try_begin_stepped(&self) -> Option<SteppedSession<'_, M, R>> {
        self.port.try_lock().ok().map(|port| SteppedSession::new(self, port))
    }
}

/// Stepped transaction holding the transfer lock of its bus
///
/// The lock is released when the session is dropped. A session can run
/// any number of transactions back to back; one left unfinished by a new
/// `init` or by dropping the session counts as an error.
pub struct SteppedSession<'a, M: RawMutex, R> {
    bus: &'a I2cBus<M, R>,
    port: MutexGuard<'a, M, Port<R>>,
    started: Option<Instant>,
}

impl<'a, M: RawMutex, R: I2cRegisters> SteppedSession<'a, M, R> {
    fn new(bus: &'a I2cBus<M, R>, port: MutexGuard<'a, M, Port<R>>) -> Self {
        Self {
            bus,
            port,
            started: None,
        }
    }

    /// Start a transaction with its first segment
    pub fn init(&mut self, device: &Device, segment: &mut Segment<'_>) -> State {
        self.abandon();
        self.started = Some(Instant::now());
        let state = if device.bus == self.bus.id {
            let Port { regs, ctx } = &mut *self.port;
            stepped::init(regs, ctx, device.address, segment)
        } else {
            self.port.ctx.reject();
            State::Done
        };
        self.settle(state)
    }

    /// Advance with the active segment, or the next one when parked
    pub fn advance(&mut self, segment: &mut Segment<'_>) -> State {
        let Port { regs, ctx } = &mut *self.port;
        let state = stepped::advance(regs, ctx, segment);
        self.settle(state)
    }

    /// Current state
    pub fn state(&self) -> State {
        self.port.ctx.state()
    }

    /// Result of the transaction (`InProgress` until `Done`)
    pub fn result(&self) -> TransferResult {
        self.port.ctx.result()
    }

    fn settle(&mut self, state: State) -> State {
        if state == State::Done {
            if let Some(started) = self.started.take() {
                self.bus
                    .stats
                    .record(self.port.ctx.result(), started.elapsed().as_micros());
            }
        }
        state
    }
}

impl<M: RawMutex, R> SteppedSession<'_, M, R> {
    /// Account a transaction that never reached `Done`
    fn abandon(&mut self) {
        if let Some(started) = self.started.take() {
            self.bus
                .stats
                .record(TransferResult::InProgress, started.elapsed().as_micros());
        }
    }
}

impl<M: RawMutex, R> Drop for SteppedSession<'_, M, R> {
    fn drop(&mut self) {
        self.abandon();
    }
}
