//! Deadline-bounded driver for two-buffer sequences
//!
//! The whole [`Sequence`] is handed over up front and the machine is polled
//! until it reaches `Done` or the deadline passes. [`transfer`] busy-polls
//! without ever giving up the CPU, which for sub-millisecond transactions
//! is cheaper than a context switch. [`transfer_yielding`] runs the same
//! loop but yields to the executor between polls.
//!
//! When the deadline passes first the result is `InProgress` and the
//! hardware transaction is left running; the next [`Context::begin`] on the
//! bus aborts it.

use embassy_futures::yield_now;
use embassy_time::{Duration, Instant};
use strongbox_hal::I2cRegisters;

use super::{Context, Sequence, TransferResult};
use crate::device::Address;

/// Validate `seq` and issue START
///
/// `UsageFault` if the sequence or address is unusable, `InProgress`
/// otherwise.
pub fn start<R>(regs: &mut R, ctx: &mut Context, address: Address, seq: &Sequence<'_>) -> TransferResult
where
    R: I2cRegisters + ?Sized,
{
    ctx.begin(regs, address, seq)
}

/// One poll of a running sequence
pub fn poll<R>(regs: &mut R, ctx: &mut Context, seq: &mut Sequence<'_>) -> TransferResult
where
    R: I2cRegisters + ?Sized,
{
    ctx.advance(regs, seq)
}

/// Run `seq` to completion, busy-polling until `timeout` elapses
pub fn transfer<R>(
    regs: &mut R,
    ctx: &mut Context,
    address: Address,
    seq: &mut Sequence<'_>,
    timeout: Duration,
) -> TransferResult
where
    R: I2cRegisters + ?Sized,
{
    let deadline = Instant::now() + timeout;
    let mut result = start(regs, ctx, address, seq);

    while result == TransferResult::InProgress {
        result = poll(regs, ctx, seq);
        if Instant::now() >= deadline {
            break;
        }
    }
    result
}

/// Run `seq` to completion, yielding between polls until `timeout` elapses
pub async fn transfer_yielding<R>(
    regs: &mut R,
    ctx: &mut Context,
    address: Address,
    seq: &mut Sequence<'_>,
    timeout: Duration,
) -> TransferResult
where
    R: I2cRegisters + ?Sized,
{
    let deadline = Instant::now() + timeout;
    let mut result = start(regs, ctx, address, seq);

    while result == TransferResult::InProgress {
        result = poll(regs, ctx, seq);
        if result != TransferResult::InProgress || Instant::now() >= deadline {
            break;
        }
        yield_now().await;
    }
    result
}
