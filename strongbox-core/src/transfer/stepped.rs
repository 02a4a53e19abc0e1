//! Non-blocking engine for chained segments
//!
//! Each call does as much as the pending flags allow and returns the state
//! the machine is in; nothing here waits. The caller drives it, from an
//! interrupt handler or a periodic poll, until the state is `Done` and then
//! reads [`Context::result`].
//!
//! A logical transaction may span several segments. Whenever a non-final
//! segment is used up the machine parks in `WfTransferResume`, and the next
//! call to [`advance`] must carry the following segment.

use strongbox_hal::I2cRegisters;

use super::{Context, Segment, State};
use crate::device::Address;

/// Validate the first segment, issue START and take the first step
///
/// A rejected segment leaves the context in `Done` with `UsageFault`.
pub fn init<R>(regs: &mut R, ctx: &mut Context, address: Address, segment: &mut Segment<'_>) -> State
where
    R: I2cRegisters + ?Sized,
{
    if ctx.begin(regs, address, segment).is_terminal() {
        return ctx.state();
    }
    ctx.advance(regs, segment);
    ctx.state()
}

/// Advance the running transaction
///
/// `segment` is the active one, or the next one if the machine is parked
/// in `WfTransferResume`.
pub fn advance<R>(regs: &mut R, ctx: &mut Context, segment: &mut Segment<'_>) -> State
where
    R: I2cRegisters + ?Sized,
{
    if ctx.state() == State::WfTransferResume {
        ctx.resume(regs, segment);
    }
    ctx.advance(regs, segment);
    ctx.state()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimBus, SimDevice, Wire};
    use crate::transfer::{blocking, Sequence, TransferResult};
    use embassy_time::Duration;
    use proptest::prelude::*;
    use strongbox_hal::Flags;

    const ADDR: u8 = 0x6A;

    /// Drives one segment until the machine parks or finishes
    fn drive(sim: &mut SimBus, ctx: &mut Context, segment: &mut Segment<'_>) -> State {
        let mut state = advance(sim, ctx, segment);
        for _ in 0..1_000 {
            if matches!(state, State::Done | State::WfTransferResume) {
                break;
            }
            state = advance(sim, ctx, segment);
        }
        state
    }

    #[test]
    fn test_init_takes_first_step() {
        let mut sim = SimBus::new(SimDevice::seven_bit(ADDR));
        let mut ctx = Context::new();

        let state = init(&mut sim, &mut ctx, Address::SevenBit(ADDR), &mut Segment::write(&[0x01], true));

        assert_eq!(state, State::AddrWfAckNack);
        assert_eq!(ctx.result(), TransferResult::InProgress);
        assert_eq!(
            sim.probe().wire(),
            std::vec![Wire::Start, Wire::Tx { byte: ADDR << 1, ack: true }]
        );
    }

    #[test]
    fn test_init_rejects_empty_read() {
        let mut sim = SimBus::new(SimDevice::seven_bit(ADDR));
        let mut ctx = Context::new();
        let mut empty: [u8; 0] = [];

        let state = init(&mut sim, &mut ctx, Address::SevenBit(ADDR), &mut Segment::read(&mut empty, true));

        assert_eq!(state, State::Done);
        assert_eq!(ctx.result(), TransferResult::UsageFault);
        assert!(sim.probe().commands().is_empty());
    }

    #[test]
    fn test_chained_writes_match_single_write() {
        let chunks: [&[u8]; 4] = [&[0x10, 0x11], &[0x12], &[], &[0x13, 0x14, 0x15]];

        let mut chained = SimBus::new(SimDevice::seven_bit(ADDR));
        let mut ctx = Context::new();
        let mut first = Segment::write(chunks[0], false);
        init(&mut chained, &mut ctx, Address::SevenBit(ADDR), &mut first);
        assert_eq!(drive(&mut chained, &mut ctx, &mut first), State::WfTransferResume);
        for (i, chunk) in chunks.iter().enumerate().skip(1) {
            let last = i == chunks.len() - 1;
            let expected = if last { State::Done } else { State::WfTransferResume };
            assert_eq!(drive(&mut chained, &mut ctx, &mut Segment::write(chunk, last)), expected);
        }
        assert_eq!(ctx.result(), TransferResult::Done);

        let mut single = SimBus::new(SimDevice::seven_bit(ADDR));
        let joined = chunks.concat();
        let result = blocking::transfer(
            &mut single,
            &mut Context::new(),
            Address::SevenBit(ADDR),
            &mut Sequence::Write(&joined),
            Duration::from_millis(50),
        );
        assert_eq!(result, TransferResult::Done);

        assert_eq!(chained.probe().wire(), single.probe().wire());
    }

    #[test]
    fn test_write_then_read_segment_uses_repeated_start() {
        let mut sim = SimBus::new(SimDevice::seven_bit(ADDR).with_data(&[0x77, 0x88]));
        let mut ctx = Context::new();
        let mut buf = [0u8; 2];

        let mut reg = Segment::write(&[0x2C], false);
        init(&mut sim, &mut ctx, Address::SevenBit(ADDR), &mut reg);
        assert_eq!(drive(&mut sim, &mut ctx, &mut reg), State::WfTransferResume);
        assert_eq!(drive(&mut sim, &mut ctx, &mut Segment::read(&mut buf, true)), State::Done);

        assert_eq!(ctx.result(), TransferResult::Done);
        assert_eq!(buf, [0x77, 0x88]);
        assert_eq!(
            sim.probe().wire(),
            std::vec![
                Wire::Start,
                Wire::Tx { byte: ADDR << 1, ack: true },
                Wire::Tx { byte: 0x2C, ack: true },
                Wire::RepeatedStart,
                Wire::Tx { byte: (ADDR << 1) | 1, ack: true },
                Wire::Rx { byte: 0x77, ack: true },
                Wire::Rx { byte: 0x88, ack: false },
                Wire::Stop,
            ]
        );
    }

    #[test]
    fn test_chained_reads_ack_parked_byte() {
        let mut sim = SimBus::new(SimDevice::seven_bit(ADDR).with_data(&[1, 2, 3, 4, 5]));
        let mut ctx = Context::new();
        let mut head = [0u8; 2];
        let mut tail = [0u8; 3];

        let mut first = Segment::read(&mut head, false);
        init(&mut sim, &mut ctx, Address::SevenBit(ADDR), &mut first);
        assert_eq!(drive(&mut sim, &mut ctx, &mut first), State::WfTransferResume);
        assert_eq!(drive(&mut sim, &mut ctx, &mut Segment::read(&mut tail, true)), State::Done);

        assert_eq!(head, [1, 2]);
        assert_eq!(tail, [3, 4, 5]);
        assert_eq!(sim.probe().rx_acks(), std::vec![true, true, true, true, false]);
        assert_eq!(sim.probe().starts(), 1);
    }

    #[test]
    fn test_read_then_single_byte_read() {
        let mut sim = SimBus::new(SimDevice::seven_bit(ADDR).with_data(&[9, 8]));
        let mut ctx = Context::new();
        let mut head = [0u8; 1];
        let mut tail = [0u8; 1];

        let mut first = Segment::read(&mut head, false);
        init(&mut sim, &mut ctx, Address::SevenBit(ADDR), &mut first);
        assert_eq!(drive(&mut sim, &mut ctx, &mut first), State::WfTransferResume);
        assert_eq!(drive(&mut sim, &mut ctx, &mut Segment::read(&mut tail, true)), State::Done);

        assert_eq!((head, tail), ([9], [8]));
        assert_eq!(sim.probe().rx_acks(), std::vec![true, false]);
    }

    #[test]
    fn test_read_then_write_nacks_and_restarts() {
        let mut sim = SimBus::new(SimDevice::seven_bit(ADDR).with_data(&[0x40]));
        let mut ctx = Context::new();
        let mut status = [0u8; 1];

        let mut first = Segment::read(&mut status, false);
        init(&mut sim, &mut ctx, Address::SevenBit(ADDR), &mut first);
        assert_eq!(drive(&mut sim, &mut ctx, &mut first), State::WfTransferResume);
        assert_eq!(drive(&mut sim, &mut ctx, &mut Segment::write(&[0x01], true)), State::Done);

        assert_eq!(ctx.result(), TransferResult::Done);
        assert_eq!(
            sim.probe().wire(),
            std::vec![
                Wire::Start,
                Wire::Tx { byte: (ADDR << 1) | 1, ack: true },
                Wire::Rx { byte: 0x40, ack: false },
                Wire::RepeatedStart,
                Wire::Tx { byte: ADDR << 1, ack: true },
                Wire::Tx { byte: 0x01, ack: true },
                Wire::Stop,
            ]
        );
    }

    #[test]
    fn test_invalid_next_segment_stops_bus() {
        let mut sim = SimBus::new(SimDevice::seven_bit(ADDR));
        let mut ctx = Context::new();
        let mut empty: [u8; 0] = [];

        let mut first = Segment::write(&[0x00], false);
        init(&mut sim, &mut ctx, Address::SevenBit(ADDR), &mut first);
        assert_eq!(drive(&mut sim, &mut ctx, &mut first), State::WfTransferResume);
        assert_eq!(drive(&mut sim, &mut ctx, &mut Segment::read(&mut empty, true)), State::Done);

        assert_eq!(ctx.result(), TransferResult::UsageFault);
        assert_eq!(sim.probe().wire().last(), Some(&Wire::Stop));
    }

    #[test]
    fn test_ten_bit_stepped_read() {
        let mut sim = SimBus::new(SimDevice::ten_bit(0x155).with_data(&[0xAA, 0xBB]));
        let mut ctx = Context::new();
        let mut buf = [0u8; 2];

        let mut segment = Segment::read(&mut buf, true);
        init(&mut sim, &mut ctx, Address::TenBit(0x155), &mut segment);
        assert_eq!(drive(&mut sim, &mut ctx, &mut segment), State::Done);

        assert_eq!(ctx.result(), TransferResult::Done);
        assert_eq!(buf, [0xAA, 0xBB]);
        assert!(sim.probe().wire().contains(&Wire::RepeatedStart));
    }

    #[test]
    fn test_address_nack_in_stepped_mode() {
        let mut sim = SimBus::new(SimDevice::seven_bit(ADDR).nack_address());
        let mut ctx = Context::new();

        let mut segment = Segment::write(&[0x00, 0x01], false);
        init(&mut sim, &mut ctx, Address::SevenBit(ADDR), &mut segment);

        // A failed address phase ends the chain even though more segments were due
        assert_eq!(drive(&mut sim, &mut ctx, &mut segment), State::Done);
        assert_eq!(ctx.result(), TransferResult::Nack);
    }

    #[test]
    fn test_bus_lost_while_parked() {
        let mut sim = SimBus::new(SimDevice::seven_bit(ADDR).with_data(&[1, 2, 3]));
        let mut ctx = Context::new();
        let mut head = [0u8; 2];
        let mut tail = [0u8; 1];

        let mut first = Segment::read(&mut head, false);
        init(&mut sim, &mut ctx, Address::SevenBit(ADDR), &mut first);
        assert_eq!(drive(&mut sim, &mut ctx, &mut first), State::WfTransferResume);

        sim.probe().release_bus(Flags::ARBLOST);
        let state = drive(&mut sim, &mut ctx, &mut Segment::read(&mut tail, true));

        assert_eq!(state, State::Done);
        assert_eq!(ctx.result(), TransferResult::ArbLost);
        assert!(!sim.probe().wire().contains(&Wire::Stop));
    }

    #[test]
    fn test_bus_error_while_parked_write() {
        let mut sim = SimBus::new(SimDevice::seven_bit(ADDR));
        let mut ctx = Context::new();

        let mut first = Segment::write(&[0x01], false);
        init(&mut sim, &mut ctx, Address::SevenBit(ADDR), &mut first);
        assert_eq!(drive(&mut sim, &mut ctx, &mut first), State::WfTransferResume);

        sim.probe().release_bus(Flags::BUSERR);
        let state = drive(&mut sim, &mut ctx, &mut Segment::write(&[0x02], true));

        assert_eq!(state, State::Done);
        assert_eq!(ctx.result(), TransferResult::BusErr);
        assert_eq!(sim.probe().received(), std::vec![0x01]);
        assert!(!sim.probe().wire().contains(&Wire::Stop));
    }

    proptest! {
        /// A fault on any byte of a chained read ends it without STOP
        #[test]
        fn chained_read_fault_never_sends_stop(
            head_len in 1usize..8,
            tail_len in 1usize..8,
            at in 0usize..16,
            arbitration in any::<bool>(),
        ) {
            prop_assume!(at < head_len + tail_len);
            let (fault, expected) = if arbitration {
                (Flags::ARBLOST, TransferResult::ArbLost)
            } else {
                (Flags::BUSERR, TransferResult::BusErr)
            };
            let mut sim = SimBus::new(SimDevice::seven_bit(ADDR).with_data(&[0xC3; 16]).fault_on_read(at, fault));
            let mut ctx = Context::new();
            let mut head = std::vec![0u8; head_len];
            let mut tail = std::vec![0u8; tail_len];

            let mut first = Segment::read(&mut head, false);
            init(&mut sim, &mut ctx, Address::SevenBit(ADDR), &mut first);
            let mut state = drive(&mut sim, &mut ctx, &mut first);
            if state == State::WfTransferResume {
                state = drive(&mut sim, &mut ctx, &mut Segment::read(&mut tail, true));
            }

            prop_assert_eq!(state, State::Done);
            prop_assert_eq!(ctx.result(), expected);
            prop_assert_eq!(sim.probe().rx_acks().len(), at);
            prop_assert!(!sim.probe().wire().contains(&Wire::Stop));
        }

        /// Any split of a write into chained segments puts the same bytes on the wire
        #[test]
        fn any_split_matches_single_write(
            data in proptest::collection::vec(any::<u8>(), 1..48),
            cuts in proptest::collection::vec(0usize..48, 0..4),
        ) {
            let mut bounds: std::vec::Vec<usize> = cuts.into_iter().map(|c| c % (data.len() + 1)).collect();
            bounds.push(0);
            bounds.push(data.len());
            bounds.sort_unstable();
            let chunks: std::vec::Vec<&[u8]> = bounds.windows(2).map(|w| &data[w[0]..w[1]]).collect();

            let mut chained = SimBus::new(SimDevice::seven_bit(ADDR));
            let mut ctx = Context::new();
            let mut first = Segment::write(chunks[0], chunks.len() == 1);
            init(&mut chained, &mut ctx, Address::SevenBit(ADDR), &mut first);
            drive(&mut chained, &mut ctx, &mut first);
            for (i, chunk) in chunks.iter().enumerate().skip(1) {
                drive(&mut chained, &mut ctx, &mut Segment::write(chunk, i == chunks.len() - 1));
            }
            prop_assert_eq!(ctx.result(), TransferResult::Done);

            let mut single = SimBus::new(SimDevice::seven_bit(ADDR));
            blocking::transfer(
                &mut single,
                &mut Context::new(),
                Address::SevenBit(ADDR),
                &mut Sequence::Write(&data),
                Duration::from_millis(50),
            );
            prop_assert_eq!(chained.probe().wire(), single.probe().wire());
        }
    }
}
