//! `embedded-hal-async` I2C on top of the bus manager
//!
//! [`BusDevice`] lets any `embedded_hal_async::i2c::I2c` chip driver run on
//! a shared [`I2cBus`]. Plain `read`, `write` and `write_read` go through
//! the blocking two-buffer path; `transaction` chains its operations as
//! stepped segments, which gives exactly the `embedded-hal` contract:
//! adjacent operations of the same kind are merged, a change of direction
//! gets a repeated START, and the final read byte is NACKed.

use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Instant;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation, SevenBitAddress, TenBitAddress};
use strongbox_core::bus::SteppedSession;
use strongbox_core::transfer::{Segment, Sequence, State};
use strongbox_core::{Address, BusId, Device, I2cBus, I2cError, PollMode};
use strongbox_hal::{I2cRegisters, Speed};

/// Shared-bus handle for one chip driver
///
/// Cheap to create; several may point at the same bus.
pub struct BusDevice<'a, M: RawMutex, R> {
    bus: &'a I2cBus<M, R>,
    speed: Speed,
}

impl<'a, M: RawMutex, R: I2cRegisters> BusDevice<'a, M, R> {
    /// Standard-speed handle on `bus`
    pub fn new(bus: &'a I2cBus<M, R>) -> Self {
        Self {
            bus,
            speed: Speed::Standard,
        }
    }

    /// Same handle, other speed class
    pub fn with_speed(mut self, speed: Speed) -> Self {
        self.speed = speed;
        self
    }

    /// Bus this handle talks to
    pub fn bus_id(&self) -> BusId {
        self.bus.id()
    }

    /// Program the bus clock for this handle's speed class
    pub async fn apply_speed(&self) -> Result<(), I2cError> {
        let device = Device::new(self.bus.id(), Address::SevenBit(0)).with_speed(self.speed);
        self.bus.set_bus_frequency(&device).await.map(|_| ())
    }

    fn device(&self, address: Address) -> Device {
        Device::new(self.bus.id(), address).with_speed(self.speed)
    }

    async fn run(&self, address: Address, mut seq: Sequence<'_>) -> Result<(), I2cError> {
        self.bus
            .transfer(&self.device(address), &mut seq, self.bus.timeout())
            .await
            .into_result()
    }

    async fn chain(&self, address: Address, operations: &mut [Operation<'_>]) -> Result<(), I2cError> {
        let count = operations.len();
        if count == 0 {
            return Ok(());
        }

        let device = self.device(address);
        let _critical = self.bus.enter_critical().await;
        let mut session = self.bus.begin_stepped().await;
        // Lock waits are unbounded; only the transaction itself is timed
        let deadline = Instant::now() + self.bus.timeout();

        for (index, op) in operations.iter_mut().enumerate() {
            let last = index + 1 == count;
            let mut segment = match op {
                Operation::Write(bytes) => Segment::write(*bytes, last),
                Operation::Read(buffer) => Segment::read(buffer, last),
            };

            let state = if index == 0 {
                session.init(&device, &mut segment)
            } else {
                session.advance(&mut segment)
            };
            self.drive(&mut session, &mut segment, state, deadline).await?;
        }

        session.result().into_result()
    }

    /// Poll one segment until the machine parks or finishes
    async fn drive(
        &self,
        session: &mut SteppedSession<'_, M, R>,
        segment: &mut Segment<'_>,
        mut state: State,
        deadline: Instant,
    ) -> Result<(), I2cError> {
        loop {
            match state {
                State::Done => return session.result().into_result(),
                State::WfTransferResume => return Ok(()),
                _ => {}
            }
            if Instant::now() >= deadline {
                #[cfg(feature = "defmt")]
                defmt::warn!("i2c {}: chained transaction timed out in {}", self.bus.id().0, state);
                return Err(I2cError::Timeout);
            }
            if self.bus.config().poll == PollMode::Yield {
                yield_now().await;
            }
            state = session.advance(segment);
        }
    }
}

impl<M: RawMutex, R> ErrorType for BusDevice<'_, M, R> {
    type Error = I2cError;
}

impl<M: RawMutex, R: I2cRegisters> I2c<SevenBitAddress> for BusDevice<'_, M, R> {
    async fn read(&mut self, address: u8, read: &mut [u8]) -> Result<(), Self::Error> {
        self.run(Address::SevenBit(address), Sequence::Read(read)).await
    }

    async fn write(&mut self, address: u8, write: &[u8]) -> Result<(), Self::Error> {
        self.run(Address::SevenBit(address), Sequence::Write(write)).await
    }

    async fn write_read(&mut self, address: u8, write: &[u8], read: &mut [u8]) -> Result<(), Self::Error> {
        self.run(Address::SevenBit(address), Sequence::WriteRead(write, read)).await
    }

    async fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        self.chain(Address::SevenBit(address), operations).await
    }
}

impl<M: RawMutex, R: I2cRegisters> I2c<TenBitAddress> for BusDevice<'_, M, R> {
    async fn read(&mut self, address: u16, read: &mut [u8]) -> Result<(), Self::Error> {
        self.run(Address::TenBit(address), Sequence::Read(read)).await
    }

    async fn write(&mut self, address: u16, write: &[u8]) -> Result<(), Self::Error> {
        self.run(Address::TenBit(address), Sequence::Write(write)).await
    }

    async fn write_read(&mut self, address: u16, write: &[u8], read: &mut [u8]) -> Result<(), Self::Error> {
        self.run(Address::TenBit(address), Sequence::WriteRead(write, read)).await
    }

    async fn transaction(&mut self, address: u16, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        self.chain(Address::TenBit(address), operations).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use strongbox_core::sim::{SimBus, SimDevice, SimProbe, Wire};
    use strongbox_core::BusConfig;
    use strongbox_hal::ClockMode;

    const GAUGE: u8 = 0x55;

    fn bus(sim: SimBus) -> (I2cBus<NoopRawMutex, SimBus>, SimProbe) {
        let probe = sim.probe();
        (I2cBus::new(BusId(0), sim, BusConfig::default()), probe)
    }

    #[test]
    fn test_write_read_register() {
        let (bus, probe) = bus(SimBus::new(SimDevice::seven_bit(GAUGE).with_data(&[0x34, 0x12])));
        let mut dev = BusDevice::new(&bus);
        let mut word = [0u8; 2];

        block_on(I2c::write_read(&mut dev, GAUGE, &[0x08], &mut word)).unwrap();

        assert_eq!(u16::from_le_bytes(word), 0x1234);
        assert_eq!(probe.received(), std::vec![0x08]);
    }

    #[test]
    fn test_nack_maps_to_error_kind() {
        use embedded_hal_async::i2c::{Error, ErrorKind, NoAcknowledgeSource};

        let (bus, _probe) = bus(SimBus::new(SimDevice::seven_bit(GAUGE)));
        let mut dev = BusDevice::new(&bus);

        let err = block_on(I2c::write(&mut dev, 0x11u8, &[0x00])).unwrap_err();

        assert_eq!(err, I2cError::Nack);
        assert_eq!(err.kind(), ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown));
    }

    #[test]
    fn test_empty_read_is_rejected() {
        let (bus, probe) = bus(SimBus::new(SimDevice::seven_bit(GAUGE)));
        let mut dev = BusDevice::new(&bus);

        let err = block_on(I2c::read(&mut dev, GAUGE, &mut [])).unwrap_err();

        assert_eq!(err, I2cError::UsageFault);
        assert!(probe.wire().is_empty());
    }

    #[test]
    fn test_ten_bit_write_read() {
        let (bus, probe) = bus(SimBus::new(SimDevice::ten_bit(0x3A1).with_data(&[0x99])));
        let mut dev = BusDevice::new(&bus);
        let mut buf = [0u8; 1];

        block_on(I2c::<TenBitAddress>::write_read(&mut dev, 0x3A1, &[0x02], &mut buf)).unwrap();

        assert_eq!(buf, [0x99]);
        assert_eq!(probe.received(), std::vec![0x02]);
    }

    #[test]
    fn test_transaction_merges_and_restarts() {
        let (bus, probe) = bus(SimBus::new(SimDevice::seven_bit(GAUGE).with_data(&[0xA0, 0xA1, 0xA2])));
        let mut dev = BusDevice::new(&bus);
        let mut head = [0u8; 1];
        let mut tail = [0u8; 2];

        block_on(I2c::transaction(
            &mut dev,
            GAUGE,
            &mut [
                Operation::Write(&[0x3E]),
                Operation::Write(&[0x01, 0x02]),
                Operation::Read(&mut head),
                Operation::Read(&mut tail),
            ],
        ))
        .unwrap();

        assert_eq!(head, [0xA0]);
        assert_eq!(tail, [0xA1, 0xA2]);
        assert_eq!(
            probe.wire(),
            std::vec![
                Wire::Start,
                Wire::Tx { byte: GAUGE << 1, ack: true },
                Wire::Tx { byte: 0x3E, ack: true },
                Wire::Tx { byte: 0x01, ack: true },
                Wire::Tx { byte: 0x02, ack: true },
                Wire::RepeatedStart,
                Wire::Tx { byte: (GAUGE << 1) | 1, ack: true },
                Wire::Rx { byte: 0xA0, ack: true },
                Wire::Rx { byte: 0xA1, ack: true },
                Wire::Rx { byte: 0xA2, ack: false },
                Wire::Stop,
            ]
        );
        assert_eq!(bus.stats().succeeded, 1);
    }

    #[test]
    fn test_transaction_read_then_write() {
        let (bus, probe) = bus(SimBus::new(SimDevice::seven_bit(GAUGE).with_data(&[0x0F])));
        let mut dev = BusDevice::new(&bus);
        let mut status = [0u8; 1];

        block_on(I2c::transaction(
            &mut dev,
            GAUGE,
            &mut [Operation::Read(&mut status), Operation::Write(&[0xF0])],
        ))
        .unwrap();

        assert_eq!(status, [0x0F]);
        assert_eq!(probe.received(), std::vec![0xF0]);
        assert_eq!(probe.rx_acks(), std::vec![false]);
    }

    #[test]
    fn test_transaction_nack_stops_early() {
        let (bus, probe) = bus(SimBus::new(SimDevice::seven_bit(GAUGE).nack_data_at(0)));
        let mut dev = BusDevice::new(&bus);

        let err = block_on(I2c::transaction(
            &mut dev,
            GAUGE,
            &mut [Operation::Write(&[0x01]), Operation::Write(&[0x02])],
        ))
        .unwrap_err();

        assert_eq!(err, I2cError::Nack);
        assert_eq!(probe.received(), std::vec![0x01]);
        assert_eq!(probe.wire().last(), Some(&Wire::Stop));
    }

    #[test]
    fn test_transaction_timeout() {
        let sim = SimBus::new(SimDevice::seven_bit(GAUGE).unresponsive());
        let bus: I2cBus<NoopRawMutex, _> = I2cBus::new(BusId(0), sim, BusConfig::default().with_timeout_ms(2));
        let mut dev = BusDevice::new(&bus);

        let err = block_on(I2c::transaction(&mut dev, GAUGE, &mut [Operation::Write(&[0x01])])).unwrap_err();

        assert_eq!(err, I2cError::Timeout);
        // The abandoned session still shows up in the error count
        assert_eq!(bus.stats().errors, 1);
    }

    #[test]
    fn test_transaction_deadline_excludes_lock_wait() {
        use embassy_futures::join::join;
        use embassy_time::{Duration, Timer};

        let sim = SimBus::new(SimDevice::seven_bit(GAUGE));
        let probe = sim.probe();
        let bus: I2cBus<NoopRawMutex, _> = I2cBus::new(BusId(0), sim, BusConfig::default().with_timeout_ms(5));

        let holder = async {
            let guard = bus.enter_critical().await;
            Timer::after(Duration::from_millis(10)).await;
            bus.exit_critical(guard);
        };
        let chained = async {
            let mut dev = BusDevice::new(&bus);
            I2c::transaction(&mut dev, GAUGE, &mut [Operation::Write(&[0x01])]).await
        };

        let ((), result) = block_on(join(holder, chained));

        assert_eq!(result, Ok(()));
        assert_eq!(
            probe.wire(),
            std::vec![
                Wire::Start,
                Wire::Tx { byte: GAUGE << 1, ack: true },
                Wire::Tx { byte: 0x01, ack: true },
                Wire::Stop,
            ]
        );
    }

    #[test]
    fn test_apply_speed() {
        let (bus, probe) = bus(SimBus::new(SimDevice::seven_bit(GAUGE)));
        let dev = BusDevice::new(&bus).with_speed(Speed::Fast);

        block_on(dev.apply_speed()).unwrap();

        assert_eq!(probe.clock_mode(), Some(ClockMode::Asymmetric));
        assert_eq!(dev.bus_id(), BusId(0));
    }
}
