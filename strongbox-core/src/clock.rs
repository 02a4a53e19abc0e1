//! Clock divisor computation
//!
//! The peripheral divides its reference clock as
//!
//! ```text
//! f_scl = f_ref / ((n_low + n_high) * (div + 1) + 8)
//! ```
//!
//! where `n_low:n_high` is the clock ratio mode and the constant 8 covers
//! the synchronisation overhead of the SCL line. The divisor is solved for
//! and rounded up, so the bus never runs faster than requested.

use strongbox_hal::ClockMode;

use crate::config::Role;

/// Fixed per-period overhead in reference clock cycles
pub const SYNC_OVERHEAD: u32 = 8;

/// Widest divisor the register field holds
pub const MAX_DIVISOR: u16 = 0x1FF;

/// Divisor and ratio to program for one speed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockSetting {
    /// Clock ratio mode
    pub mode: ClockMode,
    /// Divisor register value
    pub divisor: u16,
}

/// Lowest reference clock that can drive `mode` in `role`
pub const fn min_reference_hz(mode: ClockMode, role: Role) -> u32 {
    match (role, mode) {
        (Role::Master, ClockMode::Standard) => 2_000_000,
        (Role::Master, ClockMode::Asymmetric) => 9_000_000,
        (Role::Master, ClockMode::Fast) => 20_000_000,
        (Role::SlaveCapable, ClockMode::Standard) => 4_200_000,
        (Role::SlaveCapable, ClockMode::Asymmetric) => 11_000_000,
        (Role::SlaveCapable, ClockMode::Fast) => 24_400_000,
    }
}

/// Compute the divisor for `scl_hz`
///
/// # Panics
///
/// If `scl_hz` is zero, the reference clock is below
/// [`min_reference_hz`], or the divisor does not fit the register. These
/// are configuration errors, not runtime conditions.
pub fn divisor(reference_hz: u32, scl_hz: u32, mode: ClockMode, role: Role) -> u16 {
    assert!(scl_hz > 0, "SCL frequency must be non-zero");
    assert!(
        reference_hz > min_reference_hz(mode, role),
        "reference clock too slow for clock mode"
    );

    let reference = u64::from(reference_hz);
    let scl = u64::from(scl_hz);
    let overhead = u64::from(SYNC_OVERHEAD) * scl;
    let per_div = u64::from(mode.period()) * scl;

    let div = reference
        .saturating_sub(overhead)
        .div_ceil(per_div)
        .saturating_sub(1);

    assert!(div <= u64::from(MAX_DIVISOR), "clock divisor out of range");

    let div = div as u16;
    // Slave operation needs at least one divisor step
    if role == Role::SlaveCapable && div == 0 {
        1
    } else {
        div
    }
}

/// [`divisor`] bundled with its clock mode
pub fn setting(reference_hz: u32, scl_hz: u32, mode: ClockMode, role: Role) -> ClockSetting {
    ClockSetting {
        mode,
        divisor: divisor(reference_hz, scl_hz, mode, role),
    }
}

/// SCL frequency produced by `divisor`
pub fn actual_frequency(reference_hz: u32, mode: ClockMode, divisor: u16) -> u32 {
    let cycles = mode.period() * (u32::from(divisor) + 1) + SYNC_OVERHEAD;
    reference_hz / cycles
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_standard_at_default_reference() {
        // 38.4 MHz / (8 * 47 + 8) = 100 kHz exactly
        let div = divisor(38_400_000, 100_000, ClockMode::Standard, Role::Master);
        assert_eq!(div, 46);
        assert_eq!(actual_frequency(38_400_000, ClockMode::Standard, div), 100_000);
    }

    #[test]
    fn test_fast_rounds_down_frequency() {
        let div = divisor(38_400_000, 400_000, ClockMode::Asymmetric, Role::Master);
        assert_eq!(div, 9);
        assert!(actual_frequency(38_400_000, ClockMode::Asymmetric, div) <= 400_000);
    }

    #[test]
    fn test_slave_capable_never_zero() {
        // 20.1 MHz at 1 MHz in 11:6 would need no division at all
        assert_eq!(divisor(20_100_000, 1_000_000, ClockMode::Fast, Role::Master), 0);
        assert_eq!(divisor(24_500_000, 1_000_000, ClockMode::Fast, Role::SlaveCapable), 1);
    }

    #[test]
    fn test_setting_carries_mode() {
        let setting = setting(38_400_000, 1_000_000, ClockMode::Fast, Role::Master);
        assert_eq!(setting.mode, ClockMode::Fast);
        assert_eq!(setting.divisor, 1);
    }

    #[test]
    #[should_panic(expected = "reference clock too slow")]
    fn test_reference_below_minimum() {
        divisor(9_000_000, 400_000, ClockMode::Asymmetric, Role::Master);
    }

    #[test]
    #[should_panic(expected = "reference clock too slow")]
    fn test_slave_minimum_is_stricter() {
        divisor(4_000_000, 100_000, ClockMode::Standard, Role::SlaveCapable);
    }

    #[test]
    #[should_panic(expected = "clock divisor out of range")]
    fn test_divisor_overflow() {
        divisor(80_000_000, 10_000, ClockMode::Standard, Role::Master);
    }

    fn modes() -> impl Strategy<Value = ClockMode> {
        prop_oneof![
            Just(ClockMode::Standard),
            Just(ClockMode::Asymmetric),
            Just(ClockMode::Fast),
        ]
    }

    proptest! {
        /// The bus never runs faster than asked for
        #[test]
        fn divisor_never_exceeds_target(
            mode in modes(),
            reference in 24_500_000u32..=80_000_000,
            scl in 100_000u32..=1_000_000,
        ) {
            let div = divisor(reference, scl, mode, Role::Master);
            prop_assert!(actual_frequency(reference, mode, div) <= scl);
        }

        /// One step less would overshoot
        #[test]
        fn divisor_is_minimal(
            mode in modes(),
            reference in 24_500_000u32..=80_000_000,
            scl in 100_000u32..=1_000_000,
        ) {
            let div = divisor(reference, scl, mode, Role::Master);
            if div > 0 {
                let faster = u64::from(mode.period()) * u64::from(div) + u64::from(SYNC_OVERHEAD);
                prop_assert!(u64::from(reference) > u64::from(scl) * faster);
            }
        }

        /// Slave-capable divisors match master ones except at zero
        #[test]
        fn slave_capable_only_bumps_zero(
            mode in modes(),
            reference in 24_500_000u32..=80_000_000,
            scl in 100_000u32..=1_000_000,
        ) {
            let master = divisor(reference, scl, mode, Role::Master);
            let slave = divisor(reference, scl, mode, Role::SlaveCapable);
            prop_assert_eq!(slave, master.max(1));
        }
    }
}
