//! NCO phase increments.
//!
//! This module converts frequencies into the fixed-point phase increments
//! used by the numerically controlled oscillators of the radio tuner. The NCOs
//! run at [`SYSTEM_CLOCK_HZ`] and have a phase accumulator of [`PHASE_BITS`]
//! bits, so a phase increment `p` produces a frequency of
//! `p * SYSTEM_CLOCK_HZ / 2^PHASE_BITS` Hz.
//!
//! Conversions truncate toward zero. Values that do not fit in an `i32`
//! saturate to `i32::MIN` or `i32::MAX`, and NaN converts to zero.

/// Clock frequency of the radio tuner NCOs, in Hz.
pub const SYSTEM_CLOCK_HZ: f64 = 125e6;

/// Width in bits of the NCO phase accumulator.
pub const PHASE_BITS: u32 = 27;

fn cycles_to_increment(frequency_hz: f64) -> f64 {
    frequency_hz * f64::from(1u32 << PHASE_BITS) / SYSTEM_CLOCK_HZ
}

/// Computes the phase increment of the ADC NCO.
///
/// The ADC NCO generates the test tone that stands in for the ADC samples,
/// so its phase increment has the same sign as `frequency_hz`.
pub fn adc_phase_increment(frequency_hz: f64) -> i32 {
    cycles_to_increment(frequency_hz) as i32
}

/// Computes the phase increment of the tuner NCO.
///
/// The tuner mixes the signal down, so the phase increment is the negation of
/// the one corresponding to `frequency_hz`.
pub fn tuner_phase_increment(frequency_hz: f64) -> i32 {
    cycles_to_increment(-frequency_hz) as i32
}

fn saturates(increment: f64) -> bool {
    !(f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&increment.trunc())
        && !increment.is_nan()
}

/// Returns `true` if the ADC phase increment for `frequency_hz` does not fit in
/// an `i32` and [`adc_phase_increment`] saturates.
pub fn adc_phase_increment_saturates(frequency_hz: f64) -> bool {
    saturates(cycles_to_increment(frequency_hz))
}

/// Returns `true` if the tuner phase increment for `frequency_hz` does not fit
/// in an `i32` and [`tuner_phase_increment`] saturates.
pub fn tuner_phase_increment_saturates(frequency_hz: f64) -> bool {
    saturates(cycles_to_increment(-frequency_hz))
}
