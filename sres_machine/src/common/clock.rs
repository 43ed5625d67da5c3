//! Clock domains and the cross-multiplied comparison between them.
//!
//! The main CPU is the reference domain. Every other chip keeps its time as a signed offset from
//! the CPU, scaled by the product of both frequencies: the chip's own step adds
//! `cycles * cpu_frequency`, a CPU step subtracts `cpu_cycles * chip_frequency`. Comparing the
//! two domains is then a comparison against zero, with no division and no accumulated rounding.
use crate::common::serializer::Serializable;
use crate::common::serializer::Serializer;

/// Frequency of the CPU (master clock) domain in Hz.
pub const CPU_FREQUENCY: u32 = 21_477_272;

/// Frequency of the audio processor's oscillator in Hz.
pub const SMP_FREQUENCY: u32 = 24_576_000;

#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub struct Clock {
    pub frequency: u32,
    pub value: i64,
}

impl Clock {
    pub fn new(frequency: u32) -> Self {
        Self {
            frequency,
            value: 0,
        }
    }

    pub fn reset(&mut self) {
        self.value = 0;
    }

    /// Advances this clock by `cycles` of its own domain, measured against `reference_frequency`.
    #[inline]
    pub fn advance(&mut self, cycles: u32, reference_frequency: u32) {
        self.value += cycles as i64 * reference_frequency as i64;
    }

    /// Moves this clock back by `reference_cycles` of the reference domain.
    #[inline]
    pub fn rewind(&mut self, reference_cycles: u32) {
        self.value -= reference_cycles as i64 * self.frequency as i64;
    }

    /// True if this domain is level with or ahead of the reference domain.
    #[inline]
    pub fn ahead(&self) -> bool {
        self.value >= 0
    }

    /// True if this domain is ahead of the reference domain by more than `cycles` of its own.
    #[inline]
    pub fn ahead_by(&self, cycles: u32, reference_frequency: u32) -> bool {
        self.value > cycles as i64 * reference_frequency as i64
    }
}

impl Serializable for Clock {
    fn serialize(&mut self, s: &mut Serializer) {
        s.integer(&mut self.frequency);
        s.integer(&mut self.value);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cross_multiplied_comparison() {
        // One second of CPU time against one second of SMP time is exactly level.
        let mut clock = Clock::new(SMP_FREQUENCY);
        clock.advance(SMP_FREQUENCY, CPU_FREQUENCY);
        clock.rewind(CPU_FREQUENCY);
        assert_eq!(clock.value, 0);
        assert!(clock.ahead());

        clock.rewind(1);
        assert!(!clock.ahead());
        assert_eq!(clock.value, -(SMP_FREQUENCY as i64));
    }

    #[test]
    fn test_ahead_by() {
        let mut clock = Clock::new(SMP_FREQUENCY);
        clock.advance(24, CPU_FREQUENCY);
        assert!(clock.ahead_by(23, CPU_FREQUENCY));
        assert!(!clock.ahead_by(24, CPU_FREQUENCY));
    }
}
