//! Plug-in coprocessors found on some cartridges.
//!
//! Each coprocessor talks to the CPU through its own latch on the bus: the CPU writes operands
//! to ports 1-3 and a command to port 0, which raises the strobe.
mod multiplier;
mod rtc;

use serde::Deserialize;
use serde::Serialize;

pub use self::multiplier::Multiplier;
pub use self::rtc::Rtc;
use crate::scheduler::Chip;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum CoprocessorKind {
    /// Multiply/divide unit with a fixed result latency.
    Multiplier,
    /// Real-time clock counting seconds.
    Rtc,
}

impl CoprocessorKind {
    /// Creates the coprocessor attached to latch `index`.
    pub fn create(self, index: u8) -> Box<dyn Chip> {
        match self {
            CoprocessorKind::Multiplier => Box::new(Multiplier::new(index)),
            CoprocessorKind::Rtc => Box::new(Rtc::new(index)),
        }
    }
}

#[cfg(test)]
mod test {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_create() {
        let frequencies = CoprocessorKind::iter()
            .map(|kind| kind.create(1).frequency())
            .collect::<Vec<_>>();
        assert_eq!(frequencies, vec![multiplier::FREQUENCY, rtc::FREQUENCY]);
        assert_eq!(
            "rtc".parse::<CoprocessorKind>().unwrap(),
            CoprocessorKind::Rtc
        );
    }
}
