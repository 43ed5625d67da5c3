//! Work RAM patches applied at every frame.
use std::fmt::Display;
use std::str::FromStr;

use anyhow::bail;
use anyhow::Context;

use crate::common::bus::Bus;

/// Writes `value` to `address`, optionally only while the address holds `compare`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cheat {
    pub address: u16,
    pub compare: Option<u8>,
    pub value: u8,
}

impl Cheat {
    pub fn apply(&self, bus: &mut Bus) {
        if let Some(compare) = self.compare {
            if bus.read_wram(self.address) != compare {
                return;
            }
        }
        bus.write_wram(self.address, self.value);
    }
}

impl FromStr for Cheat {
    type Err = anyhow::Error;

    /// Parses `addr=value` or `addr?compare=value`, all hexadecimal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((target, value)) = s.split_once('=') else {
            bail!("Missing '=' in cheat {}", s);
        };
        let (address, compare) = match target.split_once('?') {
            Some((address, compare)) => (address, Some(compare)),
            None => (target, None),
        };
        let hex_u8 = |text: &str| {
            u8::from_str_radix(text.trim(), 16)
                .with_context(|| format!("Invalid byte {:?} in cheat {}", text, s))
        };
        Ok(Cheat {
            address: u16::from_str_radix(address.trim(), 16)
                .with_context(|| format!("Invalid address {:?} in cheat {}", address, s))?,
            compare: compare.map(hex_u8).transpose()?,
            value: hex_u8(value)?,
        })
    }
}

impl Display for Cheat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.compare {
            Some(compare) => write!(f, "{:04X}?{:02X}={:02X}", self.address, compare, self.value),
            None => write!(f, "{:04X}={:02X}", self.address, self.value),
        }
    }
}
