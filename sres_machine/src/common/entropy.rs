//! Seeding of uninitialized memory at power-on.
use rand::rngs::StdRng;
use rand::Rng;
use rand::RngCore;
use rand::SeedableRng;
use serde::Deserialize;
use serde::Serialize;

/// Seed used for [Entropy::Low], so that low entropy power-ons are reproducible.
const LOW_ENTROPY_SEED: u64 = 0x5352_4553_0000_0001;

/// How uninitialized RAM and registers are filled when the machine powers on.
///
/// Only affects freshly powered state. Loading a snapshot overwrites everything it seeded.
#[derive(
    Default,
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum Entropy {
    /// Everything starts zeroed.
    None,
    /// Pseudo-random contents from a fixed seed.
    #[default]
    Low,
    /// Pseudo-random contents seeded from the host.
    High,
}

/// Source of power-on contents. Without entropy there is no generator and everything is zero.
pub struct Random {
    entropy: Entropy,
    rng: Option<StdRng>,
}

impl Random {
    pub fn new(entropy: Entropy) -> Self {
        let rng = match entropy {
            Entropy::None => None,
            Entropy::Low => Some(StdRng::seed_from_u64(LOW_ENTROPY_SEED)),
            Entropy::High => Some(StdRng::from_entropy()),
        };
        Self { entropy, rng }
    }

    pub fn entropy(&self) -> Entropy {
        self.entropy
    }

    pub fn fill(&mut self, data: &mut [u8]) {
        match &mut self.rng {
            Some(rng) => rng.fill_bytes(data),
            None => data.fill(0),
        }
    }

    pub fn next_u16(&mut self) -> u16 {
        self.rng.as_mut().map_or(0, |rng| rng.gen())
    }
}
