use std::path::Path;

use anyhow::Context;
use anyhow::Result;
use log::warn;
use serde::Deserialize;
use serde::Serialize;

pub use super::driver::SerializationMethod;
use crate::common::entropy::Entropy;

/// Titles that are known to misbehave when snapshots are taken with
/// [SerializationMethod::Fast]. Their code relies on tight timing between the CPU and the audio
/// processor that Fast does not reproduce after a load. The list is empirical: there is no way
/// to tell from the game code alone.
pub const STRICT_TITLES: &[&str] = &["RENDERING RANGER R2", "TALES OF PHANTASIA", "STAR OCEAN"];

#[derive(Default, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Configuration {
    /// How chips are driven to their synchronization points before a portable snapshot.
    pub serialization: SerializationMethod,
    /// How uninitialized memory is filled at power-on.
    pub entropy: Entropy,
    /// Titles forced to [SerializationMethod::Strict] on top of [STRICT_TITLES].
    pub strict_titles: Vec<String>,
}

impl Configuration {
    pub fn from_json(json: &str) -> Result<Self> {
        let deserializer = &mut serde_json::Deserializer::from_str(json);
        Ok(serde_path_to_error::deserialize(deserializer)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read configuration {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Invalid configuration {}", path.display()))
    }

    /// The method used for the cartridge titled `title`. Matching is exact.
    pub fn serialization_for(&self, title: &str) -> SerializationMethod {
        let forced = STRICT_TITLES.contains(&title)
            || self.strict_titles.iter().any(|strict| strict == title);
        if forced && self.serialization != SerializationMethod::Strict {
            warn!("{} requires strict synchronization for snapshots", title);
            return SerializationMethod::Strict;
        }
        self.serialization
    }
}
