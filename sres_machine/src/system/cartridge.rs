//! Description of the cartridge a machine is built for.
use std::path::Path;

use anyhow::ensure;
use anyhow::Context;
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;

use crate::common::bus::WRAM_SIZE;
use crate::components::coprocessor::CoprocessorKind;

/// Largest number of coprocessors a cartridge can carry.
pub const MAX_COPROCESSORS: usize = 4;

#[derive(Default, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Cartridge {
    /// Header title, used to look up per-title settings.
    pub title: String,
    /// Coprocessors on the cartridge, attached to the CPU in this order.
    pub coprocessors: Vec<CoprocessorKind>,
    /// Loaded into work RAM at power-on, after it was seeded.
    #[serde(skip)]
    pub program: Vec<u8>,
}

impl Cartridge {
    pub fn new(title: &str, coprocessors: &[CoprocessorKind]) -> Self {
        Self {
            title: title.to_string(),
            coprocessors: coprocessors.to_vec(),
            program: Vec::new(),
        }
    }

    pub fn with_program(mut self, program: &[u8]) -> Self {
        self.program = program.to_vec();
        self
    }

    /// Reads a JSON description from `path`. A program image next to it with the `bin`
    /// extension is loaded as well.
    pub fn with_description_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read cartridge {}", path.display()))?;
        let deserializer = &mut serde_json::Deserializer::from_str(&json);
        let mut cartridge: Cartridge = serde_path_to_error::deserialize(deserializer)
            .with_context(|| format!("Invalid cartridge {}", path.display()))?;

        let program_path = path.with_extension("bin");
        if program_path.exists() {
            cartridge.program = std::fs::read(&program_path)?;
        }
        cartridge.validate()?;
        Ok(cartridge)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.coprocessors.len() <= MAX_COPROCESSORS,
            "{} coprocessors, at most {} are supported",
            self.coprocessors.len(),
            MAX_COPROCESSORS
        );
        ensure!(
            self.program.len() <= WRAM_SIZE,
            "Program of {} bytes does not fit into work RAM",
            self.program.len()
        );
        Ok(())
    }
}
