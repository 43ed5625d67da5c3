//! Independent chips of the machine
//!
//! Every chip implements the [Chip](crate::scheduler::Chip) contract and is driven by the
//! scheduler one slice at a time.
//!
//! To keep the chips independent and their interaction visible, the following rules are applied:
//! - Components cannot depend on one another
//! - Components can only import code from common/ and the chip contract in scheduler/
//! - All cross-chip communication goes through the shared bus
//! - All modules inside a component must be private
//! - Use self/super to refer to inner modules
//! - Do not use super to refer to outer modules

pub mod coprocessor;
pub mod cpu;
pub mod ppu;
pub mod smp;
