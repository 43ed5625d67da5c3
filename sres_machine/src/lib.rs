//! Multi-clock cooperative scheduler with consistent snapshots.
//!
//! A [System] interleaves several independently clocked chips on a single host thread and can
//! write snapshots of the whole machine, either instantly or after steering every chip to a
//! quiescent instant so the snapshot only holds architectural state.
pub mod common;
pub mod components;
pub mod debugger;
pub mod scheduler;
pub mod system;

pub use system::cartridge::Cartridge;
pub use system::config::Configuration;
pub use system::config::SerializationMethod;
pub use system::snapshot::SnapshotError;
pub use system::System;
pub use system::SystemDebug;
