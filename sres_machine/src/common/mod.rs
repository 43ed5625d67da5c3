//! Traits and types used by all components of the emulator.

pub mod bus;
pub mod clock;
pub mod debug_events;
pub mod entropy;
pub mod image;
pub mod logging;
pub mod serializer;
pub mod util;
