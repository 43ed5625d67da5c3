//! Feeds arbitrary and corrupted snapshots to the loader.
#![no_main]

use libfuzzer_sys::fuzz_target;
use sres_machine::components::coprocessor::CoprocessorKind;
use sres_machine::system::snapshot::Header;
use sres_machine::Cartridge;
use sres_machine::Configuration;
use sres_machine::System;

fuzz_target!(|data: &[u8]| {
    let cartridge = Cartridge::new("FUZZ", &[CoprocessorKind::Multiplier, CoprocessorKind::Rtc]);
    let Ok(mut system) = System::new(Configuration::default(), cartridge) else {
        return;
    };
    // Raw bytes are almost always rejected by the header checks.
    let _ = system.unserialize(data);

    // Corrupt the body of a valid snapshot so the chip decoders see the data.
    let Some((&selector, patch)) = data.split_first() else {
        return;
    };
    let mut snapshot = system.serialize(selector & 1 == 1, "fuzz");
    let body = snapshot.len() - Header::SIZE;
    for (index, value) in patch.iter().enumerate() {
        snapshot[Header::SIZE + index % body] ^= value;
    }
    // This can be rejected in all kinds of ways, but it should never ever panic!
    if system.unserialize(&snapshot).is_ok() {
        system.run();
    }
});
