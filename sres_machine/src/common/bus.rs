//! The shared system bus.
//!
//! Work RAM and the latched I/O ports are the only state that more than one chip can observe.
//! Chips never reach into each other's registers; everything crosses over through here.
use crate::common::serializer::Serializable;
use crate::common::serializer::Serializer;

pub const WRAM_SIZE: usize = 0x2000;
pub const WRAM_MASK: u16 = (WRAM_SIZE - 1) as u16;

/// A pair of 4 byte mailboxes between the CPU and one other chip.
///
/// The CPU writes `input` and reads `output`, the other chip does the opposite. Writing the
/// command port (`input[0]`) raises `strobe` until the other chip acknowledges it.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Latch {
    pub input: [u8; 4],
    pub output: [u8; 4],
    pub strobe: bool,
}

impl Latch {
    pub fn write_input(&mut self, port: usize, value: u8) {
        self.input[port % 4] = value;
        if port % 4 == 0 {
            self.strobe = true;
        }
    }

    pub fn read_output(&self, port: usize) -> u8 {
        self.output[port % 4]
    }

    pub fn take_strobe(&mut self) -> bool {
        std::mem::take(&mut self.strobe)
    }
}

impl Serializable for Latch {
    fn serialize(&mut self, s: &mut Serializer) {
        s.bytes(&mut self.input);
        s.bytes(&mut self.output);
        s.boolean(&mut self.strobe);
    }
}

pub struct Bus {
    pub wram: Box<[u8; WRAM_SIZE]>,
    /// Ports between the CPU and the audio processor.
    pub apu: Latch,
    /// Ports between the CPU and each coprocessor, indexed like the coprocessor threads.
    pub coprocessors: Vec<Latch>,
}

impl Bus {
    pub fn new(coprocessor_count: usize) -> Self {
        Self {
            wram: Box::new([0; WRAM_SIZE]),
            apu: Latch::default(),
            coprocessors: vec![Latch::default(); coprocessor_count],
        }
    }

    pub fn reset(&mut self) {
        self.apu = Latch::default();
        self.coprocessors.fill(Latch::default());
    }

    #[inline]
    pub fn read_wram(&self, addr: u16) -> u8 {
        self.wram[(addr & WRAM_MASK) as usize]
    }

    #[inline]
    pub fn write_wram(&mut self, addr: u16, value: u8) {
        self.wram[(addr & WRAM_MASK) as usize] = value;
    }

    pub fn coprocessor_latch(&mut self, index: usize) -> Option<&mut Latch> {
        self.coprocessors.get_mut(index)
    }
}

impl Serializable for Bus {
    fn serialize(&mut self, s: &mut Serializer) {
        s.bytes(self.wram.as_mut_slice());
        s.object(&mut self.apu);
        for latch in self.coprocessors.iter_mut() {
            s.object(latch);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_wram_mirrors() {
        let mut bus = Bus::new(0);
        bus.write_wram(0x2001, 0x42);
        assert_eq!(bus.read_wram(0x0001), 0x42);
    }

    #[test]
    fn test_command_port_raises_strobe() {
        let mut latch = Latch::default();
        latch.write_input(1, 0x10);
        assert!(!latch.strobe);
        latch.write_input(0, 0x01);
        assert!(latch.take_strobe());
        assert!(!latch.take_strobe());
    }
}
