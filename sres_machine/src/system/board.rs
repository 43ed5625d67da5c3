//! The chips of one machine, wired to a shared bus.
use super::cartridge::Cartridge;
use crate::common::bus::Bus;
use crate::common::entropy::Random;
use crate::common::serializer::Serializer;
use crate::components::cpu::Cpu;
use crate::components::ppu::Ppu;
use crate::components::smp::Smp;
use crate::scheduler::Chip;
use crate::scheduler::ChipSet;
use crate::scheduler::Context;
use crate::scheduler::Scheduler;
use crate::scheduler::ThreadId;

pub struct Board {
    pub bus: Bus,
    pub cpu: Cpu,
    pub smp: Smp,
    pub ppu: Ppu,
    pub coprocessors: Vec<Box<dyn Chip>>,
}

impl Board {
    pub fn new(cartridge: &Cartridge) -> Self {
        let coprocessors = cartridge
            .coprocessors
            .iter()
            .enumerate()
            .map(|(index, kind)| kind.create(index as u8))
            .collect::<Vec<_>>();
        Self {
            bus: Bus::new(coprocessors.len()),
            cpu: Cpu::new(coprocessors.len() as u8),
            smp: Smp::new(),
            ppu: Ppu::new(),
            coprocessors,
        }
    }

    /// Thread ids of all chips in thread index order.
    pub fn threads(&self) -> impl Iterator<Item = ThreadId> {
        [ThreadId::Cpu, ThreadId::Smp, ThreadId::Ppu]
            .into_iter()
            .chain((0..self.coprocessors.len() as u8).map(ThreadId::Coprocessor))
    }

    pub fn chip(&self, id: ThreadId) -> Option<&dyn Chip> {
        match id {
            ThreadId::Cpu => Some(&self.cpu),
            ThreadId::Smp => Some(&self.smp),
            ThreadId::Ppu => Some(&self.ppu),
            ThreadId::Coprocessor(index) => {
                self.coprocessors.get(index as usize).map(|chip| chip.as_ref())
            }
        }
    }

    pub fn chip_mut(&mut self, id: ThreadId) -> Option<&mut dyn Chip> {
        match id {
            ThreadId::Cpu => Some(&mut self.cpu),
            ThreadId::Smp => Some(&mut self.smp),
            ThreadId::Ppu => Some(&mut self.ppu),
            ThreadId::Coprocessor(index) => match self.coprocessors.get_mut(index as usize) {
                Some(chip) => Some(chip.as_mut()),
                None => None,
            },
        }
    }

    /// Registers one thread per chip with `scheduler`.
    pub fn create_threads(&self, scheduler: &mut Scheduler) {
        for id in self.threads() {
            if let Some(chip) = self.chip(id) {
                scheduler.create(id, chip.frequency());
            }
        }
    }

    /// Powers on every chip. Work RAM is seeded from `random`, then overlaid with the program.
    pub fn power(&mut self, random: &mut Random, program: &[u8]) {
        random.fill(self.bus.wram.as_mut_slice());
        let length = program.len().min(self.bus.wram.len());
        self.bus.wram[..length].copy_from_slice(&program[..length]);
        self.bus.reset();

        let threads = self.threads().collect::<Vec<_>>();
        for id in threads {
            if let Some(chip) = self.chip_mut(id) {
                chip.power(random);
            }
        }
    }

    /// Architectural registers of `id`, plus its continuation if `stack` is set.
    pub fn serialize_chip(&mut self, id: ThreadId, stack: bool, s: &mut Serializer) {
        if let Some(chip) = self.chip_mut(id) {
            chip.serialize(s);
            if stack {
                chip.serialize_stack(s);
            }
        }
    }

    /// True if no chip has a unit of work in flight.
    pub fn at_boundary(&self) -> bool {
        self.threads()
            .filter_map(|id| self.chip(id))
            .all(|chip| chip.at_boundary())
    }
}

impl ChipSet for Board {
    fn main(&mut self, thread: ThreadId, scheduler: &mut Scheduler) {
        let Board {
            bus,
            cpu,
            smp,
            ppu,
            coprocessors,
        } = self;
        let mut cx = Context::new(bus, scheduler, thread);
        match thread {
            ThreadId::Cpu => cpu.main(&mut cx),
            ThreadId::Smp => smp.main(&mut cx),
            ThreadId::Ppu => ppu.main(&mut cx),
            ThreadId::Coprocessor(index) => {
                if let Some(chip) = coprocessors.get_mut(index as usize) {
                    chip.main(&mut cx);
                }
            }
        }
    }
}
