//! A minimal machine for testing individual chips against the scheduler.
use super::Chip;
use super::ChipSet;
use super::Context;
use super::Event;
use super::Mode;
use super::Scheduler;
use super::ThreadId;
use crate::common::bus::Bus;
use crate::common::entropy::Entropy;
use crate::common::entropy::Random;
use crate::common::serializer::Serializer;

pub struct TestChips {
    pub bus: Bus,
    pub chips: Vec<Box<dyn Chip>>,
}

impl ChipSet for TestChips {
    fn main(&mut self, thread: ThreadId, scheduler: &mut Scheduler) {
        let mut cx = Context::new(&mut self.bus, scheduler, thread);
        self.chips[thread.index()].main(&mut cx);
    }
}

/// Chips in thread index order, starting with the CPU.
pub struct TestMachine {
    pub scheduler: Scheduler,
    pub chips: TestChips,
}

impl TestMachine {
    pub fn new(mut chips: Vec<Box<dyn Chip>>) -> Self {
        let mut scheduler = Scheduler::new();
        let mut random = Random::new(Entropy::None);
        for (index, chip) in chips.iter_mut().enumerate() {
            chip.power(&mut random);
            let Some(id) = ThreadId::from_index(index) else {
                panic!("too many chips");
            };
            scheduler.create(id, chip.frequency());
        }
        let coprocessors = chips.len().saturating_sub(3);
        Self {
            scheduler,
            chips: TestChips {
                bus: Bus::new(coprocessors),
                chips,
            },
        }
    }

    pub fn chip(&self, id: ThreadId) -> &dyn Chip {
        self.chips.chips[id.index()].as_ref()
    }

    /// Runs until a chip leaves in normal execution mode.
    pub fn run(&mut self) -> Event {
        self.scheduler.set_mode(Mode::Run);
        self.scheduler.enter(&mut self.chips)
    }

    /// Drives `id` from its synchronization point to the next one, returning the event of
    /// whichever chip left first.
    pub fn step_instruction(&mut self, id: ThreadId) -> Event {
        self.scheduler.set_mode(Mode::Synchronize);
        self.scheduler.set_active(id);
        let event = self.scheduler.enter(&mut self.chips);
        self.scheduler.set_mode(Mode::Run);
        event
    }

    /// Drives `id` until it reaches its synchronization point without disturbance.
    pub fn synchronize(&mut self, id: ThreadId) {
        while self.step_instruction(id) != Event::Synchronized {}
        self.scheduler.clear_desynchronized();
    }

    pub fn save_chip(&mut self, id: ThreadId) -> Vec<u8> {
        let mut s = Serializer::save(0);
        let chip = &mut self.chips.chips[id.index()];
        chip.serialize(&mut s);
        chip.serialize_stack(&mut s);
        s.into_data()
    }
}

/// Stand-in chip that spends a fixed number of units per instruction and keeps its peers in
/// sync, without touching the bus.
pub struct Ticker {
    pub frequency: u32,
    pub units: u32,
    pub instructions: u64,
    /// Leaves with a frame event every this many instructions.
    pub frame_instructions: Option<u64>,
    stepped: bool,
}

impl Ticker {
    pub fn new(frequency: u32, units: u32) -> Self {
        Self {
            frequency,
            units,
            instructions: 0,
            frame_instructions: None,
            stepped: false,
        }
    }

    pub fn with_frames(mut self, instructions: u64) -> Self {
        self.frame_instructions = Some(instructions);
        self
    }
}

impl Chip for Ticker {
    fn frequency(&self) -> u32 {
        self.frequency
    }

    fn power(&mut self, _random: &mut Random) {
        self.instructions = 0;
        self.stepped = false;
    }

    fn main(&mut self, cx: &mut Context) {
        if !self.stepped {
            if !cx.synchronize_point() {
                return;
            }
            cx.step(self.units);
            self.instructions += 1;
            self.stepped = true;
            return;
        }
        self.stepped = false;
        if let Some(frame) = self.frame_instructions {
            if self.instructions % frame == 0 {
                cx.leave(Event::Frame);
                return;
            }
        }
        if cx.thread() != ThreadId::Cpu {
            cx.synchronize_cpu();
        }
    }

    fn serialize(&mut self, s: &mut Serializer) {
        s.integer(&mut self.instructions);
    }

    fn serialize_stack(&mut self, s: &mut Serializer) {
        s.boolean(&mut self.stepped);
    }

    fn at_boundary(&self) -> bool {
        !self.stepped
    }
}
