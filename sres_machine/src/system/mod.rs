//! A complete machine: scheduler, chips and the host facing surface.
pub mod board;
pub mod cartridge;
pub mod cheat;
pub mod config;
pub mod driver;
pub mod platform;
pub mod snapshot;

use std::cell::RefCell;
use std::cell::RefMut;
use std::ops::Deref;
use std::rc::Rc;

use anyhow::Result;
use log::info;

use self::board::Board;
use self::cartridge::Cartridge;
use self::cheat::Cheat;
use self::config::Configuration;
use self::driver::SerializationMethod;
use self::driver::SyncReport;
use self::platform::Headless;
use self::platform::Platform;
use self::snapshot::Header;
use self::snapshot::SnapshotError;
use crate::common::debug_events::DebugEventCollectorRef;
use crate::common::entropy::Random;
use crate::common::serializer::Serializer;
use crate::components::cpu::CpuDebug;
use crate::components::ppu::Framebuffer;
use crate::components::ppu::PpuDebug;
use crate::components::smp::SmpDebug;
use crate::debugger::Debugger;
use crate::debugger::DebuggerRef;
use crate::scheduler::Event;
use crate::scheduler::Scheduler;
use crate::scheduler::ThreadId;

/// Everything that is captured by a snapshot.
struct Machine {
    scheduler: Scheduler,
    board: Board,
    frame: u64,
}

impl Machine {
    fn new(cartridge: &Cartridge) -> Self {
        let board = Board::new(cartridge);
        let mut scheduler = Scheduler::new();
        board.create_threads(&mut scheduler);
        Self {
            scheduler,
            board,
            frame: 0,
        }
    }

    fn power(&mut self, random: &mut Random, program: &[u8]) {
        self.scheduler.reset();
        self.board.power(random, program);
        self.frame = 0;
    }

    /// Everything after the header. Portable bodies leave out chip continuations and the
    /// scheduler stack.
    fn serialize_body(&mut self, s: &mut Serializer, synchronize: bool) {
        s.integer(&mut self.frame);
        s.object(&mut self.board.bus);
        let threads = self.board.threads().collect::<Vec<_>>();
        for id in threads {
            self.scheduler.serialize_thread(id, s);
            self.board.serialize_chip(id, !synchronize, s);
        }
        if !synchronize {
            self.scheduler.serialize_stack(s);
        }
    }
}

/// Host side work done on every frame event.
fn frame_event(
    board: &mut Board,
    frame: &mut u64,
    platform: &mut dyn Platform,
    cheats: &[Cheat],
) {
    *frame = frame.wrapping_add(1);
    platform.video_frame(board.ppu.framebuffer());
    platform.audio_frame(board.smp.samples());
    board.smp.clear_samples();
    for cheat in cheats {
        cheat.apply(&mut board.bus);
    }
}

pub struct System {
    config: Configuration,
    cartridge: Cartridge,
    method: SerializationMethod,
    machine: Machine,
    platform: Box<dyn Platform>,
    cheats: Vec<Cheat>,
    debugger: DebuggerRef,
}

impl System {
    /// Builds and powers on a machine for `cartridge`.
    pub fn new(config: Configuration, cartridge: Cartridge) -> Result<Self> {
        cartridge.validate()?;
        let method = config.serialization_for(&cartridge.title);
        let mut system = Self {
            machine: Machine::new(&cartridge),
            config,
            cartridge,
            method,
            platform: Box::new(Headless),
            cheats: Vec::new(),
            debugger: Rc::new(RefCell::new(Debugger::new())),
        };
        system.power();
        Ok(system)
    }

    /// Cold boot. Memory is seeded according to the configured entropy.
    pub fn power(&mut self) {
        let mut random = Random::new(self.config.entropy);
        self.machine.power(&mut random, &self.cartridge.program);
        self.attach_debugger();
        info!(
            "Powered on {:?} with {} coprocessors",
            self.cartridge.title,
            self.cartridge.coprocessors.len()
        );
    }

    /// Runs until the next frame completes.
    pub fn run(&mut self) {
        puffin::profile_function!();
        let Machine {
            scheduler,
            board,
            frame,
        } = &mut self.machine;
        loop {
            match scheduler.enter(board) {
                Event::Frame => {
                    frame_event(board, frame, self.platform.as_mut(), &self.cheats);
                    return;
                }
                // Only raised while synchronizing, never in normal execution.
                Event::Synchronized | Event::Desynchronized => {}
            }
        }
    }

    pub fn execute_frames(&mut self, count: u64) {
        for _ in 0..count {
            self.run();
        }
    }

    /// Drives every chip to its synchronization point with the configured method. Afterwards
    /// the machine is quiescent and a portable snapshot can be taken.
    pub fn run_to_save(&mut self) -> SyncReport {
        let Machine {
            scheduler,
            board,
            frame,
        } = &mut self.machine;
        let platform = self.platform.as_mut();
        let cheats = &self.cheats;
        driver::run_to_save(self.method, scheduler, board, |board| {
            frame_event(board, frame, platform, cheats)
        })
    }

    /// Size of the snapshot [System::serialize] would produce.
    pub fn serialize_size(&mut self, synchronize: bool) -> usize {
        let mut s = Serializer::measure();
        self.machine.serialize_body(&mut s, synchronize);
        Header::SIZE + s.size()
    }

    /// Writes a snapshot of the machine.
    ///
    /// A portable (`synchronize`) snapshot first runs the machine to a quiescent instant and
    /// only stores architectural state. An instant snapshot is taken right now and includes
    /// every chip continuation, so it can only be loaded by this exact build.
    pub fn serialize(&mut self, synchronize: bool, description: &str) -> Vec<u8> {
        puffin::profile_function!();
        if synchronize {
            self.run_to_save();
        }
        let size = self.serialize_size(synchronize);
        let mut s = Serializer::save(size);
        s.object(&mut Header::new(size, synchronize, description));
        self.machine.serialize_body(&mut s, synchronize);
        debug_assert_eq!(s.size(), size);
        info!(
            "Saved {} snapshot at frame {} ({} bytes)",
            if synchronize { "portable" } else { "instant" },
            self.machine.frame,
            size
        );
        s.into_data()
    }

    /// Restores a snapshot written by [System::serialize]. On error the machine is untouched.
    pub fn unserialize(&mut self, data: &[u8]) -> Result<(), SnapshotError> {
        puffin::profile_function!();
        let header = Header::parse(data)?;
        let measured = self.serialize_size(header.synchronize);
        for expected in [header.size as usize, measured] {
            if expected != data.len() {
                return Err(SnapshotError::SizeMismatch {
                    expected,
                    found: data.len(),
                });
            }
        }
        header.check_version()?;

        let mut machine = Machine::new(&self.cartridge);
        machine.power(
            &mut Random::new(self.config.entropy),
            &self.cartridge.program,
        );
        let mut s = Serializer::load(data);
        s.object(&mut Header::new(0, false, ""));
        machine.serialize_body(&mut s, header.synchronize);
        if s.overrun() {
            return Err(SnapshotError::Truncated);
        }
        if let Some(field) = s.invalid() {
            return Err(SnapshotError::InvalidValue(field));
        }
        if header.synchronize {
            machine.scheduler.park_all();
            machine.scheduler.set_active(ThreadId::Cpu);
        }

        self.machine = machine;
        self.attach_debugger();
        info!(
            "Loaded {} snapshot {:?} at frame {}",
            if header.synchronize { "portable" } else { "instant" },
            header.description(),
            self.machine.frame
        );
        Ok(())
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        self.machine.board.ppu.framebuffer()
    }

    pub fn cartridge(&self) -> &Cartridge {
        &self.cartridge
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Method used by [System::run_to_save] for this cartridge.
    pub fn serialization_method(&self) -> SerializationMethod {
        self.method
    }

    pub fn set_platform(&mut self, platform: Box<dyn Platform>) {
        self.platform = platform;
    }

    pub fn add_cheat(&mut self, cheat: Cheat) {
        self.cheats.push(cheat);
    }

    pub fn clear_cheats(&mut self) {
        self.cheats.clear();
    }

    pub fn cheats(&self) -> &[Cheat] {
        &self.cheats
    }

    /// Exposes debug information for investigating the system state.
    pub fn debug(&self) -> SystemDebug<'_> {
        SystemDebug(self)
    }

    /// Exposes the debugger to set log points and read the scheduler log.
    pub fn debugger(&self) -> RefMut<'_, Debugger> {
        self.debugger.deref().borrow_mut()
    }

    fn attach_debugger(&mut self) {
        self.machine
            .scheduler
            .set_debug_event_collector(Some(DebugEventCollectorRef(self.debugger.clone())));
    }
}

#[derive(Clone, Copy)]
pub struct SystemDebug<'a>(&'a System);

impl<'a> SystemDebug<'a> {
    pub fn cpu(self) -> CpuDebug<'a> {
        self.0.machine.board.cpu.debug()
    }

    pub fn smp(self) -> SmpDebug<'a> {
        self.0.machine.board.smp.debug()
    }

    pub fn ppu(self) -> PpuDebug<'a> {
        self.0.machine.board.ppu.debug()
    }

    pub fn scheduler(self) -> &'a Scheduler {
        &self.0.machine.scheduler
    }

    pub fn board(self) -> &'a Board {
        &self.0.machine.board
    }

    /// Frame events handled since power-on.
    pub fn frame(self) -> u64 {
        self.0.machine.frame
    }

    /// Bytes of work RAM.
    pub fn wram(self) -> &'a [u8] {
        self.0.machine.board.bus.wram.as_slice()
    }
}
