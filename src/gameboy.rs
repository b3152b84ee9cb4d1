use std::path::Path;

use thiserror::Error;

use crate::{
    audio::AudioSink,
    cartridge::Cartridge,
    cpu::{Cpu, IllegalOpcode},
    input::Button,
    mmu::Mmu,
    ppu::FRAME_PIXELS,
    savestate::{self, StateError},
};

/// T-cycles in one LCD frame (154 lines of 456 dots).
pub const CYCLES_PER_FRAME: u32 = 70224;

/// Safety bound for one `run_frame` call. Software can disable the LCD and
/// spin forever; past this, the frame is abandoned instead of livelocking.
const FRAME_CYCLE_LIMIT: u32 = CYCLES_PER_FRAME * 2;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error(transparent)]
    Cpu(#[from] IllegalOpcode),
    /// Advisory: the LCD stayed off (or never reached VBlank) for the whole
    /// budget. Machine state is intact; calling again keeps emulating.
    #[error("lcd off: no frame produced within {0} t-cycles")]
    NoFrame(u32),
}

/// The whole machine.
///
/// The CPU's fetch/execute loop is the only scheduler: each of its memory
/// accesses ticks the other components through the MMU. `run_frame` drives
/// that loop until the PPU signals VBlank, then lets the APU emit the frame's
/// audio.
pub struct GameBoy {
    pub cpu: Cpu,
    pub mmu: Mmu,
}

impl GameBoy {
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            mmu: Mmu::new(),
        }
    }

    /// Load a cartridge image. `path` (the ROM's file path, if it has one)
    /// locates the sibling `.sav` file for battery-backed cartridges.
    pub fn load_rom(&mut self, data: Vec<u8>, path: Option<&Path>) {
        self.mmu.load_cart(Cartridge::load(data, path));
    }

    /// Reset to the post-boot state, keeping the loaded cartridge.
    pub fn reset(&mut self) {
        let cart = self.mmu.cart.take();
        let sample_rate = self.mmu.apu.sample_rate();
        self.cpu = Cpu::new();
        self.mmu = Mmu::new();
        self.mmu.apu.set_sample_rate(sample_rate);
        if let Some(c) = cart {
            self.mmu.load_cart(c);
        }
    }

    /// Run until the PPU completes a frame, then return the 160x144
    /// framebuffer of 2-bit shade indices.
    pub fn run_frame(&mut self) -> Result<&[u8; FRAME_PIXELS], FrameError> {
        self.mmu.ppu.clear_frame_ready();
        let mut cycles = 0u32;
        while !self.mmu.ppu.frame_ready() {
            if cycles >= FRAME_CYCLE_LIMIT {
                // Keep audio state moving even when no frame came out.
                self.mmu.apu.end_frame();
                return Err(FrameError::NoFrame(cycles));
            }
            cycles += self.cpu.step(&mut self.mmu)?;
        }
        self.mmu.apu.end_frame();
        Ok(self.mmu.ppu.framebuffer())
    }

    /// Execute a single CPU step; exposed for hosts that implement their own
    /// pacing or debugging.
    pub fn step(&mut self) -> Result<u32, IllegalOpcode> {
        self.cpu.step(&mut self.mmu)
    }

    pub fn press(&mut self, button: Button) {
        self.mmu.input.press(button, &mut self.mmu.if_reg);
    }

    pub fn release(&mut self, button: Button) {
        self.mmu.input.release(button);
    }

    /// Flush battery-backed save RAM.
    pub fn save(&mut self) {
        self.mmu.save_cart_ram();
    }

    /// Flush save RAM and shut down. The machine can still run afterwards;
    /// this only guarantees persistence happened.
    pub fn close(&mut self) {
        self.save();
    }

    /// Route the APU's output. Stereo f32 frames arrive once per
    /// [`GameBoy::run_frame`].
    pub fn set_audio_sink(&mut self, sink: Box<dyn AudioSink>) {
        self.mmu.apu.set_sink(sink);
    }

    pub fn set_sample_rate(&mut self, rate: u32) {
        self.mmu.apu.set_sample_rate(rate);
    }

    /// Snapshot the entire machine.
    pub fn save_state(&self) -> Vec<u8> {
        savestate::serialize(self)
    }

    /// Restore a snapshot taken with the same cartridge loaded. On error the
    /// machine may be partially restored and should be reset or re-restored.
    pub fn load_state(&mut self, data: &[u8]) -> Result<(), StateError> {
        savestate::deserialize(self, data)
    }
}

impl Default for GameBoy {
    fn default() -> Self {
        Self::new()
    }
}
