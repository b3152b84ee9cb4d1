use std::sync::{Arc, Mutex};

use dotmatrix_core::audio::AudioSink;
use dotmatrix_core::gameboy::GameBoy;

/// A 32 KiB no-MBC image, zero-filled (0x00 executes as NOP) with `code`
/// placed at the entry point 0x0100.
#[allow(dead_code)]
pub fn rom_with_code(code: &[u8]) -> Vec<u8> {
    let mut rom = vec![0u8; 0x8000];
    rom[0x0100..0x0100 + code.len()].copy_from_slice(code);
    rom
}

/// Minimal boot image: JP 0x0150 at the entry point, then a tight JR -2
/// loop.
#[allow(dead_code)]
pub fn blank_rom() -> Vec<u8> {
    let mut rom = rom_with_code(&[0xC3, 0x50, 0x01]);
    rom[0x0150..0x0152].copy_from_slice(&[0x18, 0xFE]);
    rom
}

#[allow(dead_code)]
pub fn gb_with_code(code: &[u8]) -> GameBoy {
    let mut gb = GameBoy::new();
    gb.load_rom(rom_with_code(code), None);
    gb
}

#[allow(dead_code)]
pub fn gb_blank() -> GameBoy {
    let mut gb = GameBoy::new();
    gb.load_rom(blank_rom(), None);
    gb
}

/// Sink that appends everything it receives to a shared buffer.
#[allow(dead_code)]
pub struct CaptureSink(pub Arc<Mutex<Vec<f32>>>);

impl AudioSink for CaptureSink {
    fn push_samples(&mut self, samples: &[f32]) {
        self.0.lock().unwrap().extend_from_slice(samples);
    }
}
