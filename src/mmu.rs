use crate::{
    apu::Apu,
    cartridge::Cartridge,
    input::Input,
    ppu::Ppu,
    savestate::{StateError, StateReader},
    timer::Timer,
};

const WRAM_SIZE: usize = 0x2000;
const HRAM_SIZE: usize = 0x7F;
const OAM_SIZE: u16 = 0xA0;

/// Memory map and I/O fan-out.
///
/// Owns every addressable component. `tick` is the hook the CPU calls once
/// per memory access to advance the timer, the PPU and the cartridge RTC by
/// the access's 4 T-cycles; the APU only banks the cycles and catches up at
/// frame boundary.
pub struct Mmu {
    pub wram: [u8; WRAM_SIZE],
    pub hram: [u8; HRAM_SIZE],
    pub cart: Option<Cartridge>,
    pub if_reg: u8,
    pub ie_reg: u8,
    pub ppu: Ppu,
    pub apu: Apu,
    pub timer: Timer,
    pub input: Input,
    /// T-cycles delivered through `tick` since power-on.
    pub clock: u64,
    // Link cable is stubbed: SB/SC are plain bytes, no transfer, no IRQ.
    serial_data: u8,
    serial_ctrl: u8,
}

impl Mmu {
    pub fn new() -> Self {
        Self {
            wram: [0; WRAM_SIZE],
            hram: [0; HRAM_SIZE],
            cart: None,
            // Post-boot: the boot ROM leaves the VBlank flag set.
            if_reg: 0x01,
            ie_reg: 0,
            ppu: Ppu::new(),
            apu: Apu::new(),
            timer: Timer::new(),
            input: Input::new(),
            clock: 0,
            serial_data: 0,
            serial_ctrl: 0x7E,
        }
    }

    pub fn load_cart(&mut self, cart: Cartridge) {
        self.cart = Some(cart);
    }

    pub fn save_cart_ram(&mut self) {
        if let Some(cart) = &self.cart
            && let Err(e) = cart.save_ram()
        {
            core_warn!(target: "mmu", "failed to save cartridge ram: {e}");
        }
    }

    /// Advance every clocked component by `t_cycles` T-cycles. Called from
    /// the CPU before each memory access becomes visible.
    pub fn tick(&mut self, t_cycles: u16) {
        self.clock = self.clock.wrapping_add(t_cycles as u64);
        self.timer.step(t_cycles, &mut self.if_reg);
        self.ppu.step(t_cycles, &mut self.if_reg);
        self.apu.add_cycles(t_cycles);
        if let Some(cart) = self.cart.as_mut() {
            cart.step_rtc(t_cycles);
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                self.cart.as_ref().map(|c| c.read(addr)).unwrap_or(0xFF)
            }
            0x8000..=0x9FFF => self.ppu.vram[(addr - 0x8000) as usize],
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize],
            // Echo of 0xC000-0xDDFF.
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize],
            0xFE00..=0xFE9F => self.ppu.oam[(addr - 0xFE00) as usize],
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00 => self.input.read(),
            0xFF01 => self.serial_data,
            0xFF02 => self.serial_ctrl,
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F => self.if_reg,
            0xFF10..=0xFF3F => self.apu.read_reg(addr),
            0xFF40..=0xFF4B => self.ppu.read_reg(addr),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.ie_reg,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                if let Some(cart) = self.cart.as_mut() {
                    cart.write(addr, val);
                }
            }
            0x8000..=0x9FFF => self.ppu.vram[(addr - 0x8000) as usize] = val,
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize] = val,
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize] = val,
            0xFE00..=0xFE9F => self.ppu.oam[(addr - 0xFE00) as usize] = val,
            0xFEA0..=0xFEFF => {}
            0xFF00 => self.input.write(val),
            0xFF01 => self.serial_data = val,
            0xFF02 => self.serial_ctrl = val,
            0xFF04..=0xFF07 => self.timer.write(addr, val),
            0xFF0F => self.if_reg = val & 0x1F,
            0xFF10..=0xFF3F => self.apu.write_reg(addr, val),
            0xFF46 => self.oam_dma(val),
            0xFF40..=0xFF4B => self.ppu.write_reg(addr, val, &mut self.if_reg),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.ie_reg = val & 0x1F,
            _ => {}
        }
    }

    /// OAM DMA: one atomic 160-byte copy from `val << 8`. The CPU pays only
    /// the FF46 write's 4 T-cycles; software holds itself off OAM with the
    /// usual HRAM wait loop.
    fn oam_dma(&mut self, val: u8) {
        self.ppu.dma = val;
        let src = (val as u16) << 8;
        for i in 0..OAM_SIZE {
            let byte = self.read(src.wrapping_add(i));
            self.ppu.oam[i as usize] = byte;
        }
    }

    pub(crate) fn write_state(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.wram);
        out.extend_from_slice(&self.hram);
        out.push(self.if_reg);
        out.push(self.ie_reg);
        out.push(self.serial_data);
        out.push(self.serial_ctrl);
        out.extend_from_slice(&self.clock.to_le_bytes());
        self.timer.write_state(out);
        self.input.write_state(out);
        self.ppu.write_state(out);
        self.apu.write_state(out);
        out.push(self.cart.is_some() as u8);
        if let Some(cart) = &self.cart {
            cart.write_state(out);
        }
    }

    pub(crate) fn read_state(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        r.read_into(&mut self.wram)?;
        r.read_into(&mut self.hram)?;
        self.if_reg = r.read_u8()? & 0x1F;
        self.ie_reg = r.read_u8()? & 0x1F;
        self.serial_data = r.read_u8()?;
        self.serial_ctrl = r.read_u8()?;
        self.clock = r.read_u64()?;
        self.timer.read_state(r)?;
        self.input.read_state(r)?;
        self.ppu.read_state(r)?;
        self.apu.read_state(r)?;
        let has_cart = r.read_bool()?;
        if has_cart != self.cart.is_some() {
            return Err(StateError::CartridgeMismatch);
        }
        if let Some(cart) = self.cart.as_mut() {
            cart.read_state(r)?;
        }
        Ok(())
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new()
    }
}
