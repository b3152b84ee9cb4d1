use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::savestate::{StateError, StateReader};

const ROM_BANK_SIZE: usize = 0x4000;
const RAM_BANK_SIZE: usize = 0x2000;

/// Guest clock rate; the RTC counts emulated seconds against it.
const RTC_CYCLES_PER_SECOND: u32 = 4_194_304;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcType {
    NoMbc,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
}

#[derive(Debug)]
enum MbcState {
    NoMbc,
    Mbc1 {
        rom_bank: u8,
        ram_bank: u8,
        mode: u8,
        ram_enable: bool,
    },
    Mbc2 {
        rom_bank: u8,
        ram_enable: bool,
    },
    Mbc3 {
        rom_bank: u8,
        ram_bank: u8,
        ram_enable: bool,
        rtc: Option<Rtc>,
        latch_pending: bool,
    },
    Mbc5 {
        rom_bank: u16,
        ram_bank: u8,
        ram_enable: bool,
    },
}

#[derive(Debug, Clone, Copy, Default)]
struct RtcRegisters {
    seconds: u8,
    minutes: u8,
    hours: u8,
    days: u16,
    halt: bool,
    carry: bool,
}

impl RtcRegisters {
    fn control_byte(&self) -> u8 {
        let mut out = ((self.days >> 8) as u8) & 0x01;
        if self.halt {
            out |= 0x40;
        }
        if self.carry {
            out |= 0x80;
        }
        out
    }
}

/// MBC3 real-time clock, advanced by emulated cycles only so snapshots stay
/// deterministic.
#[derive(Debug, Clone, Default)]
struct Rtc {
    regs: RtcRegisters,
    latched: RtcRegisters,
    subsecond_cycles: u32,
}

impl Rtc {
    fn latch(&mut self) {
        self.latched = self.regs;
    }

    fn read_latched(&self, reg: u8) -> u8 {
        match reg {
            0x08 => self.latched.seconds & 0x3F,
            0x09 => self.latched.minutes & 0x3F,
            0x0A => self.latched.hours & 0x1F,
            0x0B => (self.latched.days & 0x00FF) as u8,
            0x0C => self.latched.control_byte(),
            _ => 0xFF,
        }
    }

    fn write_register(&mut self, reg: u8, value: u8) {
        match reg {
            0x08 => {
                self.regs.seconds = value & 0x3F;
                self.subsecond_cycles = 0;
            }
            0x09 => self.regs.minutes = value & 0x3F,
            0x0A => self.regs.hours = value & 0x1F,
            0x0B => self.regs.days = (self.regs.days & 0x0100) | value as u16,
            0x0C => {
                self.regs.days = (self.regs.days & 0x00FF) | (((value & 0x01) as u16) << 8);
                self.regs.halt = value & 0x40 != 0;
                self.regs.carry = value & 0x80 != 0;
            }
            _ => {}
        }
    }

    fn step(&mut self, cycles: u32) {
        if self.regs.halt {
            return;
        }
        self.subsecond_cycles += cycles;
        while self.subsecond_cycles >= RTC_CYCLES_PER_SECOND {
            self.subsecond_cycles -= RTC_CYCLES_PER_SECOND;
            self.tick_second();
        }
    }

    fn tick_second(&mut self) {
        self.regs.seconds = (self.regs.seconds + 1) & 0x3F;
        if self.regs.seconds != 60 {
            return;
        }
        self.regs.seconds = 0;
        self.regs.minutes = (self.regs.minutes + 1) & 0x3F;
        if self.regs.minutes != 60 {
            return;
        }
        self.regs.minutes = 0;
        self.regs.hours = (self.regs.hours + 1) & 0x1F;
        if self.regs.hours != 24 {
            return;
        }
        self.regs.hours = 0;
        if self.regs.days == 0x01FF {
            self.regs.days = 0;
            self.regs.carry = true;
        } else {
            self.regs.days += 1;
        }
    }
}

/// A loaded cartridge: the ROM image, the banked save RAM, and the mapper
/// state selected from header byte 0x147.
#[derive(Debug)]
pub struct Cartridge {
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
    pub mbc: MbcType,
    pub title: String,
    cart_type: u8,
    save_path: Option<PathBuf>,
    mbc_state: MbcState,
}

impl Cartridge {
    /// Load a cartridge image. With a `path`, battery-backed save RAM is
    /// hydrated from the sibling `.sav` file and flushed back on
    /// [`Cartridge::save_ram`].
    pub fn load(data: Vec<u8>, path: Option<&Path>) -> Self {
        let header = Header::parse(&data);
        let cart_type = header.cart_type();
        let mbc = header.mbc_type();
        let title = header.title();
        let ram_size = header.ram_size();
        let rom_size = header.rom_size(data.len());

        let mbc_state = match mbc {
            MbcType::NoMbc => MbcState::NoMbc,
            MbcType::Mbc1 => MbcState::Mbc1 {
                rom_bank: 1,
                ram_bank: 0,
                mode: 0,
                ram_enable: false,
            },
            MbcType::Mbc2 => MbcState::Mbc2 {
                rom_bank: 1,
                ram_enable: false,
            },
            MbcType::Mbc3 => MbcState::Mbc3 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
                rtc: header.has_rtc().then(Rtc::default),
                latch_pending: false,
            },
            MbcType::Mbc5 => MbcState::Mbc5 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
            },
        };

        let mut cart = Self {
            rom: data,
            ram: vec![0; ram_size],
            mbc,
            title,
            cart_type,
            save_path: None,
            mbc_state,
        };

        if cart.has_battery()
            && let Some(path) = path
        {
            let mut save = PathBuf::from(path);
            save.set_extension("sav");
            cart.hydrate_save_ram(&save);
            cart.save_path = Some(save);
        }

        core_info!(
            target: "cartridge",
            "loaded \"{}\" ({:?}, rom {} KiB, ram {} KiB)",
            cart.title,
            cart.mbc,
            rom_size / 1024,
            cart.ram.len() / 1024
        );

        cart
    }

    fn hydrate_save_ram(&mut self, save: &Path) {
        match fs::read(save) {
            Ok(bytes) if bytes.len() <= self.ram.len() => {
                self.ram[..bytes.len()].copy_from_slice(&bytes);
            }
            Ok(bytes) => {
                core_warn!(
                    target: "cartridge",
                    "{}: {} bytes exceeds cartridge ram size {}, ignoring",
                    save.display(),
                    bytes.len(),
                    self.ram.len()
                );
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                core_warn!(
                    target: "cartridge",
                    "failed to read {}: {e}, starting with blank save ram",
                    save.display()
                );
            }
        }
    }

    pub fn has_battery(&self) -> bool {
        matches!(
            self.cart_type,
            0x03 | 0x06 | 0x09 | 0x0F | 0x10 | 0x13 | 0x1B | 0x1E
        )
    }

    /// Flush battery-backed save RAM to disk.
    pub fn save_ram(&self) -> io::Result<()> {
        if let (true, Some(path)) = (self.has_battery(), &self.save_path)
            && !self.ram.is_empty()
        {
            fs::write(path, &self.ram)?;
        }
        Ok(())
    }

    /// Advance the RTC (if any) by emulated T-cycles.
    pub fn step_rtc(&mut self, cycles: u16) {
        if let MbcState::Mbc3 { rtc: Some(rtc), .. } = &mut self.mbc_state {
            rtc.step(cycles as u32);
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        let rom_bank_count = (self.rom.len() / ROM_BANK_SIZE).max(1);
        match (&self.mbc_state, addr) {
            (MbcState::NoMbc, 0x0000..=0x7FFF) => {
                self.rom.get(addr as usize).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc1 { ram_bank, mode, .. }, 0x0000..=0x3FFF) => {
                // In banking mode 1 the fixed region follows the upper bank
                // bits in 512 KiB steps.
                let bank = if *mode == 0 {
                    0
                } else {
                    (((*ram_bank as usize) & 0x03) << 5) % rom_bank_count
                };
                let offset = bank * ROM_BANK_SIZE + addr as usize;
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (
                MbcState::Mbc1 {
                    rom_bank, ram_bank, ..
                },
                0x4000..=0x7FFF,
            ) => {
                let mut bank = (((*ram_bank as usize) & 0x03) << 5) | (*rom_bank as usize & 0x1F);
                if bank & 0x1F == 0 {
                    bank += 1;
                }
                bank %= rom_bank_count;
                let offset = bank * ROM_BANK_SIZE + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc2 { .. }, 0x0000..=0x3FFF)
            | (MbcState::Mbc3 { .. }, 0x0000..=0x3FFF)
            | (MbcState::Mbc5 { .. }, 0x0000..=0x3FFF) => {
                self.rom.get(addr as usize).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc2 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                let mut bank = (*rom_bank & 0x0F) as usize;
                if bank == 0 {
                    bank = 1;
                }
                let offset = (bank % rom_bank_count) * ROM_BANK_SIZE + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc3 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                let bank = if *rom_bank == 0 { 1 } else { *rom_bank } as usize;
                let offset = bank * ROM_BANK_SIZE + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                // MBC5 is the one mapper where bank 0 really maps bank 0.
                let offset = (*rom_bank as usize) * ROM_BANK_SIZE + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (MbcState::NoMbc, 0xA000..=0xBFFF) => {
                self.ram.get(addr as usize - 0xA000).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc1 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if !*ram_enable {
                    0xFF
                } else {
                    self.ram.get(self.ram_index(addr)).copied().unwrap_or(0xFF)
                }
            }
            (MbcState::Mbc2 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if !*ram_enable {
                    0xFF
                } else {
                    // 512 half-bytes mirrored across the window; the upper
                    // nibble is open bus and reads high.
                    let idx = (addr as usize - 0xA000) & 0x01FF;
                    0xF0 | (self.ram.get(idx).copied().unwrap_or(0x0F) & 0x0F)
                }
            }
            (
                MbcState::Mbc3 {
                    ram_enable,
                    ram_bank,
                    rtc,
                    ..
                },
                0xA000..=0xBFFF,
            ) => {
                if !*ram_enable {
                    0xFF
                } else {
                    match *ram_bank {
                        0x00..=0x03 => self
                            .ram
                            .get((*ram_bank as usize) * RAM_BANK_SIZE + addr as usize - 0xA000)
                            .copied()
                            .unwrap_or(0xFF),
                        0x08..=0x0C => rtc
                            .as_ref()
                            .map(|r| r.read_latched(*ram_bank))
                            .unwrap_or(0xFF),
                        _ => 0xFF,
                    }
                }
            }
            (MbcState::Mbc5 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if !*ram_enable {
                    0xFF
                } else {
                    self.ram.get(self.ram_index(addr)).copied().unwrap_or(0xFF)
                }
            }
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match (&mut self.mbc_state, addr) {
            (MbcState::NoMbc, 0xA000..=0xBFFF) => {
                let idx = addr as usize - 0xA000;
                if let Some(b) = self.ram.get_mut(idx) {
                    *b = val;
                }
            }
            (MbcState::Mbc1 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc1 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = val & 0x1F;
                if *rom_bank == 0 {
                    *rom_bank = 1;
                }
            }
            (MbcState::Mbc1 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val & 0x03;
            }
            (MbcState::Mbc1 { mode, .. }, 0x6000..=0x7FFF) => {
                *mode = val & 0x01;
            }
            (MbcState::Mbc1 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if *ram_enable {
                    let idx = self.ram_index(addr);
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val;
                    }
                }
            }
            (
                MbcState::Mbc2 {
                    rom_bank,
                    ram_enable,
                },
                0x0000..=0x3FFF,
            ) => {
                // Address bit 8 distinguishes the two MBC2 control registers.
                if addr & 0x0100 == 0 {
                    *ram_enable = val & 0x0F == 0x0A;
                } else {
                    *rom_bank = val & 0x0F;
                    if *rom_bank == 0 {
                        *rom_bank = 1;
                    }
                }
            }
            (MbcState::Mbc2 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if *ram_enable {
                    let idx = (addr as usize - 0xA000) & 0x01FF;
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val & 0x0F;
                    }
                }
            }
            (MbcState::Mbc3 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc3 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = val & 0x7F;
                if *rom_bank == 0 {
                    *rom_bank = 1;
                }
            }
            (MbcState::Mbc3 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val;
            }
            (
                MbcState::Mbc3 {
                    latch_pending, rtc, ..
                },
                0x6000..=0x7FFF,
            ) => {
                // Writing 0x00 then 0x01 freezes the counters into the
                // latched copy that register reads return.
                if val == 0 {
                    *latch_pending = true;
                } else {
                    if val == 1
                        && *latch_pending
                        && let Some(rtc) = rtc
                    {
                        rtc.latch();
                    }
                    *latch_pending = false;
                }
            }
            (
                MbcState::Mbc3 {
                    ram_enable,
                    ram_bank,
                    rtc,
                    ..
                },
                0xA000..=0xBFFF,
            ) => {
                if *ram_enable {
                    match *ram_bank {
                        0x00..=0x03 => {
                            let idx = (*ram_bank as usize) * RAM_BANK_SIZE + addr as usize - 0xA000;
                            if let Some(b) = self.ram.get_mut(idx) {
                                *b = val;
                            }
                        }
                        0x08..=0x0C => {
                            if let Some(rtc) = rtc.as_mut() {
                                rtc.write_register(*ram_bank, val);
                            }
                        }
                        _ => {}
                    }
                }
            }
            (MbcState::Mbc5 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x2000..=0x2FFF) => {
                *rom_bank = (*rom_bank & 0x100) | val as u16;
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x3000..=0x3FFF) => {
                *rom_bank = (*rom_bank & 0xFF) | (((val & 0x01) as u16) << 8);
            }
            (MbcState::Mbc5 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val & 0x0F;
            }
            (MbcState::Mbc5 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if *ram_enable {
                    let idx = self.ram_index(addr);
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val;
                    }
                }
            }
            _ => {}
        }
    }

    fn ram_index(&self, addr: u16) -> usize {
        let ram_bank_count = self.ram.len().div_ceil(RAM_BANK_SIZE);
        match &self.mbc_state {
            MbcState::NoMbc => addr as usize - 0xA000,
            MbcState::Mbc2 { .. } => (addr as usize - 0xA000) & 0x01FF,
            MbcState::Mbc1 { ram_bank, mode, .. } => {
                // Mode 0 pins RAM to bank 0 regardless of the bank register.
                if *mode == 0 || ram_bank_count == 0 {
                    addr as usize - 0xA000
                } else {
                    ((*ram_bank as usize) % ram_bank_count) * RAM_BANK_SIZE + addr as usize - 0xA000
                }
            }
            MbcState::Mbc3 { ram_bank, .. } => {
                ((*ram_bank as usize) & 0x03) * RAM_BANK_SIZE + addr as usize - 0xA000
            }
            MbcState::Mbc5 { ram_bank, .. } => {
                (*ram_bank as usize) * RAM_BANK_SIZE + addr as usize - 0xA000
            }
        }
    }

    pub(crate) fn write_state(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.rom.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.ram.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.ram);
        match &self.mbc_state {
            MbcState::NoMbc => out.push(0),
            MbcState::Mbc1 {
                rom_bank,
                ram_bank,
                mode,
                ram_enable,
            } => {
                out.push(1);
                out.push(*rom_bank);
                out.push(*ram_bank);
                out.push(*mode);
                out.push(*ram_enable as u8);
            }
            MbcState::Mbc2 {
                rom_bank,
                ram_enable,
            } => {
                out.push(2);
                out.push(*rom_bank);
                out.push(*ram_enable as u8);
            }
            MbcState::Mbc3 {
                rom_bank,
                ram_bank,
                ram_enable,
                rtc,
                latch_pending,
            } => {
                out.push(3);
                out.push(*rom_bank);
                out.push(*ram_bank);
                out.push(*ram_enable as u8);
                out.push(*latch_pending as u8);
                out.push(rtc.is_some() as u8);
                if let Some(rtc) = rtc {
                    for regs in [&rtc.regs, &rtc.latched] {
                        out.push(regs.seconds);
                        out.push(regs.minutes);
                        out.push(regs.hours);
                        out.extend_from_slice(&regs.days.to_le_bytes());
                        out.push(regs.halt as u8);
                        out.push(regs.carry as u8);
                    }
                    out.extend_from_slice(&rtc.subsecond_cycles.to_le_bytes());
                }
            }
            MbcState::Mbc5 {
                rom_bank,
                ram_bank,
                ram_enable,
            } => {
                out.push(4);
                out.extend_from_slice(&rom_bank.to_le_bytes());
                out.push(*ram_bank);
                out.push(*ram_enable as u8);
            }
        }
    }

    pub(crate) fn read_state(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        if r.read_u32()? as usize != self.rom.len() || r.read_u32()? as usize != self.ram.len() {
            return Err(StateError::CartridgeMismatch);
        }
        r.read_into(&mut self.ram)?;
        let tag = r.read_u8()?;
        match (&mut self.mbc_state, tag) {
            (MbcState::NoMbc, 0) => {}
            (
                MbcState::Mbc1 {
                    rom_bank,
                    ram_bank,
                    mode,
                    ram_enable,
                },
                1,
            ) => {
                *rom_bank = r.read_u8()?;
                *ram_bank = r.read_u8()?;
                *mode = r.read_u8()?;
                *ram_enable = r.read_bool()?;
            }
            (
                MbcState::Mbc2 {
                    rom_bank,
                    ram_enable,
                },
                2,
            ) => {
                *rom_bank = r.read_u8()?;
                *ram_enable = r.read_bool()?;
            }
            (
                MbcState::Mbc3 {
                    rom_bank,
                    ram_bank,
                    ram_enable,
                    rtc,
                    latch_pending,
                },
                3,
            ) => {
                *rom_bank = r.read_u8()?;
                *ram_bank = r.read_u8()?;
                *ram_enable = r.read_bool()?;
                *latch_pending = r.read_bool()?;
                let has_rtc = r.read_bool()?;
                if has_rtc != rtc.is_some() {
                    return Err(StateError::CartridgeMismatch);
                }
                if let Some(rtc) = rtc {
                    for regs in [&mut rtc.regs, &mut rtc.latched] {
                        regs.seconds = r.read_u8()?;
                        regs.minutes = r.read_u8()?;
                        regs.hours = r.read_u8()?;
                        regs.days = r.read_u16()?;
                        regs.halt = r.read_bool()?;
                        regs.carry = r.read_bool()?;
                    }
                    rtc.subsecond_cycles = r.read_u32()?;
                }
            }
            (
                MbcState::Mbc5 {
                    rom_bank,
                    ram_bank,
                    ram_enable,
                },
                4,
            ) => {
                *rom_bank = r.read_u16()?;
                *ram_bank = r.read_u8()?;
                *ram_enable = r.read_bool()?;
            }
            _ => return Err(StateError::CartridgeMismatch),
        }
        Ok(())
    }
}

struct Header<'a> {
    data: &'a [u8],
}

impl<'a> Header<'a> {
    fn parse(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn title(&self) -> String {
        let start = 0x0134.min(self.data.len());
        let end = 0x0144.min(self.data.len());
        let mut slice = &self.data[start..end];
        if let Some(pos) = slice.iter().position(|&b| b == 0) {
            slice = &slice[..pos];
        }
        String::from_utf8_lossy(slice).trim().to_string()
    }

    fn cart_type(&self) -> u8 {
        self.data.get(0x0147).copied().unwrap_or(0)
    }

    fn mbc_type(&self) -> MbcType {
        match self.cart_type() {
            0x00 | 0x08 | 0x09 => MbcType::NoMbc,
            0x01..=0x03 => MbcType::Mbc1,
            0x05 | 0x06 => MbcType::Mbc2,
            0x0F..=0x13 => MbcType::Mbc3,
            0x19..=0x1E => MbcType::Mbc5,
            other => {
                core_warn!(
                    target: "cartridge",
                    "unsupported cartridge type {other:#04x}, treating as MBC1"
                );
                MbcType::Mbc1
            }
        }
    }

    fn has_rtc(&self) -> bool {
        matches!(self.cart_type(), 0x0F | 0x10 | 0x13)
    }

    fn rom_size(&self, actual_len: usize) -> usize {
        match self.data.get(0x0148).copied().unwrap_or(0) {
            code @ 0x00..=0x08 => (32 * 1024) << code,
            code => {
                core_warn!(
                    target: "cartridge",
                    "rom size code {code:#04x} out of range, using image length"
                );
                actual_len
            }
        }
    }

    fn ram_size(&self) -> usize {
        // MBC2 carries its 512 half-bytes on-chip regardless of the header.
        if matches!(self.cart_type(), 0x05 | 0x06) {
            return 0x200;
        }
        match self.data.get(0x0149).copied().unwrap_or(0) {
            0x00 => 0,
            0x01 => 0x800,
            0x02 => 0x2000,
            0x03 => 0x8000,
            0x04 => 0x20000,
            0x05 => 0x10000,
            code => {
                core_warn!(
                    target: "cartridge",
                    "ram size code {code:#04x} out of range, assuming no ram"
                );
                0
            }
        }
    }
}
