//! Whole-machine snapshots.
//!
//! A save state is a magic-tagged, versioned, little-endian dump of every
//! component's architectural and micro-architectural state. Restoring a
//! snapshot and running N identical-input frames reproduces the framebuffer
//! byte for byte. The ROM image itself is not embedded: restoring requires
//! the same cartridge to already be loaded, and a mismatch is reported rather
//! than papered over.

use thiserror::Error;

use crate::gameboy::GameBoy;

const MAGIC: &[u8; 4] = b"DMGS";
const VERSION: u8 = 1;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    #[error("not a save state")]
    BadMagic,
    #[error("unsupported save state version {0}")]
    UnsupportedVersion(u8),
    #[error("save state truncated")]
    UnexpectedEof,
    #[error("save state does not match the loaded cartridge")]
    CartridgeMismatch,
    #[error("malformed save state field")]
    Malformed,
}

/// Cursor over a snapshot buffer with bounds-checked field readers.
pub struct StateReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> StateReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], StateError> {
        let end = self.pos.checked_add(len).ok_or(StateError::UnexpectedEof)?;
        if end > self.data.len() {
            return Err(StateError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn read_into(&mut self, out: &mut [u8]) -> Result<(), StateError> {
        let src = self.read_bytes(out.len())?;
        out.copy_from_slice(src);
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, StateError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, StateError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, StateError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, StateError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64, StateError> {
        let b = self.read_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_f32(&mut self) -> Result<f32, StateError> {
        Ok(f32::from_bits(self.read_u32()?))
    }
}

/// Serialize the entire machine.
pub fn serialize(gb: &GameBoy) -> Vec<u8> {
    let mut out = Vec::with_capacity(0x12000);
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    gb.cpu.write_state(&mut out);
    gb.mmu.write_state(&mut out);
    out
}

/// Restore a previously serialized machine in place.
pub fn deserialize(gb: &mut GameBoy, data: &[u8]) -> Result<(), StateError> {
    let mut r = StateReader::new(data);
    if r.read_bytes(4)? != MAGIC {
        return Err(StateError::BadMagic);
    }
    let version = r.read_u8()?;
    if version != VERSION {
        return Err(StateError::UnsupportedVersion(version));
    }
    gb.cpu.read_state(&mut r)?;
    gb.mmu.read_state(&mut r)?;
    Ok(())
}

pub(crate) fn push_f32(out: &mut Vec<u8>, value: f32) {
    out.extend_from_slice(&value.to_bits().to_le_bytes());
}
