use crate::savestate::{StateError, StateReader};

/// One of the eight physical buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Right,
    Left,
    Up,
    Down,
    A,
    B,
    Select,
    Start,
}

impl Button {
    /// Bit position in the internal held-button mask: direction keys occupy
    /// the low nibble, action keys the high nibble, matching the row layout
    /// of the P1 register.
    fn bit(self) -> u8 {
        match self {
            Button::Right => 0,
            Button::Left => 1,
            Button::Up => 2,
            Button::Down => 3,
            Button::A => 4,
            Button::B => 5,
            Button::Select => 6,
            Button::Start => 7,
        }
    }

    fn is_direction(self) -> bool {
        matches!(self, Button::Right | Button::Left | Button::Up | Button::Down)
    }
}

/// The joypad register at FF00.
///
/// Bits 5-4 select the matrix row (0 = selected); bits 3-0 read the selected
/// row with 0 = pressed. A button press on a currently selected row raises
/// the joypad interrupt (IF bit 4).
pub struct Input {
    select_action: bool,
    select_dpad: bool,
    held: u8,
}

impl Input {
    pub fn new() -> Self {
        Self {
            select_action: false,
            select_dpad: false,
            held: 0,
        }
    }

    pub fn write(&mut self, val: u8) {
        self.select_action = val & 0x20 == 0;
        self.select_dpad = val & 0x10 == 0;
    }

    pub fn read(&self) -> u8 {
        let mut value = 0xC0;
        if !self.select_action {
            value |= 0x20;
        }
        if !self.select_dpad {
            value |= 0x10;
        }

        let mut row = 0x0F;
        if self.select_dpad {
            row &= !(self.held & 0x0F);
        }
        if self.select_action {
            row &= !(self.held >> 4);
        }
        value | row
    }

    pub fn press(&mut self, button: Button, if_reg: &mut u8) {
        let bit = 1u8 << button.bit();
        let was_held = self.held & bit != 0;
        self.held |= bit;
        if !was_held && self.row_selected(button) {
            *if_reg |= 0x10;
        }
    }

    pub fn release(&mut self, button: Button) {
        self.held &= !(1u8 << button.bit());
    }

    fn row_selected(&self, button: Button) -> bool {
        if button.is_direction() {
            self.select_dpad
        } else {
            self.select_action
        }
    }

    pub(crate) fn write_state(&self, out: &mut Vec<u8>) {
        out.push(self.select_action as u8);
        out.push(self.select_dpad as u8);
        out.push(self.held);
    }

    pub(crate) fn read_state(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        self.select_action = r.read_bool()?;
        self.select_dpad = r.read_bool()?;
        self.held = r.read_u8()?;
        Ok(())
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::new()
    }
}
