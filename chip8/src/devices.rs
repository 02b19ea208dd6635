//! IO device interface
use crate::{bytecode::Opcode, constants::*};

/// Output device that presents the display buffer.
///
/// Cell `i` of the buffer is the pixel at `(i % 64, i / 64)`,
/// holding either 0 or 1.
pub trait Display {
    /// Blit the display buffer to screen output.
    fn draw(&mut self, display: &Framebuffer);

    /// Polled between instructions. Returning `true` stops the machine.
    fn is_closing(&self) -> bool {
        false
    }
}

/// Operator console that follows execution.
pub trait Debugger {
    /// Called once after every executed cycle.
    fn update(&mut self, snapshot: &Snapshot);
}

/// Read-only copy of the machine registers, taken after a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub opcode: Opcode,
    pub mnemonic: String,
    pub address: Address,
    pub pc: usize,
    pub ticks: u64,
    pub sp: usize,
    pub stack: [Address; STACK_SIZE],
    pub registers: [u8; REGISTER_COUNT],
    pub delay_timer: u8,
    pub sound_timer: u8,
    pub key_wait: bool,
}

impl std::fmt::Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(
            f,
            "tick {:<8} pc {:04X}  op {}  {}",
            self.ticks, self.pc, self.opcode, self.mnemonic
        )?;
        writeln!(
            f,
            "I {:04X}  DT {:02X}  ST {:02X}  SP {:X}",
            self.address, self.delay_timer, self.sound_timer, self.sp
        )?;
        for (i, v) in self.registers.iter().enumerate() {
            write!(f, "V{i:X}={v:02X} ")?;
        }
        writeln!(f)?;
        write!(f, "stack:")?;
        for addr in &self.stack[..self.sp] {
            write!(f, " {addr:04X}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8"))]
#[repr(u8)]
pub enum KeyCode {
    Key0 = 0,
    Key1,
    Key2,
    Key3,
    Key4,
    Key5,
    Key6,
    Key7,
    Key8,
    Key9,
    KeyA,
    KeyB,
    KeyC,
    KeyD,
    KeyE,
    KeyF = 0xF,
}

impl KeyCode {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl std::fmt::Display for KeyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let key_id = self.as_u8();
        write!(f, "k{key_id:x}")
    }
}

impl From<KeyCode> for u8 {
    fn from(keycode: KeyCode) -> Self {
        keycode.as_u8()
    }
}

impl TryFrom<u8> for KeyCode {
    type Error = InvalidKeyCode;

    fn try_from(key_id: u8) -> Result<Self, Self::Error> {
        match key_id {
            0 => Ok(Self::Key0),
            1 => Ok(Self::Key1),
            2 => Ok(Self::Key2),
            3 => Ok(Self::Key3),
            4 => Ok(Self::Key4),
            5 => Ok(Self::Key5),
            6 => Ok(Self::Key6),
            7 => Ok(Self::Key7),
            8 => Ok(Self::Key8),
            9 => Ok(Self::Key9),
            10 => Ok(Self::KeyA),
            11 => Ok(Self::KeyB),
            12 => Ok(Self::KeyC),
            13 => Ok(Self::KeyD),
            14 => Ok(Self::KeyE),
            15 => Ok(Self::KeyF),
            _ => Err(InvalidKeyCode),
        }
    }
}

#[derive(Debug)]
pub struct InvalidKeyCode;

impl std::error::Error for InvalidKeyCode {}

impl std::fmt::Display for InvalidKeyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "keycode must be in range 0 <= keycode < 16")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_keycode_conversion() {
        for k in 0..KEY_COUNT {
            let keycode = KeyCode::try_from(k).unwrap();
            assert_eq!(u8::from(keycode), k);
        }
        assert!(KeyCode::try_from(KEY_COUNT).is_err());
        assert_eq!(KeyCode::KeyA.to_string(), "ka");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_keycode_deserialize() {
        let keys: Vec<KeyCode> = serde_yaml::from_str("[0, 10, 15]").unwrap();
        assert_eq!(keys, vec![KeyCode::Key0, KeyCode::KeyA, KeyCode::KeyF]);

        let err = serde_yaml::from_str::<KeyCode>("16");
        assert!(err.is_err());
    }
}
