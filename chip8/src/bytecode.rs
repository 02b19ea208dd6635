//! Helpers for extracting data from opcodes.
use std::fmt;

/// A single 16-bit instruction word, as fetched from memory.
///
/// ```text
/// 0xD125
///   ││││
///   │││└ n      0x000F
///   ││└─ y      0x00F0
///   │└── x      0x0F00
///   └─── op     0xF000
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Opcode(pub u16);

impl Opcode {
    /// Compose an instruction word from two bytes in memory order.
    ///
    /// Chip-8 words are big-endian, the high byte is stored first.
    #[inline(always)]
    pub fn from_bytes(hi: u8, lo: u8) -> Self {
        Self((hi as u16) << 8 | lo as u16)
    }

    #[inline(always)]
    pub fn word(self) -> u16 {
        self.0
    }

    /// Instruction family in the leading nibble.
    #[inline(always)]
    pub fn op(self) -> u8 {
        ((self.0 & 0xF000) >> 12) as u8
    }

    /// Register selector VX.
    #[inline(always)]
    pub fn x(self) -> u8 {
        ((self.0 & 0x0F00) >> 8) as u8
    }

    /// Register selector VY.
    #[inline(always)]
    pub fn y(self) -> u8 {
        ((self.0 & 0x00F0) >> 4) as u8
    }

    /// Trailing nibble, either a small immediate or a sub-operation.
    #[inline(always)]
    pub fn n(self) -> u8 {
        (self.0 & 0x000F) as u8
    }

    /// Immediate byte.
    #[inline(always)]
    pub fn nn(self) -> u8 {
        (self.0 & 0x00FF) as u8
    }

    /// 12-bit address.
    #[inline(always)]
    pub fn nnn(self) -> u16 {
        self.0 & 0x0FFF
    }

    /// Human readable assembly for this instruction.
    ///
    /// Words that don't encode a known instruction are rendered as data.
    pub fn mnemonic(self) -> String {
        let (x, y, n, nn, nnn) = (self.x(), self.y(), self.n(), self.nn(), self.nnn());

        match self.op() {
            0x0 => match self.0 {
                0x0000 => "NOP".to_string(),
                0x00E0 => "CLS".to_string(),
                0x00EE => "RET".to_string(),
                _ => format!("DW {:#06X}", self.0),
            },
            0x1 => format!("JP {nnn:#05X}"),
            0x2 => format!("CALL {nnn:#05X}"),
            0x3 => format!("SE V{x:X}, {nn:#04X}"),
            0x4 => format!("SNE V{x:X}, {nn:#04X}"),
            0x5 if n == 0 => format!("SE V{x:X}, V{y:X}"),
            0x6 => format!("LD V{x:X}, {nn:#04X}"),
            0x7 => format!("ADD V{x:X}, {nn:#04X}"),
            0x8 => match n {
                0x0 => format!("LD V{x:X}, V{y:X}"),
                0x1 => format!("OR V{x:X}, V{y:X}"),
                0x2 => format!("AND V{x:X}, V{y:X}"),
                0x3 => format!("XOR V{x:X}, V{y:X}"),
                0x4 => format!("ADD V{x:X}, V{y:X}"),
                0x5 => format!("SUB V{x:X}, V{y:X}"),
                0x6 => format!("SHR V{x:X}, V{y:X}"),
                0x7 => format!("SUBN V{x:X}, V{y:X}"),
                0xE => format!("SHL V{x:X}, V{y:X}"),
                _ => format!("DW {:#06X}", self.0),
            },
            0x9 if n == 0 => format!("SNE V{x:X}, V{y:X}"),
            0xA => format!("LD I, {nnn:#05X}"),
            0xB => format!("JP V0, {nnn:#05X}"),
            0xC => format!("RND V{x:X}, {nn:#04X}"),
            0xD => format!("DRW V{x:X}, V{y:X}, {n}"),
            0xE => match nn {
                0x9E => format!("SKP V{x:X}"),
                0xA1 => format!("SKNP V{x:X}"),
                _ => format!("DW {:#06X}", self.0),
            },
            0xF => match nn {
                0x07 => format!("LD V{x:X}, DT"),
                0x0A => format!("LD V{x:X}, K"),
                0x15 => format!("LD DT, V{x:X}"),
                0x18 => format!("LD ST, V{x:X}"),
                0x1E => format!("ADD I, V{x:X}"),
                0x29 => format!("LD F, V{x:X}"),
                0x33 => format!("LD B, V{x:X}"),
                0x55 => format!("LD [I], V{x:X}"),
                0x65 => format!("LD V{x:X}, [I]"),
                _ => format!("DW {:#06X}", self.0),
            },
            _ => format!("DW {:#06X}", self.0),
        }
    }
}

impl From<u16> for Opcode {
    fn from(word: u16) -> Self {
        Self(word)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fields() {
        let op = Opcode(0xD125);
        assert_eq!(op.op(), 0xD);
        assert_eq!(op.x(), 0x1);
        assert_eq!(op.y(), 0x2);
        assert_eq!(op.n(), 0x5);
        assert_eq!(op.nn(), 0x25);
        assert_eq!(op.nnn(), 0x125);
    }

    #[test]
    fn test_big_endian() {
        assert_eq!(Opcode::from_bytes(0xA2, 0xF0), Opcode(0xA2F0));
    }

    #[test]
    fn test_mnemonic() {
        assert_eq!(Opcode(0x00E0).mnemonic(), "CLS");
        assert_eq!(Opcode(0x124E).mnemonic(), "JP 0x24E");
        assert_eq!(Opcode(0x6801).mnemonic(), "LD V8, 0x01");
        assert_eq!(Opcode(0xD015).mnemonic(), "DRW V0, V1, 5");
        assert_eq!(Opcode(0xF365).mnemonic(), "LD V3, [I]");
        assert_eq!(Opcode(0x5121).mnemonic(), "DW 0x5121");
        assert_eq!(Opcode(0xFFFF).mnemonic(), "DW 0xFFFF");
    }
}
