//! Disassembler.
use std::fmt::{self, Write as FmtWrite};

use crate::{bytecode::Opcode, constants::MEM_START};

/// Renders bytecode as an assembly listing.
pub struct Disassembler<'a> {
    bytecode: &'a [u8],
    /// Memory address of the first byte.
    origin: usize,
}

impl<'a> Disassembler<'a> {
    /// Disassemble a program as it would be laid out after loading.
    pub fn new(bytecode: &'a [u8]) -> Self {
        Self::with_origin(bytecode, MEM_START)
    }

    pub fn with_origin(bytecode: &'a [u8], origin: usize) -> Self {
        Self { bytecode, origin }
    }

    /// Instruction words paired with their memory address.
    ///
    /// A trailing odd byte is not part of any word and is skipped.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Opcode)> + 'a {
        let origin = self.origin;
        self.bytecode
            .chunks_exact(2)
            .enumerate()
            .map(move |(i, pair)| (origin + i * 2, Opcode::from_bytes(pair[0], pair[1])))
    }

    /// Write the whole listing, one instruction per line.
    pub fn disassemble<W: FmtWrite>(&self, w: &mut W) -> fmt::Result {
        for (address, opcode) in self.iter() {
            writeln!(w, "{address:04X}: {opcode}  {}", opcode.mnemonic())?;
        }

        if self.bytecode.len() % 2 == 1 {
            let address = self.origin + self.bytecode.len() - 1;
            let byte = self.bytecode[self.bytecode.len() - 1];
            writeln!(w, "{address:04X}: {byte:02X}    DB {byte:#04X}")?;
        }

        Ok(())
    }

    pub fn listing(&self) -> Result<String, fmt::Error> {
        let mut buf = String::new();
        self.disassemble(&mut buf)?;
        Ok(buf)
    }
}
