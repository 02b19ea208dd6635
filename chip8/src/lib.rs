mod bytecode;
mod clock;
mod conf;
pub mod constants;
mod cpu;
mod devices;
mod disasm;
mod error;
mod runtime;
mod vm;

pub use self::conf::Hz;

pub mod prelude {
    pub use super::{
        bytecode::Opcode,
        conf::{Chip8Conf, Hz, Quirks},
        constants::{Address, Framebuffer},
        cpu::{Chip8Cpu, CpuState},
        devices::{Debugger, Display, InvalidKeyCode, KeyCode, Snapshot},
        disasm::Disassembler,
        error::{Chip8Error, Chip8Result},
        runtime::{Controller, Runtime},
        vm::{Chip8Vm, Flow},
    };
}
