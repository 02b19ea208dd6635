//! Result and errors.
use std::fmt::{self, Display, Formatter};

pub type Chip8Result<T> = std::result::Result<T, Chip8Error>;

#[derive(Debug)]
pub enum Chip8Error {
    /// Attempt to load a program that can't fit in memory.
    CapacityExceeded { size: usize, capacity: usize },
    /// Subroutine call while every stack slot is in use.
    StackOverflow { pc: usize },
    /// Return from subroutine with an empty stack.
    StackUnderflow { pc: usize },
    /// Program counter is too close to the end of memory to fetch an instruction.
    PcOutOfBounds { pc: usize },
    /// Instruction tried to read or write past the end of memory.
    MemoryOutOfBounds { address: usize },
    /// Shared VM state was poisoned by a panicking thread.
    Poisoned,
    /// A runtime worker thread panicked.
    ThreadPanicked,
    /// Configuration could not be parsed.
    Config(String),
    Io(std::io::Error),
    Fmt(fmt::Error),
}

impl Display for Chip8Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceeded { size, capacity } => write!(
                f,
                "program too large for VM memory: {size} bytes, capacity is {capacity} bytes"
            ),
            Self::StackOverflow { pc } => write!(f, "call stack overflow at {pc:#05X}"),
            Self::StackUnderflow { pc } => write!(f, "call stack underflow at {pc:#05X}"),
            Self::PcOutOfBounds { pc } => {
                write!(f, "program counter out of bounds: {pc:#06X}")
            }
            Self::MemoryOutOfBounds { address } => {
                write!(f, "memory access out of bounds: {address:#06X}")
            }
            Self::Poisoned => write!(f, "VM state lock was poisoned"),
            Self::ThreadPanicked => write!(f, "runtime thread panicked"),
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Io(err) => write!(f, "{err}"),
            Self::Fmt(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Chip8Error {}

impl From<fmt::Error> for Chip8Error {
    fn from(err: fmt::Error) -> Self {
        Chip8Error::Fmt(err)
    }
}

impl From<std::io::Error> for Chip8Error {
    fn from(err: std::io::Error) -> Self {
        Chip8Error::Io(err)
    }
}

impl<T> From<std::sync::PoisonError<T>> for Chip8Error {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Chip8Error::Poisoned
    }
}

#[cfg(feature = "serde")]
impl From<serde_yaml::Error> for Chip8Error {
    fn from(err: serde_yaml::Error) -> Self {
        Chip8Error::Config(err.to_string())
    }
}
