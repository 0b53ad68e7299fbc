//! Result and errors.
use std::fmt::{self, Display, Formatter};

use crate::constants::Address;

pub type Chip8Result<T> = std::result::Result<T, Chip8Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chip8Error {
    /// Attempt to load a bytecode program that can't fit in memory.
    LargeProgram { size: usize, capacity: usize },
    /// Opcode has no instruction mapped to it.
    Decode { opcode: u16, address: Address },
    /// Subroutine call while the call stack is full.
    StackOverflow { address: Address },
    /// Subroutine return while the call stack is empty.
    StackUnderflow { address: Address },
    /// Key index outside of the 16 key keypad.
    InvalidKey(u8),
}

impl Display for Chip8Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::LargeProgram { size, capacity } => write!(
                f,
                "program too large for VM memory: {size} bytes, capacity is {capacity} bytes"
            ),
            Self::Decode { opcode, address } => {
                write!(f, "unsupported opcode {opcode:04X} at 0x{address:04X}")
            }
            Self::StackOverflow { address } => {
                write!(f, "call stack overflow at 0x{address:04X}")
            }
            Self::StackUnderflow { address } => {
                write!(f, "call stack underflow at 0x{address:04X}")
            }
            Self::InvalidKey(key_id) => {
                write!(f, "keycode must be in range 0 <= keycode < 16, got {key_id}")
            }
        }
    }
}

impl std::error::Error for Chip8Error {}
