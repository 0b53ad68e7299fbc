//! Helpers for extracting data from opcodes.
use std::fmt;

use crate::constants::{Address, MEM_MASK};

/// Instruction decoded into its fixed bit fields.
///
/// Every instruction is two bytes, big-endian, with the opcode
/// group identified by the first 4-bit nibble. The remaining
/// fields overlap and are interpreted depending on the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    /// Full 16-bit instruction.
    pub code: u16,
    /// Instruction group, 0xF000
    pub op: u8,
    /// Register index X, 0x0F00
    pub vx: u8,
    /// Register index Y, 0x00F0
    pub vy: u8,
    /// Lowest nibble, 0x000F
    pub n: u8,
    /// Lowest byte, 0x00FF
    pub nn: u8,
    /// 12-bit address, 0x0FFF
    pub nnn: Address,
}

impl Opcode {
    #[inline(always)]
    pub fn decode([a, b]: [u8; 2]) -> Self {
        Self {
            code: u16::from_be_bytes([a, b]),
            op: a >> 4,
            vx: a & 0xF,
            vy: b >> 4,
            n: b & 0xF,
            nn: b,
            nnn: (((a as u16) & 0xF) << 8) | b as u16,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.code)
    }
}

/// Extract the instruction bytes at the cursor.
///
/// The cursor wraps around the end of memory.
#[inline(always)]
pub fn fetch(ram: &[u8], cursor: usize) -> [u8; 2] {
    [ram[cursor & MEM_MASK], ram[(cursor + 1) & MEM_MASK]]
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_decode_fields() {
        let op = Opcode::decode([0xD1, 0x2F]);
        assert_eq!(op.code, 0xD12F);
        assert_eq!(op.op, 0xD);
        assert_eq!(op.vx, 0x1);
        assert_eq!(op.vy, 0x2);
        assert_eq!(op.n, 0xF);
        assert_eq!(op.nn, 0x2F);
        assert_eq!(op.nnn, 0x12F);
    }

    #[test]
    fn test_fetch_wraps() {
        let mut ram = [0_u8; crate::constants::MEM_SIZE];
        ram[0xFFF] = 0x12;
        ram[0x000] = 0x34;
        assert_eq!(fetch(&ram, 0xFFF), [0x12, 0x34]);
    }
}
