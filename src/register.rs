//! Register cell types for the process image.
//!
//! Modbus defines four register classes. Bit cells (coils, discrete inputs)
//! carry one boolean; word cells (holding/input registers) carry two bytes
//! stored big-endian. Discrete inputs and input registers are read-only on
//! the wire; the server process itself updates them through the database.

use serde::{Deserialize, Serialize};

/// The four register classes of the Modbus data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegisterKind {
    Coil,
    DiscreteInput,
    HoldingRegister,
    InputRegister,
}

/// Single-bit read/write output cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Coil {
    pub value: bool,
}

/// Single-bit read-only input cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscreteInput {
    pub value: bool,
}

/// 16-bit read/write cell, stored as a big-endian byte pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HoldingRegister {
    pub hi: u8,
    pub lo: u8,
}

impl HoldingRegister {
    /// The cell value as a 16-bit word.
    pub fn as_u16(&self) -> u16 {
        u16::from_be_bytes([self.hi, self.lo])
    }

    /// Set the cell from a 16-bit word.
    pub fn set_u16(&mut self, value: u16) {
        let bytes = value.to_be_bytes();
        self.hi = bytes[0];
        self.lo = bytes[1];
    }
}

/// 16-bit read-only cell, stored as a big-endian byte pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputRegister {
    pub hi: u8,
    pub lo: u8,
}

impl InputRegister {
    /// The cell value as a 16-bit word.
    pub fn as_u16(&self) -> u16 {
        u16::from_be_bytes([self.hi, self.lo])
    }

    /// Set the cell from a 16-bit word.
    pub fn set_u16(&mut self, value: u16) {
        let bytes = value.to_be_bytes();
        self.hi = bytes[0];
        self.lo = bytes[1];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_cells_are_big_endian() {
        let mut reg = HoldingRegister::default();
        reg.set_u16(0x1234);
        assert_eq!(reg.hi, 0x12);
        assert_eq!(reg.lo, 0x34);
        assert_eq!(reg.as_u16(), 0x1234);
    }

    #[test]
    fn cells_default_to_zero() {
        assert!(!Coil::default().value);
        assert!(!DiscreteInput::default().value);
        assert_eq!(HoldingRegister::default().as_u16(), 0);
        assert_eq!(InputRegister::default().as_u16(), 0);
    }
}
