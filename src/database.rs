//! In-memory Modbus process image.
//!
//! A [`Database`] owns four fixed-size register banks indexed by address and
//! answers every operation with fully formatted response bytes. Protocol
//! errors (bad address, bad count, bad value) are encoded in-band as 3-byte
//! exception frames; no operation ever fails toward its caller. Validation
//! always precedes mutation, so writes are all-or-nothing. Counts are bounded
//! by the protocol quantity ceilings, which keeps every read payload within
//! the one-byte byte-count field.

use tracing::debug;

use crate::constants::{
    ExceptionCode, DEFAULT_DATABASE_SIZE, DEFAULT_UNIT_ID, EXCEPTION_FLAG, EXC_READ_COILS,
    EXC_READ_DISCRETE_INPUTS, EXC_READ_HOLDING_REGISTERS, EXC_READ_INPUT_REGISTERS, FC_READ_COILS,
    FC_READ_DISCRETE_INPUTS, FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS,
    FC_WRITE_MULTIPLE_COILS, FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_COIL,
    FC_WRITE_SINGLE_REGISTER, MAX_READ_BITS, MAX_READ_REGISTERS, MAX_WRITE_COILS,
    MAX_WRITE_REGISTERS,
};
use crate::error::{ModbusError, ModbusResult};
use crate::register::{Coil, DiscreteInput, HoldingRegister, InputRegister};

/// Process image for one Modbus unit.
///
/// The four banks share one size fixed at construction; cells are mutated in
/// place and never reallocated.
#[derive(Debug, Clone)]
pub struct Database {
    unit_id: u8,
    coils: Vec<Coil>,
    discrete_inputs: Vec<DiscreteInput>,
    holding_registers: Vec<HoldingRegister>,
    input_registers: Vec<InputRegister>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new(DEFAULT_UNIT_ID, DEFAULT_DATABASE_SIZE)
    }
}

impl Database {
    /// Create a database with `size` zeroed cells in each bank.
    pub fn new(unit_id: u8, size: usize) -> Self {
        Self {
            unit_id,
            coils: vec![Coil::default(); size],
            discrete_inputs: vec![DiscreteInput::default(); size],
            holding_registers: vec![HoldingRegister::default(); size],
            input_registers: vec![InputRegister::default(); size],
        }
    }

    /// Unit identifier this database answers for.
    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    /// Number of cells in each register bank.
    pub fn len(&self) -> usize {
        self.coils.len()
    }

    /// True when the banks hold no cells at all.
    pub fn is_empty(&self) -> bool {
        self.coils.is_empty()
    }

    fn exception(&self, error_byte: u8, code: ExceptionCode) -> Vec<u8> {
        debug!(
            "unit {} exception: marker {:#04x}, code {:#04x}",
            self.unit_id,
            error_byte,
            code.as_u8()
        );
        vec![self.unit_id, error_byte, code.as_u8()]
    }

    // ========================================================================
    // Read operations
    // ========================================================================

    /// Read Coils (FC01): `{unit, 0x01, byte_count} ++ bits`, LSB-first.
    pub fn read_coils(&self, index: u16, count: u16) -> Vec<u8> {
        let index = usize::from(index);
        let count = usize::from(count);
        if index >= self.coils.len() {
            return self.exception(EXC_READ_COILS, ExceptionCode::IllegalDataAddress);
        }
        if count == 0 || count > usize::from(MAX_READ_BITS) || count > self.coils.len() - index {
            return self.exception(EXC_READ_COILS, ExceptionCode::IllegalDataValue);
        }

        let data = pack_bits(self.coils[index..index + count].iter().map(|c| c.value));
        read_response(self.unit_id, FC_READ_COILS, data)
    }

    /// Read Discrete Inputs (FC02).
    pub fn read_discrete_inputs(&self, index: u16, count: u16) -> Vec<u8> {
        let index = usize::from(index);
        let count = usize::from(count);
        if index >= self.discrete_inputs.len() {
            return self.exception(EXC_READ_DISCRETE_INPUTS, ExceptionCode::IllegalDataAddress);
        }
        if count == 0
            || count > usize::from(MAX_READ_BITS)
            || count > self.discrete_inputs.len() - index
        {
            return self.exception(EXC_READ_DISCRETE_INPUTS, ExceptionCode::IllegalDataValue);
        }

        let data = pack_bits(
            self.discrete_inputs[index..index + count]
                .iter()
                .map(|c| c.value),
        );
        read_response(self.unit_id, FC_READ_DISCRETE_INPUTS, data)
    }

    /// Read Holding Registers (FC03): `{unit, 0x03, byte_count} ++ words`,
    /// two big-endian bytes per register.
    pub fn read_holding_registers(&self, index: u16, count: u16) -> Vec<u8> {
        let index = usize::from(index);
        let count = usize::from(count);
        if index >= self.holding_registers.len() {
            return self.exception(EXC_READ_HOLDING_REGISTERS, ExceptionCode::IllegalDataAddress);
        }
        if count == 0
            || count > usize::from(MAX_READ_REGISTERS)
            || count > self.holding_registers.len() - index
        {
            return self.exception(EXC_READ_HOLDING_REGISTERS, ExceptionCode::IllegalDataValue);
        }

        let mut data = Vec::with_capacity(count * 2);
        for reg in &self.holding_registers[index..index + count] {
            data.push(reg.hi);
            data.push(reg.lo);
        }
        read_response(self.unit_id, FC_READ_HOLDING_REGISTERS, data)
    }

    /// Read Input Registers (FC04).
    pub fn read_input_registers(&self, index: u16, count: u16) -> Vec<u8> {
        let index = usize::from(index);
        let count = usize::from(count);
        if index >= self.input_registers.len() {
            return self.exception(EXC_READ_INPUT_REGISTERS, ExceptionCode::IllegalDataAddress);
        }
        if count == 0
            || count > usize::from(MAX_READ_REGISTERS)
            || count > self.input_registers.len() - index
        {
            return self.exception(EXC_READ_INPUT_REGISTERS, ExceptionCode::IllegalDataValue);
        }

        let mut data = Vec::with_capacity(count * 2);
        for reg in &self.input_registers[index..index + count] {
            data.push(reg.hi);
            data.push(reg.lo);
        }
        read_response(self.unit_id, FC_READ_INPUT_REGISTERS, data)
    }

    // ========================================================================
    // Write operations
    // ========================================================================

    /// Write Single Coil (FC05).
    ///
    /// The payload must be exactly two bytes: 0xFF00 for on, 0x0000 for off.
    /// Echoes `{unit, 0x05, addr, value}` on success.
    pub fn write_single_coil(&mut self, index: u16, data: &[u8]) -> Vec<u8> {
        if usize::from(index) >= self.coils.len() {
            return self.exception(
                EXCEPTION_FLAG | FC_WRITE_SINGLE_COIL,
                ExceptionCode::IllegalDataAddress,
            );
        }
        if data.len() != 2 || data[1] != 0x00 || (data[0] != 0x00 && data[0] != 0xFF) {
            return self.exception(
                EXCEPTION_FLAG | FC_WRITE_SINGLE_COIL,
                ExceptionCode::IllegalDataValue,
            );
        }

        self.coils[usize::from(index)].value = data[0] == 0xFF;

        let addr = index.to_be_bytes();
        vec![
            self.unit_id,
            FC_WRITE_SINGLE_COIL,
            addr[0],
            addr[1],
            data[0],
            data[1],
        ]
    }

    /// Write Single Register (FC06). Payload is the two value bytes.
    pub fn write_single_register(&mut self, index: u16, data: &[u8]) -> Vec<u8> {
        if usize::from(index) >= self.holding_registers.len() {
            return self.exception(
                EXCEPTION_FLAG | FC_WRITE_SINGLE_REGISTER,
                ExceptionCode::IllegalDataAddress,
            );
        }
        if data.len() != 2 {
            return self.exception(
                EXCEPTION_FLAG | FC_WRITE_SINGLE_REGISTER,
                ExceptionCode::IllegalDataValue,
            );
        }

        let reg = &mut self.holding_registers[usize::from(index)];
        reg.hi = data[0];
        reg.lo = data[1];

        let addr = index.to_be_bytes();
        vec![
            self.unit_id,
            FC_WRITE_SINGLE_REGISTER,
            addr[0],
            addr[1],
            data[0],
            data[1],
        ]
    }

    /// Write Multiple Coils (FC15) from a bit-packed payload, LSB-first.
    /// Echoes `{unit, 0x0F, addr, count}` on success.
    pub fn write_multiple_coils(&mut self, index: u16, count: u16, data: &[u8]) -> Vec<u8> {
        let start = usize::from(index);
        let count_usize = usize::from(count);
        if start >= self.coils.len() {
            return self.exception(
                EXCEPTION_FLAG | FC_WRITE_MULTIPLE_COILS,
                ExceptionCode::IllegalDataAddress,
            );
        }
        if count == 0
            || count > MAX_WRITE_COILS
            || count_usize > self.coils.len() - start
            || data.len() * 8 < count_usize
        {
            return self.exception(
                EXCEPTION_FLAG | FC_WRITE_MULTIPLE_COILS,
                ExceptionCode::IllegalDataValue,
            );
        }

        for i in 0..count_usize {
            self.coils[start + i].value = (data[i / 8] & (1 << (i % 8))) != 0;
        }

        echo_range(self.unit_id, FC_WRITE_MULTIPLE_COILS, index, count)
    }

    /// Write Multiple Registers (FC16): payload must hold exactly two bytes
    /// per register. Echoes `{unit, 0x10, addr, count}` on success.
    pub fn write_multiple_registers(&mut self, index: u16, count: u16, data: &[u8]) -> Vec<u8> {
        let start = usize::from(index);
        let count_usize = usize::from(count);
        if start >= self.holding_registers.len()
            || start + count_usize > self.holding_registers.len()
        {
            return self.exception(
                EXCEPTION_FLAG | FC_WRITE_MULTIPLE_REGISTERS,
                ExceptionCode::IllegalDataAddress,
            );
        }
        if data.is_empty()
            || count == 0
            || count > MAX_WRITE_REGISTERS
            || data.len() != count_usize * 2
        {
            return self.exception(
                EXCEPTION_FLAG | FC_WRITE_MULTIPLE_REGISTERS,
                ExceptionCode::IllegalDataValue,
            );
        }

        for i in 0..count_usize {
            let reg = &mut self.holding_registers[start + i];
            reg.hi = data[i * 2];
            reg.lo = data[i * 2 + 1];
        }

        echo_range(self.unit_id, FC_WRITE_MULTIPLE_REGISTERS, index, count)
    }

    // ========================================================================
    // Process-side accessors
    // ========================================================================
    //
    // Discrete inputs and input registers are read-only on the wire; the
    // hosting process seeds and updates them through these setters.

    /// Set a coil directly, bypassing the wire path.
    pub fn set_coil(&mut self, index: u16, value: bool) -> ModbusResult<()> {
        let cell = self
            .coils
            .get_mut(usize::from(index))
            .ok_or_else(|| out_of_range("coil", index))?;
        cell.value = value;
        Ok(())
    }

    /// Set a discrete input.
    pub fn set_discrete_input(&mut self, index: u16, value: bool) -> ModbusResult<()> {
        let cell = self
            .discrete_inputs
            .get_mut(usize::from(index))
            .ok_or_else(|| out_of_range("discrete input", index))?;
        cell.value = value;
        Ok(())
    }

    /// Set a holding register.
    pub fn set_holding_register(&mut self, index: u16, value: u16) -> ModbusResult<()> {
        let cell = self
            .holding_registers
            .get_mut(usize::from(index))
            .ok_or_else(|| out_of_range("holding register", index))?;
        cell.set_u16(value);
        Ok(())
    }

    /// Set an input register.
    pub fn set_input_register(&mut self, index: u16, value: u16) -> ModbusResult<()> {
        let cell = self
            .input_registers
            .get_mut(usize::from(index))
            .ok_or_else(|| out_of_range("input register", index))?;
        cell.set_u16(value);
        Ok(())
    }

    /// Current coil value, if the address is valid.
    pub fn coil(&self, index: u16) -> Option<bool> {
        self.coils.get(usize::from(index)).map(|c| c.value)
    }

    /// Current holding register value, if the address is valid.
    pub fn holding_register(&self, index: u16) -> Option<u16> {
        self.holding_registers
            .get(usize::from(index))
            .map(|r| r.as_u16())
    }
}

/// Pack booleans LSB-first, bit `i` landing in byte `i / 8`.
fn pack_bits(values: impl ExactSizeIterator<Item = bool>) -> Vec<u8> {
    let mut data = vec![0u8; values.len().div_ceil(8)];
    for (i, value) in values.enumerate() {
        if value {
            data[i / 8] |= 1 << (i % 8);
        }
    }
    data
}

fn read_response(unit_id: u8, function: u8, data: Vec<u8>) -> Vec<u8> {
    let mut response = Vec::with_capacity(3 + data.len());
    response.push(unit_id);
    response.push(function);
    response.push(data.len() as u8);
    response.extend_from_slice(&data);
    response
}

fn echo_range(unit_id: u8, function: u8, index: u16, count: u16) -> Vec<u8> {
    let addr = index.to_be_bytes();
    let cnt = count.to_be_bytes();
    vec![unit_id, function, addr[0], addr[1], cnt[0], cnt[1]]
}

fn out_of_range(bank: &str, index: u16) -> ModbusError {
    ModbusError::Protocol(format!("{bank} address {index} out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_coil_then_read_back() {
        let mut db = Database::new(1, 10);

        let echo = db.write_single_coil(3, &[0xFF, 0x00]);
        assert_eq!(echo, vec![1, 0x05, 0x00, 0x03, 0xFF, 0x00]);

        let response = db.read_coils(0, 8);
        assert_eq!(response, vec![1, 0x01, 0x01, 0b0000_1000]);
    }

    #[test]
    fn write_single_coil_is_idempotent() {
        let mut db = Database::new(1, 10);
        let first = db.write_single_coil(4, &[0xFF, 0x00]);
        let state_after_first = db.coil(4);
        let second = db.write_single_coil(4, &[0xFF, 0x00]);

        assert_eq!(first, second);
        assert_eq!(state_after_first, db.coil(4));
        assert_eq!(db.coil(4), Some(true));
    }

    #[test]
    fn fresh_holding_registers_read_as_zero() {
        let db = Database::new(1, 10);
        let response = db.read_holding_registers(0, 2);
        assert_eq!(response, vec![1, 0x03, 0x04, 0, 0, 0, 0]);
    }

    #[test]
    fn read_byte_count_formulas() {
        let db = Database::new(1, 100);

        // Bit reads: byte_count = ceil(count / 8).
        for count in [1u16, 7, 8, 9, 16, 17] {
            let response = db.read_coils(0, count);
            assert_eq!(response[2] as usize, (count as usize).div_ceil(8));
            assert_eq!(response.len(), 3 + (count as usize).div_ceil(8));
        }

        // Word reads: byte_count = count * 2.
        for count in [1u16, 2, 10] {
            let response = db.read_input_registers(0, count);
            assert_eq!(response[2] as usize, count as usize * 2);
        }
    }

    #[test]
    fn read_exceptions_use_fixed_marker_bytes() {
        let db = Database::new(1, 10);

        assert_eq!(db.read_coils(10, 1), vec![1, 0x81, 0x02]);
        assert_eq!(db.read_discrete_inputs(10, 1), vec![1, 0x82, 0x02]);
        assert_eq!(db.read_holding_registers(10, 1), vec![1, 0x83, 0x02]);
        assert_eq!(db.read_input_registers(10, 1), vec![1, 0x84, 0x02]);

        assert_eq!(db.read_coils(0, 0), vec![1, 0x81, 0x03]);
        assert_eq!(db.read_coils(5, 6), vec![1, 0x81, 0x03]);
        assert_eq!(db.read_holding_registers(0, 11), vec![1, 0x83, 0x03]);
    }

    #[test]
    fn reads_beyond_quantity_ceilings_are_rejected() {
        // Large enough banks that the capacity checks alone would pass.
        let db = Database::default();

        assert_eq!(db.read_coils(0, 2048), vec![1, 0x81, 0x03]);
        assert_eq!(db.read_discrete_inputs(0, 2001), vec![1, 0x82, 0x03]);
        assert_eq!(db.read_holding_registers(0, 126), vec![1, 0x83, 0x03]);
        assert_eq!(db.read_input_registers(0, 126), vec![1, 0x84, 0x03]);

        // At the ceiling the byte count still fits its one-byte field.
        let response = db.read_coils(0, 2000);
        assert_eq!(response[2], 250);
        let response = db.read_holding_registers(0, 125);
        assert_eq!(response[2], 250);
    }

    #[test]
    fn writes_beyond_quantity_ceilings_are_rejected() {
        let mut db = Database::default();

        let coil_data = vec![0xFFu8; 247];
        assert_eq!(
            db.write_multiple_coils(0, 1969, &coil_data),
            vec![1, 0x8F, 0x03]
        );
        assert_eq!(db.coil(0), Some(false));

        let register_data = vec![0xFFu8; 248];
        assert_eq!(
            db.write_multiple_registers(0, 124, &register_data),
            vec![1, 0x90, 0x03]
        );
        assert_eq!(db.holding_register(0), Some(0));
    }

    #[test]
    fn write_single_coil_rejects_bad_values() {
        let mut db = Database::new(1, 10);

        // Out-of-range address.
        assert_eq!(db.write_single_coil(10, &[0xFF, 0x00]), vec![1, 0x85, 0x02]);
        // Wrong payload length.
        assert_eq!(db.write_single_coil(0, &[0xFF]), vec![1, 0x85, 0x03]);
        // Low byte must be zero.
        assert_eq!(db.write_single_coil(0, &[0xFF, 0x01]), vec![1, 0x85, 0x03]);
        // High byte must be 0x00 or 0xFF.
        assert_eq!(db.write_single_coil(0, &[0x7F, 0x00]), vec![1, 0x85, 0x03]);
        // Nothing was mutated.
        assert_eq!(db.coil(0), Some(false));
    }

    #[test]
    fn write_single_register_round_trip() {
        let mut db = Database::new(1, 10);
        let echo = db.write_single_register(2, &[0x12, 0x34]);
        assert_eq!(echo, vec![1, 0x06, 0x00, 0x02, 0x12, 0x34]);
        assert_eq!(db.holding_register(2), Some(0x1234));

        let response = db.read_holding_registers(2, 1);
        assert_eq!(response, vec![1, 0x03, 0x02, 0x12, 0x34]);
    }

    #[test]
    fn write_multiple_coils_unpacks_lsb_first() {
        let mut db = Database::new(1, 16);
        // 0b0000_0101 -> coils 0 and 2 on.
        let echo = db.write_multiple_coils(0, 3, &[0b0000_0101]);
        assert_eq!(echo, vec![1, 0x0F, 0x00, 0x00, 0x00, 0x03]);
        assert_eq!(db.coil(0), Some(true));
        assert_eq!(db.coil(1), Some(false));
        assert_eq!(db.coil(2), Some(true));
    }

    #[test]
    fn write_multiple_registers_capacity_exceeded() {
        let mut db = Database::new(1, 10);
        let data = [0u8; 10];
        let response = db.write_multiple_registers(8, 5, &data);
        assert_eq!(response, vec![1, 0x90, 0x02]);
        // All-or-nothing: nothing was written.
        assert_eq!(db.holding_register(8), Some(0));
        assert_eq!(db.holding_register(9), Some(0));
    }

    #[test]
    fn write_multiple_registers_payload_length_must_match() {
        let mut db = Database::new(1, 10);
        let response = db.write_multiple_registers(0, 2, &[0x00, 0x01, 0x00]);
        assert_eq!(response, vec![1, 0x90, 0x03]);
    }

    #[test]
    fn write_multiple_registers_round_trip() {
        let mut db = Database::new(1, 10);
        let echo = db.write_multiple_registers(4, 2, &[0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(echo, vec![1, 0x10, 0x00, 0x04, 0x00, 0x02]);
        assert_eq!(db.holding_register(4), Some(0xAABB));
        assert_eq!(db.holding_register(5), Some(0xCCDD));
    }

    #[test]
    fn process_side_setters_feed_read_only_banks() {
        let mut db = Database::new(1, 10);
        db.set_discrete_input(1, true).unwrap();
        db.set_input_register(0, 0xBEEF).unwrap();

        assert_eq!(db.read_discrete_inputs(0, 2), vec![1, 0x02, 0x01, 0b10]);
        assert_eq!(db.read_input_registers(0, 1), vec![1, 0x04, 0x02, 0xBE, 0xEF]);

        assert!(db.set_discrete_input(10, true).is_err());
    }
}
