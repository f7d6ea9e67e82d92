//! Request PDU builders.
//!
//! Every builder returns the PDU bytes only; the caller frames them with an
//! MBAP header before sending. All multi-byte fields are big-endian. The PDU
//! carries the unit id as its first byte on this wire.

use crate::codec::bools_to_bytes;
use crate::constants::{
    FC_READ_COILS, FC_READ_DISCRETE_INPUTS, FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS,
    FC_WRITE_MULTIPLE_COILS, FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_COIL,
    FC_WRITE_SINGLE_REGISTER, MAX_WRITE_COILS, MAX_WRITE_REGISTERS,
};
use crate::error::{ModbusError, ModbusResult};

fn read_request(unit_id: u8, function: u8, address: u16, count: u16) -> Vec<u8> {
    let addr = address.to_be_bytes();
    let cnt = count.to_be_bytes();
    vec![unit_id, function, addr[0], addr[1], cnt[0], cnt[1]]
}

/// Read Coils (FC01) request.
pub fn read_coils(unit_id: u8, address: u16, count: u16) -> Vec<u8> {
    read_request(unit_id, FC_READ_COILS, address, count)
}

/// Read Discrete Inputs (FC02) request.
pub fn read_discrete_inputs(unit_id: u8, address: u16, count: u16) -> Vec<u8> {
    read_request(unit_id, FC_READ_DISCRETE_INPUTS, address, count)
}

/// Read Holding Registers (FC03) request.
pub fn read_holding_registers(unit_id: u8, address: u16, count: u16) -> Vec<u8> {
    read_request(unit_id, FC_READ_HOLDING_REGISTERS, address, count)
}

/// Read Input Registers (FC04) request.
pub fn read_input_registers(unit_id: u8, address: u16, count: u16) -> Vec<u8> {
    read_request(unit_id, FC_READ_INPUT_REGISTERS, address, count)
}

/// Write Single Coil (FC05) request. The value field is 0xFF00 for on and
/// 0x0000 for off.
pub fn write_single_coil(unit_id: u8, address: u16, value: bool) -> Vec<u8> {
    let addr = address.to_be_bytes();
    let value_hi = if value { 0xFF } else { 0x00 };
    vec![
        unit_id,
        FC_WRITE_SINGLE_COIL,
        addr[0],
        addr[1],
        value_hi,
        0x00,
    ]
}

/// Write Single Register (FC06) request.
pub fn write_single_register(unit_id: u8, address: u16, value: u16) -> Vec<u8> {
    let addr = address.to_be_bytes();
    let val = value.to_be_bytes();
    vec![
        unit_id,
        FC_WRITE_SINGLE_REGISTER,
        addr[0],
        addr[1],
        val[0],
        val[1],
    ]
}

/// Write Multiple Coils (FC15) request. The coil count derives from the
/// slice length; values are bit-packed LSB-first. At most
/// [`MAX_WRITE_COILS`] per request.
pub fn write_multiple_coils(unit_id: u8, address: u16, values: &[bool]) -> ModbusResult<Vec<u8>> {
    if values.is_empty() || values.len() > usize::from(MAX_WRITE_COILS) {
        return Err(ModbusError::InvalidData(format!(
            "coil count must be in 1..={MAX_WRITE_COILS}, got {}",
            values.len()
        )));
    }
    let data = bools_to_bytes(values);

    let addr = address.to_be_bytes();
    let cnt = (values.len() as u16).to_be_bytes();
    let mut pdu = Vec::with_capacity(7 + data.len());
    pdu.extend_from_slice(&[
        unit_id,
        FC_WRITE_MULTIPLE_COILS,
        addr[0],
        addr[1],
        cnt[0],
        cnt[1],
        data.len() as u8,
    ]);
    pdu.extend_from_slice(&data);
    Ok(pdu)
}

/// Write Multiple Registers (FC16) request. `data` holds two big-endian
/// bytes per register; the register count derives from its length. At most
/// [`MAX_WRITE_REGISTERS`] registers per request.
pub fn write_multiple_registers(unit_id: u8, address: u16, data: &[u8]) -> ModbusResult<Vec<u8>> {
    if data.is_empty() || data.len() % 2 != 0 {
        return Err(ModbusError::InvalidData(format!(
            "register payload must be a non-empty even number of bytes, got {}",
            data.len()
        )));
    }
    if data.len() / 2 > usize::from(MAX_WRITE_REGISTERS) {
        return Err(ModbusError::InvalidData(format!(
            "register count must be at most {MAX_WRITE_REGISTERS}, got {}",
            data.len() / 2
        )));
    }

    let addr = address.to_be_bytes();
    let cnt = ((data.len() / 2) as u16).to_be_bytes();
    let mut pdu = Vec::with_capacity(7 + data.len());
    pdu.extend_from_slice(&[
        unit_id,
        FC_WRITE_MULTIPLE_REGISTERS,
        addr[0],
        addr[1],
        cnt[0],
        cnt[1],
        data.len() as u8,
    ]);
    pdu.extend_from_slice(data);
    Ok(pdu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_requests_are_six_bytes() {
        assert_eq!(
            read_holding_registers(1, 0x0102, 0x0304),
            vec![1, 0x03, 0x01, 0x02, 0x03, 0x04]
        );
        assert_eq!(read_coils(1, 0, 8), vec![1, 0x01, 0, 0, 0, 8]);
        assert_eq!(read_discrete_inputs(2, 1, 1), vec![2, 0x02, 0, 1, 0, 1]);
        assert_eq!(read_input_registers(3, 5, 2), vec![3, 0x04, 0, 5, 0, 2]);
    }

    #[test]
    fn write_single_coil_value_convention() {
        assert_eq!(
            write_single_coil(1, 3, true),
            vec![1, 0x05, 0x00, 0x03, 0xFF, 0x00]
        );
        assert_eq!(
            write_single_coil(1, 3, false),
            vec![1, 0x05, 0x00, 0x03, 0x00, 0x00]
        );
    }

    #[test]
    fn write_multiple_coils_packs_and_counts() {
        let pdu = write_multiple_coils(1, 0, &[true, false, true]).unwrap();
        assert_eq!(pdu, vec![1, 0x0F, 0, 0, 0, 3, 1, 0b0000_0101]);

        assert!(write_multiple_coils(1, 0, &[]).is_err());
    }

    #[test]
    fn write_builders_enforce_quantity_ceilings() {
        let too_many_coils = vec![true; 1969];
        assert!(write_multiple_coils(1, 0, &too_many_coils).is_err());
        let at_ceiling = vec![true; 1968];
        let pdu = write_multiple_coils(1, 0, &at_ceiling).unwrap();
        assert_eq!(pdu[6], 246);

        let too_many_registers = vec![0u8; 248];
        assert!(write_multiple_registers(1, 0, &too_many_registers).is_err());
        let at_ceiling = vec![0u8; 246];
        let pdu = write_multiple_registers(1, 0, &at_ceiling).unwrap();
        assert_eq!(pdu[6], 246);
    }

    #[test]
    fn write_multiple_registers_counts_pairs() {
        let pdu = write_multiple_registers(1, 4, &[0xAA, 0xBB, 0xCC, 0xDD]).unwrap();
        assert_eq!(pdu, vec![1, 0x10, 0, 4, 0, 2, 4, 0xAA, 0xBB, 0xCC, 0xDD]);

        assert!(write_multiple_registers(1, 0, &[0x01]).is_err());
        assert!(write_multiple_registers(1, 0, &[]).is_err());
    }
}
