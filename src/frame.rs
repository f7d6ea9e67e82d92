//! MBAP framing codec.
//!
//! Modbus TCP prefixes every PDU with a 6-byte MBAP header:
//! `[Transaction ID: u16][Protocol ID: u16][Length: u16]`, all big-endian.
//! The length field counts the bytes that follow the header, not the header
//! itself. The protocol identifier is always zero for Modbus.

use crate::constants::MBAP_HEADER_LEN;
use crate::error::{ModbusError, ModbusResult};

/// Modbus application protocol header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MbapHeader {
    /// Transaction identifier, used to match requests and responses.
    pub transaction_id: u16,
    /// Protocol identifier, fixed to 0 for Modbus.
    pub protocol_id: u16,
    /// Number of bytes following the header.
    pub length: u16,
}

impl MbapHeader {
    /// Create a header for a new transaction. Length is filled in by
    /// [`prepend_header`] when the PDU is framed.
    pub fn new(transaction_id: u16) -> Self {
        Self {
            transaction_id,
            protocol_id: 0,
            length: 0,
        }
    }

    /// Serialize into the 6-byte wire form.
    pub fn to_bytes(&self) -> [u8; MBAP_HEADER_LEN] {
        let mut bytes = [0u8; MBAP_HEADER_LEN];
        bytes[0..2].copy_from_slice(&self.transaction_id.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.protocol_id.to_be_bytes());
        bytes[4..6].copy_from_slice(&self.length.to_be_bytes());
        bytes
    }

    /// Parse the header from the front of an ADU.
    pub fn from_adu(adu: &[u8]) -> ModbusResult<Self> {
        if adu.len() < MBAP_HEADER_LEN {
            return Err(ModbusError::InvalidFraming(format!(
                "ADU too short for MBAP header: {} bytes",
                adu.len()
            )));
        }
        Ok(Self {
            transaction_id: u16::from_be_bytes([adu[0], adu[1]]),
            protocol_id: u16::from_be_bytes([adu[2], adu[3]]),
            length: u16::from_be_bytes([adu[4], adu[5]]),
        })
    }
}

/// Validate an ADU against the header its request was sent with and return
/// the PDU bytes after the header.
///
/// Fails when the transaction id does not echo `expected`, the protocol id is
/// not zero, or the declared length disagrees with the actual byte count.
pub fn validate_adu(adu: &[u8], expected: &MbapHeader) -> ModbusResult<Vec<u8>> {
    let header = MbapHeader::from_adu(adu)?;

    if header.transaction_id != expected.transaction_id {
        return Err(ModbusError::InvalidFraming(format!(
            "transaction id mismatch: expected {}, got {}",
            expected.transaction_id, header.transaction_id
        )));
    }
    if header.protocol_id != 0 {
        return Err(ModbusError::InvalidFraming(format!(
            "protocol id is not 0: {}",
            header.protocol_id
        )));
    }
    if usize::from(header.length) != adu.len() - MBAP_HEADER_LEN {
        return Err(ModbusError::InvalidFraming(format!(
            "declared length {} does not match PDU length {}",
            header.length,
            adu.len() - MBAP_HEADER_LEN
        )));
    }

    Ok(adu[MBAP_HEADER_LEN..].to_vec())
}

/// Frame a PDU into a fresh ADU buffer.
///
/// The header's length field is set to the PDU length; the caller's PDU is
/// never mutated.
pub fn prepend_header(pdu: &[u8], header: &MbapHeader) -> Vec<u8> {
    let header = MbapHeader {
        transaction_id: header.transaction_id,
        protocol_id: header.protocol_id,
        length: pdu.len() as u16,
    };

    let mut adu = Vec::with_capacity(MBAP_HEADER_LEN + pdu.len());
    adu.extend_from_slice(&header.to_bytes());
    adu.extend_from_slice(pdu);
    adu
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let header = MbapHeader {
            transaction_id: 0x1234,
            protocol_id: 0,
            length: 6,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes, [0x12, 0x34, 0x00, 0x00, 0x00, 0x06]);
        assert_eq!(MbapHeader::from_adu(&bytes).unwrap(), header);
    }

    #[test]
    fn short_adu_is_rejected() {
        let err = MbapHeader::from_adu(&[0x00, 0x01, 0x02]).unwrap_err();
        assert!(matches!(err, ModbusError::InvalidFraming(_)));
    }

    #[test]
    fn prepend_then_validate_reproduces_pdu() {
        let pdu = [0x01, 0x03, 0x00, 0x00, 0x00, 0x02];
        let header = MbapHeader::new(7);
        let adu = prepend_header(&pdu, &header);
        assert_eq!(adu.len(), MBAP_HEADER_LEN + pdu.len());
        assert_eq!(&adu[..2], &7u16.to_be_bytes());
        assert_eq!(&adu[4..6], &(pdu.len() as u16).to_be_bytes());

        let unwrapped = validate_adu(&adu, &header).unwrap();
        assert_eq!(unwrapped, pdu);
    }

    #[test]
    fn prepend_does_not_mutate_caller_pdu() {
        let pdu = vec![0x01, 0x05, 0x00, 0x03, 0xFF, 0x00];
        let original = pdu.clone();
        let _ = prepend_header(&pdu, &MbapHeader::new(1));
        assert_eq!(pdu, original);
    }

    #[test]
    fn transaction_id_mismatch_is_rejected() {
        let adu = prepend_header(&[0x01, 0x03], &MbapHeader::new(5));
        let err = validate_adu(&adu, &MbapHeader::new(6)).unwrap_err();
        assert!(matches!(err, ModbusError::InvalidFraming(_)));
    }

    #[test]
    fn nonzero_protocol_id_is_rejected() {
        let mut adu = prepend_header(&[0x01, 0x03], &MbapHeader::new(1));
        adu[2] = 0x00;
        adu[3] = 0x01;
        let err = validate_adu(&adu, &MbapHeader::new(1)).unwrap_err();
        assert!(matches!(err, ModbusError::InvalidFraming(_)));
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let mut adu = prepend_header(&[0x01, 0x03, 0x00], &MbapHeader::new(1));
        adu[5] = 9;
        let err = validate_adu(&adu, &MbapHeader::new(1)).unwrap_err();
        assert!(matches!(err, ModbusError::InvalidFraming(_)));
    }
}
