//! Modbus protocol constants.

/// MBAP header length for Modbus TCP.
/// Transaction ID(2) + Protocol ID(2) + Length(2) = 6 bytes.
pub const MBAP_HEADER_LEN: usize = 6;

/// Read/receive buffer size for a single ADU.
pub const RESPONSE_BUFFER_SIZE: usize = 1024;

/// Default Modbus TCP port.
pub const DEFAULT_TCP_PORT: u16 = 502;

/// Default unit identifier for a freshly created database.
pub const DEFAULT_UNIT_ID: u8 = 0x01;

/// Default number of cells in each register bank.
pub const DEFAULT_DATABASE_SIZE: usize = 9999;

/// Connection permits handed out by a server before admission blocks.
pub const INITIAL_CONNECTION_PERMITS: usize = 100;

/// Hard ceiling on concurrent server connections.
pub const MAX_CONNECTION_PERMITS: usize = 1000;

/// Client send/receive attempts before giving up.
pub const MAX_RETRY_COUNT: u32 = 3;

/// Default per-exchange client timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Default pause between writing a request and reading the response,
/// modelling expected server processing time.
pub const DEFAULT_SERVER_DELAY_MS: u64 = 20;

// ============================================================================
// Protocol quantity ceilings
// ============================================================================
//
// Per-request limits from the Modbus application protocol. They also keep
// every read payload within the one-byte byte-count field (250 bytes at most).

/// Most coils or discrete inputs one read may request.
pub const MAX_READ_BITS: u16 = 2000;
/// Most registers one read may request.
pub const MAX_READ_REGISTERS: u16 = 125;
/// Most coils one write may carry.
pub const MAX_WRITE_COILS: u16 = 1968;
/// Most registers one write may carry.
pub const MAX_WRITE_REGISTERS: u16 = 123;

// ============================================================================
// Function codes
// ============================================================================

/// Read Coils (FC01)
pub const FC_READ_COILS: u8 = 0x01;
/// Read Discrete Inputs (FC02)
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;
/// Read Holding Registers (FC03)
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
/// Read Input Registers (FC04)
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;
/// Write Single Coil (FC05)
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;
/// Write Single Register (FC06)
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;
/// Write Multiple Coils (FC15)
pub const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;
/// Write Multiple Registers (FC16)
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

// ============================================================================
// Read-function exception bytes
// ============================================================================
//
// The second byte of a read exception frame is a fixed per-function literal.
// These coincide with `0x80 | fc` for FC01-FC04 but are kept as literals to
// match the wire behaviour exactly.

/// Exception marker byte for Read Coils responses.
pub const EXC_READ_COILS: u8 = 0x81;
/// Exception marker byte for Read Discrete Inputs responses.
pub const EXC_READ_DISCRETE_INPUTS: u8 = 0x82;
/// Exception marker byte for Read Holding Registers responses.
pub const EXC_READ_HOLDING_REGISTERS: u8 = 0x83;
/// Exception marker byte for Read Input Registers responses.
pub const EXC_READ_INPUT_REGISTERS: u8 = 0x84;

/// Marker bit set on the function code of write/unknown-function exceptions.
pub const EXCEPTION_FLAG: u8 = 0x80;

// ============================================================================
// Exception codes
// ============================================================================

/// Modbus exception codes carried in the third byte of an exception frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    SlaveDeviceFailure = 0x04,
    MemoryParityError = 0x05,
    GatewayPathUnavailable = 0x06,
    GatewayTargetDeviceFailedToRespond = 0x07,
    /// Catch-all for non-standard conditions.
    Other = 0x80,
}

impl ExceptionCode {
    /// Raw wire value of this exception code.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_codes_match_wire_values() {
        assert_eq!(ExceptionCode::IllegalFunction.as_u8(), 0x01);
        assert_eq!(ExceptionCode::IllegalDataAddress.as_u8(), 0x02);
        assert_eq!(ExceptionCode::IllegalDataValue.as_u8(), 0x03);
        assert_eq!(ExceptionCode::Other.as_u8(), 0x80);
    }

    #[test]
    fn read_exception_bytes_are_fixed_literals() {
        assert_eq!(EXC_READ_COILS, 0x81);
        assert_eq!(EXC_READ_DISCRETE_INPUTS, 0x82);
        assert_eq!(EXC_READ_HOLDING_REGISTERS, 0x83);
        assert_eq!(EXC_READ_INPUT_REGISTERS, 0x84);
    }
}
