//! Error types and result handling.
//!
//! Protocol-level Modbus exceptions are never represented here: the database
//! answers those in-band as 3-byte exception frames. `ModbusError` covers
//! local failures only: framing, transport, timeouts, bad caller input.

use std::time::Duration;

use thiserror::Error;

/// Result type alias used throughout the library.
pub type ModbusResult<T> = std::result::Result<T, ModbusError>;

/// Errors raised by framing, transport and payload decoding.
#[derive(Error, Debug)]
pub enum ModbusError {
    /// Malformed MBAP header or ADU/header mismatch.
    #[error("invalid framing: {0}")]
    InvalidFraming(String),

    /// A typed decoder was asked for more elements than the buffer holds.
    #[error("insufficient data: expected {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    /// The server answered with an in-band Modbus exception frame.
    #[error("modbus exception: function {function:#04x}, exception code {code:#04x}")]
    Exception { function: u8, code: u8 },

    /// Caller-supplied data that cannot be encoded into a request.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Underlying socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A send/receive exchange exceeded its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// All retry attempts produced dropped connections.
    #[error("no response after {0} attempts")]
    RetriesExhausted(u32),

    /// Invalid configuration (bad address, zero-sized database, ...).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed PDU or other protocol-level inconsistency.
    #[error("protocol error: {0}")]
    Protocol(String),
}
