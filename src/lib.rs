//! # Gridbus - Modbus TCP for Industrial Process Images
//!
//! An async Modbus TCP implementation in pure Rust: a register-addressable
//! server (process image) and a matching client over the standard 6-byte MBAP
//! framing, built on Tokio.
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Server | Client |
//! |------|----------|--------|--------|
//! | 0x01 | Read Coils | ✅ | ✅ |
//! | 0x02 | Read Discrete Inputs | ✅ | ✅ |
//! | 0x03 | Read Holding Registers | ✅ | ✅ |
//! | 0x04 | Read Input Registers | ✅ | ✅ |
//! | 0x05 | Write Single Coil | ✅ | ✅ |
//! | 0x06 | Write Single Register | ✅ | ✅ |
//! | 0x0F | Write Multiple Coils | ✅ | ✅ |
//! | 0x10 | Write Multiple Registers | ✅ | ✅ |
//!
//! Protocol errors are answered in-band as Modbus exception frames; the
//! client surfaces them as [`ModbusError::Exception`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gridbus::{ClientConfig, ModbusResult, ModbusTcpClient, ModbusTcpServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> ModbusResult<()> {
//!     let mut server = ModbusTcpServer::new(ServerConfig {
//!         bind_addr: "127.0.0.1:502".to_string(),
//!         ..ServerConfig::default()
//!     });
//!     server.start().await?;
//!
//!     let mut client = ModbusTcpClient::new(ClientConfig::default());
//!     client.write_single_register(1, 100, 0x1234).await?;
//!     let values = client.read_holding_registers_as_u16(1, 100, 1).await?;
//!     println!("read back: {values:?}");
//!
//!     server.stop();
//!     Ok(())
//! }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Error types and result handling
pub mod error;

/// Protocol constants based on the official specification
pub mod constants;

/// MBAP framing codec
pub mod frame;

/// Register cell types
pub mod register;

/// Per-unit process image and its eight operations
pub mod database;

/// Unit-id keyed database registry
pub mod registry;

/// Request PDU builders
pub mod request;

/// Typed payload encoding and decoding
pub mod codec;

/// TCP server
pub mod server;

/// TCP client
pub mod client;

/// Logging bootstrap
pub mod logging;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime (users can use gridbus::tokio) ===
pub use tokio;

// === Core API ===
pub use client::{ClientConfig, ModbusTcpClient};
pub use database::Database;
pub use registry::DatabaseRegistry;
pub use server::{ModbusTcpServer, ServerConfig, WriteNotification};

// === Error handling ===
pub use error::{ModbusError, ModbusResult};

// === Core types ===
pub use constants::ExceptionCode;
pub use frame::MbapHeader;
pub use register::{Coil, DiscreteInput, HoldingRegister, InputRegister, RegisterKind};

// === Commonly needed constants ===
pub use constants::{
    DEFAULT_TCP_PORT, DEFAULT_TIMEOUT_MS, DEFAULT_UNIT_ID, MAX_READ_BITS, MAX_READ_REGISTERS,
    MAX_WRITE_COILS, MAX_WRITE_REGISTERS,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
