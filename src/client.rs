//! Modbus TCP client.
//!
//! The client connects lazily on the first request and keeps the socket for
//! subsequent calls. Each exchange gets a fresh transaction id and the
//! response header is validated against it. A connection dropped mid-exchange
//! is retried up to three times; a timeout or socket error surfaces
//! immediately and the next call reconnects.
//!
//! Methods take `&mut self`; the client does not serialize concurrent
//! callers.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::codec::{to_bool_array, to_u16_array};
use crate::constants::{
    DEFAULT_SERVER_DELAY_MS, DEFAULT_TCP_PORT, DEFAULT_TIMEOUT_MS, EXCEPTION_FLAG,
    MAX_RETRY_COUNT, RESPONSE_BUFFER_SIZE,
};
use crate::error::{ModbusError, ModbusResult};
use crate::frame::{prepend_header, validate_adu, MbapHeader};
use crate::request;

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server host name or address.
    pub host: String,
    /// Server TCP port.
    pub port: u16,
    /// Deadline for one whole send/receive exchange, retries included.
    pub timeout: Duration,
    /// Pause between writing a request and reading its response, modelling
    /// server processing time.
    pub server_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_TCP_PORT,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            server_delay: Duration::from_millis(DEFAULT_SERVER_DELAY_MS),
        }
    }
}

/// Modbus TCP client with lazy reconnection.
pub struct ModbusTcpClient {
    config: ClientConfig,
    stream: Option<TcpStream>,
    transaction_id: u16,
}

impl ModbusTcpClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            stream: None,
            transaction_id: 0,
        }
    }

    /// `host:port` the client connects to.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Drop the current connection. The next request reconnects.
    pub fn disconnect(&mut self) {
        self.stream = None;
    }

    fn next_transaction_id(&mut self) -> u16 {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        self.transaction_id
    }

    /// Send a framed ADU and return the raw response ADU.
    ///
    /// A connection closed by the peer is retried up to [`MAX_RETRY_COUNT`]
    /// times with a fresh connection each time; exhaustion is a hard failure.
    /// The configured timeout bounds the whole exchange and is not retried.
    pub async fn send_and_receive(&mut self, adu: &[u8]) -> ModbusResult<Vec<u8>> {
        let deadline = self.config.timeout;
        match timeout(deadline, self.exchange(adu)).await {
            Ok(Ok(response)) => Ok(response),
            // Drop the connection on any failure so the next call starts
            // from a fresh socket.
            Ok(Err(e)) => {
                self.stream = None;
                Err(e)
            }
            Err(_) => {
                self.stream = None;
                Err(ModbusError::Timeout(deadline))
            }
        }
    }

    async fn exchange(&mut self, adu: &[u8]) -> ModbusResult<Vec<u8>> {
        let addr = self.server_addr();
        let mut retries = 0;

        while retries < MAX_RETRY_COUNT {
            let connected = match self.stream.take() {
                Some(stream) => stream,
                None => {
                    debug!("connecting to {addr}");
                    TcpStream::connect(&addr).await?
                }
            };
            let stream = self.stream.insert(connected);

            stream.write_all(adu).await?;
            debug!("request adu: {}", hex::encode(adu));
            sleep(self.config.server_delay).await;

            let mut buffer = [0u8; RESPONSE_BUFFER_SIZE];
            let n = stream.read(&mut buffer).await?;
            if n == 0 {
                retries += 1;
                warn!("server closed the connection, retry {retries}/{MAX_RETRY_COUNT}");
                self.stream = None;
                continue;
            }

            debug!("response adu: {}", hex::encode(&buffer[..n]));
            return Ok(buffer[..n].to_vec());
        }

        Err(ModbusError::RetriesExhausted(MAX_RETRY_COUNT))
    }

    /// Frame a PDU, exchange it and return the validated response PDU.
    ///
    /// A 3-byte exception frame surfaces as [`ModbusError::Exception`].
    async fn transact(&mut self, pdu: Vec<u8>) -> ModbusResult<Vec<u8>> {
        let header = MbapHeader::new(self.next_transaction_id());
        let adu = prepend_header(&pdu, &header);

        let response = self.send_and_receive(&adu).await?;
        let response_pdu = validate_adu(&response, &header)?;

        if response_pdu.len() == 3 && response_pdu[1] & EXCEPTION_FLAG != 0 {
            return Err(ModbusError::Exception {
                function: response_pdu[1],
                code: response_pdu[2],
            });
        }
        Ok(response_pdu)
    }

    fn read_payload(pdu: Vec<u8>) -> ModbusResult<Vec<u8>> {
        if pdu.len() < 3 {
            return Err(ModbusError::Protocol(format!(
                "read response too short: {}",
                hex::encode(&pdu)
            )));
        }
        let byte_count = usize::from(pdu[2]);
        if pdu.len() < 3 + byte_count {
            return Err(ModbusError::InsufficientData {
                expected: 3 + byte_count,
                actual: pdu.len(),
            });
        }
        Ok(pdu[3..3 + byte_count].to_vec())
    }

    // ========================================================================
    // Read operations
    // ========================================================================

    /// Read `count` coils starting at `address` (FC01).
    pub async fn read_coils(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> ModbusResult<Vec<bool>> {
        let pdu = self.transact(request::read_coils(unit_id, address, count)).await?;
        let payload = Self::read_payload(pdu)?;
        to_bool_array(&payload, usize::from(count))
    }

    /// Read `count` discrete inputs starting at `address` (FC02).
    pub async fn read_discrete_inputs(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> ModbusResult<Vec<bool>> {
        let pdu = self
            .transact(request::read_discrete_inputs(unit_id, address, count))
            .await?;
        let payload = Self::read_payload(pdu)?;
        to_bool_array(&payload, usize::from(count))
    }

    /// Read `count` holding registers as raw big-endian bytes (FC03).
    pub async fn read_holding_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> ModbusResult<Vec<u8>> {
        let pdu = self
            .transact(request::read_holding_registers(unit_id, address, count))
            .await?;
        Self::read_payload(pdu)
    }

    /// Read `count` holding registers as u16 words (FC03).
    pub async fn read_holding_registers_as_u16(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> ModbusResult<Vec<u16>> {
        let payload = self.read_holding_registers(unit_id, address, count).await?;
        to_u16_array(&payload, usize::from(count))
    }

    /// Read `count` input registers as raw big-endian bytes (FC04).
    pub async fn read_input_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> ModbusResult<Vec<u8>> {
        let pdu = self
            .transact(request::read_input_registers(unit_id, address, count))
            .await?;
        Self::read_payload(pdu)
    }

    /// Read `count` input registers as u16 words (FC04).
    pub async fn read_input_registers_as_u16(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> ModbusResult<Vec<u16>> {
        let payload = self.read_input_registers(unit_id, address, count).await?;
        to_u16_array(&payload, usize::from(count))
    }

    // ========================================================================
    // Write operations
    // ========================================================================

    /// Write one coil (FC05).
    pub async fn write_single_coil(
        &mut self,
        unit_id: u8,
        address: u16,
        value: bool,
    ) -> ModbusResult<()> {
        let pdu = self
            .transact(request::write_single_coil(unit_id, address, value))
            .await?;
        Self::check_write_echo(&pdu)?;
        info!("wrote coil {address} = {value} on unit {unit_id}");
        Ok(())
    }

    /// Write one holding register (FC06).
    pub async fn write_single_register(
        &mut self,
        unit_id: u8,
        address: u16,
        value: u16,
    ) -> ModbusResult<()> {
        let pdu = self
            .transact(request::write_single_register(unit_id, address, value))
            .await?;
        Self::check_write_echo(&pdu)?;
        info!("wrote register {address} = {value} on unit {unit_id}");
        Ok(())
    }

    /// Write a run of coils (FC15).
    pub async fn write_multiple_coils(
        &mut self,
        unit_id: u8,
        address: u16,
        values: &[bool],
    ) -> ModbusResult<()> {
        let pdu = self
            .transact(request::write_multiple_coils(unit_id, address, values)?)
            .await?;
        Self::check_write_echo(&pdu)?;
        info!("wrote {} coils from {address} on unit {unit_id}", values.len());
        Ok(())
    }

    /// Write a run of holding registers from raw big-endian bytes (FC16).
    pub async fn write_multiple_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        data: &[u8],
    ) -> ModbusResult<()> {
        let pdu = self
            .transact(request::write_multiple_registers(unit_id, address, data)?)
            .await?;
        Self::check_write_echo(&pdu)?;
        info!(
            "wrote {} registers from {address} on unit {unit_id}",
            data.len() / 2
        );
        Ok(())
    }

    // Success echoes are at least 6 bytes; anything shorter that was not an
    // exception frame is malformed.
    fn check_write_echo(pdu: &[u8]) -> ModbusResult<()> {
        if pdu.len() <= 3 {
            return Err(ModbusError::Protocol(format!(
                "write echo too short: {}",
                hex::encode(pdu)
            )));
        }
        Ok(())
    }
}
