//! Modbus TCP server.
//!
//! The server binds a listener, admits connections through a semaphore and
//! spawns one task per connection. Each task reads whole ADUs, dispatches
//! them against the shared database registry and writes back the framed
//! response. Protocol errors travel in-band as exception frames; only framing
//! and socket failures tear a connection down.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::constants::{
    ExceptionCode, DEFAULT_DATABASE_SIZE, DEFAULT_TCP_PORT, DEFAULT_UNIT_ID, EXCEPTION_FLAG,
    FC_READ_COILS, FC_READ_DISCRETE_INPUTS, FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS,
    FC_WRITE_MULTIPLE_COILS, FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_COIL,
    FC_WRITE_SINGLE_REGISTER, INITIAL_CONNECTION_PERMITS, MAX_CONNECTION_PERMITS,
    MBAP_HEADER_LEN, RESPONSE_BUFFER_SIZE,
};
use crate::database::Database;
use crate::error::{ModbusError, ModbusResult};
use crate::frame::{prepend_header, MbapHeader};
use crate::register::RegisterKind;
use crate::registry::DatabaseRegistry;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address, e.g. `0.0.0.0:502`. Port 0 picks an ephemeral port.
    pub bind_addr: String,
    /// Unit id of the default database.
    pub unit_id: u8,
    /// Cells per register bank in the default database.
    pub database_size: usize,
    /// Connections admitted concurrently before accept-dispatching blocks.
    /// Clamped to [`MAX_CONNECTION_PERMITS`].
    pub initial_permits: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{DEFAULT_TCP_PORT}"),
            unit_id: DEFAULT_UNIT_ID,
            database_size: DEFAULT_DATABASE_SIZE,
            initial_permits: INITIAL_CONNECTION_PERMITS,
        }
    }
}

/// Published on the notification channel after every successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteNotification {
    /// Register bank that was written.
    pub kind: RegisterKind,
    /// Start address of the write.
    pub address: u16,
    /// Number of cells written.
    pub count: u16,
}

/// Modbus TCP server hosting one or more unit databases.
pub struct ModbusTcpServer {
    config: ServerConfig,
    registry: Arc<Mutex<DatabaseRegistry>>,
    semaphore: Arc<Semaphore>,
    running: Arc<AtomicBool>,
    notifications: broadcast::Sender<WriteNotification>,
    accept_task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl ModbusTcpServer {
    /// Create a server with a default database for `config.unit_id`.
    pub fn new(config: ServerConfig) -> Self {
        let permits = config.initial_permits.min(MAX_CONNECTION_PERMITS);
        let database = Database::new(config.unit_id, config.database_size);
        let (notifications, _) = broadcast::channel(64);
        Self {
            config,
            registry: Arc::new(Mutex::new(DatabaseRegistry::new(database))),
            semaphore: Arc::new(Semaphore::new(permits)),
            running: Arc::new(AtomicBool::new(false)),
            notifications,
            accept_task: None,
            local_addr: None,
        }
    }

    /// Shared handle to the database registry. The lock is the same one the
    /// dispatch path takes, so holding it pauses request processing.
    pub fn registry(&self) -> Arc<Mutex<DatabaseRegistry>> {
        Arc::clone(&self.registry)
    }

    /// Register an additional unit database, replacing any existing database
    /// with the same unit id.
    pub fn add_database(&self, database: Database) {
        lock_registry(&self.registry).add(database);
    }

    /// Subscribe to write notifications. Receivers that fall behind lose the
    /// oldest messages.
    pub fn subscribe(&self) -> broadcast::Receiver<WriteNotification> {
        self.notifications.subscribe()
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind the listener and spawn the accept loop.
    pub async fn start(&mut self) -> ModbusResult<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(ModbusError::Configuration(
                "server is already running".to_string(),
            ));
        }

        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);
        self.running.store(true, Ordering::SeqCst);
        info!("modbus tcp server listening on {}", local_addr);

        let registry = Arc::clone(&self.registry);
        let semaphore = Arc::clone(&self.semaphore);
        let running = Arc::clone(&self.running);
        let notifications = self.notifications.clone();

        self.accept_task = Some(tokio::spawn(async move {
            accept_loop(listener, registry, semaphore, running, notifications).await;
        }));

        Ok(())
    }

    /// Stop accepting connections. In-flight handlers finish on their own
    /// when their peer closes or errors.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
        info!("modbus tcp server stopped");
    }

    /// True while the accept loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for ModbusTcpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock_registry(registry: &Mutex<DatabaseRegistry>) -> std::sync::MutexGuard<'_, DatabaseRegistry> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn accept_loop(
    listener: TcpListener,
    registry: Arc<Mutex<DatabaseRegistry>>,
    semaphore: Arc<Semaphore>,
    running: Arc<AtomicBool>,
    notifications: broadcast::Sender<WriteNotification>,
) {
    while running.load(Ordering::SeqCst) {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("accept failed: {e}");
                continue;
            }
        };

        // Waiting here after accept stalls dispatching of further
        // connections until a handler releases its permit.
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        debug!("client connected: {peer}");
        let registry = Arc::clone(&registry);
        let notifications = notifications.clone();
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = handle_connection(stream, &registry, &notifications).await {
                warn!("connection {peer} closed with error: {e}");
            }
            debug!("client disconnected: {peer}");
        });
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    registry: &Mutex<DatabaseRegistry>,
    notifications: &broadcast::Sender<WriteNotification>,
) -> ModbusResult<()> {
    let mut buffer = BytesMut::zeroed(RESPONSE_BUFFER_SIZE);

    loop {
        let n = stream.read(&mut buffer).await?;
        if n == 0 {
            return Ok(());
        }

        let adu = &buffer[..n];
        debug!("request adu: {}", hex::encode(adu));

        let header = MbapHeader::from_adu(adu)?;
        if header.protocol_id != 0 {
            return Err(ModbusError::InvalidFraming(format!(
                "protocol id is not 0: {}",
                header.protocol_id
            )));
        }
        if usize::from(header.length) != n - MBAP_HEADER_LEN {
            return Err(ModbusError::InvalidFraming(format!(
                "declared length {} does not match received PDU length {}",
                header.length,
                n - MBAP_HEADER_LEN
            )));
        }

        let response = {
            let mut registry = lock_registry(registry);
            dispatch(&mut registry, notifications, &adu[MBAP_HEADER_LEN..n])
        };
        if response.is_empty() {
            continue;
        }

        let response_adu = prepend_header(&response, &header);
        debug!("response adu: {}", hex::encode(&response_adu));
        stream.write_all(&response_adu).await?;
    }
}

/// Dispatch one PDU against the registry and return the response PDU.
///
/// An empty return means the request was too malformed to answer at all; the
/// caller sends nothing and keeps the connection.
fn dispatch(
    registry: &mut DatabaseRegistry,
    notifications: &broadcast::Sender<WriteNotification>,
    pdu: &[u8],
) -> Vec<u8> {
    if pdu.len() < 2 {
        error!("pdu too short to carry unit id and function code: {}", hex::encode(pdu));
        return Vec::new();
    }
    let unit_id = pdu[0];
    let function = pdu[1];
    let payload = &pdu[2..];

    if !registry.contains(unit_id) {
        warn!(
            "unit {} not registered, answering from default unit {}",
            unit_id,
            registry.default_unit()
        );
    }
    let database = registry.resolve_mut(unit_id);

    let response = match function {
        FC_READ_COILS | FC_READ_DISCRETE_INPUTS | FC_READ_HOLDING_REGISTERS
        | FC_READ_INPUT_REGISTERS => {
            let Some((address, count)) = parse_range(payload) else {
                error!("malformed read request: {}", hex::encode(pdu));
                return Vec::new();
            };
            match function {
                FC_READ_COILS => database.read_coils(address, count),
                FC_READ_DISCRETE_INPUTS => database.read_discrete_inputs(address, count),
                FC_READ_HOLDING_REGISTERS => database.read_holding_registers(address, count),
                _ => database.read_input_registers(address, count),
            }
        }
        FC_WRITE_SINGLE_COIL | FC_WRITE_SINGLE_REGISTER => {
            if payload.len() < 2 {
                error!("malformed single write request: {}", hex::encode(pdu));
                return Vec::new();
            }
            let address = u16::from_be_bytes([payload[0], payload[1]]);
            let data = &payload[2..];
            let response = if function == FC_WRITE_SINGLE_COIL {
                database.write_single_coil(address, data)
            } else {
                database.write_single_register(address, data)
            };
            if is_success(&response) {
                let kind = if function == FC_WRITE_SINGLE_COIL {
                    RegisterKind::Coil
                } else {
                    RegisterKind::HoldingRegister
                };
                notify(notifications, kind, address, 1);
            }
            response
        }
        FC_WRITE_MULTIPLE_COILS | FC_WRITE_MULTIPLE_REGISTERS => {
            let Some((address, count)) = parse_range(payload) else {
                error!("malformed multiple write request: {}", hex::encode(pdu));
                return Vec::new();
            };
            if payload.len() < 5 {
                error!("multiple write request missing byte count: {}", hex::encode(pdu));
                return Vec::new();
            }
            let data = &payload[5..];
            let response = if function == FC_WRITE_MULTIPLE_COILS {
                database.write_multiple_coils(address, count, data)
            } else {
                database.write_multiple_registers(address, count, data)
            };
            if is_success(&response) {
                let kind = if function == FC_WRITE_MULTIPLE_COILS {
                    RegisterKind::Coil
                } else {
                    RegisterKind::HoldingRegister
                };
                notify(notifications, kind, address, count);
            }
            response
        }
        other => {
            warn!("unsupported function code {other:#04x} from unit {unit_id}");
            vec![
                unit_id,
                EXCEPTION_FLAG | other,
                ExceptionCode::IllegalFunction.as_u8(),
            ]
        }
    };

    response
}

fn parse_range(payload: &[u8]) -> Option<(u16, u16)> {
    if payload.len() < 4 {
        return None;
    }
    let address = u16::from_be_bytes([payload[0], payload[1]]);
    let count = u16::from_be_bytes([payload[2], payload[3]]);
    Some((address, count))
}

// Success responses echo at least 6 bytes; exception frames are exactly 3.
fn is_success(response: &[u8]) -> bool {
    response.len() > 3
}

fn notify(
    notifications: &broadcast::Sender<WriteNotification>,
    kind: RegisterKind,
    address: u16,
    count: u16,
) {
    // Send only fails when nobody is subscribed.
    let _ = notifications.send(WriteNotification {
        kind,
        address,
        count,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> DatabaseRegistry {
        DatabaseRegistry::new(Database::new(1, 10))
    }

    #[test]
    fn dispatch_answers_reads_and_writes() {
        let mut registry = test_registry();
        let (tx, _rx) = broadcast::channel(8);

        let echo = dispatch(&mut registry, &tx, &[1, 0x05, 0x00, 0x03, 0xFF, 0x00]);
        assert_eq!(echo, vec![1, 0x05, 0x00, 0x03, 0xFF, 0x00]);

        let response = dispatch(&mut registry, &tx, &[1, 0x01, 0x00, 0x00, 0x00, 0x08]);
        assert_eq!(response, vec![1, 0x01, 0x01, 0b0000_1000]);
    }

    #[test]
    fn dispatch_rejects_unknown_function_in_band() {
        let mut registry = test_registry();
        let (tx, _rx) = broadcast::channel(8);

        let response = dispatch(&mut registry, &tx, &[1, 0x2B, 0x00, 0x00]);
        assert_eq!(response, vec![1, 0xAB, 0x01]);
    }

    #[test]
    fn dispatch_returns_nothing_for_garbage() {
        let mut registry = test_registry();
        let (tx, _rx) = broadcast::channel(8);

        assert!(dispatch(&mut registry, &tx, &[1]).is_empty());
        assert!(dispatch(&mut registry, &tx, &[1, 0x03, 0x00]).is_empty());
        assert!(dispatch(&mut registry, &tx, &[1, 0x10, 0x00, 0x00, 0x00]).is_empty());
    }

    #[test]
    fn dispatch_falls_back_to_default_unit() {
        let mut registry = test_registry();
        let (tx, _rx) = broadcast::channel(8);

        // Unit 9 is unknown; the default unit answers with its own id.
        let response = dispatch(&mut registry, &tx, &[9, 0x03, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(response, vec![1, 0x03, 0x02, 0x00, 0x00]);
    }

    #[test]
    fn successful_writes_publish_notifications() {
        let mut registry = test_registry();
        let (tx, mut rx) = broadcast::channel(8);

        dispatch(&mut registry, &tx, &[1, 0x06, 0x00, 0x02, 0x12, 0x34]);
        let note = rx.try_recv().unwrap();
        assert_eq!(
            note,
            WriteNotification {
                kind: RegisterKind::HoldingRegister,
                address: 2,
                count: 1
            }
        );

        dispatch(&mut registry, &tx, &[1, 0x0F, 0x00, 0x00, 0x00, 0x03, 0x01, 0b101]);
        let note = rx.try_recv().unwrap();
        assert_eq!(note.kind, RegisterKind::Coil);
        assert_eq!(note.count, 3);
    }

    #[test]
    fn failed_writes_publish_nothing() {
        let mut registry = test_registry();
        let (tx, mut rx) = broadcast::channel(8);

        // Out-of-range address produces an exception, no notification.
        let response = dispatch(&mut registry, &tx, &[1, 0x06, 0x00, 0xFF, 0x12, 0x34]);
        assert_eq!(response, vec![1, 0x86, 0x02]);
        assert!(rx.try_recv().is_err());
    }
}
