//! Runnable demonstration: start a server, drive it with a client.

use std::time::Duration;

use anyhow::Result;
use gridbus::{ClientConfig, Database, ModbusTcpClient, ModbusTcpServer, ServerConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    gridbus::logging::init("info");

    let mut server = ModbusTcpServer::new(ServerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        unit_id: 1,
        database_size: 100,
        initial_permits: 100,
    });

    // A second unit with pre-seeded sensor values.
    let mut sensors = Database::new(2, 100);
    sensors.set_input_register(0, 2310)?;
    sensors.set_discrete_input(0, true)?;
    server.add_database(sensors);

    server.start().await?;
    let addr = server
        .local_addr()
        .ok_or_else(|| anyhow::anyhow!("server did not report a bound address"))?;

    let mut notifications = server.subscribe();

    let mut client = ModbusTcpClient::new(ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        timeout: Duration::from_secs(5),
        server_delay: Duration::from_millis(20),
    });

    client.write_single_coil(1, 3, true).await?;
    let coils = client.read_coils(1, 0, 8).await?;
    info!("coils 0..8 on unit 1: {coils:?}");

    client
        .write_multiple_registers(1, 10, &[0x00, 0x2A, 0x01, 0x00])
        .await?;
    let words = client.read_holding_registers_as_u16(1, 10, 2).await?;
    info!("holding registers 10..12 on unit 1: {words:?}");

    let sensor = client.read_input_registers_as_u16(2, 0, 1).await?;
    info!("input register 0 on unit 2: {sensor:?}");

    while let Ok(note) = notifications.try_recv() {
        info!(
            "write notification: {:?} at {} x{}",
            note.kind, note.address, note.count
        );
    }

    server.stop();
    Ok(())
}
