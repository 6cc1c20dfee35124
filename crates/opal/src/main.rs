use log::{error, info, warn, Level};
use opal_log::OpalLogger;
use rakopal::{Event, Reliability, Server};
use std::path::Path;
use tokio::time::Instant;

pub mod config;

#[tokio::main]
async fn main() {
    OpalLogger::init(Level::Info).expect("logger already installed");

    let start_time = Instant::now();

    let endpoint = match config::load(Path::new(config::FILE_NAME)) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            error!("failed to load {}: {e}", config::FILE_NAME);
            std::process::exit(1);
        }
    };
    let transport = match endpoint.transport() {
        Ok(transport) => transport,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let mut server = match Server::bind(endpoint.address, transport).await {
        Ok(server) => server,
        Err(e) => {
            error!("failed to bind {}: {e}", endpoint.address);
            std::process::exit(1);
        }
    };

    info!(
        "listening on {} with {} connection slots ({:.2}s)",
        server.local_addr(),
        endpoint.max_connections,
        start_time.elapsed().as_secs_f64()
    );

    // Demo behavior: log connection churn and echo every payload back on
    // its ordering channel.
    while let Some(event) = server.recv().await {
        match event {
            Event::Connected(address) => info!("{address} connected"),
            Event::Disconnected(address, reason) => info!("{address} disconnected: {reason:?}"),
            Event::Packet(address, payload) => {
                info!("{address} sent {} bytes", payload.len());
                if let Err(e) = server.send(address, payload, Reliability::ReliableOrdered, 0) {
                    warn!("echo to {address} failed: {e}");
                }
            }
        }
    }
}
