#![allow(dead_code)]

use bytes::Bytes;
use log::Level;
use opal_bitstream::BitStream;
use opal_log::OpalLogger;
use rakopal::protocol::offline::OfflineMessage;
use rakopal::protocol::packet::{self, EncapsulatedPacket};
use rakopal::protocol::ID_CONNECTION_REQUEST;
use rakopal::{consts, Config, Event, Reliability};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

pub fn init_logger() {
    let _ = OpalLogger::init(Level::Debug);
}

/// Shrunk timers so the scenarios finish in test time; semantics are
/// unchanged.
pub fn fast_config() -> Config {
    Config {
        min_rto: Duration::from_millis(100),
        ping_interval: Duration::from_millis(500),
        timeout: Duration::from_secs(5),
        ..Config::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

/// Spawns a UDP forwarder between one client and `server`. The first
/// datagram from a non-server address pins the client. `drop_fn` sees
/// each datagram's direction and per-direction index and returns `true`
/// to drop it.
pub async fn proxy<F>(server: SocketAddr, mut drop_fn: F) -> SocketAddr
where
    F: FnMut(Direction, u64) -> bool + Send + 'static,
{
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind proxy");
    let addr = socket.local_addr().expect("proxy addr");

    tokio::spawn(async move {
        let mut client: Option<SocketAddr> = None;
        let mut counts = [0u64; 2];
        let mut buf = [0u8; 2048];
        loop {
            let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                break;
            };
            let (direction, destination) = if from == server {
                (Direction::ServerToClient, client)
            } else {
                client = Some(from);
                (Direction::ClientToServer, Some(server))
            };
            let slot = direction as usize;
            let index = counts[slot];
            counts[slot] += 1;
            if drop_fn(direction, index) {
                continue;
            }
            if let Some(destination) = destination {
                let _ = socket.send_to(&buf[..len], destination).await;
            }
        }
    });

    addr
}

/// Waits up to five seconds for the next event.
pub async fn expect_event(recv: impl Future<Output = Option<Event>>) -> Event {
    timeout(Duration::from_secs(5), recv)
        .await
        .expect("timed out waiting for event")
        .expect("endpoint closed")
}

/// Hand-rolled peer: performs the full handshake against `server_addr`
/// (empty password) and returns the raw socket. The caller decides
/// whether to keep talking or go silent.
pub async fn raw_handshake(server_addr: SocketAddr) -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind raw peer");

    socket
        .send_to(
            &OfflineMessage::OpenConnectionRequest {
                protocol_version: consts::PROTOCOL_VERSION,
            }
            .encode(),
            server_addr,
        )
        .await
        .expect("send open connection request");

    let mut buf = [0u8; 2048];
    timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
        .await
        .expect("no open connection reply")
        .expect("socket closed");

    let request = EncapsulatedPacket {
        reliability: Reliability::Reliable,
        message_number: Some(0),
        order_channel: None,
        order_index: None,
        payload: Bytes::from_static(&[ID_CONNECTION_REQUEST]),
    };
    let mut stream = BitStream::new();
    packet::write_payload_header(&mut stream, 0);
    stream.align_write();
    stream.write_bytes(&request.to_bytes().expect("encode connection request"));
    socket
        .send_to(&stream.into_bytes(), server_addr)
        .await
        .expect("send connection request");

    socket
}
