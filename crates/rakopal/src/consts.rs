use std::time::Duration;

/// On-wire ceiling for one datagram, UDP payload bytes.
pub const MTU_SIZE: usize = 1492;
/// Worst-case framing overhead for a single encapsulated packet plus the
/// datagram header, rounded up.
pub const MAX_HEADER_OVERHEAD: usize = 32;
/// Largest user payload `send` accepts; anything bigger is rejected
/// instead of fragmented.
pub const MAX_PAYLOAD_SIZE: usize = MTU_SIZE - MAX_HEADER_OVERHEAD;

/// Number of independent ordering lanes per peer (5-bit field).
pub const ORDERING_CHANNELS: u8 = 32;

/// Protocol revision byte carried in open-connection requests.
pub const PROTOCOL_VERSION: u8 = 6;

/// Reliable message numbers further than this above the dedup watermark
/// are discarded unseen.
pub const RECEIVE_WINDOW: u32 = 2048;
/// Unacknowledged reliable messages beyond this count mean the peer has
/// stopped acking; it gets disconnected.
pub const RESEND_QUEUE_LIMIT: usize = 4096;

/// Event-loop cadence for ACK flush, coalescing and retransmit checks.
pub const TICK_INTERVAL: Duration = Duration::from_millis(10);
/// Re-send cadence for the unanswered open-connection request of an
/// outbound connect.
pub const OPEN_CONNECTION_RETRY: Duration = Duration::from_millis(500);

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MIN_RTO: Duration = Duration::from_secs(1);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_RESENDS: u32 = 10;
pub const DEFAULT_MAX_CONNECTIONS: usize = 64;
