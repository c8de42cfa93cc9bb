//! UDP datagram variant of NetReceiver (§4.4). Socket2 setup follows
//! `network/udp.rs::create_socket`/`configure_socket`; the receive-loop
//! shape follows `network/receiver.rs::AudioReceiver`, generalized from
//! Opus-track demuxing to direct `PacketCodec` feeding.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::constants::{UDP_RECV_BUFFER_BYTES, UDP_RECV_TIMEOUT_MS, UDP_SOCKET_RECV_BUFFER_BYTES};
use crate::error::NetworkError;
use crate::net::Counters;
use crate::protocol::{PacketCodec, RejectReason};
use crate::session::FrameSink;

/// Bind and configure a UDP socket for receiving on `port`, per §4.4: a
/// 256 KiB receive buffer and a bounded receive timeout so the loop can
/// observe shutdown.
pub fn bind(port: u16) -> Result<std::net::UdpSocket, NetworkError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| NetworkError::ConfigureFailed(e.to_string()))?;
    socket
        .set_recv_buffer_size(UDP_SOCKET_RECV_BUFFER_BYTES)
        .map_err(|e| NetworkError::ConfigureFailed(e.to_string()))?;
    socket
        .set_read_timeout(Some(Duration::from_millis(UDP_RECV_TIMEOUT_MS)))
        .map_err(|e| NetworkError::ConfigureFailed(e.to_string()))?;

    let addr: SocketAddr = format!("0.0.0.0:{port}")
        .parse()
        .map_err(|e: std::net::AddrParseError| NetworkError::BindFailed(e.to_string()))?;
    socket
        .bind(&addr.into())
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    Ok(socket.into())
}

/// Drives the UDP receive loop until `running` is cleared. Per §7's
/// propagation policy, a UDP recv error is transient transport noise, not a
/// fatal condition: it is logged and counted as a parse error, and the loop
/// continues. Nothing here ever joins or signals other threads itself; the
/// supervisor alone does that.
pub fn run(
    socket: std::net::UdpSocket,
    running: Arc<std::sync::atomic::AtomicBool>,
    counters: Arc<Counters>,
    sink: Arc<dyn FrameSink>,
) {
    let mut buf = [0u8; UDP_RECV_BUFFER_BYTES];

    while running.load(Ordering::Relaxed) {
        match socket.recv_from(&mut buf) {
            Ok((len, _addr)) => {
                counters.packets.fetch_add(1, Ordering::Relaxed);
                counters.bytes.fetch_add(len as u64, Ordering::Relaxed);

                let decode_start = std::time::Instant::now();
                let parsed = PacketCodec::parse(&buf[..len]);
                counters.record_decode(decode_start.elapsed());

                match parsed {
                    Ok(frame) => {
                        if !sink.accept(frame) {
                            counters.payload_err.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(RejectReason::TooShort | RejectReason::TruncatedPayload) => {
                        counters.parse_err.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(_) => {
                        counters.parse_err.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            Err(ref e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                tracing::warn!("udp receive error: {e}");
                counters.parse_err.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        }
    }
}
