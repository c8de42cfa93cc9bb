//! Length-prefixed TCP variant of NetReceiver (§4.4), used for USB-forwarded
//! localhost transport. The socket2 configuration idiom follows
//! `network/udp.rs`, adapted to a listening stream socket with
//! SO_REUSEADDR/TCP_NODELAY and a framed read loop.

use std::io::Read;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::constants::{TCP_ACCEPT_TIMEOUT_MS, TCP_MAX_FRAME_LEN, TCP_READ_TIMEOUT_MS};
use crate::error::NetworkError;
use crate::net::Counters;
use crate::protocol::PacketCodec;
use crate::session::FrameSink;

/// Bind a listening socket on `port` with SO_REUSEADDR and an accept
/// timeout (~800 ms) so the accept loop can observe shutdown.
pub fn bind(port: u16) -> Result<TcpListener, NetworkError> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| NetworkError::ConfigureFailed(e.to_string()))?;

    let addr: SocketAddr = format!("0.0.0.0:{port}")
        .parse()
        .map_err(|e: std::net::AddrParseError| NetworkError::BindFailed(e.to_string()))?;
    socket
        .bind(&addr.into())
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
    socket
        .listen(1)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    let listener: TcpListener = socket.into();
    listener
        .set_nonblocking(false)
        .map_err(|e| NetworkError::ConfigureFailed(e.to_string()))?;
    Ok(listener)
}

/// Drives the accept loop until `running` is cleared or a fatal bind-level
/// error occurs. Each accepted connection is served to completion (or to
/// disconnect/timeout) before the next `accept` call.
pub fn run(
    listener: TcpListener,
    running: Arc<std::sync::atomic::AtomicBool>,
    counters: Arc<Counters>,
    sink: Arc<dyn FrameSink>,
) {
    while running.load(Ordering::Relaxed) {
        match accept_with_timeout(&listener) {
            Ok(Some(stream)) => {
                if let Err(e) = configure_stream(&stream) {
                    tracing::warn!("failed to configure accepted tcp stream: {e}");
                    continue;
                }
                serve_connection(stream, &running, &counters, &sink);
            }
            Ok(None) => continue,
            Err(e) => {
                tracing::error!("tcp accept error, ending session: {e}");
                running.store(false, Ordering::Relaxed);
                return;
            }
        }
    }
}

fn accept_with_timeout(listener: &TcpListener) -> std::io::Result<Option<TcpStream>> {
    // std's TcpListener::accept has no built-in timeout; use socket2's
    // read-timeout-bearing clone to bound the wait, then hand back a fresh
    // accept on the original listener once data is ready.
    let socket2_listener = Socket::from(listener.try_clone()?);
    socket2_listener.set_read_timeout(Some(Duration::from_millis(TCP_ACCEPT_TIMEOUT_MS)))?;
    match socket2_listener.accept() {
        Ok((socket, _addr)) => Ok(Some(socket.into())),
        Err(ref e)
            if e.kind() == std::io::ErrorKind::WouldBlock
                || e.kind() == std::io::ErrorKind::TimedOut =>
        {
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn configure_stream(stream: &TcpStream) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(Duration::from_millis(TCP_READ_TIMEOUT_MS)))?;
    Ok(())
}

fn serve_connection(
    mut stream: TcpStream,
    running: &Arc<std::sync::atomic::AtomicBool>,
    counters: &Arc<Counters>,
    sink: &Arc<dyn FrameSink>,
) {
    let mut scratch: Vec<u8> = Vec::with_capacity(4096);

    while running.load(Ordering::Relaxed) {
        let mut len_prefix = [0u8; 2];
        match stream.read_exact(&mut len_prefix) {
            Ok(()) => {}
            Err(ref e) if is_timeout(e) => continue,
            Err(_) => return, // disconnect or I/O error: close cleanly
        }

        let len = u16::from_le_bytes(len_prefix) as usize;
        if len == 0 || len > TCP_MAX_FRAME_LEN {
            counters.parse_err.fetch_add(1, Ordering::Relaxed);
            return;
        }

        scratch.clear();
        scratch.resize(len, 0);
        match stream.read_exact(&mut scratch) {
            Ok(()) => {}
            Err(ref e) if is_timeout(e) => {
                counters.parse_err.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Err(_) => return,
        }

        counters.packets.fetch_add(1, Ordering::Relaxed);
        counters
            .bytes
            .fetch_add((len + 2) as u64, Ordering::Relaxed);

        let decode_start = std::time::Instant::now();
        let parsed = PacketCodec::parse(&scratch);
        counters.record_decode(decode_start.elapsed());

        match parsed {
            Ok(frame) => {
                if !sink.accept(frame) {
                    counters.payload_err.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(_) => {
                counters.parse_err.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

fn is_timeout(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut
}
