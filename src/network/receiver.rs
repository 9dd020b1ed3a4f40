//! UDP receive loop
//!
//! A dedicated thread blocks on the socket with a short read timeout,
//! decodes every datagram and publishes frames into the latest-wins slot.
//! Socket failures after startup are retried with exponential backoff.

use parking_lot::Mutex;
use serde::Serialize;
use std::io::{self, ErrorKind};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::udp::create_socket;
use crate::audio::SharedFrameSlot;
use crate::config::NetworkConfig;
use crate::constants::{MAX_PACKET_SIZE, SOCKET_READ_TIMEOUT_MS};
use crate::error::NetworkError;
use crate::protocol::{PacketDecoder, PacketFormat};

const READ_TIMEOUT: Duration = Duration::from_millis(SOCKET_READ_TIMEOUT_MS);

#[derive(Default)]
struct Counters {
    packets: AtomicU64,
    bytes: AtomicU64,
    receive_errors: AtomicU64,
    reconnects: AtomicU64,
    last_packet: Mutex<Option<Instant>>,
}

/// Receiver statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReceiverStats {
    pub packets_received: u64,
    pub bytes_received: u64,
    pub invalid_packets: u64,
    pub frames_decoded: u64,
    pub eqstreamer_frames: u64,
    pub wled_v1_frames: u64,
    pub wled_v2_frames: u64,
    pub frames_overwritten: u64,
    pub receive_errors: u64,
    pub reconnects: u64,
    /// Milliseconds since the last datagram, if any arrived
    pub last_packet_age_ms: Option<u64>,
}

/// Owns the receive thread
pub struct AudioReceiver {
    decoder: Arc<PacketDecoder>,
    slot: SharedFrameSlot,
    counters: Arc<Counters>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

struct LoopContext {
    decoder: Arc<PacketDecoder>,
    slot: SharedFrameSlot,
    counters: Arc<Counters>,
    running: Arc<AtomicBool>,
    bind_address: String,
    port: u16,
    backoff: Duration,
    max_backoff: Duration,
}

impl AudioReceiver {
    pub fn new(format: PacketFormat, slot: SharedFrameSlot) -> Self {
        Self {
            decoder: Arc::new(PacketDecoder::new(format)),
            slot,
            counters: Arc::new(Counters::default()),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
            local_addr: None,
        }
    }

    /// Bind and spawn the receive thread; a bind failure is returned
    pub fn start(&mut self, config: &NetworkConfig) -> Result<(), NetworkError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let socket = create_socket(&config.bind_address, config.audio_port, READ_TIMEOUT)?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
        self.local_addr = Some(local_addr);
        self.running.store(true, Ordering::SeqCst);

        let ctx = LoopContext {
            decoder: self.decoder.clone(),
            slot: self.slot.clone(),
            counters: self.counters.clone(),
            running: self.running.clone(),
            bind_address: config.bind_address.clone(),
            port: local_addr.port(),
            backoff: Duration::from_millis(config.reconnect_backoff_ms),
            max_backoff: Duration::from_millis(config.max_reconnect_backoff_ms),
        };

        let handle = thread::Builder::new()
            .name("udp-receiver".into())
            .spawn(move || receive_loop(socket, ctx))
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
        self.handle = Some(handle);

        tracing::info!(
            "Listening for audio on udp://{} ({})",
            local_addr,
            self.decoder.mode()
        );
        Ok(())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Signal the thread and wait for it; the socket is dropped with it
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Receive thread panicked");
            }
            tracing::info!("Audio receiver stopped");
        }
    }

    /// Get statistics
    pub fn stats(&self) -> ReceiverStats {
        let decoder = self.decoder.stats();
        let last = *self.counters.last_packet.lock();
        ReceiverStats {
            packets_received: self.counters.packets.load(Ordering::Relaxed),
            bytes_received: self.counters.bytes.load(Ordering::Relaxed),
            invalid_packets: decoder.invalid_packets,
            frames_decoded: decoder.frames_decoded(),
            eqstreamer_frames: decoder.eqstreamer_frames,
            wled_v1_frames: decoder.wled_v1_frames,
            wled_v2_frames: decoder.wled_v2_frames,
            frames_overwritten: self.slot.overwritten(),
            receive_errors: self.counters.receive_errors.load(Ordering::Relaxed),
            reconnects: self.counters.reconnects.load(Ordering::Relaxed),
            last_packet_age_ms: last.map(|t| t.elapsed().as_millis() as u64),
        }
    }
}

impl Drop for AudioReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn receive_loop(socket: UdpSocket, ctx: LoopContext) {
    // One spare byte so oversized datagrams are visible as such
    let mut buf = vec![0u8; MAX_PACKET_SIZE + 1];
    let mut socket = Some(socket);
    let mut backoff = ctx.backoff;

    while ctx.running.load(Ordering::Relaxed) {
        let Some(sock) = socket.as_ref() else {
            match create_socket(&ctx.bind_address, ctx.port, READ_TIMEOUT) {
                Ok(s) => {
                    ctx.counters.reconnects.fetch_add(1, Ordering::Relaxed);
                    tracing::info!("Audio socket reopened on port {}", ctx.port);
                    socket = Some(s);
                    backoff = ctx.backoff;
                }
                Err(e) => {
                    tracing::warn!("Reopening audio socket failed: {}, retry in {:?}", e, backoff);
                    sleep_while_running(&ctx.running, backoff);
                    backoff = (backoff * 2).min(ctx.max_backoff);
                }
            }
            continue;
        };

        match sock.recv_from(&mut buf) {
            Ok((len, src)) => {
                let now = Instant::now();
                ctx.counters.packets.fetch_add(1, Ordering::Relaxed);
                ctx.counters.bytes.fetch_add(len as u64, Ordering::Relaxed);
                *ctx.counters.last_packet.lock() = Some(now);

                if let Some(frame) = ctx.decoder.decode_at(&buf[..len], now) {
                    tracing::trace!("{:?} frame from {}", frame.format, src);
                    ctx.slot.publish(frame);
                }
            }
            Err(e) => {
                if let Some(err) = recv_error(e) {
                    ctx.counters.receive_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("{}, reopening socket", err);
                    socket = None;
                }
            }
        }
    }
}

/// Timeouts and interrupts are part of polling; anything else means the
/// socket has to be reopened
fn recv_error(err: io::Error) -> Option<NetworkError> {
    match err.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted => None,
        _ => Some(NetworkError::ReceiveFailed(err.to_string())),
    }
}

fn sleep_while_running(running: &AtomicBool, total: Duration) {
    let deadline = Instant::now() + total;
    while running.load(Ordering::Relaxed) {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            break;
        }
        thread::sleep(left.min(READ_TIMEOUT));
    }
}
