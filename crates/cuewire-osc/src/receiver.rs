//! UDP receive loop for inbound OSC messages

use crate::codec::{self, MAX_DATAGRAM_SIZE};
use crate::queue::{MessageQueue, QueuePolicy};

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

/// Errors that can occur while starting or running the receiver
#[derive(Error, Debug)]
pub enum ReceiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Receiver is already running")]
    AlreadyRunning,

    #[error("Receiver has been stopped")]
    Stopped,
}

/// Configuration for the receive loop
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Local address to bind, usually `0.0.0.0:<port>`
    pub bind_addr: SocketAddr,
    /// Receive buffer size in bytes
    pub buffer_size: usize,
    /// How long a blocking receive waits before checking the stop flag
    pub poll_interval: Duration,
    /// How long `stop` waits for the thread before detaching it
    pub join_timeout: Duration,
    /// Overflow policy for the inbound queue. Read by [`OscServer`] when it
    /// creates its queue; [`ReceiveLoop::spawn`] pushes into whatever queue it
    /// is given.
    ///
    /// [`OscServer`]: crate::server::OscServer
    pub queue_policy: QueuePolicy,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            buffer_size: MAX_DATAGRAM_SIZE,
            poll_interval: Duration::from_millis(50),
            join_timeout: Duration::from_millis(100),
            queue_policy: QueuePolicy::Unbounded,
        }
    }
}

impl ReceiverConfig {
    /// Listen on all interfaces at `port`
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            ..Default::default()
        }
    }

    /// Listen on loopback only at `port`
    pub fn localhost(port: u16) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], port)),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    datagrams: AtomicU64,
    bytes: AtomicU64,
    decoded: AtomicU64,
    decode_errors: AtomicU64,
}

/// Statistics about received data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceiverStats {
    /// Datagrams read off the socket
    pub datagrams: u64,
    /// Total bytes received
    pub bytes: u64,
    /// Messages decoded and handed to the queue
    pub decoded: u64,
    /// Datagrams dropped because they failed to decode
    pub decode_errors: u64,
    /// Messages dropped by the queue overflow policy
    pub queue_drops: u64,
}

/// Background thread receiving OSC datagrams into a [`MessageQueue`]
pub struct ReceiveLoop {
    local_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    counters: Arc<Counters>,
    queue: MessageQueue,
    join_timeout: Duration,
    handle: Option<thread::JoinHandle<()>>,
}

impl ReceiveLoop {
    /// Bind the socket and start receiving.
    ///
    /// Binding happens on the calling thread so failures surface here.
    pub fn spawn(config: ReceiverConfig, queue: MessageQueue) -> Result<Self, ReceiveError> {
        let socket = UdpSocket::bind(config.bind_addr).map_err(|source| ReceiveError::Bind {
            addr: config.bind_addr,
            source,
        })?;
        // A zero timeout is rejected by the OS
        let poll_interval = config.poll_interval.max(Duration::from_millis(1));
        socket.set_read_timeout(Some(poll_interval))?;

        let local_addr = socket.local_addr()?;
        info!("OSC receiver listening on {}", local_addr);

        let stop = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(Counters::default());

        let handle = {
            let stop = stop.clone();
            let counters = counters.clone();
            let queue = queue.clone();
            let buffer_size = config.buffer_size.max(1);
            thread::Builder::new()
                .name(format!("osc-recv-{}", local_addr.port()))
                .spawn(move || receive_loop(socket, buffer_size, stop, counters, queue))?
        };

        Ok(Self {
            local_addr,
            stop,
            counters,
            queue,
            join_timeout: config.join_timeout,
            handle: Some(handle),
        })
    }

    /// Address the socket is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the receive thread is still alive
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Get statistics about received data
    pub fn stats(&self) -> ReceiverStats {
        ReceiverStats {
            datagrams: self.counters.datagrams.load(Ordering::Relaxed),
            bytes: self.counters.bytes.load(Ordering::Relaxed),
            decoded: self.counters.decoded.load(Ordering::Relaxed),
            decode_errors: self.counters.decode_errors.load(Ordering::Relaxed),
            queue_drops: self.queue.dropped(),
        }
    }

    /// Stop the thread and release the socket.
    ///
    /// Waits up to the configured join timeout. A thread that has not exited by
    /// then is detached; it exits at its next wake-up.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        debug!("Stopping OSC receiver on {}", self.local_addr);
        self.stop.store(true, Ordering::Release);

        let deadline = Instant::now() + self.join_timeout;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        if handle.is_finished() {
            if handle.join().is_err() {
                error!("OSC receive thread on {} panicked", self.local_addr);
            }
        } else {
            warn!(
                "OSC receive thread on {} did not stop within {:?}, detaching",
                self.local_addr, self.join_timeout
            );
        }

        let stats = self.stats();
        info!(
            "OSC receiver stopped. Received {} datagrams, {} bytes, {} decode errors",
            stats.datagrams, stats.bytes, stats.decode_errors
        );
    }
}

impl Drop for ReceiveLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn receive_loop(
    socket: UdpSocket,
    buffer_size: usize,
    stop: Arc<AtomicBool>,
    counters: Arc<Counters>,
    queue: MessageQueue,
) {
    let mut buf = vec![0u8; buffer_size];

    while !stop.load(Ordering::Acquire) {
        let (size, source) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                continue;
            }
            // ICMP port-unreachable from an earlier send surfaces here on some platforms
            Err(e) if e.kind() == ErrorKind::ConnectionReset => {
                trace!("Ignoring connection reset on receive socket");
                continue;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("OSC receive failed, stopping loop: {}", e);
                break;
            }
        };

        counters.datagrams.fetch_add(1, Ordering::Relaxed);
        counters.bytes.fetch_add(size as u64, Ordering::Relaxed);

        match codec::decode(&buf[..size]) {
            Ok(message) => {
                trace!("Received {} from {}", message, source);
                counters.decoded.fetch_add(1, Ordering::Relaxed);
                queue.push(message);
            }
            Err(e) => {
                counters.decode_errors.fetch_add(1, Ordering::Relaxed);
                debug!("Dropping {}-byte packet from {}: {}", size, source, e);
            }
        }
    }

    trace!("OSC receive loop exiting");
}
