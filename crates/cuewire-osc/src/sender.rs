//! UDP sender for outbound OSC messages

use crate::codec::{self, EncodeError};
use crate::command::{Command, CommandError};
use crate::types::OscValue;

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Errors that can occur during send operations
#[derive(Error, Debug)]
pub enum SendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid destination: {0}")]
    InvalidAddress(String),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),
}

/// Configuration for the sender
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Destination host name or IP
    pub host: String,
    /// Destination UDP port
    pub port: u16,
    /// Prefix the command adapter prepends to addresses
    pub prefix: String,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 17200,
            prefix: String::new(),
        }
    }
}

impl SenderConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }
}

/// Socket plus the address it sends to
#[derive(Debug)]
struct Destination {
    socket: UdpSocket,
    target: SocketAddr,
}

impl Destination {
    fn open(host: &str, port: u16) -> Result<Self, SendError> {
        let target = (host, port)
            .to_socket_addrs()
            .map_err(|e| SendError::InvalidAddress(format!("{host}:{port}: {e}")))?
            .next()
            .ok_or_else(|| SendError::InvalidAddress(format!("{host}:{port}")))?;

        let local = if target.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(local)?;
        if target.ip().is_multicast() || target.ip() == Ipv4Addr::BROADCAST {
            socket.set_broadcast(true)?;
        }

        Ok(Self { socket, target })
    }
}

#[derive(Debug, Default)]
struct Counters {
    messages: AtomicU64,
    bytes: AtomicU64,
    failures: AtomicU64,
}

/// Statistics about sent data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SenderStats {
    /// Datagrams sent
    pub messages_sent: u64,
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Sends that failed or had no destination
    pub failures: u64,
}

/// OSC sender bound to one destination at a time.
///
/// Every method takes `&self`; share it as `Arc<OscSender>`. The destination
/// sits behind a read-write lock, so a send in progress always completes
/// against the destination it started with.
#[derive(Debug)]
pub struct OscSender {
    destination: RwLock<Option<Destination>>,
    prefix: String,
    counters: Counters,
}

impl OscSender {
    /// Open a sender, failing if the destination cannot be resolved or bound
    pub fn connect(config: SenderConfig) -> Result<Self, SendError> {
        let destination = Destination::open(&config.host, config.port)?;
        info!("OSC sender targeting {}", destination.target);
        Ok(Self::from_parts(Some(destination), config.prefix))
    }

    /// Open a sender, logging instead of failing.
    ///
    /// If the destination cannot be opened, sends are no-ops until
    /// [`OscSender::retarget`] succeeds.
    pub fn detached(config: SenderConfig) -> Self {
        match Destination::open(&config.host, config.port) {
            Ok(destination) => {
                info!("OSC sender targeting {}", destination.target);
                Self::from_parts(Some(destination), config.prefix)
            }
            Err(e) => {
                warn!(
                    "OSC sender could not open {}:{}: {}; sends will be skipped",
                    config.host, config.port, e
                );
                Self::from_parts(None, config.prefix)
            }
        }
    }

    fn from_parts(destination: Option<Destination>, prefix: String) -> Self {
        Self {
            destination: RwLock::new(destination),
            prefix,
            counters: Counters::default(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<Destination>> {
        self.destination.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Destination>> {
        self.destination.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current destination, if any
    pub fn target(&self) -> Option<SocketAddr> {
        self.read().as_ref().map(|d| d.target)
    }

    /// Prefix applied by [`OscSender::send_command`]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Send an address-only message
    pub fn send(&self, address: &str) -> Result<bool, SendError> {
        self.send_message(address, None)
    }

    /// Send an address with one value
    pub fn send_value(&self, address: &str, value: impl Into<OscValue>) -> Result<bool, SendError> {
        self.send_message(address, Some(&value.into()))
    }

    /// Parse an `address:value` command, apply the prefix and send it
    pub fn send_command(&self, text: &str) -> Result<bool, SendError> {
        let command = Command::parse_with_prefix(text, &self.prefix).map_err(|e| {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            e
        })?;
        self.send_message(&command.address, command.value.as_ref())
    }

    /// Encode and send one datagram.
    ///
    /// Returns `Ok(false)` without sending when there is no destination.
    pub fn send_message(&self, address: &str, value: Option<&OscValue>) -> Result<bool, SendError> {
        let bytes = codec::try_encode(address, value).map_err(|e| {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            warn!("Not sending {}: {}", address, e);
            e
        })?;

        let destination = self.read();
        let Some(destination) = destination.as_ref() else {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            warn!("OSC sender has no destination, skipping {}", address);
            return Ok(false);
        };

        match destination.socket.send_to(&bytes, destination.target) {
            Ok(sent) => {
                self.counters.messages.fetch_add(1, Ordering::Relaxed);
                self.counters.bytes.fetch_add(sent as u64, Ordering::Relaxed);
                trace!("Sent {} ({} bytes) to {}", address, sent, destination.target);
                Ok(true)
            }
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!("Failed to send {} to {}: {}", address, destination.target, e);
                Err(e.into())
            }
        }
    }

    /// Point the sender at a new destination.
    ///
    /// The new socket is opened before the swap; on failure the old
    /// destination stays in place.
    pub fn retarget(&self, host: &str, port: u16) -> Result<SocketAddr, SendError> {
        let destination = Destination::open(host, port)?;
        let target = destination.target;
        let previous = self.write().replace(destination);
        match previous {
            Some(old) => info!("OSC sender retargeted {} -> {}", old.target, target),
            None => info!("OSC sender targeting {}", target),
        }
        Ok(target)
    }

    /// Get statistics about sent data
    pub fn stats(&self) -> SenderStats {
        SenderStats {
            messages_sent: self.counters.messages.load(Ordering::Relaxed),
            bytes_sent: self.counters.bytes.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    /// Send one message from a throwaway socket with broadcast enabled
    pub fn announce(
        target: SocketAddr,
        address: &str,
        value: Option<&OscValue>,
    ) -> Result<(), SendError> {
        let bytes = codec::try_encode(address, value)?;
        let local = if target.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(local)?;
        socket.set_broadcast(true)?;
        socket.send_to(&bytes, target)?;
        debug!("Announced {} to {}", address, target);
        Ok(())
    }

    /// Announce on the local network via 255.255.255.255
    pub fn broadcast(port: u16, address: &str, value: Option<&OscValue>) -> Result<(), SendError> {
        Self::announce(SocketAddr::from((Ipv4Addr::BROADCAST, port)), address, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn listener() -> (UdpSocket, u16) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, port)
    }

    fn recv(socket: &UdpSocket) -> crate::types::OscMessage {
        let mut buf = [0u8; 1024];
        let (size, _) = socket.recv_from(&mut buf).unwrap();
        codec::decode(&buf[..size]).unwrap()
    }

    #[test]
    fn test_sender_config_default() {
        let config = SenderConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 17200);
        assert!(config.prefix.is_empty());
    }

    #[test]
    fn test_send_value() {
        let (socket, port) = listener();
        let sender = OscSender::connect(SenderConfig::new("127.0.0.1", port)).unwrap();

        assert!(sender.send_value("/light/level", 0.25f32).unwrap());
        let message = recv(&socket);
        assert_eq!(message.address, "/light/level");
        assert_eq!(message.value, OscValue::Float(0.25));

        let stats = sender.stats();
        assert_eq!(stats.messages_sent, 1);
        assert_eq!(stats.bytes_sent, 24);
    }

    #[test]
    fn test_send_command_applies_prefix() {
        let (socket, port) = listener();
        let config = SenderConfig {
            prefix: "/show".to_string(),
            ..SenderConfig::new("127.0.0.1", port)
        };
        let sender = OscSender::connect(config).unwrap();

        sender.send_command("/cue/set:5").unwrap();
        let message = recv(&socket);
        assert_eq!(message.address, "/show/cue/set");
        assert_eq!(message.value, OscValue::Int(5));

        assert!(matches!(
            sender.send_command(""),
            Err(SendError::Command(CommandError::Empty))
        ));
    }

    #[test]
    fn test_retarget_switches_destination() {
        let (first, first_port) = listener();
        let (second, second_port) = listener();
        let sender = OscSender::connect(SenderConfig::new("127.0.0.1", first_port)).unwrap();

        sender.send_value("/n", 1).unwrap();
        let target = sender.retarget("127.0.0.1", second_port).unwrap();
        assert_eq!(target.port(), second_port);
        assert_eq!(sender.target(), Some(target));
        sender.send_value("/n", 2).unwrap();

        assert_eq!(recv(&first).value, OscValue::Int(1));
        assert_eq!(recv(&second).value, OscValue::Int(2));
    }

    #[test]
    fn test_failed_retarget_keeps_old_destination() {
        let (_socket, port) = listener();
        let sender = OscSender::connect(SenderConfig::new("127.0.0.1", port)).unwrap();
        let before = sender.target();

        assert!(sender.retarget("host.invalid", 9000).is_err());
        assert_eq!(sender.target(), before);
    }

    #[test]
    fn test_detached_sender_skips_sends() {
        let sender = OscSender::detached(SenderConfig::new("host.invalid", 9000));
        assert!(sender.target().is_none());
        assert!(!sender.send("/nowhere").unwrap());
        assert_eq!(sender.stats().failures, 1);
    }

    #[test]
    fn test_invalid_address_is_rejected() {
        let (_socket, port) = listener();
        let sender = OscSender::connect(SenderConfig::new("127.0.0.1", port)).unwrap();
        assert!(matches!(
            sender.send(""),
            Err(SendError::Encode(EncodeError::EmptyAddress))
        ));
    }

    #[test]
    fn test_concurrent_sends_and_retarget() {
        let (first, first_port) = listener();
        let (second, second_port) = listener();
        let sender =
            Arc::new(OscSender::connect(SenderConfig::new("127.0.0.1", first_port)).unwrap());

        let workers: Vec<_> = (0..4)
            .map(|w| {
                let sender = sender.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        sender.send_value("/w", w * 100 + i).unwrap();
                    }
                })
            })
            .collect();
        sender.retarget("127.0.0.1", second_port).unwrap();
        for worker in workers {
            worker.join().unwrap();
        }

        // Every datagram landed on exactly one of the two destinations
        let count = |socket: &UdpSocket| {
            socket
                .set_read_timeout(Some(Duration::from_millis(200)))
                .unwrap();
            let mut buf = [0u8; 64];
            let mut n = 0;
            while socket.recv_from(&mut buf).is_ok() {
                n += 1;
            }
            n
        };
        assert_eq!(count(&first) + count(&second), 100);
        assert_eq!(sender.stats().messages_sent, 100);
    }

    #[test]
    fn test_announce() {
        let (socket, port) = listener();
        OscSender::announce(
            SocketAddr::from(([127, 0, 0, 1], port)),
            "/setAddress",
            Some(&OscValue::from("192.168.1.20")),
        )
        .unwrap();
        let message = recv(&socket);
        assert_eq!(message.address, "/setAddress");
        assert_eq!(message.value, OscValue::from("192.168.1.20"));
    }
}
