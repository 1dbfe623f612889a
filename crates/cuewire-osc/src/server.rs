//! OSC server: receive loop, inbound queue and registry wired together
//!
//! The host owns one [`OscServer`], calls [`OscServer::poll`] once per tick
//! from its own thread, and hands [`OscServer::registry`] clones to whatever
//! needs to listen.

use crate::queue::MessageQueue;
use crate::receiver::{ReceiveError, ReceiveLoop, ReceiverConfig, ReceiverStats};
use crate::registry::{DispatchReport, MappingEntry, Registry};
use crate::types::OscMessage;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// Lifecycle of a server. `Stopped` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Uninitialized,
    Running,
    Stopped,
}

pub struct OscServer {
    config: ReceiverConfig,
    registry: Arc<Registry>,
    queue: MessageQueue,
    receiver: Option<ReceiveLoop>,
    state: ServerState,
    totals: DispatchReport,
}

impl OscServer {
    /// Create an unstarted server with an empty registry
    pub fn new(config: ReceiverConfig) -> Self {
        Self::with_registry(config, Arc::new(Registry::new()))
    }

    /// Create an unstarted server that dispatches into an existing registry
    pub fn with_registry(config: ReceiverConfig, registry: Arc<Registry>) -> Self {
        let queue = MessageQueue::new(config.queue_policy);
        Self {
            config,
            registry,
            queue,
            receiver: None,
            state: ServerState::Uninitialized,
            totals: DispatchReport::default(),
        }
    }

    /// Create and start a server in one step
    pub fn bind(config: ReceiverConfig) -> Result<Self, ReceiveError> {
        let mut server = Self::new(config);
        server.start()?;
        Ok(server)
    }

    /// Add a static mapping. Mappings fire in the order they are added.
    pub fn add_mapping(&self, mapping: MappingEntry) {
        self.registry.add_mapping(mapping);
    }

    /// Shared handle to the registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Bind the socket and start the receive thread
    pub fn start(&mut self) -> Result<SocketAddr, ReceiveError> {
        match self.state {
            ServerState::Running => return Err(ReceiveError::AlreadyRunning),
            ServerState::Stopped => return Err(ReceiveError::Stopped),
            ServerState::Uninitialized => {}
        }

        let receiver = ReceiveLoop::spawn(self.config.clone(), self.queue.clone())?;
        let addr = receiver.local_addr();
        self.receiver = Some(receiver);
        self.state = ServerState::Running;
        info!("OSC server running on {}", addr);
        Ok(addr)
    }

    /// Address the receive socket is bound to, while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.receiver.as_ref().map(ReceiveLoop::local_addr)
    }

    /// Receive statistics, while running
    pub fn receiver_stats(&self) -> Option<ReceiverStats> {
        self.receiver.as_ref().map(ReceiveLoop::stats)
    }

    /// Dispatch totals since the server was created
    pub fn totals(&self) -> DispatchReport {
        self.totals
    }

    /// Number of messages waiting for the next poll
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Queue a message as if it had arrived on the socket
    pub fn inject(&self, message: OscMessage) -> bool {
        self.queue.push(message)
    }

    /// Take every queued message without dispatching
    pub fn drain(&self) -> Vec<OscMessage> {
        self.queue.drain()
    }

    /// Dispatch one message to the registry
    pub fn dispatch(&mut self, message: &OscMessage) -> DispatchReport {
        let report = self.registry.dispatch(message);
        self.totals.merge(report);
        report
    }

    /// Dispatch everything queued, oldest first. Call once per tick.
    pub fn poll(&mut self) -> DispatchReport {
        let mut report = DispatchReport::default();
        while let Some(message) = self.queue.pop() {
            report.merge(self.registry.dispatch(&message));
        }
        if report.messages > 0 {
            debug!(
                "Tick dispatched {} messages ({} handlers, {} failed)",
                report.messages, report.invoked, report.failed
            );
        }
        self.totals.merge(report);
        report
    }

    /// Stop receiving. Messages already queued can still be polled.
    pub fn shutdown(&mut self) {
        if self.state == ServerState::Stopped {
            return;
        }
        if let Some(mut receiver) = self.receiver.take() {
            receiver.stop();
        }
        self.state = ServerState::Stopped;
        info!(
            "OSC server stopped after dispatching {} messages",
            self.totals.messages
        );
    }
}

impl Drop for OscServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Handler;
    use crate::types::OscValue;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn test_state_machine() {
        let mut server = OscServer::new(ReceiverConfig::localhost(0));
        assert_eq!(server.state(), ServerState::Uninitialized);
        assert!(server.local_addr().is_none());

        server.start().unwrap();
        assert_eq!(server.state(), ServerState::Running);
        assert!(server.local_addr().is_some());
        assert!(matches!(server.start(), Err(ReceiveError::AlreadyRunning)));

        server.shutdown();
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(matches!(server.start(), Err(ReceiveError::Stopped)));
    }

    #[test]
    fn test_poll_dispatches_injected_messages_in_order() {
        let mut server = OscServer::new(ReceiverConfig::localhost(0));
        let last = Arc::new(AtomicI32::new(-1));
        let seen = last.clone();
        server.registry().on_int("/count", move |v| {
            // Strictly increasing means FIFO delivery
            assert!(v > seen.swap(v, Ordering::SeqCst));
            Ok(())
        });

        for i in 0..100 {
            server.inject(OscMessage::new("/count", i));
        }
        assert_eq!(server.pending(), 100);

        let report = server.poll();
        assert_eq!(report.messages, 100);
        assert_eq!(report.invoked, 100);
        assert_eq!(report.failed, 0);
        assert_eq!(last.load(Ordering::SeqCst), 99);
        assert_eq!(server.poll(), DispatchReport::default());
        assert_eq!(server.totals().messages, 100);
    }

    #[test]
    fn test_mappings_added_through_server() {
        let mut server = OscServer::new(ReceiverConfig::localhost(0));
        let value = Arc::new(AtomicI32::new(0));
        let v = value.clone();
        server.add_mapping(MappingEntry::new(
            "/cue/set",
            Handler::int(move |x| {
                v.store(x, Ordering::SeqCst);
                Ok(())
            }),
        ));

        server.inject(OscMessage::new("/cue/set", 5));
        server.inject(OscMessage::new("/cue/set", OscValue::Float(9.0)));
        server.poll();
        assert_eq!(value.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_drain_from_shared_server() {
        let server = Arc::new(OscServer::new(ReceiverConfig::localhost(0)));
        server.inject(OscMessage::new("/a", 1));
        server.inject(OscMessage::new("/b", 2));

        let shared = server.clone();
        let drained = std::thread::spawn(move || shared.drain()).join().unwrap();
        let addresses: Vec<_> = drained.iter().map(|m| m.address.as_str()).collect();
        assert_eq!(addresses, vec!["/a", "/b"]);
        assert_eq!(server.pending(), 0);
        assert_eq!(server.totals(), DispatchReport::default());
    }
}
