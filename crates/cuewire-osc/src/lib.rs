//! OSC over UDP for show control
//!
//! This crate receives OSC messages on a background thread, queues them, and
//! dispatches them to typed handlers registered by address once per host tick.
//! It also sends OSC messages to a destination that can be changed at runtime.

pub mod codec;
pub mod command;
pub mod listener;
pub mod queue;
pub mod receiver;
pub mod registry;
pub mod sender;
pub mod server;
pub mod throttle;
pub mod types;

// Re-export commonly used types
pub use codec::{decode, encode, try_encode, DecodeError, EncodeError, MAX_DATAGRAM_SIZE};
pub use command::{parse_command, parse_value, Command, CommandError};
pub use listener::ListenerGroup;
pub use queue::{MessageQueue, QueuePolicy};
pub use receiver::{ReceiveError, ReceiveLoop, ReceiverConfig, ReceiverStats};
pub use registry::{
    DispatchReport, Handler, HandlerError, HandlerResult, ListenerId, MappingEntry, Registry,
};
pub use sender::{OscSender, SendError, SenderConfig, SenderStats};
pub use server::{OscServer, ServerState};
pub use throttle::{PeriodicSender, SendThrottle};
pub use types::{OscMessage, OscValue, TypeTag, ValueKind};
