//! Address-keyed listener registry
//!
//! Two kinds of bindings route a message to handlers:
//!
//! - **Mappings** are added while the application is being configured and
//!   fire only for messages whose value kind equals the mapping's kind.
//! - **Listeners** are registered and unregistered at runtime. They receive
//!   coerced values: ints widen to floats, integral floats narrow to ints,
//!   numbers format as strings. Triggers only reach trigger handlers and
//!   trigger handlers only see triggers. An address-only message (no type
//!   tag) is an impulse: it fires trigger handlers and gives float handlers
//!   their `0.0` default.
//!
//! For every message all matching mappings run first, in declaration order,
//! then all matching listeners in registration order. A handler that returns
//! an error or panics is logged and skipped; the rest still run.

use crate::types::{OscMessage, OscValue, ValueKind};

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace, warn};

/// Error returned by a failing handler
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by every handler
pub type HandlerResult = Result<(), HandlerError>;

pub type FloatHandler = Arc<dyn Fn(f32) -> HandlerResult + Send + Sync>;
pub type IntHandler = Arc<dyn Fn(i32) -> HandlerResult + Send + Sync>;
pub type StringHandler = Arc<dyn Fn(&str) -> HandlerResult + Send + Sync>;
pub type TriggerHandler = Arc<dyn Fn() -> HandlerResult + Send + Sync>;

/// A typed message handler.
///
/// Cloning is cheap and keeps identity, so a clone can later be passed to
/// [`Registry::unregister_handler`].
#[derive(Clone)]
pub enum Handler {
    Float(FloatHandler),
    Int(IntHandler),
    String(StringHandler),
    Trigger(TriggerHandler),
}

impl Handler {
    pub fn float<F>(f: F) -> Self
    where
        F: Fn(f32) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Float(Arc::new(f))
    }

    pub fn int<F>(f: F) -> Self
    where
        F: Fn(i32) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Int(Arc::new(f))
    }

    pub fn string<F>(f: F) -> Self
    where
        F: Fn(&str) -> HandlerResult + Send + Sync + 'static,
    {
        Self::String(Arc::new(f))
    }

    pub fn trigger<F>(f: F) -> Self
    where
        F: Fn() -> HandlerResult + Send + Sync + 'static,
    {
        Self::Trigger(Arc::new(f))
    }

    /// Value kind this handler expects
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Float(_) => ValueKind::Float,
            Self::Int(_) => ValueKind::Int,
            Self::String(_) => ValueKind::String,
            Self::Trigger(_) => ValueKind::Trigger,
        }
    }

    /// Whether both refer to the same closure
    pub fn same_as(&self, other: &Handler) -> bool {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => Arc::ptr_eq(a, b),
            (Self::Int(a), Self::Int(b)) => Arc::ptr_eq(a, b),
            (Self::String(a), Self::String(b)) => Arc::ptr_eq(a, b),
            (Self::Trigger(a), Self::Trigger(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Call the handler with the message value converted to its kind.
    /// Returns `None` when the value cannot be converted.
    fn invoke(&self, message: &OscMessage) -> Option<Result<(), String>> {
        match (self, &message.value) {
            (Self::Trigger(f), _) if message.is_impulse() => Some(guarded(|| f())),
            (Self::Trigger(_), _) | (_, OscValue::Trigger) => None,
            (Self::Float(f), v) => v.as_f32().map(|x| guarded(|| f(x))),
            (Self::Int(f), v) => v.as_i32().map(|x| guarded(|| f(x))),
            (Self::String(f), v) => v.as_string().map(|s| guarded(|| f(&s))),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler::{}", self.kind())
    }
}

/// Run a handler, turning errors and panics into a message
fn guarded<F>(call: F) -> Result<(), String>
where
    F: FnOnce() -> HandlerResult,
{
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "handler panicked".to_string())),
    }
}

/// Static address binding configured before messages flow
#[derive(Debug, Clone)]
pub struct MappingEntry {
    pub address: String,
    pub handler: Handler,
}

impl MappingEntry {
    pub fn new(address: impl Into<String>, handler: Handler) -> Self {
        Self {
            address: address.into(),
            handler,
        }
    }

    /// Declared kind of the mapping
    pub fn kind(&self) -> ValueKind {
        self.handler.kind()
    }
}

/// Token identifying one dynamic registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Debug, Clone)]
struct Listener {
    id: ListenerId,
    handler: Handler,
}

#[derive(Debug, Default)]
struct RegistryState {
    mappings: Vec<MappingEntry>,
    listeners: HashMap<String, Vec<Listener>>,
    next_id: u64,
}

/// Outcome of dispatching one or more messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchReport {
    /// Messages dispatched
    pub messages: usize,
    /// Handlers that ran to completion
    pub invoked: usize,
    /// Handlers whose kind the value could not be converted to
    pub skipped: usize,
    /// Handlers that returned an error or panicked
    pub failed: usize,
}

impl DispatchReport {
    /// Accumulate another report into this one
    pub fn merge(&mut self, other: DispatchReport) {
        self.messages += other.messages;
        self.invoked += other.invoked;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    fn record(&mut self, address: &str, outcome: Option<Result<(), String>>) {
        match outcome {
            Some(Ok(())) => self.invoked += 1,
            Some(Err(e)) => {
                self.failed += 1;
                warn!("Handler for {} failed: {}", address, e);
            }
            None => self.skipped += 1,
        }
    }
}

/// Registry of mappings and dynamic listeners.
///
/// Share it as `Arc<Registry>`; every method takes `&self`. Handlers run
/// without the internal lock held, so they may register or unregister
/// listeners themselves.
#[derive(Debug, Default)]
pub struct Registry {
    state: Mutex<RegistryState>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with static mappings, kept in the given order
    pub fn with_mappings(mappings: impl IntoIterator<Item = MappingEntry>) -> Self {
        let registry = Self::new();
        for mapping in mappings {
            registry.add_mapping(mapping);
        }
        registry
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a static mapping
    pub fn add_mapping(&self, mapping: MappingEntry) {
        debug!("Mapping added: {} ({})", mapping.address, mapping.kind());
        self.state().mappings.push(mapping);
    }

    /// Number of static mappings
    pub fn mapping_count(&self) -> usize {
        self.state().mappings.len()
    }

    /// Register a dynamic listener. Registering the same handler twice makes it fire twice.
    pub fn register(&self, address: impl Into<String>, handler: Handler) -> ListenerId {
        let address = address.into();
        let mut state = self.state();
        let id = ListenerId(state.next_id);
        state.next_id += 1;
        debug!("{} listener registered: {}", handler.kind(), address);
        state
            .listeners
            .entry(address)
            .or_default()
            .push(Listener { id, handler });
        id
    }

    pub fn on_float<F>(&self, address: impl Into<String>, f: F) -> ListenerId
    where
        F: Fn(f32) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(address, Handler::float(f))
    }

    pub fn on_int<F>(&self, address: impl Into<String>, f: F) -> ListenerId
    where
        F: Fn(i32) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(address, Handler::int(f))
    }

    pub fn on_string<F>(&self, address: impl Into<String>, f: F) -> ListenerId
    where
        F: Fn(&str) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(address, Handler::string(f))
    }

    pub fn on_trigger<F>(&self, address: impl Into<String>, f: F) -> ListenerId
    where
        F: Fn() -> HandlerResult + Send + Sync + 'static,
    {
        self.register(address, Handler::trigger(f))
    }

    /// Remove a registration by token. Returns `false` if it was not registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut state = self.state();
        let mut emptied = None;
        let mut removed = false;

        for (address, listeners) in state.listeners.iter_mut() {
            if let Some(pos) = listeners.iter().position(|l| l.id == id) {
                listeners.remove(pos);
                removed = true;
                if listeners.is_empty() {
                    emptied = Some(address.clone());
                }
                break;
            }
        }

        if let Some(address) = emptied {
            state.listeners.remove(&address);
        }
        removed
    }

    /// Remove the first registration of `handler` at `address`
    pub fn unregister_handler(&self, address: &str, handler: &Handler) -> bool {
        let mut state = self.state();
        let Some(listeners) = state.listeners.get_mut(address) else {
            return false;
        };
        let Some(pos) = listeners.iter().position(|l| l.handler.same_as(handler)) else {
            return false;
        };
        listeners.remove(pos);
        if listeners.is_empty() {
            state.listeners.remove(address);
        }
        true
    }

    /// Number of dynamic listeners at `address`
    pub fn listener_count(&self, address: &str) -> usize {
        self.state().listeners.get(address).map_or(0, Vec::len)
    }

    /// Number of dynamic listeners across all addresses
    pub fn total_listeners(&self) -> usize {
        self.state().listeners.values().map(Vec::len).sum()
    }

    /// Addresses with at least one mapping or listener, sorted
    pub fn addresses(&self) -> Vec<String> {
        let state = self.state();
        let mut addresses: Vec<String> = state
            .mappings
            .iter()
            .map(|m| m.address.clone())
            .chain(state.listeners.keys().cloned())
            .collect();
        addresses.sort();
        addresses.dedup();
        addresses
    }

    /// Drop every dynamic listener. Mappings stay.
    pub fn clear_listeners(&self) {
        self.state().listeners.clear();
    }

    /// Deliver one message to every matching mapping, then every matching listener
    pub fn dispatch(&self, message: &OscMessage) -> DispatchReport {
        let kind = message.kind();
        let (mappings, listeners): (Vec<Handler>, Vec<Handler>) = {
            let state = self.state();
            let mappings = state
                .mappings
                .iter()
                .filter(|m| m.address == message.address)
                .filter(|m| {
                    m.kind() == kind || (m.kind() == ValueKind::Trigger && message.is_impulse())
                })
                .map(|m| m.handler.clone())
                .collect();
            let listeners = state
                .listeners
                .get(&message.address)
                .map(|ls| ls.iter().map(|l| l.handler.clone()).collect())
                .unwrap_or_default();
            (mappings, listeners)
        };

        let mut report = DispatchReport {
            messages: 1,
            ..Default::default()
        };

        for handler in &mappings {
            report.record(&message.address, handler.invoke(message));
        }
        for handler in &listeners {
            report.record(&message.address, handler.invoke(message));
        }

        trace!(
            "Dispatched {}: {} invoked, {} skipped, {} failed",
            message,
            report.invoked,
            report.skipped,
            report.failed
        );
        report
    }
}
