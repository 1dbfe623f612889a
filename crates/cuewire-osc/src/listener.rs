//! Groups of dynamic listeners owned by one consumer

use crate::registry::{Handler, ListenerId, Registry};
use crate::types::ValueKind;

use std::sync::Arc;
use tracing::debug;

/// A set of registrations that are removed together.
///
/// The registry never controls the consumer's lifetime; instead the consumer
/// holds a `ListenerGroup` and everything it registered goes away when the
/// group is cleared or dropped.
#[derive(Debug)]
pub struct ListenerGroup {
    registry: Arc<Registry>,
    registrations: Vec<(String, ValueKind, ListenerId)>,
}

impl ListenerGroup {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            registrations: Vec::new(),
        }
    }

    /// Register `handler` at `address` as part of this group
    pub fn add(&mut self, address: impl Into<String>, handler: Handler) -> ListenerId {
        let address = address.into();
        let kind = handler.kind();
        let id = self.registry.register(address.clone(), handler);
        self.registrations.push((address, kind, id));
        id
    }

    /// Builder form of [`ListenerGroup::add`]
    pub fn with(mut self, address: impl Into<String>, handler: Handler) -> Self {
        self.add(address, handler);
        self
    }

    /// Number of live registrations
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Addresses and kinds this group listens to, in registration order
    pub fn bindings(&self) -> impl Iterator<Item = (&str, ValueKind)> {
        self.registrations
            .iter()
            .map(|(address, kind, _)| (address.as_str(), *kind))
    }

    /// Unregister everything in the group
    pub fn clear(&mut self) {
        if self.registrations.is_empty() {
            return;
        }
        let count = self.registrations.len();
        for (_, _, id) in self.registrations.drain(..) {
            self.registry.unregister(id);
        }
        debug!("Listener group released {} registrations", count);
    }
}

impl Drop for ListenerGroup {
    fn drop(&mut self) {
        self.clear();
    }
}
