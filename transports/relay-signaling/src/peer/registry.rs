//! Registry of live connections
//!
//! Tracks refer to their owning connection through a [`ConnectionRef`]
//! (registry + id) instead of a pointer, so a lookup after the connection
//! closed simply yields nothing.

use crate::peer::connection::ConnectionInner;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Identifier of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    /// Generate a new random id
    pub fn new() -> Self {
        ConnectionId(uuid::Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Live connections by id
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<ConnectionInner>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn register(&self, connection: Arc<ConnectionInner>) {
        let id = connection.id();
        self.connections.write().insert(id, connection);
        debug!("Registered connection {}", id);
    }

    pub(crate) fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.connections.write().remove(&id);
        if removed.is_some() {
            debug!("Unregistered connection {}", id);
        }
        removed.is_some()
    }

    pub(crate) fn get(&self, id: ConnectionId) -> Option<Arc<ConnectionInner>> {
        self.connections.read().get(&id).cloned()
    }

    /// Whether `id` refers to a live connection
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().contains_key(&id)
    }

    /// Number of live connections
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether no connection is live
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}

/// Non-owning reference to a connection
#[derive(Clone)]
pub struct ConnectionRef {
    id: ConnectionId,
    registry: Weak<ConnectionRegistry>,
}

impl ConnectionRef {
    /// Reference connection `id` in `registry`
    pub fn new(registry: &Arc<ConnectionRegistry>, id: ConnectionId) -> Self {
        Self {
            id,
            registry: Arc::downgrade(registry),
        }
    }

    /// Referenced connection id
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the connection is still live
    pub fn is_live(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.contains(self.id))
    }

    pub(crate) fn upgrade(&self) -> Option<Arc<ConnectionInner>> {
        self.registry.upgrade()?.get(self.id)
    }
}

impl fmt::Debug for ConnectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRef").field("id", &self.id).finish()
    }
}
