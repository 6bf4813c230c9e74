//! Connection manager.
//!
//! Owns the single engine handle shared by every component. Any component
//! that observes an engine failure closes the handle for everyone; callers
//! recover with [`ConnectionManager::reconnect`].

use crate::engine::{Connector, VectorEngine};
use crate::{Error, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Whether a live handle is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// A handle is held.
    Connected,
    /// No handle; operations fail with [`Error::NotConnected`].
    Disconnected,
}

/// Holds the engine handle and the connector used to replace it.
pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    handle: Mutex<Option<Arc<dyn VectorEngine>>>,
}

impl ConnectionManager {
    /// Creates a disconnected manager.
    #[must_use]
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self::from_boxed(Box::new(connector))
    }

    /// Creates a disconnected manager from a boxed connector.
    #[must_use]
    pub fn from_boxed(connector: Box<dyn Connector>) -> Self {
        Self {
            connector,
            handle: Mutex::new(None),
        }
    }

    /// Creates a manager and establishes the first handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if the engine cannot be reached or
    /// does not report itself live.
    pub fn connect(connector: impl Connector + 'static) -> Result<Self> {
        let manager = Self::new(connector);
        if manager.reconnect() && manager.check_connection() {
            Ok(manager)
        } else {
            Err(Error::NotConnected)
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<dyn VectorEngine>>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        if self.slot().is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Liveness probe. Never fails: an unreachable engine or a missing
    /// handle both report `false`.
    #[must_use]
    pub fn check_connection(&self) -> bool {
        let handle = self.slot().clone();
        handle.is_some_and(|engine| engine.is_live())
    }

    /// Replaces the handle with a freshly established one.
    ///
    /// The previous handle, if any, is closed first. On failure the manager
    /// stays disconnected and returns `false`.
    pub fn reconnect(&self) -> bool {
        let previous = self.slot().take();
        if let Some(engine) = previous {
            if let Err(e) = engine.close() {
                tracing::warn!(error = %e, "Failed to close previous engine handle");
            }
        }

        match self.connector.connect() {
            Ok(engine) => {
                tracing::info!(
                    engine = engine.name(),
                    endpoint = %self.connector.target(),
                    "Connected to vector engine"
                );
                *self.slot() = Some(engine);
                metrics::counter!("threadstore_reconnect_total", "status" => "success").increment(1);
                true
            },
            Err(e) => {
                tracing::error!(
                    endpoint = %self.connector.target(),
                    error = %e,
                    "Failed to connect to vector engine"
                );
                metrics::counter!("threadstore_reconnect_total", "status" => "error").increment(1);
                false
            },
        }
    }

    /// Releases the handle.
    ///
    /// Returns `false` if there was nothing to close. Close errors are
    /// logged, never returned.
    pub fn close(&self) -> bool {
        let Some(engine) = self.slot().take() else {
            return false;
        };
        if let Err(e) = engine.close() {
            tracing::warn!(error = %e, "Error while closing engine handle");
        }
        tracing::debug!("Closed vector engine connection");
        true
    }

    /// Returns the live handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] when disconnected.
    pub(crate) fn live_handle(&self) -> Result<Arc<dyn VectorEngine>> {
        self.slot().clone().ok_or(Error::NotConnected)
    }

    /// Closes the handle after an engine failure.
    pub(crate) fn invalidate(&self, operation: &str, cause: &Error) {
        tracing::error!(operation, error = %cause, "Engine operation failed, closing connection");
        metrics::counter!("threadstore_connection_invalidated_total", "operation" => operation.to_string())
            .increment(1);
        self.close();
    }

    /// Passes an engine result through, invalidating the connection when
    /// it carries an engine failure.
    pub(crate) fn observe<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if !e.is_precondition() {
                self.invalidate(operation, e);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::InMemoryServer;

    #[test]
    fn test_connect_and_close() {
        let server = InMemoryServer::new();
        let manager = ConnectionManager::connect(server.connector()).expect("connect failed");

        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(manager.check_connection());

        assert!(manager.close());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.check_connection());
        assert!(!manager.close());
        assert!(matches!(manager.live_handle(), Err(Error::NotConnected)));
    }

    #[test]
    fn test_new_starts_disconnected() {
        let manager = ConnectionManager::new(InMemoryServer::new().connector());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.reconnect());
        assert!(manager.check_connection());
    }

    #[test]
    fn test_connect_fails_when_unreachable() {
        let server = InMemoryServer::new();
        server.set_available(false);
        assert!(matches!(
            ConnectionManager::connect(server.connector()),
            Err(Error::NotConnected)
        ));
    }

    #[test]
    fn test_reconnect_failure_stays_disconnected() {
        let server = InMemoryServer::new();
        let manager = ConnectionManager::connect(server.connector()).expect("connect failed");

        server.set_available(false);
        assert!(!manager.check_connection());
        assert!(!manager.reconnect());
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        server.set_available(true);
        assert!(manager.reconnect());
        assert!(manager.check_connection());
    }

    #[test]
    fn test_observe_invalidates_on_engine_failure_only() {
        let manager = ConnectionManager::connect(InMemoryServer::new().connector())
            .expect("connect failed");

        let precondition: Result<()> = Err(Error::InvalidInput("bad pattern".to_string()));
        assert!(manager.observe("delete_many", precondition).is_err());
        assert_eq!(manager.state(), ConnectionState::Connected);

        let failure: Result<()> = Err(Error::OperationFailed {
            operation: "near_vector".to_string(),
            cause: "timeout".to_string(),
        });
        assert!(manager.observe("near_vector", failure).is_err());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }
}
