//! Live tunnel registry.
//!
//! Process-wide, in-memory, never persisted. A session exists only while an
//! agent holds a live connection. Every operation is best-effort: a send
//! racing a disconnect may fail and the caller just logs it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::error::TunnelError;
use crate::models::{CommandEnvelope, EndpointId};

/// Synchronous delivery channel to connected devices.
#[async_trait]
pub trait LiveTunnel: Send + Sync {
    /// Hands a command to the device's session without waiting.
    async fn send(&self, endpoint_id: EndpointId, command: CommandEnvelope)
        -> Result<(), TunnelError>;

    async fn is_connected(&self, endpoint_id: EndpointId) -> bool;

    /// Tears down the session of an endpoint, if any.
    async fn close(&self, endpoint_id: EndpointId) -> Result<(), TunnelError>;
}

struct TunnelSession {
    session_id: Uuid,
    sender: mpsc::Sender<CommandEnvelope>,
    last_activity: Instant,
}

/// The receiving half handed to the connection task of an agent.
#[derive(Debug)]
pub struct TunnelHandle {
    pub endpoint_id: EndpointId,
    pub session_id: Uuid,
    pub receiver: mpsc::Receiver<CommandEnvelope>,
}

/// Registry of live sessions keyed by endpoint.
pub struct TunnelRegistry {
    sessions: RwLock<HashMap<EndpointId, TunnelSession>>,
    capacity: usize,
}

impl TunnelRegistry {
    /// Creates a registry whose per-session channels hold up to `capacity` commands.
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Opens a session, replacing any previous session of the same endpoint.
    pub async fn connect(&self, endpoint_id: EndpointId) -> TunnelHandle {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let session_id = Uuid::new_v4();

        let replaced = self.sessions.write().await.insert(
            endpoint_id,
            TunnelSession {
                session_id,
                sender,
                last_activity: Instant::now(),
            },
        );
        if replaced.is_some() {
            tracing::debug!(endpoint_id = %endpoint_id, "Replaced existing tunnel session");
        }
        tracing::info!(endpoint_id = %endpoint_id, session_id = %session_id, "Tunnel opened");

        TunnelHandle {
            endpoint_id,
            session_id,
            receiver,
        }
    }

    /// Removes the session only if it is still `session_id`.
    ///
    /// A late disconnect of a session that was already replaced by a reconnect is a no-op.
    pub async fn disconnect(&self, endpoint_id: EndpointId, session_id: Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        let current = sessions
            .get(&endpoint_id)
            .is_some_and(|s| s.session_id == session_id);
        if current {
            sessions.remove(&endpoint_id);
            tracing::info!(endpoint_id = %endpoint_id, session_id = %session_id, "Tunnel closed");
        }
        current
    }

    /// Records agent activity on a session, deferring its idle timeout.
    pub async fn touch(&self, endpoint_id: EndpointId) {
        if let Some(session) = self.sessions.write().await.get_mut(&endpoint_id) {
            session.last_activity = Instant::now();
        }
    }

    /// Drops sessions idle for longer than `max_idle`. Returns the endpoints removed.
    pub async fn sweep_idle(&self, max_idle: Duration) -> Vec<EndpointId> {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<EndpointId> = sessions
            .iter()
            .filter(|(_, s)| s.last_activity.elapsed() > max_idle)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        expired
    }

    pub async fn connected_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drops every session. Called at shutdown.
    pub async fn shutdown(&self) {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        sessions.clear();
        tracing::info!(count, "Tunnel registry shut down");
    }
}

#[async_trait]
impl LiveTunnel for TunnelRegistry {
    async fn send(
        &self,
        endpoint_id: EndpointId,
        command: CommandEnvelope,
    ) -> Result<(), TunnelError> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(&endpoint_id)
            .ok_or(TunnelError::NotConnected(endpoint_id.get()))?;

        session.sender.try_send(command).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => TunnelError::Saturated(endpoint_id.get()),
            mpsc::error::TrySendError::Closed(_) => TunnelError::Closed(endpoint_id.get()),
        })
    }

    async fn is_connected(&self, endpoint_id: EndpointId) -> bool {
        self.sessions
            .read()
            .await
            .get(&endpoint_id)
            .is_some_and(|s| !s.sender.is_closed())
    }

    async fn close(&self, endpoint_id: EndpointId) -> Result<(), TunnelError> {
        self.sessions
            .write()
            .await
            .remove(&endpoint_id)
            .map(|_| ())
            .ok_or(TunnelError::NotConnected(endpoint_id.get()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CommandOperation, ResourceKind};

    fn envelope(path: &str) -> CommandEnvelope {
        CommandEnvelope {
            resource_type: ResourceKind::Stack,
            operation: CommandOperation::Add,
            path: path.to_string(),
            value: serde_json::Value::Null,
            version: 1,
        }
    }

    #[tokio::test]
    async fn test_send_to_connected_endpoint() {
        let registry = TunnelRegistry::new(4);
        let mut handle = registry.connect(EndpointId(1)).await;

        assert!(registry.is_connected(EndpointId(1)).await);
        registry
            .send(EndpointId(1), envelope("/edgestack/1"))
            .await
            .unwrap();
        let received = handle.receiver.recv().await.unwrap();
        assert_eq!(received.path, "/edgestack/1");
    }

    #[tokio::test]
    async fn test_send_without_tunnel_fails_fast() {
        let registry = TunnelRegistry::new(4);
        let err = registry
            .send(EndpointId(9), envelope("/edgestack/1"))
            .await
            .unwrap_err();
        assert_eq!(err, TunnelError::NotConnected(9));
        assert!(!registry.is_connected(EndpointId(9)).await);
    }

    #[tokio::test]
    async fn test_saturated_channel_does_not_block() {
        let registry = TunnelRegistry::new(1);
        let _handle = registry.connect(EndpointId(1)).await;
        registry
            .send(EndpointId(1), envelope("/edgestack/1"))
            .await
            .unwrap();
        let err = registry
            .send(EndpointId(1), envelope("/edgestack/2"))
            .await
            .unwrap_err();
        assert_eq!(err, TunnelError::Saturated(1));
    }

    #[tokio::test]
    async fn test_stale_disconnect_keeps_new_session() {
        let registry = TunnelRegistry::new(4);
        let old = registry.connect(EndpointId(1)).await;
        let _new = registry.connect(EndpointId(1)).await;

        assert!(!registry.disconnect(EndpointId(1), old.session_id).await);
        assert!(registry.is_connected(EndpointId(1)).await);
    }

    #[tokio::test]
    async fn test_dropped_receiver_reports_closed() {
        let registry = TunnelRegistry::new(4);
        let handle = registry.connect(EndpointId(1)).await;
        drop(handle);

        assert!(!registry.is_connected(EndpointId(1)).await);
        let err = registry
            .send(EndpointId(1), envelope("/edgestack/1"))
            .await
            .unwrap_err();
        assert_eq!(err, TunnelError::Closed(1));
    }

    #[tokio::test]
    async fn test_sweep_idle_and_shutdown() {
        let registry = TunnelRegistry::new(4);
        let _a = registry.connect(EndpointId(1)).await;
        let _b = registry.connect(EndpointId(2)).await;

        assert!(registry.sweep_idle(Duration::from_secs(60)).await.is_empty());
        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.touch(EndpointId(2)).await;
        let expired = registry.sweep_idle(Duration::from_millis(10)).await;
        assert_eq!(expired, vec![EndpointId(1)]);
        assert_eq!(registry.connected_count().await, 1);

        registry.shutdown().await;
        assert_eq!(registry.connected_count().await, 0);
    }
}
