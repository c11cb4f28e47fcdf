//! RealtimeHub - WebSocket Distribution
//!
//! ## Responsibilities
//!
//! - WebSocket connection management
//! - Frame fan-out with per-client latency bookkeeping
//! - Alert state broadcasting
//!
//! Note: frames are pushed as base64 JPEG sized per client latency; a
//! client that reports itself too far behind gets alert state only.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Hub message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum HubMessage {
    /// One video frame, sized for the receiving client
    Frame(FrameMessage),
    /// Combined alert state
    Alert(AlertMessage),
}

/// Frame message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMessage {
    /// Server timestamp (ISO8601), echoed back by clients as latency reports
    pub time: String,
    /// Base64 JPEG; None when the client is too far behind for pixels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// Alert state message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertMessage {
    pub time: String,
    pub alert: bool,
    pub audio: f64,
    pub video: f64,
    pub enabled: bool,
}

/// Inbound client report: how far behind the server clock the client
/// observed itself on the last frame.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientReport {
    pub time_diff: f64,
}

/// Client connection
struct ClientConnection {
    id: Uuid,
    latency_secs: Option<f64>,
    tx: mpsc::UnboundedSender<String>,
}

/// RealtimeHub instance
pub struct RealtimeHub {
    connections: RwLock<HashMap<Uuid, ClientConnection>>,
    connection_count: AtomicU64,
}

impl RealtimeHub {
    /// Create new RealtimeHub
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            connection_count: AtomicU64::new(0),
        }
    }

    /// Register a new client
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let conn = ClientConnection {
            id,
            latency_secs: None,
            tx,
        };

        {
            let mut connections = self.connections.write().await;
            connections.insert(id, conn);
        }

        self.connection_count.fetch_add(1, Ordering::Relaxed);

        tracing::info!(connection_id = %id, "Client connected");

        (id, rx)
    }

    /// Unregister a client
    pub async fn unregister(&self, id: &Uuid) {
        let mut connections = self.connections.write().await;
        if connections.remove(id).is_some() {
            self.connection_count.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(connection_id = %id, "Client disconnected");
        }
    }

    /// Record a client's reported latency.
    pub async fn update_latency(&self, id: &Uuid, latency_secs: f64) {
        let mut connections = self.connections.write().await;
        if let Some(conn) = connections.get_mut(id) {
            conn.latency_secs = Some(latency_secs);
        }
    }

    /// Connected clients with their last reported latency.
    pub async fn clients(&self) -> Vec<(Uuid, Option<f64>)> {
        let connections = self.connections.read().await;
        connections
            .values()
            .map(|c| (c.id, c.latency_secs))
            .collect()
    }

    /// Broadcast message to all clients
    pub async fn broadcast(&self, message: HubMessage) {
        let json = match serde_json::to_string(&message) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize message");
                return;
            }
        };

        let connections = self.connections.read().await;
        for conn in connections.values() {
            if let Err(e) = conn.tx.send(json.clone()) {
                tracing::warn!(connection_id = %conn.id, error = %e, "Failed to send message");
            }
        }
    }

    /// Send message to one client
    pub async fn send_to(&self, id: &Uuid, message: HubMessage) {
        let json = match serde_json::to_string(&message) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize message");
                return;
            }
        };

        let connections = self.connections.read().await;
        if let Some(conn) = connections.get(id) {
            if let Err(e) = conn.tx.send(json) {
                tracing::warn!(connection_id = %conn.id, error = %e, "Failed to send message");
            }
        }
    }

    /// Get connection count
    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_broadcast_unregister() {
        let hub = RealtimeHub::new();
        let (id, mut rx) = hub.register().await;
        assert_eq!(hub.connection_count(), 1);

        hub.broadcast(HubMessage::Alert(AlertMessage {
            time: "2026-01-01T00:00:00Z".to_string(),
            alert: true,
            audio: 0.7,
            video: 0.1,
            enabled: true,
        }))
        .await;

        let json = rx.recv().await.unwrap();
        assert!(json.contains("\"type\":\"alert\""));
        assert!(json.contains("\"alert\":true"));

        hub.unregister(&id).await;
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn latency_updates_show_in_client_listing() {
        let hub = RealtimeHub::new();
        let (id, _rx) = hub.register().await;

        let clients = hub.clients().await;
        assert_eq!(clients, vec![(id, None)]);

        hub.update_latency(&id, 0.42).await;
        let clients = hub.clients().await;
        assert_eq!(clients, vec![(id, Some(0.42))]);
    }

    #[tokio::test]
    async fn send_to_targets_one_client() {
        let hub = RealtimeHub::new();
        let (a, mut rx_a) = hub.register().await;
        let (_b, mut rx_b) = hub.register().await;

        hub.send_to(
            &a,
            HubMessage::Frame(FrameMessage {
                time: "2026-01-01T00:00:00Z".to_string(),
                data: None,
            }),
        )
        .await;

        assert!(rx_a.recv().await.unwrap().contains("\"type\":\"frame\""));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn frame_data_is_omitted_when_none() {
        let json = serde_json::to_string(&HubMessage::Frame(FrameMessage {
            time: "t".to_string(),
            data: None,
        }))
        .unwrap();
        assert!(!json.contains("\"data\":null"));
    }
}
