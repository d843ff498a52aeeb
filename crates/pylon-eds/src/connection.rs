//! Handle for one long-lived proxy stream.
//!
//! The transport layer owns the stream; the core holds these handles in
//! cluster entries and sends typed responses through them. A send blocks
//! when the transport is backpressured and fails once the peer is gone.

use std::fmt;

use parking_lot::RwLock;
use pylon_proto::DiscoveryResponse;
use tokio::sync::mpsc;

use crate::error::DiscoveryError;

/// A connected data-plane peer.
pub struct Connection {
    id: String,
    peer_addr: String,
    watched: RwLock<Vec<String>>,
    sender: mpsc::Sender<DiscoveryResponse>,
}

impl Connection {
    pub fn new(
        id: impl Into<String>,
        peer_addr: impl Into<String>,
        sender: mpsc::Sender<DiscoveryResponse>,
    ) -> Self {
        Self {
            id: id.into(),
            peer_addr: peer_addr.into(),
            watched: RwLock::new(Vec::new()),
            sender,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Peer address, for diagnostics only.
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// The cluster names this peer is watching.
    pub fn clusters(&self) -> Vec<String> {
        self.watched.read().clone()
    }

    /// Starts watching a cluster. Duplicate watches are ignored.
    pub fn watch(&self, cluster_name: &str) {
        let mut watched = self.watched.write();
        if !watched.iter().any(|c| c == cluster_name) {
            watched.push(cluster_name.to_owned());
        }
    }

    /// Sends a response down the stream.
    ///
    /// Blocks on transport backpressure; fails when the receiver is gone,
    /// in which case the caller is expected to close the stream.
    pub async fn send(&self, response: DiscoveryResponse) -> Result<(), DiscoveryError> {
        self.sender
            .send(response)
            .await
            .map_err(|_| DiscoveryError::SendFailure(self.id.clone()))
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("watched", &self.watched.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn watch_dedupes_cluster_names() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = Connection::new("node-1", "10.0.0.1:1234", tx);
        conn.watch("outbound|80||a.ns");
        conn.watch("outbound|80||b.ns");
        conn.watch("outbound|80||a.ns");
        assert_eq!(conn.clusters(), vec!["outbound|80||a.ns", "outbound|80||b.ns"]);
    }

    #[tokio::test]
    async fn send_fails_when_peer_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        let conn = Connection::new("node-1", "10.0.0.1:1234", tx);
        drop(rx);

        let response = DiscoveryResponse {
            type_url: pylon_proto::ENDPOINT_TYPE_URL.into(),
            version_info: "1".into(),
            nonce: "n".into(),
            resources: Vec::new(),
        };
        let err = conn.send(response).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::SendFailure(ref id) if id == "node-1"));
    }
}
