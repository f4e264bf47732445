use std::sync::Arc;

use bytes::Bytes;
use nv_files::ByteStream;
use nv_files::cipher::collect_stream;
use tracing::debug;

use crate::{
    BroadcastReport, Broadcaster, DeliveryPolicy, NodeDirectory, NodeEndpoint, NodeId, ReplySink,
    RouterError,
};

/// Forwards encoded message streams to endpoints by id.
#[derive(Debug, Clone, Default)]
pub struct NodeRouter {
    directory: Arc<NodeDirectory>,
    broadcaster: Broadcaster,
}

impl NodeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A router over an existing directory.
    pub fn with_directory(directory: Arc<NodeDirectory>) -> Self {
        Self {
            directory,
            broadcaster: Broadcaster::default(),
        }
    }

    pub fn with_policy(mut self, policy: DeliveryPolicy) -> Self {
        self.broadcaster = Broadcaster::new(policy);
        self
    }

    pub fn directory(&self) -> &Arc<NodeDirectory> {
        &self.directory
    }

    pub fn register_node(&self, endpoint: Arc<dyn NodeEndpoint>) {
        let id = endpoint.node_id().clone();
        if self.directory.register(endpoint).is_some() {
            debug!(node = %id, "node replaced");
        } else {
            debug!(node = %id, "node registered");
        }
    }

    /// Removes `id`. Removing an unknown id is not an error.
    pub fn unregister_node(&self, id: &NodeId) -> bool {
        let removed = self.directory.unregister(id);
        if removed {
            debug!(node = %id, "node unregistered");
        }
        removed
    }

    /// Hands `message` to the endpoint registered as `to` and waits for it.
    pub async fn send_message(
        &self,
        from: &NodeId,
        to: &NodeId,
        message: ByteStream,
        reply: Option<ReplySink>,
    ) -> Result<(), RouterError> {
        let endpoint = self
            .directory
            .get(to)
            .ok_or_else(|| RouterError::NotFound(to.clone()))?;
        endpoint
            .handle_raw_message(from, message, reply)
            .await
            .map_err(|source| RouterError::Endpoint {
                node: to.clone(),
                source,
            })
    }

    /// Buffers `message` once and delivers it to every target.
    ///
    /// Missing and failing targets are reported per target; whether that
    /// fails the call depends on the router's [`DeliveryPolicy`].
    pub async fn send_message_to_many(
        &self,
        from: &NodeId,
        to: &[NodeId],
        message: ByteStream,
        reply: Option<ReplySink>,
    ) -> Result<BroadcastReport, RouterError> {
        let message = collect_stream(message).await?;
        self.broadcast_bytes(from, to, message, reply).await
    }

    pub async fn broadcast_bytes(
        &self,
        from: &NodeId,
        to: &[NodeId],
        message: Bytes,
        reply: Option<ReplySink>,
    ) -> Result<BroadcastReport, RouterError> {
        self.broadcaster
            .broadcast(&self.directory, from, to, message, reply)
            .await
    }
}
