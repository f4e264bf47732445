use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use nv_core::{ByteDecoding, IdGenerator, Note};
use nv_files::ByteStream;

/// Name of an endpoint in a [`NodeDirectory`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct NodeId(Note);

impl NodeId {
    pub fn new(id: impl Into<Note>) -> Self {
        Self(id.into())
    }

    /// A fresh id from `ids`.
    pub fn generate(ids: &IdGenerator) -> Self {
        Self(ids.next_note())
    }

    pub fn as_note(&self) -> &Note {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(self.0.as_bytes()) {
            Ok(text) if self.0.tag() == ByteDecoding::Utf8 => f.write_str(text),
            _ => match self.0.with_tag(ByteDecoding::Base16).as_string() {
                Ok(hex) => f.write_str(&hex),
                Err(_) => write!(f, "{:?}", self.0),
            },
        }
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({self})")
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Channel an endpoint may answer on.
pub type ReplySink = tokio::sync::mpsc::Sender<Bytes>;

#[async_trait]
pub trait NodeEndpoint: Send + Sync + 'static {
    fn node_id(&self) -> &NodeId;

    /// Consumes one encoded message. The router does not look inside it.
    async fn handle_raw_message(
        &self,
        from: &NodeId,
        message: ByteStream,
        reply: Option<ReplySink>,
    ) -> anyhow::Result<()>;
}

/// Shared id to endpoint table.
#[derive(Default)]
pub struct NodeDirectory {
    nodes: DashMap<NodeId, Arc<dyn NodeEndpoint>>,
}

impl fmt::Debug for NodeDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDirectory")
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

impl NodeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `endpoint` under its own id, returning any endpoint it
    /// replaced.
    pub fn register(&self, endpoint: Arc<dyn NodeEndpoint>) -> Option<Arc<dyn NodeEndpoint>> {
        self.nodes.insert(endpoint.node_id().clone(), endpoint)
    }

    pub fn unregister(&self, id: &NodeId) -> bool {
        self.nodes.remove(id).is_some()
    }

    pub fn get(&self, id: &NodeId) -> Option<Arc<dyn NodeEndpoint>> {
        self.nodes.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefers_text() {
        assert_eq!(NodeId::from("alice").to_string(), "alice");
        let raw = NodeId::new(vec![0xab, 0x01]);
        assert_eq!(raw.to_string(), "ab01");
    }

    #[test]
    fn generated_ids_differ() {
        let ids = IdGenerator::new();
        assert_ne!(NodeId::generate(&ids), NodeId::generate(&ids));
    }
}
