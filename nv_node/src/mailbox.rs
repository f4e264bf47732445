use std::path::{Path, PathBuf};

use async_trait::async_trait;
use nv_core::{ByteDecoding, Note, NotePair};
use nv_files::cipher::collect_stream;
use nv_files::{ByteStream, FileHandleRegistry, FilesResult};
use tracing::debug;

use crate::{NodeEndpoint, NodeId, ReplySink};

/// Endpoint that persists every message it receives.
///
/// Messages are appended to a `NoteList` file through the registry; each
/// entry is a framed `(sender, body)` pair. The reply, if requested, is the
/// new mailbox length as a big-endian `u64`.
#[derive(Debug)]
pub struct MailboxNode {
    id: NodeId,
    registry: FileHandleRegistry,
    path: PathBuf,
}

impl MailboxNode {
    /// Opens the mailbox file and holds a reference on it until
    /// [`MailboxNode::close`].
    pub async fn open(
        id: NodeId,
        registry: FileHandleRegistry,
        path: impl Into<PathBuf>,
    ) -> FilesResult<Self> {
        let path = path.into();
        registry
            .get_handle(&path)
            .await?
            .add_reference(id.as_note().clone())?;
        Ok(Self { id, registry, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one message and returns the new length.
    pub async fn deliver(&self, from: &NodeId, body: Note) -> FilesResult<usize> {
        let entry = NotePair::new(from.as_note().clone(), body).to_bytes()?;
        let guard = self.registry.lock(&self.path).await?;
        let len = guard
            .handle()
            .update_list(&guard, |list| {
                list.push(Note::new(entry, ByteDecoding::PairList))?;
                list.len()
            })
            .await?;
        debug!(node = %self.id, from = %from, len, "message stored");
        Ok(len)
    }

    /// Stored messages as `(sender, body)` pairs, oldest first.
    pub async fn messages(&self) -> FilesResult<Vec<(NodeId, Note)>> {
        let guard = self.registry.lock(&self.path).await?;
        let list = guard.handle().read_list(&guard).await?;
        let mut messages = Vec::new();
        for entry in list.iter() {
            let (from, body) = NotePair::from_bytes(entry?.into_bytes())?.into_parts();
            messages.push((NodeId::new(from), body));
        }
        Ok(messages)
    }

    /// Drops the reference taken by [`MailboxNode::open`], letting the
    /// handle be cleaned up once idle.
    pub async fn close(self) -> FilesResult<()> {
        let handle = self.registry.get_handle(&self.path).await?;
        handle.remove_reference(self.id.as_note());
        Ok(())
    }
}

#[async_trait]
impl NodeEndpoint for MailboxNode {
    fn node_id(&self) -> &NodeId {
        &self.id
    }

    async fn handle_raw_message(
        &self,
        from: &NodeId,
        message: ByteStream,
        reply: Option<ReplySink>,
    ) -> anyhow::Result<()> {
        let body = collect_stream(message).await?;
        let len = self.deliver(from, Note::raw(body)).await?;
        if let Some(reply) = reply {
            let answer = Note::from_u64(len as u64, ByteDecoding::BigEndian);
            if reply.send(answer.into_bytes()).await.is_err() {
                debug!(node = %self.id, "reply receiver dropped");
            }
        }
        Ok(())
    }
}
