use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use nv_core::Note;
use nv_files::cipher::{bytes_stream, collect_stream};
use nv_files::{ByteStream, FileHandleRegistry, PlaintextCipher, RegistryConfig};
use nv_node::{
    DeliveryOutcome, DeliveryPolicy, MailboxNode, NodeEndpoint, NodeId, NodeRouter, ReplySink,
    RouterError,
};
use tokio::sync::mpsc;

/// Echoes the message back and counts deliveries.
struct EchoNode {
    id: NodeId,
    received: AtomicUsize,
}

impl EchoNode {
    fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: NodeId::from(id),
            received: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl NodeEndpoint for EchoNode {
    fn node_id(&self) -> &NodeId {
        &self.id
    }

    async fn handle_raw_message(
        &self,
        _from: &NodeId,
        message: ByteStream,
        reply: Option<ReplySink>,
    ) -> anyhow::Result<()> {
        let body = collect_stream(message).await?;
        self.received.fetch_add(1, Ordering::SeqCst);
        if let Some(reply) = reply {
            reply.send(body).await?;
        }
        Ok(())
    }
}

struct BrokenNode(NodeId);

#[async_trait]
impl NodeEndpoint for BrokenNode {
    fn node_id(&self) -> &NodeId {
        &self.0
    }

    async fn handle_raw_message(
        &self,
        _from: &NodeId,
        _message: ByteStream,
        _reply: Option<ReplySink>,
    ) -> anyhow::Result<()> {
        anyhow::bail!("endpoint offline")
    }
}

fn msg(text: &'static str) -> ByteStream {
    bytes_stream(Bytes::from_static(text.as_bytes()))
}

#[tokio::test]
async fn point_to_point_with_reply() {
    let router = NodeRouter::new();
    let echo = EchoNode::new("echo");
    router.register_node(echo.clone());

    let (tx, mut rx) = mpsc::channel(1);
    router
        .send_message(&"me".into(), &"echo".into(), msg("ping"), Some(tx))
        .await
        .unwrap();
    assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"ping"));
    assert_eq!(echo.received.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_target_is_not_found() {
    let router = NodeRouter::new();
    let err = router
        .send_message(&"me".into(), &"ghost".into(), msg("x"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::NotFound(id) if id == NodeId::from("ghost")));
}

#[tokio::test]
async fn unregister_is_idempotent() {
    let router = NodeRouter::new();
    router.register_node(EchoNode::new("echo"));
    assert!(router.unregister_node(&"echo".into()));
    assert!(!router.unregister_node(&"echo".into()));
    assert!(router.directory().is_empty());
}

#[tokio::test]
async fn best_effort_broadcast_reports_each_target() {
    let router = NodeRouter::new();
    let a = EchoNode::new("a");
    let b = EchoNode::new("b");
    router.register_node(a.clone());
    router.register_node(b.clone());
    router.register_node(Arc::new(BrokenNode("broken".into())));

    let targets: Vec<NodeId> = ["a", "missing", "b", "broken", "a"]
        .into_iter()
        .map(NodeId::from)
        .collect();
    let report = router
        .send_message_to_many(&"me".into(), &targets, msg("hello"), None)
        .await
        .unwrap();

    assert_eq!(report.len(), 4);
    assert_eq!(report.delivered(), 2);
    assert_eq!(report.outcome(&"a".into()), Some(&DeliveryOutcome::Delivered));
    assert_eq!(report.outcome(&"missing".into()), Some(&DeliveryOutcome::NotFound));
    assert!(matches!(
        report.outcome(&"broken".into()),
        Some(DeliveryOutcome::Failed(reason)) if reason.contains("offline")
    ));
    assert_eq!(a.received.load(Ordering::SeqCst), 1);
    assert_eq!(b.received.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn strict_policies_fail_but_still_deliver() {
    let router = NodeRouter::new().with_policy(DeliveryPolicy::All);
    let a = EchoNode::new("a");
    router.register_node(a.clone());

    let targets = [NodeId::from("a"), NodeId::from("missing")];
    let err = router
        .send_message_to_many(&"me".into(), &targets, msg("x"), None)
        .await
        .unwrap_err();
    match err {
        RouterError::PolicyNotMet { policy, report } => {
            assert_eq!(policy, DeliveryPolicy::All);
            assert_eq!(report.delivered(), 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(a.received.load(Ordering::SeqCst), 1);

    let quorum = NodeRouter::with_directory(router.directory().clone())
        .with_policy(DeliveryPolicy::Quorum(1));
    assert!(
        quorum
            .send_message_to_many(&"me".into(), &targets, msg("x"), None)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn mailbox_persists_messages_and_replies_with_length() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FileHandleRegistry::new(Arc::new(PlaintextCipher), RegistryConfig::default());
    let path = dir.path().join("mailbox.list");
    let mailbox = Arc::new(
        MailboxNode::open("inbox".into(), registry.clone(), &path)
            .await
            .unwrap(),
    );
    let router = NodeRouter::new();
    router.register_node(mailbox.clone());

    let (tx, mut rx) = mpsc::channel(4);
    for body in ["first", "second"] {
        router
            .send_message(&"alice".into(), &"inbox".into(), msg(body), Some(tx.clone()))
            .await
            .unwrap();
    }
    assert_eq!(Note::raw(rx.recv().await.unwrap()).as_u64(), 1);
    assert_eq!(Note::raw(rx.recv().await.unwrap()).as_u64(), 2);

    let messages = mailbox.messages().await.unwrap();
    assert_eq!(
        messages,
        vec![
            (NodeId::from("alice"), Note::text("first")),
            (NodeId::from("alice"), Note::text("second")),
        ]
    );

    assert_eq!(registry.cleanup_unused_interfaces(), 0);
    router.unregister_node(&"inbox".into());
    let mailbox = Arc::try_unwrap(mailbox).unwrap();
    mailbox.close().await.unwrap();
    assert_eq!(registry.cleanup_unused_interfaces(), 1);
}
