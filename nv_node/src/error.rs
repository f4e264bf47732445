use crate::{BroadcastReport, DeliveryPolicy, NodeId};

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum RouterError {
    #[error("node not found: {0}")]
    NotFound(NodeId),

    #[error("node {node} failed to handle message: {source:#}")]
    Endpoint {
        node: NodeId,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to read message: {0}")]
    Io(#[from] std::io::Error),

    #[error(
        "delivery policy {policy:?} not met: {} of {} targets reached",
        .report.delivered(),
        .report.len()
    )]
    PolicyNotMet {
        policy: DeliveryPolicy,
        report: BroadcastReport,
    },
}
