//! Fan-out delivery of one message to many nodes.

use std::collections::HashSet;
use std::fmt;

use bytes::Bytes;
use futures::future::join_all;
use nv_files::cipher::bytes_stream;
use tracing::{debug, warn};

use crate::{NodeDirectory, NodeId, ReplySink, RouterError};

/// When a broadcast counts as failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Never fails; the report carries per-target outcomes.
    #[default]
    BestEffort,
    /// Every target must be reached.
    All,
    /// At least one target must be reached.
    Any,
    /// At least N targets must be reached.
    Quorum(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    NotFound,
    Failed(String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

/// Outcome per target, in the order targets were given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    outcomes: Vec<(NodeId, DeliveryOutcome)>,
}

impl BroadcastReport {
    pub fn outcomes(&self) -> &[(NodeId, DeliveryOutcome)] {
        &self.outcomes
    }

    pub fn outcome(&self, id: &NodeId) -> Option<&DeliveryOutcome> {
        self.outcomes
            .iter()
            .find(|(target, _)| target == id)
            .map(|(_, outcome)| outcome)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn delivered(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_delivered())
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.delivered() == self.outcomes.len()
    }
}

impl fmt::Display for BroadcastReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} delivered", self.delivered(), self.len())
    }
}

/// Delivers a buffered message to several nodes in parallel.
#[derive(Debug, Clone, Copy, Default)]
pub struct Broadcaster {
    policy: DeliveryPolicy,
}

impl Broadcaster {
    pub fn new(policy: DeliveryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    /// Sends `message` to each distinct target. Duplicate targets receive
    /// the message once and appear once in the report.
    pub async fn broadcast(
        &self,
        directory: &NodeDirectory,
        from: &NodeId,
        targets: &[NodeId],
        message: Bytes,
        reply: Option<ReplySink>,
    ) -> Result<BroadcastReport, RouterError> {
        let mut seen = HashSet::new();
        let deliveries = targets
            .iter()
            .filter(|target| seen.insert(*target))
            .map(|target| {
                let endpoint = directory.get(target);
                let message = message.clone();
                let reply = reply.clone();
                async move {
                    let Some(endpoint) = endpoint else {
                        return (target.clone(), DeliveryOutcome::NotFound);
                    };
                    let outcome = match endpoint
                        .handle_raw_message(from, bytes_stream(message), reply)
                        .await
                    {
                        Ok(()) => DeliveryOutcome::Delivered,
                        Err(err) => {
                            warn!(node = %target, "delivery failed: {err:#}");
                            DeliveryOutcome::Failed(format!("{err:#}"))
                        }
                    };
                    (target.clone(), outcome)
                }
            });
        let report = BroadcastReport {
            outcomes: join_all(deliveries).await,
        };
        debug!(from = %from, %report, "broadcast finished");

        let delivered = report.delivered();
        let met = match self.policy {
            DeliveryPolicy::BestEffort => true,
            DeliveryPolicy::All => report.is_complete(),
            DeliveryPolicy::Any => delivered > 0 || report.is_empty(),
            DeliveryPolicy::Quorum(n) => delivered >= n,
        };
        if met {
            Ok(report)
        } else {
            Err(RouterError::PolicyNotMet {
                policy: self.policy,
                report,
            })
        }
    }
}
