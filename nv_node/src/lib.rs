//! Message routing between named endpoints.
//!
//! A [`NodeRouter`] looks up endpoints in a shared [`NodeDirectory`] and
//! forwards already-encoded byte streams to them, one target at a time or
//! fanned out through a [`Broadcaster`]. The router never decodes messages.

mod broadcast;
mod error;
mod mailbox;
mod node;
mod router;

pub use broadcast::{BroadcastReport, Broadcaster, DeliveryOutcome, DeliveryPolicy};
pub use error::RouterError;
pub use mailbox::MailboxNode;
pub use node::{NodeDirectory, NodeEndpoint, NodeId, ReplySink};
pub use router::NodeRouter;
