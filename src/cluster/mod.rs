//! Signature collection across cluster nodes

pub mod command;
pub mod coordinator;
pub mod transport;

pub use command::{SignCommand, SignResponse};
pub use coordinator::{CoordinationOutcome, SigningCoordinator};
pub use transport::{ClusterTransport, HttpClusterTransport, TransportError};
