//! Network topology module.
//!
//! This module contains the in-memory topology graph (network functions,
//! direct connections, service buses), its change notifications, and the
//! read-only connectivity queries built on top of it.

pub mod types;
pub mod events;
pub mod store;
pub mod connections;

// Re-export key types for easier access
pub use types::{
    Bus, BusConnection, BusConnectionId, BusConnectionStatus, BusId, Connection, ConnectionId,
    ConnectionKind, ConnectionOptions, ConnectionPatch, HttpProtocol, LineStyle, NetworkFunction,
    NfConfig, NfConfigPatch, NfId, NfPatch, NfStatus, NfType, NfVisual, Orientation, Position,
    TopologySnapshot,
};
pub use events::{RemovedNf, Subscriber, SubscriberError, SubscriptionId, TopologyEvent};
pub use store::TopologyStore;
pub use connections::{interface_name, ConnectionMethod, ConnectivityResolver};

/// Errors surfaced when a topology mutation is rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TopologyError {
    #[error("Network function not found: {0}")]
    NotFound(NfId),

    #[error("Bus not found: {0}")]
    BusNotFound(BusId),

    #[error("IP address {ip} is already in use by {owner}")]
    IpConflict { ip: String, owner: String },

    #[error("Port {port} is already in use by {owner}")]
    PortConflict { port: u16, owner: String },

    #[error("Invalid IP address: {0}")]
    InvalidAddress(String),

    #[error("Invalid position ({x}, {y}): coordinates must be finite")]
    InvalidPosition { x: f64, y: f64 },

    #[error("Cannot connect {0} to itself")]
    SelfConnection(NfId),

    #[error("{first} and {second} are already connected")]
    DuplicateConnection { first: NfId, second: NfId },
}
