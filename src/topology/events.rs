//! Change notifications emitted by the topology store.

use super::types::{
    Bus, BusConnection, BusConnectionId, BusId, Connection, ConnectionId, NetworkFunction, NfId,
};
use serde::Serialize;

/// A mutation that has already been applied to the store
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum TopologyEvent {
    NfAdded(NetworkFunction),
    NfUpdated(NetworkFunction),
    /// The network function together with everything its removal cascaded to
    NfRemoved(RemovedNf),
    ConnectionAdded(Connection),
    ConnectionUpdated(Connection),
    ConnectionRemoved(Connection),
    BusAdded(Bus),
    BusRemoved {
        bus: Bus,
        bus_connections: Vec<BusConnectionId>,
    },
    BusConnectionAdded(BusConnection),
    BusConnectionRemoved(BusConnection),
    Cleared,
}

impl TopologyEvent {
    /// Returns the event tag subscribers switch on
    pub fn tag(&self) -> &'static str {
        match self {
            TopologyEvent::NfAdded(_) => "nf-added",
            TopologyEvent::NfUpdated(_) => "nf-updated",
            TopologyEvent::NfRemoved(_) => "nf-removed",
            TopologyEvent::ConnectionAdded(_) => "connection-added",
            TopologyEvent::ConnectionUpdated(_) => "connection-updated",
            TopologyEvent::ConnectionRemoved(_) => "connection-removed",
            TopologyEvent::BusAdded(_) => "bus-added",
            TopologyEvent::BusRemoved { .. } => "bus-removed",
            TopologyEvent::BusConnectionAdded(_) => "bus-connection-added",
            TopologyEvent::BusConnectionRemoved(_) => "bus-connection-removed",
            TopologyEvent::Cleared => "cleared",
        }
    }
}

/// Result of removing a network function from the store
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedNf {
    pub nf: NetworkFunction,
    pub connections: Vec<ConnectionId>,
    pub bus_connections: Vec<BusConnectionId>,
    /// Buses whose member list no longer contains the network function
    pub buses: Vec<BusId>,
}

impl RemovedNf {
    pub fn id(&self) -> &NfId {
        &self.nf.id
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// Error type subscribers may return; it is logged and otherwise ignored
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

/// Callback invoked synchronously after every mutation
pub type Subscriber = Box<dyn FnMut(&TopologyEvent) -> Result<(), SubscriberError>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tags_serialize() {
        let json = serde_json::to_value(&TopologyEvent::Cleared).unwrap();
        assert_eq!(json["event"], "cleared");
        assert_eq!(TopologyEvent::Cleared.tag(), "cleared");
    }
}
