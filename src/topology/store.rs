//! Topology store.
//!
//! The single source of truth for network functions, direct connections,
//! buses and bus attachments. Direct connections are additionally indexed as
//! an undirected adjacency map so "is A wired to B" never has to check both
//! `source_id`/`target_id` orientations by hand.
//!
//! Every mutating call notifies subscribers synchronously once it has been
//! fully applied. Deleting an unknown id is a no-op and notifies nobody.

use super::events::{RemovedNf, Subscriber, SubscriptionId, TopologyEvent};
use super::types::{
    Bus, BusConnection, BusConnectionId, BusId, Connection, ConnectionId, ConnectionPatch,
    NetworkFunction, NfId, NfPatch, TopologySnapshot,
};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Neighbor -> ids of the direct connections linking the pair
type Adjacency = HashMap<NfId, HashMap<NfId, BTreeSet<ConnectionId>>>;

#[derive(Default)]
pub struct TopologyStore {
    nfs: Vec<NetworkFunction>,
    connections: Vec<Connection>,
    buses: Vec<Bus>,
    bus_connections: Vec<BusConnection>,
    adjacency: Adjacency,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl fmt::Debug for TopologyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopologyStore")
            .field("nfs", &self.nfs.len())
            .field("connections", &self.connections.len())
            .field("buses", &self.buses.len())
            .field("bus_connections", &self.bus_connections.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl TopologyStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---------------------------------------------------------------
    // Subscriptions
    // ---------------------------------------------------------------

    /// Register a callback invoked after every mutation
    pub fn subscribe(&mut self, subscriber: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, subscriber));
        id
    }

    /// Remove a previously registered callback
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
        self.subscribers.len() != before
    }

    /// Deliver an event to every subscriber. A failing or panicking
    /// subscriber is logged and skipped; it never reaches the caller.
    fn notify(&mut self, event: TopologyEvent) {
        for (id, subscriber) in self.subscribers.iter_mut() {
            match panic::catch_unwind(AssertUnwindSafe(|| subscriber(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::warn!("Subscriber {:?} failed on {}: {}", id, event.tag(), e);
                }
                Err(_) => {
                    log::warn!("Subscriber {:?} panicked on {}", id, event.tag());
                }
            }
        }
    }

    // ---------------------------------------------------------------
    // Network functions
    // ---------------------------------------------------------------

    /// Insert a network function. Returns false (and changes nothing) if the
    /// id is already present.
    pub fn add_nf(&mut self, nf: NetworkFunction) -> bool {
        if self.get_nf(&nf.id).is_some() {
            log::warn!("Network function {} already exists, not adding", nf.id);
            return false;
        }
        self.nfs.push(nf.clone());
        self.notify(TopologyEvent::NfAdded(nf));
        true
    }

    pub fn get_nf(&self, id: &NfId) -> Option<&NetworkFunction> {
        self.nfs.iter().find(|nf| &nf.id == id)
    }

    /// All network functions in insertion order
    pub fn nfs(&self) -> &[NetworkFunction] {
        &self.nfs
    }

    pub fn find_nf_by_ip(&self, ip: &str) -> Option<&NetworkFunction> {
        self.nfs.iter().find(|nf| nf.config.ip_address == ip)
    }

    pub fn find_nf_by_name(&self, name: &str) -> Option<&NetworkFunction> {
        self.nfs.iter().find(|nf| nf.name == name)
    }

    /// Merge a patch into the stored network function.
    ///
    /// Returns false if the id is unknown. An empty or no-op patch still
    /// counts as an update for notification purposes.
    pub fn update_nf(&mut self, id: &NfId, patch: &NfPatch) -> bool {
        let Some(nf) = self.nfs.iter_mut().find(|nf| &nf.id == id) else {
            return false;
        };
        nf.apply(patch);
        let updated = nf.clone();
        self.notify(TopologyEvent::NfUpdated(updated));
        true
    }

    /// Remove a network function and everything attached to it
    pub fn remove_nf(&mut self, id: &NfId) -> Option<RemovedNf> {
        let index = self.nfs.iter().position(|nf| &nf.id == id)?;

        let (touching, kept): (Vec<Connection>, Vec<Connection>) = std::mem::take(&mut self.connections)
            .into_iter()
            .partition(|conn| conn.touches(id));
        self.connections = kept;
        for conn in &touching {
            self.unlink(conn);
        }
        self.adjacency.remove(id);

        let (attached, kept): (Vec<BusConnection>, Vec<BusConnection>) =
            std::mem::take(&mut self.bus_connections)
                .into_iter()
                .partition(|bc| &bc.nf_id == id);
        self.bus_connections = kept;

        let mut buses = Vec::new();
        for bus in self.buses.iter_mut() {
            let before = bus.connections.len();
            bus.connections.retain(|member| member != id);
            if bus.connections.len() != before {
                buses.push(bus.id.clone());
            }
        }

        let nf = self.nfs.remove(index);
        let removed = RemovedNf {
            nf,
            connections: touching.into_iter().map(|c| c.id).collect(),
            bus_connections: attached.into_iter().map(|bc| bc.id).collect(),
            buses,
        };
        self.notify(TopologyEvent::NfRemoved(removed.clone()));
        Some(removed)
    }

    // ---------------------------------------------------------------
    // Direct connections
    // ---------------------------------------------------------------

    pub fn add_connection(&mut self, connection: Connection) {
        self.link(&connection);
        self.connections.push(connection.clone());
        self.notify(TopologyEvent::ConnectionAdded(connection));
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn get_connection(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.iter().find(|conn| &conn.id == id)
    }

    /// Connections touching `id`, in either direction
    pub fn connections_for_nf(&self, id: &NfId) -> Vec<&Connection> {
        self.connections.iter().filter(|conn| conn.touches(id)).collect()
    }

    /// Connections linking `a` and `b`, in either direction
    pub fn connections_between(&self, a: &NfId, b: &NfId) -> Vec<&Connection> {
        let Some(ids) = self.adjacency.get(a).and_then(|peers| peers.get(b)) else {
            return Vec::new();
        };
        self.connections.iter().filter(|conn| ids.contains(&conn.id)).collect()
    }

    /// Returns true if at least one direct connection links `a` and `b`
    pub fn directly_connected(&self, a: &NfId, b: &NfId) -> bool {
        self.adjacency
            .get(a)
            .map_or(false, |peers| peers.contains_key(b))
    }

    /// Network functions directly connected to `id`, sorted by id
    pub fn neighbors(&self, id: &NfId) -> Vec<NfId> {
        let mut peers: Vec<NfId> = self
            .adjacency
            .get(id)
            .map(|peers| peers.keys().cloned().collect())
            .unwrap_or_default();
        peers.sort();
        peers
    }

    pub fn update_connection(&mut self, id: &ConnectionId, patch: &ConnectionPatch) -> bool {
        let Some(conn) = self.connections.iter_mut().find(|conn| &conn.id == id) else {
            return false;
        };
        patch.apply_to(conn);
        let updated = conn.clone();
        self.notify(TopologyEvent::ConnectionUpdated(updated));
        true
    }

    pub fn remove_connection(&mut self, id: &ConnectionId) -> Option<Connection> {
        let index = self.connections.iter().position(|conn| &conn.id == id)?;
        let conn = self.connections.remove(index);
        self.unlink(&conn);
        self.notify(TopologyEvent::ConnectionRemoved(conn.clone()));
        Some(conn)
    }

    fn link(&mut self, conn: &Connection) {
        self.adjacency
            .entry(conn.source_id.clone())
            .or_default()
            .entry(conn.target_id.clone())
            .or_default()
            .insert(conn.id.clone());
        self.adjacency
            .entry(conn.target_id.clone())
            .or_default()
            .entry(conn.source_id.clone())
            .or_default()
            .insert(conn.id.clone());
    }

    fn unlink(&mut self, conn: &Connection) {
        for (from, to) in [
            (&conn.source_id, &conn.target_id),
            (&conn.target_id, &conn.source_id),
        ] {
            if let Some(peers) = self.adjacency.get_mut(from) {
                if let Some(ids) = peers.get_mut(to) {
                    ids.remove(&conn.id);
                    if ids.is_empty() {
                        peers.remove(to);
                    }
                }
                if peers.is_empty() {
                    self.adjacency.remove(from);
                }
            }
        }
    }

    // ---------------------------------------------------------------
    // Buses
    // ---------------------------------------------------------------

    pub fn add_bus(&mut self, bus: Bus) {
        self.buses.push(bus.clone());
        self.notify(TopologyEvent::BusAdded(bus));
    }

    pub fn buses(&self) -> &[Bus] {
        &self.buses
    }

    pub fn get_bus(&self, id: &BusId) -> Option<&Bus> {
        self.buses.iter().find(|bus| &bus.id == id)
    }

    pub fn find_bus_by_name(&self, name: &str) -> Option<&Bus> {
        self.buses.iter().find(|bus| bus.name == name)
    }

    /// Remove a bus and every attachment to it
    pub fn remove_bus(&mut self, id: &BusId) -> Option<Bus> {
        let index = self.buses.iter().position(|bus| &bus.id == id)?;
        let bus = self.buses.remove(index);

        let (attached, kept): (Vec<BusConnection>, Vec<BusConnection>) =
            std::mem::take(&mut self.bus_connections)
                .into_iter()
                .partition(|bc| &bc.bus_id == id);
        self.bus_connections = kept;

        self.notify(TopologyEvent::BusRemoved {
            bus: bus.clone(),
            bus_connections: attached.into_iter().map(|bc| bc.id).collect(),
        });
        Some(bus)
    }

    // ---------------------------------------------------------------
    // Bus attachments
    // ---------------------------------------------------------------

    /// Record an attachment and add the network function to the bus's
    /// member list (once).
    pub fn add_bus_connection(&mut self, bus_connection: BusConnection) {
        if let Some(bus) = self.buses.iter_mut().find(|bus| bus.id == bus_connection.bus_id) {
            if !bus.connections.contains(&bus_connection.nf_id) {
                bus.connections.push(bus_connection.nf_id.clone());
            }
        }
        self.bus_connections.push(bus_connection.clone());
        self.notify(TopologyEvent::BusConnectionAdded(bus_connection));
    }

    pub fn bus_connections(&self) -> &[BusConnection] {
        &self.bus_connections
    }

    pub fn bus_connections_for_nf(&self, id: &NfId) -> Vec<&BusConnection> {
        self.bus_connections.iter().filter(|bc| &bc.nf_id == id).collect()
    }

    pub fn bus_connections_for_bus(&self, bus_id: &BusId) -> Vec<&BusConnection> {
        self.bus_connections.iter().filter(|bc| &bc.bus_id == bus_id).collect()
    }

    /// Remove an attachment. The network function leaves the bus's member
    /// list when this was its last attachment to that bus.
    pub fn remove_bus_connection(&mut self, id: &BusConnectionId) -> Option<BusConnection> {
        let index = self.bus_connections.iter().position(|bc| &bc.id == id)?;
        let removed = self.bus_connections.remove(index);

        let still_attached = self
            .bus_connections
            .iter()
            .any(|bc| bc.nf_id == removed.nf_id && bc.bus_id == removed.bus_id);
        if !still_attached {
            if let Some(bus) = self.buses.iter_mut().find(|bus| bus.id == removed.bus_id) {
                bus.connections.retain(|member| member != &removed.nf_id);
            }
        }

        self.notify(TopologyEvent::BusConnectionRemoved(removed.clone()));
        Some(removed)
    }

    // ---------------------------------------------------------------
    // Whole-topology operations
    // ---------------------------------------------------------------

    /// Empty every collection; subscribers are notified exactly once
    pub fn clear_all(&mut self) {
        self.nfs.clear();
        self.connections.clear();
        self.buses.clear();
        self.bus_connections.clear();
        self.adjacency.clear();
        self.notify(TopologyEvent::Cleared);
    }

    pub fn is_empty(&self) -> bool {
        self.nfs.is_empty()
            && self.connections.is_empty()
            && self.buses.is_empty()
            && self.bus_connections.is_empty()
    }

    pub fn snapshot(&self) -> TopologySnapshot {
        TopologySnapshot {
            nfs: self.nfs.clone(),
            connections: self.connections.clone(),
            buses: self.buses.clone(),
            bus_connections: self.bus_connections.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::events::SubscriberError;
    use crate::topology::types::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    fn nf(id: &str, ip: &str, port: u16) -> NetworkFunction {
        NetworkFunction {
            id: NfId::from(id),
            nf_type: NfType::Amf,
            name: id.to_uppercase(),
            position: Position::default(),
            status: NfStatus::Starting,
            status_since: Duration::ZERO,
            config: NfConfig {
                ip_address: ip.to_string(),
                port,
                http_protocol: HttpProtocol::Http2,
                capacity: 1000,
                load: 0,
            },
            created_at: Duration::ZERO,
            visual: NfType::Amf.visual(),
        }
    }

    fn connection(id: &str, source: &str, target: &str) -> Connection {
        Connection {
            id: ConnectionId::from(id),
            source_id: NfId::from(source),
            target_id: NfId::from(target),
            kind: ConnectionKind::Manual,
            interface_name: "N11".to_string(),
            options: ConnectionOptions::default(),
            created_at: Duration::ZERO,
        }
    }

    fn bus(id: &str) -> Bus {
        Bus {
            id: BusId::from(id),
            name: "Service Bus".to_string(),
            orientation: Orientation::Horizontal,
            position: Position::new(200.0, 350.0),
            length: 800.0,
            connections: Vec::new(),
        }
    }

    fn attachment(id: &str, nf: &str, bus: &str) -> BusConnection {
        BusConnection {
            id: BusConnectionId::from(id),
            nf_id: NfId::from(nf),
            bus_id: BusId::from(bus),
            interface_name: "SBI".to_string(),
            status: BusConnectionStatus::Active,
            created_at: Duration::ZERO,
        }
    }

    fn recorder(store: &mut TopologyStore) -> Rc<RefCell<Vec<&'static str>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        store.subscribe(Box::new(move |event: &TopologyEvent| {
            sink.borrow_mut().push(event.tag());
            Ok(())
        }));
        seen
    }

    #[test]
    fn test_connections_are_undirected() {
        let mut store = TopologyStore::new();
        store.add_nf(nf("a", "192.168.1.10", 8080));
        store.add_nf(nf("b", "192.168.1.11", 8081));
        store.add_connection(connection("c1", "a", "b"));

        assert!(store.directly_connected(&NfId::from("a"), &NfId::from("b")));
        assert!(store.directly_connected(&NfId::from("b"), &NfId::from("a")));
        assert_eq!(store.connections_for_nf(&NfId::from("b")).len(), 1);
        assert_eq!(store.neighbors(&NfId::from("b")), vec![NfId::from("a")]);
        assert_eq!(store.connections_between(&NfId::from("b"), &NfId::from("a")).len(), 1);
    }

    #[test]
    fn test_remove_one_of_two_parallel_connections_keeps_adjacency() {
        let mut store = TopologyStore::new();
        store.add_connection(connection("c1", "a", "b"));
        store.add_connection(connection("c2", "b", "a"));

        store.remove_connection(&ConnectionId::from("c1"));
        assert!(store.directly_connected(&NfId::from("a"), &NfId::from("b")));

        store.remove_connection(&ConnectionId::from("c2"));
        assert!(!store.directly_connected(&NfId::from("a"), &NfId::from("b")));
        assert!(store.neighbors(&NfId::from("a")).is_empty());
    }

    #[test]
    fn test_remove_nf_cascades() {
        let mut store = TopologyStore::new();
        store.add_nf(nf("a", "192.168.1.10", 8080));
        store.add_nf(nf("b", "192.168.1.11", 8081));
        store.add_bus(bus("x"));
        store.add_connection(connection("c1", "a", "b"));
        store.add_bus_connection(attachment("bc1", "a", "x"));
        store.add_bus_connection(attachment("bc2", "b", "x"));
        assert_eq!(store.get_bus(&BusId::from("x")).unwrap().connections.len(), 2);

        let removed = store.remove_nf(&NfId::from("a")).unwrap();
        assert_eq!(removed.connections, vec![ConnectionId::from("c1")]);
        assert_eq!(removed.bus_connections, vec![BusConnectionId::from("bc1")]);
        assert_eq!(removed.buses, vec![BusId::from("x")]);

        assert!(store.connections_for_nf(&NfId::from("a")).is_empty());
        assert!(store.connections_for_nf(&NfId::from("b")).is_empty());
        assert!(store.bus_connections_for_nf(&NfId::from("a")).is_empty());
        assert_eq!(
            store.get_bus(&BusId::from("x")).unwrap().connections,
            vec![NfId::from("b")]
        );
        assert!(!store.directly_connected(&NfId::from("b"), &NfId::from("a")));
    }

    #[test]
    fn test_missing_deletes_are_silent_noops() {
        let mut store = TopologyStore::new();
        let seen = recorder(&mut store);

        assert!(store.remove_nf(&NfId::from("ghost")).is_none());
        assert!(store.remove_connection(&ConnectionId::from("ghost")).is_none());
        assert!(store.remove_bus(&BusId::from("ghost")).is_none());
        assert!(store.remove_bus_connection(&BusConnectionId::from("ghost")).is_none());
        assert!(!store.update_nf(&NfId::from("ghost"), &NfPatch::default()));
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_remove_bus_cascades_attachments() {
        let mut store = TopologyStore::new();
        store.add_bus(bus("x"));
        store.add_bus_connection(attachment("bc1", "a", "x"));
        store.add_bus_connection(attachment("bc2", "b", "x"));

        store.remove_bus(&BusId::from("x"));
        assert!(store.bus_connections_for_bus(&BusId::from("x")).is_empty());
        assert!(store.bus_connections().is_empty());
    }

    #[test]
    fn test_remove_bus_connection_updates_member_list() {
        let mut store = TopologyStore::new();
        store.add_bus(bus("x"));
        store.add_bus_connection(attachment("bc1", "a", "x"));
        store.add_bus_connection(attachment("bc2", "a", "x"));
        assert_eq!(store.get_bus(&BusId::from("x")).unwrap().connections.len(), 1);

        store.remove_bus_connection(&BusConnectionId::from("bc1"));
        assert_eq!(store.get_bus(&BusId::from("x")).unwrap().connections.len(), 1);

        store.remove_bus_connection(&BusConnectionId::from("bc2"));
        assert!(store.get_bus(&BusId::from("x")).unwrap().connections.is_empty());
    }

    #[test]
    fn test_update_nf_merges_patch() {
        let mut store = TopologyStore::new();
        store.add_nf(nf("a", "192.168.1.10", 8080));

        let patch = NfPatch {
            name: Some("renamed".to_string()),
            ..NfPatch::default()
        };
        assert!(store.update_nf(&NfId::from("a"), &patch));

        let stored = store.get_nf(&NfId::from("a")).unwrap();
        assert_eq!(stored.name, "renamed");
        assert_eq!(stored.config.ip_address, "192.168.1.10");
    }

    #[test]
    fn test_duplicate_nf_id_rejected() {
        let mut store = TopologyStore::new();
        assert!(store.add_nf(nf("a", "192.168.1.10", 8080)));
        assert!(!store.add_nf(nf("a", "192.168.1.99", 9000)));
        assert_eq!(store.nfs().len(), 1);
        assert_eq!(store.nfs()[0].config.port, 8080);
    }

    #[test]
    fn test_clear_all_notifies_once() {
        let mut store = TopologyStore::new();
        store.add_nf(nf("a", "192.168.1.10", 8080));
        store.add_bus(bus("x"));
        let seen = recorder(&mut store);

        store.clear_all();
        assert!(store.is_empty());
        assert_eq!(*seen.borrow(), vec!["cleared"]);
    }

    #[test]
    fn test_failing_subscribers_are_isolated() {
        let mut store = TopologyStore::new();
        store.subscribe(Box::new(|_: &TopologyEvent| Err("subscriber exploded".into())));
        store.subscribe(Box::new(
            |_: &TopologyEvent| -> Result<(), SubscriberError> { panic!("subscriber panicked") },
        ));
        let seen = recorder(&mut store);

        assert!(store.add_nf(nf("a", "192.168.1.10", 8080)));
        store.remove_nf(&NfId::from("a"));
        assert_eq!(*seen.borrow(), vec!["nf-added", "nf-removed"]);
    }

    #[test]
    fn test_unsubscribe() {
        let mut store = TopologyStore::new();
        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        let id = store.subscribe(Box::new(move |_: &TopologyEvent| {
            *sink.borrow_mut() += 1;
            Ok(())
        }));

        store.add_bus(bus("x"));
        assert!(store.unsubscribe(id));
        store.add_bus(bus("y"));
        assert_eq!(*count.borrow(), 1);
        assert!(!store.unsubscribe(id));
    }
}
