//! IP address and port registry.
//!
//! This file builds a point-in-time view of which addresses and ports are
//! held by which network functions. It is recomputed from the store before
//! every allocation so back-to-back creations always see prior commits.

use crate::topology::types::{NetworkFunction, NfId};
use crate::utils::ip_utils::network_prefix;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Holder of an address or port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressOwner {
    pub id: NfId,
    pub name: String,
}

/// Snapshot of addresses and ports currently in use
#[derive(Debug, Clone, Default)]
pub struct UsedAddresses {
    /// IP -> owner
    ips: HashMap<String, AddressOwner>,
    /// Port -> owner
    ports: HashMap<u16, AddressOwner>,
}

impl UsedAddresses {
    /// Collect every address and port held by the given network functions
    pub fn from_nfs<'a>(nfs: impl IntoIterator<Item = &'a NetworkFunction>) -> Self {
        let mut used = UsedAddresses::default();
        for nf in nfs {
            let owner = AddressOwner {
                id: nf.id.clone(),
                name: nf.name.clone(),
            };
            // First holder wins when a fallback allocation produced a duplicate
            used.ips.entry(nf.config.ip_address.clone()).or_insert_with(|| owner.clone());
            used.ports.entry(nf.config.port).or_insert(owner);
        }
        used
    }

    /// Same as `from_nfs`, ignoring one network function (used when that
    /// function edits its own address)
    pub fn excluding<'a>(
        nfs: impl IntoIterator<Item = &'a NetworkFunction>,
        skip: &NfId,
    ) -> Self {
        Self::from_nfs(nfs.into_iter().filter(|nf| &nf.id != skip))
    }

    /// Check if an IP is already assigned
    pub fn is_ip_assigned(&self, ip: &str) -> bool {
        self.ips.contains_key(ip)
    }

    pub fn is_port_assigned(&self, port: u16) -> bool {
        self.ports.contains_key(&port)
    }

    /// Get the network function that owns a given IP
    pub fn ip_owner(&self, ip: &str) -> Option<&AddressOwner> {
        self.ips.get(ip)
    }

    pub fn port_owner(&self, port: u16) -> Option<&AddressOwner> {
        self.ports.get(&port)
    }

    /// The set of used IPs, as the allocator consumes it
    pub fn ip_set(&self) -> HashSet<String> {
        self.ips.keys().cloned().collect()
    }

    /// The set of used ports, as the allocator consumes it
    pub fn port_set(&self) -> HashSet<u16> {
        self.ports.keys().copied().collect()
    }

    /// Number of assigned addresses per subnet prefix
    pub fn allocation_stats(&self) -> BTreeMap<String, usize> {
        let mut stats = BTreeMap::new();
        for ip in self.ips.keys() {
            *stats.entry(network_prefix(ip)).or_insert(0) += 1;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::types::*;
    use std::time::Duration;

    fn nf(id: &str, ip: &str, port: u16) -> NetworkFunction {
        NetworkFunction {
            id: NfId::from(id),
            nf_type: NfType::Smf,
            name: format!("SMF-{}", id),
            position: Position::default(),
            status: NfStatus::Stable,
            status_since: Duration::ZERO,
            config: NfConfig {
                ip_address: ip.to_string(),
                port,
                http_protocol: HttpProtocol::Http2,
                capacity: 1000,
                load: 0,
            },
            created_at: Duration::ZERO,
            visual: NfType::Smf.visual(),
        }
    }

    #[test]
    fn test_snapshot_tracks_owners() {
        let nfs = vec![nf("a", "192.168.1.10", 8080), nf("b", "192.168.2.10", 8081)];
        let used = UsedAddresses::from_nfs(&nfs);

        assert!(used.is_ip_assigned("192.168.1.10"));
        assert!(!used.is_ip_assigned("192.168.1.11"));
        assert!(used.is_port_assigned(8081));
        assert_eq!(used.ip_owner("192.168.2.10").unwrap().id, NfId::from("b"));
        assert_eq!(used.port_owner(8080).unwrap().name, "SMF-a");
        assert_eq!(used.ip_set().len(), 2);
        assert_eq!(used.port_set().len(), 2);
    }

    #[test]
    fn test_excluding_self() {
        let nfs = vec![nf("a", "192.168.1.10", 8080), nf("b", "192.168.1.11", 8081)];
        let used = UsedAddresses::excluding(&nfs, &NfId::from("a"));
        assert!(!used.is_ip_assigned("192.168.1.10"));
        assert!(used.is_ip_assigned("192.168.1.11"));
    }

    #[test]
    fn test_allocation_stats() {
        let nfs = vec![
            nf("a", "192.168.1.10", 8080),
            nf("b", "192.168.1.11", 8081),
            nf("c", "192.168.3.10", 8082),
        ];
        let stats = UsedAddresses::from_nfs(&nfs).allocation_stats();
        assert_eq!(stats.get("192.168.1"), Some(&2));
        assert_eq!(stats.get("192.168.3"), Some(&1));
        assert_eq!(stats.get("192.168.2"), None);
    }
}
