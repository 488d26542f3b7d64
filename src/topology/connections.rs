//! Connectivity resolution.
//!
//! Read-only questions asked of a store snapshot: are two network functions
//! wired together, and how. Reference-point naming for new edges lives here
//! too, since it is derived from the pair of endpoint types.

use super::store::TopologyStore;
use super::types::{NfId, NfType};
use crate::utils::ip_utils;
use serde::{Deserialize, Serialize};

/// How two network functions reach each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMethod {
    Direct,
    Bus,
    None,
}

/// Pure queries over a topology store
#[derive(Debug, Clone, Copy)]
pub struct ConnectivityResolver<'a> {
    store: &'a TopologyStore,
}

impl<'a> ConnectivityResolver<'a> {
    pub fn new(store: &'a TopologyStore) -> Self {
        Self { store }
    }

    /// Compare the first three dotted octets of two addresses
    pub fn same_subnet(ip_a: &str, ip_b: &str) -> bool {
        ip_utils::same_subnet(ip_a, ip_b)
    }

    /// True if a direct connection exists in either direction, or both
    /// network functions sit on a common bus
    pub fn connected(&self, a: &NfId, b: &NfId) -> bool {
        self.connection_method(a, b) != ConnectionMethod::None
    }

    /// Direct connections take priority over a shared bus
    pub fn connection_method(&self, a: &NfId, b: &NfId) -> ConnectionMethod {
        if self.store.directly_connected(a, b) {
            ConnectionMethod::Direct
        } else if self.share_bus(a, b) {
            ConnectionMethod::Bus
        } else {
            ConnectionMethod::None
        }
    }

    /// True if both network functions are attached to at least one common bus
    pub fn share_bus(&self, a: &NfId, b: &NfId) -> bool {
        let buses_of_a = self.store.bus_connections_for_nf(a);
        if buses_of_a.is_empty() {
            return false;
        }
        self.store
            .bus_connections_for_nf(b)
            .iter()
            .any(|bc_b| buses_of_a.iter().any(|bc_a| bc_a.bus_id == bc_b.bus_id))
    }

    /// Every network function reachable from `id` over one hop,
    /// direct or through a bus, sorted by id
    pub fn peers(&self, id: &NfId) -> Vec<NfId> {
        let mut peers = self.store.neighbors(id);
        for bc in self.store.bus_connections_for_nf(id) {
            for other in self.store.bus_connections_for_bus(&bc.bus_id) {
                if &other.nf_id != id && !peers.contains(&other.nf_id) {
                    peers.push(other.nf_id.clone());
                }
            }
        }
        peers.sort();
        peers
    }
}

/// 3GPP reference point for an edge between two network function types.
///
/// Radio and user-plane links use their N-numbered reference points; every
/// other pair is named after the service-based interface of the target
/// (e.g. `Nnrf`, `Nudm`).
pub fn interface_name(source: NfType, target: NfType) -> String {
    use NfType::*;

    let fixed = match (source, target) {
        (Ue, Gnb) | (Gnb, Ue) => Some("Uu"),
        (Ue, Amf) | (Amf, Ue) => Some("N1"),
        (Gnb, Amf) | (Amf, Gnb) => Some("N2"),
        (Gnb, Upf) | (Upf, Gnb) => Some("N3"),
        (Smf, Upf) | (Upf, Smf) => Some("N4"),
        (Upf, DataNetwork) | (DataNetwork, Upf) | (Upf, ExtDn) | (ExtDn, Upf) => Some("N6"),
        (MySql, _) | (_, MySql) => Some("SQL"),
        _ => None,
    };

    match fixed {
        Some(name) => name.to_string(),
        None => format!("N{}", target.as_str().to_lowercase()),
    }
}
