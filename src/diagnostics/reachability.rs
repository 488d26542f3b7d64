//! Probabilistic reachability model.
//!
//! A probe from a source network function to an IP address is classified by
//! the first matching rule, and the rule's configured probability is the
//! chance that a single packet gets a reply.

use crate::config::ReachabilityConfig;
use crate::topology::connections::ConnectivityResolver;
use crate::topology::store::TopologyStore;
use crate::topology::types::NetworkFunction;
use crate::utils::ip_utils::same_subnet;
use rand::{Rng, RngCore};
use serde::Serialize;
use std::fmt;

/// Which reachability rule decided a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReachabilityRule {
    /// Source and target are on different /24 subnets
    CrossSubnet,
    /// Same subnet, but no network function owns the address
    UnknownHost,
    /// Either endpoint is not stable
    NotStable,
    /// Both stable, linked directly or through a bus
    Connected,
    /// Both stable, no link between them
    Unconnected,
}

impl fmt::Display for ReachabilityRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ReachabilityRule::CrossSubnet => "different subnet",
            ReachabilityRule::UnknownHost => "unknown host",
            ReachabilityRule::NotStable => "endpoint not stable",
            ReachabilityRule::Connected => "connected",
            ReachabilityRule::Unconnected => "not connected",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone)]
pub struct ReachabilityModel {
    config: ReachabilityConfig,
}

impl Default for ReachabilityModel {
    fn default() -> Self {
        Self::new(ReachabilityConfig::default())
    }
}

impl ReachabilityModel {
    pub fn new(config: ReachabilityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReachabilityConfig {
        &self.config
    }

    /// First matching rule for a probe from `source` to `target_ip`
    pub fn classify(
        &self,
        store: &TopologyStore,
        source: &NetworkFunction,
        target_ip: &str,
    ) -> ReachabilityRule {
        if !same_subnet(source.ip(), target_ip) {
            return ReachabilityRule::CrossSubnet;
        }

        let target = match store.find_nf_by_ip(target_ip) {
            Some(nf) => nf,
            None => return ReachabilityRule::UnknownHost,
        };

        if !source.is_stable() || !target.is_stable() {
            return ReachabilityRule::NotStable;
        }

        if ConnectivityResolver::new(store).connected(&source.id, &target.id) {
            ReachabilityRule::Connected
        } else {
            ReachabilityRule::Unconnected
        }
    }

    pub fn probability(&self, rule: ReachabilityRule) -> f64 {
        match rule {
            ReachabilityRule::CrossSubnet => self.config.cross_subnet,
            ReachabilityRule::UnknownHost => self.config.unknown_host,
            ReachabilityRule::NotStable => self.config.not_stable,
            ReachabilityRule::Connected => self.config.connected,
            ReachabilityRule::Unconnected => self.config.unconnected,
        }
    }

    pub fn success_probability(
        &self,
        store: &TopologyStore,
        source: &NetworkFunction,
        target_ip: &str,
    ) -> f64 {
        self.probability(self.classify(store, source, target_ip))
    }

    /// One Bernoulli draw against the rule's probability
    pub fn draw(&self, rule: ReachabilityRule, rng: &mut dyn RngCore) -> bool {
        rng.gen::<f64>() < self.probability(rule)
    }

    pub fn is_reachable(
        &self,
        store: &TopologyStore,
        source: &NetworkFunction,
        target_ip: &str,
        rng: &mut dyn RngCore,
    ) -> bool {
        self.draw(self.classify(store, source, target_ip), rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::types::*;
    use rand::rngs::mock::StepRng;
    use std::time::Duration;

    fn nf(id: &str, ip: &str, status: NfStatus) -> NetworkFunction {
        NetworkFunction {
            id: NfId::from(id),
            nf_type: NfType::Amf,
            name: id.to_uppercase(),
            position: Position::default(),
            status,
            status_since: Duration::ZERO,
            config: NfConfig {
                ip_address: ip.to_string(),
                port: 8080,
                http_protocol: HttpProtocol::Http2,
                capacity: 1000,
                load: 0,
            },
            created_at: Duration::ZERO,
            visual: NfType::Amf.visual(),
        }
    }

    fn store() -> TopologyStore {
        let mut store = TopologyStore::new();
        store.add_nf(nf("a", "192.168.1.10", NfStatus::Stable));
        store.add_nf(nf("b", "192.168.1.11", NfStatus::Stable));
        store.add_nf(nf("c", "192.168.1.12", NfStatus::Starting));
        store.add_nf(nf("d", "192.168.2.10", NfStatus::Stable));
        store
    }

    #[test]
    fn test_rule_precedence() {
        let mut store = store();
        let model = ReachabilityModel::default();
        let a = store.get_nf(&NfId::from("a")).unwrap().clone();

        assert_eq!(model.classify(&store, &a, "192.168.2.10"), ReachabilityRule::CrossSubnet);
        assert_eq!(model.classify(&store, &a, "192.168.1.99"), ReachabilityRule::UnknownHost);
        assert_eq!(model.classify(&store, &a, "192.168.1.12"), ReachabilityRule::NotStable);
        assert_eq!(model.classify(&store, &a, "192.168.1.11"), ReachabilityRule::Unconnected);

        store.add_connection(Connection {
            id: ConnectionId::from("c1"),
            source_id: NfId::from("b"),
            target_id: NfId::from("a"),
            kind: ConnectionKind::Manual,
            interface_name: "Namf".to_string(),
            options: ConnectionOptions::default(),
            created_at: Duration::ZERO,
        });
        assert_eq!(model.classify(&store, &a, "192.168.1.11"), ReachabilityRule::Connected);
        assert_eq!(model.success_probability(&store, &a, "192.168.1.11"), 0.95);
    }

    #[test]
    fn test_unstable_source() {
        let store = store();
        let model = ReachabilityModel::default();
        let c = store.get_nf(&NfId::from("c")).unwrap().clone();
        assert_eq!(model.classify(&store, &c, "192.168.1.10"), ReachabilityRule::NotStable);
        assert_eq!(model.success_probability(&store, &c, "192.168.1.10"), 0.3);
    }

    #[test]
    fn test_draws_with_fixed_rng() {
        let store = store();
        let model = ReachabilityModel::default();
        let a = store.get_nf(&NfId::from("a")).unwrap().clone();

        // Zero always succeeds unless the probability itself is zero
        let mut low = StepRng::new(0, 0);
        assert!(model.is_reachable(&store, &a, "192.168.1.11", &mut low));
        assert!(!model.is_reachable(&store, &a, "192.168.2.10", &mut low));

        // Close to one always fails below certainty
        let mut high = StepRng::new(u64::MAX, 0);
        assert!(!model.is_reachable(&store, &a, "192.168.1.11", &mut high));
    }
}
