//! Network function lifecycle engine.
//!
//! Creates network functions, drives them through the status state machine
//! and runs the auto-connection rules once they become stable. The engine
//! keeps only naming state of its own; the store, scheduler and random
//! source are handed in by the caller on every operation.

use crate::config::LifecycleConfig;
use crate::ip::{AddressAllocator, UsedAddresses};
use crate::lifecycle::rules::{self, NamingCounters};
use crate::lifecycle::scheduler::{TaskKind, TaskScheduler};
use crate::topology::connections::interface_name;
use crate::topology::events::RemovedNf;
use crate::topology::store::TopologyStore;
use crate::topology::types::{
    BusConnectionId, BusId, Connection, ConnectionId, ConnectionKind, ConnectionOptions,
    HttpProtocol, LineStyle, NetworkFunction, NfConfig, NfId, NfPatch, NfStatus, NfType, Position,
};
use crate::topology::TopologyError;
use crate::utils::ip_utils::same_subnet;
use log::{debug, info, warn};
use rand::{Rng, RngCore};
use serde::Serialize;

pub const DEFAULT_CAPACITY: u32 = 1000;

/// What one auto-connection attempt did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoConnectOutcome {
    /// Connections created by this attempt
    pub created: Vec<ConnectionId>,
    /// Required types that exist, stable, but only outside the subnet
    pub blocked: Vec<NfType>,
    /// The network function was gone or no longer stable
    pub skipped: bool,
}

impl AutoConnectOutcome {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleEngine {
    config: LifecycleConfig,
    counters: NamingCounters,
    default_protocol: HttpProtocol,
}

impl LifecycleEngine {
    pub fn new(config: LifecycleConfig, default_protocol: HttpProtocol) -> Self {
        Self {
            config,
            counters: NamingCounters::new(),
            default_protocol,
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn counters(&self) -> &NamingCounters {
        &self.counters
    }

    /// Protocol given to network functions created from now on
    pub fn default_protocol(&self) -> HttpProtocol {
        self.default_protocol
    }

    pub fn set_default_protocol(&mut self, protocol: HttpProtocol) {
        self.default_protocol = protocol;
    }

    /// Allocate identity and addressing, insert as `starting` and schedule
    /// the transition to `stable`
    pub fn create_network_function(
        &mut self,
        nf_type: NfType,
        position: Option<Position>,
        allocator: &AddressAllocator,
        store: &mut TopologyStore,
        scheduler: &mut TaskScheduler,
        rng: &mut dyn RngCore,
    ) -> Result<NetworkFunction, TopologyError> {
        if let Some(pos) = position {
            if !pos.is_finite() {
                return Err(TopologyError::InvalidPosition { x: pos.x, y: pos.y });
            }
        }

        let count = self.counters.next_count(nf_type);
        let position = position.unwrap_or_else(|| rules::grid_position(count));

        // Fresh snapshot so back-to-back creations see each other
        let used = UsedAddresses::from_nfs(store.nfs());
        let ip_address = allocator.allocate_ip(&used.ip_set(), rng);
        let port = allocator.allocate_port(&used.port_set(), rng);

        let serial = self.counters.next_serial();
        let now = scheduler.now();
        let nf = NetworkFunction {
            id: rules::nf_id(nf_type, serial, rng),
            nf_type,
            name: rules::nf_name(nf_type, count),
            position,
            status: NfStatus::Starting,
            status_since: now,
            config: NfConfig {
                ip_address,
                port,
                http_protocol: self.default_protocol,
                capacity: DEFAULT_CAPACITY,
                load: 0,
            },
            created_at: now,
            visual: nf_type.visual(),
        };

        store.add_nf(nf.clone());
        scheduler.schedule(self.config.stable_delay, nf.id.clone(), TaskKind::BecomeStable);

        info!(
            "Created {} ({}) at {}:{}, stable in {:?}",
            nf.name, nf.id, nf.config.ip_address, nf.config.port, self.config.stable_delay
        );
        Ok(nf)
    }

    /// Cancel everything owned by the network function, then remove it.
    /// Unknown ids are a no-op.
    pub fn delete_network_function(
        &self,
        id: &NfId,
        store: &mut TopologyStore,
        scheduler: &mut TaskScheduler,
    ) -> Option<RemovedNf> {
        let cancelled = scheduler.cancel_owner(id);
        let removed = store.remove_nf(id)?;
        info!(
            "Deleted {} ({}): {} connection(s), {} bus attachment(s), {} pending task(s) dropped",
            removed.nf.name,
            id,
            removed.connections.len(),
            removed.bus_connections.len(),
            cancelled.len()
        );
        Some(removed)
    }

    /// `BecomeStable` handler. Returns false when the task was stale.
    pub fn handle_become_stable(
        &mut self,
        id: &NfId,
        store: &mut TopologyStore,
        scheduler: &mut TaskScheduler,
        rng: &mut dyn RngCore,
    ) -> bool {
        match store.get_nf(id).map(|nf| nf.status) {
            Some(NfStatus::Starting) => {}
            Some(status) => {
                debug!("Ignoring stabilization of {}: status is {}", id, status);
                return false;
            }
            None => {
                debug!("Ignoring stabilization of removed network function {}", id);
                return false;
            }
        }

        store.update_nf(id, &NfPatch::status(NfStatus::Stable, scheduler.now()));

        let delay = rng.gen_range(self.config.auto_connect_delay_min..=self.config.auto_connect_delay_max);
        scheduler.schedule(delay, id.clone(), TaskKind::AutoConnect);

        if let Some(nf) = store.get_nf(id) {
            info!("{} is now stable, auto-connect in {:?}", nf.name, delay);
        }
        true
    }

    /// Connect a stable network function to the first stable peer of each
    /// type its rules require, within its own subnet. Safe to repeat.
    pub fn attempt_auto_connections(
        &mut self,
        id: &NfId,
        store: &mut TopologyStore,
        scheduler: &TaskScheduler,
        rng: &mut dyn RngCore,
    ) -> AutoConnectOutcome {
        let source = match store.get_nf(id) {
            Some(nf) if nf.is_stable() => nf.clone(),
            Some(nf) => {
                debug!("Skipping auto-connect for {}: status is {}", nf.name, nf.status);
                return AutoConnectOutcome::skipped();
            }
            None => {
                debug!("Skipping auto-connect for removed network function {}", id);
                return AutoConnectOutcome::skipped();
            }
        };

        let mut outcome = AutoConnectOutcome::default();
        let mut plan: Vec<(NfId, NfType)> = Vec::new();

        for &target_type in rules::auto_connect_targets(source.nf_type) {
            let mut candidates = store
                .nfs()
                .iter()
                .filter(|nf| nf.id != source.id && nf.nf_type == target_type && nf.is_stable());

            let local = candidates
                .clone()
                .find(|nf| same_subnet(nf.ip(), source.ip()));

            match local {
                Some(target) => {
                    if !store.directly_connected(&source.id, &target.id) {
                        plan.push((target.id.clone(), target_type));
                    }
                }
                None => {
                    if candidates.any(|nf| !same_subnet(nf.ip(), source.ip())) {
                        warn!(
                            "{} cannot auto-connect to {}: only available outside subnet {}",
                            source.name,
                            target_type,
                            crate::utils::subnet_cidr(source.ip())
                        );
                        outcome.blocked.push(target_type);
                    }
                }
            }
        }

        for (target_id, target_type) in plan {
            let serial = self.counters.next_serial();
            let connection = Connection {
                id: ConnectionId::new(rules::entity_id("auto", serial, rng)),
                source_id: source.id.clone(),
                target_id: target_id.clone(),
                kind: ConnectionKind::Auto,
                interface_name: interface_name(source.nf_type, target_type),
                options: ConnectionOptions {
                    style: LineStyle::Dashed,
                    protocol: source.config.http_protocol,
                    visible: false,
                    ..ConnectionOptions::default()
                },
                created_at: scheduler.now(),
            };
            info!(
                "Auto-connected {} -> {} over {}",
                source.name, target_id, connection.interface_name
            );
            outcome.created.push(connection.id.clone());
            store.add_connection(connection);
        }

        outcome
    }

    /// `stopped|error -> starting`, scheduling a fresh stabilization
    pub fn start(
        &self,
        id: &NfId,
        store: &mut TopologyStore,
        scheduler: &mut TaskScheduler,
    ) -> Result<bool, TopologyError> {
        if !Self::transition(id, &[NfStatus::Stopped, NfStatus::Error], NfStatus::Starting, store, scheduler)? {
            return Ok(false);
        }
        scheduler.schedule(self.config.stable_delay, id.clone(), TaskKind::BecomeStable);
        Ok(true)
    }

    /// `starting|stable|error -> stopped`
    pub fn stop(
        &self,
        id: &NfId,
        store: &mut TopologyStore,
        scheduler: &mut TaskScheduler,
    ) -> Result<bool, TopologyError> {
        Self::transition(
            id,
            &[NfStatus::Starting, NfStatus::Stable, NfStatus::Error],
            NfStatus::Stopped,
            store,
            scheduler,
        )
    }

    /// `starting|stable -> error`
    pub fn fail(
        &self,
        id: &NfId,
        store: &mut TopologyStore,
        scheduler: &mut TaskScheduler,
    ) -> Result<bool, TopologyError> {
        Self::transition(
            id,
            &[NfStatus::Starting, NfStatus::Stable],
            NfStatus::Error,
            store,
            scheduler,
        )
    }

    pub fn next_connection_id(&mut self, rng: &mut dyn RngCore) -> ConnectionId {
        let serial = self.counters.next_serial();
        ConnectionId::new(rules::entity_id("conn", serial, rng))
    }

    pub fn next_bus_id(&mut self, rng: &mut dyn RngCore) -> BusId {
        let serial = self.counters.next_serial();
        BusId::new(rules::entity_id("bus", serial, rng))
    }

    pub fn next_bus_connection_id(&mut self, rng: &mut dyn RngCore) -> BusConnectionId {
        let serial = self.counters.next_serial();
        BusConnectionId::new(rules::entity_id("busconn", serial, rng))
    }

    pub fn reset(&mut self) {
        self.counters.reset_names();
    }

    /// Apply a status change if the current status is one of `from`.
    /// Pending lifecycle tasks are dropped on every applied transition.
    fn transition(
        id: &NfId,
        from: &[NfStatus],
        to: NfStatus,
        store: &mut TopologyStore,
        scheduler: &mut TaskScheduler,
    ) -> Result<bool, TopologyError> {
        let nf = store
            .get_nf(id)
            .ok_or_else(|| TopologyError::NotFound(id.clone()))?;

        if !from.contains(&nf.status) {
            debug!("{} cannot go from {} to {}", nf.name, nf.status, to);
            return Ok(false);
        }

        let (name, previous) = (nf.name.clone(), nf.status);
        scheduler.cancel_owner_where(id, TaskKind::is_lifecycle);
        store.update_nf(id, &NfPatch::status(to, scheduler.now()));
        info!("{}: {} -> {}", name, previous, to);
        Ok(true)
    }
}
