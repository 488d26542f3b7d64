//! Simulation root.
//!
//! `Simulation` wires the topology store, address allocator, scheduler,
//! lifecycle engine and diagnostics simulator around one random source and
//! exposes the operations a front end drives. Time only moves when the
//! caller advances it; every due task is dispatched from here.

use crate::config::{SimulationConfig, ValidationError};
use crate::diagnostics::{
    CancelledProbe, DiagnosticsSimulator, PingReport, ProbeId, ReachabilityModel, ScanEntry,
    SubnetScanReport,
};
use crate::ip::{AddressAllocator, UsedAddresses};
use crate::lifecycle::{AutoConnectOutcome, LifecycleEngine, TaskKind, TaskScheduler};
use crate::topology::{
    interface_name, Bus, BusConnection, BusConnectionStatus, BusId, Connection, ConnectionId,
    ConnectionKind, ConnectionOptions, ConnectionPatch, ConnectivityResolver, HttpProtocol,
    NetworkFunction, NfConfigPatch, NfId, NfPatch, NfType, Orientation, Position, RemovedNf,
    Subscriber, SubscriptionId, TopologyError, TopologySnapshot, TopologyStore,
};
use crate::utils::ip_utils::{is_valid_ipv4, network_prefix};
use log::{debug, info, warn};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

/// Interface label used for bus attachments
pub const BUS_INTERFACE: &str = "SBI";

/// What happened while the clock moved
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickSummary {
    pub tasks_run: usize,
    /// Network functions that reached `stable`
    pub stabilized: Vec<NfId>,
    pub auto_connects: Vec<AutoConnectRecord>,
    pub completed_pings: Vec<PingReport>,
}

impl TickSummary {
    fn merge(&mut self, other: TickSummary) {
        self.tasks_run += other.tasks_run;
        self.stabilized.extend(other.stabilized);
        self.auto_connects.extend(other.auto_connects);
        self.completed_pings.extend(other.completed_pings);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoConnectRecord {
    pub nf_id: NfId,
    #[serde(flatten)]
    pub outcome: AutoConnectOutcome,
}

pub struct Simulation {
    config: SimulationConfig,
    store: TopologyStore,
    allocator: AddressAllocator,
    scheduler: TaskScheduler,
    lifecycle: LifecycleEngine,
    diagnostics: DiagnosticsSimulator,
    rng: Box<dyn RngCore>,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("now", &self.scheduler.now())
            .field("store", &self.store)
            .field("pending_tasks", &self.scheduler.len())
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Validate the configuration and seed ChaCha8 from `config.seed`
    /// (entropy when absent)
    pub fn new(config: SimulationConfig) -> Result<Self, ValidationError> {
        let rng: Box<dyn RngCore> = match config.seed {
            Some(seed) => Box::new(ChaCha8Rng::seed_from_u64(seed)),
            None => Box::new(ChaCha8Rng::from_entropy()),
        };
        Self::with_rng(config, rng)
    }

    /// Same as `new` with a caller-supplied random source
    pub fn with_rng(config: SimulationConfig, rng: Box<dyn RngCore>) -> Result<Self, ValidationError> {
        config.validate()?;
        info!(
            "Simulation ready: {} subnet(s), stable delay {:?}, seed {:?}",
            config.addressing.subnets.len(),
            config.lifecycle.stable_delay,
            config.seed
        );

        Ok(Self {
            store: TopologyStore::new(),
            allocator: AddressAllocator::new(config.addressing.clone()),
            scheduler: TaskScheduler::new(),
            lifecycle: LifecycleEngine::new(config.lifecycle.clone(), config.default_protocol),
            diagnostics: DiagnosticsSimulator::new(
                ReachabilityModel::new(config.reachability.clone()),
                config.ping.clone(),
            ),
            config,
            rng,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    // Network functions

    pub fn create_network_function(
        &mut self,
        nf_type: NfType,
        position: Option<Position>,
    ) -> Result<NetworkFunction, TopologyError> {
        self.lifecycle.create_network_function(
            nf_type,
            position,
            &self.allocator,
            &mut self.store,
            &mut self.scheduler,
            self.rng.as_mut(),
        )
    }

    /// Remove a network function with everything attached to it: edges,
    /// bus attachments, pending tasks, probes and ping history
    pub fn delete_network_function(&mut self, id: &NfId) -> Option<RemovedNf> {
        let removed = self
            .lifecycle
            .delete_network_function(id, &mut self.store, &mut self.scheduler)?;
        self.diagnostics.forget(id);
        Some(removed)
    }

    pub fn rename_network_function(&mut self, id: &NfId, name: &str) -> Result<bool, TopologyError> {
        self.require_nf(id)?;
        let patch = NfPatch {
            name: Some(name.to_string()),
            ..NfPatch::default()
        };
        Ok(self.store.update_nf(id, &patch))
    }

    pub fn move_network_function(
        &mut self,
        id: &NfId,
        position: Position,
    ) -> Result<bool, TopologyError> {
        if !position.is_finite() {
            return Err(TopologyError::InvalidPosition {
                x: position.x,
                y: position.y,
            });
        }
        self.require_nf(id)?;
        let patch = NfPatch {
            position: Some(position),
            ..NfPatch::default()
        };
        Ok(self.store.update_nf(id, &patch))
    }

    /// Apply a config edit after checking the new address and port are
    /// well-formed and free. Nothing changes on rejection.
    pub fn update_network_function_config(
        &mut self,
        id: &NfId,
        patch: NfConfigPatch,
    ) -> Result<bool, TopologyError> {
        let before = self.require_nf(id)?.config.clone();
        let others = UsedAddresses::excluding(self.store.nfs(), id);

        if let Some(ip) = &patch.ip_address {
            if !is_valid_ipv4(ip) {
                return Err(TopologyError::InvalidAddress(ip.clone()));
            }
            if let Some(owner) = others.ip_owner(ip) {
                return Err(TopologyError::IpConflict {
                    ip: ip.clone(),
                    owner: owner.name.clone(),
                });
            }
        }
        if let Some(port) = patch.port {
            if let Some(owner) = others.port_owner(port) {
                return Err(TopologyError::PortConflict {
                    port,
                    owner: owner.name.clone(),
                });
            }
        }

        self.store.update_nf(id, &NfPatch::config(patch));
        Ok(self.store.get_nf(id).is_some_and(|nf| nf.config != before))
    }

    pub fn start_network_function(&mut self, id: &NfId) -> Result<bool, TopologyError> {
        self.lifecycle.start(id, &mut self.store, &mut self.scheduler)
    }

    pub fn stop_network_function(&mut self, id: &NfId) -> Result<bool, TopologyError> {
        self.lifecycle.stop(id, &mut self.store, &mut self.scheduler)
    }

    pub fn fail_network_function(&mut self, id: &NfId) -> Result<bool, TopologyError> {
        self.lifecycle.fail(id, &mut self.store, &mut self.scheduler)
    }

    /// Set the protocol for future network functions and rewrite every
    /// existing one and every connection label. Returns how many network
    /// functions actually changed.
    pub fn update_global_protocol(&mut self, protocol: HttpProtocol) -> usize {
        self.lifecycle.set_default_protocol(protocol);

        let stale: Vec<NfId> = self
            .store
            .nfs()
            .iter()
            .filter(|nf| nf.config.http_protocol != protocol)
            .map(|nf| nf.id.clone())
            .collect();
        let patch = NfPatch::config(NfConfigPatch::protocol(protocol));
        for id in &stale {
            self.store.update_nf(id, &patch);
        }
        let changed = stale.len();

        let connection_ids: Vec<ConnectionId> =
            self.store.connections().iter().map(|c| c.id.clone()).collect();
        let relabel = ConnectionPatch {
            protocol: Some(protocol),
            ..ConnectionPatch::default()
        };
        for id in &connection_ids {
            self.store.update_connection(id, &relabel);
        }

        info!("Global protocol set to {}: {} network function(s) updated", protocol, changed);
        changed
    }

    // Connections and buses

    /// Draw a manual edge between two network functions
    pub fn connect(
        &mut self,
        source: &NfId,
        target: &NfId,
        options: ConnectionOptions,
    ) -> Result<ConnectionId, TopologyError> {
        if source == target {
            return Err(TopologyError::SelfConnection(source.clone()));
        }
        let source_type = self.require_nf(source)?.nf_type;
        let target_type = self.require_nf(target)?.nf_type;
        if self.store.directly_connected(source, target) {
            return Err(TopologyError::DuplicateConnection {
                first: source.clone(),
                second: target.clone(),
            });
        }

        let connection = Connection {
            id: self.lifecycle.next_connection_id(self.rng.as_mut()),
            source_id: source.clone(),
            target_id: target.clone(),
            kind: ConnectionKind::Manual,
            interface_name: interface_name(source_type, target_type),
            options,
            created_at: self.scheduler.now(),
        };
        let id = connection.id.clone();
        info!(
            "Connected {} -> {} over {}",
            source, target, connection.interface_name
        );
        self.store.add_connection(connection);
        Ok(id)
    }

    pub fn disconnect(&mut self, id: &ConnectionId) -> Option<Connection> {
        self.store.remove_connection(id)
    }

    pub fn create_bus(
        &mut self,
        name: &str,
        orientation: Orientation,
        position: Position,
        length: f64,
    ) -> Result<BusId, TopologyError> {
        if !position.is_finite() {
            return Err(TopologyError::InvalidPosition {
                x: position.x,
                y: position.y,
            });
        }
        let bus = Bus {
            id: self.lifecycle.next_bus_id(self.rng.as_mut()),
            name: name.to_string(),
            orientation,
            position,
            length,
            connections: Vec::new(),
        };
        let id = bus.id.clone();
        info!("Created bus {} ({})", name, id);
        self.store.add_bus(bus);
        Ok(id)
    }

    pub fn remove_bus(&mut self, id: &BusId) -> Option<Bus> {
        self.store.remove_bus(id)
    }

    /// Attach a network function to a bus. Attaching twice returns the
    /// existing attachment.
    pub fn attach_to_bus(
        &mut self,
        nf_id: &NfId,
        bus_id: &BusId,
    ) -> Result<crate::topology::BusConnectionId, TopologyError> {
        self.require_nf(nf_id)?;
        if self.store.get_bus(bus_id).is_none() {
            return Err(TopologyError::BusNotFound(bus_id.clone()));
        }
        if let Some(existing) = self
            .store
            .bus_connections_for_nf(nf_id)
            .into_iter()
            .find(|bc| &bc.bus_id == bus_id)
        {
            debug!("{} is already attached to bus {}", nf_id, bus_id);
            return Ok(existing.id.clone());
        }

        let attachment = BusConnection {
            id: self.lifecycle.next_bus_connection_id(self.rng.as_mut()),
            nf_id: nf_id.clone(),
            bus_id: bus_id.clone(),
            interface_name: BUS_INTERFACE.to_string(),
            status: BusConnectionStatus::Active,
            created_at: self.scheduler.now(),
        };
        let id = attachment.id.clone();
        self.store.add_bus_connection(attachment);
        Ok(id)
    }

    /// Remove every attachment of `nf_id` to `bus_id`
    pub fn detach_from_bus(&mut self, nf_id: &NfId, bus_id: &BusId) -> bool {
        let ids: Vec<_> = self
            .store
            .bus_connections_for_nf(nf_id)
            .into_iter()
            .filter(|bc| &bc.bus_id == bus_id)
            .map(|bc| bc.id.clone())
            .collect();
        for id in &ids {
            self.store.remove_bus_connection(id);
        }
        !ids.is_empty()
    }

    // Time

    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    /// Run every task due within `by` and move the clock forward by `by`
    pub fn advance(&mut self, by: Duration) -> TickSummary {
        let deadline = self.scheduler.now() + by;
        self.advance_to(deadline)
    }

    pub fn advance_to(&mut self, deadline: Duration) -> TickSummary {
        let mut summary = TickSummary::default();
        while let Some(task) = self.scheduler.pop_due(deadline) {
            summary.tasks_run += 1;
            match task.kind {
                TaskKind::BecomeStable => {
                    if self.lifecycle.handle_become_stable(
                        &task.owner,
                        &mut self.store,
                        &mut self.scheduler,
                        self.rng.as_mut(),
                    ) {
                        summary.stabilized.push(task.owner);
                    }
                }
                TaskKind::AutoConnect => {
                    let outcome = self.lifecycle.attempt_auto_connections(
                        &task.owner,
                        &mut self.store,
                        &self.scheduler,
                        self.rng.as_mut(),
                    );
                    summary.auto_connects.push(AutoConnectRecord {
                        nf_id: task.owner,
                        outcome,
                    });
                }
                TaskKind::ProbeComplete(probe) => {
                    if let Some(report) = self.diagnostics.complete_probe(probe) {
                        summary.completed_pings.push(report);
                    }
                }
            }
        }
        self.scheduler.advance_to(deadline);
        summary
    }

    /// Run until no task is pending. Nothing reschedules itself, so this
    /// always terminates.
    pub fn run_until_idle(&mut self) -> TickSummary {
        let mut summary = TickSummary::default();
        while let Some(due) = self.scheduler.next_due() {
            summary.merge(self.advance_to(due));
        }
        summary
    }

    /// Run the auto-connection rules for `id` right away
    pub fn auto_connect(&mut self, id: &NfId) -> AutoConnectOutcome {
        self.lifecycle.attempt_auto_connections(
            id,
            &mut self.store,
            &self.scheduler,
            self.rng.as_mut(),
        )
    }

    // Diagnostics

    pub fn start_ping(
        &mut self,
        source: &NfId,
        target_ip: &str,
        count: u32,
    ) -> Result<ProbeId, TopologyError> {
        self.diagnostics.start_ping(
            &self.store,
            &mut self.scheduler,
            source,
            target_ip,
            count,
            self.rng.as_mut(),
        )
    }

    /// Start a probe and advance the clock until it completes
    pub fn ping_once(
        &mut self,
        source: &NfId,
        target_ip: &str,
        count: u32,
    ) -> Result<PingReport, TopologyError> {
        let probe = self.start_ping(source, target_ip, count)?;
        let due = self
            .diagnostics
            .active_probes()
            .iter()
            .find(|p| p.report.probe == probe)
            .map(|p| p.report.completed_at)
            .unwrap_or_else(|| self.now());

        let summary = self.advance_to(due);
        summary
            .completed_pings
            .into_iter()
            .find(|report| report.probe == probe)
            .ok_or_else(|| TopologyError::NotFound(source.clone()))
    }

    /// Single-packet probe of every other network function in the source's
    /// subnet, one `scan_interval` apart
    pub fn ping_subnet(&mut self, source: &NfId) -> Result<SubnetScanReport, TopologyError> {
        let plan = self.diagnostics.plan_subnet_scan(&self.store, source)?;
        let mut report = SubnetScanReport {
            source_id: plan.source_id.clone(),
            subnet: plan.subnet.clone(),
            stable_count: plan.stable_count(),
            unstable_count: plan.unstable_count(),
            entries: Vec::with_capacity(plan.targets.len()),
        };
        if plan.targets.is_empty() {
            return Ok(report);
        }

        let scan_interval = self.diagnostics.config().scan_interval;
        let summary_delay = self.diagnostics.config().summary_delay;
        for target in plan.targets {
            self.advance(scan_interval);
            let ping = self.ping_once(source, target.ip(), 1)?;
            report.entries.push(ScanEntry {
                nf_id: target.id,
                name: target.name,
                nf_type: target.nf_type,
                ip_address: target.config.ip_address,
                status: target.status,
                report: ping,
            });
        }
        self.advance(summary_delay);

        info!(
            "Subnet scan of {} finished: {}/{} responsive",
            report.subnet,
            report.responsive(),
            report.entries.len()
        );
        Ok(report)
    }

    pub fn is_ping_active(&self, source: &NfId) -> bool {
        self.diagnostics.is_ping_active(source)
    }

    pub fn cancel_ping(&mut self, source: &NfId) -> Option<CancelledProbe> {
        self.diagnostics.cancel_ping(source, &mut self.scheduler)
    }

    pub fn ping_history(&self, nf_id: &NfId) -> &[PingReport] {
        self.diagnostics.ping_history(nf_id)
    }

    pub fn clear_ping_history(&mut self, nf_id: &NfId) -> bool {
        self.diagnostics.clear_ping_history(nf_id)
    }

    // Queries

    pub fn store(&self) -> &TopologyStore {
        &self.store
    }

    pub fn resolver(&self) -> ConnectivityResolver<'_> {
        ConnectivityResolver::new(&self.store)
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn snapshot(&self) -> TopologySnapshot {
        self.store.snapshot()
    }

    pub fn nf_count_by_type(&self) -> BTreeMap<NfType, usize> {
        let mut counts = BTreeMap::new();
        for nf in self.store.nfs() {
            *counts.entry(nf.nf_type).or_insert(0) += 1;
        }
        counts
    }

    pub fn existing_nf_types(&self) -> BTreeSet<NfType> {
        self.store.nfs().iter().map(|nf| nf.nf_type).collect()
    }

    pub fn stable_services(&self) -> Vec<&NetworkFunction> {
        self.store.nfs().iter().filter(|nf| nf.is_stable()).collect()
    }

    /// Network functions whose address starts with `prefix` (e.g. `192.168.1`
    /// or a full address, whose first three octets are used)
    pub fn nfs_in_subnet(&self, prefix: &str) -> Vec<&NetworkFunction> {
        let prefix = if is_valid_ipv4(prefix) {
            network_prefix(prefix)
        } else {
            prefix.to_string()
        };
        self.store
            .nfs()
            .iter()
            .filter(|nf| network_prefix(nf.ip()) == prefix)
            .collect()
    }

    /// Time spent in the current status
    pub fn uptime(&self, id: &NfId) -> Option<Duration> {
        self.store
            .get_nf(id)
            .map(|nf| self.now().saturating_sub(nf.status_since))
    }

    pub fn subscribe(&mut self, subscriber: Subscriber) -> SubscriptionId {
        self.store.subscribe(subscriber)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }

    /// Empty the topology and drop every pending task, probe and history
    /// entry. The clock, subscribers and the default protocol are kept.
    pub fn reset(&mut self) {
        let pending = self.scheduler.len();
        self.scheduler.clear();
        self.diagnostics.reset();
        self.lifecycle.reset();
        self.store.clear_all();
        if pending > 0 {
            warn!("Reset dropped {} pending task(s)", pending);
        }
        info!("Simulation reset");
    }

    fn require_nf(&self, id: &NfId) -> Result<&NetworkFunction, TopologyError> {
        self.store
            .get_nf(id)
            .ok_or_else(|| TopologyError::NotFound(id.clone()))
    }
}
