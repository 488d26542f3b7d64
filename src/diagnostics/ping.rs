//! Simulated ping sessions.
//!
//! Every packet outcome is drawn when a probe starts; the scheduler only
//! paces when each line becomes visible. Cancelling a probe therefore never
//! changes a result, it only truncates the transcript.

use super::reachability::{ReachabilityModel, ReachabilityRule};
use crate::config::PingConfig;
use crate::lifecycle::scheduler::{TaskKey, TaskKind, TaskScheduler};
use crate::topology::store::TopologyStore;
use crate::topology::types::{NetworkFunction, NfId, NfStatus, NfType};
use crate::topology::TopologyError;
use crate::utils::ip_utils::{is_valid_ipv4, subnet_cidr};
use log::{info, warn};
use rand::{Rng, RngCore};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Bytes per echo request shown in transcripts
pub const PAYLOAD_BYTES: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ProbeId(pub(crate) u64);

impl fmt::Display for ProbeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ping-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum PacketOutcome {
    Reply { latency_ms: u32, ttl: u8 },
    Timeout,
}

/// One echo request and its fate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketResult {
    /// 1-based
    pub sequence: u32,
    /// Offset from probe start at which the line appears
    #[serde(with = "humantime_serde")]
    pub at: Duration,
    #[serde(flatten)]
    pub outcome: PacketOutcome,
}

impl PacketResult {
    pub fn latency_ms(&self) -> Option<u32> {
        match self.outcome {
            PacketOutcome::Reply { latency_ms, .. } => Some(latency_ms),
            PacketOutcome::Timeout => None,
        }
    }

    pub fn is_reply(&self) -> bool {
        self.latency_ms().is_some()
    }
}

/// Aggregates over a probe's packets
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingStatistics {
    pub sent: u32,
    pub received: u32,
    pub lost: u32,
    pub loss_percent: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_ms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_ms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_ms: Option<u32>,
}

impl PingStatistics {
    pub fn from_packets(packets: &[PacketResult]) -> Self {
        let latencies: Vec<u32> = packets.iter().filter_map(PacketResult::latency_ms).collect();
        let sent = packets.len() as u32;
        let received = latencies.len() as u32;
        let lost = sent - received;
        let loss_percent = if sent == 0 {
            0
        } else {
            (f64::from(lost) * 100.0 / f64::from(sent)).round() as u32
        };
        let avg_ms = if latencies.is_empty() {
            None
        } else {
            let total: u64 = latencies.iter().map(|&ms| u64::from(ms)).sum();
            Some((total as f64 / latencies.len() as f64).round() as u32)
        };

        Self {
            sent,
            received,
            lost,
            loss_percent,
            min_ms: latencies.iter().min().copied(),
            max_ms: latencies.iter().max().copied(),
            avg_ms,
        }
    }
}

impl fmt::Display for PingStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "    Packets: Sent = {}, Received = {}, Lost = {} ({}% loss),",
            self.sent, self.received, self.lost, self.loss_percent
        )?;
        if let (Some(min), Some(max), Some(avg)) = (self.min_ms, self.max_ms, self.avg_ms) {
            write!(
                f,
                "\nApproximate round trip times in milli-seconds:\n    Minimum = {}ms, Maximum = {}ms, Average = {}ms",
                min, max, avg
            )?;
        }
        Ok(())
    }
}

/// A completed (or precomputed) ping session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingReport {
    pub probe: ProbeId,
    pub source_id: NfId,
    pub source_name: String,
    pub target_ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    pub rule: ReachabilityRule,
    pub probability: f64,
    #[serde(with = "humantime_serde")]
    pub started_at: Duration,
    #[serde(with = "humantime_serde")]
    pub completed_at: Duration,
    pub packets: Vec<PacketResult>,
    pub statistics: PingStatistics,
}

impl PingReport {
    /// Console output in the Windows `ping` layout
    pub fn transcript(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.packets.len() + 2);
        lines.push(format!(
            "Pinging {} with {} bytes of data:",
            self.target_ip, PAYLOAD_BYTES
        ));
        lines.extend(self.packets.iter().map(|p| packet_line(&self.target_ip, p)));
        lines.push(format!(
            "Ping statistics for {}:\n{}",
            self.target_ip, self.statistics
        ));
        lines
    }
}

fn packet_line(target_ip: &str, packet: &PacketResult) -> String {
    match packet.outcome {
        PacketOutcome::Reply { latency_ms, ttl } => format!(
            "Reply from {}: bytes={} time={}ms TTL={}",
            target_ip, PAYLOAD_BYTES, latency_ms, ttl
        ),
        PacketOutcome::Timeout => "Request timed out.".to_string(),
    }
}

/// Probe whose report is computed but not yet delivered
#[derive(Debug, Clone)]
pub struct ActiveProbe {
    pub report: PingReport,
    pub task: TaskKey,
}

/// What the caller saw of a probe that was interrupted
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledProbe {
    pub probe: ProbeId,
    pub source_id: NfId,
    pub target_ip: String,
    #[serde(with = "humantime_serde")]
    pub cancelled_at: Duration,
    /// Packets whose lines had already appeared
    pub elapsed: Vec<PacketResult>,
}

/// One target of a subnet scan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEntry {
    pub nf_id: NfId,
    pub name: String,
    pub nf_type: NfType,
    pub ip_address: String,
    /// Status when the scan started
    pub status: NfStatus,
    pub report: PingReport,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetScanReport {
    pub source_id: NfId,
    pub subnet: String,
    pub stable_count: usize,
    pub unstable_count: usize,
    pub entries: Vec<ScanEntry>,
}

impl SubnetScanReport {
    /// Number of targets that answered at least once
    pub fn responsive(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.report.statistics.received > 0)
            .count()
    }
}

/// Targets of a subnet scan, in store order
#[derive(Debug, Clone)]
pub struct ScanPlan {
    pub source_id: NfId,
    pub subnet: String,
    pub targets: Vec<NetworkFunction>,
}

impl ScanPlan {
    pub fn stable_count(&self) -> usize {
        self.targets.iter().filter(|nf| nf.is_stable()).count()
    }

    pub fn unstable_count(&self) -> usize {
        self.targets.len() - self.stable_count()
    }
}

/// In-flight probes plus per-network-function history
#[derive(Debug, Clone)]
pub struct DiagnosticsSimulator {
    model: ReachabilityModel,
    config: PingConfig,
    next_probe: u64,
    /// In start order
    active: Vec<ActiveProbe>,
    history: HashMap<NfId, Vec<PingReport>>,
}

impl DiagnosticsSimulator {
    pub fn new(model: ReachabilityModel, config: PingConfig) -> Self {
        Self {
            model,
            config,
            next_probe: 0,
            active: Vec::new(),
            history: HashMap::new(),
        }
    }

    pub fn model(&self) -> &ReachabilityModel {
        &self.model
    }

    pub fn config(&self) -> &PingConfig {
        &self.config
    }

    /// Draw every packet of a probe and schedule its completion
    pub fn start_ping(
        &mut self,
        store: &TopologyStore,
        scheduler: &mut TaskScheduler,
        source_id: &NfId,
        target_ip: &str,
        count: u32,
        rng: &mut dyn RngCore,
    ) -> Result<ProbeId, TopologyError> {
        let source = store
            .get_nf(source_id)
            .ok_or_else(|| TopologyError::NotFound(source_id.clone()))?;
        if !is_valid_ipv4(target_ip) {
            return Err(TopologyError::InvalidAddress(target_ip.to_string()));
        }

        let rule = self.model.classify(store, source, target_ip);
        let probability = self.model.probability(rule);

        let mut packets = Vec::new();
        let mut offset = Duration::ZERO;
        for sequence in 1..=count.max(1) {
            offset += self.config.packet_interval;
            let outcome = if self.model.draw(rule, rng) {
                PacketOutcome::Reply {
                    latency_ms: rng.gen_range(self.config.latency_min_ms..=self.config.latency_max_ms),
                    ttl: self.config.ttl,
                }
            } else {
                offset += self.config.timeout_penalty;
                PacketOutcome::Timeout
            };
            packets.push(PacketResult {
                sequence,
                at: offset,
                outcome,
            });
        }
        let duration = offset + self.config.summary_delay;

        self.next_probe += 1;
        let probe = ProbeId(self.next_probe);
        let started_at = scheduler.now();
        let report = PingReport {
            probe,
            source_id: source.id.clone(),
            source_name: source.name.clone(),
            target_ip: target_ip.to_string(),
            target_name: store.find_nf_by_ip(target_ip).map(|nf| nf.name.clone()),
            rule,
            probability,
            started_at,
            completed_at: started_at + duration,
            statistics: PingStatistics::from_packets(&packets),
            packets,
        };

        info!(
            "{} pinging {} ({} packet(s), {}, p={})",
            report.source_name, target_ip, report.packets.len(), rule, probability
        );

        let task = scheduler.schedule(duration, source.id.clone(), TaskKind::ProbeComplete(probe));
        self.active.push(ActiveProbe { report, task });
        Ok(probe)
    }

    /// `ProbeComplete` handler: move the report into history
    pub fn complete_probe(&mut self, probe: ProbeId) -> Option<PingReport> {
        let index = self.active.iter().position(|p| p.report.probe == probe)?;
        let report = self.active.remove(index).report;

        info!(
            "{} -> {}: sent {}, received {}, {}% loss",
            report.source_name,
            report.target_ip,
            report.statistics.sent,
            report.statistics.received,
            report.statistics.loss_percent
        );

        let history = self.history.entry(report.source_id.clone()).or_default();
        history.push(report.clone());
        if history.len() > self.config.history_limit {
            let excess = history.len() - self.config.history_limit;
            history.drain(..excess);
        }
        Some(report)
    }

    pub fn is_ping_active(&self, source_id: &NfId) -> bool {
        self.active.iter().any(|p| &p.report.source_id == source_id)
    }

    pub fn active_probes(&self) -> &[ActiveProbe] {
        &self.active
    }

    /// Interrupt the oldest in-flight probe of `source_id`
    pub fn cancel_ping(
        &mut self,
        source_id: &NfId,
        scheduler: &mut TaskScheduler,
    ) -> Option<CancelledProbe> {
        let index = self
            .active
            .iter()
            .position(|p| &p.report.source_id == source_id)?;
        let ActiveProbe { report, task } = self.active.remove(index);
        scheduler.cancel(task);

        let now = scheduler.now();
        let elapsed: Vec<PacketResult> = report
            .packets
            .iter()
            .filter(|p| report.started_at + p.at <= now)
            .copied()
            .collect();

        warn!(
            "Ping from {} to {} cancelled by user after {} of {} packet(s)",
            report.source_name,
            report.target_ip,
            elapsed.len(),
            report.packets.len()
        );

        Some(CancelledProbe {
            probe: report.probe,
            source_id: report.source_id,
            target_ip: report.target_ip,
            cancelled_at: now,
            elapsed,
        })
    }

    /// Other network functions in the source's subnet, regardless of status
    pub fn plan_subnet_scan(
        &self,
        store: &TopologyStore,
        source_id: &NfId,
    ) -> Result<ScanPlan, TopologyError> {
        let source = store
            .get_nf(source_id)
            .ok_or_else(|| TopologyError::NotFound(source_id.clone()))?;
        let subnet = subnet_cidr(source.ip());
        let targets: Vec<NetworkFunction> = store
            .nfs()
            .iter()
            .filter(|nf| nf.id != source.id && crate::utils::same_subnet(nf.ip(), source.ip()))
            .cloned()
            .collect();

        if targets.is_empty() {
            warn!("No other services found in subnet {}", subnet);
        } else {
            info!(
                "{} scanning {}: {} service(s) found",
                source.name,
                subnet,
                targets.len()
            );
        }

        Ok(ScanPlan {
            source_id: source.id.clone(),
            subnet,
            targets,
        })
    }

    /// Completed sessions of `nf_id`, oldest first
    pub fn ping_history(&self, nf_id: &NfId) -> &[PingReport] {
        self.history.get(nf_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn clear_ping_history(&mut self, nf_id: &NfId) -> bool {
        self.history.remove(nf_id).is_some()
    }

    /// Drop probes and history of a removed network function. Its scheduler
    /// tasks are expected to be cancelled by the caller.
    pub fn forget(&mut self, nf_id: &NfId) {
        self.active.retain(|p| &p.report.source_id != nf_id);
        self.history.remove(nf_id);
    }

    pub fn reset(&mut self) {
        self.active.clear();
        self.history.clear();
    }
}
