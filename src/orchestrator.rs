//! Scenario orchestrator.
//!
//! This module drives a `Simulation` through the steps of a declarative
//! scenario and collects what happened into a serializable report. Network
//! functions are referenced by name; a failing step is recorded and the run
//! carries on with the next one.

use crate::config::SimulationConfig;
use crate::diagnostics::{CancelledProbe, PingReport, SubnetScanReport};
use crate::simulation::{AutoConnectRecord, Simulation, TickSummary};
use crate::topology::{
    ConnectionOptions, HttpProtocol, NfConfigPatch, NfId, NfType, Orientation, Position,
    TopologyError, TopologySnapshot,
};
use crate::utils::ip_utils::is_valid_ipv4;
use color_eyre::eyre::WrapErr;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_count() -> u32 {
    1
}

fn default_ping_count() -> u32 {
    4
}

fn default_bus_length() -> f64 {
    600.0
}

/// A scenario file: optional simulation settings plus an ordered step list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub simulation: SimulationConfig,
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Check the configuration and the parts of each step that can be
    /// checked without running it
    pub fn validate(&self) -> Result<(), ScenarioError> {
        self.simulation.validate()?;
        for (index, step) in self.steps.iter().enumerate() {
            let problem = match step {
                Step::Create { count: 0, .. } => Some("count must be at least 1"),
                Step::Ping { count: 0, .. } => Some("count must be at least 1"),
                Step::Bus { length, .. } if !length.is_finite() || *length <= 0.0 => {
                    Some("length must be a positive number")
                }
                _ => None,
            };
            if let Some(message) = problem {
                return Err(ScenarioError::InvalidStep {
                    index,
                    action: step.action().to_string(),
                    message: message.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// One scenario action, tagged by `action:`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Create {
        #[serde(rename = "type")]
        nf_type: NfType,
        #[serde(default = "default_count")]
        count: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<Position>,
    },
    Delete {
        nf: String,
    },
    Rename {
        nf: String,
        to: String,
    },
    Start {
        nf: String,
    },
    Stop {
        nf: String,
    },
    Fail {
        nf: String,
    },
    Connect {
        from: String,
        to: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    Disconnect {
        from: String,
        to: String,
    },
    Bus {
        name: String,
        #[serde(default)]
        orientation: Orientation,
        #[serde(default)]
        position: Position,
        #[serde(default = "default_bus_length")]
        length: f64,
        /// Network functions to attach right away
        #[serde(default)]
        attach: Vec<String>,
    },
    Configure {
        nf: String,
        config: NfConfigPatch,
    },
    Protocol {
        protocol: HttpProtocol,
    },
    Advance {
        #[serde(with = "humantime_serde")]
        by: Duration,
    },
    /// Run until no task is pending
    Settle,
    AutoConnect {
        nf: String,
    },
    Ping {
        from: String,
        /// IP address or network function name
        to: String,
        #[serde(default = "default_ping_count")]
        count: u32,
        /// Start the probe and return without waiting for it
        #[serde(default)]
        background: bool,
    },
    Scan {
        from: String,
    },
    CancelPing {
        from: String,
    },
}

impl Step {
    pub fn action(&self) -> &'static str {
        match self {
            Step::Create { .. } => "create",
            Step::Delete { .. } => "delete",
            Step::Rename { .. } => "rename",
            Step::Start { .. } => "start",
            Step::Stop { .. } => "stop",
            Step::Fail { .. } => "fail",
            Step::Connect { .. } => "connect",
            Step::Disconnect { .. } => "disconnect",
            Step::Bus { .. } => "bus",
            Step::Configure { .. } => "configure",
            Step::Protocol { .. } => "protocol",
            Step::Advance { .. } => "advance",
            Step::Settle => "settle",
            Step::AutoConnect { .. } => "auto_connect",
            Step::Ping { .. } => "ping",
            Step::Scan { .. } => "scan",
            Step::CancelPing { .. } => "cancel_ping",
        }
    }
}

/// Errors local to a single scenario step
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Config(#[from] crate::config::ValidationError),

    #[error("Step {index} ({action}): {message}")]
    InvalidStep {
        index: usize,
        action: String,
        message: String,
    },

    #[error("No network function named '{0}'")]
    UnknownNf(String),

    #[error("No bus named '{0}'")]
    UnknownBus(String),

    #[error("'{0}' and '{1}' are not directly connected")]
    NotConnected(String, String),

    #[error("'{0}' has no ping in flight")]
    NoActivePing(String),

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// Outcome of one step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub index: usize,
    pub action: String,
    /// Simulated time after the step
    #[serde(with = "humantime_serde")]
    pub at: Duration,
    pub ok: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub steps: Vec<StepRecord>,
    pub failures: usize,
    pub pings: Vec<PingReport>,
    pub cancelled_pings: Vec<CancelledProbe>,
    pub scans: Vec<SubnetScanReport>,
    pub auto_connects: Vec<AutoConnectRecord>,
    #[serde(with = "humantime_serde")]
    pub final_time: Duration,
    pub topology: TopologySnapshot,
}

/// Run every step of `scenario`. `seed` overrides the scenario's own seed.
pub fn run_scenario(scenario: &Scenario, seed: Option<u64>) -> color_eyre::Result<ScenarioReport> {
    scenario.validate().wrap_err("Invalid scenario")?;

    let mut config = scenario.simulation.clone();
    if seed.is_some() {
        config.seed = seed;
    }
    let mut simulation =
        Simulation::new(config.clone()).wrap_err("Invalid simulation configuration")?;

    let mut runner = ScenarioRunner {
        simulation: &mut simulation,
        report: ScenarioReport {
            name: scenario.name.clone(),
            seed: config.seed,
            steps: Vec::with_capacity(scenario.steps.len()),
            failures: 0,
            pings: Vec::new(),
            cancelled_pings: Vec::new(),
            scans: Vec::new(),
            auto_connects: Vec::new(),
            final_time: Duration::ZERO,
            topology: TopologySnapshot::default(),
        },
    };

    info!(
        "Running scenario {} ({} steps)",
        scenario.name.as_deref().unwrap_or("<unnamed>"),
        scenario.steps.len()
    );

    for (index, step) in scenario.steps.iter().enumerate() {
        let result = runner.run_step(step);
        let at = runner.simulation.now();
        let record = match result {
            Ok(detail) => StepRecord {
                index,
                action: step.action().to_string(),
                at,
                ok: true,
                detail,
            },
            Err(e) => {
                warn!("Step {} ({}) failed: {}", index, step.action(), e);
                runner.report.failures += 1;
                StepRecord {
                    index,
                    action: step.action().to_string(),
                    at,
                    ok: false,
                    detail: e.to_string(),
                }
            }
        };
        runner.report.steps.push(record);
    }

    let mut report = runner.report;
    report.final_time = simulation.now();
    report.topology = simulation.snapshot();

    info!(
        "Scenario finished at {:?}: {} step(s), {} failure(s), {} network function(s)",
        report.final_time,
        report.steps.len(),
        report.failures,
        report.topology.nfs.len()
    );
    Ok(report)
}

struct ScenarioRunner<'a> {
    simulation: &'a mut Simulation,
    report: ScenarioReport,
}

impl ScenarioRunner<'_> {
    fn run_step(&mut self, step: &Step) -> Result<String, ScenarioError> {
        match step {
            Step::Create {
                nf_type,
                count,
                position,
            } => {
                let mut created = Vec::new();
                for _ in 0..*count {
                    let nf = self.simulation.create_network_function(*nf_type, *position)?;
                    created.push(format!(
                        "{} at {}:{}",
                        nf.name, nf.config.ip_address, nf.config.port
                    ));
                }
                Ok(format!("created {}", created.join(", ")))
            }
            Step::Delete { nf } => {
                let id = self.resolve(nf)?;
                match self.simulation.delete_network_function(&id) {
                    Some(removed) => Ok(format!(
                        "deleted {} with {} connection(s)",
                        nf,
                        removed.connections.len()
                    )),
                    None => Err(ScenarioError::UnknownNf(nf.clone())),
                }
            }
            Step::Rename { nf, to } => {
                let id = self.resolve(nf)?;
                self.simulation.rename_network_function(&id, to)?;
                Ok(format!("renamed {} to {}", nf, to))
            }
            Step::Start { nf } => {
                let id = self.resolve(nf)?;
                let changed = self.simulation.start_network_function(&id)?;
                Ok(transition_detail(nf, "started", changed))
            }
            Step::Stop { nf } => {
                let id = self.resolve(nf)?;
                let changed = self.simulation.stop_network_function(&id)?;
                Ok(transition_detail(nf, "stopped", changed))
            }
            Step::Fail { nf } => {
                let id = self.resolve(nf)?;
                let changed = self.simulation.fail_network_function(&id)?;
                Ok(transition_detail(nf, "failed", changed))
            }
            Step::Connect { from, to, label } => {
                let (a, b) = (self.resolve(from)?, self.resolve(to)?);
                let options = ConnectionOptions {
                    label: label.clone(),
                    protocol: self.simulation.config().default_protocol,
                    ..ConnectionOptions::default()
                };
                let id = self.simulation.connect(&a, &b, options)?;
                Ok(format!("connected {} and {} ({})", from, to, id))
            }
            Step::Disconnect { from, to } => {
                let (a, b) = (self.resolve(from)?, self.resolve(to)?);
                let ids: Vec<_> = self
                    .simulation
                    .store()
                    .connections_between(&a, &b)
                    .into_iter()
                    .map(|c| c.id.clone())
                    .collect();
                if ids.is_empty() {
                    return Err(ScenarioError::NotConnected(from.clone(), to.clone()));
                }
                for id in &ids {
                    self.simulation.disconnect(id);
                }
                Ok(format!("removed {} connection(s) between {} and {}", ids.len(), from, to))
            }
            Step::Bus {
                name,
                orientation,
                position,
                length,
                attach,
            } => {
                let bus = self
                    .simulation
                    .create_bus(name, *orientation, *position, *length)?;
                for member in attach {
                    let id = self.resolve(member)?;
                    self.simulation.attach_to_bus(&id, &bus)?;
                }
                Ok(format!("created bus {} with {} member(s)", name, attach.len()))
            }
            Step::Configure { nf, config } => {
                let id = self.resolve(nf)?;
                let changed = self
                    .simulation
                    .update_network_function_config(&id, config.clone())?;
                Ok(if changed {
                    format!("updated {}", nf)
                } else {
                    format!("{} unchanged", nf)
                })
            }
            Step::Protocol { protocol } => {
                let changed = self.simulation.update_global_protocol(*protocol);
                Ok(format!("{} network function(s) switched to {}", changed, protocol))
            }
            Step::Advance { by } => {
                let summary = self.simulation.advance(*by);
                Ok(self.absorb(summary))
            }
            Step::Settle => {
                let summary = self.simulation.run_until_idle();
                Ok(self.absorb(summary))
            }
            Step::AutoConnect { nf } => {
                let id = self.resolve(nf)?;
                let outcome = self.simulation.auto_connect(&id);
                let detail = format!(
                    "{} connection(s) created, {} blocked",
                    outcome.created.len(),
                    outcome.blocked.len()
                );
                self.report
                    .auto_connects
                    .push(AutoConnectRecord { nf_id: id, outcome });
                Ok(detail)
            }
            Step::Ping {
                from,
                to,
                count,
                background,
            } => {
                let source = self.resolve(from)?;
                let target_ip = self.resolve_target(to)?;
                if *background {
                    let probe = self.simulation.start_ping(&source, &target_ip, *count)?;
                    return Ok(format!("{} started towards {}", probe, target_ip));
                }
                let report = self.simulation.ping_once(&source, &target_ip, *count)?;
                let detail = format!(
                    "{}/{} replies from {}",
                    report.statistics.received, report.statistics.sent, target_ip
                );
                self.report.pings.push(report);
                Ok(detail)
            }
            Step::Scan { from } => {
                let source = self.resolve(from)?;
                let scan = self.simulation.ping_subnet(&source)?;
                let detail = format!(
                    "{}: {}/{} responsive",
                    scan.subnet,
                    scan.responsive(),
                    scan.entries.len()
                );
                self.report
                    .pings
                    .extend(scan.entries.iter().map(|entry| entry.report.clone()));
                self.report.scans.push(scan);
                Ok(detail)
            }
            Step::CancelPing { from } => {
                let source = self.resolve(from)?;
                let cancelled = self
                    .simulation
                    .cancel_ping(&source)
                    .ok_or_else(|| ScenarioError::NoActivePing(from.clone()))?;
                let detail = format!(
                    "cancelled {} after {} packet(s)",
                    cancelled.probe,
                    cancelled.elapsed.len()
                );
                self.report.cancelled_pings.push(cancelled);
                Ok(detail)
            }
        }
    }

    fn resolve(&self, name: &str) -> Result<NfId, ScenarioError> {
        self.simulation
            .store()
            .find_nf_by_name(name)
            .map(|nf| nf.id.clone())
            .ok_or_else(|| ScenarioError::UnknownNf(name.to_string()))
    }

    /// A literal address, or the address of the named network function
    fn resolve_target(&self, target: &str) -> Result<String, ScenarioError> {
        if is_valid_ipv4(target) {
            return Ok(target.to_string());
        }
        self.simulation
            .store()
            .find_nf_by_name(target)
            .map(|nf| nf.config.ip_address.clone())
            .ok_or_else(|| ScenarioError::UnknownNf(target.to_string()))
    }

    fn absorb(&mut self, summary: TickSummary) -> String {
        let detail = format!(
            "{} task(s) run, {} stabilized, {} auto-connect attempt(s), {} ping(s) completed",
            summary.tasks_run,
            summary.stabilized.len(),
            summary.auto_connects.len(),
            summary.completed_pings.len()
        );
        self.report.auto_connects.extend(summary.auto_connects);
        self.report.pings.extend(summary.completed_pings);
        detail
    }
}

fn transition_detail(nf: &str, verb: &str, changed: bool) -> String {
    if changed {
        format!("{} {}", nf, verb)
    } else {
        format!("{} not {} (status unchanged)", nf, verb)
    }
}
