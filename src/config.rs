use crate::topology::types::HttpProtocol;
use crate::utils::ip_utils::is_valid_subnet_prefix;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level simulation configuration that mirrors the `simulation:` YAML section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed for the deterministic random source (entropy when absent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Protocol given to newly created network functions
    pub default_protocol: HttpProtocol,
    pub addressing: AddressingConfig,
    pub lifecycle: LifecycleConfig,
    pub reachability: ReachabilityConfig,
    pub ping: PingConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            default_protocol: HttpProtocol::Http2,
            addressing: AddressingConfig::default(),
            lifecycle: LifecycleConfig::default(),
            reachability: ReachabilityConfig::default(),
            ping: PingConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.addressing.validate()?;
        self.lifecycle.validate()?;
        self.reachability.validate()?;
        self.ping.validate()?;
        Ok(())
    }
}

/// Address pool the allocator searches, in order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressingConfig {
    /// Subnet prefixes (first three octets), searched in order
    pub subnets: Vec<String>,
    pub host_min: u8,
    pub host_max: u8,
    pub port_min: u16,
    pub port_max: u16,
}

impl Default for AddressingConfig {
    fn default() -> Self {
        Self {
            subnets: vec![
                "192.168.1".to_string(), // Core network functions
                "192.168.2".to_string(), // User plane functions
                "192.168.3".to_string(), // Edge services
                "192.168.4".to_string(), // Additional services
            ],
            host_min: 10,
            host_max: 254,
            port_min: 8080,
            port_max: 9999,
        }
    }
}

impl AddressingConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.subnets.is_empty() {
            return Err(ValidationError::InvalidAddressing(
                "at least one subnet is required".to_string(),
            ));
        }
        if let Some(bad) = self.subnets.iter().find(|s| !is_valid_subnet_prefix(s)) {
            return Err(ValidationError::InvalidAddressing(format!(
                "subnet '{}' must be three dotted octets (e.g. 192.168.1)",
                bad
            )));
        }
        if self.host_min > self.host_max {
            return Err(ValidationError::InvalidAddressing(format!(
                "host range {}-{} is inverted",
                self.host_min, self.host_max
            )));
        }
        if self.port_min > self.port_max {
            return Err(ValidationError::InvalidAddressing(format!(
                "port range {}-{} is inverted",
                self.port_min, self.port_max
            )));
        }
        Ok(())
    }
}

/// Lifecycle timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Delay between `starting` and `stable`
    #[serde(with = "humantime_serde")]
    pub stable_delay: Duration,
    /// Lower bound of the random delay before an auto-connection attempt
    #[serde(with = "humantime_serde")]
    pub auto_connect_delay_min: Duration,
    /// Upper bound of the random delay before an auto-connection attempt
    #[serde(with = "humantime_serde")]
    pub auto_connect_delay_max: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            stable_delay: Duration::from_secs(5),
            auto_connect_delay_min: Duration::from_secs(3),
            auto_connect_delay_max: Duration::from_secs(5),
        }
    }
}

impl LifecycleConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.auto_connect_delay_min > self.auto_connect_delay_max {
            return Err(ValidationError::InvalidLifecycle(format!(
                "auto_connect_delay_min ({:?}) exceeds auto_connect_delay_max ({:?})",
                self.auto_connect_delay_min, self.auto_connect_delay_max
            )));
        }
        Ok(())
    }
}

/// Per-rule success probabilities used by the reachability model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReachabilityConfig {
    /// Source and target are in different subnets
    pub cross_subnet: f64,
    /// Same subnet, but no network function owns the target address
    pub unknown_host: f64,
    /// Either endpoint is not stable
    pub not_stable: f64,
    /// Both stable and connected directly or through a bus
    pub connected: f64,
    /// Both stable, no connection
    pub unconnected: f64,
}

impl Default for ReachabilityConfig {
    fn default() -> Self {
        Self {
            cross_subnet: 0.0,
            unknown_host: 0.2,
            not_stable: 0.3,
            connected: 0.95,
            unconnected: 0.7,
        }
    }
}

impl ReachabilityConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let fields = [
            ("cross_subnet", self.cross_subnet),
            ("unknown_host", self.unknown_host),
            ("not_stable", self.not_stable),
            ("connected", self.connected),
            ("unconnected", self.unconnected),
        ];
        for (name, value) in fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::InvalidReachability(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Pacing and sampling of simulated pings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingConfig {
    /// Delay before each reply line
    #[serde(with = "humantime_serde")]
    pub packet_interval: Duration,
    /// Extra wait for a packet that times out
    #[serde(with = "humantime_serde")]
    pub timeout_penalty: Duration,
    /// Delay before the statistics block
    #[serde(with = "humantime_serde")]
    pub summary_delay: Duration,
    /// Gap between probes of a subnet scan
    #[serde(with = "humantime_serde")]
    pub scan_interval: Duration,
    pub latency_min_ms: u32,
    pub latency_max_ms: u32,
    pub ttl: u8,
    /// Ping sessions kept per network function
    pub history_limit: usize,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            packet_interval: Duration::from_millis(500),
            timeout_penalty: Duration::from_millis(500),
            summary_delay: Duration::from_millis(500),
            scan_interval: Duration::from_millis(200),
            latency_min_ms: 1,
            latency_max_ms: 60,
            ttl: 255,
            history_limit: 50,
        }
    }
}

impl PingConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.latency_min_ms > self.latency_max_ms {
            return Err(ValidationError::InvalidPing(format!(
                "latency range {}-{}ms is inverted",
                self.latency_min_ms, self.latency_max_ms
            )));
        }
        if self.history_limit == 0 {
            return Err(ValidationError::InvalidPing(
                "history_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Errors that can occur while validating a simulation configuration
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid addressing configuration: {0}")]
    InvalidAddressing(String),

    #[error("Invalid lifecycle configuration: {0}")]
    InvalidLifecycle(String),

    #[error("Invalid reachability configuration: {0}")]
    InvalidReachability(String),

    #[error("Invalid ping configuration: {0}")]
    InvalidPing(String),
}
