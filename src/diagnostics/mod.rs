//! Reachability and diagnostics module.
//!
//! This module decides whether a probe between two addresses succeeds and
//! simulates timed ping sessions, subnet scans and their history.

pub mod reachability;
pub mod ping;

// Re-export commonly used types
pub use reachability::{ReachabilityModel, ReachabilityRule};
pub use ping::{
    ActiveProbe, CancelledProbe, DiagnosticsSimulator, PacketOutcome, PacketResult, PingReport,
    PingStatistics, ProbeId, ScanEntry, ScanPlan, SubnetScanReport,
};
