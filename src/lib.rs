//! # SBASim - Topology and lifecycle engine for a 5G SBA simulator
//!
//! This library provides the state engine behind a teaching simulator of a
//! 5G Service-Based Architecture: network functions, their addressing and
//! connections, their lifecycle, and simulated reachability between them.
//!
//! ## Overview
//!
//! Nothing here touches a real network. Network functions are records in an
//! in-memory topology, pings are probabilistic draws, and every delay runs on
//! a simulated clock that only moves when the caller advances it. Given a
//! seed, a run is fully reproducible.
//!
//! ## Key Features
//!
//! - **Unique Addressing**: First-free IP/port allocation over `192.168.1-4.x`
//! - **Lifecycle**: `starting` → `stable` after a delay, plus stop/start/fail
//! - **Auto-Connection**: Per-type dependency rules (AMF → NRF, AUSF, UDM, ...)
//!   applied within a subnet once a network function is stable
//! - **Service Buses**: Shared lines that connect every attached function
//! - **Diagnostics**: Timed multi-packet pings, subnet scans, cancellation
//! - **Change Notifications**: Synchronous, failure-isolated subscribers
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - `config`: Simulation settings with YAML defaults and validation
//! - `config_loader`: Scenario file loading
//! - `ip`: Address and port allocation
//! - `topology`: Topology store, change events and connectivity queries
//! - `lifecycle`: State machine, naming rules and the task scheduler
//! - `diagnostics`: Reachability model and ping simulation
//! - `simulation`: The root object that wires everything together
//! - `orchestrator`: Declarative scenario runner
//! - `utils`: Subnet helpers and uptime formatting
//!
//! ## Example Usage
//!
//! ```rust
//! use sbasim::config::SimulationConfig;
//! use sbasim::simulation::Simulation;
//! use sbasim::topology::NfType;
//! use std::time::Duration;
//!
//! let config = SimulationConfig { seed: Some(7), ..SimulationConfig::default() };
//! let mut sim = Simulation::new(config)?;
//!
//! let nrf = sim.create_network_function(NfType::Nrf, None)?;
//! let amf = sim.create_network_function(NfType::Amf, None)?;
//! assert_eq!(nrf.config.ip_address, "192.168.1.10");
//! assert_eq!(amf.config.port, 8081);
//!
//! // Both become stable after 5s; AMF auto-connects to NRF 3-5s later
//! sim.advance(Duration::from_secs(10));
//! assert!(sim.resolver().connected(&amf.id, &nrf.id));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Scenario Format
//!
//! ```yaml
//! simulation:
//!   seed: 42
//!   lifecycle:
//!     stable_delay: 5s
//!
//! steps:
//!   - action: create
//!     type: NRF
//!   - action: create
//!     type: AMF
//!   - action: settle
//!   - action: ping
//!     from: AMF-1
//!     to: NRF-1
//! ```
//!
//! ## Error Handling
//!
//! Library operations return typed `thiserror` errors (`TopologyError`,
//! `ValidationError`, `ScenarioError`). The loader, scenario runner and
//! binary use `color_eyre` for reporting with context.

pub mod config;
pub mod config_loader;
pub mod ip;
pub mod topology;
pub mod lifecycle;
pub mod diagnostics;
pub mod simulation;
pub mod orchestrator;
pub mod utils;

pub use simulation::Simulation;
