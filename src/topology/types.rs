//! Topology type definitions.
//!
//! Network functions, direct connections, service buses and bus attachments,
//! plus the typed patches used to update them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_type!(
    /// Opaque, immutable network function identifier
    NfId
);
id_type!(
    /// Direct connection identifier
    ConnectionId
);
id_type!(
    /// Service bus identifier
    BusId
);
id_type!(
    /// Bus attachment identifier
    BusConnectionId
);

/// Kinds of network function the simulator can place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NfType {
    #[serde(rename = "NRF")]
    Nrf,
    #[serde(rename = "AMF")]
    Amf,
    #[serde(rename = "SMF")]
    Smf,
    #[serde(rename = "UPF")]
    Upf,
    #[serde(rename = "AUSF")]
    Ausf,
    #[serde(rename = "UDM")]
    Udm,
    #[serde(rename = "UDR")]
    Udr,
    #[serde(rename = "PCF")]
    Pcf,
    #[serde(rename = "NSSF")]
    Nssf,
    #[serde(rename = "gNB")]
    Gnb,
    #[serde(rename = "UE")]
    Ue,
    #[serde(rename = "MySQL")]
    MySql,
    #[serde(rename = "AF")]
    Af,
    #[serde(rename = "DataNetwork")]
    DataNetwork,
    #[serde(rename = "ext-dn")]
    ExtDn,
}

impl NfType {
    pub const ALL: [NfType; 15] = [
        NfType::Nrf,
        NfType::Amf,
        NfType::Smf,
        NfType::Upf,
        NfType::Ausf,
        NfType::Udm,
        NfType::Udr,
        NfType::Pcf,
        NfType::Nssf,
        NfType::Gnb,
        NfType::Ue,
        NfType::MySql,
        NfType::Af,
        NfType::DataNetwork,
        NfType::ExtDn,
    ];

    /// Returns the canonical spelling used in names and scenario files
    pub fn as_str(&self) -> &'static str {
        match self {
            NfType::Nrf => "NRF",
            NfType::Amf => "AMF",
            NfType::Smf => "SMF",
            NfType::Upf => "UPF",
            NfType::Ausf => "AUSF",
            NfType::Udm => "UDM",
            NfType::Udr => "UDR",
            NfType::Pcf => "PCF",
            NfType::Nssf => "NSSF",
            NfType::Gnb => "gNB",
            NfType::Ue => "UE",
            NfType::MySql => "MySQL",
            NfType::Af => "AF",
            NfType::DataNetwork => "DataNetwork",
            NfType::ExtDn => "ext-dn",
        }
    }

    /// Cosmetic definition (color and long name) for this type
    pub fn visual(&self) -> NfVisual {
        let (color, display_name) = match self {
            NfType::Nrf => ("#9b59b6", "Network Repository Function"),
            NfType::Amf => ("#3498db", "Access and Mobility Management"),
            NfType::Smf => ("#00bcd4", "Session Management Function"),
            NfType::Upf => ("#4caf50", "User Plane Function"),
            NfType::Ausf => ("#ff9800", "Authentication Server Function"),
            NfType::Udm => ("#ff5722", "Unified Data Management"),
            NfType::Pcf => ("#e91e63", "Policy Control Function"),
            NfType::Nssf => ("#ffc107", "Network Slice Selection"),
            NfType::Udr => ("#009688", "Unified Data Repository"),
            NfType::Gnb => ("#8e44ad", "gNodeB (5G Base Station)"),
            NfType::Ue => ("#16a085", "User Equipment"),
            NfType::MySql => ("#d35400", "MySQL Database"),
            NfType::Af => ("#9c27b0", "Application Function"),
            NfType::DataNetwork | NfType::ExtDn => ("#95a5a6", "Data Network"),
        };
        NfVisual {
            color: color.to_string(),
            display_name: display_name.to_string(),
            icon: None,
        }
    }
}

impl fmt::Display for NfType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NfType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NfType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown network function type: {}", s))
    }
}

/// Lifecycle status of a network function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NfStatus {
    Starting,
    Stable,
    Stopped,
    Error,
}

impl NfStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NfStatus::Starting => "starting",
            NfStatus::Stable => "stable",
            NfStatus::Stopped => "stopped",
            NfStatus::Error => "error",
        }
    }

    /// Status indicator color shown on the canvas
    pub fn color(&self) -> &'static str {
        match self {
            NfStatus::Starting => "#e74c3c",
            NfStatus::Stable => "#2ecc71",
            NfStatus::Error => "#e67e22",
            NfStatus::Stopped => "#95a5a6",
        }
    }
}

impl fmt::Display for NfStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP version spoken on service-based interfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HttpProtocol {
    #[serde(rename = "HTTP/1")]
    Http1,
    #[default]
    #[serde(rename = "HTTP/2")]
    Http2,
}

impl fmt::Display for HttpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpProtocol::Http1 => f.write_str("HTTP/1"),
            HttpProtocol::Http2 => f.write_str("HTTP/2"),
        }
    }
}

/// Canvas coordinate
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Addressing and capacity settings of a network function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfConfig {
    pub ip_address: String,
    pub port: u16,
    pub http_protocol: HttpProtocol,
    pub capacity: u32,
    pub load: u32,
}

/// Cosmetic fields passed through to the renderer untouched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfVisual {
    pub color: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// A simulated 5G core element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkFunction {
    pub id: NfId,
    #[serde(rename = "type")]
    pub nf_type: NfType,
    pub name: String,
    pub position: Position,
    pub status: NfStatus,
    /// Simulated time of the last status change
    #[serde(with = "humantime_serde")]
    pub status_since: Duration,
    pub config: NfConfig,
    #[serde(with = "humantime_serde")]
    pub created_at: Duration,
    pub visual: NfVisual,
}

impl NetworkFunction {
    pub fn ip(&self) -> &str {
        &self.config.ip_address
    }

    pub fn is_stable(&self) -> bool {
        self.status == NfStatus::Stable
    }

    /// Apply a typed patch, returning true if anything changed
    pub fn apply(&mut self, patch: &NfPatch) -> bool {
        let before = self.clone();
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(position) = patch.position {
            self.position = position;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(since) = patch.status_since {
            self.status_since = since;
        }
        if let Some(config) = &patch.config {
            config.apply_to(&mut self.config);
        }
        *self != before
    }
}

/// Partial update of a network function; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NfPatch {
    pub name: Option<String>,
    pub position: Option<Position>,
    pub status: Option<NfStatus>,
    pub status_since: Option<Duration>,
    pub config: Option<NfConfigPatch>,
}

impl NfPatch {
    pub fn status(status: NfStatus, since: Duration) -> Self {
        Self {
            status: Some(status),
            status_since: Some(since),
            ..Self::default()
        }
    }

    pub fn config(config: NfConfigPatch) -> Self {
        Self {
            config: Some(config),
            ..Self::default()
        }
    }
}

/// Partial update of a network function's configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NfConfigPatch {
    pub ip_address: Option<String>,
    pub port: Option<u16>,
    pub http_protocol: Option<HttpProtocol>,
    pub capacity: Option<u32>,
    pub load: Option<u32>,
}

impl NfConfigPatch {
    pub fn protocol(protocol: HttpProtocol) -> Self {
        Self {
            http_protocol: Some(protocol),
            ..Self::default()
        }
    }

    fn apply_to(&self, config: &mut NfConfig) {
        if let Some(ip) = &self.ip_address {
            config.ip_address = ip.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(protocol) = self.http_protocol {
            config.http_protocol = protocol;
        }
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        if let Some(load) = self.load {
            config.load = load;
        }
    }
}

/// How a direct connection came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    /// Drawn by the user
    Manual,
    /// Created by the lifecycle engine; logical only, never rendered
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
}

/// Display metadata of a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub style: LineStyle,
    pub protocol: HttpProtocol,
    pub visible: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            label: None,
            color: None,
            style: LineStyle::Solid,
            protocol: HttpProtocol::Http2,
            visible: true,
        }
    }
}

/// Undirected edge between two network functions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: ConnectionId,
    pub source_id: NfId,
    pub target_id: NfId,
    pub kind: ConnectionKind,
    pub interface_name: String,
    pub options: ConnectionOptions,
    #[serde(with = "humantime_serde")]
    pub created_at: Duration,
}

impl Connection {
    /// Returns true if this connection touches the given network function
    pub fn touches(&self, nf: &NfId) -> bool {
        &self.source_id == nf || &self.target_id == nf
    }

    /// Returns the far end of the edge as seen from `nf`
    pub fn other_end(&self, nf: &NfId) -> Option<&NfId> {
        if &self.source_id == nf {
            Some(&self.target_id)
        } else if &self.target_id == nf {
            Some(&self.source_id)
        } else {
            None
        }
    }

    /// Auto connections are logical only
    pub fn is_rendered(&self) -> bool {
        self.kind == ConnectionKind::Manual && self.options.visible
    }
}

/// Partial update of a connection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionPatch {
    pub label: Option<String>,
    pub protocol: Option<HttpProtocol>,
}

impl ConnectionPatch {
    pub(crate) fn apply_to(&self, connection: &mut Connection) -> bool {
        let before = connection.options.clone();
        if let Some(label) = &self.label {
            connection.options.label = Some(label.clone());
        }
        if let Some(protocol) = self.protocol {
            connection.options.protocol = protocol;
        }
        connection.options != before
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Horizontal,
    Vertical,
}

/// Shared service bus line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bus {
    pub id: BusId,
    pub name: String,
    pub orientation: Orientation,
    pub position: Position,
    pub length: f64,
    /// Attached network functions, in attachment order
    pub connections: Vec<NfId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusConnectionStatus {
    #[default]
    Active,
    Inactive,
}

/// Attachment of a network function to a bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusConnection {
    pub id: BusConnectionId,
    pub nf_id: NfId,
    pub bus_id: BusId,
    pub interface_name: String,
    pub status: BusConnectionStatus,
    #[serde(with = "humantime_serde")]
    pub created_at: Duration,
}

/// Serializable copy of the whole topology
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologySnapshot {
    pub nfs: Vec<NetworkFunction>,
    pub connections: Vec<Connection>,
    pub buses: Vec<Bus>,
    pub bus_connections: Vec<BusConnection>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nf_type_spellings() {
        assert_eq!(NfType::Gnb.to_string(), "gNB");
        assert_eq!(NfType::MySql.to_string(), "MySQL");
        assert_eq!(NfType::ExtDn.to_string(), "ext-dn");
        assert_eq!("amf".parse::<NfType>(), Ok(NfType::Amf));
        assert_eq!("GNB".parse::<NfType>(), Ok(NfType::Gnb));
        assert!("HSS".parse::<NfType>().is_err());

        let parsed: NfType = serde_yaml::from_str("ext-dn").unwrap();
        assert_eq!(parsed, NfType::ExtDn);
        assert_eq!(serde_json::to_string(&NfType::Gnb).unwrap(), "\"gNB\"");
    }

    #[test]
    fn test_every_type_round_trips_through_from_str() {
        for nf_type in NfType::ALL {
            assert_eq!(nf_type.as_str().parse::<NfType>(), Ok(nf_type));
        }
    }

    #[test]
    fn test_protocol_serde() {
        assert_eq!(serde_json::to_string(&HttpProtocol::Http1).unwrap(), "\"HTTP/1\"");
        let parsed: HttpProtocol = serde_yaml::from_str("HTTP/2").unwrap();
        assert_eq!(parsed, HttpProtocol::Http2);
    }

    #[test]
    fn test_connection_other_end() {
        let conn = Connection {
            id: ConnectionId::from("c1"),
            source_id: NfId::from("a"),
            target_id: NfId::from("b"),
            kind: ConnectionKind::Auto,
            interface_name: "Nnrf".to_string(),
            options: ConnectionOptions { visible: false, ..ConnectionOptions::default() },
            created_at: Duration::ZERO,
        };
        assert_eq!(conn.other_end(&NfId::from("a")), Some(&NfId::from("b")));
        assert_eq!(conn.other_end(&NfId::from("b")), Some(&NfId::from("a")));
        assert_eq!(conn.other_end(&NfId::from("c")), None);
        assert!(!conn.is_rendered());
    }

    #[test]
    fn test_patch_reports_changes() {
        let mut nf = NetworkFunction {
            id: NfId::from("nrf-1"),
            nf_type: NfType::Nrf,
            name: "NRF-1".to_string(),
            position: Position::new(0.0, 0.0),
            status: NfStatus::Starting,
            status_since: Duration::ZERO,
            config: NfConfig {
                ip_address: "192.168.1.10".to_string(),
                port: 8080,
                http_protocol: HttpProtocol::Http2,
                capacity: 1000,
                load: 0,
            },
            created_at: Duration::ZERO,
            visual: NfType::Nrf.visual(),
        };

        assert!(!nf.apply(&NfPatch::config(NfConfigPatch::protocol(HttpProtocol::Http2))));
        assert!(nf.apply(&NfPatch::config(NfConfigPatch::protocol(HttpProtocol::Http1))));
        assert_eq!(nf.config.http_protocol, HttpProtocol::Http1);
        assert_eq!(nf.config.port, 8080);
    }
}
