//! Static placement and dependency rules for new network functions.

use crate::topology::types::{NfId, NfType, Position};
use rand::{Rng, RngCore};
use std::collections::HashMap;

/// Network functions laid out per grid row
pub const GRID_COLUMNS: u32 = 6;
pub const GRID_ORIGIN_X: f64 = 120.0;
pub const GRID_ORIGIN_Y: f64 = 120.0;
/// Node width plus horizontal margin
pub const GRID_PITCH_X: f64 = 100.0;
/// Node height (label included) plus vertical margin
pub const GRID_PITCH_Y: f64 = 140.0;

const ID_SUFFIX_LEN: usize = 5;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Types a network function of `nf_type` connects to once it is stable.
///
/// Types absent from the table (NRF, AF, data networks) never initiate
/// auto-connections; they only receive them.
pub fn auto_connect_targets(nf_type: NfType) -> &'static [NfType] {
    use NfType::*;

    match nf_type {
        Amf => &[Nrf, Ausf, Udm],
        Smf => &[Nrf, Upf, Pcf],
        Upf => &[Smf],
        Ausf => &[Nrf, Udm],
        Udm => &[Nrf],
        Pcf => &[Nrf],
        Nssf => &[Nrf],
        Udr => &[Nrf],
        Gnb => &[Amf, Upf],
        Ue => &[Gnb],
        MySql => &[Udm],
        Nrf | Af | DataNetwork | ExtDn => &[],
    }
}

/// Grid slot for the `count`-th network function of a type (1-based)
pub fn grid_position(count: u32) -> Position {
    let index = count.saturating_sub(1);
    let row = index / GRID_COLUMNS;
    let col = index % GRID_COLUMNS;
    Position::new(
        GRID_ORIGIN_X + col as f64 * GRID_PITCH_X,
        GRID_ORIGIN_Y + row as f64 * GRID_PITCH_Y,
    )
}

/// Per-type name counters plus the simulation-wide id serial.
///
/// Counters only ever grow, so names are never reused after a deletion.
#[derive(Debug, Clone, Default)]
pub struct NamingCounters {
    per_type: HashMap<NfType, u32>,
    serial: u64,
}

impl NamingCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bump and return the counter for `nf_type`
    pub fn next_count(&mut self, nf_type: NfType) -> u32 {
        let counter = self.per_type.entry(nf_type).or_insert(0);
        *counter += 1;
        *counter
    }

    pub fn count(&self, nf_type: NfType) -> u32 {
        self.per_type.get(&nf_type).copied().unwrap_or(0)
    }

    /// Bump and return the id serial
    pub fn next_serial(&mut self) -> u64 {
        self.serial += 1;
        self.serial
    }

    /// Forget the per-type counters. The serial keeps counting so ids
    /// issued after a reset cannot repeat earlier ones.
    pub fn reset_names(&mut self) {
        self.per_type.clear();
    }
}

/// `<prefix>-<serial>-<5 base36 chars>`
pub fn entity_id(prefix: &str, serial: u64, rng: &mut dyn RngCore) -> String {
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}-{}-{}", prefix, serial, suffix)
}

pub fn nf_id(nf_type: NfType, serial: u64, rng: &mut dyn RngCore) -> NfId {
    NfId::new(entity_id(&nf_type.as_str().to_lowercase(), serial, rng))
}

pub fn nf_name(nf_type: NfType, count: u32) -> String {
    format!("{}-{}", nf_type, count)
}
