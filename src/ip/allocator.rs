//! IP address and port allocation logic.
//!
//! Addresses are handed out first-free: subnets in configured order, hosts
//! ascending inside each subnet; ports ascending. When the whole pool is in
//! use the allocator falls back to a uniformly random candidate from the same
//! ranges. That candidate may collide with an existing assignment; callers
//! accept it as-is.

use crate::config::AddressingConfig;
use rand::{Rng, RngCore};
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct AddressAllocator {
    pool: AddressingConfig,
}

impl Default for AddressAllocator {
    fn default() -> Self {
        Self::new(AddressingConfig::default())
    }
}

impl AddressAllocator {
    pub fn new(pool: AddressingConfig) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &AddressingConfig {
        &self.pool
    }

    /// Number of distinct addresses the pool can hand out
    pub fn ip_capacity(&self) -> usize {
        let hosts = (self.pool.host_max as usize + 1).saturating_sub(self.pool.host_min as usize);
        hosts * self.pool.subnets.len()
    }

    /// Number of distinct ports the pool can hand out
    pub fn port_capacity(&self) -> usize {
        (self.pool.port_max as usize + 1).saturating_sub(self.pool.port_min as usize)
    }

    /// Pick the first address not in `existing`
    pub fn allocate_ip(&self, existing: &HashSet<String>, rng: &mut dyn RngCore) -> String {
        for subnet in &self.pool.subnets {
            for host in self.pool.host_min..=self.pool.host_max {
                let ip = format!("{}.{}", subnet, host);
                if !existing.contains(&ip) {
                    return ip;
                }
            }
        }

        let fallback = self.random_ip(rng);
        log::warn!(
            "All {} pool addresses are in use, using fallback IP {} (may duplicate an existing address)",
            self.ip_capacity(),
            fallback
        );
        fallback
    }

    /// Pick the first port not in `existing`
    pub fn allocate_port(&self, existing: &HashSet<u16>, rng: &mut dyn RngCore) -> u16 {
        for port in self.pool.port_min..=self.pool.port_max {
            if !existing.contains(&port) {
                return port;
            }
        }

        let fallback = rng.gen_range(self.pool.port_min..=self.pool.port_max);
        log::warn!(
            "All ports {}-{} are in use, using fallback port {} (may duplicate an existing port)",
            self.pool.port_min,
            self.pool.port_max,
            fallback
        );
        fallback
    }

    fn random_ip(&self, rng: &mut dyn RngCore) -> String {
        let subnet = &self.pool.subnets[rng.gen_range(0..self.pool.subnets.len())];
        let host = rng.gen_range(self.pool.host_min..=self.pool.host_max);
        format!("{}.{}", subnet, host)
    }
}
