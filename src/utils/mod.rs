//! Shared utilities: subnet grouping helpers and uptime formatting.

pub mod duration;
pub mod ip_utils;

pub use duration::format_uptime;
pub use ip_utils::{is_valid_ipv4, network_prefix, same_subnet, subnet_cidr};
