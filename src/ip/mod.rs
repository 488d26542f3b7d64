//! IP address allocation and management module.
//!
//! This module hands out unique IP/port pairs from the configured subnet
//! pool and tracks which network function holds which address.

pub mod registry;
pub mod allocator;

// Re-export commonly used types
pub use registry::{AddressOwner, UsedAddresses};
pub use allocator::AddressAllocator;
