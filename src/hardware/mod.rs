//! Hardware detection module
//!
//! Detects PCI graphics and wireless devices with lspci, figures out which
//! driver is currently loaded from the system logs, and resolves the
//! proprietary driver each device should use.

mod catalog;
mod detect;
mod label;
mod probe;
mod resolve;

pub use catalog::{HardwareEntry, ScanReport};
pub(crate) use catalog::HardwareCatalog;

/// PCI vendor ids, plus the pseudo-vendor used for the PAE kernel row.
pub mod vendor {
    pub const AMD: &str = "1002";
    pub const NVIDIA: &str = "10de";
    pub const BROADCOM: &str = "14e4";
    pub const INTEL: &str = "8086";
    pub const PAE: &str = "pae";
}
