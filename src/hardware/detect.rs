//! PCI device detection
//!
//! Parses `lspci -nn` style output:
//! `01:00.0 VGA compatible controller [0300]: NVIDIA Corporation GK107M [GeForce GT 750M] [10de:0fe4] (rev a1)`

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use super::vendor;
use crate::runner::CommandRunner;

/// Lists every VGA (0300) and 3D (0302) class device, used to spot hybrid graphics.
const DISPLAY_CLASS_QUERY: &str = r"lspci -vnn | grep '\[030[02]\]'";

/// One PCI device reported by lspci
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Device name as reported by lspci
    pub description: String,
    /// Lowercase 4-hex-digit vendor id
    pub vendor_id: String,
    /// Lowercase 4-hex-digit device id
    pub device_id: String,
}

fn device_line_regex() -> &'static Regex {
    static DEVICE_LINE: OnceLock<Regex> = OnceLock::new();
    DEVICE_LINE.get_or_init(|| {
        Regex::new(r":\s(.*?)\s\[([0-9a-fA-F]{4}):([0-9a-fA-F]{4})\]")
            .expect("device line pattern is valid")
    })
}

/// Runs lspci queries through a [`CommandRunner`].
pub(crate) struct DeviceDetector<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> DeviceDetector<'a> {
    pub(crate) fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Devices for `vendor_id`, optionally narrowed by `class_filter` (e.g. "VGA").
    ///
    /// For the NVIDIA vendor the whole display class is queried first; two or
    /// more hits mean an integrated + discrete pair and are returned as-is so
    /// the resolver can see the Intel side of an Optimus laptop.
    pub(crate) fn detect(&self, vendor_id: &str, class_filter: &str) -> Vec<DeviceRecord> {
        let mut output = Vec::new();

        if vendor_id == vendor::NVIDIA {
            output = self.runner.run(DISPLAY_CLASS_QUERY);
        }

        if output.len() < 2 {
            output = self.runner.run(&vendor_query(vendor_id, class_filter));
        }

        if !output.is_empty() {
            debug!(vendor_id, ?output, "lspci output");
        }

        output.iter().filter_map(|line| parse_device_line(line)).collect()
    }
}

fn vendor_query(vendor_id: &str, class_filter: &str) -> String {
    if class_filter.is_empty() {
        format!("lspci -nn -d {vendor_id}:")
    } else {
        format!("lspci -nn -d {vendor_id}: | grep {class_filter}")
    }
}

/// Parse one lspci line; header and continuation lines yield `None`.
pub(crate) fn parse_device_line(line: &str) -> Option<DeviceRecord> {
    let caps = device_line_regex().captures(line)?;
    Some(DeviceRecord {
        description: caps[1].trim().to_string(),
        vendor_id: caps[2].to_ascii_lowercase(),
        device_id: caps[3].to_ascii_lowercase(),
    })
}
