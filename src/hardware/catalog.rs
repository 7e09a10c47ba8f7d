//! Hardware catalog: runs every driver resolver and assembles the list the
//! user picks from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use super::detect::DeviceDetector;
use super::probe::LoadedDriverProbe;
use super::resolve::{
    AtiResolver, BroadcomResolver, DriverResolver, NvidiaResolver, PaeResolver, Resolution,
    ScanContext,
};
use crate::config::Config;
use crate::runner::CommandRunner;

/// One row of the hardware/driver list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareEntry {
    /// Driver active (baseline) or wanted (after editing)
    pub selected: bool,
    /// Manufacturer logo
    pub logo_path: String,
    /// Shortened device description
    pub label: String,
    /// Driver package or module; empty when the row has no single package
    pub driver_id: String,
    /// PCI vendor id, or `pae` for the kernel row
    pub manufacturer_id: String,
    /// PCI device id, empty for the kernel row
    pub device_id: String,
}

impl HardwareEntry {
    /// Column-title row that always heads a catalog.
    pub fn header() -> Self {
        HardwareEntry {
            selected: false,
            logo_path: String::new(),
            label: "Device".to_string(),
            driver_id: "driver".to_string(),
            manufacturer_id: "manid".to_string(),
            device_id: "deviceid".to_string(),
        }
    }
}

/// Result of one hardware scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub scanned_at: DateTime<Utc>,
    /// Header row first, then detected hardware in class order
    pub entries: Vec<HardwareEntry>,
    /// Descriptions of hardware with no available driver
    pub not_supported: Vec<String>,
    /// The running kernel is the PAE variant
    pub pae_booted: bool,
}

impl ScanReport {
    /// Rows below the header.
    pub fn devices(&self) -> &[HardwareEntry] {
        self.entries.get(1..).unwrap_or_default()
    }

    pub fn has_supported_hardware(&self) -> bool {
        !self.devices().is_empty()
    }

    /// Display the hardware list as a formatted table
    pub fn display(&self) -> String {
        const WIDTH: usize = 72;
        let mut output = String::new();

        output.push_str(&format!("╔{}╗\n", "═".repeat(WIDTH)));
        output.push_str(&format!("║{:^WIDTH$}║\n", "DEVICE DRIVER MANAGER"));
        output.push_str(&format!("╠{}╣\n", "═".repeat(WIDTH)));

        let format_row = |row: &str, mark: &str, label: &str, driver: &str| -> String {
            let content = format!("{row:>3} {mark} {label:<50} {driver}");
            let clipped: String = content.chars().take(WIDTH - 1).collect();
            format!("║ {clipped:<width$}║\n", width = WIDTH - 1)
        };

        let header = &HardwareEntry::header();
        output.push_str(&format_row("#", "   ", &header.label, &header.driver_id));

        for (idx, entry) in self.devices().iter().enumerate() {
            let mark = if entry.selected { "[x]" } else { "[ ]" };
            let driver = if entry.driver_id.is_empty() {
                entry.manufacturer_id.as_str()
            } else {
                entry.driver_id.as_str()
            };
            output.push_str(&format_row(&(idx + 1).to_string(), mark, &entry.label, driver));
        }

        output.push_str(&format!("╚{}╝", "═".repeat(WIDTH)));
        output
    }
}

/// Runs the ATI, NVIDIA, Broadcom and PAE resolvers in that order.
pub(crate) struct HardwareCatalog<'a> {
    runner: &'a dyn CommandRunner,
    probe: LoadedDriverProbe,
    media_dir: &'a Path,
    label_width: usize,
    resolvers: Vec<Box<dyn DriverResolver>>,
}

impl<'a> HardwareCatalog<'a> {
    pub(crate) fn new(runner: &'a dyn CommandRunner, config: &'a Config) -> Self {
        Self {
            runner,
            probe: LoadedDriverProbe::new(&config.paths.log_dir, config.probe.xorg_banner_bytes),
            media_dir: &config.paths.media_dir,
            label_width: config.display.label_width,
            resolvers: vec![
                Box::new(AtiResolver),
                Box::new(NvidiaResolver),
                Box::new(BroadcomResolver),
                Box::new(PaeResolver),
            ],
        }
    }

    /// Fresh snapshot of supported hardware and active drivers.
    pub(crate) fn scan(&self) -> ScanReport {
        let detector = DeviceDetector::new(self.runner);
        let ctx = ScanContext::new(self.runner, &self.probe, self.media_dir, self.label_width);

        let mut found = Resolution::default();
        for resolver in &self.resolvers {
            let records = match resolver.device_query() {
                Some((vendor_id, class_filter)) => {
                    let records = detector.detect(vendor_id, class_filter);
                    if records.is_empty() {
                        debug!(class = resolver.name(), "no devices");
                        continue;
                    }
                    records
                }
                None => Vec::new(),
            };

            let resolution = resolver.resolve(&records, &ctx);
            debug!(
                class = resolver.name(),
                entries = resolution.entries.len(),
                not_supported = resolution.not_supported.len(),
                "class resolved"
            );
            found.merge(resolution);
        }

        let mut entries = Vec::with_capacity(found.entries.len() + 1);
        entries.push(HardwareEntry::header());
        entries.extend(found.entries);

        info!(
            devices = entries.len() - 1,
            not_supported = found.not_supported.len(),
            pae_booted = found.pae_booted,
            "hardware scan complete"
        );

        ScanReport {
            scanned_at: Utc::now(),
            entries,
            not_supported: found.not_supported,
            pae_booted: found.pae_booted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::fake::ScriptedRunner;
    use std::fs;
    use tempfile::TempDir;

    const HYBRID_QUERY: &str = r"lspci -vnn | grep '\[030[02]\]'";

    fn config_with_logs(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.paths.log_dir = dir.path().to_path_buf();
        config.probe.xorg_banner_bytes = 128;
        config
    }

    #[test]
    fn empty_system_has_only_header() {
        let dir = TempDir::new().unwrap();
        let config = config_with_logs(&dir);
        let runner = ScriptedRunner::new().on("uname -m", &["x86_64"]);

        let report = HardwareCatalog::new(&runner, &config).scan();
        assert_eq!(report.entries, vec![HardwareEntry::header()]);
        assert!(!report.has_supported_hardware());
        assert!(report.not_supported.is_empty());
        assert!(!report.pae_booted);
    }

    #[test]
    fn full_scan_keeps_class_order() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("syslog"),
            "Jan 1 host NetworkManager: (wlan0): driver: 'wl'\n",
        )
        .unwrap();
        let config = config_with_logs(&dir);

        let runner = ScriptedRunner::new()
            .on(
                "lspci -nn -d 1002: | grep VGA",
                &["01:00.0 VGA compatible controller [0300]: Advanced Micro Devices [AMD] nee ATI Juniper [Radeon HD 5770] [1002:68b8]"],
            )
            .on(
                "lspci -nn -d 14e4:",
                &[
                    "02:00.0 Network controller [0280]: Broadcom Corporation BCM4313 802.11bgn [14e4:4727] (rev 01)",
                    "03:00.0 Network controller [0280]: Broadcom Corporation BCM4360 802.11ac [14e4:43b1] (rev 03)",
                ],
            )
            .on("uname -m", &["i686"])
            .on("uname -r", &["3.16.0-4-686-pae"]);

        let report = HardwareCatalog::new(&runner, &config).scan();

        assert_eq!(report.entries[0], HardwareEntry::header());
        let drivers: Vec<&str> = report.devices().iter().map(|e| e.driver_id.as_str()).collect();
        assert_eq!(drivers, ["fglrx", "brcmdebian", ""]);
        assert_eq!(report.devices()[2].manufacturer_id, "pae");
        assert_eq!(
            report.not_supported,
            vec!["Broadcom Corporation BCM4360 802.11ac".to_string()]
        );
        assert!(report.pae_booted);
        assert!(!report.devices()[0].selected);
    }

    #[test]
    fn hybrid_graphics_end_to_end() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("Xorg.0.log"),
            "intel(0): depth 24, framebuffer bpp 32\n",
        )
        .unwrap();
        let config = config_with_logs(&dir);

        let runner = ScriptedRunner::new()
            .on(
                HYBRID_QUERY,
                &[
                    "00:02.0 VGA compatible controller [0300]: Intel Corporation Haswell-ULT Integrated Graphics Controller [8086:0a16] (rev 09) (prog-if 00 [VGA controller])",
                    "01:00.0 3D controller [0302]: NVIDIA Corporation GK107M [GeForce GT 750M] [10de:0fe4] (rev a1)",
                ],
            )
            .on("nvidia-detect | grep nvidia- | tr -d ' '", &["nvidia-driver"])
            .with_package("bumblebee-nvidia", "3.2.1-7");

        let report = HardwareCatalog::new(&runner, &config).scan();

        assert_eq!(report.devices().len(), 1);
        let entry = &report.devices()[0];
        assert_eq!(entry.driver_id, "bumblebee-nvidia");
        assert_eq!(entry.manufacturer_id, "10de");
        assert!(entry.selected);
    }

    #[test]
    fn display_lists_rows_with_numbers() {
        let report = ScanReport {
            scanned_at: Utc::now(),
            entries: vec![
                HardwareEntry::header(),
                HardwareEntry {
                    selected: true,
                    logo_path: String::new(),
                    label: "PAE capable system".to_string(),
                    driver_id: String::new(),
                    manufacturer_id: "pae".to_string(),
                    device_id: String::new(),
                },
            ],
            not_supported: Vec::new(),
            pae_booted: true,
        };

        let table = report.display();
        assert!(table.contains("DEVICE DRIVER MANAGER"));
        assert!(table.contains("  1 [x] PAE capable system"));
        assert!(table.contains("pae"));
    }
}
