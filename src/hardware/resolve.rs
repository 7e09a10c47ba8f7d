//! Driver resolution per hardware class
//!
//! Each class maps detected PCI records (or, for the PAE kernel, system facts)
//! onto catalog rows. Nothing here touches the catalog order or the header
//! row; that is the orchestrator's job.

use regex::Regex;
use std::cell::OnceCell;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info};

use super::catalog::HardwareEntry;
use super::detect::DeviceRecord;
use super::label::shorten;
use super::probe::LoadedDriverProbe;
use super::vendor;
use crate::runner::CommandRunner;

/// Lowest Radeon HD series still handled by the proprietary driver.
pub(crate) const ATI_MIN_SERIES: u32 = 5000;
pub(crate) const ATI_DRIVER: &str = "fglrx";

pub(crate) const OPTIMUS_DRIVER: &str = "bumblebee-nvidia";
const NVIDIA_DETECT: &str = "nvidia-detect | grep nvidia- | tr -d ' '";

pub(crate) const PAE_MACHINE: &str = "i686";
pub(crate) const PAE_KERNEL_PACKAGE: &str = "linux-image-686-pae";
pub(crate) const PAE_LABEL: &str = "PAE capable system";

/// Marks Broadcom chips known to have no usable driver.
pub(crate) const UNSUPPORTED_DRIVER: &str = "unknown";

/// Broadcom device ids (pipe-delimited) and the driver serving them.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WirelessRule {
    pub(crate) driver: &'static str,
    pub(crate) device_ids: &'static str,
}

/// Checked top to bottom; the first rule containing the device id wins.
/// See http://linuxwireless.org/en/users/Drivers/b43
pub(crate) const BROADCOM_DRIVERS: &[WirelessRule] = &[
    WirelessRule {
        driver: "b43",
        device_ids: "|4307|4311|4312|4315|4318|4319|4320|4321|4324|4331|4350|4353|4357|a8d6|a8d8|432c|",
    },
    WirelessRule {
        driver: "b43legacy",
        device_ids: "|4301|4306|4325|",
    },
    WirelessRule {
        driver: "wldebian",
        device_ids: "4313|4328|4329|432a|432b|432d|4358|4359|435a|a99d|",
    },
    WirelessRule {
        driver: "brcmdebian",
        device_ids: "|576|4727|",
    },
    WirelessRule {
        driver: UNSUPPORTED_DRIVER,
        device_ids: "|4322|4360|4365|43b1|",
    },
];

/// Driver for a Broadcom device id, `None` when no rule lists it.
pub(crate) fn broadcom_driver_for(device_id: &str) -> Option<&'static str> {
    BROADCOM_DRIVERS
        .iter()
        .find(|rule| rule.device_ids.contains(device_id))
        .map(|rule| rule.driver)
}

fn ati_series_regex() -> &'static Regex {
    static ATI_SERIES: OnceLock<Regex> = OnceLock::new();
    ATI_SERIES.get_or_init(|| Regex::new(r"HD\W([0-9]{4})").expect("series pattern is valid"))
}

/// Radeon HD series number from an lspci description.
pub(crate) fn ati_series(description: &str) -> Option<u32> {
    ati_series_regex()
        .captures(description)
        .and_then(|caps| caps[1].parse().ok())
}

/// Rows, unsupported descriptions and the booted-PAE fact produced by a resolver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub entries: Vec<HardwareEntry>,
    pub not_supported: Vec<String>,
    pub pae_booted: bool,
}

impl Resolution {
    pub(crate) fn merge(&mut self, other: Resolution) {
        self.entries.extend(other.entries);
        self.not_supported.extend(other.not_supported);
        self.pae_booted |= other.pae_booted;
    }
}

/// Shared per-scan inputs. Loaded drivers are probed at most once and only
/// when a resolver asks for them.
pub(crate) struct ScanContext<'a> {
    runner: &'a dyn CommandRunner,
    probe: &'a LoadedDriverProbe,
    media_dir: &'a Path,
    label_width: usize,
    graphics: OnceCell<String>,
    wireless: OnceCell<String>,
}

impl<'a> ScanContext<'a> {
    pub(crate) fn new(
        runner: &'a dyn CommandRunner,
        probe: &'a LoadedDriverProbe,
        media_dir: &'a Path,
        label_width: usize,
    ) -> Self {
        Self {
            runner,
            probe,
            media_dir,
            label_width,
            graphics: OnceCell::new(),
            wireless: OnceCell::new(),
        }
    }

    pub(crate) fn runner(&self) -> &dyn CommandRunner {
        self.runner
    }

    pub(crate) fn loaded_graphics_driver(&self) -> &str {
        self.graphics.get_or_init(|| {
            let module = self.probe.graphics_driver();
            debug!(%module, "loaded graphical driver");
            module
        })
    }

    pub(crate) fn loaded_wireless_driver(&self) -> &str {
        self.wireless.get_or_init(|| {
            let driver = self.probe.wireless_driver();
            debug!(%driver, "loaded wireless driver");
            driver
        })
    }

    fn logo(&self, name: &str) -> String {
        self.media_dir
            .join("images")
            .join(format!("{name}.png"))
            .display()
            .to_string()
    }

    fn label(&self, description: &str) -> String {
        shorten(description, self.label_width)
    }

    #[cfg(test)]
    pub(crate) fn with_loaded(self, graphics: &str, wireless: &str) -> Self {
        let _ = self.graphics.set(graphics.to_string());
        let _ = self.wireless.set(wireless.to_string());
        self
    }
}

/// One hardware class: which PCI devices to look at and how to turn them
/// into catalog rows.
pub(crate) trait DriverResolver {
    fn name(&self) -> &'static str;

    /// `(vendor id, lspci class filter)`, or `None` for non-PCI classes.
    fn device_query(&self) -> Option<(&'static str, &'static str)>;

    fn resolve(&self, records: &[DeviceRecord], ctx: &ScanContext<'_>) -> Resolution;
}

/// ATI/AMD Radeon HD cards, gated on the HD series number.
pub(crate) struct AtiResolver;

impl DriverResolver for AtiResolver {
    fn name(&self) -> &'static str {
        "ati"
    }

    fn device_query(&self) -> Option<(&'static str, &'static str)> {
        Some((vendor::AMD, "VGA"))
    }

    fn resolve(&self, records: &[DeviceRecord], ctx: &ScanContext<'_>) -> Resolution {
        let mut out = Resolution::default();

        for device in records {
            debug!(description = %device.description, "ATI device found");

            let Some(series) = ati_series(&device.description) else {
                out.not_supported.push(device.description.clone());
                continue;
            };

            if series < ATI_MIN_SERIES {
                debug!(series, "ATI series too old, not listed");
                continue;
            }

            info!(series, driver = ATI_DRIVER, "ATI driver to use");
            out.entries.push(HardwareEntry {
                selected: ctx.loaded_graphics_driver() == ATI_DRIVER,
                logo_path: ctx.logo("ati"),
                label: ctx.label(&device.description),
                driver_id: ATI_DRIVER.to_string(),
                manufacturer_id: device.vendor_id.clone(),
                device_id: device.device_id.clone(),
            });
        }

        out
    }
}

/// NVIDIA cards, including Intel + NVIDIA hybrid (Optimus) laptops.
pub(crate) struct NvidiaResolver;

impl DriverResolver for NvidiaResolver {
    fn name(&self) -> &'static str {
        "nvidia"
    }

    fn device_query(&self) -> Option<(&'static str, &'static str)> {
        Some((vendor::NVIDIA, "VGA"))
    }

    fn resolve(&self, records: &[DeviceRecord], ctx: &ScanContext<'_>) -> Resolution {
        let mut out = Resolution::default();

        let optimus = records.iter().any(|d| d.vendor_id == vendor::INTEL);
        let discrete = records.iter().filter(|d| d.vendor_id == vendor::NVIDIA);

        for device in discrete {
            debug!(description = %device.description, optimus, "Nvidia device found");

            let label = if optimus {
                format!("(Optimus) {}", ctx.label(&device.description))
            } else {
                ctx.label(&device.description)
            };

            let loaded = ctx.loaded_graphics_driver();
            let selected = if optimus {
                (loaded == "nvidia" || loaded == "intel")
                    && !ctx.runner().package_version(OPTIMUS_DRIVER).is_empty()
            } else {
                loaded == "nvidia"
            };

            let driver = if optimus {
                OPTIMUS_DRIVER.to_string()
            } else {
                ctx.runner()
                    .run(NVIDIA_DETECT)
                    .into_iter()
                    .next()
                    .unwrap_or_default()
            };

            if driver.is_empty() {
                debug!(description = %device.description, "no Nvidia driver resolved");
                continue;
            }

            info!(%driver, "Nvidia driver to use");
            out.entries.push(HardwareEntry {
                selected,
                logo_path: ctx.logo("nvidia"),
                label,
                driver_id: driver,
                manufacturer_id: device.vendor_id.clone(),
                device_id: device.device_id.clone(),
            });
        }

        out
    }
}

/// Broadcom wireless chips, matched against [`BROADCOM_DRIVERS`].
pub(crate) struct BroadcomResolver;

impl DriverResolver for BroadcomResolver {
    fn name(&self) -> &'static str {
        "broadcom"
    }

    fn device_query(&self) -> Option<(&'static str, &'static str)> {
        Some((vendor::BROADCOM, ""))
    }

    fn resolve(&self, records: &[DeviceRecord], ctx: &ScanContext<'_>) -> Resolution {
        let mut out = Resolution::default();

        for device in records {
            debug!(description = %device.description, "Broadcom device found");

            match broadcom_driver_for(&device.device_id) {
                None => {}
                Some(UNSUPPORTED_DRIVER) => {
                    debug!(description = %device.description, "Broadcom device not supported");
                    out.not_supported.push(device.description.clone());
                }
                Some(driver) => {
                    info!(driver, "Broadcom driver to use");
                    out.entries.push(HardwareEntry {
                        selected: ctx.loaded_wireless_driver() == driver,
                        logo_path: ctx.logo("broadcom"),
                        label: ctx.label(&device.description),
                        driver_id: driver.to_string(),
                        manufacturer_id: device.vendor_id.clone(),
                        device_id: device.device_id.clone(),
                    });
                }
            }
        }

        out
    }
}

/// PAE kernel on 32-bit x86, a pseudo-device derived from `uname`.
pub(crate) struct PaeResolver;

impl DriverResolver for PaeResolver {
    fn name(&self) -> &'static str {
        "pae"
    }

    fn device_query(&self) -> Option<(&'static str, &'static str)> {
        None
    }

    fn resolve(&self, _records: &[DeviceRecord], ctx: &ScanContext<'_>) -> Resolution {
        let mut out = Resolution::default();

        let first_line = |command: &str| ctx.runner().run(command).into_iter().next().unwrap_or_default();
        let machine = first_line("uname -m");
        let release = first_line("uname -r");
        debug!(%machine, %release, "PAE check");

        if machine != PAE_MACHINE {
            return out;
        }

        let selected = if release.contains(vendor::PAE) {
            out.pae_booted = true;
            true
        } else {
            !ctx.runner().package_version(PAE_KERNEL_PACKAGE).is_empty()
        };

        out.entries.push(HardwareEntry {
            selected,
            logo_path: ctx.logo("pae"),
            label: PAE_LABEL.to_string(),
            driver_id: String::new(),
            manufacturer_id: vendor::PAE.to_string(),
            device_id: String::new(),
        });

        out
    }
}
