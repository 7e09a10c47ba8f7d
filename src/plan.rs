//! Install/purge planning
//!
//! Diffs the scanned baseline against the user's edited selection and turns
//! every changed row into an installer script invocation.

use tracing::{debug, info};

use crate::hardware::{vendor, HardwareEntry};

/// What to do with one catalog row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Install,
    Purge,
    NoChange,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Install => write!(f, "install"),
            Operation::Purge => write!(f, "purge"),
            Operation::NoChange => write!(f, "no change"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPlanItem {
    pub driver_id: String,
    pub manufacturer_id: String,
    pub operation: Operation,
}

#[derive(Debug, Clone, Copy)]
enum ManufacturerMatch {
    Exact(&'static str),
    Contains(&'static str),
}

impl ManufacturerMatch {
    fn matches(self, manufacturer_id: &str) -> bool {
        match self {
            ManufacturerMatch::Exact(id) => manufacturer_id == id,
            ManufacturerMatch::Contains(token) => manufacturer_id.contains(token),
        }
    }
}

/// Installer scripts per manufacturer.
#[derive(Debug, Clone, Copy)]
struct InstallerRule {
    manufacturer: ManufacturerMatch,
    install: &'static str,
    purge: &'static str,
}

const INSTALLER_RULES: &[InstallerRule] = &[
    InstallerRule {
        manufacturer: ManufacturerMatch::Exact(vendor::AMD),
        install: "install-ati",
        purge: "install-open",
    },
    InstallerRule {
        manufacturer: ManufacturerMatch::Exact(vendor::NVIDIA),
        install: "install-nvidia",
        purge: "install-open",
    },
    InstallerRule {
        manufacturer: ManufacturerMatch::Exact(vendor::BROADCOM),
        install: "install-broadcom",
        purge: "install-broadcom purge",
    },
    InstallerRule {
        manufacturer: ManufacturerMatch::Contains(vendor::PAE),
        install: "install-pae",
        purge: "install-pae purge",
    },
];

/// Restores the open drivers and cleans up proprietary configuration.
const DEFAULT_PURGE: &str = "install-open";

impl ActionPlanItem {
    /// Installer invocation for this item; `None` for no-ops and installs
    /// with no matching script.
    pub fn command(&self) -> Option<&'static str> {
        let rule = INSTALLER_RULES
            .iter()
            .find(|rule| rule.manufacturer.matches(&self.manufacturer_id));

        match self.operation {
            Operation::NoChange => None,
            Operation::Install => rule.map(|rule| rule.install),
            Operation::Purge => Some(rule.map_or(DEFAULT_PURGE, |rule| rule.purge)),
        }
    }
}

/// Ordered plan for every non-header row
#[derive(Debug, Clone, Default)]
pub struct ActionPlan {
    pub items: Vec<ActionPlanItem>,
}

impl ActionPlan {
    pub fn has_installs(&self) -> bool {
        self.items.iter().any(|item| item.operation == Operation::Install)
    }

    pub fn is_noop(&self) -> bool {
        self.items.iter().all(|item| item.operation == Operation::NoChange)
    }

    /// All installer invocations joined into one shell command line.
    pub fn composite_command(&self) -> Option<String> {
        let commands: Vec<&str> = self.items.iter().filter_map(ActionPlanItem::command).collect();
        if commands.is_empty() {
            None
        } else {
            Some(commands.join("; "))
        }
    }
}

type RowKey<'a> = (&'a str, &'a str, &'a str, &'a str);

fn row_key(entry: &HardwareEntry) -> RowKey<'_> {
    (
        entry.manufacturer_id.as_str(),
        entry.device_id.as_str(),
        entry.driver_id.as_str(),
        entry.label.as_str(),
    )
}

/// Compare `selected` between the baseline and the edited copy.
///
/// The first row of both lists is the header and is skipped. Rows are paired
/// by identity (manufacturer, device, driver, label); duplicates pair up in
/// order. A row with no baseline counterpart is left alone.
pub fn plan(baseline: &[HardwareEntry], final_selection: &[HardwareEntry]) -> ActionPlan {
    let baseline_rows = baseline.get(1..).unwrap_or_default();
    let mut used = vec![false; baseline_rows.len()];
    let mut items = Vec::new();

    for wanted in final_selection.get(1..).unwrap_or_default() {
        let key = row_key(wanted);
        let counterpart = baseline_rows
            .iter()
            .enumerate()
            .find(|(idx, row)| !used[*idx] && row_key(row) == key);

        let operation = match counterpart {
            Some((idx, current)) => {
                used[idx] = true;
                match (current.selected, wanted.selected) {
                    (true, false) => Operation::Purge,
                    (false, true) => Operation::Install,
                    _ => Operation::NoChange,
                }
            }
            None => {
                debug!(label = %wanted.label, "row missing from baseline, left unchanged");
                Operation::NoChange
            }
        };

        info!(%operation, label = %wanted.label, manufacturer = %wanted.manufacturer_id, "planned");
        items.push(ActionPlanItem {
            driver_id: wanted.driver_id.clone(),
            manufacturer_id: wanted.manufacturer_id.clone(),
            operation,
        });
    }

    ActionPlan { items }
}
