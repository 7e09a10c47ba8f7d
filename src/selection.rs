//! The user's editable copy of the hardware list.

use thiserror::Error;
use tracing::warn;

use crate::hardware::{vendor, HardwareEntry, ScanReport};

/// Reasons an edit was refused or could not be applied
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("You cannot remove a booted kernel.\nPlease, boot another kernel and try again.")]
    BootedKernel,

    #[error("No hardware row {0}")]
    UnknownRow(usize),
}

/// Desired driver state, seeded from a scan's baseline.
#[derive(Debug, Clone)]
pub struct Selection {
    entries: Vec<HardwareEntry>,
    pae_booted: bool,
}

impl Selection {
    pub fn from_scan(report: &ScanReport) -> Self {
        Self {
            entries: report.entries.clone(),
            pae_booted: report.pae_booted,
        }
    }

    /// Header row included, same layout as the baseline.
    pub fn entries(&self) -> &[HardwareEntry] {
        &self.entries
    }

    /// Mark row `row` (1-based, header excluded) as wanted or not.
    ///
    /// Deselecting the PAE kernel while it is the booted kernel is refused and
    /// the row stays selected.
    pub fn set_selected(&mut self, row: usize, selected: bool) -> Result<(), SelectionError> {
        if row == 0 {
            return Err(SelectionError::UnknownRow(row));
        }
        let pae_booted = self.pae_booted;
        let entry = self
            .entries
            .get_mut(row)
            .ok_or(SelectionError::UnknownRow(row))?;

        entry.selected = selected;

        if !selected && pae_booted && entry.manufacturer_id.contains(vendor::PAE) {
            entry.selected = true;
            let err = SelectionError::BootedKernel;
            warn!(row, "{err}");
            return Err(err);
        }

        Ok(())
    }
}
