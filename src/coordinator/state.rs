//! The coordinator's own lifecycle state, independent of any one asset's
//! derivative state.

/// Coarse lifecycle state the UI can render directly (a spinner, a progress
/// bar, an error banner) without inspecting individual assets.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorState {
    /// No folder opened yet.
    Initializing,
    /// A folder is open and not currently scanning.
    Ready,
    /// A scan is in flight; `scanned` counts entries delivered so far.
    Scanning {
        /// Entries ingested so far in the current scan.
        scanned: usize,
    },
    /// The last operation failed; the coordinator remains usable (a new
    /// `choose_folder`/`rescan` can recover), per the design note that
    /// errors don't permanently wedge the coordinator.
    Error {
        /// Human-readable description of the failure.
        message: String,
    },
}

impl CoordinatorState {
    /// True if a scan is currently in flight.
    pub fn is_scanning(&self) -> bool {
        matches!(self, Self::Scanning { .. })
    }
}
