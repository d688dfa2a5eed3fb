//! Progress reporting trait.
//!
//! This module defines the ProgressCallback trait, which keeps the mirror
//! engine independent of how (or whether) progress is shown.

use crate::model::{Action, MirrorJob, MirrorReport, TreeEntry};

/// Trait for receiving progress updates from a mirror run.
///
/// All methods are called synchronously on the walking thread. A run that
/// fails stops calling back at the failing entry; `on_mirror_completed` is
/// only invoked on success.
pub trait ProgressCallback {
    /// Called once before the first entry is visited.
    fn on_mirror_started(&self, job: &MirrorJob);

    /// Called after an entry has been handled.
    fn on_entry_completed(&self, job: &MirrorJob, entry: &TreeEntry, action: Action);

    /// Called when every entry has been handled.
    fn on_mirror_completed(&self, job: &MirrorJob, report: &MirrorReport);
}
