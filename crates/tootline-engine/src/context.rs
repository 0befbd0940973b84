//! Who the engine is acting for.
//!
//! Every timeline is constructed with an [`AccountContext`] instead of
//! reaching into a process-wide "active account". Switching accounts means
//! building new timelines with a new context; nothing is shared or swapped
//! underneath a running task.

use serde::{Deserialize, Serialize};

/// Per-account viewing preferences the engine honors while building entries.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelinePrefs {
    /// Drop replies from the home feed.
    pub filter_home_replies: bool,
    /// Drop boosts from the home feed.
    pub filter_home_boosts: bool,
    /// Show sensitive media without the click-through.
    pub always_show_sensitive: bool,
    /// Open content warnings by default.
    pub always_open_spoiler: bool,
}

/// The signed-in account a timeline belongs to.
#[derive(Clone, Debug)]
pub struct AccountContext {
    /// Local row id of the account record. Namespaces the cache; nothing to
    /// do with any server-side id.
    pub account_id: i64,
    pub prefs: TimelinePrefs,
}

impl AccountContext {
    pub fn new(account_id: i64) -> Self {
        Self {
            account_id,
            prefs: TimelinePrefs::default(),
        }
    }

    pub fn with_prefs(mut self, prefs: TimelinePrefs) -> Self {
        self.prefs = prefs;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
