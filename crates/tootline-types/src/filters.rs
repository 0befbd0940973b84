//! Server-side filter rules (the v1 keyword filter API).
//!
//! A rule is a phrase the user never wants to see, scoped to one or more
//! contexts and optionally expiring. The server only stores rules; matching
//! happens client-side, in the engine's filter module. What a match does
//! follows from `irreversible`: an irreversible rule drops the post outright,
//! anything else collapses it behind a warning the reader can click through.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a filter rule applies.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterContext {
    Home,
    Notifications,
    Public,
    Thread,
    Account,
    /// Context strings this client does not know. Never matched.
    #[serde(other)]
    Unknown,
}

/// What happens to a post once a rule matches.
///
/// Ordered by severity so the strongest verdict across several rules wins.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub enum FilterAction {
    #[default]
    None,
    Warn,
    Hide,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    pub id: String,
    pub phrase: String,
    #[serde(default)]
    pub context: Vec<FilterContext>,
    #[serde(default)]
    pub whole_word: bool,
    #[serde(default)]
    pub irreversible: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl FilterRule {
    pub fn action(&self) -> FilterAction {
        if self.irreversible {
            FilterAction::Hide
        } else {
            FilterAction::Warn
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn applies_in(&self, context: FilterContext) -> bool {
        self.context.contains(&context)
    }
}

// ============================================================================
// Tests
// ============================================================================
