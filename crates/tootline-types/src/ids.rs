//! Typed identifiers for statuses and accounts.
//!
//! Mastodon hands out ids as decimal strings and the API orders them
//! numerically: a longer string is always a larger id, equal lengths fall back
//! to byte order. `StatusId` encodes that ordering in its `Ord` impl so the
//! rest of the workspace can say `a > b` and mean "a is newer than b" without
//! parsing anything.
//!
//! `increment`/`decrement` do decimal string arithmetic. They exist so a
//! synthetic id can be placed immediately next to a real one (gap markers sit
//! at `oldest_fetched - 1`) and so range queries can be made inclusive or
//! exclusive without a numeric type that might not fit the server's ids.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A status identifier, as issued by the server.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusId(String);

/// An account identifier, as issued by the server.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

// ── StatusId ────────────────────────────────────────────────────────────────

impl StatusId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    fn is_decimal(&self) -> bool {
        !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_digit())
    }

    /// The next id up, as a decimal string (`"17"` to `"18"`, `"99"` to `"100"`).
    ///
    /// Non-decimal ids are returned unchanged.
    pub fn increment(&self) -> StatusId {
        if !self.is_decimal() {
            return self.clone();
        }
        let mut digits: Vec<u8> = self.0.bytes().collect();
        for d in digits.iter_mut().rev() {
            if *d < b'9' {
                *d += 1;
                return Self(digits.into_iter().map(char::from).collect());
            }
            *d = b'0';
        }
        digits.insert(0, b'1');
        Self(digits.into_iter().map(char::from).collect())
    }

    /// The next id down, saturating at `"0"` (`"100"` to `"99"`, `"0"` stays `"0"`).
    ///
    /// Non-decimal ids are returned unchanged.
    pub fn decrement(&self) -> StatusId {
        if !self.is_decimal() {
            return self.clone();
        }
        let mut digits: Vec<u8> = self.0.bytes().collect();
        for i in (0..digits.len()).rev() {
            if digits[i] > b'0' {
                digits[i] -= 1;
                let s: String = digits.into_iter().map(char::from).collect();
                let trimmed = s.trim_start_matches('0');
                return if trimmed.is_empty() {
                    Self("0".to_string())
                } else {
                    Self(trimmed.to_string())
                };
            }
            digits[i] = b'9';
        }
        Self("0".to_string())
    }
}

impl PartialOrd for StatusId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StatusId {
    /// Numeric order without parsing: longer decimal string wins, equal
    /// lengths compare bytewise. Matches how the server pages ids.
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl fmt::Display for StatusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for StatusId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for StatusId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ── AccountId ───────────────────────────────────────────────────────────────

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
