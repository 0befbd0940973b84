//! The contract between the sync engine and wherever statuses come from.

use async_trait::async_trait;
use tootline_types::{FilterRule, Status, StatusId, TimelineKind};

use crate::ApiError;

/// One page request against a timeline endpoint.
///
/// `max_id` walks down (strictly older than the given id), `since_id` walks
/// up (strictly newer). Both at once bound a range, which is how gaps are
/// filled.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PageQuery {
    pub max_id: Option<StatusId>,
    pub since_id: Option<StatusId>,
    pub limit: u32,
}

impl PageQuery {
    /// The newest posts, no anchor.
    pub fn newest(limit: u32) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Posts strictly older than `max_id`.
    pub fn below(max_id: StatusId, limit: u32) -> Self {
        Self {
            max_id: Some(max_id),
            since_id: None,
            limit,
        }
    }

    /// Posts strictly newer than `since_id`.
    pub fn above(since_id: StatusId, limit: u32) -> Self {
        Self {
            max_id: None,
            since_id: Some(since_id),
            limit,
        }
    }

    /// Posts strictly between the two anchors, newest first.
    pub fn between(max_id: StatusId, since_id: StatusId, limit: u32) -> Self {
        Self {
            max_id: Some(max_id),
            since_id: Some(since_id),
            limit,
        }
    }
}

/// A fetched page, newest first, plus whatever paging anchors the server
/// offered in its `Link` header.
#[derive(Clone, Debug, Default)]
pub struct TimelinePage {
    pub statuses: Vec<Status>,
    /// Anchor for the next older page (`rel="next"`), when the server gave one.
    pub next_max_id: Option<StatusId>,
    /// Anchor for the next newer page (`rel="prev"`), when the server gave one.
    pub prev_min_id: Option<StatusId>,
}

impl TimelinePage {
    /// The full-page heuristic: a page that came back with as many posts as
    /// asked for probably has more behind it; a short page is the end.
    pub fn is_full(&self, limit: u32) -> bool {
        self.statuses.len() >= limit as usize
    }

    /// Anchor for fetching the page after this one, preferring the server's
    /// own link over the oldest id we can see.
    pub fn older_anchor(&self) -> Option<StatusId> {
        self.next_max_id
            .clone()
            .or_else(|| self.statuses.last().map(|s| s.id.clone()))
    }
}

/// Where timeline pages and filter rules come from.
///
/// The engine is generic over this so tests can hand it a scripted source.
#[async_trait]
pub trait TimelineSource: Send + Sync {
    async fn fetch_timeline(
        &self,
        kind: &TimelineKind,
        query: PageQuery,
    ) -> Result<TimelinePage, ApiError>;

    async fn fetch_filters(&self) -> Result<Vec<FilterRule>, ApiError>;
}

// ============================================================================
// Tests
// ============================================================================
