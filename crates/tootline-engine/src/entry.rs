//! What a timeline is made of.
//!
//! A timeline is one list of [`TimelineEntry`] values, strictly descending by
//! id. Almost every entry is a post; the exception is a gap marker standing
//! in for a known hole between fetched ranges. Keeping the hole in the list
//! as a first-class entry is what lets "load the middle" be an operation on
//! an id instead of on screen coordinates.
//!
//! List shape invariants, restored by [`normalize`] after every mutation:
//! ids strictly descending, no two gaps adjacent, no gap at the head. A gap
//! at the tail is legal; it means "older content exists below".

use tootline_types::{Status, StatusId};

use crate::context::TimelinePrefs;

/// A post plus the view state that must survive refreshes.
#[derive(Clone, Debug, PartialEq)]
pub struct PostView {
    pub status: Status,
    /// Content warning opened.
    pub expanded: bool,
    /// Sensitive media revealed.
    pub content_showing: bool,
    /// Long content folded behind "show more".
    pub content_collapsed: bool,
    /// Collapsed behind a filter-match warning.
    pub warned: bool,
}

impl PostView {
    /// View state for a post seen for the first time, honoring the account's
    /// preferences.
    pub fn fresh(status: Status, prefs: &TimelinePrefs) -> Self {
        let content_showing = prefs.always_show_sensitive || !status.actionable().sensitive;
        Self {
            status,
            expanded: prefs.always_open_spoiler,
            content_showing,
            content_collapsed: true,
            warned: false,
        }
    }
}

/// One row of a timeline.
#[derive(Clone, Debug, PartialEq)]
pub enum TimelineEntry {
    Post(Box<PostView>),
    /// A known hole. `loading` while a fill for it is in flight.
    Gap { id: StatusId, loading: bool },
}

impl TimelineEntry {
    pub fn post(view: PostView) -> Self {
        TimelineEntry::Post(Box::new(view))
    }

    pub fn gap(id: StatusId) -> Self {
        TimelineEntry::Gap { id, loading: false }
    }

    /// The id this entry occupies in the descending order.
    pub fn id(&self) -> &StatusId {
        match self {
            TimelineEntry::Post(view) => &view.status.id,
            TimelineEntry::Gap { id, .. } => id,
        }
    }

    pub fn is_post(&self) -> bool {
        matches!(self, TimelineEntry::Post(_))
    }

    pub fn is_gap(&self) -> bool {
        matches!(self, TimelineEntry::Gap { .. })
    }

    pub fn as_post(&self) -> Option<&PostView> {
        match self {
            TimelineEntry::Post(view) => Some(view),
            TimelineEntry::Gap { .. } => None,
        }
    }

    pub fn as_post_mut(&mut self) -> Option<&mut PostView> {
        match self {
            TimelineEntry::Post(view) => Some(view),
            TimelineEntry::Gap { .. } => None,
        }
    }
}

/// Restore the list shape invariants after a mutation: drop gaps that ended
/// up at the head or next to another gap. Order is never changed here; the
/// caller is responsible for inserting in descending position.
pub fn normalize(entries: &mut Vec<TimelineEntry>) {
    let mut previous_was_gap = true; // head counts as a gap boundary
    entries.retain(|entry| {
        let keep = !(entry.is_gap() && previous_was_gap);
        if keep {
            previous_was_gap = entry.is_gap();
        }
        keep
    });
}

/// True when ids strictly descend. Mutation code checks this under
/// `debug_assert!`; tests use it directly.
pub fn is_strictly_descending(entries: &[TimelineEntry]) -> bool {
    entries.windows(2).all(|pair| pair[0].id() > pair[1].id())
}

// ============================================================================
// Tests
// ============================================================================
