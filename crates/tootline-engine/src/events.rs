//! The event bus: how the rest of the app tells timelines what changed.
//!
//! One broadcast channel, one closed [`Event`] enum. A favourite toggled in a
//! thread view, a block confirmed in a profile, a poll voted on anywhere: the
//! acting component publishes once and every live timeline applies the change
//! to its own entries. Nobody reaches into anyone else's list, and every
//! variant a timeline can receive is listed here, matched exhaustively.

use tokio::sync::broadcast;
use tootline_types::{AccountId, Poll, Status, StatusId};

use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::context::TimelinePrefs;

/// Something happened elsewhere in the app that timelines may care about.
///
/// Status-targeting variants carry the id of the *actionable* status (the
/// boosted one, for boosts); timelines apply them to plain rows and to boost
/// rows wrapping the same status alike.
#[derive(Clone, Debug)]
pub enum Event {
    Favourited { status_id: StatusId, favourited: bool },
    Reblogged { status_id: StatusId, reblogged: bool },
    Bookmarked { status_id: StatusId, bookmarked: bool },
    Pinned { status_id: StatusId, pinned: bool },
    /// Thread notifications muted for a status.
    ConversationMuted { status_id: StatusId, muted: bool },
    PollVoted { status_id: StatusId, poll: Poll },
    StatusEdited { status: Box<Status> },
    StatusDeleted { status_id: StatusId },
    /// The user composed a new post from this app.
    StatusComposed { status: Box<Status> },
    AccountMuted { account_id: AccountId },
    AccountBlocked { account_id: AccountId },
    AccountUnfollowed { account_id: AccountId },
    DomainMuted { domain: String },
    /// The server-side filter set changed; timelines refetch and reclassify.
    FiltersChanged,
    /// The user flipped a timeline preference. Carries the full new snapshot;
    /// timelines diff it against the one they hold.
    PreferencesChanged { prefs: TimelinePrefs },
}

/// Cloneable publish/subscribe handle over the app-wide event channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish to all current subscribers. Returns how many there were;
    /// zero (nobody listening) is not an error.
    pub fn publish(&self, event: Event) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
