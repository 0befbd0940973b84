//! Timeline identity: which feed a view is showing.
//!
//! `TimelineKind` is the key the engine hangs everything off: it selects the
//! remote endpoint, decides whether the feed is backed by the local cache, and
//! names the filter contexts the server's filter rules apply in.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::filters::FilterContext;
use crate::ids::AccountId;

/// Which slice of an account's posts a profile timeline shows.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum UserScope {
    /// Top-level posts and boosts, no replies.
    Posts,
    /// Everything, replies included.
    WithReplies,
    /// Pinned posts only.
    Pinned,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TimelineKind {
    Home,
    /// The whole known network.
    PublicFederated,
    /// Posts from this instance only.
    PublicLocal,
    /// One or more hashtags, merged.
    Tag(Vec<String>),
    User {
        id: AccountId,
        scope: UserScope,
    },
    Favourites,
    Bookmarks,
    List {
        id: String,
        title: String,
    },
}

impl TimelineKind {
    /// Filter contexts the server's rules are matched against for this feed.
    pub fn filter_contexts(&self) -> &'static [FilterContext] {
        match self {
            TimelineKind::Home | TimelineKind::List { .. } => &[FilterContext::Home],
            TimelineKind::PublicFederated
            | TimelineKind::PublicLocal
            | TimelineKind::Tag(_)
            | TimelineKind::Bookmarks => &[FilterContext::Public],
            TimelineKind::Favourites => &[FilterContext::Public, FilterContext::Notifications],
            TimelineKind::User { .. } => &[FilterContext::Account],
        }
    }

    /// Only the home feed is backed by the local cache; every other kind is
    /// fetched straight from the server and held in memory.
    pub fn is_cacheable(&self) -> bool {
        matches!(self, TimelineKind::Home)
    }

    /// Whether a post just composed by `author` should show up here, i.e.
    /// whether the feed is worth refreshing after posting.
    pub fn refreshes_on_compose(&self, author: &AccountId) -> bool {
        match self {
            TimelineKind::Home | TimelineKind::PublicFederated | TimelineKind::PublicLocal => true,
            TimelineKind::User { id, scope } => match scope {
                UserScope::Posts | UserScope::WithReplies => id == author,
                UserScope::Pinned => false,
            },
            TimelineKind::Tag(_)
            | TimelineKind::Favourites
            | TimelineKind::Bookmarks
            | TimelineKind::List { .. } => false,
        }
    }
}

impl fmt::Display for TimelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimelineKind::Home => write!(f, "home"),
            TimelineKind::PublicFederated => write!(f, "public:federated"),
            TimelineKind::PublicLocal => write!(f, "public:local"),
            TimelineKind::Tag(names) => write!(f, "tag:{}", names.join("+")),
            TimelineKind::User { id, scope } => {
                let scope = match scope {
                    UserScope::Posts => "posts",
                    UserScope::WithReplies => "with-replies",
                    UserScope::Pinned => "pinned",
                };
                write!(f, "user:{id}/{scope}")
            }
            TimelineKind::Favourites => write!(f, "favourites"),
            TimelineKind::Bookmarks => write!(f, "bookmarks"),
            TimelineKind::List { id, .. } => write!(f, "list:{id}"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
