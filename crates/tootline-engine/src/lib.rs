//! Timeline synchronization engine for tootline.
//!
//! Everything between the Mastodon API and a rendered feed lives here: the
//! per-timeline [`Timeline`] synchronizer with its gap-aware merge logic,
//! the SQLite cache behind the home feed, client-side evaluation of the
//! server's filter rules, the app-wide [`EventBus`], and the task wrapper
//! that runs a timeline behind a [`TimelineHandle`].
//!
//! The shape of the thing:
//!
//! ```text
//!   EventBus ──────────────┐
//!                          ▼
//!   TimelineHandle ───▶ Timeline ◀──▶ TimelineSource (HTTP)
//!                          │   ▲
//!                          │   └──── FilterEngine
//!                          ▼
//!             TimelineDb (SQLite)    TimelineSnapshot ──▶ views
//! ```
//!
//! Most integrations want [`Timeline::new`] plus [`spawn_timeline`]; direct
//! use of [`Timeline`] without the task wrapper works too and is how the
//! engine's own tests drive it.

pub mod constants;
pub mod context;
pub mod entry;
pub mod events;
pub mod filter;
pub mod handle;
pub mod timeline;
pub mod timeline_db;

pub use context::{AccountContext, TimelinePrefs};
pub use entry::{PostView, TimelineEntry};
pub use events::{Event, EventBus};
pub use filter::FilterEngine;
pub use handle::{HandleError, TimelineHandle, spawn_timeline};
pub use timeline::{FailureKind, LoadPhase, SyncError, Timeline, TimelineSnapshot};
pub use timeline_db::TimelineDb;
