//! Shared entity and timeline types for tootline.
//!
//! This crate is the vocabulary the rest of the workspace speaks: server
//! entities as they come off the wire, typed ids with the server's numeric
//! ordering baked in, timeline identity, and filter rules. It has **no
//! internal tootline dependencies**: a pure leaf crate that the API client
//! and the sync engine both build on.
//!
//! # Key Types
//!
//! |------------------|------------------------------------------------|
//! | Type             | Purpose                                        |
//! |------------------|------------------------------------------------|
//! | [`StatusId`]     | Status id, ordered the way the server pages    |
//! | [`AccountId`]    | Account id                                     |
//! | [`Status`]       | A post, possibly wrapping a boosted one        |
//! | [`Account`]      | Author / booster profile data                  |
//! | [`TimelineKind`] | Which feed (home, public, tag, profile, ...)   |
//! | [`FilterRule`]   | One server-side keyword filter                 |
//! |------------------|------------------------------------------------|

pub mod entities;
pub mod filters;
pub mod ids;
pub mod timeline;

// Re-export primary types at crate root for convenience.
pub use entities::{Account, Attachment, Mention, Poll, PollOption, Status, Tag, Visibility};
pub use filters::{FilterAction, FilterContext, FilterRule};
pub use ids::{AccountId, StatusId};
pub use timeline::{TimelineKind, UserScope};
