//! Mastodon API entities, as deserialized from the server.
//!
//! Field coverage follows what the timeline pipeline actually consumes; the
//! server sends more keys and serde ignores them. Optional and collection
//! fields carry `#[serde(default)]` so partial payloads from older or
//! non-mainline servers still parse.
//!
//! A boost arrives as an outer `Status` wrapping the boosted one in `reblog`.
//! Everything that acts on a status (favourite, bookmark, poll state) lives on
//! the inner status; the `actionable*` helpers resolve to it so callers never
//! special-case boosts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, StatusId};

// ── Status ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub id: StatusId,
    pub account: Account,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub spoiler_text: String,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub in_reply_to_id: Option<StatusId>,
    #[serde(default)]
    pub in_reply_to_account_id: Option<AccountId>,
    #[serde(default)]
    pub reblog: Option<Box<Status>>,
    #[serde(default)]
    pub reblogs_count: i64,
    #[serde(default)]
    pub favourites_count: i64,
    #[serde(default)]
    pub reblogged: bool,
    #[serde(default)]
    pub favourited: bool,
    #[serde(default)]
    pub bookmarked: bool,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub media_attachments: Vec<Attachment>,
    #[serde(default)]
    pub mentions: Vec<Mention>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub poll: Option<Poll>,
    #[serde(default)]
    pub language: Option<String>,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            id: StatusId::default(),
            account: Account::default(),
            created_at: DateTime::UNIX_EPOCH,
            edited_at: None,
            content: String::new(),
            spoiler_text: String::new(),
            visibility: Visibility::default(),
            sensitive: false,
            url: None,
            in_reply_to_id: None,
            in_reply_to_account_id: None,
            reblog: None,
            reblogs_count: 0,
            favourites_count: 0,
            reblogged: false,
            favourited: false,
            bookmarked: false,
            muted: false,
            pinned: false,
            media_attachments: Vec::new(),
            mentions: Vec::new(),
            tags: Vec::new(),
            poll: None,
            language: None,
        }
    }
}

impl Status {
    /// The status a user action applies to: the boosted status for a boost,
    /// otherwise this status itself.
    pub fn actionable(&self) -> &Status {
        self.reblog.as_deref().unwrap_or(self)
    }

    pub fn actionable_mut(&mut self) -> &mut Status {
        match self.reblog {
            Some(ref mut boosted) => boosted,
            None => self,
        }
    }

    pub fn actionable_id(&self) -> &StatusId {
        &self.actionable().id
    }

    pub fn is_boost(&self) -> bool {
        self.reblog.is_some()
    }

    pub fn is_reply(&self) -> bool {
        self.actionable().in_reply_to_id.is_some()
    }
}

// ── Account ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub acct: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub bot: bool,
}

impl Account {
    /// Display name, falling back to the username when the profile left it
    /// blank.
    pub fn name(&self) -> &str {
        if self.display_name.is_empty() {
            &self.username
        } else {
            &self.display_name
        }
    }

    /// The account's home instance.
    ///
    /// Remote accounts carry it in `acct` (`user@instance`); for local
    /// accounts it is recovered from the profile URL.
    pub fn domain(&self) -> Option<&str> {
        if let Some((_, domain)) = self.acct.split_once('@') {
            return Some(domain);
        }
        let rest = self
            .url
            .strip_prefix("https://")
            .or_else(|| self.url.strip_prefix("http://"))?;
        let host = rest.split('/').next()?;
        (!host.is_empty()).then_some(host)
    }
}

// ── Visibility ──────────────────────────────────────────────────────────────

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Unlisted,
    Private,
    Direct,
}

// ── Attachments, mentions, tags ─────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub blurhash: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    pub id: AccountId,
    pub username: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub acct: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(default)]
    pub url: String,
}

// ── Polls ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expired: bool,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub votes_count: i64,
    #[serde(default)]
    pub voters_count: Option<i64>,
    #[serde(default)]
    pub options: Vec<PollOption>,
    #[serde(default)]
    pub voted: bool,
    #[serde(default)]
    pub own_votes: Vec<u32>,
}

/// Vote counts are `None` while the server hides results from non-voters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PollOption {
    pub title: String,
    #[serde(default)]
    pub votes_count: Option<i64>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN_STATUS: &str = r#"{
        "id": "103270115826048975",
        "created_at": "2019-12-08T03:48:33.901Z",
        "in_reply_to_id": null,
        "sensitive": false,
        "spoiler_text": "",
        "visibility": "public",
        "language": "en",
        "url": "https://mastodon.example/@alice/103270115826048975",
        "reblogs_count": 3,
        "favourites_count": 12,
        "favourited": true,
        "reblogged": false,
        "content": "<p>hello fediverse</p>",
        "account": {
            "id": "14715",
            "username": "alice",
            "acct": "alice",
            "display_name": "Alice",
            "url": "https://mastodon.example/@alice",
            "avatar": "https://files.mastodon.example/avatars/alice.png"
        },
        "media_attachments": [],
        "mentions": [],
        "tags": [{"name": "introductions", "url": "https://mastodon.example/tags/introductions"}],
        "poll": null
    }"#;

    fn boost_json() -> String {
        format!(
            r#"{{
                "id": "103270116000000001",
                "created_at": "2019-12-08T04:00:00.000Z",
                "visibility": "public",
                "content": "",
                "account": {{
                    "id": "99",
                    "username": "bob",
                    "acct": "bob@other.example",
                    "url": "https://other.example/@bob",
                    "avatar": ""
                }},
                "reblog": {}
            }}"#,
            PLAIN_STATUS
        )
    }

    // ── Deserialization ─────────────────────────────────────────────────

    #[test]
    fn test_parses_plain_status() {
        let status: Status = serde_json::from_str(PLAIN_STATUS).unwrap();
        assert_eq!(status.id.as_str(), "103270115826048975");
        assert_eq!(status.account.username, "alice");
        assert_eq!(status.visibility, Visibility::Public);
        assert!(status.favourited);
        assert_eq!(status.tags.len(), 1);
        assert!(status.poll.is_none());
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let sparse = r#"{
            "id": "1",
            "created_at": "2023-01-01T00:00:00.000Z",
            "account": {"id": "2", "username": "x", "acct": "x"}
        }"#;
        let status: Status = serde_json::from_str(sparse).unwrap();
        assert_eq!(status.content, "");
        assert_eq!(status.visibility, Visibility::Public);
        assert!(!status.sensitive);
        assert!(status.media_attachments.is_empty());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let with_extra = PLAIN_STATUS.replacen(
            "\"id\":",
            "\"application\": {\"name\": \"web\"}, \"id\":",
            1,
        );
        assert!(serde_json::from_str::<Status>(&with_extra).is_ok());
    }

    // ── Actionable resolution ───────────────────────────────────────────

    #[test]
    fn test_plain_status_is_its_own_actionable() {
        let status: Status = serde_json::from_str(PLAIN_STATUS).unwrap();
        assert!(!status.is_boost());
        assert_eq!(status.actionable_id(), &status.id);
    }

    #[test]
    fn test_boost_resolves_to_inner_status() {
        let boost: Status = serde_json::from_str(&boost_json()).unwrap();
        assert!(boost.is_boost());
        assert_eq!(boost.actionable_id().as_str(), "103270115826048975");
        assert_eq!(boost.actionable().account.username, "alice");
        assert_eq!(boost.account.username, "bob");
    }

    #[test]
    fn test_actionable_mut_reaches_inner() {
        let mut boost: Status = serde_json::from_str(&boost_json()).unwrap();
        boost.actionable_mut().favourited = false;
        assert!(!boost.reblog.as_ref().unwrap().favourited);
    }

    // ── Account helpers ─────────────────────────────────────────────────

    #[test]
    fn test_domain_from_acct() {
        let account = Account {
            acct: "bob@other.example".to_string(),
            ..Account::default()
        };
        assert_eq!(account.domain(), Some("other.example"));
    }

    #[test]
    fn test_domain_for_local_account_from_url() {
        let account = Account {
            acct: "alice".to_string(),
            url: "https://mastodon.example/@alice".to_string(),
            ..Account::default()
        };
        assert_eq!(account.domain(), Some("mastodon.example"));
    }

    #[test]
    fn test_name_falls_back_to_username() {
        let account = Account {
            username: "alice".to_string(),
            display_name: String::new(),
            ..Account::default()
        };
        assert_eq!(account.name(), "alice");
    }

    // ── Visibility ──────────────────────────────────────────────────────

    #[test]
    fn test_visibility_string_roundtrip() {
        assert_eq!(Visibility::Unlisted.to_string(), "unlisted");
        assert_eq!("direct".parse::<Visibility>().unwrap(), Visibility::Direct);
        assert!("secret".parse::<Visibility>().is_err());
    }

    // ── Polls ───────────────────────────────────────────────────────────

    #[test]
    fn test_poll_hidden_counts_parse_as_none() {
        let poll: Poll = serde_json::from_str(
            r#"{
                "id": "5",
                "expired": false,
                "multiple": false,
                "votes_count": 10,
                "options": [
                    {"title": "yes", "votes_count": null},
                    {"title": "no", "votes_count": null}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(poll.options.len(), 2);
        assert_eq!(poll.options[0].votes_count, None);
        assert!(!poll.voted);
    }
}
