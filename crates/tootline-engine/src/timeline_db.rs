//! SQLite persistence for the home timeline.
//!
//! Stores timeline rows (posts and gap markers), the accounts they
//! reference, and per-row view state, normalized across three tables. View
//! state lives apart from status rows so a refresh can delete and reinsert
//! whole id ranges without forgetting which content warnings the reader
//! already opened.
//!
//! Ordering everywhere is the server's: numerically descending ids, spelled
//! `LENGTH(status_id) DESC, status_id DESC` so that `"100"` sorts above
//! `"99"` despite being TEXT. Range predicates use row-value comparisons for
//! the same reason.

use rusqlite::{params, Connection, Result as SqliteResult};
use std::path::Path;

use tootline_types::{Account, AccountId, Poll, Status, StatusId, Visibility};

use crate::context::TimelinePrefs;
use crate::entry::{PostView, TimelineEntry};

/// Database handle for timeline persistence. Owned by one timeline task;
/// never shared.
pub struct TimelineDb {
    conn: Connection,
}

const SCHEMA: &str = r#"
-- Accounts referenced by cached rows (authors and boosters)
CREATE TABLE IF NOT EXISTS timeline_account (
    owner_id INTEGER NOT NULL,
    server_id TEXT NOT NULL,
    username TEXT NOT NULL,
    acct TEXT NOT NULL,
    display_name TEXT NOT NULL,
    url TEXT NOT NULL,
    avatar TEXT NOT NULL,
    bot INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (owner_id, server_id)
);

-- Timeline rows: posts and gap markers, namespaced by owning account.
-- For a boost, status_id is the boost wrapper's id while the content
-- columns (and content_status_id) describe the boosted status; boosted_at
-- is the wrapper's own timestamp, NULL on plain posts.
CREATE TABLE IF NOT EXISTS timeline_status (
    owner_id INTEGER NOT NULL,
    status_id TEXT NOT NULL,
    kind TEXT NOT NULL DEFAULT 'post',
    author_id TEXT,
    booster_id TEXT,
    content_status_id TEXT,
    in_reply_to_id TEXT,
    in_reply_to_account_id TEXT,
    content TEXT NOT NULL DEFAULT '',
    spoiler_text TEXT NOT NULL DEFAULT '',
    visibility TEXT NOT NULL DEFAULT 'public',
    sensitive INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL DEFAULT 0,
    edited_at INTEGER,
    boosted_at INTEGER,
    reblogs_count INTEGER NOT NULL DEFAULT 0,
    favourites_count INTEGER NOT NULL DEFAULT 0,
    reblogged INTEGER NOT NULL DEFAULT 0,
    favourited INTEGER NOT NULL DEFAULT 0,
    bookmarked INTEGER NOT NULL DEFAULT 0,
    muted INTEGER NOT NULL DEFAULT 0,
    pinned INTEGER NOT NULL DEFAULT 0,
    language TEXT,
    url TEXT,
    attachments TEXT,
    mentions TEXT,
    tags TEXT,
    poll TEXT,
    PRIMARY KEY (owner_id, status_id)
);
CREATE INDEX IF NOT EXISTS idx_timeline_order
    ON timeline_status(owner_id, LENGTH(status_id) DESC, status_id DESC);

-- Per-row view state, kept apart so range rewrites don't clobber it
CREATE TABLE IF NOT EXISTS timeline_view (
    owner_id INTEGER NOT NULL,
    status_id TEXT NOT NULL,
    expanded INTEGER NOT NULL DEFAULT 0,
    content_showing INTEGER NOT NULL DEFAULT 0,
    content_collapsed INTEGER NOT NULL DEFAULT 1,
    warned INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (owner_id, status_id)
);
"#;

const ENTRY_COLUMNS: &str = "\
    s.status_id, s.kind, s.content_status_id, s.in_reply_to_id, s.in_reply_to_account_id, \
    s.content, s.spoiler_text, s.visibility, s.sensitive, s.created_at, s.edited_at, \
    s.boosted_at, s.reblogs_count, s.favourites_count, s.reblogged, s.favourited, \
    s.bookmarked, s.muted, s.pinned, s.language, s.url, s.attachments, s.mentions, \
    s.tags, s.poll, \
    v.expanded, v.content_showing, v.content_collapsed, v.warned, \
    a.server_id, a.username, a.acct, a.display_name, a.url, a.avatar, a.bot, \
    b.server_id, b.username, b.acct, b.display_name, b.url, b.avatar, b.bot";

const ENTRY_JOINS: &str = "\
    LEFT JOIN timeline_view v ON v.owner_id = s.owner_id AND v.status_id = s.status_id \
    LEFT JOIN timeline_account a ON a.owner_id = s.owner_id AND a.server_id = s.author_id \
    LEFT JOIN timeline_account b ON b.owner_id = s.owner_id AND b.server_id = s.booster_id";

// =============================================================================
// Row Mapping
// =============================================================================

/// Read an account out of seven consecutive nullable columns; `None` when
/// the join found nothing.
fn account_at(row: &rusqlite::Row<'_>, base: usize) -> SqliteResult<Option<Account>> {
    let server_id: Option<String> = row.get(base)?;
    let Some(server_id) = server_id else {
        return Ok(None);
    };
    Ok(Some(Account {
        id: AccountId::from(server_id),
        username: row.get(base + 1)?,
        acct: row.get(base + 2)?,
        display_name: row.get(base + 3)?,
        url: row.get(base + 4)?,
        avatar: row.get(base + 5)?,
        note: String::new(),
        locked: false,
        bot: row.get(base + 6)?,
    }))
}

/// Rebuild a timeline entry from one joined row. `prefs` supplies view-state
/// defaults for rows no one has touched yet.
fn row_to_entry(row: &rusqlite::Row<'_>, prefs: &TimelinePrefs) -> SqliteResult<TimelineEntry> {
    let status_id = StatusId::from(row.get::<_, String>(0)?);
    let kind: String = row.get(1)?;
    if kind == "gap" {
        return Ok(TimelineEntry::gap(status_id));
    }

    let sensitive: bool = row.get(8)?;
    let created_at = chrono::DateTime::from_timestamp_millis(row.get::<_, i64>(9)?)
        .unwrap_or(chrono::DateTime::UNIX_EPOCH);
    let edited_at = row
        .get::<_, Option<i64>>(10)?
        .and_then(chrono::DateTime::from_timestamp_millis);
    let boosted_at = row
        .get::<_, Option<i64>>(11)?
        .and_then(chrono::DateTime::from_timestamp_millis);

    let mut content = Status {
        id: row
            .get::<_, Option<String>>(2)?
            .map(StatusId::from)
            .unwrap_or_else(|| status_id.clone()),
        account: account_at(row, 29)?.unwrap_or_default(),
        created_at,
        edited_at,
        content: row.get(5)?,
        spoiler_text: row.get(6)?,
        visibility: row
            .get::<_, String>(7)?
            .parse::<Visibility>()
            .unwrap_or_default(),
        sensitive,
        url: row.get(20)?,
        in_reply_to_id: row.get::<_, Option<String>>(3)?.map(StatusId::from),
        in_reply_to_account_id: row.get::<_, Option<String>>(4)?.map(AccountId::from),
        reblog: None,
        reblogs_count: row.get(12)?,
        favourites_count: row.get(13)?,
        reblogged: row.get(14)?,
        favourited: row.get(15)?,
        bookmarked: row.get(16)?,
        muted: row.get(17)?,
        pinned: row.get(18)?,
        media_attachments: json_column(row.get(21)?),
        mentions: json_column(row.get(22)?),
        tags: json_column(row.get(23)?),
        poll: row
            .get::<_, Option<String>>(24)?
            .and_then(|s| serde_json::from_str(&s).ok()),
        language: row.get(19)?,
    };

    let status = match account_at(row, 36)? {
        Some(booster) => {
            // Boost wrapper: the row id belongs to it, the content to the
            // boosted status.
            Status {
                id: status_id,
                account: booster,
                created_at: boosted_at.unwrap_or(created_at),
                visibility: content.visibility,
                reblog: Some(Box::new(content)),
                ..Status::default()
            }
        }
        None => {
            content.id = status_id;
            content
        }
    };

    let view = PostView {
        expanded: row
            .get::<_, Option<bool>>(25)?
            .unwrap_or(prefs.always_open_spoiler),
        content_showing: row
            .get::<_, Option<bool>>(26)?
            .unwrap_or(prefs.always_show_sensitive || !sensitive),
        content_collapsed: row.get::<_, Option<bool>>(27)?.unwrap_or(true),
        warned: row.get::<_, Option<bool>>(28)?.unwrap_or(false),
        status,
    };
    Ok(TimelineEntry::post(view))
}

fn json_column<T: serde::de::DeserializeOwned + Default>(raw: Option<String>) -> T {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

fn json_value<T: serde::Serialize>(value: &[T]) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(serde_json::to_string(value).unwrap_or_default())
    }
}

impl TimelineDb {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> SqliteResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// In-memory database, for tests.
    pub fn in_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// One page of entries, numerically descending, strictly below `max_id`
    /// when given.
    pub fn page(
        &self,
        owner_id: i64,
        prefs: &TimelinePrefs,
        max_id: Option<&StatusId>,
        limit: u32,
    ) -> SqliteResult<Vec<TimelineEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM timeline_status s {ENTRY_JOINS} \
             WHERE s.owner_id = ?1 \
               AND (?2 IS NULL OR (LENGTH(s.status_id), s.status_id) < (LENGTH(?2), ?2)) \
             ORDER BY LENGTH(s.status_id) DESC, s.status_id DESC \
             LIMIT ?3"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![owner_id, max_id.map(|id| id.as_str()), limit],
            |row| row_to_entry(row, prefs),
        )?;
        rows.collect()
    }

    pub fn len(&self, owner_id: i64) -> SqliteResult<usize> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM timeline_status WHERE owner_id = ?1",
            params![owner_id],
            |row| row.get::<_, i64>(0).map(|n| n as usize),
        )
    }

    pub fn is_empty(&self, owner_id: i64) -> SqliteResult<bool> {
        self.len(owner_id).map(|n| n == 0)
    }

    // =========================================================================
    // Writing Entries
    // =========================================================================

    /// Replace every row in `[oldest, newest]` with `entries`, atomically.
    /// This is the shape refreshes and gap fills take: delete the fetched
    /// range, reinsert what the server returned. View state is untouched.
    pub fn replace_range(
        &self,
        owner_id: i64,
        newest: &StatusId,
        oldest: &StatusId,
        entries: &[TimelineEntry],
    ) -> SqliteResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM timeline_status \
             WHERE owner_id = ?1 \
               AND (LENGTH(status_id), status_id) >= (LENGTH(?2), ?2) \
               AND (LENGTH(status_id), status_id) <= (LENGTH(?3), ?3)",
            params![owner_id, oldest.as_str(), newest.as_str()],
        )?;
        for entry in entries {
            Self::insert_entry(&tx, owner_id, entry)?;
        }
        tx.commit()
    }

    /// Insert or replace rows without touching neighbors. Used for appends.
    pub fn upsert(&self, owner_id: i64, entries: &[TimelineEntry]) -> SqliteResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for entry in entries {
            Self::insert_entry(&tx, owner_id, entry)?;
        }
        tx.commit()
    }

    fn insert_entry(
        tx: &rusqlite::Transaction<'_>,
        owner_id: i64,
        entry: &TimelineEntry,
    ) -> SqliteResult<()> {
        match entry {
            TimelineEntry::Gap { id, .. } => {
                tx.execute(
                    "INSERT OR REPLACE INTO timeline_status (owner_id, status_id, kind) \
                     VALUES (?1, ?2, 'gap')",
                    params![owner_id, id.as_str()],
                )?;
            }
            TimelineEntry::Post(view) => {
                let status = &view.status;
                let content = status.actionable();
                Self::save_account(tx, owner_id, &content.account)?;
                let booster_id = if status.is_boost() {
                    Self::save_account(tx, owner_id, &status.account)?;
                    Some(status.account.id.as_str())
                } else {
                    None
                };
                tx.execute(
                    "INSERT OR REPLACE INTO timeline_status (\
                        owner_id, status_id, kind, author_id, booster_id, \
                        content_status_id, in_reply_to_id, in_reply_to_account_id, \
                        content, spoiler_text, visibility, sensitive, \
                        created_at, edited_at, boosted_at, reblogs_count, \
                        favourites_count, reblogged, favourited, bookmarked, \
                        muted, pinned, language, url, attachments, mentions, \
                        tags, poll\
                     ) VALUES (?1, ?2, 'post', ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, \
                               ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, \
                               ?23, ?24, ?25, ?26, ?27)",
                    params![
                        owner_id,
                        status.id.as_str(),
                        content.account.id.as_str(),
                        booster_id,
                        content.id.as_str(),
                        content.in_reply_to_id.as_ref().map(|id| id.as_str()),
                        content.in_reply_to_account_id.as_ref().map(|id| id.as_str()),
                        content.content,
                        content.spoiler_text,
                        content.visibility.to_string(),
                        content.sensitive as i32,
                        content.created_at.timestamp_millis(),
                        content.edited_at.map(|t| t.timestamp_millis()),
                        status
                            .is_boost()
                            .then(|| status.created_at.timestamp_millis()),
                        content.reblogs_count,
                        content.favourites_count,
                        content.reblogged as i32,
                        content.favourited as i32,
                        content.bookmarked as i32,
                        content.muted as i32,
                        content.pinned as i32,
                        content.language,
                        content.url,
                        json_value(&content.media_attachments),
                        json_value(&content.mentions),
                        json_value(&content.tags),
                        content
                            .poll
                            .as_ref()
                            .map(|p| serde_json::to_string(p).unwrap_or_default()),
                    ],
                )?;
            }
        }
        Ok(())
    }

    fn save_account(
        tx: &rusqlite::Transaction<'_>,
        owner_id: i64,
        account: &Account,
    ) -> SqliteResult<()> {
        tx.execute(
            "INSERT OR REPLACE INTO timeline_account \
                (owner_id, server_id, username, acct, display_name, url, avatar, bot) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                owner_id,
                account.id.as_str(),
                account.username,
                account.acct,
                account.display_name,
                account.url,
                account.avatar,
                account.bot as i32,
            ],
        )?;
        Ok(())
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Delete exactly one row by its row id. Gap markers go through here.
    pub fn remove(&self, owner_id: i64, status_id: &StatusId) -> SqliteResult<()> {
        self.conn.execute(
            "DELETE FROM timeline_status WHERE owner_id = ?1 AND status_id = ?2",
            params![owner_id, status_id.as_str()],
        )?;
        Ok(())
    }

    /// Delete a status and every boost of it.
    pub fn remove_status(&self, owner_id: i64, status_id: &StatusId) -> SqliteResult<()> {
        self.conn.execute(
            "DELETE FROM timeline_status \
             WHERE owner_id = ?1 AND (status_id = ?2 OR content_status_id = ?2)",
            params![owner_id, status_id.as_str()],
        )?;
        Ok(())
    }

    /// Delete everything authored or boosted by an account.
    pub fn remove_all_by_account(
        &self,
        owner_id: i64,
        account_id: &AccountId,
    ) -> SqliteResult<()> {
        self.conn.execute(
            "DELETE FROM timeline_status \
             WHERE owner_id = ?1 AND (author_id = ?2 OR booster_id = ?2)",
            params![owner_id, account_id.as_str()],
        )?;
        Ok(())
    }

    /// Delete rows whose top-level poster is the account: their own posts and
    /// their boosts, but not someone else's boost of their post. Unfollow
    /// semantics.
    pub fn remove_all_by_poster(
        &self,
        owner_id: i64,
        account_id: &AccountId,
    ) -> SqliteResult<()> {
        self.conn.execute(
            "DELETE FROM timeline_status \
             WHERE owner_id = ?1 \
               AND (booster_id = ?2 OR (booster_id IS NULL AND author_id = ?2))",
            params![owner_id, account_id.as_str()],
        )?;
        Ok(())
    }

    /// Delete everything authored or boosted from an instance. Matches on
    /// the `user@domain` form, so rows from the owner's own instance (whose
    /// accounts carry a bare `acct`) are never touched.
    pub fn remove_all_by_domain(&self, owner_id: i64, domain: &str) -> SqliteResult<()> {
        self.conn.execute(
            "DELETE FROM timeline_status WHERE owner_id = ?1 AND status_id IN (\
                SELECT s.status_id FROM timeline_status s \
                LEFT JOIN timeline_account a \
                    ON a.owner_id = s.owner_id AND a.server_id = s.author_id \
                LEFT JOIN timeline_account b \
                    ON b.owner_id = s.owner_id AND b.server_id = s.booster_id \
                WHERE s.owner_id = ?1 \
                  AND (a.acct LIKE '%@' || ?2 OR b.acct LIKE '%@' || ?2))",
            params![owner_id, domain],
        )?;
        Ok(())
    }

    // =========================================================================
    // Targeted Updates
    // =========================================================================

    pub fn set_favourited(
        &self,
        owner_id: i64,
        status_id: &StatusId,
        favourited: bool,
    ) -> SqliteResult<()> {
        self.set_content_flag(owner_id, status_id, "favourited", favourited)
    }

    pub fn set_reblogged(
        &self,
        owner_id: i64,
        status_id: &StatusId,
        reblogged: bool,
    ) -> SqliteResult<()> {
        self.set_content_flag(owner_id, status_id, "reblogged", reblogged)
    }

    pub fn set_bookmarked(
        &self,
        owner_id: i64,
        status_id: &StatusId,
        bookmarked: bool,
    ) -> SqliteResult<()> {
        self.set_content_flag(owner_id, status_id, "bookmarked", bookmarked)
    }

    pub fn set_muted(&self, owner_id: i64, status_id: &StatusId, muted: bool) -> SqliteResult<()> {
        self.set_content_flag(owner_id, status_id, "muted", muted)
    }

    pub fn set_pinned(
        &self,
        owner_id: i64,
        status_id: &StatusId,
        pinned: bool,
    ) -> SqliteResult<()> {
        self.set_content_flag(owner_id, status_id, "pinned", pinned)
    }

    /// Flag columns describe the boosted status on boost rows, so targeted
    /// updates key on `content_status_id` and reach boosts for free.
    fn set_content_flag(
        &self,
        owner_id: i64,
        status_id: &StatusId,
        column: &'static str,
        value: bool,
    ) -> SqliteResult<()> {
        let sql = format!(
            "UPDATE timeline_status SET {column} = ?3 \
             WHERE owner_id = ?1 AND content_status_id = ?2"
        );
        self.conn
            .execute(&sql, params![owner_id, status_id.as_str(), value as i32])?;
        Ok(())
    }

    pub fn set_poll(&self, owner_id: i64, status_id: &StatusId, poll: &Poll) -> SqliteResult<()> {
        self.conn.execute(
            "UPDATE timeline_status SET poll = ?3 \
             WHERE owner_id = ?1 AND content_status_id = ?2",
            params![
                owner_id,
                status_id.as_str(),
                serde_json::to_string(poll).unwrap_or_default()
            ],
        )?;
        Ok(())
    }

    /// Fold an edited status into every row carrying it, boost rows
    /// included. Action flags are left alone; they travel by their own
    /// events.
    pub fn replace_status(&self, owner_id: i64, status: &Status) -> SqliteResult<()> {
        let content = status.actionable();
        self.conn.execute(
            "UPDATE timeline_status SET \
                content = ?3, spoiler_text = ?4, sensitive = ?5, edited_at = ?6, \
                reblogs_count = ?7, favourites_count = ?8, \
                attachments = ?9, mentions = ?10, tags = ?11, poll = ?12, \
                language = ?13, url = ?14 \
             WHERE owner_id = ?1 AND content_status_id = ?2",
            params![
                owner_id,
                content.id.as_str(),
                content.content,
                content.spoiler_text,
                content.sensitive as i32,
                content.edited_at.map(|t| t.timestamp_millis()),
                content.reblogs_count,
                content.favourites_count,
                json_value(&content.media_attachments),
                json_value(&content.mentions),
                json_value(&content.tags),
                content
                    .poll
                    .as_ref()
                    .map(|p| serde_json::to_string(p).unwrap_or_default()),
                content.language,
                content.url,
            ],
        )?;
        Ok(())
    }

    /// Persist one row's view state wholesale.
    pub fn save_view(
        &self,
        owner_id: i64,
        status_id: &StatusId,
        view: &PostView,
    ) -> SqliteResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO timeline_view \
                (owner_id, status_id, expanded, content_showing, content_collapsed, warned) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                owner_id,
                status_id.as_str(),
                view.expanded as i32,
                view.content_showing as i32,
                view.content_collapsed as i32,
                view.warned as i32,
            ],
        )?;
        Ok(())
    }

    // =========================================================================
    // Cleanup
    // =========================================================================

    /// Keep only the newest `keep` rows, then drop view state and accounts
    /// nothing references anymore.
    pub fn cleanup(&self, owner_id: i64, keep: u32) -> SqliteResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM timeline_status WHERE owner_id = ?1 AND status_id NOT IN (\
                SELECT status_id FROM timeline_status WHERE owner_id = ?1 \
                ORDER BY LENGTH(status_id) DESC, status_id DESC LIMIT ?2)",
            params![owner_id, keep],
        )?;
        tx.execute(
            "DELETE FROM timeline_view WHERE owner_id = ?1 AND status_id NOT IN (\
                SELECT status_id FROM timeline_status WHERE owner_id = ?1)",
            params![owner_id],
        )?;
        tx.execute(
            "DELETE FROM timeline_account WHERE owner_id = ?1 AND server_id NOT IN (\
                SELECT author_id FROM timeline_status \
                    WHERE owner_id = ?1 AND author_id IS NOT NULL \
                UNION \
                SELECT booster_id FROM timeline_status \
                    WHERE owner_id = ?1 AND booster_id IS NOT NULL)",
            params![owner_id],
        )?;
        tx.commit()
    }
}

// ============================================================================
// Tests
// ============================================================================
