//! The timeline synchronizer: one feed's entry list, reconciled against the
//! server and (for the home feed) the local cache.
//!
//! A [`Timeline`] owns its list outright. Loads mutate it top-down
//! ([`refresh`](Timeline::refresh)), bottom-up
//! ([`load_below`](Timeline::load_below)) or in the middle
//! ([`load_gap`](Timeline::load_gap)); app events arrive through
//! [`apply_event`](Timeline::apply_event). Every mutation leaves the list
//! strictly descending by id, gap-normalized, and published through a watch
//! channel as a [`TimelineSnapshot`].
//!
//! Merging leans on one observation: a response fetched `since_id` the
//! second-newest held post either contains the newest held id (the feed is
//! contiguous, splice the strictly-newer prefix) or it does not (something
//! may be missing in between, record a gap marker). Gap markers are filled
//! with a fetch bounded by their concrete neighbor posts.
//!
//! Remote failures worth retrying (network down, server error) never escape
//! as `Err`; they are folded into [`TimelineSnapshot::failure`] and the list
//! stays usable. `Err` means corruption: an undecodable response or a broken
//! cache.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, warn};

use tootline_api::{ApiError, PageQuery, TimelinePage, TimelineSource};
use tootline_types::{Account, AccountId, FilterAction, Status, StatusId, TimelineKind};

use crate::constants::{DEFAULT_PAGE_SIZE, INITIAL_CACHE_PAGE, MAX_CACHED_ROWS};
use crate::context::AccountContext;
use crate::entry::{self, PostView, TimelineEntry};
use crate::events::Event;
use crate::filter::FilterEngine;
use crate::timeline_db::TimelineDb;

// ── Errors and snapshot types ───────────────────────────────────────────────

/// An error the synchronizer cannot absorb into its snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("timeline cache error: {0}")]
    Cache(#[from] rusqlite::Error),
    #[error("unusable server response: {0}")]
    Protocol(#[source] ApiError),
}

/// Why the last remote call failed, for the view to render.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureKind {
    /// The server could not be reached.
    Network,
    /// The server answered with an error status.
    Other,
}

/// Where the synchronizer is in its load lifecycle. One phase at a time;
/// load triggers arriving mid-phase are no-ops.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LoadPhase {
    #[default]
    Idle,
    LoadingInitial,
    Refreshing,
    LoadingBelow,
    LoadingGap,
}

/// What a view renders. Published on every observable change.
#[derive(Clone, Debug, Default)]
pub struct TimelineSnapshot {
    pub entries: Vec<TimelineEntry>,
    pub phase: LoadPhase,
    pub failure: Option<FailureKind>,
    pub end_reached: bool,
}

// ── The synchronizer ────────────────────────────────────────────────────────

/// One feed's state machine. Single-writer: all mutation goes through
/// `&mut self`, so there is no lock to take and no lock to poison.
pub struct Timeline<S> {
    kind: TimelineKind,
    ctx: AccountContext,
    source: Arc<S>,
    db: Option<TimelineDb>,
    filter: FilterEngine,
    entries: Vec<TimelineEntry>,
    /// The server's own "next older page" anchor, from the `Link` header.
    next_max_id: Option<StatusId>,
    phase: LoadPhase,
    failure: Option<FailureKind>,
    end_reached: bool,
    empty_bottom_loads: u8,
    snapshot_tx: watch::Sender<TimelineSnapshot>,
}

impl<S: TimelineSource> Timeline<S> {
    /// Build a synchronizer. Receivers for its snapshots come from
    /// [`snapshots`](Self::snapshots).
    ///
    /// `db` is honored only for kinds that cache; for everything else the
    /// timeline runs purely in memory no matter what is passed.
    pub fn new(
        kind: TimelineKind,
        ctx: AccountContext,
        source: Arc<S>,
        db: Option<TimelineDb>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(TimelineSnapshot::default());
        let db = if kind.is_cacheable() { db } else { None };
        Self {
            kind,
            ctx,
            source,
            db,
            filter: FilterEngine::pass_all(),
            entries: Vec::new(),
            next_max_id: None,
            phase: LoadPhase::Idle,
            failure: None,
            end_reached: false,
            empty_bottom_loads: 0,
            snapshot_tx,
        }
    }

    pub fn kind(&self) -> &TimelineKind {
        &self.kind
    }

    /// A new receiver over this timeline's snapshots. Starts at the current
    /// state; every observable change follows.
    pub fn snapshots(&self) -> watch::Receiver<TimelineSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    pub fn failure(&self) -> Option<FailureKind> {
        self.failure
    }

    pub fn end_reached(&self) -> bool {
        self.end_reached
    }

    fn publish(&self) {
        debug_assert!(entry::is_strictly_descending(&self.entries));
        self.snapshot_tx.send_replace(TimelineSnapshot {
            entries: self.entries.clone(),
            phase: self.phase,
            failure: self.failure,
            end_reached: self.end_reached,
        });
    }

    // ── Loading ─────────────────────────────────────────────────────────

    /// First load. The cached home feed shows what the cache has
    /// immediately, then reconciles against the server anchored at the
    /// newest cached id; everything else starts with a plain bottom load.
    pub async fn load_initial(&mut self) -> Result<(), SyncError> {
        if self.phase != LoadPhase::Idle {
            return Ok(());
        }
        self.phase = LoadPhase::LoadingInitial;
        self.failure = None;
        let result = self.initial_sync().await;
        self.phase = LoadPhase::Idle;
        self.publish();
        result
    }

    async fn initial_sync(&mut self) -> Result<(), SyncError> {
        if let Some(db) = &self.db {
            let cached =
                db.page(self.ctx.account_id, &self.ctx.prefs, None, INITIAL_CACHE_PAGE)?;
            if !cached.is_empty() {
                debug!(timeline = %self.kind, rows = cached.len(), "showing cached entries");
                self.entries = cached;
                entry::normalize(&mut self.entries);
            }
        }
        self.publish();

        self.reload_filters().await?;

        if self.entries.is_empty() {
            self.fetch_bottom().await?;
        } else {
            // The rule set may have moved since these rows were cached.
            self.reclassify()?;
            match self.entries.first().map(|e| e.id().clone()) {
                Some(anchor) => {
                    self.merge_top(anchor).await?;
                    // With cached content on screen a failed reconcile is
                    // not worth alarming over; the next refresh retries.
                    self.failure = None;
                }
                None => self.fetch_bottom().await?,
            }
        }

        if let Some(db) = &self.db {
            db.cleanup(self.ctx.account_id, MAX_CACHED_ROWS)?;
        }
        Ok(())
    }

    /// Pull the newest posts and splice them onto the top. Also the
    /// "scrolled to the top" load; the two triggers share one path.
    pub async fn refresh(&mut self) -> Result<(), SyncError> {
        if self.phase != LoadPhase::Idle {
            return Ok(());
        }
        self.phase = LoadPhase::Refreshing;
        self.failure = None;
        self.next_max_id = None;
        self.end_reached = false;
        self.empty_bottom_loads = 0;
        self.publish();

        let result = match self.above_anchor() {
            Some(anchor) => self.merge_top(anchor).await,
            None => self.fetch_bottom().await,
        };

        self.phase = LoadPhase::Idle;
        self.publish();
        result
    }

    /// Extend the feed downward from the current tail.
    pub async fn load_below(&mut self) -> Result<(), SyncError> {
        if self.phase != LoadPhase::Idle || self.end_reached {
            return Ok(());
        }
        self.phase = LoadPhase::LoadingBelow;
        self.failure = None;
        self.set_tail_loading(true);
        self.publish();

        let result = self.fetch_bottom().await;

        self.phase = LoadPhase::Idle;
        self.publish();
        result
    }

    /// Fill the hole a gap marker stands for.
    ///
    /// The gap is located by id, never by a position remembered across an
    /// await. The fetch is bounded by the gap's concrete neighbors, so the
    /// response lands strictly inside the hole.
    pub async fn load_gap(&mut self, gap_id: &StatusId) -> Result<(), SyncError> {
        if self.phase != LoadPhase::Idle {
            return Ok(());
        }
        let Some(pos) = self.gap_position(gap_id) else {
            debug!(timeline = %self.kind, gap = %gap_id, "gap no longer present");
            return Ok(());
        };
        let newer = self.entries[..pos]
            .iter()
            .rev()
            .find_map(|e| e.as_post().map(|p| p.status.id.clone()));
        let older = self.entries[pos + 1..]
            .iter()
            .find_map(|e| e.as_post().map(|p| p.status.id.clone()));
        let Some(newer) = newer else {
            // Normalization never leaves a gap without a post above it.
            return Ok(());
        };

        self.phase = LoadPhase::LoadingGap;
        self.failure = None;
        if let Some(TimelineEntry::Gap { loading, .. }) = self.entries.get_mut(pos) {
            *loading = true;
        }
        self.publish();

        let result = self.fill_gap(gap_id, newer, older).await;

        self.phase = LoadPhase::Idle;
        self.publish();
        result
    }

    // ── Merge mechanics ─────────────────────────────────────────────────

    /// The refresh anchor: the id of the second-newest held post, so that a
    /// contiguous response includes the newest one and overlap is
    /// detectable. Falls back to the newest when it is all we hold; `None`
    /// on an effectively empty list.
    fn above_anchor(&self) -> Option<StatusId> {
        let mut posts = self.entries.iter().filter_map(|e| e.as_post());
        let newest = posts.next()?;
        Some(match posts.next() {
            Some(second) => second.status.id.clone(),
            None => newest.status.id.clone(),
        })
    }

    /// Fetch above `anchor` and splice the result onto the top of the list.
    async fn merge_top(&mut self, anchor: StatusId) -> Result<(), SyncError> {
        let query = PageQuery::above(anchor, DEFAULT_PAGE_SIZE);
        let Some(page) = self.fetch(query).await? else {
            return Ok(());
        };
        if page.statuses.is_empty() {
            debug!(timeline = %self.kind, "nothing newer");
            return Ok(());
        }

        let full = page.is_full(DEFAULT_PAGE_SIZE);
        let head_id = self.entries.first().map(|e| e.id().clone());
        let overlap = head_id
            .as_ref()
            .is_some_and(|head| page.statuses.iter().any(|s| &s.id == head));

        // Contiguous response: only what lies strictly above the head is new.
        let fresh: Vec<Status> = match &head_id {
            Some(head) if overlap => page
                .statuses
                .into_iter()
                .filter(|s| &s.id > head)
                .collect(),
            _ => page.statuses,
        };
        if fresh.is_empty() {
            return Ok(());
        }
        let span_newest = fresh[0].id.clone();
        let span_oldest = fresh[fresh.len() - 1].id.clone();

        let mut merged = self.accept_page(fresh);
        let inserted = merged.len();

        // Held entries inside the refetched span are superseded: the server
        // was just asked about that range and did not return them again, so
        // they are gone upstream.
        let old: Vec<TimelineEntry> = std::mem::take(&mut self.entries)
            .into_iter()
            .filter(|e| e.id() < &span_oldest)
            .collect();

        // A full page that never reached the old head may have skipped
        // posts; a marker records where to dig. Skip it when the page ends
        // exactly one id above the head, i.e. nothing fits in between.
        if !overlap && full {
            if let Some(old_head) = old.first() {
                let gap_id = span_oldest.decrement();
                if &gap_id > old_head.id() {
                    merged.push(TimelineEntry::gap(gap_id));
                }
            }
        }

        debug!(
            timeline = %self.kind,
            inserted,
            overlap,
            gapped = merged.last().is_some_and(|e| e.is_gap()),
            "merged top page"
        );

        if let Some(db) = &self.db {
            db.replace_range(self.ctx.account_id, &span_newest, &span_oldest, &merged)?;
        }

        merged.extend(old);
        entry::normalize(&mut merged);
        self.entries = merged;
        Ok(())
    }

    /// The bottom-load body, shared by `load_below` and the empty-list
    /// starts: fetch below the tail, append, track the end of the feed.
    async fn fetch_bottom(&mut self) -> Result<(), SyncError> {
        let anchor = self.next_max_id.clone().or_else(|| {
            self.entries
                .iter()
                .rev()
                .find_map(|e| e.as_post().map(|p| p.status.id.clone()))
        });
        let query = match anchor {
            Some(max_id) => PageQuery::below(max_id, DEFAULT_PAGE_SIZE),
            None => PageQuery::newest(DEFAULT_PAGE_SIZE),
        };

        let Some(page) = self.fetch(query).await? else {
            self.set_tail_loading(false);
            return Ok(());
        };

        let full = page.is_full(DEFAULT_PAGE_SIZE);
        self.next_max_id = page.older_anchor();

        // The loader marker has served; a fresh one follows if there is more.
        if self.entries.last().is_some_and(|e| e.is_gap()) {
            if let Some(gone) = self.entries.pop() {
                if let Some(db) = &self.db {
                    db.remove(self.ctx.account_id, gone.id())?;
                }
            }
        }

        let mut statuses = page.statuses;
        if let Some(floor) = self.entries.last().map(|e| e.id().clone()) {
            // A well-behaved server only sends strictly older posts; hold it
            // to that.
            statuses.retain(|s| s.id < floor);
        }
        let span = (!statuses.is_empty())
            .then(|| (statuses[0].id.clone(), statuses[statuses.len() - 1].id.clone()));

        let accepted = self.accept_page(statuses);
        let grew = !accepted.is_empty();

        if grew {
            self.empty_bottom_loads = 0;
        } else {
            self.empty_bottom_loads += 1;
            if self.empty_bottom_loads >= 2 {
                debug!(timeline = %self.kind, "end of feed");
                self.end_reached = true;
            }
        }

        let mut appended = accepted;
        if full && !self.end_reached {
            if let Some((_, span_oldest)) = &span {
                appended.push(TimelineEntry::gap(span_oldest.decrement()));
            }
        }

        if let Some(db) = &self.db {
            if let Some((span_newest, span_oldest)) = &span {
                db.replace_range(self.ctx.account_id, span_newest, span_oldest, &appended)?;
                db.cleanup(self.ctx.account_id, MAX_CACHED_ROWS)?;
            }
        }

        self.entries.extend(appended);
        entry::normalize(&mut self.entries);
        Ok(())
    }

    async fn fill_gap(
        &mut self,
        gap_id: &StatusId,
        newer: StatusId,
        older: Option<StatusId>,
    ) -> Result<(), SyncError> {
        let query = match older.clone() {
            Some(since_id) => PageQuery::between(newer.clone(), since_id, DEFAULT_PAGE_SIZE),
            None => PageQuery::below(newer.clone(), DEFAULT_PAGE_SIZE),
        };
        let Some(page) = self.fetch(query).await? else {
            // Expected failure: the gap goes back to rest, nothing else moves.
            if let Some(pos) = self.gap_position(gap_id) {
                if let Some(TimelineEntry::Gap { loading, .. }) = self.entries.get_mut(pos) {
                    *loading = false;
                }
            }
            return Ok(());
        };
        let Some(pos) = self.gap_position(gap_id) else {
            return Ok(());
        };

        let full = page.is_full(DEFAULT_PAGE_SIZE);
        let mut statuses = page.statuses;
        // Everything kept must lie strictly inside the hole's anchors, or it
        // would duplicate an entry already held on either side.
        statuses.retain(|s| s.id < newer && older.as_ref().is_none_or(|o| &s.id > o));
        let span = (!statuses.is_empty())
            .then(|| (statuses[0].id.clone(), statuses[statuses.len() - 1].id.clone()));

        let accepted = self.accept_page(statuses);
        let follow_up = if full {
            span.as_ref().and_then(|(_, span_oldest)| {
                let id = span_oldest.decrement();
                (older.as_ref().is_none_or(|o| &id > o)).then(|| TimelineEntry::gap(id))
            })
        } else {
            None
        };

        debug!(
            timeline = %self.kind,
            gap = %gap_id,
            inserted = accepted.len(),
            closed = follow_up.is_none(),
            "filled gap"
        );

        let replacement: Vec<TimelineEntry> = accepted.into_iter().chain(follow_up).collect();
        if let Some(db) = &self.db {
            db.remove(self.ctx.account_id, gap_id)?;
            if let Some((span_newest, span_oldest)) = &span {
                db.replace_range(self.ctx.account_id, span_newest, span_oldest, &replacement)?;
            }
        }
        self.entries.splice(pos..=pos, replacement);
        entry::normalize(&mut self.entries);
        Ok(())
    }

    fn gap_position(&self, gap_id: &StatusId) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.is_gap() && e.id() == gap_id)
    }

    /// Put the tail gap in or out of its loading state, adding the marker
    /// below the bottom post when there is none.
    fn set_tail_loading(&mut self, loading: bool) {
        match self.entries.last_mut() {
            Some(TimelineEntry::Gap { loading: flag, .. }) => *flag = loading,
            Some(TimelineEntry::Post(view)) if loading => {
                let id = view.status.id.decrement();
                self.entries.push(TimelineEntry::Gap { id, loading: true });
            }
            _ => {}
        }
    }

    /// One remote page. Expected failures are folded into the failure flag
    /// and come back as `None`; a response that will not decode is an error.
    async fn fetch(&mut self, query: PageQuery) -> Result<Option<TimelinePage>, SyncError> {
        match self.source.fetch_timeline(&self.kind, query).await {
            Ok(page) => Ok(Some(page)),
            Err(ApiError::Network(err)) => {
                debug!(timeline = %self.kind, error = %err, "fetch failed: network");
                self.failure = Some(FailureKind::Network);
                Ok(None)
            }
            Err(ApiError::Http { status }) => {
                debug!(timeline = %self.kind, status, "fetch failed: server");
                self.failure = Some(FailureKind::Other);
                Ok(None)
            }
            Err(err) => Err(SyncError::Protocol(err)),
        }
    }

    // ── Filtering ───────────────────────────────────────────────────────

    /// Fetch the server-side filter rules and compile them for this feed.
    /// An unreachable filter endpoint degrades to letting everything
    /// through; rules land on the next successful reload.
    async fn reload_filters(&mut self) -> Result<(), SyncError> {
        let engine = match self.source.fetch_filters().await {
            Ok(rules) => FilterEngine::new(&rules, self.kind.filter_contexts(), Utc::now()),
            Err(err) if err.is_expected() => {
                warn!(timeline = %self.kind, error = %err, "filter fetch failed, filtering disabled until retried");
                FilterEngine::pass_all()
            }
            Err(err) => return Err(SyncError::Protocol(err)),
        };
        self.filter = self.apply_gates(engine);
        Ok(())
    }

    fn apply_gates(&self, engine: FilterEngine) -> FilterEngine {
        if matches!(self.kind, TimelineKind::Home) {
            engine.with_gates(
                self.ctx.prefs.filter_home_replies,
                self.ctx.prefs.filter_home_boosts,
            )
        } else {
            engine
        }
    }

    /// Run a fetched status through the filter and build its entry. `None`
    /// means hidden: dropped before it ever reaches the list or the cache.
    fn build_entry(&self, status: Status) -> Option<TimelineEntry> {
        match self.filter.classify(&status) {
            FilterAction::Hide => None,
            verdict => {
                let mut view = PostView::fresh(status, &self.ctx.prefs);
                view.warned = verdict == FilterAction::Warn;
                Some(TimelineEntry::post(view))
            }
        }
    }

    fn accept_page(&self, statuses: Vec<Status>) -> Vec<TimelineEntry> {
        statuses
            .into_iter()
            .filter_map(|s| self.build_entry(s))
            .collect()
    }

    /// Re-run every held post through the filter: update warn markers, drop
    /// what is now hidden.
    fn reclassify(&mut self) -> Result<bool, SyncError> {
        let mut changed = false;
        let mut keep = Vec::with_capacity(self.entries.len());
        for entry in std::mem::take(&mut self.entries) {
            match entry {
                TimelineEntry::Post(mut view) => match self.filter.classify(&view.status) {
                    FilterAction::Hide => {
                        changed = true;
                        if let Some(db) = &self.db {
                            db.remove(self.ctx.account_id, &view.status.id)?;
                        }
                    }
                    verdict => {
                        let warned = verdict == FilterAction::Warn;
                        if view.warned != warned {
                            view.warned = warned;
                            changed = true;
                            if let Some(db) = &self.db {
                                db.save_view(self.ctx.account_id, &view.status.id, &view)?;
                            }
                        }
                        keep.push(TimelineEntry::Post(view));
                    }
                },
                gap => keep.push(gap),
            }
        }
        self.entries = keep;
        if changed {
            entry::normalize(&mut self.entries);
        }
        Ok(changed)
    }

    // ── View state ──────────────────────────────────────────────────────

    /// Open or close one entry's content warning.
    pub fn set_expanded(&mut self, status_id: &StatusId, expanded: bool) -> Result<(), SyncError> {
        self.set_view(status_id, |view| view.expanded = expanded)
    }

    /// Reveal or re-hide one entry's sensitive media.
    pub fn set_content_showing(
        &mut self,
        status_id: &StatusId,
        showing: bool,
    ) -> Result<(), SyncError> {
        self.set_view(status_id, |view| view.content_showing = showing)
    }

    /// Collapse or uncollapse one entry's overlong content.
    pub fn set_content_collapsed(
        &mut self,
        status_id: &StatusId,
        collapsed: bool,
    ) -> Result<(), SyncError> {
        self.set_view(status_id, |view| view.content_collapsed = collapsed)
    }

    /// Dismiss a matched-filter warning for one entry.
    pub fn clear_warning(&mut self, status_id: &StatusId) -> Result<(), SyncError> {
        self.set_view(status_id, |view| view.warned = false)
    }

    /// Addressed by row id: for a boost that is the wrapper's id, so the
    /// same status boosted twice keeps per-row view state.
    fn set_view(
        &mut self,
        status_id: &StatusId,
        mutate: impl FnOnce(&mut PostView),
    ) -> Result<(), SyncError> {
        let Some(view) = self
            .entries
            .iter_mut()
            .find_map(|e| e.as_post_mut().filter(|v| &v.status.id == status_id))
        else {
            return Ok(());
        };
        mutate(view);
        if let Some(db) = &self.db {
            db.save_view(self.ctx.account_id, status_id, view)?;
        }
        self.publish();
        Ok(())
    }

    // ── Events ──────────────────────────────────────────────────────────

    /// Apply one app event to the list and its cache mirror.
    ///
    /// Cache updates run even when nothing in memory matched: the cache
    /// holds rows beyond the in-memory window.
    pub async fn apply_event(&mut self, event: Event) -> Result<(), SyncError> {
        let changed = match event {
            Event::Favourited {
                status_id,
                favourited,
            } => {
                if let Some(db) = &self.db {
                    db.set_favourited(self.ctx.account_id, &status_id, favourited)?;
                }
                self.update_actionable(&status_id, |s| s.favourited = favourited)
            }
            Event::Reblogged {
                status_id,
                reblogged,
            } => {
                if let Some(db) = &self.db {
                    db.set_reblogged(self.ctx.account_id, &status_id, reblogged)?;
                }
                self.update_actionable(&status_id, |s| s.reblogged = reblogged)
            }
            Event::Bookmarked {
                status_id,
                bookmarked,
            } => {
                if let Some(db) = &self.db {
                    db.set_bookmarked(self.ctx.account_id, &status_id, bookmarked)?;
                }
                self.update_actionable(&status_id, |s| s.bookmarked = bookmarked)
            }
            Event::Pinned { status_id, pinned } => {
                if let Some(db) = &self.db {
                    db.set_pinned(self.ctx.account_id, &status_id, pinned)?;
                }
                self.update_actionable(&status_id, |s| s.pinned = pinned)
            }
            Event::ConversationMuted { status_id, muted } => {
                if let Some(db) = &self.db {
                    db.set_muted(self.ctx.account_id, &status_id, muted)?;
                }
                self.update_actionable(&status_id, |s| s.muted = muted)
            }
            Event::PollVoted { status_id, poll } => {
                if let Some(db) = &self.db {
                    db.set_poll(self.ctx.account_id, &status_id, &poll)?;
                }
                self.update_actionable(&status_id, |s| s.poll = Some(poll.clone()))
            }
            Event::StatusEdited { status } => {
                if let Some(db) = &self.db {
                    db.replace_status(self.ctx.account_id, &status)?;
                }
                let content = status.actionable();
                let mut touched = false;
                for entry in &mut self.entries {
                    if let Some(view) = entry.as_post_mut() {
                        if view.status.actionable_id() == &content.id {
                            *view.status.actionable_mut() = content.clone();
                            touched = true;
                        }
                    }
                }
                touched
            }
            Event::StatusDeleted { status_id } => {
                if let Some(db) = &self.db {
                    db.remove_status(self.ctx.account_id, &status_id)?;
                }
                self.remove_posts(|v| {
                    v.status.id == status_id || v.status.actionable_id() == &status_id
                })
            }
            Event::StatusComposed { status } => {
                if self.kind.refreshes_on_compose(&status.account.id) {
                    return self.refresh().await;
                }
                false
            }
            Event::AccountMuted { account_id } | Event::AccountBlocked { account_id } => {
                if self.is_profile_of(&account_id) {
                    // Deliberately looking at this account's page; the feed
                    // stays.
                    false
                } else {
                    if let Some(db) = &self.db {
                        db.remove_all_by_account(self.ctx.account_id, &account_id)?;
                    }
                    self.remove_posts(|v| {
                        v.status.account.id == account_id
                            || v.status.actionable().account.id == account_id
                    })
                }
            }
            Event::AccountUnfollowed { account_id } => {
                // Their posts and their boosts leave the home feed; someone
                // else's boost of them stays.
                if matches!(self.kind, TimelineKind::Home) {
                    if let Some(db) = &self.db {
                        db.remove_all_by_poster(self.ctx.account_id, &account_id)?;
                    }
                    self.remove_posts(|v| v.status.account.id == account_id)
                } else {
                    false
                }
            }
            Event::DomainMuted { domain } => {
                if let Some(db) = &self.db {
                    db.remove_all_by_domain(self.ctx.account_id, &domain)?;
                }
                let from_domain = |account: &Account| {
                    account.acct.split_once('@').is_some_and(|(_, d)| d == domain)
                };
                self.remove_posts(|v| {
                    from_domain(&v.status.account) || from_domain(&v.status.actionable().account)
                })
            }
            Event::FiltersChanged => {
                self.reload_filters().await?;
                self.reclassify()?
            }
            Event::PreferencesChanged { prefs } => {
                let gates_moved = prefs.filter_home_replies != self.ctx.prefs.filter_home_replies
                    || prefs.filter_home_boosts != self.ctx.prefs.filter_home_boosts;
                self.ctx.prefs = prefs;
                if gates_moved && matches!(self.kind, TimelineKind::Home) {
                    self.filter = self.apply_gates(self.filter.clone());
                    self.reclassify()?;
                    return self.refresh().await;
                }
                false
            }
        };
        if changed {
            self.publish();
        }
        Ok(())
    }

    /// Mutate the actionable status of every entry carrying `status_id`:
    /// the plain row and any boost row wrapping it.
    fn update_actionable(&mut self, status_id: &StatusId, mutate: impl Fn(&mut Status)) -> bool {
        let mut touched = false;
        for entry in &mut self.entries {
            if let Some(view) = entry.as_post_mut() {
                if view.status.actionable_id() == status_id {
                    mutate(view.status.actionable_mut());
                    touched = true;
                }
            }
        }
        touched
    }

    fn remove_posts(&mut self, doomed: impl Fn(&PostView) -> bool) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| match e.as_post() {
            Some(view) => !doomed(view),
            None => true,
        });
        let changed = self.entries.len() != before;
        if changed {
            entry::normalize(&mut self.entries);
        }
        changed
    }

    fn is_profile_of(&self, account_id: &AccountId) -> bool {
        matches!(&self.kind, TimelineKind::User { id, .. } if id == account_id)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use tootline_types::{FilterRule, UserScope, Visibility};

    /// A source for tests that never get to the network.
    struct NullSource;

    #[async_trait]
    impl TimelineSource for NullSource {
        async fn fetch_timeline(
            &self,
            _kind: &TimelineKind,
            _query: PageQuery,
        ) -> Result<TimelinePage, ApiError> {
            Ok(TimelinePage::default())
        }

        async fn fetch_filters(&self) -> Result<Vec<FilterRule>, ApiError> {
            Ok(Vec::new())
        }
    }

    fn timeline(kind: TimelineKind) -> Timeline<NullSource> {
        Timeline::new(kind, AccountContext::new(1), Arc::new(NullSource), None)
    }

    fn status(id: &str) -> Status {
        Status {
            id: StatusId::from(id),
            created_at: Utc::now(),
            content: format!("<p>{id}</p>"),
            ..Status::default()
        }
    }

    fn post(id: &str) -> TimelineEntry {
        TimelineEntry::post(PostView::fresh(
            status(id),
            &crate::context::TimelinePrefs::default(),
        ))
    }

    fn ids(timeline: &Timeline<NullSource>) -> Vec<String> {
        timeline
            .entries()
            .iter()
            .map(|e| e.id().as_str().to_string())
            .collect()
    }

    // ── Anchors ─────────────────────────────────────────────────────────

    #[test]
    fn test_above_anchor_is_second_newest_post() {
        let mut tl = timeline(TimelineKind::Home);
        tl.entries = vec![post("30"), post("20"), post("10")];
        assert_eq!(tl.above_anchor(), Some(StatusId::from("20")));
    }

    #[test]
    fn test_above_anchor_skips_gap_under_head() {
        let mut tl = timeline(TimelineKind::Home);
        tl.entries = vec![post("30"), TimelineEntry::gap(StatusId::from("25")), post("20")];
        assert_eq!(tl.above_anchor(), Some(StatusId::from("20")));
    }

    #[test]
    fn test_above_anchor_single_post_falls_back_to_it() {
        let mut tl = timeline(TimelineKind::Home);
        tl.entries = vec![post("30")];
        assert_eq!(tl.above_anchor(), Some(StatusId::from("30")));
    }

    #[test]
    fn test_above_anchor_empty_list() {
        let tl = timeline(TimelineKind::Home);
        assert_eq!(tl.above_anchor(), None);
    }

    // ── Classification on entry ─────────────────────────────────────────

    fn warn_rule(phrase: &str) -> FilterRule {
        FilterRule {
            id: "1".to_string(),
            phrase: phrase.to_string(),
            context: vec![tootline_types::FilterContext::Home],
            whole_word: false,
            irreversible: false,
            expires_at: None,
        }
    }

    fn hide_rule(phrase: &str) -> FilterRule {
        FilterRule {
            irreversible: true,
            ..warn_rule(phrase)
        }
    }

    #[test]
    fn test_build_entry_drops_hidden_and_marks_warned() {
        let mut tl = timeline(TimelineKind::Home);
        tl.filter = FilterEngine::new(
            &[hide_rule("spoilers"), warn_rule("football")],
            &[tootline_types::FilterContext::Home],
            Utc::now(),
        );

        let mut hidden = status("3");
        hidden.content = "<p>spoilers ahead</p>".to_string();
        assert!(tl.build_entry(hidden).is_none());

        let mut warned = status("2");
        warned.content = "<p>football tonight</p>".to_string();
        let entry = tl.build_entry(warned).unwrap();
        assert!(entry.as_post().unwrap().warned);

        let clean = tl.build_entry(status("1")).unwrap();
        assert!(!clean.as_post().unwrap().warned);
    }

    #[test]
    fn test_reclassify_drops_and_remarks() {
        let mut tl = timeline(TimelineKind::Home);
        let mut doomed = status("3");
        doomed.content = "<p>spoilers ahead</p>".to_string();
        let mut tagged = status("2");
        tagged.content = "<p>football tonight</p>".to_string();
        tl.entries = vec![
            TimelineEntry::post(PostView::fresh(doomed, &tl.ctx.prefs)),
            TimelineEntry::post(PostView::fresh(tagged, &tl.ctx.prefs)),
            post("1"),
        ];

        tl.filter = FilterEngine::new(
            &[hide_rule("spoilers"), warn_rule("football")],
            &[tootline_types::FilterContext::Home],
            Utc::now(),
        );
        assert!(tl.reclassify().unwrap());

        assert_eq!(ids(&tl), vec!["2", "1"]);
        assert!(tl.entries[0].as_post().unwrap().warned);
        assert!(!tl.entries[1].as_post().unwrap().warned);
    }

    #[test]
    fn test_expired_rule_does_not_classify() {
        let mut tl = timeline(TimelineKind::Home);
        let mut rule = hide_rule("spoilers");
        rule.expires_at = Some(Utc::now() - Duration::hours(1));
        tl.filter = FilterEngine::new(
            &[rule],
            &[tootline_types::FilterContext::Home],
            Utc::now(),
        );

        let mut status = status("3");
        status.content = "<p>spoilers ahead</p>".to_string();
        assert!(tl.build_entry(status).is_some());
    }

    // ── View state ──────────────────────────────────────────────────────

    #[test]
    fn test_set_expanded_touches_exactly_one_entry() {
        let mut tl = timeline(TimelineKind::Home);
        tl.entries = vec![post("30"), post("20"), post("10")];
        tl.set_expanded(&StatusId::from("20"), true).unwrap();

        let expanded: Vec<bool> = tl
            .entries
            .iter()
            .map(|e| e.as_post().unwrap().expanded)
            .collect();
        assert_eq!(expanded, vec![false, true, false]);
    }

    #[test]
    fn test_clear_warning() {
        let mut tl = timeline(TimelineKind::Home);
        tl.entries = vec![post("30")];
        tl.entries[0].as_post_mut().unwrap().warned = true;
        tl.clear_warning(&StatusId::from("30")).unwrap();
        assert!(!tl.entries[0].as_post().unwrap().warned);
    }

    #[test]
    fn test_set_view_on_unknown_id_is_a_no_op() {
        let mut tl = timeline(TimelineKind::Home);
        tl.entries = vec![post("30")];
        tl.set_expanded(&StatusId::from("99"), true).unwrap();
        assert!(!tl.entries[0].as_post().unwrap().expanded);
    }

    // ── Event application ───────────────────────────────────────────────

    #[tokio::test]
    async fn test_favourite_event_reaches_plain_and_boost_rows() {
        let mut tl = timeline(TimelineKind::Home);
        let inner = status("10");
        let boost = Status {
            id: StatusId::from("40"),
            reblog: Some(Box::new(inner.clone())),
            ..Status::default()
        };
        tl.entries = vec![
            TimelineEntry::post(PostView::fresh(boost, &tl.ctx.prefs)),
            post("20"),
            TimelineEntry::post(PostView::fresh(inner, &tl.ctx.prefs)),
        ];

        tl.apply_event(Event::Favourited {
            status_id: StatusId::from("10"),
            favourited: true,
        })
        .await
        .unwrap();

        assert!(tl.entries[0].as_post().unwrap().status.actionable().favourited);
        assert!(!tl.entries[1].as_post().unwrap().status.favourited);
        assert!(tl.entries[2].as_post().unwrap().status.favourited);
    }

    #[tokio::test]
    async fn test_delete_event_takes_boosts_along_and_renormalizes() {
        let mut tl = timeline(TimelineKind::Home);
        let inner = status("10");
        let boost = Status {
            id: StatusId::from("40"),
            reblog: Some(Box::new(inner.clone())),
            ..Status::default()
        };
        tl.entries = vec![
            TimelineEntry::post(PostView::fresh(boost, &tl.ctx.prefs)),
            TimelineEntry::gap(StatusId::from("30")),
            TimelineEntry::post(PostView::fresh(inner, &tl.ctx.prefs)),
            post("5"),
        ];

        tl.apply_event(Event::StatusDeleted {
            status_id: StatusId::from("10"),
        })
        .await
        .unwrap();

        // Head gap left by the removal is normalized away.
        assert_eq!(ids(&tl), vec!["5"]);
    }

    #[tokio::test]
    async fn test_block_spares_own_profile_timeline() {
        let blocked = AccountId::from("7");
        let mut own_page = timeline(TimelineKind::User {
            id: blocked.clone(),
            scope: UserScope::Posts,
        });
        let mut authored = status("10");
        authored.account.id = blocked.clone();
        own_page.entries = vec![TimelineEntry::post(PostView::fresh(
            authored.clone(),
            &own_page.ctx.prefs,
        ))];

        own_page
            .apply_event(Event::AccountBlocked {
                account_id: blocked.clone(),
            })
            .await
            .unwrap();
        assert_eq!(ids(&own_page), vec!["10"]);

        let mut home = timeline(TimelineKind::Home);
        home.entries = vec![TimelineEntry::post(PostView::fresh(
            authored,
            &home.ctx.prefs,
        ))];
        home.apply_event(Event::AccountBlocked {
            account_id: blocked,
        })
        .await
        .unwrap();
        assert!(home.entries.is_empty());
    }

    #[tokio::test]
    async fn test_unfollow_keeps_third_party_boosts_of_them() {
        let gone = AccountId::from("7");
        let mut tl = timeline(TimelineKind::Home);

        let mut own_post = status("40");
        own_post.account.id = gone.clone();
        let mut their_inner = status("10");
        their_inner.account.id = gone.clone();
        let third_party_boost = Status {
            id: StatusId::from("30"),
            account: Account {
                id: AccountId::from("8"),
                ..Account::default()
            },
            reblog: Some(Box::new(their_inner)),
            ..Status::default()
        };
        tl.entries = vec![
            TimelineEntry::post(PostView::fresh(own_post, &tl.ctx.prefs)),
            TimelineEntry::post(PostView::fresh(third_party_boost, &tl.ctx.prefs)),
        ];

        tl.apply_event(Event::AccountUnfollowed { account_id: gone })
            .await
            .unwrap();
        assert_eq!(ids(&tl), vec!["30"]);
    }

    #[tokio::test]
    async fn test_domain_mute_removes_by_acct_domain() {
        let mut tl = timeline(TimelineKind::Home);
        let mut remote = status("20");
        remote.account.acct = "eve@bad.example".to_string();
        let mut local = status("10");
        local.account.acct = "alice".to_string();
        tl.entries = vec![
            TimelineEntry::post(PostView::fresh(remote, &tl.ctx.prefs)),
            TimelineEntry::post(PostView::fresh(local, &tl.ctx.prefs)),
        ];

        tl.apply_event(Event::DomainMuted {
            domain: "bad.example".to_string(),
        })
        .await
        .unwrap();
        assert_eq!(ids(&tl), vec!["10"]);
    }

    #[tokio::test]
    async fn test_edit_event_replaces_content_keeps_view_state() {
        let mut tl = timeline(TimelineKind::Home);
        tl.entries = vec![post("10")];
        tl.entries[0].as_post_mut().unwrap().expanded = true;

        let mut edited = status("10");
        edited.content = "<p>fixed</p>".to_string();
        tl.apply_event(Event::StatusEdited {
            status: Box::new(edited),
        })
        .await
        .unwrap();

        let view = tl.entries[0].as_post().unwrap();
        assert_eq!(view.status.content, "<p>fixed</p>");
        assert!(view.expanded);
    }

    #[tokio::test]
    async fn test_poll_vote_replaces_poll() {
        let mut tl = timeline(TimelineKind::Home);
        let mut with_poll = status("10");
        with_poll.poll = Some(tootline_types::Poll {
            id: "5".to_string(),
            votes_count: 1,
            ..tootline_types::Poll::default()
        });
        tl.entries = vec![TimelineEntry::post(PostView::fresh(
            with_poll,
            &tl.ctx.prefs,
        ))];

        tl.apply_event(Event::PollVoted {
            status_id: StatusId::from("10"),
            poll: tootline_types::Poll {
                id: "5".to_string(),
                votes_count: 2,
                voted: true,
                ..tootline_types::Poll::default()
            },
        })
        .await
        .unwrap();

        let poll = tl.entries[0]
            .as_post()
            .unwrap()
            .status
            .poll
            .clone()
            .unwrap();
        assert!(poll.voted);
        assert_eq!(poll.votes_count, 2);
    }

    // ── Guards ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_busy_phase_makes_loads_no_ops() {
        let mut tl = timeline(TimelineKind::Home);
        tl.entries = vec![post("10")];
        tl.phase = LoadPhase::Refreshing;

        tl.refresh().await.unwrap();
        tl.load_below().await.unwrap();
        tl.load_gap(&StatusId::from("5")).await.unwrap();

        assert_eq!(tl.phase, LoadPhase::Refreshing);
        assert_eq!(ids(&tl), vec!["10"]);
    }

    #[tokio::test]
    async fn test_load_below_guarded_by_end_reached() {
        let mut tl = timeline(TimelineKind::PublicLocal);
        tl.entries = vec![post("10")];
        tl.end_reached = true;
        tl.load_below().await.unwrap();
        // No tail marker appeared; nothing was fetched.
        assert_eq!(ids(&tl), vec!["10"]);
    }

    #[test]
    fn test_non_cacheable_kind_discards_db() {
        let db = crate::timeline_db::TimelineDb::in_memory().unwrap();
        let tl = Timeline::new(
            TimelineKind::PublicFederated,
            AccountContext::new(1),
            Arc::new(NullSource),
            Some(db),
        );
        assert!(tl.db.is_none());
    }

    #[test]
    fn test_visibility_is_preserved_through_entry_build() {
        let tl = timeline(TimelineKind::Home);
        let mut direct = status("10");
        direct.visibility = Visibility::Direct;
        let entry = tl.build_entry(direct).unwrap();
        assert_eq!(
            entry.as_post().unwrap().status.visibility,
            Visibility::Direct
        );
    }
}
