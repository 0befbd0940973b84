//! Running a timeline as a task.
//!
//! A [`Timeline`] is plain owned state. This module puts one on a tokio task
//! and hands out a cloneable [`TimelineHandle`]: commands go in over a
//! bounded mpsc channel, app events arrive over the broadcast bus, snapshots
//! come back through the watch channel. The task owns the timeline outright,
//! so every mutation is serialized without a lock.
//!
//! ```text
//!   TimelineHandle (Clone)       mpsc       task (owns Timeline)
//!   ┌──────────────────────┐  ─────────▶  ┌──────────────────────────┐
//!   │ .refresh()           │              │ select! { commands,      │
//!   │ .load_more()         │   events     │           event bus }    │
//!   │ .set_expanded()      │  ─────────▶  │ one mutation at a time   │
//!   └──────────────────────┘              └──────────────────────────┘
//!                 ▲              watch               │
//!                 └───────── TimelineSnapshot ◀──────┘
//! ```
//!
//! Load triggers (refresh, scroll past the bottom, tap a gap) go through
//! `try_send`: a trigger arriving while the queue is full is dropped, which
//! is exactly the no-op a second pull-to-refresh should be. View-state
//! toggles must not be lost, so those await queue space instead.

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, warn};

use tootline_api::TimelineSource;
use tootline_types::StatusId;

use crate::constants::COMMAND_CHANNEL_CAPACITY;
use crate::events::Event;
use crate::timeline::{SyncError, Timeline, TimelineSnapshot};

// ============================================================================
// Error Type
// ============================================================================

/// Failure to reach the timeline task.
#[derive(Debug, thiserror::Error)]
pub enum HandleError {
    #[error("timeline task has shut down")]
    Shutdown,
}

// ============================================================================
// Commands (internal)
// ============================================================================

/// What a handle asks its timeline task to do.
enum Command {
    LoadInitial,
    Refresh,
    LoadBelow,
    LoadGap { id: StatusId },
    SetExpanded { id: StatusId, expanded: bool },
    SetContentShowing { id: StatusId, showing: bool },
    SetContentCollapsed { id: StatusId, collapsed: bool },
    ClearWarning { id: StatusId },
}

// ============================================================================
// TimelineHandle
// ============================================================================

/// Cloneable front door to a running timeline task.
#[derive(Clone)]
pub struct TimelineHandle {
    tx: mpsc::Sender<Command>,
    snapshots: watch::Receiver<TimelineSnapshot>,
}

impl TimelineHandle {
    // ── Loads (edge-triggered, dropped while busy) ───────────────────────

    /// Kick off the first load: cache, filters, then the network.
    pub fn load_initial(&self) -> Result<(), HandleError> {
        self.trigger(Command::LoadInitial)
    }

    /// Pull newer posts onto the top.
    pub fn refresh(&self) -> Result<(), HandleError> {
        self.trigger(Command::Refresh)
    }

    /// Extend the feed downward.
    pub fn load_more(&self) -> Result<(), HandleError> {
        self.trigger(Command::LoadBelow)
    }

    /// Fill the gap marker with this id.
    pub fn load_gap(&self, id: StatusId) -> Result<(), HandleError> {
        self.trigger(Command::LoadGap { id })
    }

    fn trigger(&self, command: Command) -> Result<(), HandleError> {
        match self.tx.try_send(command) {
            Ok(()) => Ok(()),
            // A full queue means loads are already stacked up; one more
            // trigger is redundant by definition.
            Err(mpsc::error::TrySendError::Full(_)) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(HandleError::Shutdown),
        }
    }

    // ── View state (never dropped) ───────────────────────────────────────

    /// Open or close a post's content warning.
    pub async fn set_expanded(&self, id: StatusId, expanded: bool) -> Result<(), HandleError> {
        self.send(Command::SetExpanded { id, expanded }).await
    }

    /// Reveal or re-hide a post's sensitive media.
    pub async fn set_content_showing(
        &self,
        id: StatusId,
        showing: bool,
    ) -> Result<(), HandleError> {
        self.send(Command::SetContentShowing { id, showing }).await
    }

    /// Fold or unfold a post's overlong content.
    pub async fn set_content_collapsed(
        &self,
        id: StatusId,
        collapsed: bool,
    ) -> Result<(), HandleError> {
        self.send(Command::SetContentCollapsed { id, collapsed }).await
    }

    /// Dismiss a post's matched-filter warning.
    pub async fn clear_warning(&self, id: StatusId) -> Result<(), HandleError> {
        self.send(Command::ClearWarning { id }).await
    }

    async fn send(&self, command: Command) -> Result<(), HandleError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| HandleError::Shutdown)
    }

    // ── Observation ──────────────────────────────────────────────────────

    /// The timeline's state as of right now.
    pub fn snapshot(&self) -> TimelineSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A fresh receiver for awaiting changes.
    pub fn snapshots(&self) -> watch::Receiver<TimelineSnapshot> {
        self.snapshots.clone()
    }
}

// ============================================================================
// The task
// ============================================================================

/// Put a timeline on its own task.
///
/// The task runs until every handle clone is dropped, the event bus closes,
/// or the timeline hits an unexpected error. Expected remote failures never
/// end the task; they are part of the snapshot.
pub fn spawn_timeline<S>(
    timeline: Timeline<S>,
    events: broadcast::Receiver<Event>,
) -> (TimelineHandle, watch::Receiver<TimelineSnapshot>)
where
    S: TimelineSource + 'static,
{
    let snapshots = timeline.snapshots();
    let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    tokio::spawn(run(timeline, rx, events));
    let handle = TimelineHandle {
        tx,
        snapshots: snapshots.clone(),
    };
    (handle, snapshots)
}

async fn run<S: TimelineSource>(
    mut timeline: Timeline<S>,
    mut commands: mpsc::Receiver<Command>,
    mut events: broadcast::Receiver<Event>,
) {
    loop {
        let result = tokio::select! {
            command = commands.recv() => match command {
                Some(command) => apply(&mut timeline, command).await,
                None => {
                    debug!(timeline = %timeline.kind(), "all handles dropped, stopping");
                    break;
                }
            },
            event = events.recv() => match event {
                Ok(event) => timeline.apply_event(event).await,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    // Too far behind to replay; a refresh re-derives what
                    // the missed events would have produced.
                    warn!(
                        timeline = %timeline.kind(),
                        missed,
                        "event stream lagged, resynchronizing"
                    );
                    timeline.refresh().await
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(timeline = %timeline.kind(), "event bus closed, stopping");
                    break;
                }
            },
        };
        if let Err(error) = result {
            error!(timeline = %timeline.kind(), %error, "timeline task stopping");
            break;
        }
    }
}

async fn apply<S: TimelineSource>(
    timeline: &mut Timeline<S>,
    command: Command,
) -> Result<(), SyncError> {
    match command {
        Command::LoadInitial => timeline.load_initial().await,
        Command::Refresh => timeline.refresh().await,
        Command::LoadBelow => timeline.load_below().await,
        Command::LoadGap { id } => timeline.load_gap(&id).await,
        Command::SetExpanded { id, expanded } => timeline.set_expanded(&id, expanded),
        Command::SetContentShowing { id, showing } => timeline.set_content_showing(&id, showing),
        Command::SetContentCollapsed { id, collapsed } => {
            timeline.set_content_collapsed(&id, collapsed)
        }
        Command::ClearWarning { id } => timeline.clear_warning(&id),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;

    use tootline_api::{ApiError, PageQuery, TimelinePage};
    use tootline_types::{FilterRule, Status, TimelineKind};

    use crate::context::AccountContext;
    use crate::events::EventBus;
    use crate::timeline::LoadPhase;

    fn status(id: &str) -> Status {
        Status {
            id: StatusId::from(id),
            created_at: Utc::now(),
            ..Status::default()
        }
    }

    /// Serves the same three-post page for every request.
    struct OnePage;

    #[async_trait]
    impl TimelineSource for OnePage {
        async fn fetch_timeline(
            &self,
            _kind: &TimelineKind,
            _query: PageQuery,
        ) -> Result<TimelinePage, ApiError> {
            Ok(TimelinePage {
                statuses: vec![status("3"), status("2"), status("1")],
                ..TimelinePage::default()
            })
        }

        async fn fetch_filters(&self) -> Result<Vec<FilterRule>, ApiError> {
            Ok(Vec::new())
        }
    }

    fn spawn_one_page() -> (TimelineHandle, watch::Receiver<TimelineSnapshot>, EventBus) {
        let bus = EventBus::new();
        let ctx = AccountContext::new(1);
        let timeline = Timeline::new(TimelineKind::PublicLocal, ctx, Arc::new(OnePage), None);
        let (handle, snapshots) = spawn_timeline(timeline, bus.subscribe());
        (handle, snapshots, bus)
    }

    async fn wait_for(
        snapshots: &mut watch::Receiver<TimelineSnapshot>,
        accept: impl Fn(&TimelineSnapshot) -> bool,
    ) -> TimelineSnapshot {
        loop {
            {
                let snap = snapshots.borrow_and_update();
                if accept(&snap) {
                    return snap.clone();
                }
            }
            snapshots.changed().await.unwrap();
        }
    }

    // ── Channel semantics ───────────────────────────────────────────────

    #[tokio::test]
    async fn test_full_queue_drops_load_triggers() {
        let (tx, mut rx) = mpsc::channel(1);
        let (_keep, snapshots) = watch::channel(TimelineSnapshot::default());
        let handle = TimelineHandle { tx, snapshots };

        handle.refresh().unwrap();
        // Queue is full now; further triggers are quietly dropped.
        handle.load_more().unwrap();
        handle.refresh().unwrap();

        assert!(matches!(rx.try_recv(), Ok(Command::Refresh)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_gone_task_reports_shutdown() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let (_keep, snapshots) = watch::channel(TimelineSnapshot::default());
        let handle = TimelineHandle { tx, snapshots };

        assert!(matches!(handle.refresh(), Err(HandleError::Shutdown)));
        assert!(matches!(
            handle.clear_warning(StatusId::from("1")).await,
            Err(HandleError::Shutdown)
        ));
    }

    // ── End to end through the task ─────────────────────────────────────

    #[tokio::test]
    async fn test_spawned_timeline_loads_and_publishes() {
        let (handle, mut snapshots, _bus) = spawn_one_page();
        handle.load_initial().unwrap();

        let snap = wait_for(&mut snapshots, |s| {
            s.phase == LoadPhase::Idle && !s.entries.is_empty()
        })
        .await;
        assert_eq!(snap.entries.len(), 3);
        assert_eq!(snap.entries[0].id().as_str(), "3");
        assert_eq!(handle.snapshot().entries.len(), 3);
    }

    #[tokio::test]
    async fn test_bus_event_flows_into_snapshot() {
        let (handle, mut snapshots, bus) = spawn_one_page();
        handle.load_initial().unwrap();
        wait_for(&mut snapshots, |s| {
            s.phase == LoadPhase::Idle && !s.entries.is_empty()
        })
        .await;

        bus.publish(Event::Favourited {
            status_id: StatusId::from("2"),
            favourited: true,
        });

        let snap = wait_for(&mut snapshots, |s| {
            s.entries
                .iter()
                .any(|e| e.as_post().is_some_and(|p| p.status.favourited))
        })
        .await;
        let flagged: Vec<&str> = snap
            .entries
            .iter()
            .filter(|e| e.as_post().is_some_and(|p| p.status.favourited))
            .map(|e| e.id().as_str())
            .collect();
        assert_eq!(flagged, vec!["2"]);
    }

    #[tokio::test]
    async fn test_view_toggle_through_handle() {
        let (handle, mut snapshots, _bus) = spawn_one_page();
        handle.load_initial().unwrap();
        wait_for(&mut snapshots, |s| {
            s.phase == LoadPhase::Idle && !s.entries.is_empty()
        })
        .await;

        handle
            .set_expanded(StatusId::from("3"), true)
            .await
            .unwrap();

        let snap = wait_for(&mut snapshots, |s| {
            s.entries
                .first()
                .and_then(|e| e.as_post())
                .is_some_and(|p| p.expanded)
        })
        .await;
        assert!(!snap.entries[1].as_post().unwrap().expanded);
    }
}
