//! Periodic draft snapshots while a new post is being written.
//!
//! `Idle -> Armed -> Saving -> Armed`, with `Disarmed` whenever the editor
//! works on an existing post or after the new post has been published.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::draft::{Draft, DraftStore, DraftStoreError};
use crate::editor::{EditMode, SharedEditor};
use crate::notify::Notifier;

pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(30);

/// Source of `last_saved` timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutosaveState {
    Idle,
    Armed,
    Saving,
    Disarmed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Title and content were both empty.
    Skipped,
    Saved(Draft),
    Failed,
}

#[derive(Clone)]
struct Snapshotter {
    editor: SharedEditor,
    store: Arc<dyn DraftStore>,
    clock: Clock,
    state: Arc<Mutex<AutosaveState>>,
}

impl Snapshotter {
    fn snapshot(&self) -> Option<Draft> {
        let now = (self.clock)();
        self.editor
            .with(|state| (!state.is_blank()).then(|| state.snapshot(now)))
    }

    fn tick(&self) -> TickOutcome {
        let Some(draft) = self.snapshot() else {
            tracing::debug!("autosave tick skipped, editor is empty");
            return TickOutcome::Skipped;
        };
        let _saving = SavingGuard::enter(&self.state);
        match self.store.save(&draft) {
            Ok(()) => {
                tracing::debug!(last_saved = %draft.last_saved, "draft autosaved");
                TickOutcome::Saved(draft)
            }
            Err(err) => {
                tracing::warn!(error = %err, "autosave failed, retrying on next tick");
                TickOutcome::Failed
            }
        }
    }
}

/// Holds `Saving` for the duration of one store write and restores `Armed`
/// on every exit, unwinding included.
struct SavingGuard<'a> {
    state: &'a Mutex<AutosaveState>,
}

impl<'a> SavingGuard<'a> {
    fn enter(state: &'a Mutex<AutosaveState>) -> Self {
        let mut current = state.lock().unwrap_or_else(PoisonError::into_inner);
        if *current == AutosaveState::Armed {
            *current = AutosaveState::Saving;
        }
        Self { state }
    }
}

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        let mut current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *current == AutosaveState::Saving {
            *current = AutosaveState::Armed;
        }
    }
}

/// Drives the recurring draft snapshot. Must be armed from within a Tokio
/// runtime. Dropping the controller cancels its timer.
pub struct AutosaveController {
    snapshotter: Snapshotter,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
    mode: Option<EditMode>,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl AutosaveController {
    pub fn new(
        editor: SharedEditor,
        store: Arc<dyn DraftStore>,
        notifier: Arc<dyn Notifier>,
        interval: Duration,
    ) -> Self {
        Self {
            snapshotter: Snapshotter {
                editor,
                store,
                clock: Arc::new(Utc::now),
                state: Arc::new(Mutex::new(AutosaveState::Idle)),
            },
            notifier,
            interval,
            mode: None,
            cancel: None,
            task: None,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.snapshotter.clock = clock;
        self
    }

    pub fn state(&self) -> AutosaveState {
        *self
            .snapshotter
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn set_state(&self, next: AutosaveState) {
        *self
            .snapshotter
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Starts the timer for a new post; an edit session only disarms. The
    /// first tick fires one full interval after arming.
    pub fn arm(&mut self, mode: EditMode) {
        self.stop_timer();
        self.mode = Some(mode);

        if let EditMode::Edit(post_id) = mode {
            tracing::debug!(post_id, "autosave disabled while editing an existing post");
            self.set_state(AutosaveState::Disarmed);
            return;
        }

        self.set_state(AutosaveState::Armed);
        let cancel = CancellationToken::new();
        let snapshotter = self.snapshotter.clone();
        let interval = self.interval;
        let stop = cancel.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        snapshotter.tick();
                    }
                }
            }
            tracing::debug!("autosave timer stopped");
        });

        tracing::info!(interval_secs = interval.as_secs(), "autosave armed");
        self.cancel = Some(cancel);
        self.task = Some(task);
    }

    pub fn disarm(&mut self) {
        self.stop_timer();
        self.set_state(AutosaveState::Disarmed);
    }

    fn stop_timer(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Runs one timer tick immediately.
    pub fn tick(&self) -> TickOutcome {
        self.snapshotter.tick()
    }

    /// The "save draft" button. Independent of the timer, which keeps its
    /// schedule. Returns `Ok(None)` when there is nothing to store: an empty
    /// editor, or a session that is not authoring an unpublished new post.
    pub fn save_now(&self) -> Result<Option<Draft>, DraftStoreError> {
        if self.mode != Some(EditMode::New) || self.state() == AutosaveState::Disarmed {
            return Ok(None);
        }
        let Some(draft) = self.snapshotter.snapshot() else {
            self.notifier.error("Nothing to save yet");
            return Ok(None);
        };
        match self.snapshotter.store.save(&draft) {
            Ok(()) => {
                self.notifier.success("Draft saved");
                Ok(Some(draft))
            }
            Err(err) => {
                self.notifier.error(&format!("Failed to save draft: {err}"));
                Err(err)
            }
        }
    }

    /// Publishing a new post retires its draft. Publishing an edit leaves the
    /// new-post draft untouched.
    pub fn on_published(&mut self, mode: EditMode) {
        if !mode.is_new() {
            return;
        }
        self.disarm();
        self.mode = None;
        if let Err(err) = self.snapshotter.store.clear() {
            tracing::warn!(error = %err, "failed to clear draft after publishing");
        }
    }
}

impl Drop for AutosaveController {
    fn drop(&mut self) {
        self.stop_timer();
    }
}
