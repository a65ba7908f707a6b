//! Consumer demand tracking
//!
//! Turns "a reader is blocked on a missing piece" and "a selected file is
//! still incomplete" into edge-triggered `Interested` / `Uninterested` events.

use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::engine::EngineEvent;

#[derive(Debug, Default)]
struct DemandState {
    blocked_readers: usize,
    wanted: bool,
    interested: Option<bool>,
}

impl DemandState {
    fn interested(&self) -> bool {
        self.blocked_readers > 0 || self.wanted
    }
}

/// Edge-triggered interest publisher
#[derive(Debug)]
pub struct DemandTracker {
    state: Mutex<DemandState>,
    events: broadcast::Sender<EngineEvent>,
}

impl DemandTracker {
    pub fn new(events: broadcast::Sender<EngineEvent>) -> Self {
        Self {
            state: Mutex::new(DemandState::default()),
            events,
        }
    }

    /// Record whether any selected file still has missing pieces
    pub fn set_wanted(&self, wanted: bool) {
        self.update(|state| state.wanted = wanted);
    }

    /// A reader started waiting for missing data
    pub fn reader_blocked(&self) {
        self.update(|state| state.blocked_readers += 1);
    }

    /// A reader stopped waiting (data arrived or the reader went away)
    pub fn reader_unblocked(&self) {
        self.update(|state| state.blocked_readers = state.blocked_readers.saturating_sub(1));
    }

    /// Current interest, `false` before anything was recorded
    pub fn is_interested(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.interested.unwrap_or(false)
    }

    fn update(&self, change: impl FnOnce(&mut DemandState)) {
        let event = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            change(&mut state);
            let now = state.interested();
            if state.interested == Some(now) {
                return;
            }
            state.interested = Some(now);
            if now {
                EngineEvent::Interested
            } else {
                EngineEvent::Uninterested
            }
        };

        tracing::debug!("Demand changed: {:?}", event);
        // No subscribers is fine, the controller may not be running yet
        let _ = self.events.send(event);
    }
}

/// Marks a reader as blocked for as long as the guard lives
pub struct BlockedGuard<'a> {
    tracker: &'a DemandTracker,
}

impl<'a> BlockedGuard<'a> {
    pub fn new(tracker: &'a DemandTracker) -> Self {
        tracker.reader_blocked();
        Self { tracker }
    }
}

impl Drop for BlockedGuard<'_> {
    fn drop(&mut self) {
        self.tracker.reader_unblocked();
    }
}
