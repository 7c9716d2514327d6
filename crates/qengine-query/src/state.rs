use std::fmt;
use std::time::Instant;

/// Stage of one page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    Resolving,
    SessionAcquiring,
    AppOpening,
    ObjectResolving,
    Querying,
    Paging,
    Done,
    Failed(String),
}

impl FetchState {
    /// The stage that normally follows this one.
    pub fn successor(&self) -> Option<FetchState> {
        match self {
            FetchState::Idle => Some(FetchState::Resolving),
            FetchState::Resolving => Some(FetchState::SessionAcquiring),
            FetchState::SessionAcquiring => Some(FetchState::AppOpening),
            FetchState::AppOpening => Some(FetchState::ObjectResolving),
            FetchState::ObjectResolving => Some(FetchState::Querying),
            FetchState::Querying => Some(FetchState::Paging),
            FetchState::Paging => Some(FetchState::Done),
            FetchState::Done | FetchState::Failed(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FetchState::Done | FetchState::Failed(_))
    }
}

impl fmt::Display for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchState::Failed(reason) => write!(f, "Failed({})", reason),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Walks one fetch through its [`FetchState`]s and logs each move.
///
/// Only forward moves to the successor stage are taken; `Failed` is
/// reachable from any stage that is not terminal.
#[derive(Debug)]
pub struct FetchTracker {
    app: String,
    state: FetchState,
    started: Instant,
}

impl FetchTracker {
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            state: FetchState::Idle,
            started: Instant::now(),
        }
    }

    pub fn state(&self) -> &FetchState {
        &self.state
    }

    /// Move to `next` if it is the successor of the current stage.
    pub fn advance(&mut self, next: FetchState) -> bool {
        if self.state.successor().as_ref() != Some(&next) {
            tracing::warn!(app = %self.app, from = %self.state, to = %next, "Ignoring out-of-order fetch transition");
            return false;
        }
        tracing::debug!(
            app = %self.app,
            from = %self.state,
            to = %next,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Fetch state"
        );
        self.state = next;
        true
    }

    pub fn fail(&mut self, reason: impl fmt::Display) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        let reason = reason.to_string();
        tracing::debug!(app = %self.app, from = %self.state, reason = %reason, "Fetch failed");
        self.state = FetchState::Failed(reason);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_walk() {
        let mut tracker = FetchTracker::new("app");
        let mut state = FetchState::Idle;
        while let Some(next) = state.successor() {
            assert!(tracker.advance(next.clone()));
            state = next;
        }
        assert_eq!(tracker.state(), &FetchState::Done);
        assert!(!tracker.fail("too late"));
    }

    #[test]
    fn test_skipping_a_stage_is_refused() {
        let mut tracker = FetchTracker::new("app");
        assert!(!tracker.advance(FetchState::AppOpening));
        assert_eq!(tracker.state(), &FetchState::Idle);
    }

    #[test]
    fn test_fail_from_middle() {
        let mut tracker = FetchTracker::new("app");
        tracker.advance(FetchState::Resolving);
        tracker.advance(FetchState::SessionAcquiring);
        assert!(tracker.fail("all endpoints failed"));
        assert_eq!(
            tracker.state(),
            &FetchState::Failed("all endpoints failed".into())
        );
        assert_eq!(tracker.state().to_string(), "Failed(all endpoints failed)");
        assert!(!tracker.advance(FetchState::AppOpening));
    }
}
