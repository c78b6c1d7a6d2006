//! View gating driven by session state.
//!
//! The decision is a pure function of the current [`SessionState`]; the
//! guard re-evaluates it on every transition, so an invalidation deep
//! inside a data fetch still moves the active view to login.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;

use crate::session::{SessionState, SessionStatus};

/// How long a forced-teardown notice stays on screen before the client
/// moves to the login view.
pub const SESSION_NOTICE_DELAY: Duration = Duration::from_secs(2);

/// What a protected view should do for the current session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Session is established; render the protected content.
    Render,
    /// Session restoration has not settled; render nothing yet.
    Hold,
    /// No established session; show the login view instead.
    RedirectToLogin,
}

/// Decides what to do with a protected view. `Initializing` holds
/// rendering so a restored session does not flash through the login view
/// first; `MfaPending` routes to the login view, which owns the challenge
/// step.
pub fn evaluate(state: &SessionState) -> RouteDecision {
    match state.status {
        SessionStatus::Authenticated => RouteDecision::Render,
        SessionStatus::Initializing => RouteDecision::Hold,
        SessionStatus::Unauthenticated | SessionStatus::MfaPending => {
            RouteDecision::RedirectToLogin
        }
    }
}

/// Re-evaluates the gate whenever the session transitions.
pub struct RouteGuard {
    state: watch::Receiver<SessionState>,
}

impl RouteGuard {
    pub fn new(state: watch::Receiver<SessionState>) -> Self {
        Self { state }
    }

    /// Decision for the state as of now.
    pub fn decision(&self) -> RouteDecision {
        evaluate(&self.state.borrow())
    }

    /// Waits for the next session transition and returns the new decision.
    ///
    /// # Errors
    /// Returns an error if the session store has been dropped.
    pub async fn changed(&mut self) -> Result<RouteDecision> {
        self.state.changed().await.context("session store dropped")?;
        Ok(self.decision())
    }

    /// Waits until startup restoration has settled, then returns the
    /// decision.
    ///
    /// # Errors
    /// Returns an error if the session store has been dropped.
    pub async fn settled(&mut self) -> Result<RouteDecision> {
        loop {
            let decision = self.decision();
            if decision != RouteDecision::Hold {
                return Ok(decision);
            }
            self.state.changed().await.context("session store dropped")?;
        }
    }
}
