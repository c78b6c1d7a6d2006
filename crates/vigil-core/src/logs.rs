//! Tenant log feed with cursor pagination.
//!
//! Pages arrive newest-first from `GET /logs`. The feed appends strictly
//! older pages using the oldest held timestamp as the `before` boundary,
//! dropping entries whose timestamp is already present: the server's page
//! boundaries overlap by one entry.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, ApiError, ApiErrorKind};
use crate::session::SessionStore;

/// One audit log record, as issued by the server. Never mutated
/// client-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    pub user_id: String,
    pub action: String,
    pub status: String,
    pub source: String,
}

/// Failures surfaced by the feed, already mapped to what the user should
/// see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The credential was rejected mid-session. The session has been torn
    /// down; after [`SESSION_NOTICE_DELAY`](crate::guard::SESSION_NOTICE_DELAY)
    /// the client should move to the login view.
    SessionClosed,
    /// The server could not be reached. Depending on policy the session
    /// has been torn down as well.
    Connection,
    /// Any other server-side failure. Held entries remain valid and the
    /// fetch may be retried.
    Server(String),
}

impl FeedError {
    /// Message suitable for direct display.
    pub fn user_message(&self) -> &'static str {
        match self {
            FeedError::SessionClosed => {
                "The session was closed for security reasons, please sign in again."
            }
            FeedError::Connection => "Could not reach the server. Please try again later.",
            FeedError::Server(_) => "Could not fetch logs. Please try again.",
        }
    }
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.user_message())
    }
}

impl std::error::Error for FeedError {}

/// What a fetch did to the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The page was applied.
    Updated,
    /// The server returned an empty page; the cursor did not move.
    NoMoreData,
    /// Another fetch is already in flight; this call was ignored.
    Busy,
    /// The session changed while the request was in flight; the page was
    /// discarded.
    Stale,
}

struct FeedState {
    entries: Vec<LogEntry>,
    cursor: Option<DateTime<Utc>>,
    in_flight: bool,
}

/// Incrementally paginated view over the tenant's audit log.
///
/// The cursor, when set, is the timestamp of the oldest entry fetched so
/// far; the next page is everything strictly before it. Fetches are
/// serialized per feed: a call issued while another is in flight is
/// ignored rather than interleaved.
pub struct LogFeed {
    api: Arc<ApiClient>,
    session: Arc<SessionStore>,
    logout_on_connection_error: bool,
    state: Mutex<FeedState>,
}

impl LogFeed {
    pub fn new(
        api: Arc<ApiClient>,
        session: Arc<SessionStore>,
        logout_on_connection_error: bool,
    ) -> Self {
        Self {
            api,
            session,
            logout_on_connection_error,
            state: Mutex::new(FeedState {
                entries: Vec::new(),
                cursor: None,
                in_flight: false,
            }),
        }
    }

    /// Snapshot of the held entries, newest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().entries.clone()
    }

    /// Timestamp of the oldest fetched entry, if any.
    pub fn cursor(&self) -> Option<DateTime<Utc>> {
        self.lock().cursor
    }

    /// Fetches the newest page and replaces the feed wholesale.
    ///
    /// # Errors
    /// Returns a [`FeedError`]; held entries are only touched on success.
    pub async fn fetch_initial(&self) -> Result<FetchOutcome, FeedError> {
        self.fetch(None, true).await
    }

    /// Fetches the page strictly before the current cursor and appends the
    /// entries not already held. [`FetchOutcome::NoMoreData`] when the
    /// cursor is unset or the server has nothing older.
    ///
    /// # Errors
    /// Returns a [`FeedError`]; held entries are only touched on success.
    pub async fn fetch_more(&self) -> Result<FetchOutcome, FeedError> {
        let Some(cursor) = self.lock().cursor else {
            return Ok(FetchOutcome::NoMoreData);
        };
        self.fetch(Some(cursor), false).await
    }

    async fn fetch(
        &self,
        before: Option<DateTime<Utc>>,
        replace: bool,
    ) -> Result<FetchOutcome, FeedError> {
        {
            let mut state = self.lock();
            if state.in_flight {
                return Ok(FetchOutcome::Busy);
            }
            state.in_flight = true;
        }

        let epoch = self.session.epoch();
        let result = self.request(before).await;

        let mut state = self.lock();
        state.in_flight = false;

        let page = match result {
            Ok(page) => page,
            Err(err) => {
                drop(state);
                return Err(self.map_error(err));
            }
        };

        if self.session.epoch() != epoch {
            tracing::debug!("discarding log page fetched under a stale session");
            return Ok(FetchOutcome::Stale);
        }

        if replace {
            state.entries = page;
            state.cursor = state.entries.last().map(|entry| entry.timestamp);
            return Ok(FetchOutcome::Updated);
        }

        if page.is_empty() {
            return Ok(FetchOutcome::NoMoreData);
        }

        state.cursor = page.last().map(|entry| entry.timestamp);
        merge_page(&mut state.entries, page);
        Ok(FetchOutcome::Updated)
    }

    async fn request(&self, before: Option<DateTime<Utc>>) -> Result<Vec<LogEntry>, ApiError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(before) = before {
            query.push(("before", before.to_rfc3339()));
        }
        self.api.get_json("/logs", &query).await
    }

    fn map_error(&self, err: ApiError) -> FeedError {
        match err.kind {
            // The client already tore the session down on 401.
            ApiErrorKind::Unauthorized => FeedError::SessionClosed,
            ApiErrorKind::Transport => {
                if self.logout_on_connection_error {
                    self.session.invalidate();
                }
                FeedError::Connection
            }
            ApiErrorKind::Status | ApiErrorKind::Parse => FeedError::Server(err.message),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().expect("feed state lock poisoned")
    }
}

/// Appends the entries of `page` whose timestamp is not already held.
/// Returns how many were added.
fn merge_page(entries: &mut Vec<LogEntry>, page: Vec<LogEntry>) -> usize {
    let mut added = 0;
    for entry in page {
        if entries.iter().any(|held| held.timestamp == entry.timestamp) {
            continue;
        }
        entries.push(entry);
        added += 1;
    }
    added
}
