//! Session lifecycle for the client.
//!
//! [`SessionStore`] is the single source of truth for the authentication
//! session: it acquires the credential, persists it, restores it on
//! startup, and tears it down when the user signs out or the server
//! rejects it. Exactly one store exists per process; components receive it
//! by `Arc` and observe transitions through [`SessionStore::subscribe`].
//!
//! Lifecycle: `Initializing` settles into `Authenticated` or
//! `Unauthenticated` at startup; a login either lands in `Authenticated`
//! directly or passes through `MfaPending` when the account has a second
//! factor enrolled; any teardown returns to `Unauthenticated`.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::sync::watch;

use crate::config::Config;
use crate::session::token::{Credential, TokenStore};

pub mod token;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Startup restoration has not settled yet.
    Initializing,
    /// No usable credential.
    Unauthenticated,
    /// Password accepted; waiting for a one-time code.
    MfaPending,
    /// Credential established and persisted.
    Authenticated,
}

/// Signed-in user identity, as decoded from the credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub username: String,
}

/// Snapshot of the session, broadcast to observers on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub status: SessionStatus,
    pub user: Option<UserInfo>,
    pub tenant_id: Option<String>,
}

impl SessionState {
    fn initializing() -> Self {
        Self {
            status: SessionStatus::Initializing,
            user: None,
            tenant_id: None,
        }
    }

    fn unauthenticated() -> Self {
        Self {
            status: SessionStatus::Unauthenticated,
            user: None,
            tenant_id: None,
        }
    }

    fn mfa_pending() -> Self {
        Self {
            status: SessionStatus::MfaPending,
            user: None,
            tenant_id: None,
        }
    }

    fn authenticated(credential: &Credential) -> Self {
        Self {
            status: SessionStatus::Authenticated,
            user: Some(UserInfo {
                username: credential.claims().subject.clone(),
            }),
            tenant_id: Some(credential.claims().tenant_id.clone()),
        }
    }
}

/// Result of a login or verification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Session is fully established and the credential persisted.
    Authenticated,
    /// The server wants a one-time code before issuing the final credential.
    MfaRequired,
    /// The attempt was rejected; the message is safe to display.
    Rejected(String),
}

/// One-shot challenge issued when login requires a second factor.
/// Consumed by the first accepted verification.
#[derive(Debug, Clone)]
struct MfaChallenge {
    temp_token: String,
}

struct SessionInner {
    credential: Option<Credential>,
    challenge: Option<MfaChallenge>,
    epoch: u64,
    expired_notice: bool,
}

/// Owns the credential and the session state machine.
pub struct SessionStore {
    http: reqwest::Client,
    base_url: String,
    store: TokenStore,
    inner: Mutex<SessionInner>,
    state: watch::Sender<SessionState>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    mfa_required: bool,
}

impl SessionStore {
    /// Creates a store against the configured server. State starts as
    /// `Initializing` until [`SessionStore::initialize`] has run.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config, store: TokenStore) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("build HTTP client")?;

        let (state, _) = watch::channel(SessionState::initializing());

        Ok(Self {
            http,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            store,
            inner: Mutex::new(SessionInner {
                credential: None,
                challenge: None,
                epoch: 0,
                expired_notice: false,
            }),
            state,
        })
    }

    /// Returns a receiver that observes every session transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Current session snapshot.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Restores a persisted session, if any. Runs once at process start and
    /// never fails outward: an unreadable, undecodable, or expired
    /// credential is purged and the session starts signed out.
    pub fn initialize(&self) -> SessionState {
        let token = match self.store.load() {
            Ok(token) => token,
            Err(err) => {
                tracing::warn!("could not read persisted credential, purging: {err:#}");
                self.purge_persisted();
                None
            }
        };

        let credential = token.and_then(|token| match Credential::decode(&token) {
            Ok(credential) if !credential.is_expired() => Some(credential),
            Ok(_) => {
                tracing::debug!("persisted credential has expired, purging");
                self.purge_persisted();
                None
            }
            Err(err) => {
                tracing::warn!("persisted credential is undecodable, purging: {err:#}");
                self.purge_persisted();
                None
            }
        });

        let next = match credential {
            Some(credential) => {
                let state = SessionState::authenticated(&credential);
                let mut inner = self.lock();
                inner.credential = Some(credential);
                inner.expired_notice = false;
                drop(inner);
                state
            }
            None => SessionState::unauthenticated(),
        };

        self.state.send_replace(next.clone());
        next
    }

    /// Exchanges credentials for a bearer token at `POST /token`.
    ///
    /// Three outcomes: a final credential (persisted, session becomes
    /// `Authenticated`), an MFA challenge (`MfaPending`), or a rejection
    /// carrying a display-safe message. Does not retry.
    ///
    /// # Errors
    /// Returns an error when the server is unreachable or answers with
    /// something other than a token or a rejection.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome> {
        let url = format!("{}/token", self.base_url);
        let response = self
            .http
            .post(url)
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .context("login request failed")?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            tracing::debug!(username, "login rejected");
            return Ok(LoginOutcome::Rejected(
                "Invalid username or password".to_string(),
            ));
        }
        if !response.status().is_success() {
            anyhow::bail!("login failed (HTTP {})", response.status());
        }

        let token: TokenResponse = response.json().await.context("parse login response")?;

        if token.mfa_required {
            let mut inner = self.lock();
            inner.challenge = Some(MfaChallenge {
                temp_token: token.access_token,
            });
            inner.expired_notice = false;
            drop(inner);
            self.state.send_replace(SessionState::mfa_pending());
            return Ok(LoginOutcome::MfaRequired);
        }

        self.establish(token.access_token)?;
        Ok(LoginOutcome::Authenticated)
    }

    /// Trades the active MFA challenge plus a one-time code for the final
    /// credential at `POST /api/verify-mfa`. A rejected code leaves the
    /// challenge in place so the caller may retry.
    ///
    /// # Errors
    /// Returns an error when no challenge is active or the server is
    /// unreachable.
    pub async fn verify_mfa(&self, code: &str) -> Result<LoginOutcome> {
        let temp_token = {
            let inner = self.lock();
            let Some(challenge) = &inner.challenge else {
                anyhow::bail!("no verification challenge is active");
            };
            challenge.temp_token.clone()
        };

        let url = format!("{}/api/verify-mfa", self.base_url);
        let response = self
            .http
            .post(url)
            .bearer_auth(&temp_token)
            .json(&serde_json::json!({ "code": code }))
            .send()
            .await
            .context("verification request failed")?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(LoginOutcome::Rejected(
                "Invalid verification code".to_string(),
            ));
        }
        if !response.status().is_success() {
            anyhow::bail!("verification failed (HTTP {})", response.status());
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("parse verification response")?;
        self.establish(token.access_token)?;
        Ok(LoginOutcome::Authenticated)
    }

    /// Signs out: purges the persisted credential and resets to
    /// `Unauthenticated`. Idempotent, and safe to reach from overlapping
    /// failure paths.
    pub fn logout(&self) {
        self.teardown(false);
    }

    /// Tears the session down after the server rejected the credential.
    /// Same as [`SessionStore::logout`], plus a latched expiry notice so
    /// views can tell a forced teardown from a user-initiated sign-out.
    pub fn invalidate(&self) {
        tracing::debug!("session invalidated by the server");
        self.teardown(true);
    }

    /// Returns true once after a forced invalidation, then resets.
    pub fn take_expired_notice(&self) -> bool {
        std::mem::take(&mut self.lock().expired_notice)
    }

    /// Monotonic counter that moves whenever the session identity changes.
    /// A fetch that began under an older epoch must discard its result.
    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Current bearer token, if the session holds one.
    pub fn bearer_token(&self) -> Option<String> {
        self.lock()
            .credential
            .as_ref()
            .map(|credential| credential.token().to_string())
    }

    /// Decodes, persists, and publishes a freshly issued credential.
    fn establish(&self, token: String) -> Result<()> {
        let credential = Credential::decode(&token).context("decode issued credential")?;
        self.store.save(&token).context("persist credential")?;

        let state = SessionState::authenticated(&credential);
        let mut inner = self.lock();
        inner.credential = Some(credential);
        inner.challenge = None;
        inner.expired_notice = false;
        inner.epoch += 1;
        drop(inner);

        self.state.send_replace(state);
        Ok(())
    }

    fn teardown(&self, expired: bool) {
        self.purge_persisted();

        let mut inner = self.lock();
        inner.credential = None;
        inner.challenge = None;
        inner.epoch += 1;
        inner.expired_notice = expired;
        drop(inner);

        self.state.send_replace(SessionState::unauthenticated());
    }

    fn purge_persisted(&self) {
        if let Err(err) = self.store.clear() {
            tracing::warn!("could not purge persisted credential: {err:#}");
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().expect("session state lock poisoned")
    }
}
