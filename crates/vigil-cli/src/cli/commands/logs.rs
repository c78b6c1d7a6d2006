//! Audit log feed command.

use std::sync::Arc;

use anyhow::Result;
use vigil_core::api::ApiClient;
use vigil_core::config::Config;
use vigil_core::guard::{RouteDecision, RouteGuard, SESSION_NOTICE_DELAY};
use vigil_core::logs::{FeedError, FetchOutcome, LogFeed};
use vigil_core::session::SessionStore;

pub async fn run(
    config: &Config,
    api: Arc<ApiClient>,
    session: Arc<SessionStore>,
    pages: u32,
) -> Result<()> {
    super::require_session(&session)?;

    let guard = RouteGuard::new(session.subscribe());
    let feed = LogFeed::new(api, Arc::clone(&session), config.logout_on_connection_error);

    if let Err(err) = fetch_pages(&feed, pages).await {
        return failed(&guard, &err).await;
    }

    let entries = feed.entries();
    if entries.is_empty() {
        println!("No log entries.");
        return Ok(());
    }

    println!(
        "{:<19}  {:<16}  {:<12}  {:<24}  {:<8}  {}",
        "TIMESTAMP", "DEVICE", "USER", "ACTION", "STATUS", "SOURCE"
    );
    for entry in &entries {
        println!(
            "{:<19}  {:<16}  {:<12}  {:<24}  {:<8}  {}",
            entry.timestamp.format("%d/%m/%y %H:%M:%S"),
            entry.device_id,
            entry.user_id,
            entry.action,
            entry.status,
            entry.source
        );
    }
    if feed.cursor().is_some() {
        println!();
        println!("(older entries may exist; rerun with --pages {})", pages + 1);
    }
    Ok(())
}

async fn fetch_pages(feed: &LogFeed, pages: u32) -> Result<(), FeedError> {
    feed.fetch_initial().await?;
    for _ in 1..pages {
        if feed.fetch_more().await? == FetchOutcome::NoMoreData {
            break;
        }
    }
    Ok(())
}

/// Shows the failure and, when the session was torn down with it, keeps
/// the notice on screen briefly before pointing back at sign-in.
async fn failed(guard: &RouteGuard, err: &FeedError) -> Result<()> {
    eprintln!("{err}");

    if guard.decision() == RouteDecision::RedirectToLogin {
        tokio::time::sleep(SESSION_NOTICE_DELAY).await;
        eprintln!("Run `vigil login` to sign in again.");
    }

    anyhow::bail!("fetching logs failed")
}
