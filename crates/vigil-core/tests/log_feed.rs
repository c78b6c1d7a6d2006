//! Integration tests for feed pagination and failure handling.


use std::sync::Arc;
use std::time::Duration;

use fixtures::{config_for, entry_json, fresh_token, restored_session, rfc3339};
use tempfile::tempdir;
use vigil_core::api::ApiClient;
use vigil_core::guard::{RouteDecision, RouteGuard};
use vigil_core::logs::{FeedError, FetchOutcome, LogFeed};
use vigil_core::session::{SessionStatus, SessionStore};
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    _dir: tempfile::TempDir,
    session: Arc<SessionStore>,
    feed: LogFeed,
}

/// Authenticated session + feed against the given server.
fn harness(server_url: &str, logout_on_connection_error: bool) -> Harness {
    let dir = tempdir().unwrap();
    let session = Arc::new(restored_session(
        &dir,
        server_url,
        &fresh_token("alice", "acme"),
    ));
    let api = Arc::new(ApiClient::new(&config_for(server_url), Arc::clone(&session)).unwrap());
    let feed = LogFeed::new(api, Arc::clone(&session), logout_on_connection_error);
    Harness {
        _dir: dir,
        session,
        feed,
    }
}

fn timestamps(feed: &LogFeed) -> Vec<i64> {
    feed.entries()
        .iter()
        .map(|entry| entry.timestamp.timestamp())
        .collect()
}

/// URL of a port nothing listens on.
fn refused_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

/// Test: pagination merges the overlapping boundary entry exactly once and
/// the cursor walks strictly older.
#[tokio::test]
async fn test_fetch_more_dedups_boundary_entry() {
    let server = MockServer::start().await;
    let token = fresh_token("alice", "acme");

    let first_page: Vec<_> = [50, 40, 30, 20, 10].iter().map(|ts| entry_json(*ts)).collect();
    Mock::given(method("GET"))
        .and(path("/logs"))
        .and(query_param_is_missing("before"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(first_page))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logs"))
        .and(query_param("before", rfc3339(10).as_str()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(vec![entry_json(10), entry_json(5)]),
        )
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let session = Arc::new(restored_session(&dir, &server.uri(), &token));
    let api = Arc::new(ApiClient::new(&config_for(&server.uri()), Arc::clone(&session)).unwrap());
    let feed = LogFeed::new(api, session, true);

    assert_eq!(feed.fetch_initial().await.unwrap(), FetchOutcome::Updated);
    assert_eq!(timestamps(&feed), vec![50, 40, 30, 20, 10]);
    let first_cursor = feed.cursor().unwrap();
    assert_eq!(first_cursor.timestamp(), 10);

    assert_eq!(feed.fetch_more().await.unwrap(), FetchOutcome::Updated);
    assert_eq!(timestamps(&feed), vec![50, 40, 30, 20, 10, 5]);
    let second_cursor = feed.cursor().unwrap();
    assert_eq!(second_cursor.timestamp(), 5);
    assert!(second_cursor < first_cursor);
}

/// Test: an empty older page signals exhaustion and moves nothing.
#[tokio::test]
async fn test_fetch_more_empty_page_is_no_more_data() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/logs"))
        .and(query_param_is_missing("before"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(vec![entry_json(50), entry_json(40)]),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logs"))
        .and(query_param("before", rfc3339(40).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let h = harness(&server.uri(), true);
    h.feed.fetch_initial().await.unwrap();

    assert_eq!(h.feed.fetch_more().await.unwrap(), FetchOutcome::NoMoreData);
    assert_eq!(timestamps(&h.feed), vec![50, 40]);
    assert_eq!(h.feed.cursor().unwrap().timestamp(), 40);
}

/// Test: fetch_more before any initial fetch is a no-op.
#[tokio::test]
async fn test_fetch_more_without_cursor() {
    let server = MockServer::start().await;
    let h = harness(&server.uri(), true);

    assert_eq!(h.feed.fetch_more().await.unwrap(), FetchOutcome::NoMoreData);
    assert!(h.feed.entries().is_empty());
}

/// Test: an empty initial page leaves the cursor unset.
#[tokio::test]
async fn test_fetch_initial_empty_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/logs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let h = harness(&server.uri(), true);
    assert_eq!(h.feed.fetch_initial().await.unwrap(), FetchOutcome::Updated);
    assert!(h.feed.entries().is_empty());
    assert_eq!(h.feed.cursor(), None);
}

/// Test: credential rejection mid-feed tears the session down, latches the
/// notice, and flips the route guard to the login view.
#[tokio::test]
async fn test_auth_failure_invalidates_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/logs"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(serde_json::json!({"detail": "Could not validate credentials"})),
        )
        .mount(&server)
        .await;

    let h = harness(&server.uri(), true);
    let mut guard = RouteGuard::new(h.session.subscribe());
    assert_eq!(guard.decision(), RouteDecision::Render);

    let err = h.feed.fetch_initial().await.unwrap_err();
    assert_eq!(err, FeedError::SessionClosed);
    assert!(err.user_message().contains("sign in again"));

    assert_eq!(h.session.state().status, SessionStatus::Unauthenticated);
    assert!(h.session.take_expired_notice());
    assert_eq!(guard.changed().await.unwrap(), RouteDecision::RedirectToLogin);
}

/// Test: a connection failure surfaces as such and, under the default
/// policy, tears the session down too.
#[tokio::test]
async fn test_connection_failure_forces_logout() {
    let h = harness(&refused_url(), true);

    let err = h.feed.fetch_initial().await.unwrap_err();
    assert_eq!(err, FeedError::Connection);
    assert_eq!(h.session.state().status, SessionStatus::Unauthenticated);
    assert!(h.session.take_expired_notice());
}

/// Test: the connection-failure teardown can be disabled by policy.
#[tokio::test]
async fn test_connection_failure_policy_off_keeps_session() {
    let h = harness(&refused_url(), false);

    let err = h.feed.fetch_initial().await.unwrap_err();
    assert_eq!(err, FeedError::Connection);
    assert_eq!(h.session.state().status, SessionStatus::Authenticated);
    assert!(!h.session.take_expired_notice());
}

/// Test: a server error leaves held entries, cursor, and session alone.
#[tokio::test]
async fn test_server_error_keeps_feed_intact() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/logs"))
        .and(query_param_is_missing("before"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(vec![entry_json(50), entry_json(40)]),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logs"))
        .and(query_param("before", rfc3339(40).as_str()))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(serde_json::json!({"detail": "Unexpected error fetching logs"})),
        )
        .mount(&server)
        .await;

    let h = harness(&server.uri(), true);
    h.feed.fetch_initial().await.unwrap();

    let err = h.feed.fetch_more().await.unwrap_err();
    assert!(matches!(err, FeedError::Server(_)));
    assert_eq!(err.user_message(), "Could not fetch logs. Please try again.");

    assert_eq!(timestamps(&h.feed), vec![50, 40]);
    assert_eq!(h.feed.cursor().unwrap().timestamp(), 40);
    assert_eq!(h.session.state().status, SessionStatus::Authenticated);
}

/// Test: a second fetch issued while one is in flight is ignored.
#[tokio::test]
async fn test_overlapping_fetch_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/logs"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vec![entry_json(50), entry_json(40)])
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let h = harness(&server.uri(), true);
    let (first, second) = tokio::join!(h.feed.fetch_initial(), h.feed.fetch_initial());

    let outcomes = [first.unwrap(), second.unwrap()];
    assert!(outcomes.contains(&FetchOutcome::Updated));
    assert!(outcomes.contains(&FetchOutcome::Busy));
    assert_eq!(timestamps(&h.feed), vec![50, 40]);
}

/// Test: a page resolving after logout is discarded, not applied to the
/// torn-down session.
#[tokio::test]
async fn test_stale_result_discarded_after_logout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/logs"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vec![entry_json(50), entry_json(40)])
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let h = harness(&server.uri(), true);
    let (outcome, ()) = tokio::join!(h.feed.fetch_initial(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.session.logout();
    });

    assert_eq!(outcome.unwrap(), FetchOutcome::Stale);
    assert!(h.feed.entries().is_empty());
    assert_eq!(h.feed.cursor(), None);
}
