//! End-to-end checks of the reqwest backend against a canned local HTTP server.
#![cfg(feature = "http")]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::FixedOffset;
use rallypoint_core::{AssemblyArea, Credential, merge};
use rallypoint_sync::{EventFetcher, Feed, FetchError, HttpBackend, MapBackend};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

type Routes = HashMap<&'static str, (u16, String)>;

struct StubServer {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StubServer {
    /// Request heads seen so far, lowercased.
    fn heads(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// Serve `routes` until the test ends. Unknown paths answer 404.
async fn serve(routes: Routes) -> StubServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = requests.clone();
    let routes = Arc::new(routes);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let routes = routes.clone();
            let seen = seen.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&buf).to_lowercase();
                let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                seen.lock().unwrap().push(head);

                let (status, body) = routes
                    .get(path.as_str())
                    .cloned()
                    .unwrap_or((404, String::new()));
                let response = format!(
                    "HTTP/1.1 {status} STUB\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    StubServer {
        base_url: format!("http://{addr}"),
        requests,
    }
}

fn envelope(data: &str) -> String {
    format!(r#"{{"status":"success","message":"ok","data":{data}}}"#)
}

fn help_body() -> String {
    envelope(
        r#"[
            {"id": 12, "user_id": 4, "latitude": "37.0012", "longitude": 35.3211,
             "created_at": "2026-02-21 10:00:00", "message": "Enkaz altındayım",
             "user": {"full_name": "Ayşe Yılmaz", "health_condition": "astım"}},
            {"id": 13, "latitude": 37.0031, "longitude": 35.3180}
        ]"#,
    )
}

fn safe_body() -> String {
    envelope(r#"[{"id": 12, "latitude": 37.0020, "longitude": 35.3220, "status": "safe"}]"#)
}

fn address_body() -> String {
    envelope(
        r#"{"latitude": "36.9182", "longitude": "34.8931",
            "neighborhood_name": "Cumhuriyet", "street": "1012. Sokak"}"#,
    )
}

fn healthy_routes() -> Routes {
    HashMap::from([
        ("/user/help-calls", (200, help_body())),
        ("/user/safe-status", (200, safe_body())),
        ("/user/address", (200, address_body())),
    ])
}

fn fetcher(base_url: &str) -> EventFetcher {
    let backend = HttpBackend::new(base_url, Duration::from_secs(5)).unwrap();
    EventFetcher::new(
        Arc::new(backend),
        vec![AssemblyArea::new("A1", 37.002, 35.322)],
        Duration::from_secs(5),
    )
}

fn credential() -> Credential {
    Credential::new("tok-123").unwrap()
}

#[tokio::test]
async fn healthy_backend_returns_every_feed() {
    let server = serve(healthy_routes()).await;
    let outcome = fetcher(&server.base_url).fetch_all(&credential()).await.unwrap();

    assert_eq!(outcome.help.len(), 2);
    assert_eq!(outcome.help[0].latitude, Some(37.0012));
    assert_eq!(
        outcome.help[0].user.as_ref().map(|u| u.name.as_str()),
        Some("Ayşe Yılmaz")
    );
    assert_eq!(outcome.safe.len(), 1);
    let address = outcome.address.unwrap();
    assert_eq!(address.label(), "Cumhuriyet, 1012. Sokak");
    assert!(outcome.errors.is_empty());
}

#[tokio::test]
async fn every_request_carries_the_bearer_token() {
    let server = serve(healthy_routes()).await;
    fetcher(&server.base_url).fetch_all(&credential()).await.unwrap();

    let heads = server.heads();
    assert_eq!(heads.len(), 3);
    for head in heads {
        assert!(head.contains("authorization: bearer tok-123"), "{head}");
    }
}

#[tokio::test]
async fn help_500_keeps_the_other_feeds() {
    let mut routes = healthy_routes();
    routes.insert("/user/help-calls", (500, r#"{"error":"db down"}"#.into()));
    let server = serve(routes).await;

    let outcome = fetcher(&server.base_url).fetch_all(&credential()).await.unwrap();
    assert!(outcome.help.is_empty());
    assert_eq!(outcome.safe.len(), 1);
    assert!(outcome.address.is_some());
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].feed(), Feed::HelpCalls);
}

#[tokio::test]
async fn safe_401_expires_the_session() {
    let mut routes = healthy_routes();
    routes.insert(
        "/user/safe-status",
        (401, r#"{"message":"Token is invalid"}"#.into()),
    );
    let server = serve(routes).await;

    let expired = fetcher(&server.base_url)
        .fetch_all(&credential())
        .await
        .unwrap_err();
    assert_eq!(expired.feed, Feed::SafeStatus);
    assert_eq!(expired.status, 401);
}

#[tokio::test]
async fn missing_address_is_absent_not_an_error() {
    let mut routes = healthy_routes();
    routes.remove("/user/address");
    let server = serve(routes).await;

    let outcome = fetcher(&server.base_url).fetch_all(&credential()).await.unwrap();
    assert!(outcome.address.is_none());
    assert!(outcome.errors.is_empty());
}

#[tokio::test]
async fn null_address_payload_is_absent() {
    let mut routes = healthy_routes();
    routes.insert("/user/address", (200, envelope("null")));
    let server = serve(routes).await;

    let backend = HttpBackend::new(&server.base_url, Duration::from_secs(5)).unwrap();
    assert!(backend.user_address(&credential()).await.unwrap().is_none());
}

#[tokio::test]
async fn malformed_body_marks_feed_unavailable() {
    let mut routes = healthy_routes();
    routes.insert("/user/safe-status", (200, "<html>oops</html>".into()));
    let server = serve(routes).await;

    let outcome = fetcher(&server.base_url).fetch_all(&credential()).await.unwrap();
    assert_eq!(outcome.help.len(), 2);
    assert!(matches!(
        &outcome.errors[..],
        [FetchError::SourceUnavailable { feed: Feed::SafeStatus, .. }]
    ));
}

#[tokio::test]
async fn one_malformed_row_does_not_empty_the_feed() {
    let mut routes = healthy_routes();
    routes.insert(
        "/user/help-calls",
        (
            200,
            envelope(
                r#"[
                    {"id": 1, "latitude": 37.0, "longitude": 35.0},
                    {"latitude": 37.1, "longitude": 35.1, "message": "no id"},
                    {"id": 3, "latitude": 37.2, "longitude": 35.2,
                     "user": {"health_condition": "astım"}}
                ]"#,
            ),
        ),
    );
    let server = serve(routes).await;

    let outcome = fetcher(&server.base_url).fetch_all(&credential()).await.unwrap();
    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.help.len(), 3);

    let utc = FixedOffset::east_opt(0).unwrap();
    let merged = merge(outcome.help, vec![], &[], None, utc);
    let ids: Vec<String> = merged.markers.iter().map(|m| m.id().to_string()).collect();
    assert_eq!(ids, vec!["1", "3"]);
    assert_eq!(merged.rejected.len(), 1);
    assert_eq!(merged.markers[1].user().map(|u| u.name.as_str()), Some(""));
}

#[tokio::test]
async fn unreachable_backend_fails_every_feed() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let outcome = fetcher(&format!("http://{addr}"))
        .fetch_all(&credential())
        .await
        .unwrap();
    assert!(outcome.all_feeds_failed());
    assert_eq!(outcome.errors.len(), 3);
    assert_eq!(outcome.areas.len(), 1);
}
