use std::time::Duration;

use moodify_search::retry::{send_with_retry, FetchError, RetryPolicy};
use reqwest::StatusCode;

fn fast_policy() -> RetryPolicy {
    RetryPolicy::exponential(2, Duration::from_millis(1))
}

#[tokio::test]
async fn success_returns_on_first_attempt() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/thing")
        .with_status(200)
        .with_body("ok")
        .expect(1)
        .create_async()
        .await;

    let client = reqwest::Client::new();
    let res = send_with_retry(
        client.get(format!("{}/thing", server.url())),
        &fast_policy(),
    )
    .await
    .expect("response");

    assert_eq!(res.status(), StatusCode::OK);
    mock.assert_async().await;
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/thing")
        .with_status(404)
        .with_body("nope")
        .expect(1)
        .create_async()
        .await;

    let client = reqwest::Client::new();
    let err = send_with_retry(
        client.get(format!("{}/thing", server.url())),
        &fast_policy(),
    )
    .await
    .unwrap_err();

    match err {
        FetchError::Client { status, body } => {
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body, "nope");
        }
        other => panic!("expected client error, got {:?}", other),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn server_errors_are_retried_until_exhaustion() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/thing")
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let client = reqwest::Client::new();
    let err = send_with_retry(
        client.get(format!("{}/thing", server.url())),
        &fast_policy(),
    )
    .await
    .unwrap_err();

    match err {
        FetchError::Exhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(last.contains("503"), "got: {}", last);
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn transport_failures_are_retried_until_exhaustion() {
    // Nothing listens here; every attempt is a connection failure.
    let client = reqwest::Client::new();
    let err = send_with_retry(
        client.get("http://127.0.0.1:9/unreachable"),
        &RetryPolicy::exponential(1, Duration::from_millis(1)),
    )
    .await
    .unwrap_err();

    match err {
        FetchError::Exhausted { attempts, last } => {
            assert_eq!(attempts, 2);
            assert!(last.contains("transport error"), "got: {}", last);
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
}
