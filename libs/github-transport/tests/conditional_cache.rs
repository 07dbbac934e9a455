#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Conditional-request caching against a live mock server.

use github_transport::{GithubClient, TransportBuilder, TransportConfig};
use httpmock::prelude::*;

fn client() -> GithubClient {
    TransportBuilder::with_config(TransportConfig::for_testing())
        .max_retries(0)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_not_modified_replays_first_body() {
    let server = MockServer::start();
    let fresh = server.mock(|when, then| {
        when.method(GET).path("/repos/o/r").header_missing("if-none-match");
        then.status(200)
            .header("etag", "\"abc\"")
            .header("x-ratelimit-remaining", "4999")
            .body(r#"{"full_name":"o/r"}"#);
    });
    let revalidated = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/o/r")
            .header("if-none-match", "\"abc\"");
        then.status(304)
            .header("etag", "\"abc\"")
            .header("x-ratelimit-remaining", "4998");
    });

    let client = client();
    let url = format!("{}/repos/o/r", server.base_url());

    let first = client.get(&url).send().await.unwrap();
    assert_eq!(first.status(), http::StatusCode::OK);
    let first_body = first.bytes().await.unwrap();

    let second = client.get(&url).send().await.unwrap();
    assert_eq!(second.status(), http::StatusCode::OK);
    assert_eq!(second.headers()["x-ratelimit-remaining"], "4998");
    assert_eq!(second.etag(), Some("\"abc\""));
    assert_eq!(second.bytes().await.unwrap(), first_body);

    assert_eq!(fresh.calls(), 1);
    assert_eq!(revalidated.calls(), 1);
}

#[tokio::test]
async fn test_last_modified_validator() {
    let server = MockServer::start();
    let fresh = server.mock(|when, then| {
        when.method(GET)
            .path("/orgs/o")
            .header_missing("if-modified-since");
        then.status(200)
            .header("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT")
            .body("org");
    });
    let revalidated = server.mock(|when, then| {
        when.method(GET)
            .path("/orgs/o")
            .header("if-modified-since", "Wed, 21 Oct 2015 07:28:00 GMT");
        then.status(304);
    });

    let client = client();
    let url = format!("{}/orgs/o", server.base_url());
    client.get(&url).send().await.unwrap().bytes().await.unwrap();
    let text = client.get(&url).send().await.unwrap().text().await.unwrap();

    assert_eq!(text, "org");
    assert_eq!(fresh.calls(), 1);
    assert_eq!(revalidated.calls(), 1);
}

#[tokio::test]
async fn test_mutation_forces_fresh_fetch() {
    let server = MockServer::start();
    let fresh = server.mock(|when, then| {
        when.method(GET).path("/repos/o/r").header_missing("if-none-match");
        then.status(200).header("etag", "\"v1\"").body("before");
    });
    let revalidated = server.mock(|when, then| {
        when.method(GET).path("/repos/o/r").header_exists("if-none-match");
        then.status(304);
    });
    let patch = server.mock(|when, then| {
        when.method(PATCH).path("/repos/o/r");
        then.status(200).body("patched");
    });

    let client = client();
    let url = format!("{}/repos/o/r", server.base_url());

    client.get(&url).send().await.unwrap().bytes().await.unwrap();
    client
        .patch(&url)
        .body_string(r#"{"private":true}"#.to_owned())
        .send()
        .await
        .unwrap();
    client.get(&url).send().await.unwrap().bytes().await.unwrap();

    assert_eq!(patch.calls(), 1);
    assert_eq!(fresh.calls(), 2);
    assert_eq!(revalidated.calls(), 0);
}

#[tokio::test]
async fn test_caller_supplied_validator_sees_not_modified() {
    let server = MockServer::start();
    let _m = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/o/r")
            .header("if-none-match", "\"mine\"");
        then.status(304);
    });

    let client = client();
    let resp = client
        .get(&format!("{}/repos/o/r", server.base_url()))
        .header("if-none-match", "\"mine\"")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), http::StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn test_disabled_cache_never_revalidates() {
    let server = MockServer::start();
    let fresh = server.mock(|when, then| {
        when.method(GET).path("/user").header_missing("if-none-match");
        then.status(200).header("etag", "\"u\"").body("me");
    });

    let client = TransportBuilder::with_config(TransportConfig::for_testing())
        .no_cache()
        .build()
        .unwrap();
    let url = format!("{}/user", server.base_url());
    client.get(&url).send().await.unwrap().bytes().await.unwrap();
    client.get(&url).send().await.unwrap().bytes().await.unwrap();

    assert_eq!(fresh.calls(), 2);
}

#[tokio::test]
async fn test_clients_do_not_share_cache() {
    let server = MockServer::start();
    let fresh = server.mock(|when, then| {
        when.method(GET).path("/user").header_missing("if-none-match");
        then.status(200).header("etag", "\"u\"").body("me");
    });

    let url = format!("{}/user", server.base_url());
    client().get(&url).send().await.unwrap().bytes().await.unwrap();
    client().get(&url).send().await.unwrap().bytes().await.unwrap();

    assert_eq!(fresh.calls(), 2);
}
