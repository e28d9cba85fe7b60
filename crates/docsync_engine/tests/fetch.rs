use std::time::Duration;

use docsync_engine::{FailureKind, FetchSettings, Fetcher, ReqwestFetcher};
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn local_settings() -> FetchSettings {
    FetchSettings {
        require_https: false,
        ..FetchSettings::default()
    }
    .with_allowed_hosts(["127.0.0.1"])
}

#[tokio::test]
async fn fetcher_returns_body_and_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doc"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<html>ok</html>", "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(local_settings());
    let url = format!("{}/doc", server.uri());

    let output = fetcher.fetch(&url).await.expect("fetch ok");
    assert_eq!(output.metadata.original_url, url);
    assert_eq!(output.metadata.final_url, url);
    assert_eq!(output.metadata.redirect_count, 0);
    assert_eq!(output.metadata.byte_len, 15);
    assert!(output
        .metadata
        .content_type
        .unwrap()
        .starts_with("text/html"));
    assert_eq!(&output.bytes[..], b"<html>ok</html>");
}

#[tokio::test]
async fn host_outside_allowlist_is_refused_before_any_request() {
    let server = MockServer::start().await;
    let settings = FetchSettings {
        require_https: false,
        ..FetchSettings::default()
    }
    .with_allowed_hosts(["docs.acme.dev"]);
    let fetcher = ReqwestFetcher::new(settings);

    let err = fetcher
        .fetch(&format!("{}/doc", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(
        err.kind,
        FailureKind::DomainNotAllowed {
            host: "127.0.0.1".into()
        }
    );
    let received = server.received_requests().await.unwrap_or_default();
    assert!(received.is_empty());
}

#[tokio::test]
async fn plain_http_is_refused_by_default() {
    let server = MockServer::start().await;
    let fetcher = ReqwestFetcher::new(FetchSettings::default().with_allowed_hosts(["127.0.0.1"]));

    let err = fetcher
        .fetch(&format!("{}/doc", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err.kind, FailureKind::DomainNotAllowed { .. }));
    assert!(err.message.contains("http"));
}

#[tokio::test]
async fn unparseable_url_is_invalid() {
    let fetcher = ReqwestFetcher::new(local_settings());
    let err = fetcher.fetch("not a url").await.unwrap_err();
    assert_eq!(err.kind, FailureKind::InvalidUrl);
}

#[tokio::test]
async fn redirect_to_foreign_host_is_refused() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/moved"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", "http://evil.example/steal"),
        )
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(local_settings());
    let err = fetcher
        .fetch(&format!("{}/moved", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(
        err.kind,
        FailureKind::DomainNotAllowed {
            host: "evil.example".into()
        }
    );
}

#[tokio::test]
async fn redirect_within_allowlist_is_followed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("Location", format!("{}/new", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("moved here", "text/plain"))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(local_settings());
    let output = fetcher
        .fetch(&format!("{}/old", server.uri()))
        .await
        .unwrap();
    assert_eq!(output.metadata.final_url, format!("{}/new", server.uri()));
    assert_eq!(output.metadata.redirect_count, 1);
    assert_eq!(&output.bytes[..], b"moved here");
}

#[tokio::test]
async fn fetcher_fails_on_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(local_settings());
    let err = fetcher
        .fetch(&format!("{}/missing", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::HttpStatus(404));
}

#[tokio::test]
async fn fetcher_times_out_on_slow_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(250))
                .set_body_string("slow"),
        )
        .mount(&server)
        .await;

    let settings = FetchSettings {
        request_timeout: Duration::from_millis(50),
        ..local_settings()
    };
    let fetcher = ReqwestFetcher::new(settings);

    let err = fetcher
        .fetch(&format!("{}/slow", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Timeout);
}

#[tokio::test]
async fn fetcher_rejects_too_large_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/large"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "text/html")
                .insert_header("Content-Length", "11")
                .set_body_string("01234567890"),
        )
        .mount(&server)
        .await;

    let settings = FetchSettings {
        max_bytes: 10,
        ..local_settings()
    };
    let fetcher = ReqwestFetcher::new(settings);

    let err = fetcher
        .fetch(&format!("{}/large", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(
        err.kind,
        FailureKind::SizeExceeded {
            max_bytes: 10,
            actual: Some(11)
        }
    );
}

#[tokio::test]
async fn connection_refused_is_a_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/gone", listener.local_addr().unwrap());
    drop(listener);

    let fetcher = ReqwestFetcher::new(local_settings());
    let err = fetcher.fetch(&url).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Network);
}
