use std::time::Duration;

use bytes::Bytes;
use futures::TryStreamExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use symproxy::http::{Method, StatusCode};
use symproxy::origin::{HttpOrigin, Origin, OriginError, OriginOptions, USER_AGENT};

const NTDLL: &str = "/ntdll.pdb/1A2B3C4D5E/ntdll.pdb";

fn origin(base: &str) -> HttpOrigin {
    HttpOrigin::new(base, &OriginOptions::default()).unwrap()
}

async fn collect(body: symproxy::http::BodyStream) -> Bytes {
    let chunks: Vec<Bytes> = body.try_collect().await.unwrap();
    chunks.concat().into()
}

#[tokio::test]
async fn fetches_artifact_with_identity_encoding_and_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/download/symbols{NTDLL}")))
        .and(header("user-agent", USER_AGENT))
        .and(header("accept-encoding", "identity"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PDB-BYTES".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let origin = origin(&format!("{}/download/symbols/", server.uri()));
    let response = origin.fetch(&Method::Get, NTDLL).await.unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.content_length, Some(9));
    assert_eq!(collect(response.body).await, Bytes::from_static(b"PDB-BYTES"));
}

#[tokio::test]
async fn follows_redirects_to_the_final_artifact() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(NTDLL))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", format!("{}/blob/ntdll", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/blob/ntdll"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"redirected".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let response = origin(&server.uri()).fetch(&Method::Get, NTDLL).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(collect(response.body).await, Bytes::from_static(b"redirected"));
}

#[tokio::test]
async fn error_statuses_are_passed_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.pdb/00/missing.pdb"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken.pdb/00/broken.pdb"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let origin = origin(&server.uri());
    let missing = origin.fetch(&Method::Get, "/missing.pdb/00/missing.pdb").await.unwrap();
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(collect(missing.body).await, Bytes::from_static(b"not here"));

    let broken = origin.fetch(&Method::Get, "/broken.pdb/00/broken.pdb").await.unwrap();
    assert_eq!(broken.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn head_is_sent_upstream_as_head() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path(NTDLL))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let response = origin(&server.uri()).fetch(&Method::Head, NTDLL).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert!(collect(response.body).await.is_empty());
}

#[tokio::test]
async fn slow_upstream_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let options = OriginOptions {
        timeout: Duration::from_millis(200),
        ..OriginOptions::default()
    };
    let origin = HttpOrigin::new(server.uri(), &options).unwrap();
    let err = origin.fetch(&Method::Get, NTDLL).await.unwrap_err();
    assert!(matches!(err, OriginError::Timeout { .. }), "{err:?}");
}

#[tokio::test]
async fn refused_connection_is_a_connect_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = origin(&format!("http://{addr}"))
        .fetch(&Method::Get, NTDLL)
        .await
        .unwrap_err();
    assert!(matches!(err, OriginError::Connect { .. }), "{err:?}");
}
