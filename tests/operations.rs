//! Object-operation integration tests against a mock sproxyd connector.

use std::time::Duration;

use futures_util::StreamExt;
use serde_json::json;
use sproxyd_client::{ObjectStream, SproxydClient, SproxydConfig, SproxydError};

mod common;

fn client_for(endpoints: Vec<String>) -> SproxydClient {
    let config = SproxydConfig {
        endpoints,
        ping_interval_secs: 0.05,
        ..Default::default()
    };
    SproxydClient::new(&config).expect("client construction")
}

async fn collect(mut stream: ObjectStream) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk.expect("stream chunk"));
    }
    out
}

#[tokio::test]
async fn metadata_round_trips() {
    let mock = common::start_mock_sproxyd(true).await;
    let client = client_for(vec![mock.endpoint_url()]);

    let metadata = json!({"etag": "d41d8cd98f00b204", "size": 1024});
    client.put_meta("acct/cont/obj", &metadata).await.unwrap();

    let fetched = client.get_meta("acct/cont/obj").await.unwrap();
    assert_eq!(fetched, Some(metadata));
}

#[tokio::test]
async fn get_meta_of_absent_object_is_none() {
    let mock = common::start_mock_sproxyd(true).await;
    let client = client_for(vec![mock.endpoint_url()]);

    assert_eq!(client.get_meta("no/such/object").await.unwrap(), None);
}

#[tokio::test]
async fn put_meta_rejects_null_before_any_network_call() {
    let mock = common::start_mock_sproxyd(true).await;
    let client = client_for(vec![mock.endpoint_url()]);

    match client.put_meta("x", &json!(null)).await {
        Err(SproxydError::MissingMetadata) => {}
        other => panic!("expected MissingMetadata, got {other:?}"),
    }
    assert_eq!(mock.state.object_hits(), 0);
}

#[tokio::test]
async fn delete_is_idempotent() {
    let mock = common::start_mock_sproxyd(true).await;
    mock.state.seed_object("acct/obj", b"payload");
    let client = client_for(vec![mock.endpoint_url()]);

    client.del_object("acct/obj").await.unwrap();
    // Second delete sees a 404, which is success all the same.
    client.del_object("acct/obj").await.unwrap();
}

#[tokio::test]
async fn object_write_then_read_round_trips() {
    let mock = common::start_mock_sproxyd(true).await;
    let client = client_for(vec![mock.endpoint_url()]);

    let mut writer = client.put_object("acct/cont/obj").unwrap();
    writer.write(&b"hello "[..]).await.unwrap();
    let total = writer.write(&b"world"[..]).await.unwrap();
    assert_eq!(total, 11);
    let uploaded = writer.finish(&json!({"etag": "abc"})).await.unwrap();
    assert_eq!(uploaded, 11);

    let stream = client.get_object("acct/cont/obj", None).await.unwrap();
    assert_eq!(collect(stream).await, b"hello world");

    // finish() stored metadata with the object name folded in.
    let metadata = client.get_meta("acct/cont/obj").await.unwrap().unwrap();
    assert_eq!(metadata["etag"], "abc");
    assert_eq!(metadata["name"], "acct/cont/obj");
}

#[tokio::test]
async fn ranged_read_returns_partial_content() {
    let mock = common::start_mock_sproxyd(true).await;
    let content: Vec<u8> = (0u8..100).collect();
    mock.state.seed_object("blob", &content);
    let client = client_for(vec![mock.endpoint_url()]);

    let stream = client.get_object("blob", Some((10, 19))).await.unwrap();
    assert_eq!(collect(stream).await, &content[10..20]);
}

#[tokio::test]
async fn unexpected_status_becomes_typed_http_error() {
    let mock = common::start_mock_sproxyd(true).await;
    let client = client_for(vec![mock.endpoint_url()]);

    match client.get_object("boom", None).await {
        Err(SproxydError::Http {
            op,
            endpoint,
            status,
            body,
            ..
        }) => {
            assert_eq!(op, "get_object");
            assert_eq!(status, 500);
            assert_eq!(body, "kaboom");
            assert!(endpoint.contains(&mock.addr.to_string()));
        }
        other => panic!("expected Http error, got {other:?}"),
    }
}

#[tokio::test]
async fn operations_fail_fast_once_all_endpoints_are_down() {
    // Grab an ephemeral port and release it so nothing listens there.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client_for(vec![format!("http://{addr}/proxy/chord")]);
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(!client.has_alive_endpoints());
    match client.get_meta("x").await {
        Err(SproxydError::NoEndpointAvailable) => {}
        other => panic!("expected NoEndpointAvailable, got {other:?}"),
    }
}
