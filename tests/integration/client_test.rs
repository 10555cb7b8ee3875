// tests/integration/client_test.rs

//! The async store client, driven directly.

use super::fake_store::FakeStore;
use super::fixtures::{LOCALHOST, PASSWORD};
use pawn_redis::RedisError;
use pawn_redis::core::client::{ClientOptions, Endpoint, StoreClient};
use pawn_redis::core::protocol::{ReplyExt, RespFrame};
use std::time::{Duration, Instant};

fn endpoint(store: &FakeStore, auth: &str) -> Endpoint {
    Endpoint::new(LOCALHOST, i32::from(store.port()), auth).unwrap()
}

#[test]
fn test_call_and_close() {
    let store = FakeStore::start();
    tokio_test::block_on(async {
        let mut client = StoreClient::connect(&endpoint(&store, ""), &ClientOptions::default())
            .await
            .unwrap();
        let reply = client.call(["SET", "k", "v"]).await.unwrap();
        assert_eq!(reply.expect_status(), Ok("OK".to_string()));
        let reply = client.call(["GET", "k"]).await.unwrap();
        assert_eq!(reply, RespFrame::BulkString("v".into()));
        client.close().await;
    });
    assert_eq!(store.get("k").as_deref(), Some("v"));
}

#[test]
fn test_auth_outcomes() {
    let store = FakeStore::with_password(PASSWORD);
    tokio_test::block_on(async {
        let options = ClientOptions::default();
        assert!(StoreClient::connect(&endpoint(&store, PASSWORD), &options).await.is_ok());
        let err = StoreClient::connect(&endpoint(&store, "wrong"), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, RedisError::ConnectAuth(_)), "{err:?}");
    });
}

#[test]
fn test_request_timeout_is_transport_error() {
    let store = FakeStore::start();
    tokio_test::block_on(async {
        let options = ClientOptions {
            request_timeout: Some(Duration::from_millis(100)),
            ..Default::default()
        };
        let mut client = StoreClient::connect(&endpoint(&store, ""), &options).await.unwrap();
        // Nothing will ever be pushed to this list.
        let err = client.call(["BLPOP", "never", "0"]).await.unwrap_err();
        assert_eq!(err, RedisError::Transport(String::new()));
        assert_eq!(err.code(), -4);
    });
}

#[test]
fn test_connect_is_bounded_by_connect_timeout() {
    tokio_test::block_on(async {
        let options = ClientOptions {
            connect_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        // A non-routable address never answers the SYN.
        let endpoint = Endpoint::new("10.255.255.1", 6379, "").unwrap();
        let started = Instant::now();
        let err = StoreClient::connect(&endpoint, &options).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
        assert_eq!(err.code(), -1, "{err:?}");
    });
}

#[test]
fn test_peer_close_is_reported() {
    let store = FakeStore::start();
    tokio_test::block_on(async {
        let mut client = StoreClient::connect(&endpoint(&store, ""), &ClientOptions::default())
            .await
            .unwrap();
        // Make sure the store has accepted the link before cutting it.
        client.call(["PING"]).await.unwrap();
        store.kick_all();
        let err = client.next_frame().await.unwrap_err();
        assert!(err.is_transport(), "{err:?}");
    });
}

#[test]
fn test_endpoint_validation_and_redaction() {
    let ep = Endpoint::new("localhost", 6379, "s3cret").unwrap();
    assert_eq!(ep.to_string(), "localhost:6379");
    assert_eq!(ep.auth.as_deref(), Some("s3cret"));
    assert!(!format!("{ep:?}").contains("s3cret"));

    assert_eq!(Endpoint::new("localhost", 6379, "").unwrap().auth, None);
    assert!(matches!(Endpoint::new("localhost", 65536, ""), Err(RedisError::ConnectFail(_))));
}
