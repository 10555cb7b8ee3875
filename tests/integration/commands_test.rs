// tests/integration/commands_test.rs

//! Typed key-value and hash operations over a command connection.

use super::fixtures::AWKWARD_PAYLOAD;
use super::fake_store::FakeStore;
use super::test_helpers::{TestContext, test_config, wait_until};
use pawn_redis::core::RespFrame;
use pawn_redis::config::ContextConfig;
use pawn_redis::RedisError;
use std::time::Duration;

#[test]
fn test_string_round_trip() {
    let t = TestContext::new();
    let h = t.connect();
    let cmd = t.ctx.commands();

    cmd.set_string(h, "motd", AWKWARD_PAYLOAD).unwrap();
    assert_eq!(cmd.get_string(h, "motd").unwrap(), AWKWARD_PAYLOAD);
    assert_eq!(t.store.get("motd").as_deref(), Some(AWKWARD_PAYLOAD));

    cmd.set_string(h, "motd", "").unwrap();
    assert_eq!(cmd.get_string(h, "motd").unwrap(), "");
}

#[test]
fn test_missing_key_is_no_reply() {
    let t = TestContext::new();
    let h = t.connect();
    let cmd = t.ctx.commands();
    assert_eq!(cmd.get_string(h, "nope"), Err(RedisError::NoReply));
    assert_eq!(cmd.get_int(h, "nope"), Err(RedisError::NoReply));
    assert_eq!(cmd.get_float(h, "nope"), Err(RedisError::NoReply));
    assert_eq!(cmd.get_hash_value(h, "nope", "f"), Err(RedisError::NoReply));
}

#[test]
fn test_int_round_trip() {
    let t = TestContext::new();
    let h = t.connect();
    let cmd = t.ctx.commands();
    for value in [0, 1, -1, 1337, i32::MAX, i32::MIN] {
        cmd.set_int(h, "n", value).unwrap();
        assert_eq!(cmd.get_int(h, "n"), Ok(value));
    }
    cmd.set_int(h, "n", -250).unwrap();
    assert_eq!(t.store.get("n").as_deref(), Some("-250"));
}

#[test]
fn test_float_round_trip() {
    let t = TestContext::new();
    let h = t.connect();
    let cmd = t.ctx.commands();
    for value in [0.0f32, 3.5, -12.25, 0.1, 1.0e-3, f32::MAX] {
        cmd.set_float(h, "x", value).unwrap();
        assert_eq!(cmd.get_float(h, "x"), Ok(value));
    }
}

#[test]
fn test_unparseable_numbers_decode_to_zero() {
    let t = TestContext::new();
    let h = t.connect();
    let cmd = t.ctx.commands();
    t.store.put("name", "Carl");
    assert_eq!(cmd.get_int(h, "name"), Ok(0));
    assert_eq!(cmd.get_float(h, "name"), Ok(0.0));

    t.store.put("padded", " 42 ");
    assert_eq!(cmd.get_int(h, "padded"), Ok(42));
    // A fractional value is not an int.
    t.store.put("half", "2.5");
    assert_eq!(cmd.get_int(h, "half"), Ok(0));
    assert_eq!(cmd.get_float(h, "half"), Ok(2.5));
}

#[test]
fn test_exists_and_delete() {
    let t = TestContext::new();
    let h = t.connect();
    let cmd = t.ctx.commands();
    assert_eq!(cmd.exists(h, "k"), Ok(false));
    cmd.set_int(h, "k", 1).unwrap();
    assert_eq!(cmd.exists(h, "k"), Ok(true));
    assert_eq!(cmd.delete(h, "k"), Ok(1));
    assert_eq!(cmd.delete(h, "k"), Ok(0));
    assert_eq!(cmd.exists(h, "k"), Ok(false));
}

#[test]
fn test_hash_string_fields() {
    let t = TestContext::new();
    let h = t.connect();
    let cmd = t.ctx.commands();
    cmd.set_hash_value(h, "player:1", "name", "Carl").unwrap();
    cmd.set_hash_value(h, "player:1", "name", "CJ").unwrap();
    assert_eq!(cmd.get_hash_value(h, "player:1", "name").unwrap(), "CJ");
    assert_eq!(
        cmd.get_hash_value(h, "player:1", "clan"),
        Err(RedisError::NoReply)
    );
}

#[test]
fn test_hash_typed_fields() {
    let t = TestContext::new();
    let h = t.connect();
    let cmd = t.ctx.commands();
    cmd.set_hash_int(h, "player:1", "money", 5000).unwrap();
    cmd.set_hash_float(h, "player:1", "health", 87.5).unwrap();
    assert_eq!(cmd.get_hash_int(h, "player:1", "money"), Ok(5000));
    assert_eq!(cmd.get_hash_float(h, "player:1", "health"), Ok(87.5));

    cmd.set_hash_value(h, "player:1", "name", "CJ").unwrap();
    assert_eq!(cmd.get_hash_int(h, "player:1", "name"), Ok(0));
}

#[test]
fn test_hash_incr() {
    let t = TestContext::new();
    let h = t.connect();
    let cmd = t.ctx.commands();
    assert_eq!(cmd.hash_incr(h, "stats", "kills", 1), Ok(1));
    assert_eq!(cmd.hash_incr(h, "stats", "kills", 4), Ok(5));
    assert_eq!(cmd.hash_incr(h, "stats", "kills", -10), Ok(-5));
    assert_eq!(cmd.get_hash_int(h, "stats", "kills"), Ok(-5));

    cmd.set_hash_value(h, "stats", "rank", "gold").unwrap();
    let err = cmd.hash_incr(h, "stats", "rank", 1).unwrap_err();
    assert!(matches!(err, RedisError::BadReply(_)), "{err:?}");
}

#[test]
fn test_hash_exists_and_delete() {
    let t = TestContext::new();
    let h = t.connect();
    let cmd = t.ctx.commands();
    assert_eq!(cmd.hash_exists(h, "house:3", "owner"), Ok(false));
    cmd.set_hash_value(h, "house:3", "owner", "Ryder").unwrap();
    assert_eq!(cmd.hash_exists(h, "house:3", "owner"), Ok(true));
    assert_eq!(cmd.hash_delete(h, "house:3", "owner"), Ok(true));
    assert_eq!(cmd.hash_delete(h, "house:3", "owner"), Ok(false));
    assert_eq!(cmd.hash_exists(h, "house:3", "owner"), Ok(false));
}

#[test]
fn test_multi_field_hashes() {
    let t = TestContext::new();
    let h = t.connect();
    let cmd = t.ctx.commands();
    let created = cmd
        .set_hash_values(h, "veh:9", &[("model", "411"), ("color", "1"), ("owner", "Sweet")])
        .unwrap();
    assert_eq!(created, 3);
    let created = cmd
        .set_hash_values(h, "veh:9", &[("color", "6"), ("plate", "GROVE")])
        .unwrap();
    assert_eq!(created, 1);

    let mut fields = cmd.get_hash_values(h, "veh:9").unwrap();
    fields.sort();
    let expected: Vec<(String, String)> = [("color", "6"), ("model", "411"), ("owner", "Sweet"), ("plate", "GROVE")]
        .iter()
        .map(|(f, v)| (f.to_string(), v.to_string()))
        .collect();
    assert_eq!(fields, expected);

    assert_eq!(cmd.get_hash_values(h, "veh:missing"), Ok(Vec::new()));
}

#[test]
fn test_wrong_type_is_bad_reply() {
    let t = TestContext::new();
    let h = t.connect();
    let cmd = t.ctx.commands();
    cmd.set_hash_value(h, "player:1", "name", "CJ").unwrap();
    let err = cmd.get_string(h, "player:1").unwrap_err();
    assert_eq!(err.code(), 3);
}

#[test]
fn test_raw_command() {
    let t = TestContext::new();
    let h = t.connect();
    let cmd = t.ctx.commands();
    assert_eq!(
        cmd.command(h, "SET greeting hello"),
        Ok(RespFrame::SimpleString("OK".to_string()))
    );
    assert_eq!(cmd.get_string(h, "greeting").unwrap(), "hello");
    assert_eq!(cmd.command(h, "  EXISTS   greeting "), Ok(RespFrame::Integer(1)));
    assert_eq!(cmd.command(h, "GET nothing"), Ok(RespFrame::Null));
}

#[test]
fn test_raw_command_errors() {
    let t = TestContext::new();
    let h = t.connect();
    let cmd = t.ctx.commands();
    assert!(matches!(cmd.command(h, ""), Err(RedisError::BadReply(_))));
    assert!(matches!(cmd.command(h, "   "), Err(RedisError::BadReply(_))));
    assert!(matches!(cmd.command(h, "FROBNICATE x"), Err(RedisError::BadReply(_))));
    // The link survives an error reply.
    assert!(cmd.ping(h).is_ok());
}

#[test]
fn test_publish_without_subscribers() {
    let t = TestContext::new();
    let h = t.connect();
    assert_eq!(t.ctx.commands().publish(h, "news", "hello"), Ok(0));
}

#[test]
fn test_connections_are_independent() {
    let t = TestContext::new();
    let a = t.connect();
    let b = t.connect();
    t.ctx.commands().set_int(a, "shared", 10).unwrap();
    assert_eq!(t.ctx.commands().get_int(b, "shared"), Ok(10));
    t.ctx.disconnect(a).unwrap();
    assert_eq!(t.ctx.commands().get_int(b, "shared"), Ok(10));
}

#[test]
fn test_store_going_away_is_transport_error() {
    let t = TestContext::new();
    let h = t.connect();
    t.ctx.commands().ping(h).unwrap();
    t.store.kick_all();
    let err = super::test_helpers::wait_for_err(|| t.ctx.commands().ping(h));
    assert!(err.is_transport(), "{err:?}");
    assert_eq!(err.code(), -4);
    // The handle itself stays registered until disconnected.
    assert!(t.ctx.disconnect(h).is_ok());
}

#[test]
fn test_timed_out_request_drops_the_link() {
    let config = ContextConfig {
        request_timeout: Some(Duration::from_millis(100)),
        ..test_config()
    };
    let t = TestContext::with_config(FakeStore::start(), &config);
    let h = t.connect();
    let other = t.connect();
    let cmd = t.ctx.commands();

    let err = cmd.command(h, "BLPOP q 0").unwrap_err();
    assert_eq!(err.code(), -4);
    // The abandoned pop must not take the next push.
    assert!(wait_until(Duration::from_secs(5), || t.store.blocked_pops() == 0));
    cmd.send_message(other, "q", "stale").unwrap();
    cmd.set_string(other, "k", "v").unwrap();

    assert_eq!(cmd.ping(h), Err(RedisError::MissingConnection(h)));
    assert_eq!(cmd.get_string(h, "k"), Err(RedisError::MissingConnection(h)));
    assert_eq!(t.store.list_len("q"), 1);
    assert_eq!(cmd.get_string(other, "k").unwrap(), "v");
    assert!(t.ctx.disconnect(h).is_ok());
    assert_eq!(cmd.ping(h), Err(RedisError::InvalidHandle(h)));
}
