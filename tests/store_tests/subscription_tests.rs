//! Tests for key subscriptions
//!
//! These tests verify:
//! - Subscribe/unsubscribe rules (missing key, full set, idempotence)
//! - Notification content and ordering
//! - Delivery to healthy subscribers when another one is broken
//! - Session-level subscription lists and teardown
//! - A blocked notification sink only stalls its own shard

use std::io::{self, Write};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver};
use pipekv::network::{pipe, PipeReader, SessionRegistry};
use pipekv::protocol::{read_notification, Notification};
use pipekv::store::{Notifier, SessionId, Store};
use pipekv::KvsError;

// =============================================================================
// Helper Functions
// =============================================================================

fn notifier(id: u64) -> (Arc<Notifier>, PipeReader) {
    let (writer, reader) = pipe();
    (Arc::new(Notifier::new(SessionId(id), Box::new(writer))), reader)
}

fn next(reader: &mut PipeReader) -> Notification {
    read_notification(reader).unwrap().unwrap()
}

fn updated(key: &str, value: &str) -> Notification {
    Notification::Updated {
        key: key.into(),
        value: value.into(),
    }
}

/// Sink whose writes block until the test releases them
struct GatedSink {
    gate: Receiver<()>,
    entered: mpsc::Sender<()>,
}

impl Write for GatedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = self.entered.send(());
        let _ = self.gate.recv();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// =============================================================================
// Store Subscription Tests
// =============================================================================

#[test]
fn test_subscribe_missing_key_fails() {
    let store = Store::default();
    let (n, _reader) = notifier(1);
    assert!(matches!(store.subscribe("ghost", &n), Err(KvsError::KeyNotFound)));
}

#[test]
fn test_write_and_delete_notify_in_order() {
    let store = Store::default();
    store.write("k", "0").unwrap();

    let (n, mut reader) = notifier(1);
    store.subscribe("k", &n).unwrap();

    store.write("k", "1").unwrap();
    store.write("k", "2").unwrap();
    store.delete("k").unwrap();

    assert_eq!(next(&mut reader), updated("k", "1"));
    assert_eq!(next(&mut reader), updated("k", "2"));
    assert_eq!(next(&mut reader), Notification::Deleted { key: "k".into() });
}

#[test]
fn test_batch_writes_notify_subscribers() {
    let store = Store::default();
    store.write("a", "0").unwrap();
    store.write("b", "0").unwrap();

    let (n, mut reader) = notifier(1);
    store.subscribe("a", &n).unwrap();
    store.subscribe("b", &n).unwrap();

    store
        .write_batch(&[("b".into(), "2".into()), ("a".into(), "1".into())])
        .unwrap();

    assert_eq!(next(&mut reader), updated("a", "1"));
    assert_eq!(next(&mut reader), updated("b", "2"));
}

#[test]
fn test_unsubscribed_session_gets_nothing() {
    let store = Store::default();
    store.write("k", "0").unwrap();

    let (n, mut reader) = notifier(1);
    store.subscribe("k", &n).unwrap();
    store.unsubscribe("k", SessionId(1)).unwrap();
    assert_eq!(store.subscriber_count("k"), 0);

    store.write("k", "1").unwrap();
    drop(n);
    assert!(read_notification(&mut reader).unwrap().is_none());
}

#[test]
fn test_unsubscribe_is_idempotent_but_needs_entry() {
    let store = Store::default();
    store.write("k", "0").unwrap();
    store.unsubscribe("k", SessionId(9)).unwrap();
    store.unsubscribe("k", SessionId(9)).unwrap();
    assert!(matches!(
        store.unsubscribe("missing", SessionId(9)),
        Err(KvsError::KeyNotFound)
    ));
}

#[test]
fn test_double_subscribe_takes_one_slot() {
    let store = Store::default();
    store.write("k", "0").unwrap();
    let (n, _reader) = notifier(1);

    store.subscribe("k", &n).unwrap();
    store.subscribe("k", &n).unwrap();
    assert_eq!(store.subscriber_count("k"), 1);
    assert!(store.is_subscribed("k", SessionId(1)));
}

#[test]
fn test_full_subscriber_set_is_reported() {
    let store = Store::new(2);
    store.write("k", "0").unwrap();

    let (a, _ra) = notifier(1);
    let (b, _rb) = notifier(2);
    let (c, _rc) = notifier(3);
    store.subscribe("k", &a).unwrap();
    store.subscribe("k", &b).unwrap();

    assert!(matches!(store.subscribe("k", &c), Err(KvsError::SubscribersFull(_))));
    assert_eq!(store.subscriber_count("k"), 2);
}

#[test]
fn test_delete_discards_subscribers() {
    let store = Store::default();
    store.write("k", "0").unwrap();
    let (n, _reader) = notifier(1);
    store.subscribe("k", &n).unwrap();

    store.delete("k").unwrap();
    store.write("k", "again").unwrap();
    assert_eq!(store.subscriber_count("k"), 0);
}

#[test]
fn test_broken_subscriber_does_not_block_others() {
    let store = Store::default();
    store.write("k", "0").unwrap();

    let (broken, broken_reader) = notifier(1);
    let (healthy, mut healthy_reader) = notifier(2);
    store.subscribe("k", &broken).unwrap();
    store.subscribe("k", &healthy).unwrap();
    drop(broken_reader);

    store.write("k", "1").unwrap();
    assert_eq!(next(&mut healthy_reader), updated("k", "1"));
}

#[test]
fn test_closed_notifier_fails_with_broken_pipe() {
    let (n, _reader) = notifier(1);
    n.close();
    assert!(n.is_closed());
    let err = n.notify(&updated("k", "v")).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
}

#[test]
fn test_blocked_sink_stalls_only_its_shard() {
    let store = Arc::new(Store::default());
    store.write("a", "0").unwrap();
    store.write("b", "0").unwrap();

    let (release, gate) = channel::unbounded();
    let (entered_tx, entered_rx) = mpsc::channel();
    let sink = GatedSink {
        gate,
        entered: entered_tx,
    };
    let n = Arc::new(Notifier::new(SessionId(1), Box::new(sink)));
    store.subscribe("a", &n).unwrap();

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || store.write("a", "1").unwrap())
    };
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    // Shard "a" is held by the blocked notification; shard "b" is free
    store.write("b", "1").unwrap();
    assert_eq!(store.read("b").unwrap(), Some("1".to_string()));

    release.send(()).unwrap();
    writer.join().unwrap();
    assert_eq!(store.read("a").unwrap(), Some("1".to_string()));
}

// =============================================================================
// Session Subscription Tests
// =============================================================================

#[test]
fn test_session_subscription_limit() {
    let store = Store::default();
    let registry = SessionRegistry::new();
    let (writer, _reader) = pipe();
    let session = registry.register(Box::new(writer), 2);

    for k in ["a", "b", "c"] {
        store.write(k, "0").unwrap();
    }
    session.subscribe(&store, "a").unwrap();
    session.subscribe(&store, "b").unwrap();
    session.subscribe(&store, "a").unwrap();

    assert!(matches!(
        session.subscribe(&store, "c"),
        Err(KvsError::SubscriptionLimit(2))
    ));
    assert_eq!(session.subscriptions(), vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn test_failed_subscribe_is_not_listed() {
    let store = Store::default();
    let registry = SessionRegistry::new();
    let (writer, _reader) = pipe();
    let session = registry.register(Box::new(writer), 4);

    assert!(session.subscribe(&store, "missing").is_err());
    assert!(session.subscriptions().is_empty());
}

#[test]
fn test_unsubscribe_after_delete_clears_list() {
    let store = Store::default();
    let registry = SessionRegistry::new();
    let (writer, _reader) = pipe();
    let session = registry.register(Box::new(writer), 4);

    store.write("k", "0").unwrap();
    session.subscribe(&store, "k").unwrap();
    store.delete("k").unwrap();

    assert!(matches!(session.unsubscribe(&store, "k"), Err(KvsError::KeyNotFound)));
    assert!(session.subscriptions().is_empty());
}

#[test]
fn test_release_leaves_no_dangling_subscribers() {
    let store = Store::default();
    let registry = SessionRegistry::new();
    let (writer, _reader) = pipe();
    let session = registry.register(Box::new(writer), 10);

    for k in ["a", "b", "c"] {
        store.write(k, "0").unwrap();
        session.subscribe(&store, k).unwrap();
    }
    store.delete("b").unwrap();

    assert_eq!(session.release(&store), 3);
    for k in ["a", "c"] {
        assert!(!store.is_subscribed(k, session.id()));
    }
    assert!(session.subscriptions().is_empty());
}

#[test]
fn test_disconnect_all_terminates_every_session() {
    let store = Store::default();
    let registry = SessionRegistry::new();
    store.write("k", "0").unwrap();

    let mut readers = Vec::new();
    let mut sessions = Vec::new();
    for _ in 0..3 {
        let (writer, reader) = pipe();
        let session = registry.register(Box::new(writer), 10);
        session.subscribe(&store, "k").unwrap();
        readers.push(reader);
        sessions.push(session);
    }
    assert_eq!(store.subscriber_count("k"), 3);

    assert_eq!(registry.disconnect_all(&store), 3);
    assert_eq!(store.subscriber_count("k"), 0);
    for session in &sessions {
        assert!(session.is_terminated());
        assert!(session.notifier().is_closed());
        assert!(session.subscribe(&store, "k").is_err());
    }
    for reader in &mut readers {
        assert!(read_notification(reader).unwrap().is_none());
    }
}
