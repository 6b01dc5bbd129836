//! Tests for client sessions
//!
//! These tests verify:
//! - Admission acknowledgement and request/response exchange
//! - Notifications delivered on the separate channel
//! - Cleanup on DISCONNECT, on peer close, and on forced teardown
//! - Forced teardown frees session workers for queued clients
//! - Session end reasons when driven directly

use std::io::Read;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pipekv::network::{
    pipe, MemoryChannels, PipeReader, PipeWriter, Server, Session, SessionEnd, SessionRegistry,
    SessionState,
};
use pipekv::protocol::{
    read_response, write_request, ConnectRequest, Notification, Request, Response,
};
use pipekv::store::SessionId;
use pipekv::{Client, Config, NotificationReader, Store};

// =============================================================================
// Helper Functions
// =============================================================================

struct Harness {
    channels: Arc<MemoryChannels>,
    store: Arc<Store>,
    server: Server,
}

impl Harness {
    fn new(config: Config, store: Store) -> Self {
        let channels = Arc::new(MemoryChannels::new());
        let store = Arc::new(store);
        let mut server = Server::new(
            config,
            Arc::clone(&store),
            Arc::new(SessionRegistry::new()),
            channels.clone(),
        );
        server.start().unwrap();
        Self {
            channels,
            store,
            server,
        }
    }

    fn with_defaults() -> Self {
        Self::new(Config::default(), Store::default())
    }

    /// Create the client's channels, queue the connection, and wait for
    /// the admission reply
    fn connect(&self, id: usize) -> (Client<PipeReader, PipeWriter>, NotificationReader<PipeReader>) {
        let request = ConnectRequest::new(
            format!("req{}", id),
            format!("resp{}", id),
            format!("notif{}", id),
        );
        for name in [&request.request, &request.response, &request.notification] {
            self.channels.create(name);
        }
        let requests = self.channels.take_writer(&request.request).unwrap();
        let responses = self.channels.take_reader(&request.response).unwrap();
        let notifications = self.channels.take_reader(&request.notification).unwrap();

        self.server.admit(request).unwrap();

        let mut client = Client::new(requests, responses);
        client.await_admission().unwrap();
        (client, NotificationReader::new(notifications))
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within 5s");
        thread::sleep(Duration::from_millis(10));
    }
}

// =============================================================================
// Request/Response Tests
// =============================================================================

#[test]
fn test_subscribe_and_receive_notifications() {
    let harness = Harness::with_defaults();
    harness.store.write("k", "0").unwrap();

    let (mut client, mut notifications) = harness.connect(1);
    assert!(client.subscribe("k").unwrap());

    harness.store.write("k", "1").unwrap();
    harness.store.delete("k").unwrap();

    assert_eq!(
        notifications.next().unwrap(),
        Some(Notification::Updated {
            key: "k".into(),
            value: "1".into()
        })
    );
    assert_eq!(
        notifications.next().unwrap(),
        Some(Notification::Deleted { key: "k".into() })
    );

    assert!(client.disconnect().unwrap());
    assert_eq!(notifications.next().unwrap(), None);
    harness.server.shutdown();
}

#[test]
fn test_subscribe_missing_key_replies_error() {
    let harness = Harness::with_defaults();
    let (mut client, _notifications) = harness.connect(1);

    assert!(!client.subscribe("missing").unwrap());
    assert!(!client.unsubscribe("missing").unwrap());

    assert!(client.disconnect().unwrap());
    harness.server.shutdown();
}

#[test]
fn test_unsubscribe_stops_notifications() {
    let harness = Harness::with_defaults();
    harness.store.write("a", "0").unwrap();
    harness.store.write("b", "0").unwrap();

    let (mut client, mut notifications) = harness.connect(1);
    assert!(client.subscribe("a").unwrap());
    assert!(client.subscribe("b").unwrap());
    assert!(client.unsubscribe("a").unwrap());

    harness.store.write("a", "1").unwrap();
    harness.store.write("b", "1").unwrap();

    // Only "b" is still watched
    assert_eq!(
        notifications.next().unwrap(),
        Some(Notification::Updated {
            key: "b".into(),
            value: "1".into()
        })
    );

    client.disconnect().unwrap();
    harness.server.shutdown();
}

#[test]
fn test_unknown_op_code_keeps_session_serving() {
    let harness = Harness::with_defaults();
    harness.store.write("k", "0").unwrap();
    let (mut client, _notifications) = harness.connect(1);

    let reply = client.roundtrip(&Request::Unknown { code: 7 }).unwrap();
    assert_eq!(reply, Response::error(7));
    assert!(client.subscribe("k").unwrap());

    // Wider codes do not fit a response frame and come back as 0
    for code in [42, 200] {
        let reply = client.roundtrip(&Request::Unknown { code }).unwrap();
        assert_eq!(reply, Response::error(0));
        assert!(client.unsubscribe("k").unwrap());
        assert!(client.subscribe("k").unwrap());
    }

    client.disconnect().unwrap();
    harness.server.shutdown();
}

#[test]
fn test_full_subscriber_set_replies_error() {
    let config = Config::builder().max_sessions(2).build();
    let harness = Harness::new(config, Store::new(1));
    harness.store.write("k", "0").unwrap();

    let (mut first, _n1) = harness.connect(1);
    let (mut second, _n2) = harness.connect(2);

    assert!(first.subscribe("k").unwrap());
    assert!(!second.subscribe("k").unwrap());
    assert_eq!(harness.store.subscriber_count("k"), 1);

    first.disconnect().unwrap();
    second.disconnect().unwrap();
    harness.server.shutdown();
}

#[test]
fn test_session_subscription_limit_replies_error() {
    let config = Config::builder().max_subscriptions(1).build();
    let harness = Harness::new(config, Store::default());
    harness.store.write("a", "0").unwrap();
    harness.store.write("b", "0").unwrap();

    let (mut client, _notifications) = harness.connect(1);
    assert!(client.subscribe("a").unwrap());
    assert!(!client.subscribe("b").unwrap());

    client.disconnect().unwrap();
    harness.server.shutdown();
}

// =============================================================================
// Cleanup Tests
// =============================================================================

#[test]
fn test_disconnect_releases_subscriptions() {
    let harness = Harness::with_defaults();
    for k in ["a", "b", "c"] {
        harness.store.write(k, "0").unwrap();
    }

    let (mut client, _notifications) = harness.connect(1);
    for k in ["a", "b", "c"] {
        assert!(client.subscribe(k).unwrap());
    }
    client.disconnect().unwrap();

    wait_until(|| harness.server.live_sessions() == 0);
    for k in ["a", "b", "c"] {
        assert_eq!(harness.store.subscriber_count(k), 0);
    }
    harness.server.shutdown();
}

#[test]
fn test_peer_close_releases_subscriptions() {
    let harness = Harness::with_defaults();
    harness.store.write("k", "0").unwrap();

    let (mut client, notifications) = harness.connect(1);
    assert!(client.subscribe("k").unwrap());
    assert_eq!(harness.store.subscriber_count("k"), 1);

    // Closing the request channel without DISCONNECT
    drop(client);
    drop(notifications);

    wait_until(|| harness.store.subscriber_count("k") == 0);
    wait_until(|| harness.server.live_sessions() == 0);

    // Writes after teardown target nobody
    harness.store.write("k", "1").unwrap();
    harness.server.shutdown();
}

#[test]
fn test_disconnect_all_tears_down_sessions() {
    let harness = Harness::with_defaults();
    harness.store.write("k", "0").unwrap();

    let (mut first, mut n1) = harness.connect(1);
    let (mut second, mut n2) = harness.connect(2);
    assert!(first.subscribe("k").unwrap());
    assert!(second.subscribe("k").unwrap());

    assert_eq!(harness.server.disconnect_all(), 2);
    assert_eq!(harness.store.subscriber_count("k"), 0);
    assert_eq!(n1.next().unwrap(), None);
    assert_eq!(n2.next().unwrap(), None);

    // The sessions have closed their channels
    assert!(first.subscribe("k").is_err());
    assert!(second.subscribe("k").is_err());

    wait_until(|| harness.server.live_sessions() == 0);
    harness.server.shutdown();
}

#[test]
fn test_disconnect_all_frees_worker_for_queued_client() {
    let config = Config::builder().max_sessions(1).build();
    let harness = Harness::new(config, Store::default());
    harness.store.write("k", "0").unwrap();

    // Idle: never sends another request
    let (_idle, mut idle_notifications) = harness.connect(1);
    assert_eq!(harness.server.live_sessions(), 1);

    let queued = ConnectRequest::new("req2", "resp2", "notif2");
    for name in ["req2", "resp2", "notif2"] {
        harness.channels.create(name);
    }
    let mut client = Client::new(
        harness.channels.take_writer("req2").unwrap(),
        harness.channels.take_reader("resp2").unwrap(),
    );
    harness.server.admit(queued).unwrap();
    assert_eq!(harness.server.pending(), 1);

    assert_eq!(harness.server.disconnect_all(), 1);
    assert_eq!(idle_notifications.next().unwrap(), None);

    // The only worker moves on to the queued request
    client.await_admission().unwrap();
    assert_eq!(harness.server.pending(), 0);
    assert!(client.subscribe("k").unwrap());
    assert_eq!(harness.server.live_sessions(), 1);

    client.disconnect().unwrap();
    wait_until(|| harness.server.live_sessions() == 0);
    harness.server.shutdown();
}

#[test]
fn test_shutdown_does_not_wait_for_idle_clients() {
    let harness = Harness::with_defaults();
    let (_first, _n1) = harness.connect(1);
    let (_second, _n2) = harness.connect(2);
    assert_eq!(harness.server.live_sessions(), 2);

    harness.server.shutdown();
}

#[test]
fn test_workers_serve_sessions_one_after_another() {
    let config = Config::builder().max_sessions(1).build();
    let harness = Harness::new(config, Store::default());
    harness.store.write("k", "0").unwrap();

    for id in 0..3 {
        let (mut client, _notifications) = harness.connect(id);
        assert!(client.subscribe("k").unwrap());
        client.disconnect().unwrap();
    }

    wait_until(|| harness.store.subscriber_count("k") == 0);
    harness.server.shutdown();
}

// =============================================================================
// Direct Session Tests
// =============================================================================

struct DirectSession {
    requests: PipeWriter,
    responses: PipeReader,
    store: Arc<Store>,
    worker: thread::JoinHandle<(SessionEnd, SessionState, SessionId)>,
}

fn spawn_session(store: Arc<Store>) -> DirectSession {
    let registry = Arc::new(SessionRegistry::new());
    let (req_tx, req_rx) = pipe();
    let (resp_tx, resp_rx) = pipe();
    let (notif_tx, _notif_rx) = pipe();

    let handle = registry.register(Box::new(notif_tx), 10);
    let mut session = Session::new(
        handle,
        Box::new(req_rx),
        Box::new(resp_tx),
        Arc::clone(&store),
        registry,
    );
    assert_eq!(session.state(), SessionState::Established);

    let worker = thread::spawn(move || {
        let end = session.run();
        (end, session.state(), session.id())
    });

    DirectSession {
        requests: req_tx,
        responses: resp_rx,
        store,
        worker,
    }
}

#[test]
fn test_session_ends_when_terminated_while_idle() {
    let store = Arc::new(Store::default());
    let registry = Arc::new(SessionRegistry::new());
    let channels = Arc::new(MemoryChannels::new());
    for name in ["req", "resp", "notif"] {
        channels.create(name);
    }

    let handle = registry.register(Box::new(channels.take_writer("notif").unwrap()), 10);
    let waker = Arc::clone(&channels);
    handle.set_waker(Box::new(move || waker.interrupt("req")));
    let mut session = Session::new(
        handle,
        Box::new(channels.take_reader("req").unwrap()),
        Box::new(channels.take_writer("resp").unwrap()),
        Arc::clone(&store),
        Arc::clone(&registry),
    );
    let _requests = channels.take_writer("req").unwrap();
    let mut responses = channels.take_reader("resp").unwrap();
    let worker = thread::spawn(move || session.run());

    assert_eq!(read_response(&mut responses).unwrap(), Some(Response::ok(1)));
    assert_eq!(registry.disconnect_all(&store), 1);

    assert_eq!(worker.join().unwrap(), SessionEnd::Terminated);
    assert!(registry.is_empty());
    assert_eq!(read_response(&mut responses).unwrap(), None);
}

#[test]
fn test_session_ends_with_disconnect() {
    let mut direct = spawn_session(Arc::new(Store::default()));
    assert_eq!(read_response(&mut direct.responses).unwrap(), Some(Response::ok(1)));

    write_request(&mut direct.requests, &Request::Disconnect).unwrap();
    assert_eq!(read_response(&mut direct.responses).unwrap(), Some(Response::ok(2)));

    let (end, state, _) = direct.worker.join().unwrap();
    assert_eq!(end, SessionEnd::Disconnected);
    assert_eq!(state, SessionState::Closed);
}

#[test]
fn test_session_ends_when_peer_closes() {
    let store = Arc::new(Store::default());
    store.write("k", "0").unwrap();
    let mut direct = spawn_session(store);
    assert_eq!(read_response(&mut direct.responses).unwrap(), Some(Response::ok(1)));

    write_request(&mut direct.requests, &Request::Subscribe { key: "k".into() }).unwrap();
    assert_eq!(read_response(&mut direct.responses).unwrap(), Some(Response::ok(3)));

    drop(direct.requests);
    let (end, state, id) = direct.worker.join().unwrap();
    assert_eq!(end, SessionEnd::PeerClosed);
    assert_eq!(state, SessionState::Closed);
    assert!(!direct.store.is_subscribed("k", id));
}

#[test]
fn test_session_ends_when_response_channel_breaks() {
    let store = Arc::new(Store::default());
    let mut direct = spawn_session(store);
    assert_eq!(read_response(&mut direct.responses).unwrap(), Some(Response::ok(1)));

    drop(direct.responses);
    write_request(&mut direct.requests, &Request::Subscribe { key: "k".into() }).unwrap();

    let (end, _, _) = direct.worker.join().unwrap();
    assert_eq!(end, SessionEnd::ChannelFault);
}

// =============================================================================
// Channel Tests
// =============================================================================

#[test]
fn test_interrupt_ends_read_while_writer_is_held() {
    let channels = MemoryChannels::new();
    channels.create("req");
    let _writer = channels.take_writer("req").unwrap();
    let mut reader = channels.take_reader("req").unwrap();

    channels.interrupt("req").unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(reader.read(&mut buf).unwrap(), 0);
    assert!(channels.interrupt("missing").is_err());
}
