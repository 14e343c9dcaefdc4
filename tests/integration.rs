// tests/integration.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use mom_reqrep::{
    //
    create_memory_transport,
    ConnectionBuilder,
    Connection,
    ConnectionSpec,
    Destination,
    Frame,
    Inbox,
    MemoryHub,
    Message,
    MessagingError,
    Payload,
    RequestId,
    Responder,
    Result,
    Subscription,
    Transport,
    TransportPtr,
};

const WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Serialize, Deserialize)]
struct AddRequest {
    a: i32,
    b: i32,
}

#[derive(Debug, Serialize, Deserialize)]
struct AddResponse {
    sum: i32,
}

async fn connect(hub: &Arc<MemoryHub>, id: &str) -> Connection {
    // ---
    ConnectionBuilder::new()
        .hub(hub, id)
        .open()
        .await
        .expect("connect to memory hub")
}

fn doc(value: Value) -> Message {
    Message::from_value(value).expect("JSON object")
}

/// Wait for the next frame on `subscription` and parse it as JSON.
async fn next_json(subscription: &mut Subscription) -> Value {
    // ---
    let frame = timeout(WAIT, subscription.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("subscription ended");

    serde_json::from_slice(&frame.body).expect("frame body is JSON")
}

/// Callback that forwards every response into a channel.
fn forward_to(
    tx: &mpsc::UnboundedSender<(Message, RequestId)>,
) -> impl FnOnce(Message, RequestId) + Send + 'static {
    let tx = tx.clone();
    move |message, request_id| {
        let _ = tx.send((message, request_id));
    }
}

async fn next_response(rx: &mut mpsc::UnboundedReceiver<(Message, RequestId)>) -> (Message, RequestId) {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for response callback")
        .expect("callback channel closed")
}

#[tokio::test]
async fn test_request_is_answered_once() -> Result<()> {
    // ---
    #[cfg(feature = "logging")]
    init_logging();

    let hub = MemoryHub::new();
    let server = connect(&hub, "server").await;
    let client = connect(&hub, "client").await;

    let _responder = server
        .responder("q.req", |_request| Message::from_value(json!({"body": "ok"})))
        .await?;
    let requestor = client.requestor("q.req", "q.res").await?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let request_id = requestor
        .send(doc(json!({"body": "hello"})), forward_to(&tx))
        .await?;
    assert!(request_id.as_str().len() >= 20);

    let (response, answered) = next_response(&mut rx).await;
    assert_eq!(answered, request_id);
    assert_eq!(response.as_document(), doc(json!({"body": "ok"})).as_document());
    assert_eq!(requestor.pending_count(), 0);

    // No second invocation.
    assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_duplicate_and_foreign_responses_are_dropped() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let client = connect(&hub, "client").await;
    let broker_side = connect(&hub, "broker-side").await;

    let mut requests = broker_side.subscribe("q.req").await?;
    let requestor = client.requestor("q.req", "q.res").await?;

    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let counted = {
        let calls = calls.clone();
        let forward = forward_to(&tx);
        move |message: Message, request_id: RequestId| {
            calls.fetch_add(1, Ordering::SeqCst);
            forward(message, request_id);
        }
    };
    let first = requestor.send(doc(json!({"body": "one"})), counted).await?;

    let seen = next_json(&mut requests).await;
    assert_eq!(seen["kind"], "Request");
    assert_eq!(seen["requestID"], first.as_str());
    assert_eq!(seen["respondTo"], "q.res");
    assert_eq!(seen["body"], "one");

    let reply = doc(json!({"kind": "Response", "requestID": first.as_str(), "body": "ok"}));
    broker_side.publish(&reply, "q.res").await?;
    broker_side.publish(&reply, "q.res").await?;

    let (response, _) = next_response(&mut rx).await;
    assert_eq!(response.get("body"), Some(&json!("ok")));
    assert_eq!(response.get("requestID"), None);

    // Frames that must all be ignored, followed by a valid response that
    // proves the listener processed them in order.
    let second = requestor.send(doc(json!({"body": "two"})), forward_to(&tx)).await?;
    broker_side
        .publish(&doc(json!({"kind": "Response", "requestID": "unknown", "body": "x"})), "q.res")
        .await?;
    broker_side
        .publish(&doc(json!({"kind": "Request", "requestID": second.as_str(), "body": "x"})), "q.res")
        .await?;
    broker_side
        .publish(&doc(json!({"kind": "Response", "body": "x"})), "q.res")
        .await?;
    broker_side.publish(&Message::raw("not json"), "q.res").await?;
    broker_side
        .publish(&doc(json!({"kind": "Response", "requestID": second.as_str(), "body": "two-ok"})), "q.res")
        .await?;

    let (response, answered) = next_response(&mut rx).await;
    assert_eq!(answered, second);
    assert_eq!(response.get("body"), Some(&json!("two-ok")));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(requestor.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_responder_publishes_correlated_response() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let server = connect(&hub, "server").await;
    let observer = connect(&hub, "observer").await;
    let client = connect(&hub, "client").await;

    let _responder = server.responder("q.req", Ok).await?;
    let mut responses = observer.subscribe("q.res").await?;

    let request = Message::raw(r#"{"kind":"Request","requestID":"abc","respondTo":"q.res","body":"ping"}"#);
    client.publish(&request, "q.req").await?;

    let response = next_json(&mut responses).await;
    assert_eq!(response, json!({"kind": "Response", "requestID": "abc", "body": "ping"}));
    Ok(())
}

#[tokio::test]
async fn test_handler_failure_and_malformed_requests_publish_nothing() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let server = connect(&hub, "server").await;
    let observer = connect(&hub, "observer").await;

    let handled = Arc::new(AtomicUsize::new(0));
    let _responder = {
        let handled = handled.clone();
        server
            .responder("q.req", move |request: Message| {
                handled.fetch_add(1, Ordering::SeqCst);
                match request.get("body") {
                    Some(body) if body == "fail" => Err(MessagingError::Handler("refused".into())),
                    _ => Ok(request),
                }
            })
            .await?
    };
    let mut responses = observer.subscribe("q.res").await?;

    let request = |id: &str, body: &str| {
        doc(json!({"kind": "Request", "requestID": id, "respondTo": "q.res", "body": body}))
    };

    observer.publish(&request("r1", "fail"), "q.req").await?;
    observer.publish(&Message::raw(Bytes::from_static(b"\x00\x01binary")), "q.req").await?;
    observer
        .publish(&doc(json!({"kind": "Request", "requestID": "r2", "body": "x"})), "q.req")
        .await?;
    observer
        .publish(&doc(json!({"kind": "Response", "requestID": "r3", "respondTo": "q.res"})), "q.req")
        .await?;
    observer.publish(&request("r4", "fine"), "q.req").await?;

    let response = next_json(&mut responses).await;
    assert_eq!(response["requestID"], "r4");
    assert_eq!(response["body"], "fine");

    // Only well-formed requests reach the handler.
    assert_eq!(handled.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_typed_responder() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let connection = connect(&hub, "math").await;

    let _responder = Responder::open_typed(&connection, "math.add", |req: AddRequest| {
        Ok(AddResponse { sum: req.a + req.b })
    })
    .await?;
    let requestor = connection.requestor("math.add", "math.add.res").await?;

    let response = requestor
        .request_with_timeout(Message::from_serialize(&AddRequest { a: 20, b: 3 })?, WAIT)
        .await?;
    let response: AddResponse = response.parse()?;
    assert_eq!(response.sum, 23);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_requests() {
    // ---
    let hub = MemoryHub::new();
    let server = connect(&hub, "server").await;
    let client = connect(&hub, "client").await;

    let _responder = Responder::open_typed(&server, "math.add", |req: AddRequest| {
        Ok(AddResponse { sum: req.a + req.b })
    })
    .await
    .unwrap();
    let requestor = client.requestor("math.add", "math.add.res").await.unwrap();

    let mut handles = Vec::new();
    for i in 0..10 {
        let requestor = requestor.clone();
        handles.push(tokio::spawn(async move {
            let message = Message::from_serialize(&AddRequest { a: i, b: i }).unwrap();
            let response = requestor.request_with_timeout(message, WAIT).await.unwrap();
            (i, response.parse::<AddResponse>().unwrap().sum)
        }));
    }

    for handle in handles {
        let (i, sum) = handle.await.unwrap();
        assert_eq!(sum, i * 2);
    }
    assert_eq!(requestor.pending_count(), 0);
}

#[tokio::test]
async fn test_request_timeout_forgets_request() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let connection = connect(&hub, "lonely").await;
    let requestor = connection.requestor("nobody.req", "nobody.res").await?;

    let result = requestor
        .request_with_timeout(doc(json!({"body": "anyone?"})), Duration::from_millis(50))
        .await;

    assert!(matches!(result, Err(MessagingError::Timeout)));
    assert_eq!(requestor.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_forget_and_prune() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let connection = connect(&hub, "forgetful").await;
    let requestor = connection.requestor("nobody.req", "nobody.res").await?;

    let first = requestor.send(doc(json!({})), |_, _| {}).await?;
    let (_second, pending) = requestor.request(doc(json!({}))).await?;
    assert_eq!(requestor.pending_count(), 2);

    assert!(requestor.forget(&first));
    assert!(!requestor.forget(&first));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(requestor.prune_older_than(Duration::from_millis(5)), 1);
    assert_eq!(requestor.pending_count(), 0);

    // The abandoned request resolves as closed rather than hanging.
    assert!(matches!(timeout(WAIT, pending).await, Ok(Err(MessagingError::Closed))));
    Ok(())
}

#[tokio::test]
async fn test_close_discards_pending_requests() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let client = connect(&hub, "client").await;
    let broker_side = connect(&hub, "broker-side").await;

    let mut requests = broker_side.subscribe("q.req").await?;
    let requestor = client.requestor("q.req", "q.res").await?;

    let called = Arc::new(AtomicBool::new(false));
    let request_id = {
        let called = called.clone();
        requestor
            .send(doc(json!({"body": "late"})), move |_, _| called.store(true, Ordering::SeqCst))
            .await?
    };
    let _ = next_json(&mut requests).await;
    assert_eq!(requestor.pending_count(), 1);

    requestor.close().await?;
    assert_eq!(requestor.pending_count(), 0);
    assert!(!client.is_subscribed("q.res").await);

    broker_side
        .publish(&doc(json!({"kind": "Response", "requestID": request_id.as_str()})), "q.res")
        .await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!called.load(Ordering::SeqCst));

    // Second close is a no-op, sends are refused.
    requestor.close().await?;
    let err = requestor.send(doc(json!({})), |_, _| {}).await.unwrap_err();
    assert!(matches!(err, MessagingError::Closed));

    // The responses destination is free again.
    let _again = client.requestor("q.req", "q.res").await?;
    Ok(())
}

#[tokio::test]
async fn test_raw_request_is_refused() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let connection = connect(&hub, "raw").await;
    let requestor = connection.requestor("q.req", "q.res").await?;

    let err = requestor
        .send(Message::raw(Bytes::from_static(b"blob")), |_, _| {})
        .await
        .unwrap_err();
    assert!(matches!(err, MessagingError::Encode(_)));
    assert_eq!(requestor.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_requestor_open_is_atomic() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let connection = connect(&hub, "atomic").await;

    let _existing = connection.subscribe("q.res").await?;

    let err = connection.requestor("q.req", "q.res").await.err().expect("duplicate");
    assert!(matches!(err, MessagingError::DuplicateSubscription(_)));
    assert_eq!(connection.subscriptions().await, vec![Destination::from("q.res")]);
    assert_eq!(hub.subscriber_count(&Destination::from("q.res")).await, 1);

    let err = connection.responder("q.res", Ok).await.err().expect("duplicate");
    assert!(matches!(err, MessagingError::DuplicateSubscription(_)));
    Ok(())
}

#[tokio::test]
async fn test_resubscribe_after_unsubscribe() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let connection = connect(&hub, "resub").await;

    let first = connection.subscribe("d").await?;
    assert!(matches!(
        connection.subscribe("d").await,
        Err(MessagingError::DuplicateSubscription(_))
    ));

    connection.unsubscribe("d").await?;
    drop(first);
    assert!(!connection.is_subscribed("d").await);

    let mut second = connection.subscribe("d").await?;
    connection.publish(&doc(json!({"n": 1})), "d").await?;
    assert_eq!(next_json(&mut second).await, json!({"n": 1}));
    Ok(())
}

#[tokio::test]
async fn test_roles_close_cleanly_after_connection_close() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let connection = connect(&hub, "shutdown").await;

    let responder = connection.responder("q.req", Ok).await?;
    let requestor = connection.requestor("q.req", "q.res").await?;

    connection.close().await?;
    assert!(matches!(connection.close().await, Err(MessagingError::Closed)));

    responder.close().await?;
    requestor.close().await?;
    assert!(responder.is_closed());
    assert!(requestor.is_closed());

    let err = requestor.send(doc(json!({})), |_, _| {}).await.unwrap_err();
    assert!(matches!(err, MessagingError::Closed));
    Ok(())
}

#[tokio::test]
async fn test_self_addressed_flood_does_not_wedge_responder() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let server = connect(&hub, "server").await;
    let client = connect(&hub, "client").await;

    let _responder = server
        .responder("q.req", |request: Message| {
            std::thread::sleep(Duration::from_millis(1));
            Ok(request)
        })
        .await?;

    // Every response lands back on the responder's own inbox.
    timeout(Duration::from_secs(3), async {
        for i in 0..300 {
            let request = doc(json!({
                "kind": "Request", "requestID": format!("f{i}"), "respondTo": "q.req", "body": "x"
            }));
            client.publish(&request, "q.req").await?;
        }
        Ok::<_, MessagingError>(())
    })
    .await
    .expect("flood publish stalled")?;

    let requestor = client.requestor("q.req", "q.res").await?;
    let response = requestor
        .request_with_timeout(doc(json!({"body": "after-flood"})), Duration::from_secs(3))
        .await?;
    assert_eq!(response.get("body"), Some(&json!("after-flood")));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_requests_racing_close_never_linger() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let connection = connect(&hub, "racer").await;
    let requestor = connection.requestor("nobody.req", "nobody.res").await?;

    let mut handles = Vec::new();
    for i in 0..64 {
        let requestor = requestor.clone();
        handles.push(tokio::spawn(async move {
            tokio::task::yield_now().await;
            match requestor.request(doc(json!({"n": i}))).await {
                Err(MessagingError::Closed) => {}
                Err(err) => panic!("unexpected send error: {err}"),
                Ok((_, response)) => {
                    // Registered before the close, so the close discards it.
                    let outcome = timeout(WAIT, response).await.expect("request left pending");
                    assert!(matches!(outcome, Err(MessagingError::Closed)));
                }
            }
        }));
    }

    tokio::task::yield_now().await;
    requestor.close().await?;

    for handle in handles {
        handle.await.expect("request task panicked");
    }
    assert_eq!(requestor.pending_count(), 0);
    Ok(())
}

// ---
// Failure injection
// ---

/// Wraps a transport; fails publishes or unsubscribes on demand and can
/// push arbitrary frames, such as broker error frames, into a subscription.
struct FaultyTransport {
    inner: TransportPtr,
    fail_publish: AtomicBool,
    fail_unsubscribe: AtomicBool,
    injectors: std::sync::Mutex<HashMap<Destination, mpsc::Sender<Frame>>>,
}

impl FaultyTransport {
    fn new(hub: &Arc<MemoryHub>, transport_id: &str) -> Arc<Self> {
        Arc::new(Self {
            inner: create_memory_transport(hub, transport_id),
            fail_publish: AtomicBool::new(false),
            fail_unsubscribe: AtomicBool::new(false),
            injectors: std::sync::Mutex::new(HashMap::new()),
        })
    }

    /// Deliver `frame` to the subscription on `destination`.
    async fn inject(&self, destination: &str, frame: Frame) {
        // ---
        let tx = self
            .injectors
            .lock()
            .unwrap()
            .get(&Destination::from(destination))
            .cloned()
            .expect("destination is subscribed");
        tx.send(frame).await.expect("subscription is alive");
    }
}

#[async_trait::async_trait]
impl Transport for FaultyTransport {
    fn transport_id(&self) -> &str {
        self.inner.transport_id()
    }

    async fn open(&self, spec: &ConnectionSpec) -> Result<()> {
        self.inner.open(spec).await
    }

    async fn close(&self) -> Result<()> {
        self.injectors.lock().unwrap().clear();
        self.inner.close().await
    }

    async fn publish(&self, destination: &Destination, content_type: &str, body: Bytes) -> Result<()> {
        // ---
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(MessagingError::Transport("broker went away".into()));
        }
        self.inner.publish(destination, content_type, body).await
    }

    async fn subscribe(&self, destination: &Destination) -> Result<Inbox> {
        // ---
        let mut upstream = self.inner.subscribe(destination).await?;
        let (tx, rx) = mpsc::channel(64);

        self.injectors
            .lock()
            .unwrap()
            .insert(destination.clone(), tx.clone());

        tokio::spawn(async move {
            while let Some(frame) = upstream.recv().await {
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn unsubscribe(&self, destination: &Destination) -> Result<()> {
        // ---
        if self.fail_unsubscribe.load(Ordering::SeqCst) {
            return Err(MessagingError::Transport("unsubscribe receipt lost".into()));
        }
        self.inner.unsubscribe(destination).await?;
        self.injectors.lock().unwrap().remove(destination);
        Ok(())
    }
}

#[tokio::test]
async fn test_failed_publish_rolls_back_pending_request() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let transport = FaultyTransport::new(&hub, "flaky");
    transport.fail_publish.store(true, Ordering::SeqCst);

    let connection = ConnectionBuilder::new()
        .transport(transport.clone())
        .open()
        .await?;
    let requestor = connection.requestor("q.req", "q.res").await?;

    let called = Arc::new(AtomicBool::new(false));
    let result = {
        let called = called.clone();
        requestor
            .send(doc(json!({"body": "lost"})), move |_, _| called.store(true, Ordering::SeqCst))
            .await
    };

    assert!(matches!(result, Err(MessagingError::Send(_))));
    assert_eq!(requestor.pending_count(), 0);
    assert!(!called.load(Ordering::SeqCst));

    // Recovers once the broker accepts publishes again.
    transport.fail_publish.store(false, Ordering::SeqCst);
    let _responder = connection.responder("q.req", Ok).await?;
    let response = requestor
        .request_with_timeout(doc(json!({"body": "found"})), WAIT)
        .await?;
    assert_eq!(response.get("body"), Some(&json!("found")));
    Ok(())
}

#[tokio::test]
async fn test_listener_receives_error_frames_raw() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let transport = FaultyTransport::new(&hub, "erroring");
    let connection = ConnectionBuilder::new()
        .transport(transport.clone())
        .open()
        .await?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _listener = connection
        .listen("events", move |message, _destination| {
            let _ = tx.send(message);
        })
        .await?;

    transport
        .inject("events", Frame::error("ERROR: permission denied"))
        .await;

    let message = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert!(message.is_error());
    assert_eq!(message.error.as_deref(), Some("ERROR: permission denied"));
    assert_eq!(message.payload, Payload::Raw(Bytes::new()));
    Ok(())
}

#[tokio::test]
async fn test_requestor_ignores_error_frames() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let transport = FaultyTransport::new(&hub, "client");
    let client = ConnectionBuilder::new()
        .transport(transport.clone())
        .open()
        .await?;
    let broker_side = connect(&hub, "broker-side").await;

    let requestor = client.requestor("q.req", "q.res").await?;
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let counted = {
        let calls = calls.clone();
        let forward = forward_to(&tx);
        move |message: Message, request_id: RequestId| {
            calls.fetch_add(1, Ordering::SeqCst);
            forward(message, request_id);
        }
    };
    let request_id = requestor.send(doc(json!({"body": "one"})), counted).await?;

    // A well-formed response body does not make an error frame acceptable.
    let body = json!({"kind": "Response", "requestID": request_id.as_str(), "body": "from-error"});
    let mut error_frame = Frame::error("ERROR: message rejected");
    error_frame.body = Bytes::from(body.to_string());
    transport.inject("q.res", error_frame).await;

    broker_side
        .publish(
            &doc(json!({"kind": "Response", "requestID": request_id.as_str(), "body": "real"})),
            "q.res",
        )
        .await?;

    let (response, answered) = next_response(&mut rx).await;
    assert_eq!(answered, request_id);
    assert_eq!(response.get("body"), Some(&json!("real")));
    assert!(!response.is_error());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_responder_ignores_error_frames() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let transport = FaultyTransport::new(&hub, "server");
    let server = ConnectionBuilder::new()
        .transport(transport.clone())
        .open()
        .await?;
    let observer = connect(&hub, "observer").await;

    let handled = Arc::new(AtomicUsize::new(0));
    let _responder = {
        let handled = handled.clone();
        server
            .responder("q.req", move |request: Message| {
                handled.fetch_add(1, Ordering::SeqCst);
                Ok(request)
            })
            .await?
    };
    let mut responses = observer.subscribe("q.res").await?;

    let request = |id: &str| json!({"kind": "Request", "requestID": id, "respondTo": "q.res", "body": "x"});

    let mut error_frame = Frame::error("ERROR: message rejected");
    error_frame.body = Bytes::from(request("bad").to_string());
    transport.inject("q.req", error_frame).await;

    observer.publish(&doc(request("good")), "q.req").await?;

    let response = next_json(&mut responses).await;
    assert_eq!(response["requestID"], "good");
    assert_eq!(handled.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_failed_unsubscribe_leaves_roles_open() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let transport = FaultyTransport::new(&hub, "sticky");
    let connection = ConnectionBuilder::new()
        .transport(transport.clone())
        .open()
        .await?;

    let requestor = connection.requestor("q.req", "q.res").await?;
    let responder = connection.responder("q.req", Ok).await?;
    let listener = connection.listen("events", |_, _| {}).await?;

    transport.fail_unsubscribe.store(true, Ordering::SeqCst);

    assert!(matches!(requestor.close().await, Err(MessagingError::Transport(_))));
    assert!(matches!(responder.close().await, Err(MessagingError::Transport(_))));
    assert!(matches!(listener.close().await, Err(MessagingError::Transport(_))));

    assert!(!requestor.is_closed());
    assert!(!responder.is_closed());
    assert!(!listener.is_closed());
    for destination in ["q.res", "q.req", "events"] {
        assert!(connection.is_subscribed(destination).await);
    }

    // Still serving while the close is pending a retry.
    let response = requestor
        .request_with_timeout(doc(json!({"body": "still-up"})), WAIT)
        .await?;
    assert_eq!(response.get("body"), Some(&json!("still-up")));

    transport.fail_unsubscribe.store(false, Ordering::SeqCst);

    requestor.close().await?;
    responder.close().await?;
    listener.close().await?;

    assert!(requestor.is_closed());
    assert!(responder.is_closed());
    assert!(listener.is_closed());
    assert!(connection.subscriptions().await.is_empty());
    Ok(())
}

#[cfg(feature = "logging")]
mod imp {
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn init() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }
}

#[cfg(not(feature = "logging"))]
mod imp {
    #[inline]
    #[allow(dead_code)]
    pub fn init() {}
}

#[allow(dead_code)]
pub fn init_logging() {
    imp::init();
}
