//! End-to-end session tests: two sessions over an in-memory duplex
//! stream, and sessions driven against a hand-rolled wire peer to pin
//! down the frame schema.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value as Json};
use tokio::io::{duplex, split, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;

use dapter::protocol::{InitializeRequest, InitializeResponse, StoppedEvent};
use dapter::{ContentReader, ContentWriter, DapError, Rejection, Session};

dapter::schema_struct! {
    pub struct DoubleRequest = "double" {
        x "x": i64,
    }
}

dapter::schema_struct! {
    pub struct DoubleResponse = "double" {
        y "y": i64,
    }
}

dapter::schema_request!(DoubleRequest => DoubleResponse);

dapter::schema_struct! {
    pub struct PingRequest = "ping" {}
}

dapter::schema_struct! {
    pub struct PingResponse = "ping" {}
}

dapter::schema_request!(PingRequest => PingResponse);

/// Two sessions joined by an in-memory stream.
fn session_pair() -> (Session, Session) {
    let (near, far) = duplex(64 * 1024);
    let (near_read, near_write) = split(near);
    let (far_read, far_write) = split(far);
    let client = Session::new();
    let server = Session::new();
    client.bind(near_read, near_write).unwrap();
    server.bind(far_read, far_write).unwrap();
    (client, server)
}

/// A session facing a raw stream end the test drives by hand.
fn session_with_raw_peer() -> (
    Session,
    ContentReader<ReadHalf<DuplexStream>>,
    ContentWriter<WriteHalf<DuplexStream>>,
) {
    let (near, far) = duplex(64 * 1024);
    let (near_read, near_write) = split(near);
    let (far_read, far_write) = split(far);
    let session = Session::new();
    session.bind(near_read, near_write).unwrap();
    (
        session,
        ContentReader::new(far_read),
        ContentWriter::new(far_write),
    )
}

/// Capture protocol errors into a vec and signal each arrival.
fn capture_errors(session: &Session) -> (Arc<Mutex<Vec<String>>>, mpsc::UnboundedReceiver<()>) {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = errors.clone();
    session.on_error(move |message| {
        sink.lock().unwrap().push(message.to_string());
        let _ = tx.send(());
    });
    (errors, rx)
}

async fn read_frame(reader: &mut ContentReader<ReadHalf<DuplexStream>>) -> Json {
    let payload = reader.read().await.unwrap().expect("frame available");
    serde_json::from_slice(&payload).unwrap()
}

async fn write_frame(writer: &mut ContentWriter<WriteHalf<DuplexStream>>, frame: Json) {
    writer
        .write(&serde_json::to_vec(&frame).unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn session_request_response_roundtrip() {
    let (client, server) = session_pair();
    server.on_request(|req: DoubleRequest| DoubleResponse { y: req.x * 2 });

    let response = client.send(DoubleRequest { x: 5 }).await.unwrap();
    assert_eq!(response.y, 10);
}

#[tokio::test]
async fn session_concurrent_requests_correlate() {
    let (client, server) = session_pair();
    server.on_request(|req: DoubleRequest| DoubleResponse { y: req.x * 2 });

    let first = client.send(DoubleRequest { x: 1 });
    let second = client.send(DoubleRequest { x: 2 });
    let third = client.send(DoubleRequest { x: 3 });

    assert_eq!(third.await.unwrap().y, 6);
    assert_eq!(first.await.unwrap().y, 2);
    assert_eq!(second.await.unwrap().y, 4);
}

#[tokio::test]
async fn session_unknown_request_is_rejected() {
    let (client, server) = session_pair();
    let (errors, _signal) = capture_errors(&server);

    let err = client.send(DoubleRequest { x: 5 }).await.unwrap_err();
    match err {
        DapError::Rejected { message } => assert!(message.contains("no handler")),
        other => panic!("expected rejection, got: {other:?}"),
    }
    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("no handler for request 'double'"));
}

#[tokio::test]
async fn session_handler_rejection_reaches_caller() {
    let (client, server) = session_pair();
    server.on_request(|_: DoubleRequest| Rejection::new("doubling disabled"));

    let err = client.send(DoubleRequest { x: 5 }).await.unwrap_err();
    match err {
        DapError::Rejected { message } => assert_eq!(message, "doubling disabled"),
        other => panic!("expected rejection, got: {other:?}"),
    }
}

#[tokio::test]
async fn session_handler_result_form() {
    let (client, server) = session_pair();
    server.on_request(|req: DoubleRequest| {
        if req.x < 0 {
            Err(Rejection::new("negative input"))
        } else {
            Ok(DoubleResponse { y: req.x * 2 })
        }
    });

    assert_eq!(client.send(DoubleRequest { x: 4 }).await.unwrap().y, 8);
    let err = client.send(DoubleRequest { x: -1 }).await.unwrap_err();
    assert!(matches!(err, DapError::Rejected { .. }));
}

#[tokio::test]
async fn session_event_delivery() {
    let (client, server) = session_pair();
    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on_event(move |event: StoppedEvent| {
        let _ = tx.send(event);
    });

    server
        .send_event(StoppedEvent {
            reason: "breakpoint".into(),
            thread_id: Some(1),
            ..Default::default()
        })
        .unwrap();

    let event = rx.recv().await.unwrap();
    assert_eq!(event.reason, "breakpoint");
    assert_eq!(event.thread_id, Some(1));
}

#[tokio::test]
async fn session_event_without_handler_is_ignored() {
    let (client, server) = session_pair();
    let (errors, _signal) = capture_errors(&server);
    server.on_request(|_: PingRequest| PingResponse::default());

    client
        .send_event(StoppedEvent {
            reason: "pause".into(),
            ..Default::default()
        })
        .unwrap();
    // Frames dispatch in order, so a later roundtrip proves the receiver
    // digested the event quietly.
    client.send(PingRequest::default()).await.unwrap();
    assert!(errors.lock().unwrap().is_empty());
}

#[tokio::test]
async fn session_event_decode_error_is_reported_and_dropped() {
    let (session, _reader, mut writer) = session_with_raw_peer();
    let (errors, mut signal) = capture_errors(&session);
    session.on_event(|_: StoppedEvent| panic!("must not be invoked"));

    write_frame(
        &mut writer,
        json!({
            "seq": 1,
            "type": "event",
            "event": "stopped",
            "body": { "reason": 5 }
        }),
    )
    .await;

    signal.recv().await.unwrap();
    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("failed to decode 'stopped' event"));
}

#[tokio::test]
async fn session_close_mid_flight_fails_pending_requests() {
    let (near, far) = duplex(64 * 1024);
    let (near_read, near_write) = split(near);
    let client = Session::new();
    client.bind(near_read, near_write).unwrap();

    let first = client.send(DoubleRequest { x: 1 });
    let second = client.send(DoubleRequest { x: 2 });
    drop(far);

    assert!(matches!(first.await, Err(DapError::SessionClosed)));
    assert!(matches!(second.await, Err(DapError::SessionClosed)));
    assert!(matches!(
        client.send(DoubleRequest { x: 3 }).await,
        Err(DapError::SessionClosed)
    ));
}

#[tokio::test]
async fn session_explicit_close_completes_pending() {
    let (session, _reader, _writer) = session_with_raw_peer();
    let pending = session.send(DoubleRequest { x: 1 });
    session.close();

    assert!(matches!(pending.await, Err(DapError::SessionClosed)));
    assert!(session.is_closed());
    assert!(matches!(
        session.send_event(StoppedEvent::default()),
        Err(DapError::SessionClosed)
    ));
}

#[tokio::test]
async fn session_request_frame_schema() {
    let (session, mut reader, mut writer) = session_with_raw_peer();
    let future = session.send(DoubleRequest { x: 5 });

    let frame = read_frame(&mut reader).await;
    assert_eq!(frame["seq"], json!(1));
    assert_eq!(frame["type"], json!("request"));
    assert_eq!(frame["command"], json!("double"));
    assert_eq!(frame["arguments"], json!({ "x": 5 }));

    write_frame(
        &mut writer,
        json!({
            "seq": 1,
            "type": "response",
            "request_seq": 1,
            "success": true,
            "command": "double",
            "body": { "y": 10 }
        }),
    )
    .await;
    assert_eq!(future.await.unwrap().y, 10);
}

#[tokio::test]
async fn session_response_frame_schema() {
    let (server, mut reader, mut writer) = session_with_raw_peer();
    server.on_request(|req: DoubleRequest| DoubleResponse { y: req.x * 2 });

    write_frame(
        &mut writer,
        json!({
            "seq": 41,
            "type": "request",
            "command": "double",
            "arguments": { "x": 5 }
        }),
    )
    .await;

    let frame = read_frame(&mut reader).await;
    assert_eq!(frame["type"], json!("response"));
    assert_eq!(frame["success"], json!(true));
    assert_eq!(frame["request_seq"], json!(41));
    assert_eq!(frame["command"], json!("double"));
    assert_eq!(frame["body"], json!({ "y": 10 }));
    assert_eq!(frame["seq"], json!(1));
}

#[tokio::test]
async fn session_error_response_omits_body() {
    let (server, mut reader, mut writer) = session_with_raw_peer();
    let (_errors, mut signal) = capture_errors(&server);

    write_frame(
        &mut writer,
        json!({
            "seq": 7,
            "type": "request",
            "command": "unregistered",
            "arguments": {}
        }),
    )
    .await;

    signal.recv().await.unwrap();
    let frame = read_frame(&mut reader).await;
    assert_eq!(frame["success"], json!(false));
    assert_eq!(frame["request_seq"], json!(7));
    assert!(frame["message"]
        .as_str()
        .unwrap()
        .contains("no handler for request 'unregistered'"));
    assert!(frame.as_object().unwrap().get("body").is_none());
}

#[tokio::test]
async fn session_seq_is_monotonic_across_kinds() {
    let (session, mut reader, _writer) = session_with_raw_peer();

    let _first = session.send(DoubleRequest { x: 1 });
    session
        .send_event(StoppedEvent {
            reason: "step".into(),
            ..Default::default()
        })
        .unwrap();
    let _second = session.send(DoubleRequest { x: 2 });

    let mut seqs = Vec::new();
    let mut kinds = Vec::new();
    for _ in 0..3 {
        let frame = read_frame(&mut reader).await;
        seqs.push(frame["seq"].as_i64().unwrap());
        kinds.push(frame["type"].as_str().unwrap().to_string());
    }
    assert_eq!(seqs, [1, 2, 3]);
    assert_eq!(kinds, ["request", "event", "request"]);
}

#[tokio::test]
async fn session_unknown_response_seq_is_reported() {
    let (session, _reader, mut writer) = session_with_raw_peer();
    let (errors, mut signal) = capture_errors(&session);

    write_frame(
        &mut writer,
        json!({
            "seq": 9,
            "type": "response",
            "request_seq": 77,
            "success": true,
            "command": "double",
            "body": {}
        }),
    )
    .await;

    signal.recv().await.unwrap();
    assert!(errors.lock().unwrap()[0].contains("unknown response seq 77"));
}

#[tokio::test]
async fn session_malformed_response_body_fails_future_and_reports() {
    let (session, mut reader, mut writer) = session_with_raw_peer();
    let (errors, mut signal) = capture_errors(&session);

    let future = session.send(DoubleRequest { x: 5 });
    let _request = read_frame(&mut reader).await;

    write_frame(
        &mut writer,
        json!({
            "seq": 1,
            "type": "response",
            "request_seq": 1,
            "success": true,
            "command": "double",
            "body": { "y": "not a number" }
        }),
    )
    .await;

    assert!(matches!(future.await, Err(DapError::Codec(_))));
    signal.recv().await.unwrap();
    assert!(errors.lock().unwrap()[0].contains("failed to decode 'double' response"));
}

#[tokio::test]
async fn session_handler_panic_is_contained() {
    let (client, server) = session_pair();
    let (errors, _signal) = capture_errors(&server);
    server.on_request(|_: DoubleRequest| -> DoubleResponse { panic!("boom") });
    server.on_request(|_: PingRequest| PingResponse::default());

    let err = client.send(DoubleRequest { x: 5 }).await.unwrap_err();
    match err {
        DapError::Rejected { message } => assert!(message.contains("boom")),
        other => panic!("expected rejection, got: {other:?}"),
    }

    // One report, and the session keeps serving.
    {
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("panicked"));
    }
    client.send(PingRequest::default()).await.unwrap();
}

#[tokio::test]
async fn session_response_sent_hook_fires_after_write() {
    let (client, server) = session_pair();
    let (tx, mut rx) = mpsc::unbounded_channel();
    server.on_request(|req: DoubleRequest| {
        if req.x < 0 {
            Err(Rejection::new("negative input"))
        } else {
            Ok(DoubleResponse { y: req.x * 2 })
        }
    });
    server.on_response_sent(move |outcome: Result<DoubleResponse, Rejection>| {
        let _ = tx.send(outcome);
    });

    client.send(DoubleRequest { x: 5 }).await.unwrap();
    let sent = rx.recv().await.unwrap();
    assert_eq!(sent.unwrap().y, 10);

    let _ = client.send(DoubleRequest { x: -5 }).await;
    let sent = rx.recv().await.unwrap();
    assert_eq!(sent.unwrap_err().message, "negative input");
}

#[tokio::test]
async fn session_initialize_with_protocol_catalog() {
    let (client, server) = session_pair();
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    server.on_request(move |req: InitializeRequest| {
        *sink.lock().unwrap() = Some(req.adapter_id.clone());
        InitializeResponse {
            supports_configuration_done_request: Some(true),
            ..Default::default()
        }
    });

    let capabilities = client
        .send(InitializeRequest {
            adapter_id: "mock".into(),
            lines_start_at1: Some(true),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(capabilities.supports_configuration_done_request, Some(true));
    assert_eq!(seen.lock().unwrap().as_deref(), Some("mock"));
}

#[tokio::test]
async fn session_over_tcp() {
    let server = dapter::net::Server::listen("127.0.0.1:0", |read, write| {
        let session = Session::new();
        session.on_request(|req: DoubleRequest| DoubleResponse { y: req.x * 2 });
        // The spawned tasks keep the session alive after this handle drops.
        session.bind(read, write).unwrap();
    })
    .await
    .unwrap();

    let (read, write) = dapter::net::connect("127.0.0.1", server.local_addr().port())
        .await
        .unwrap();
    let client = Session::new();
    client.bind(read, write).unwrap();

    let response = client.send(DoubleRequest { x: 21 }).await.unwrap();
    assert_eq!(response.y, 42);

    client.close();
    server.stop();
}
