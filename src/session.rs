//! The session engine.
//!
//! A [`Session`] implements one endpoint of the protocol, client or
//! server: it registers typed handlers for inbound requests and events,
//! sends outbound requests whose responses resolve asynchronously, and
//! correlates every inbound frame to a handler or a pending response slot
//! over one full-duplex byte stream.
//!
//! Binding a stream starts two tasks: a receive task that owns the reader,
//! deframes and dispatches inbound messages, and runs handlers inline; and
//! a writer task that serializes all outbound frames so they are never
//! interleaved at the byte level. Handlers run on the receive task, so a
//! handler that blocks stalls dispatch; callers offload long work.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value as Json;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::codec::{self, CodecError, Decoder};
use crate::error::DapError;
use crate::future::ResponseFuture;
use crate::schema::{type_of, Schema, TypeDescriptor};
use crate::transport::{ContentReader, ContentWriter};

/// A request message. Its schema name is the `command` on the wire, and
/// every request is statically paired with its response type.
pub trait Request: Schema {
    /// The response answering this request.
    type Response: Response;
}

/// A response message.
pub trait Response: Schema {}

/// An event message. Its schema name is the `event` name on the wire.
pub trait Event: Schema {}

/// The error arm of a request handler: the request is answered with a
/// negative response carrying this message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Rejection {
    /// Human-readable reason sent to the peer.
    pub message: String,
}

impl Rejection {
    /// A rejection with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<String> for Rejection {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for Rejection {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Accepted return values for request handlers: the response itself, a
/// [`Rejection`], or a `Result` of the two.
pub trait IntoResponse<T> {
    /// Convert into the response-or-rejection form.
    fn into_response(self) -> Result<T, Rejection>;
}

impl<T: Response> IntoResponse<T> for T {
    fn into_response(self) -> Result<T, Rejection> {
        Ok(self)
    }
}

impl<T: Response> IntoResponse<T> for Rejection {
    fn into_response(self) -> Result<T, Rejection> {
        Err(self)
    }
}

impl<T: Response> IntoResponse<T> for Result<T, Rejection> {
    fn into_response(self) -> Result<T, Rejection> {
        self
    }
}

type ErrorHandler = Arc<dyn Fn(&str) + Send + Sync>;
type RequestAdapter = Arc<dyn Fn(Option<&Json>) -> RequestReply + Send + Sync>;
type EventAdapter = Arc<dyn Fn(Option<&Json>) -> Result<(), CodecError> + Send + Sync>;
type SentAdapter = Arc<dyn Fn(Result<&Json, &str>) + Send + Sync>;

enum RequestReply {
    /// The encoded response body.
    Success(Json),
    /// The handler rejected the request.
    Rejected(String),
    /// The arguments or response failed the codec; reported locally too.
    Malformed(String),
}

struct RequestEntry {
    response_name: String,
    adapter: RequestAdapter,
}

enum ResponseOutcome {
    /// Successful response body to decode.
    Body(Json),
    /// Negative response from the peer.
    Rejected(String),
    /// The request never completed (send failure or shutdown).
    Failed(DapError),
}

struct PendingResponse {
    descriptor: &'static TypeDescriptor,
    // Returns a protocol-error message to report when decoding fails.
    complete: Box<dyn FnOnce(ResponseOutcome) -> Result<(), String> + Send>,
}

struct SentNotice {
    response_name: String,
    outcome: Result<Json, String>,
}

struct Outbound {
    payload: Vec<u8>,
    sent: Option<SentNotice>,
}

struct SendState {
    next_seq: i64,
    tx: Option<mpsc::UnboundedSender<Outbound>>,
}

struct Inner {
    closed: AtomicBool,
    // Seq allocation and enqueueing share one lock so that wire order
    // always equals seq order.
    send: Mutex<SendState>,
    pending: Mutex<HashMap<i64, PendingResponse>>,
    request_handlers: Mutex<HashMap<String, RequestEntry>>,
    event_handlers: Mutex<HashMap<String, EventAdapter>>,
    sent_handlers: Mutex<HashMap<String, SentAdapter>>,
    error_handler: Mutex<Option<ErrorHandler>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// One protocol endpoint.
///
/// Cloning is shallow: clones share handlers, pending responses, and the
/// bound stream. Dropping the last clone does not shut the session down;
/// use [`close`](Session::close) or let the stream end.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Create an unbound session. Handlers may be registered before or
    /// after [`bind`](Session::bind).
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                closed: AtomicBool::new(false),
                send: Mutex::new(SendState {
                    next_seq: 1,
                    tx: None,
                }),
                pending: Mutex::new(HashMap::new()),
                request_handlers: Mutex::new(HashMap::new()),
                event_handlers: Mutex::new(HashMap::new()),
                sent_handlers: Mutex::new(HashMap::new()),
                error_handler: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// True once the session has shut down.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Register the protocol-error callback. Protocol violations and codec
    /// failures on inbound frames are reported here; they never terminate
    /// the session by themselves. Replaces any previous callback.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.inner.error_handler.lock().unwrap() = Some(Arc::new(handler));
    }

    /// Register the handler for request type `T`, replacing any previous
    /// one. The handler runs on the receive task and may return the
    /// response, a [`Rejection`], or a `Result` of the two.
    pub fn on_request<T, F, R>(&self, handler: F)
    where
        T: Request,
        F: Fn(T) -> R + Send + Sync + 'static,
        R: IntoResponse<T::Response>,
    {
        let adapter: RequestAdapter = Arc::new(move |arguments: Option<&Json>| {
            let dec = arguments.map(Decoder::new).unwrap_or_else(Decoder::absent);
            let args = match T::decode(&dec) {
                Ok(args) => args,
                Err(e) => {
                    return RequestReply::Malformed(format!(
                        "failed to decode arguments for '{}': {e}",
                        T::schema_name()
                    ))
                }
            };
            match handler(args).into_response() {
                Ok(response) => match codec::encode(&response) {
                    Ok(body) => RequestReply::Success(body),
                    Err(e) => RequestReply::Malformed(format!(
                        "failed to encode response for '{}': {e}",
                        T::schema_name()
                    )),
                },
                Err(rejection) => RequestReply::Rejected(rejection.message),
            }
        });
        let entry = RequestEntry {
            response_name: T::Response::schema_name().into_owned(),
            adapter,
        };
        self.inner
            .request_handlers
            .lock()
            .unwrap()
            .insert(T::schema_name().into_owned(), entry);
    }

    /// Register the handler for event type `T`, replacing any previous one.
    pub fn on_event<T, F>(&self, handler: F)
    where
        T: Event,
        F: Fn(T) + Send + Sync + 'static,
    {
        let adapter: EventAdapter = Arc::new(move |body: Option<&Json>| {
            let dec = body.map(Decoder::new).unwrap_or_else(Decoder::absent);
            let body = T::decode(&dec)?;
            handler(body);
            Ok(())
        });
        self.inner
            .event_handlers
            .lock()
            .unwrap()
            .insert(T::schema_name().into_owned(), adapter);
    }

    /// Register a hook invoked after a response of type `T` (answering a
    /// served request) has been written to the stream. Replaces any
    /// previous hook for `T`.
    pub fn on_response_sent<T, F>(&self, handler: F)
    where
        T: Response,
        F: Fn(Result<T, Rejection>) + Send + Sync + 'static,
    {
        let adapter: SentAdapter = Arc::new(move |outcome: Result<&Json, &str>| match outcome {
            Ok(body) => match codec::decode::<T>(body) {
                Ok(response) => handler(Ok(response)),
                Err(e) => warn!(
                    response = %T::schema_name(),
                    "response-sent hook could not decode body: {e}"
                ),
            },
            Err(message) => handler(Err(Rejection::new(message))),
        });
        self.inner
            .sent_handlers
            .lock()
            .unwrap()
            .insert(T::schema_name().into_owned(), adapter);
    }

    /// Attach a byte stream and start the receive and writer tasks.
    ///
    /// A session binds exactly once; a second call reports through the
    /// error callback and returns [`DapError::AlreadyBound`] while the
    /// original binding stays intact. The receive task owns the reader
    /// until shutdown. Must be called from within a Tokio runtime.
    pub fn bind<R, W>(&self, reader: R, writer: W) -> Result<(), DapError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        if self.is_closed() {
            return Err(DapError::SessionClosed);
        }

        let rx = {
            let mut send = self.inner.send.lock().unwrap();
            if send.tx.is_some() {
                drop(send);
                self.inner.report("session is already bound");
                return Err(DapError::AlreadyBound);
            }
            let (tx, rx) = mpsc::unbounded_channel();
            send.tx = Some(tx);
            rx
        };

        let writer_task = tokio::spawn(run_writer(self.inner.clone(), rx, writer));
        let receive_task = tokio::spawn(run_receive(self.inner.clone(), reader));
        self.inner
            .tasks
            .lock()
            .unwrap()
            .extend([writer_task, receive_task]);
        // A close that raced this bind has already drained the task list;
        // stop the freshly spawned tasks it could not see.
        if self.is_closed() {
            for task in self.inner.tasks.lock().unwrap().drain(..) {
                task.abort();
            }
        }
        Ok(())
    }

    /// Send a request. The returned future resolves with the decoded
    /// response, with the peer's error message, or with an error when the
    /// request cannot be sent or the session shuts down first.
    pub fn send<T: Request>(&self, request: T) -> ResponseFuture<T::Response> {
        if self.is_closed() {
            return ResponseFuture::ready(Err(DapError::SessionClosed));
        }
        let arguments = match codec::encode(&request) {
            Ok(json) => json,
            Err(e) => return ResponseFuture::ready(Err(DapError::Codec(e))),
        };

        let (tx, rx) = oneshot::channel();
        let future = ResponseFuture::new(rx);
        let entry = PendingResponse {
            descriptor: type_of::<T::Response>(),
            complete: Box::new(move |outcome| {
                let result = match outcome {
                    ResponseOutcome::Body(body) => match codec::decode::<T::Response>(&body) {
                        Ok(response) => Ok(response),
                        Err(e) => {
                            let report = format!(
                                "failed to decode '{}' response: {e}",
                                T::schema_name()
                            );
                            let _ = tx.send(Err(DapError::Codec(e)));
                            return Err(report);
                        }
                    },
                    ResponseOutcome::Rejected(message) => Err(DapError::Rejected { message }),
                    ResponseOutcome::Failed(err) => Err(err),
                };
                let _ = tx.send(result);
                Ok(())
            }),
        };

        let mut send = self.inner.send.lock().unwrap();
        let Some(out) = send.tx.as_ref().cloned() else {
            drop(send);
            // No writer: either never bound, or a close won the race.
            let err = if self.is_closed() {
                DapError::SessionClosed
            } else {
                DapError::NotBound
            };
            let _ = (entry.complete)(ResponseOutcome::Failed(err));
            return future;
        };

        let seq = send.next_seq;
        send.next_seq += 1;

        let mut frame = serde_json::Map::new();
        frame.insert("seq".into(), Json::from(seq));
        frame.insert("type".into(), Json::from("request"));
        frame.insert("command".into(), Json::from(T::schema_name().as_ref()));
        frame.insert("arguments".into(), arguments);
        let payload = serde_json::to_vec(&Json::Object(frame)).expect("frame serializes");

        // The pending entry must exist before the frame can reach the
        // wire; both happen under the send lock, so shutdown cannot slip
        // between them and orphan the slot.
        self.inner.pending.lock().unwrap().insert(seq, entry);
        if out.send(Outbound {
            payload,
            sent: None,
        })
        .is_err()
        {
            if let Some(entry) = self.inner.pending.lock().unwrap().remove(&seq) {
                let _ = (entry.complete)(ResponseOutcome::Failed(DapError::SendFailed));
            }
        }
        future
    }

    /// Send an event.
    pub fn send_event<T: Event>(&self, event: T) -> Result<(), DapError> {
        if self.is_closed() {
            return Err(DapError::SessionClosed);
        }
        let body = codec::encode(&event)?;

        let mut send = self.inner.send.lock().unwrap();
        let out = send.tx.as_ref().cloned().ok_or_else(|| {
            if self.is_closed() {
                DapError::SessionClosed
            } else {
                DapError::NotBound
            }
        })?;
        let seq = send.next_seq;
        send.next_seq += 1;

        let mut frame = serde_json::Map::new();
        frame.insert("seq".into(), Json::from(seq));
        frame.insert("type".into(), Json::from("event"));
        frame.insert("event".into(), Json::from(T::schema_name().as_ref()));
        frame.insert("body".into(), body);
        let payload = serde_json::to_vec(&Json::Object(frame)).expect("frame serializes");

        out.send(Outbound {
            payload,
            sent: None,
        })
        .map_err(|_| DapError::SendFailed)
    }

    /// Shut the session down: the receive loop stops, every pending
    /// response resolves with [`DapError::SessionClosed`], and subsequent
    /// sends fail synchronously. Idempotent.
    pub fn close(&self) {
        self.inner.shutdown();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("closed", &self.is_closed())
            .field("pending", &self.inner.pending.lock().unwrap().len())
            .finish()
    }
}

impl Inner {
    fn report(&self, message: &str) {
        let handler = self.error_handler.lock().unwrap().clone();
        match handler {
            Some(handler) => (*handler)(message),
            None => warn!("{message}"),
        }
    }

    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.send.lock().unwrap().tx = None;
        let pending: Vec<PendingResponse> = {
            let mut map = self.pending.lock().unwrap();
            map.drain().map(|(_, entry)| entry).collect()
        };
        for entry in pending {
            let _ = (entry.complete)(ResponseOutcome::Failed(DapError::SessionClosed));
        }
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap());
        for task in tasks {
            task.abort();
        }
    }

    fn process(&self, payload: &[u8]) {
        // Handlers are never invoked once the session has shut down.
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let json = match codec::parse(payload) {
            Ok(json) => json,
            Err(e) => {
                self.report(&format!("failed to parse message: {e}"));
                return;
            }
        };
        match json.get("type").and_then(Json::as_str) {
            Some("request") => self.process_request(&json),
            Some("response") => self.process_response(&json),
            Some("event") => self.process_event(&json),
            Some(other) => self.report(&format!("unknown message type '{other}'")),
            None => self.report("message is missing a 'type' field"),
        }
    }

    fn process_request(&self, json: &Json) {
        let Some(seq) = json.get("seq").and_then(Json::as_i64) else {
            self.report("request is missing a 'seq' field");
            return;
        };
        let Some(command) = json.get("command").and_then(Json::as_str) else {
            self.report("request is missing a 'command' field");
            return;
        };

        let entry = {
            let handlers = self.request_handlers.lock().unwrap();
            handlers
                .get(command)
                .map(|entry| (entry.response_name.clone(), entry.adapter.clone()))
        };
        let Some((response_name, adapter)) = entry else {
            let message = format!("no handler for request '{command}'");
            self.report(&message);
            self.enqueue_response(seq, command, Err(message), None);
            return;
        };

        let arguments = json.get("arguments");
        let reply = match panic::catch_unwind(AssertUnwindSafe(|| (*adapter)(arguments))) {
            Ok(reply) => reply,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.report(&format!("handler for '{command}' panicked: {message}"));
                self.enqueue_response(seq, command, Err(message), Some(response_name));
                return;
            }
        };

        match reply {
            RequestReply::Success(body) => {
                self.enqueue_response(seq, command, Ok(body), Some(response_name));
            }
            RequestReply::Rejected(message) => {
                self.enqueue_response(seq, command, Err(message), Some(response_name));
            }
            RequestReply::Malformed(message) => {
                self.report(&message);
                self.enqueue_response(seq, command, Err(message), Some(response_name));
            }
        }
    }

    // Emit a response frame for a served request. Successful responses
    // carry `body`; failed ones carry `message` and omit `body`. The
    // response-sent hook fires from the writer task after the write.
    fn enqueue_response(
        &self,
        request_seq: i64,
        command: &str,
        outcome: Result<Json, String>,
        response_name: Option<String>,
    ) {
        let mut send = self.send.lock().unwrap();
        let Some(out) = send.tx.as_ref().cloned() else {
            debug!(command, "response dropped: session is shutting down");
            return;
        };
        let seq = send.next_seq;
        send.next_seq += 1;

        let mut frame = serde_json::Map::new();
        frame.insert("seq".into(), Json::from(seq));
        frame.insert("type".into(), Json::from("response"));
        frame.insert("request_seq".into(), Json::from(request_seq));
        frame.insert("success".into(), Json::from(outcome.is_ok()));
        frame.insert("command".into(), Json::from(command));
        match &outcome {
            Ok(body) => {
                frame.insert("body".into(), body.clone());
            }
            Err(message) => {
                frame.insert("message".into(), Json::from(message.as_str()));
            }
        }
        let payload = serde_json::to_vec(&Json::Object(frame)).expect("frame serializes");

        let sent = response_name.map(|response_name| SentNotice {
            response_name,
            outcome,
        });
        let _ = out.send(Outbound { payload, sent });
    }

    fn process_event(&self, json: &Json) {
        let Some(name) = json.get("event").and_then(Json::as_str) else {
            self.report("event is missing an 'event' field");
            return;
        };
        let adapter = self.event_handlers.lock().unwrap().get(name).cloned();
        let Some(adapter) = adapter else {
            // Unlike requests, events without a handler are not an error.
            debug!(event = name, "ignoring event without handler");
            return;
        };

        let body = json.get("body");
        match panic::catch_unwind(AssertUnwindSafe(|| (*adapter)(body))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.report(&format!("failed to decode '{name}' event: {e}")),
            Err(payload) => self.report(&format!(
                "handler for event '{name}' panicked: {}",
                panic_message(payload.as_ref())
            )),
        }
    }

    fn process_response(&self, json: &Json) {
        let Some(request_seq) = json.get("request_seq").and_then(Json::as_i64) else {
            self.report("response is missing a 'request_seq' field");
            return;
        };
        let Some(entry) = self.pending.lock().unwrap().remove(&request_seq) else {
            self.report(&format!("unknown response seq {request_seq}"));
            return;
        };
        debug!(
            seq = request_seq,
            response = entry.descriptor.name(),
            "correlated response"
        );

        let success = json.get("success").and_then(Json::as_bool).unwrap_or(false);
        let outcome = if success {
            ResponseOutcome::Body(json.get("body").cloned().unwrap_or(Json::Null))
        } else {
            let message = json
                .get("message")
                .and_then(Json::as_str)
                .unwrap_or("unknown error")
                .to_string();
            ResponseOutcome::Rejected(message)
        };
        if let Err(report) = (entry.complete)(outcome) {
            self.report(&report);
        }
    }

    fn notify_response_sent(&self, notice: SentNotice) {
        let adapter = self
            .sent_handlers
            .lock()
            .unwrap()
            .get(&notice.response_name)
            .cloned();
        let Some(adapter) = adapter else {
            return;
        };
        let outcome = match &notice.outcome {
            Ok(body) => Ok(body),
            Err(message) => Err(message.as_str()),
        };
        if panic::catch_unwind(AssertUnwindSafe(|| (*adapter)(outcome))).is_err() {
            self.report(&format!(
                "response-sent hook for '{}' panicked",
                notice.response_name
            ));
        }
    }
}

async fn run_writer<W>(inner: Arc<Inner>, mut rx: mpsc::UnboundedReceiver<Outbound>, writer: W)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut sink = ContentWriter::new(writer);
    while let Some(outbound) = rx.recv().await {
        if let Err(e) = sink.write(&outbound.payload).await {
            inner.report(&e.to_string());
            inner.shutdown();
            return;
        }
        if let Some(notice) = outbound.sent {
            inner.notify_response_sent(notice);
        }
    }
}

async fn run_receive<R>(inner: Arc<Inner>, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut source = ContentReader::new(reader);
    loop {
        match source.read().await {
            Ok(Some(payload)) => inner.process(&payload),
            Ok(None) => break,
            Err(e) => {
                inner.report(&e.to_string());
                break;
            }
        }
    }
    inner.shutdown();
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
