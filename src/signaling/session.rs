//! Signaling session
//!
//! Maintains exactly one logical session with the broadcast-control server:
//! connect/authenticate, automatic reconnect with capped backoff, correlation
//! of outgoing requests with their asynchronous responses, and fan-out of
//! server-pushed events.
//!
//! Transient network loss is absorbed by the built-in retry loop and only
//! surfaces as [`SessionEvent`] notifications; callers never see it as an
//! error. An authentication rejection carrying a server code is fatal and
//! stops the retry loop.

use super::protocol::{
    ClientMessage, Credentials, MediaKind, ResponseEnvelope, ServerMessage, TrackDescriptor,
};
use super::state::{ConnectionState, SessionEvent};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// First reconnect delay
const RECONNECT_INITIAL_DELAY: Duration = Duration::from_secs(1);
/// Backoff cap
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(5);
/// Per-attempt connection timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Handshake acknowledgement timeout
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Signaling-related errors
#[derive(Error, Debug)]
pub enum SignalingError {
    #[error("not connected to signaling server")]
    NotConnected,

    #[error("authentication failed (code {code:?}): {msg}")]
    AuthenticationFailed { code: Option<i64>, msg: String },

    #[error("request failed (code {code:?}): {msg}")]
    RequestFailed { code: Option<i64>, msg: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] serde_json::Error),
}

pub type SignalingResult<T> = Result<T, SignalingError>;

struct SessionInner {
    endpoint: String,
    client_id: String,
    state: RwLock<ConnectionState>,
    events: broadcast::Sender<SessionEvent>,
    pending: Mutex<HashMap<u64, oneshot::Sender<ResponseEnvelope>>>,
    next_request: AtomicU64,
    /// Sender into the websocket writer task, present only while connected
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    /// Set when the server rejected the handshake with a code; cleared by
    /// the next connect
    auth_failure: Mutex<Option<(Option<i64>, String)>>,
    /// Last confirmed readiness set, re-asserted after reconnect
    ready_tracks: Mutex<Vec<TrackDescriptor>>,
    is_ready: AtomicBool,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionInner {
    fn set_state(&self, new: ConnectionState) {
        let changed = {
            let mut state = self.state.write();
            if *state == new {
                false
            } else {
                *state = new;
                true
            }
        };
        if changed {
            tracing::debug!("signaling state -> {:?}", new);
            let _ = self.events.send(SessionEvent::StateChanged(new));
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Fail all in-flight requests; their awaiting callers get `NotConnected`.
    fn fail_pending(&self) {
        let dropped: Vec<_> = self.pending.lock().drain().collect();
        if !dropped.is_empty() {
            tracing::debug!("dropping {} in-flight requests", dropped.len());
        }
    }

    fn handle_text(&self, text: &str) {
        let msg: ServerMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("ignoring unparsable server message: {}", e);
                return;
            }
        };
        match msg {
            ServerMessage::Response { id, envelope } => {
                if let Some(tx) = self.pending.lock().remove(&id) {
                    let _ = tx.send(envelope);
                } else {
                    tracing::warn!("response for unknown request id {}", id);
                }
            }
            ServerMessage::Event { ack_id, event } => {
                self.emit(SessionEvent::Server { ack_id, event });
            }
            ServerMessage::HandshakeAck { .. } => {
                tracing::warn!("unexpected handshake ack outside handshake");
            }
        }
    }

    async fn request(&self, name: &str, payload: Value) -> SignalingResult<ResponseEnvelope> {
        if *self.state.read() != ConnectionState::Connected {
            if let Some((code, msg)) = self.auth_failure.lock().clone() {
                return Err(SignalingError::AuthenticationFailed { code, msg });
            }
            return Err(SignalingError::NotConnected);
        }
        let id = self.next_request.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let text = serde_json::to_string(&ClientMessage::Request {
            id,
            name: name.to_string(),
            payload,
        })?;
        let sent = self
            .outbound
            .lock()
            .as_ref()
            .map(|out| out.send(Message::Text(text)).is_ok())
            .unwrap_or(false);
        if !sent {
            self.pending.lock().remove(&id);
            return Err(SignalingError::NotConnected);
        }

        // No built-in request timeout; the caller imposes one if desired.
        rx.await.map_err(|_| SignalingError::NotConnected)
    }

    fn send_raw(&self, msg: Message) -> SignalingResult<()> {
        let sent = self
            .outbound
            .lock()
            .as_ref()
            .map(|out| out.send(msg).is_ok())
            .unwrap_or(false);
        if sent {
            Ok(())
        } else {
            Err(SignalingError::NotConnected)
        }
    }
}

/// One logical session with the broadcast-control server
pub struct SignalingSession {
    inner: Arc<SessionInner>,
}

impl SignalingSession {
    /// Create a session for the given websocket endpoint. No connection is
    /// attempted until [`connect`](Self::connect).
    pub fn new(endpoint: impl Into<String>, client_id: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(SessionInner {
                endpoint: endpoint.into(),
                client_id: client_id.into(),
                state: RwLock::new(ConnectionState::Disconnected),
                events,
                pending: Mutex::new(HashMap::new()),
                next_request: AtomicU64::new(0),
                outbound: Mutex::new(None),
                auth_failure: Mutex::new(None),
                ready_tracks: Mutex::new(Vec::new()),
                is_ready: AtomicBool::new(false),
                shutdown: Mutex::new(None),
                task: Mutex::new(None),
            }),
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read()
    }

    /// Subscribe to session events. The returned receiver is the
    /// subscription handle; drop it to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Connect (or replace the current transport) with the given credentials.
    ///
    /// Resolves on the first definitive outcome: `true` once the handshake is
    /// acknowledged, `false` on a transient first-attempt failure (the
    /// built-in retry keeps going) or on an authentication rejection carrying
    /// a server code (fatal, retries stop).
    pub async fn connect(
        &self,
        alias: &str,
        user_id: &str,
        token: &str,
    ) -> SignalingResult<bool> {
        self.disconnect().await;
        *self.inner.auth_failure.lock() = None;

        let credentials = Credentials {
            client_id: self.inner.client_id.clone(),
            alias: alias.to_string(),
            user_id: user_id.to_string(),
            token: token.to_string(),
        };

        let (first_tx, first_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.inner.shutdown.lock() = Some(shutdown_tx);

        let inner = self.inner.clone();
        let handle = tokio::spawn(run_connection(inner, credentials, shutdown_rx, first_tx));
        *self.inner.task.lock() = Some(handle);

        first_rx
            .await
            .map_err(|_| SignalingError::Transport("connection task ended prematurely".into()))
    }

    /// Send a correlated request and await its single reply.
    ///
    /// Fails immediately with [`SignalingError::NotConnected`] when the
    /// transport is down; failed requests are never retried internally.
    pub async fn request(&self, name: &str, payload: Value) -> SignalingResult<ResponseEnvelope> {
        self.inner.request(name, payload).await
    }

    /// Tear the session down. Idempotent; stops the retry loop and fails all
    /// in-flight requests.
    pub async fn disconnect(&self) {
        let (shutdown, task) = {
            (
                self.inner.shutdown.lock().take(),
                self.inner.task.lock().take(),
            )
        };
        if let Some(tx) = shutdown {
            let _ = tx.send(true);
        }
        if let Some(mut handle) = task {
            if timeout(Duration::from_secs(1), &mut handle).await.is_err() {
                handle.abort();
            }
        }
        self.inner.fail_pending();
        self.inner.set_state(ConnectionState::Disconnected);
    }

    // ----- typed request helpers -----

    /// Fetch contest info for the authenticated participant
    pub async fn get_contest_info(&self) -> SignalingResult<ResponseEnvelope> {
        self.request("getContestInfo", Value::Null).await
    }

    /// Confirm the finalized, publishable track set. On success the set is
    /// remembered and re-asserted automatically after every reconnect.
    pub async fn confirm_ready(
        &self,
        tracks: Vec<TrackDescriptor>,
    ) -> SignalingResult<ResponseEnvelope> {
        let envelope = self
            .request("confirmReady", json!({ "tracks": tracks }))
            .await?;
        if envelope.success {
            *self.inner.ready_tracks.lock() = tracks;
            self.inner.is_ready.store(true, Ordering::SeqCst);
        }
        Ok(envelope)
    }

    /// Withdraw readiness
    pub async fn cancel_ready(&self) -> SignalingResult<ResponseEnvelope> {
        let envelope = self.request("cancelReady", Value::Null).await?;
        if envelope.success {
            self.inner.ready_tracks.lock().clear();
            self.inner.is_ready.store(false, Ordering::SeqCst);
        }
        Ok(envelope)
    }

    /// Finish the media-transport DTLS handshake
    pub async fn complete_connect_transport(
        &self,
        dtls_parameters: Value,
    ) -> SignalingResult<ResponseEnvelope> {
        self.request(
            "completeConnectTransport",
            json!({ "dtlsParameters": dtls_parameters }),
        )
        .await
    }

    /// Publish a track on the negotiated transport; returns the
    /// transport-scoped producer id.
    pub async fn produce(
        &self,
        kind: MediaKind,
        rtp_parameters: Value,
        app_data: Value,
    ) -> SignalingResult<String> {
        let envelope = self
            .request(
                "produce",
                json!({
                    "kind": kind,
                    "rtpParameters": rtp_parameters,
                    "appData": app_data,
                }),
            )
            .await?;
        if !envelope.success {
            return Err(SignalingError::RequestFailed {
                code: envelope.code,
                msg: envelope.msg.unwrap_or_default(),
            });
        }
        envelope
            .payload
            .as_ref()
            .and_then(|p| p.get("producerId"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                SignalingError::MalformedResponse("produce reply missing producerId".into())
            })
    }

    /// Acknowledge a server event that carried an ack id
    pub async fn ack_event(
        &self,
        ack_id: u64,
        envelope: ResponseEnvelope,
    ) -> SignalingResult<()> {
        let text = serde_json::to_string(&ClientMessage::EventAck { ack_id, envelope })?;
        self.inner.send_raw(Message::Text(text))
    }
}

/// Connection driver: one websocket lifetime per loop iteration, with capped
/// backoff between attempts. Unbounded retries until explicit close or a
/// coded authentication rejection.
async fn run_connection(
    inner: Arc<SessionInner>,
    credentials: Credentials,
    mut shutdown: watch::Receiver<bool>,
    first: oneshot::Sender<bool>,
) {
    let mut first = Some(first);
    let mut delay = RECONNECT_INITIAL_DELAY;
    let mut attempt: u32 = 0;

    loop {
        if *shutdown.borrow() {
            break;
        }
        attempt += 1;
        inner.set_state(ConnectionState::Connecting);
        if attempt > 1 {
            inner.emit(SessionEvent::ReconnectAttempt(attempt - 1));
        }

        let connected = tokio::select! {
            _ = shutdown.changed() => break,
            res = timeout(CONNECT_TIMEOUT, connect_async(inner.endpoint.as_str())) => res,
        };

        let stream = match connected {
            Ok(Ok((ws, _resp))) => ws,
            Ok(Err(e)) => {
                report_attempt_failure(&inner, &mut first, e.to_string());
                if sleep_backoff(&mut shutdown, &mut delay).await {
                    break;
                }
                continue;
            }
            Err(_) => {
                report_attempt_failure(&inner, &mut first, "connection timed out".into());
                if sleep_backoff(&mut shutdown, &mut delay).await {
                    break;
                }
                continue;
            }
        };

        match drive_transport(&inner, stream, &credentials, &mut shutdown, &mut first).await {
            TransportOutcome::Fatal => {
                inner.fail_pending();
                inner.emit(SessionEvent::TransportLost);
                inner.set_state(ConnectionState::Disconnected);
                return;
            }
            TransportOutcome::Explicit => break,
            TransportOutcome::Transient => {
                // Retry is in flight, so observers see Connecting, not
                // Disconnected.
                inner.set_state(ConnectionState::Connecting);
                if sleep_backoff(&mut shutdown, &mut delay).await {
                    break;
                }
            }
            TransportOutcome::Served => {
                // Connection lived; start a fresh backoff cycle. The next
                // attempt is still a reconnect and must be observable as one.
                delay = RECONNECT_INITIAL_DELAY;
                attempt = 1;
                inner.set_state(ConnectionState::Connecting);
                if sleep_backoff(&mut shutdown, &mut delay).await {
                    break;
                }
            }
        }
    }

    inner.fail_pending();
    inner.set_state(ConnectionState::Disconnected);
}

enum TransportOutcome {
    /// Authentication rejected with a server code; stop retrying
    Fatal,
    /// Close frame or local shutdown; stop retrying
    Explicit,
    /// Handshake never completed; retry after backoff
    Transient,
    /// Served traffic then dropped; retry with a fresh backoff cycle
    Served,
}

async fn drive_transport(
    inner: &Arc<SessionInner>,
    stream: WsStream,
    credentials: &Credentials,
    shutdown: &mut watch::Receiver<bool>,
    first: &mut Option<oneshot::Sender<bool>>,
) -> TransportOutcome {
    let (mut write, mut read) = stream.split();

    let handshake = ClientMessage::Handshake {
        credentials: credentials.clone(),
    };
    let text = match serde_json::to_string(&handshake) {
        Ok(text) => text,
        Err(e) => {
            report_attempt_failure(inner, first, e.to_string());
            return TransportOutcome::Transient;
        }
    };
    if let Err(e) = write.send(Message::Text(text)).await {
        report_attempt_failure(inner, first, e.to_string());
        return TransportOutcome::Transient;
    }

    // Await the handshake acknowledgement before surfacing Connected.
    let ack = timeout(HANDSHAKE_TIMEOUT, async {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Ok(ServerMessage::HandshakeAck { success, code, msg }) =
                        serde_json::from_str(&text)
                    {
                        return Some((success, code, msg));
                    }
                }
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => {}
            }
        }
        None
    })
    .await;

    match ack {
        Ok(Some((true, _, _))) => {}
        Ok(Some((false, Some(code), msg))) => {
            // Server-supplied error code: fatal, tear down, no retries.
            let msg = msg.unwrap_or_default();
            tracing::error!(
                "authentication rejected by server (code {}): {}",
                code,
                msg
            );
            *inner.auth_failure.lock() = Some((Some(code), msg));
            if let Some(tx) = first.take() {
                let _ = tx.send(false);
            }
            return TransportOutcome::Fatal;
        }
        Ok(Some((false, None, msg))) => {
            report_attempt_failure(
                inner,
                first,
                msg.unwrap_or_else(|| "handshake refused".into()),
            );
            return TransportOutcome::Transient;
        }
        Ok(None) | Err(_) => {
            report_attempt_failure(inner, first, "handshake did not complete".into());
            return TransportOutcome::Transient;
        }
    }

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    *inner.outbound.lock() = Some(out_tx);
    inner.set_state(ConnectionState::Connected);
    if let Some(tx) = first.take() {
        let _ = tx.send(true);
    }

    // Re-assert readiness exactly once per (re)connect if it was confirmed
    // with a non-empty track set before the disconnect.
    if inner.is_ready.load(Ordering::SeqCst) {
        let tracks = inner.ready_tracks.lock().clone();
        if !tracks.is_empty() {
            let reassert = inner.clone();
            tokio::spawn(async move {
                match reassert
                    .request("confirmReady", json!({ "tracks": tracks }))
                    .await
                {
                    Ok(env) if env.success => tracing::info!("readiness re-asserted"),
                    Ok(env) => tracing::warn!("readiness re-assert refused: {:?}", env.msg),
                    Err(e) => tracing::warn!("readiness re-assert failed: {}", e),
                }
            });
        }
    }

    let mut explicit = false;
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                explicit = true;
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            Some(out) = out_rx.recv() => {
                if write.send(out).await.is_err() {
                    break;
                }
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => inner.handle_text(&text),
                Some(Ok(Message::Ping(body))) => {
                    let _ = write.send(Message::Pong(body)).await;
                }
                Some(Ok(Message::Close(_))) => {
                    // Explicit close by the server: no automatic retry.
                    explicit = true;
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("signaling transport error: {}", e);
                    break;
                }
                None => break,
            }
        }
    }

    *inner.outbound.lock() = None;
    inner.fail_pending();
    // Producers bound to the dropped channel are invalid either way.
    inner.emit(SessionEvent::TransportLost);

    if explicit || *shutdown.borrow() {
        TransportOutcome::Explicit
    } else {
        TransportOutcome::Served
    }
}

fn report_attempt_failure(
    inner: &Arc<SessionInner>,
    first: &mut Option<oneshot::Sender<bool>>,
    reason: String,
) {
    tracing::warn!("signaling connect attempt failed: {}", reason);
    if let Some(tx) = first.take() {
        let _ = tx.send(false);
    }
    inner.emit(SessionEvent::ReconnectError(reason));
}

/// Returns true when shutdown was requested during the wait
async fn sleep_backoff(shutdown: &mut watch::Receiver<bool>, delay: &mut Duration) -> bool {
    let wait = *delay;
    *delay = (*delay * 2).min(RECONNECT_MAX_DELAY);
    tokio::select! {
        _ = shutdown.changed() => true,
        _ = tokio::time::sleep(wait) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream::SplitSink;
    use std::future::Future;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    type ServerWs = WebSocketStream<TcpStream>;
    type ServerSink = SplitSink<ServerWs, Message>;

    async fn spawn_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(TcpListener) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(handler(listener));
        format!("ws://{}", addr)
    }

    async fn accept_ws(listener: &TcpListener) -> ServerWs {
        let (stream, _) = listener.accept().await.unwrap();
        accept_async(stream).await.unwrap()
    }

    /// Read the handshake and acknowledge it
    async fn ack_handshake(ws: ServerWs, success: bool, code: Option<i64>) -> ServerWs {
        let (mut write, mut read) = ws.split();
        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    let msg: ClientMessage = serde_json::from_str(&text).unwrap();
                    assert!(matches!(msg, ClientMessage::Handshake { .. }));
                    break;
                }
                Some(Ok(_)) => continue,
                other => panic!("expected handshake, got {:?}", other),
            }
        }
        let ack = serde_json::to_string(&ServerMessage::HandshakeAck {
            success,
            code,
            msg: None,
        })
        .unwrap();
        write.send(Message::Text(ack)).await.unwrap();
        write.reunite(read).unwrap()
    }

    async fn reply_to_request(
        write: &mut ServerSink,
        text: &str,
        payload: Option<Value>,
    ) -> String {
        let msg: ClientMessage = serde_json::from_str(text).unwrap();
        match msg {
            ClientMessage::Request { id, name, .. } => {
                let reply = serde_json::to_string(&ServerMessage::Response {
                    id,
                    envelope: ResponseEnvelope::ok(payload),
                })
                .unwrap();
                write.send(Message::Text(reply)).await.unwrap();
                name
            }
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn connect_resolves_true_on_handshake_ack() {
        let url = spawn_server(|listener| async move {
            let ws = accept_ws(&listener).await;
            let mut ws = ack_handshake(ws, true, None).await;
            // Hold the connection open until the client goes away.
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let session = SignalingSession::new(url, "client-1");
        let ok = session.connect("alice", "u1", "tok").await.unwrap();
        assert!(ok);
        assert_eq!(session.state(), ConnectionState::Connected);
        session.disconnect().await;
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn coded_rejection_is_fatal() {
        let url = spawn_server(|listener| async move {
            let ws = accept_ws(&listener).await;
            let _ws = ack_handshake(ws, false, Some(401)).await;
        })
        .await;

        let session = SignalingSession::new(url, "client-1");
        let mut events = session.subscribe();
        let ok = session.connect("alice", "u1", "bad-token").await.unwrap();
        assert!(!ok);

        // No retry may follow a coded rejection.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(session.state(), ConnectionState::Disconnected);
        while let Ok(event) = events.try_recv() {
            assert!(
                !matches!(event, SessionEvent::ReconnectAttempt(_)),
                "unexpected reconnect after fatal auth failure"
            );
        }
    }

    #[tokio::test]
    async fn requests_after_coded_rejection_report_auth_failure() {
        let url = spawn_server(|listener| async move {
            let ws = accept_ws(&listener).await;
            let _ws = ack_handshake(ws, false, Some(401)).await;
        })
        .await;

        let session = SignalingSession::new(url, "client-1");
        assert!(!session.connect("alice", "u1", "bad-token").await.unwrap());

        let err = session.request("getContestInfo", Value::Null).await;
        assert!(matches!(
            err,
            Err(SignalingError::AuthenticationFailed {
                code: Some(401),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn automatic_reconnect_emits_attempt_events() {
        let url = spawn_server(|listener| async move {
            // First connection: ack, then drop abruptly.
            let ws = accept_ws(&listener).await;
            let ws = ack_handshake(ws, true, None).await;
            drop(ws);
            // Second connection: ack and hold.
            let ws = accept_ws(&listener).await;
            let mut ws = ack_handshake(ws, true, None).await;
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let session = SignalingSession::new(url, "client-1");
        let mut events = session.subscribe();
        assert!(session.connect("alice", "u1", "tok").await.unwrap());

        // Skip the initial connect notification.
        timeout(Duration::from_secs(5), async {
            loop {
                if let SessionEvent::StateChanged(ConnectionState::Connected) =
                    events.recv().await.unwrap()
                {
                    break;
                }
            }
        })
        .await
        .unwrap();

        // The dropped connection must come back as an observable reconnect.
        let mut saw_attempt = false;
        timeout(Duration::from_secs(10), async {
            loop {
                match events.recv().await.unwrap() {
                    SessionEvent::ReconnectAttempt(n) => {
                        assert_eq!(n, 1);
                        saw_attempt = true;
                    }
                    SessionEvent::StateChanged(ConnectionState::Connected) => break,
                    _ => {}
                }
            }
        })
        .await
        .unwrap();
        assert!(saw_attempt, "reconnect happened without an attempt event");
        session.disconnect().await;
    }

    #[tokio::test]
    async fn request_fails_without_connection() {
        let session = SignalingSession::new("ws://127.0.0.1:9", "client-1");
        let err = session.request("getContestInfo", Value::Null).await;
        assert!(matches!(err, Err(SignalingError::NotConnected)));
    }

    #[tokio::test]
    async fn request_response_correlation() {
        let url = spawn_server(|listener| async move {
            let ws = accept_ws(&listener).await;
            let ws = ack_handshake(ws, true, None).await;
            let (mut write, mut read) = ws.split();
            while let Some(Ok(msg)) = read.next().await {
                if let Message::Text(text) = msg {
                    reply_to_request(&mut write, &text, Some(json!({"producerId": "p-7"})))
                        .await;
                }
            }
        })
        .await;

        let session = SignalingSession::new(url, "client-1");
        assert!(session.connect("alice", "u1", "tok").await.unwrap());

        let producer = session
            .produce(MediaKind::Video, json!({}), json!({"trackId": "camera_main"}))
            .await
            .unwrap();
        assert_eq!(producer, "p-7");
        session.disconnect().await;
    }

    #[tokio::test]
    async fn reconnect_reasserts_readiness() {
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<String>();
        let url = spawn_server(move |listener| async move {
            // First connection: ack, serve confirmReady, then drop abruptly.
            let ws = accept_ws(&listener).await;
            let ws = ack_handshake(ws, true, None).await;
            let (mut write, mut read) = ws.split();
            if let Some(Ok(Message::Text(text))) = read.next().await {
                let name = reply_to_request(&mut write, &text, None).await;
                seen_tx.send(name).unwrap();
            }
            drop(write);
            drop(read);

            // Second connection: the client reconnects and re-asserts.
            let ws = accept_ws(&listener).await;
            let ws = ack_handshake(ws, true, None).await;
            let (mut write, mut read) = ws.split();
            if let Some(Ok(Message::Text(text))) = read.next().await {
                let name = reply_to_request(&mut write, &text, None).await;
                seen_tx.send(name).unwrap();
            }
            while let Some(Ok(_)) = read.next().await {}
        })
        .await;

        let session = SignalingSession::new(url, "client-1");
        assert!(session.connect("alice", "u1", "tok").await.unwrap());

        let tracks = vec![TrackDescriptor {
            track_id: "camera_main".into(),
            kind: MediaKind::Video,
        }];
        let env = session.confirm_ready(tracks).await.unwrap();
        assert!(env.success);
        assert_eq!(seen_rx.recv().await.unwrap(), "confirmReady");

        // The server drops the socket; the session must come back Connected
        // and re-issue confirmReady exactly once.
        let reasserted = timeout(Duration::from_secs(10), seen_rx.recv())
            .await
            .expect("readiness was not re-asserted")
            .unwrap();
        assert_eq!(reasserted, "confirmReady");
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(session.state(), ConnectionState::Connected);
        assert!(seen_rx.try_recv().is_err(), "confirmReady sent more than once");
        session.disconnect().await;
    }

    #[tokio::test]
    async fn server_close_frame_means_disconnected() {
        let url = spawn_server(|listener| async move {
            let ws = accept_ws(&listener).await;
            let mut ws = ack_handshake(ws, true, None).await;
            ws.send(Message::Close(None)).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let session = SignalingSession::new(url, "client-1");
        assert!(session.connect("alice", "u1", "tok").await.unwrap());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn server_event_fans_out() {
        let url = spawn_server(|listener| async move {
            let ws = accept_ws(&listener).await;
            let mut ws = ack_handshake(ws, true, None).await;
            let event = r#"{
                "type": "event",
                "event": "replayRequest",
                "trackId": "camera_main",
                "startTime": 1.0,
                "endTime": 6.0
            }"#;
            ws.send(Message::Text(event.to_string())).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let session = SignalingSession::new(url, "client-1");
        let mut events = session.subscribe();
        assert!(session.connect("alice", "u1", "tok").await.unwrap());

        let got = timeout(Duration::from_secs(5), async {
            loop {
                if let SessionEvent::Server { event, .. } = events.recv().await.unwrap() {
                    return event;
                }
            }
        })
        .await
        .unwrap();
        match got {
            super::super::protocol::ServerEvent::ReplayRequest {
                track_id,
                start_time,
                end_time,
            } => {
                assert_eq!(track_id, "camera_main");
                assert_eq!(start_time, 1.0);
                assert_eq!(end_time, 6.0);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        session.disconnect().await;
    }
}
