// C6 — Transport Client: a persistent bidirectional framed channel to the
// proxy (§4.6, §6). Binary frames carry PCM; text frames carry JSON
// control messages; auto-reconnect is deliberately disabled (state
// transitions are explicit, per §9's policy choice of a long-lived framed
// transport rather than per-turn request/response).
//
// The wire client (`tokio-tungstenite`) is async, so the connection lives
// on a dedicated background thread running its own single-threaded tokio
// runtime — the same "one worker, one job" shape as the capture and
// playback stages, just fed by an async I/O loop instead of a blocking
// hardware call. Synchronous callers (the capture thread, in particular)
// bridge in via a bounded `tokio::sync::mpsc` channel plus a oneshot-style
// std channel for the per-call ack, so `send_audio` can enforce the 5s
// timeout without the caller touching async machinery itself.

use crate::error::{CoreError, CoreResult};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc as tokio_mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

pub type OnBinary = Arc<dyn Fn(&[u8]) + Send + Sync>;
pub type OnState = Arc<dyn Fn(bool, u16) + Send + Sync>;
pub type OnSpeech = Arc<dyn Fn(bool) + Send + Sync>;

enum Command {
    SendAudio {
        bytes: Vec<u8>,
        ack: std_mpsc::Sender<CoreResult<()>>,
    },
    Disconnect,
}

pub struct TransportClient {
    endpoint_url: String,
    auth_token: Option<String>,
    send_timeout: Duration,
    keepalive: Duration,
    connected: Arc<AtomicBool>,
    cmd_tx: Mutex<Option<tokio_mpsc::Sender<Command>>>,
    worker: Option<JoinHandle<()>>,
    on_bin: OnBinary,
    on_state: OnState,
    on_speech: OnSpeech,
}

impl TransportClient {
    /// Construct an idle client. Mirrors §4.6 `init(url, on_bin, on_state,
    /// on_speech, user_ctx)` — the "user_ctx" is whatever the three
    /// closures close over.
    pub fn init(
        endpoint_url: impl Into<String>,
        auth_token: Option<String>,
        send_timeout: Duration,
        keepalive: Duration,
        on_bin: OnBinary,
        on_state: OnState,
        on_speech: OnSpeech,
    ) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            auth_token,
            send_timeout,
            keepalive,
            connected: Arc::new(AtomicBool::new(false)),
            cmd_tx: Mutex::new(None),
            worker: None,
            on_bin,
            on_state,
            on_speech,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire) && self.cmd_tx.lock().unwrap().is_some()
    }

    /// Start the client and block until the initial connect attempt
    /// succeeds or fails. On success, `on_state(true, 0)` has already
    /// fired by the time this returns.
    pub fn connect(&mut self) -> CoreResult<()> {
        if self.cmd_tx.lock().unwrap().is_some() {
            return Err(CoreError::InvalidArgument("already connected".into()));
        }

        let (ready_tx, ready_rx) = std_mpsc::channel::<CoreResult<()>>();
        let (cmd_tx, cmd_rx) = tokio_mpsc::channel::<Command>(16);

        let connected = Arc::clone(&self.connected);
        let on_bin = Arc::clone(&self.on_bin);
        let on_state = Arc::clone(&self.on_state);
        let on_speech = Arc::clone(&self.on_speech);
        let url = self.endpoint_url.clone();
        let auth_token = self.auth_token.clone();
        let keepalive = self.keepalive;

        let handle = thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    let _ = ready_tx.send(Err(CoreError::Fatal(format!(
                        "failed to start transport runtime: {e}"
                    ))));
                    return;
                }
            };
            runtime.block_on(run_client(
                url, auth_token, keepalive, cmd_rx, connected, on_bin, on_state, on_speech,
                ready_tx,
            ));
        });

        // Block the caller until the connection attempt resolves — the
        // background worker's own timeout budget bounds this wait.
        let wait = self.send_timeout.max(Duration::from_secs(10));
        match ready_rx.recv_timeout(wait) {
            Ok(Ok(())) => {
                self.worker = Some(handle);
                *self.cmd_tx.lock().unwrap() = Some(cmd_tx);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(CoreError::Timeout)
            }
        }
    }

    /// Send a binary audio frame. `bytes.is_empty()` is a legal
    /// end-of-turn marker. Blocks the caller for at most the configured
    /// send timeout.
    pub fn send_audio(&self, bytes: &[u8]) -> CoreResult<()> {
        let cmd_tx = {
            let guard = self.cmd_tx.lock().unwrap();
            match guard.as_ref() {
                Some(tx) => tx.clone(),
                None => return Err(CoreError::NotConnected),
            }
        };
        if !self.connected.load(Ordering::Acquire) {
            return Err(CoreError::NotConnected);
        }

        let (ack_tx, ack_rx) = std_mpsc::channel();
        if cmd_tx
            .blocking_send(Command::SendAudio {
                bytes: bytes.to_vec(),
                ack: ack_tx,
            })
            .is_err()
        {
            return Err(CoreError::NotConnected);
        }

        match ack_rx.recv_timeout(self.send_timeout) {
            Ok(result) => result,
            Err(_) => Err(CoreError::Timeout),
        }
    }

    /// Explicit close. `on_state(false, ..)` fires with the peer-supplied
    /// close code if one was received, else 0.
    pub fn disconnect(&mut self) {
        if let Some(cmd_tx) = self.cmd_tx.lock().unwrap().take() {
            let _ = cmd_tx.blocking_send(Command::Disconnect);
        }
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        self.connected.store(false, Ordering::Release);
    }

    pub fn destroy(mut self) {
        self.disconnect();
    }
}

impl Drop for TransportClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Narrow seam the session controller programs against, so it can be
/// exercised in tests without dialing a real socket.
pub trait AudioTransport: Send + Sync {
    fn send_audio(&self, bytes: &[u8]) -> CoreResult<()>;
    fn is_connected(&self) -> bool;
}

impl AudioTransport for TransportClient {
    fn send_audio(&self, bytes: &[u8]) -> CoreResult<()> {
        TransportClient::send_audio(self, bytes)
    }

    fn is_connected(&self) -> bool {
        TransportClient::is_connected(self)
    }
}

/// Deterministic stand-in for integration tests: records every frame handed
/// to it and reports whatever connectedness the test sets.
#[derive(Default)]
pub struct MockTransport {
    connected: AtomicBool,
    pub sent: Mutex<Vec<Vec<u8>>>,
}

impl MockTransport {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl AudioTransport for MockTransport {
    fn send_audio(&self, bytes: &[u8]) -> CoreResult<()> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(CoreError::NotConnected);
        }
        self.sent.lock().unwrap().push(bytes.to_vec());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_client(
    url: String,
    auth_token: Option<String>,
    keepalive: Duration,
    mut cmd_rx: tokio_mpsc::Receiver<Command>,
    connected: Arc<AtomicBool>,
    on_bin: OnBinary,
    on_state: OnState,
    on_speech: OnSpeech,
    ready_tx: std_mpsc::Sender<CoreResult<()>>,
) {
    let mut request = match url.as_str().into_client_request() {
        Ok(r) => r,
        Err(e) => {
            let _ = ready_tx.send(Err(CoreError::Fatal(format!("invalid endpoint url: {e}"))));
            return;
        }
    };
    if let Some(token) = &auth_token {
        if let Ok(value) = format!("Bearer {token}").parse() {
            request.headers_mut().insert("Authorization", value);
        }
    }

    let ws_stream = match tokio_tungstenite::connect_async(request).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(CoreError::Fatal(format!("connect failed: {e}"))));
            return;
        }
    };

    connected.store(true, Ordering::Release);
    on_state(true, 0);
    let _ = ready_tx.send(Ok(()));

    let (mut ws_sink, mut ws_source) = ws_stream.split();
    let mut keepalive_timer = tokio::time::interval(keepalive);
    keepalive_timer.tick().await; // first tick fires immediately; consume it

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::SendAudio { bytes, ack }) => {
                        let result = ws_sink
                            .send(Message::Binary(bytes))
                            .await
                            .map_err(|e| CoreError::Fatal(e.to_string()));
                        let _ = ack.send(result);
                    }
                    Some(Command::Disconnect) | None => {
                        let _ = ws_sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            maybe_msg = ws_source.next() => {
                match maybe_msg {
                    Some(Ok(Message::Binary(data))) => on_bin(&data),
                    Some(Ok(Message::Text(text))) => handle_text_frame(&text, &on_speech),
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.as_ref().map(|f| u16::from(f.code)).unwrap_or(0);
                        connected.store(false, Ordering::Release);
                        on_state(false, code);
                        break;
                    }
                    Some(Ok(Message::Ping(_))) => log::debug!("transport: ping received"),
                    Some(Ok(Message::Pong(_))) => log::debug!("transport: pong received"),
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        log::warn!("transport: receive error: {e}");
                        connected.store(false, Ordering::Release);
                        on_state(false, 0);
                        break;
                    }
                    None => {
                        connected.store(false, Ordering::Release);
                        on_state(false, 0);
                        break;
                    }
                }
            }
            _ = keepalive_timer.tick() => {
                if ws_sink.send(Message::Ping(Vec::new())).await.is_err() {
                    connected.store(false, Ordering::Release);
                    on_state(false, 0);
                    break;
                }
            }
        }
    }

    connected.store(false, Ordering::Release);
}

fn handle_text_frame(text: &str, on_speech: &OnSpeech) {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("transport: malformed JSON text frame: {e}");
            return;
        }
    };
    match value.get("type").and_then(|t| t.as_str()) {
        Some("speech_start") => on_speech(true),
        Some("speech_end") => on_speech(false),
        Some(other) => log::warn!("transport: unrecognized control message type '{other}'"),
        None => log::warn!("transport: text frame missing 'type' key"),
    }
}
