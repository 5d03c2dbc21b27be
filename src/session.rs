// C7 — Session Controller: owns the state machine, routes UI ingress to
// the capture/playback stages, and enforces the half-duplex mute gate.
// Speech-event and transport-state callbacks only flip shared flags — they
// never reenter a transport operation synchronously (§4.7), since they run
// on the transport's background thread.

use crate::capture::{CaptureConfig, CaptureStage};
use crate::config::AudioCoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::i2s::{I2sInput, I2sOutput};
use crate::identity;
use crate::kv::KvStore;
use crate::playback::{PlaybackEvent, PlaybackStage};
use crate::transport::AudioTransport;
use crate::ui::{Status, StatusSink, UiEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantState {
    Idle,
    Streaming,
    Error,
}

pub type I2sInputFactory = Arc<dyn Fn() -> CoreResult<Box<dyn I2sInput>> + Send + Sync>;
pub type I2sOutputFactory = Arc<dyn Fn() -> CoreResult<Box<dyn I2sOutput>> + Send + Sync>;

/// Owns both stage handles and the transport handle (§3 "Ownership
/// summary"). Each `RecordStart`/`RecordStop` cycle asks the factories for
/// a fresh device handle rather than reusing one across cycles, since
/// `CaptureStage`/`PlaybackStage` take ownership of theirs for the
/// lifetime of the worker thread.
pub struct SessionController {
    session_id: String,
    state: Arc<Mutex<AssistantState>>,
    mic_muted_for_speech: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    wifi_connected: Arc<AtomicBool>,
    capture: CaptureStage,
    playback: Arc<Mutex<PlaybackStage>>,
    transport: Option<Arc<dyn AudioTransport>>,
    status_sink: Option<StatusSink>,
    last_status: Mutex<Option<Status>>,
    input_factory: I2sInputFactory,
    output_factory: I2sOutputFactory,
}

impl SessionController {
    pub fn new(
        config: AudioCoreConfig,
        kv: &dyn KvStore,
        input_factory: I2sInputFactory,
        output_factory: I2sOutputFactory,
    ) -> Self {
        let session_id = identity::load_or_create(kv);
        let ring_capacity = config.playback_ring_capacity_bytes();
        let prebuffer = config.playback_prebuffer_bytes();
        let volume = config.volume_percent;
        Self {
            session_id,
            state: Arc::new(Mutex::new(AssistantState::Idle)),
            mic_muted_for_speech: Arc::new(AtomicBool::new(false)),
            connected: Arc::new(AtomicBool::new(false)),
            wifi_connected: Arc::new(AtomicBool::new(true)),
            capture: CaptureStage::new(),
            playback: Arc::new(Mutex::new(PlaybackStage::new(ring_capacity, prebuffer, volume))),
            transport: None,
            status_sink: None,
            last_status: Mutex::new(None),
            input_factory,
            output_factory,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> AssistantState {
        *self.state.lock().unwrap()
    }

    pub fn set_status_sink(&mut self, sink: StatusSink) {
        self.status_sink = Some(sink);
        self.emit_status();
    }

    /// Host informs the controller of Wi-Fi reachability. The Wi-Fi stack
    /// itself is out of scope (§1); this is its only required ingress.
    pub fn set_wifi_connected(&mut self, connected: bool) {
        self.wifi_connected.store(connected, Ordering::Release);
        self.emit_status();
    }

    /// Wire in an already-connected transport (or a `MockTransport` in
    /// tests).
    pub fn attach_transport(&mut self, transport: Arc<dyn AudioTransport>, connected: bool) {
        self.connected.store(connected, Ordering::Release);
        self.transport = Some(transport);
        self.emit_status();
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn is_muted_for_speech(&self) -> bool {
        self.mic_muted_for_speech.load(Ordering::Acquire)
    }

    /// `C6.recv_text(type=speech_start|speech_end) -> C7.speech_event`.
    /// Only flips the mute flag — never touches capture/transport directly.
    pub fn apply_speech_event(&self, speaking: bool) {
        self.mic_muted_for_speech.store(speaking, Ordering::Release);
    }

    /// Transport state callback. A disconnect while `Streaming` is a fatal
    /// condition per §3's state table; `Idle` just records disconnection.
    pub fn apply_transport_state(&self, connected: bool, close_code: u16) {
        self.connected.store(connected, Ordering::Release);
        if !connected {
            let mut state = self.state.lock().unwrap();
            if *state == AssistantState::Streaming {
                log::warn!("session: transport dropped mid-stream (close code {close_code})");
                *state = AssistantState::Error;
            }
        }
        self.emit_status();
    }

    /// Playback-path binary frames land here (`C6.recv_bin -> C5.ring`).
    pub fn apply_incoming_audio(&self, bytes: &[u8]) -> CoreResult<()> {
        self.playback.lock().unwrap().stream_write(bytes).map(|_| ())
    }

    /// `Idle -> Streaming` on `RecordStart` when `connected == true`. Also
    /// accepts `Error`, since a fatal failure is recoverable by the next
    /// `RecordStart` attempt once the transport has reconnected — the
    /// operator does not need to cycle through `RecordStop` first.
    fn record_start(&mut self) -> CoreResult<()> {
        if self.state() == AssistantState::Streaming {
            return Err(CoreError::InvalidArgument(
                "record_start requires Idle or Error state".into(),
            ));
        }
        if !self.is_connected() {
            return Err(CoreError::NotReady);
        }
        let transport = self.transport.clone().ok_or(CoreError::NotConnected)?;
        let mute_flag = Arc::clone(&self.mic_muted_for_speech);
        let state_for_errors = Arc::clone(&self.state);

        let input = (self.input_factory)()?;
        let sink = Box::new(move |bytes: &[u8]| {
            if mute_flag.load(Ordering::Acquire) {
                // Half-duplex interlock: capture keeps running, frames are
                // simply not forwarded while the remote end is speaking.
                return;
            }
            if let Err(e) = transport.send_audio(bytes) {
                match e {
                    CoreError::Fatal(_) => {
                        log::error!(
                            "session: fatal transport error on send, entering Error state: {e}"
                        );
                        *state_for_errors.lock().unwrap() = AssistantState::Error;
                    }
                    _ => log::warn!("session: dropped capture chunk: {e}"),
                }
            }
        });
        self.capture.start(input, sink, CaptureConfig::default())?;

        // Tear down any stale playback stream left open by a prior turn
        // (the assistant may still have been speaking when this RecordStart
        // arrived) before starting the fresh one (spec.md:124).
        self.playback.lock().unwrap().stream_end();

        let output = match (self.output_factory)() {
            Ok(output) => output,
            Err(e) => {
                // Capture already started above; roll it back so a retry
                // doesn't find it running and silently no-op on a stale sink.
                self.capture.stop();
                return Err(e);
            }
        };
        let playback_events: Box<dyn Fn(PlaybackEvent) + Send + Sync> = Box::new(|event| {
            if let PlaybackEvent::Error(e) = event {
                log::warn!("session: playback error: {e}");
            }
        });
        if let Err(e) = self.playback.lock().unwrap().stream_start(output, playback_events) {
            self.capture.stop();
            return Err(e);
        }

        *self.state.lock().unwrap() = AssistantState::Streaming;
        self.emit_status();
        Ok(())
    }

    /// `Streaming -> Idle` on `RecordStop`. Capture stops immediately; the
    /// playback stream is deliberately left open so the assistant can
    /// finish speaking (spec.md:125) — it drains and exits on its own, or
    /// is torn down by a later `RecordStart` if it's still open then.
    fn record_stop(&mut self) {
        if self.state() != AssistantState::Streaming {
            return;
        }
        self.capture.stop();
        *self.state.lock().unwrap() = AssistantState::Idle;
        self.emit_status();
    }

    pub fn handle_ui_event(&mut self, event: UiEvent) -> CoreResult<()> {
        match event {
            UiEvent::RecordStart => self.record_start(),
            UiEvent::RecordStop => {
                self.record_stop();
                Ok(())
            }
        }
    }

    /// Emits a `Status` delta only when it differs from the last one sent
    /// (§4.7: "emits UI status delta only on change"). No-op until a sink
    /// is attached, so `last_status` never advances ahead of what a sink
    /// has actually seen — `set_status_sink` is guaranteed an initial fire.
    fn emit_status(&self) {
        let Some(sink) = &self.status_sink else {
            return;
        };
        let status = Status {
            state: self.state(),
            wifi_connected: self.wifi_connected.load(Ordering::Acquire),
            proxy_connected: self.is_connected(),
        };
        let mut last = self.last_status.lock().unwrap();
        if *last == Some(status) {
            return;
        }
        *last = Some(status);
        sink(status);
    }
}
