// End-to-end lifecycle scenarios (S1-S3): startup-to-idle, the half-duplex
// mute gate across a full recording turn, and volume changes taking effect
// mid-stream. Exercises the session controller over the mock I2S and
// transport collaborators so no real hardware or socket is needed.

use assistant_audio_core::i2s::{MockI2sInput, MockI2sOutput};
use assistant_audio_core::kv::InMemoryKvStore;
use assistant_audio_core::session::{AssistantState, I2sInputFactory, I2sOutputFactory, SessionController};
use assistant_audio_core::transport::{AudioTransport, MockTransport};
use assistant_audio_core::ui::UiEvent;
use assistant_audio_core::{AudioCoreConfig, CoreError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn new_controller() -> SessionController {
    let kv = InMemoryKvStore::new();
    let input_factory: I2sInputFactory = Arc::new(|| Ok(Box::new(MockI2sInput::new(vec![]))));
    let output_factory: I2sOutputFactory = Arc::new(|| Ok(Box::new(MockI2sOutput::new())));
    SessionController::new(
        AudioCoreConfig::new("ws://unused/assistant"),
        &kv,
        input_factory,
        output_factory,
    )
}

#[test]
fn startup_reaches_idle_with_a_stable_session_id() {
    let ctl = new_controller();
    assert_eq!(ctl.state(), AssistantState::Idle);
    let id = ctl.session_id().to_string();
    assert!(id.starts_with("esp32-"));

    // A second controller backed by the same KV reuses the persisted id.
    let kv = InMemoryKvStore::new();
    let a = SessionController::new(
        AudioCoreConfig::new("ws://unused/assistant"),
        &kv,
        Arc::new(|| Ok(Box::new(MockI2sInput::new(vec![])))),
        Arc::new(|| Ok(Box::new(MockI2sOutput::new()))),
    );
    let b = SessionController::new(
        AudioCoreConfig::new("ws://unused/assistant"),
        &kv,
        Arc::new(|| Ok(Box::new(MockI2sInput::new(vec![])))),
        Arc::new(|| Ok(Box::new(MockI2sOutput::new()))),
    );
    assert_eq!(a.session_id(), b.session_id());
}

#[test]
fn recording_turn_forwards_audio_until_muted_by_remote_speech() {
    let mut ctl = new_controller();
    let transport = Arc::new(MockTransport::new(true));
    ctl.attach_transport(Arc::clone(&transport) as Arc<dyn AudioTransport>, true);

    ctl.handle_ui_event(UiEvent::RecordStart).unwrap();
    assert_eq!(ctl.state(), AssistantState::Streaming);
    assert!(!ctl.is_muted_for_speech());

    // Remote assistant starts speaking mid-turn: capture keeps running but
    // frames stop reaching the transport (the half-duplex interlock).
    ctl.apply_speech_event(true);
    assert!(ctl.is_muted_for_speech());
    thread::sleep(Duration::from_millis(20));
    let sent_while_muted = transport.sent_count();

    ctl.apply_speech_event(false);
    assert!(!ctl.is_muted_for_speech());

    ctl.handle_ui_event(UiEvent::RecordStop).unwrap();
    assert_eq!(ctl.state(), AssistantState::Idle);

    // Muting never produced a burst of queued sends once lifted.
    assert_eq!(transport.sent_count(), sent_while_muted);
}

#[test]
fn mid_session_disconnect_surfaces_as_error_and_retry_needs_reconnect() {
    let mut ctl = new_controller();
    let transport = Arc::new(MockTransport::new(true));
    ctl.attach_transport(Arc::clone(&transport) as Arc<dyn AudioTransport>, true);
    ctl.handle_ui_event(UiEvent::RecordStart).unwrap();

    ctl.apply_transport_state(false, 1006);
    assert_eq!(ctl.state(), AssistantState::Error);

    // RecordStop is a no-op outside Streaming; retrying RecordStart while
    // still disconnected fails instead of silently resuming.
    ctl.handle_ui_event(UiEvent::RecordStop).unwrap();
    let err = ctl.handle_ui_event(UiEvent::RecordStart).unwrap_err();
    assert!(matches!(err, CoreError::NotReady));

    // Once the transport reconnects, the next RecordStart recovers
    // directly from Error without a further RecordStop.
    ctl.apply_transport_state(true, 0);
    ctl.handle_ui_event(UiEvent::RecordStart).unwrap();
    assert_eq!(ctl.state(), AssistantState::Streaming);
    ctl.handle_ui_event(UiEvent::RecordStop).unwrap();
}

#[test]
fn playback_stream_stays_open_after_record_stop_and_keeps_draining() {
    // RecordStop must only stop capture; the playback stream it leaves
    // behind keeps accepting and writing audio so the assistant can finish
    // speaking (spec.md:125).
    let kv = InMemoryKvStore::new();
    let output = MockI2sOutput::new();
    let output_for_factory = output.clone();
    let mut config = AudioCoreConfig::new("ws://unused/assistant");
    config.playback_prebuffer_ms = 0; // write as soon as anything is buffered
    let input_factory: I2sInputFactory = Arc::new(|| Ok(Box::new(MockI2sInput::new(vec![]))));
    let output_factory: I2sOutputFactory = Arc::new(move || Ok(Box::new(output_for_factory.clone())));
    let mut ctl = SessionController::new(config, &kv, input_factory, output_factory);

    let transport = Arc::new(MockTransport::new(true));
    ctl.attach_transport(Arc::clone(&transport) as Arc<dyn AudioTransport>, true);
    ctl.handle_ui_event(UiEvent::RecordStart).unwrap();
    ctl.handle_ui_event(UiEvent::RecordStop).unwrap();

    // Assistant audio for the turn arrives after RecordStop; the stream it
    // was written to must still be live and draining to I2S.
    let turn = vec![0xABu8; 4_000];
    ctl.apply_incoming_audio(&turn).unwrap();
    thread::sleep(Duration::from_millis(150));

    assert!(
        output.total_samples_written() > 0,
        "playback must keep draining audio received after RecordStop"
    );
}

#[test]
fn record_start_tears_down_a_stale_playback_stream_from_the_prior_turn() {
    let mut ctl = new_controller();
    let transport = Arc::new(MockTransport::new(true));
    ctl.attach_transport(Arc::clone(&transport) as Arc<dyn AudioTransport>, true);

    ctl.handle_ui_event(UiEvent::RecordStart).unwrap();
    ctl.handle_ui_event(UiEvent::RecordStop).unwrap();
    // The first turn's playback stream is still open at this point.

    // A second RecordStart must tear it down and start fresh rather than
    // erroring out because playback state != Stopped.
    ctl.handle_ui_event(UiEvent::RecordStart).unwrap();
    assert_eq!(ctl.state(), AssistantState::Streaming);
    ctl.handle_ui_event(UiEvent::RecordStop).unwrap();
}
