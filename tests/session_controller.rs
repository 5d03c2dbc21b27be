// Transport-facing session scenarios (S2, S3 from the testable-properties
// list): a sustained recording turn producing a steady stream of
// 3,200-byte chunks, and the assistant-speech interval during which
// capture keeps running but nothing reaches the transport while playback
// still receives and renders the incoming turn.

use assistant_audio_core::error::CoreResult;
use assistant_audio_core::i2s::{I2sInput, MockI2sOutput};
use assistant_audio_core::kv::InMemoryKvStore;
use assistant_audio_core::session::{I2sInputFactory, I2sOutputFactory, SessionController};
use assistant_audio_core::transport::{AudioTransport, MockTransport};
use assistant_audio_core::ui::UiEvent;
use assistant_audio_core::AudioCoreConfig;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Always has a full frame of non-silent samples ready: unlike
/// `MockI2sInput`'s finite replay, this keeps capture genuinely live for
/// as long as the worker runs, so mute/unmute timing windows are
/// meaningful rather than racing against frame exhaustion.
struct SteadyToneInput;

impl I2sInput for SteadyToneInput {
    fn read_frame(&mut self, buf: &mut [i32]) -> CoreResult<usize> {
        for s in buf.iter_mut() {
            *s = 1_000i32 << 14;
        }
        Ok(buf.len())
    }
}

#[test]
fn s2_sustained_recording_turn_emits_at_least_nine_chunks() {
    let kv = InMemoryKvStore::new();
    let input_factory: I2sInputFactory = Arc::new(|| Ok(Box::new(SteadyToneInput)));
    let output_factory: I2sOutputFactory = Arc::new(|| Ok(Box::new(MockI2sOutput::new())));
    let mut ctl = SessionController::new(
        AudioCoreConfig::new("ws://unused/assistant"),
        &kv,
        input_factory,
        output_factory,
    );

    let transport = Arc::new(MockTransport::new(true));
    ctl.attach_transport(Arc::clone(&transport) as Arc<dyn AudioTransport>, true);

    ctl.handle_ui_event(UiEvent::RecordStart).unwrap();
    thread::sleep(Duration::from_millis(200));
    ctl.handle_ui_event(UiEvent::RecordStop).unwrap();

    let sent = transport.sent.lock().unwrap();
    assert!(sent.len() >= 9, "expected >= 9 chunks, saw {}", sent.len());
    for chunk in sent.iter() {
        assert_eq!(chunk.len(), 3_200);
    }
}

#[test]
fn s3_assistant_speech_suppresses_capture_without_stopping_it_and_plays_incoming_audio() {
    let kv = InMemoryKvStore::new();
    let input_factory: I2sInputFactory = Arc::new(|| Ok(Box::new(SteadyToneInput)));
    let output_factory: I2sOutputFactory = Arc::new(|| Ok(Box::new(MockI2sOutput::new())));
    let mut ctl = SessionController::new(
        AudioCoreConfig::new("ws://unused/assistant"),
        &kv,
        input_factory,
        output_factory,
    );

    let transport = Arc::new(MockTransport::new(true));
    ctl.attach_transport(Arc::clone(&transport) as Arc<dyn AudioTransport>, true);
    ctl.handle_ui_event(UiEvent::RecordStart).unwrap();
    thread::sleep(Duration::from_millis(50));

    // {"type": "speech_start"} arrives; the interlock engages. Capture
    // keeps running (no restart jitter) but stops forwarding.
    ctl.apply_speech_event(true);
    let sent_at_mute = transport.sent_count();
    thread::sleep(Duration::from_millis(80));
    assert_eq!(
        transport.sent_count(),
        sent_at_mute,
        "no frames must reach transport while muted for remote speech"
    );

    // 24,000 bytes (24kHz PCM) of assistant audio land on the playback path.
    let turn = vec![0u8; 24_000];
    ctl.apply_incoming_audio(&turn).unwrap();

    // {"type": "speech_end"} arrives; capture-to-transport resumes within
    // the next 100ms chunk.
    ctl.apply_speech_event(false);
    thread::sleep(Duration::from_millis(150));
    assert!(
        transport.sent_count() > sent_at_mute,
        "capture must resume sending once the mute flag clears"
    );

    ctl.handle_ui_event(UiEvent::RecordStop).unwrap();
}
