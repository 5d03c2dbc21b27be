//! Thin demo binary: wires a [`SessionController`] to host-machine `cpal`
//! devices and a real proxy endpoint over [`TransportClient`], then drives
//! it from stdin so the crate can be exercised off real ESP32 hardware.
//! Everything interesting lives in the library; this binary only does
//! wiring and a tiny command loop.

use assistant_audio_core::i2s::{CpalI2sInput, CpalI2sOutput};
use assistant_audio_core::kv::InMemoryKvStore;
use assistant_audio_core::session::I2sOutputFactory;
use assistant_audio_core::transport::TransportClient;
use assistant_audio_core::ui::UiEvent;
use assistant_audio_core::{AudioCoreConfig, SessionController};
use std::io::{self, BufRead, Write as _};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:8765/assistant".to_string());
    let config = AudioCoreConfig::new(endpoint.clone());

    let kv = InMemoryKvStore::new();
    let input_factory = Arc::new(|| {
        CpalI2sInput::default_device().map(|i| Box::new(i) as Box<dyn assistant_audio_core::i2s::I2sInput>)
    });
    let playback_rate = config.playback_sample_rate_hz;
    let output_factory: I2sOutputFactory = Arc::new(move || {
        CpalI2sOutput::default_device(playback_rate)
            .map(|o| Box::new(o) as Box<dyn assistant_audio_core::i2s::I2sOutput>)
    });

    let mut controller = SessionController::new(config.clone(), &kv, input_factory, output_factory);
    log::info!("session id: {}", controller.session_id());

    controller.set_status_sink(Box::new(|status| {
        log::info!(
            "status: state={:?} wifi={} proxy={}",
            status.state,
            status.wifi_connected,
            status.proxy_connected
        );
    }));

    let controller = Arc::new(Mutex::new(controller));
    let controller_for_transport = Arc::clone(&controller);
    let controller_for_speech = Arc::clone(&controller);
    let controller_for_state = Arc::clone(&controller);

    let mut transport = TransportClient::init(
        endpoint,
        None,
        Duration::from_millis(config.transport_send_timeout_ms),
        Duration::from_millis(config.transport_keepalive_ms),
        Arc::new(move |bytes: &[u8]| {
            if let Err(e) = controller_for_transport.lock().unwrap().apply_incoming_audio(bytes) {
                log::warn!("demo: dropped incoming playback audio: {e}");
            }
        }),
        Arc::new(move |connected, close_code| {
            controller_for_state
                .lock()
                .unwrap()
                .apply_transport_state(connected, close_code);
        }),
        Arc::new(move |speaking| {
            controller_for_speech.lock().unwrap().apply_speech_event(speaking);
        }),
    );

    match transport.connect() {
        Ok(()) => {
            let transport = Arc::new(transport);
            controller
                .lock()
                .unwrap()
                .attach_transport(transport as Arc<dyn assistant_audio_core::transport::AudioTransport>, true);
        }
        Err(e) => {
            log::warn!("demo: initial connect failed, starting disconnected: {e}");
        }
    }

    println!("commands: 'start' begins a recording turn, 'stop' ends it, 'quit' exits");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        match line.trim() {
            "start" => {
                if let Err(e) = controller.lock().unwrap().handle_ui_event(UiEvent::RecordStart) {
                    log::warn!("record_start failed: {e}");
                }
            }
            "stop" => {
                let _ = controller.lock().unwrap().handle_ui_event(UiEvent::RecordStop);
            }
            "quit" | "exit" => break,
            other => println!("unrecognized command: {other}"),
        }
        io::stdout().flush()?;
    }

    Ok(())
}
