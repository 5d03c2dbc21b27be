//! Full-duplex audio session core for a voice-assistant endpoint: ring
//! buffering, capture/playback staging, a framed transport client, session
//! state, persisted identity, and an optional AEC stage. The physical I²S
//! driver, the non-volatile KV store, and the display/touch UI are external
//! collaborators the host application supplies through the traits in
//! [`i2s`] and [`kv`] and the event/status types in [`ui`].

pub mod aec;
pub mod aec_ref;
pub mod capture;
pub mod config;
pub mod error;
pub mod i2s;
pub mod identity;
pub mod kv;
pub mod playback;
pub mod resampler;
pub mod ring;
pub mod session;
pub mod transport;
pub mod ui;

pub use config::AudioCoreConfig;
pub use error::{CoreError, CoreResult};
pub use session::{AssistantState, SessionController};
