// In-process configuration (§6). No CLI surface, no environment variables —
// the host application constructs this by hand, the way the teacher binary
// hand-parses a model path instead of reaching for a flag parser.

#[derive(Debug, Clone)]
pub struct AudioCoreConfig {
    pub endpoint_url: String,
    pub auth_token: Option<String>,

    pub capture_sample_rate_hz: u32,
    pub playback_sample_rate_hz: u32,
    pub capture_chunk_ms: u32,
    pub playback_prebuffer_ms: u32,
    pub playback_ring_capacity_ms: u32,

    pub transport_send_timeout_ms: u64,
    pub transport_keepalive_ms: u64,
    pub transport_reconnect_backoff_ms: u64,

    pub aec_enabled: bool,
    pub aec_reference_window_ms: u32,

    pub volume_percent: u8,
}

impl AudioCoreConfig {
    /// Construct a config with every fixed/default value from §6, overriding
    /// only the required `endpoint_url`.
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            ..Self::default()
        }
    }

    pub fn capture_chunk_samples(&self) -> usize {
        (self.capture_sample_rate_hz as u64 * self.capture_chunk_ms as u64 / 1000) as usize
    }

    pub fn capture_chunk_bytes(&self) -> usize {
        self.capture_chunk_samples() * 2
    }

    pub fn playback_prebuffer_bytes(&self) -> usize {
        (self.playback_sample_rate_hz as u64 * self.playback_prebuffer_ms as u64 * 2 / 1000)
            as usize
    }

    pub fn playback_ring_capacity_bytes(&self) -> usize {
        (self.playback_sample_rate_hz as u64 * self.playback_ring_capacity_ms as u64 * 2 / 1000)
            as usize
    }

    pub fn aec_reference_window_bytes(&self) -> usize {
        // AEC reference path runs at 16 kHz regardless of capture_sample_rate_hz.
        (16_000u64 * self.aec_reference_window_ms as u64 * 2 / 1000) as usize
    }
}

impl Default for AudioCoreConfig {
    fn default() -> Self {
        Self {
            endpoint_url: String::new(),
            auth_token: None,
            capture_sample_rate_hz: 16_000,
            playback_sample_rate_hz: 24_000,
            capture_chunk_ms: 100,
            playback_prebuffer_ms: 500,
            playback_ring_capacity_ms: 2_000,
            transport_send_timeout_ms: 5_000,
            transport_keepalive_ms: 10_000,
            transport_reconnect_backoff_ms: 10_000,
            aec_enabled: false,
            aec_reference_window_ms: 500,
            volume_percent: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let cfg = AudioCoreConfig::new("wss://proxy.example/assistant");
        assert_eq!(cfg.capture_sample_rate_hz, 16_000);
        assert_eq!(cfg.playback_sample_rate_hz, 24_000);
        assert_eq!(cfg.transport_send_timeout_ms, 5_000);
        assert_eq!(cfg.volume_percent, 100);
    }

    #[test]
    fn capture_chunk_is_100ms_at_16khz() {
        let cfg = AudioCoreConfig::default();
        assert_eq!(cfg.capture_chunk_samples(), 1_600);
        assert_eq!(cfg.capture_chunk_bytes(), 3_200);
    }

    #[test]
    fn playback_prebuffer_is_500ms_at_24khz() {
        let cfg = AudioCoreConfig::default();
        assert_eq!(cfg.playback_prebuffer_bytes(), 24_000);
    }

    #[test]
    fn playback_ring_capacity_is_2s_at_24khz() {
        let cfg = AudioCoreConfig::default();
        assert_eq!(cfg.playback_ring_capacity_bytes(), 96_000);
    }

    #[test]
    fn aec_window_is_500ms_at_16khz() {
        let cfg = AudioCoreConfig::default();
        assert_eq!(cfg.aec_reference_window_bytes(), 16_000);
    }
}
