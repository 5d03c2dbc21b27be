// External collaborator: the physical I²S driver (§1, OUT OF SCOPE). The
// core only needs a blocking read of 32-bit capture frames and a blocking
// write of 16-bit playback samples; everything else (DMA, clocking, pin
// config) belongs to the excluded hardware layer. `CpalI2sInput` /
// `CpalI2sOutput` are a host-machine stand-in for that layer, grounded in
// the teacher's own `cpal` capture stream in `audio.rs`, so this crate is
// runnable and demoable off real ESP32 hardware.

use crate::error::{CoreError, CoreResult};
use crate::resampler::resample_linear;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::time::Duration;

/// One capture read cycle, typically 256 samples (1,024 bytes) per §4.4.
pub const I2S_READ_FRAME_SAMPLES: usize = 256;

pub trait I2sInput: Send {
    /// Block for up to one read cycle and fill `buf` with raw 32-bit
    /// capture samples, returning the count actually filled. A transient
    /// read error is logged and treated as zero samples; a persistent
    /// failure returns `Fatal`.
    fn read_frame(&mut self, buf: &mut [i32]) -> CoreResult<usize>;
}

pub trait I2sOutput: Send {
    /// Write 16-bit playback samples. The call is paced by the driver —
    /// an effectively unbounded deadline from the caller's point of view.
    fn write_samples(&mut self, samples: &[i16]) -> CoreResult<()>;
}

/// Converts a host `cpal` input stream into the 32-bit I²S capture
/// contract: each f32 sample is scaled into the upper bits of a 32-bit
/// word the way a 24-bit-in-32-bit I²S codec would deliver it, so that
/// the capture stage's `s32 >> 14` conversion recovers a sensible 16-bit
/// PCM value.
pub struct CpalI2sInput {
    rx: Receiver<Vec<i32>>,
    _stream: cpal::Stream,
}

impl CpalI2sInput {
    pub fn default_device() -> CoreResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| CoreError::Fatal("no default audio input device".into()))?;
        let config = device
            .default_input_config()
            .map_err(|e| CoreError::Fatal(format!("no input config: {e}")))?;
        let channels = config.channels() as usize;
        let stream_config: cpal::StreamConfig = config.clone().into();

        let (tx, rx): (SyncSender<Vec<i32>>, Receiver<Vec<i32>>) = mpsc::sync_channel(8);

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono: Vec<i32> = data
                        .chunks(channels)
                        .map(|chunk| {
                            let avg: f32 =
                                chunk.iter().sum::<f32>() / channels.max(1) as f32;
                            ((avg.clamp(-1.0, 1.0) * i16::MAX as f32) as i32) << 14
                        })
                        .collect();
                    // Never block the audio callback: drop if the consumer
                    // is behind.
                    let _ = tx.try_send(mono);
                },
                |err| log::error!("i2s input stream error: {err}"),
                None,
            )
            .map_err(|e| CoreError::Fatal(format!("failed to build input stream: {e}")))?;
        stream
            .play()
            .map_err(|e| CoreError::Fatal(format!("failed to start input stream: {e}")))?;

        Ok(Self { rx, _stream: stream })
    }
}

impl I2sInput for CpalI2sInput {
    fn read_frame(&mut self, buf: &mut [i32]) -> CoreResult<usize> {
        match self.rx.recv_timeout(Duration::from_millis(200)) {
            Ok(frame) => {
                let n = frame.len().min(buf.len());
                buf[..n].copy_from_slice(&frame[..n]);
                Ok(n)
            }
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(0),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(CoreError::Fatal("i2s input stream disconnected".into()))
            }
        }
    }
}

/// Converts playback writes into a host `cpal` output stream. If the
/// device doesn't natively support 24 kHz, samples are resampled on the
/// write path with the same linear interpolator used for the AEC
/// reference path (C2).
pub struct CpalI2sOutput {
    tx: SyncSender<Vec<i16>>,
    device_rate: u32,
    _stream: cpal::Stream,
}

impl CpalI2sOutput {
    pub fn default_device(playback_rate_hz: u32) -> CoreResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| CoreError::Fatal("no default audio output device".into()))?;
        let config = device
            .default_output_config()
            .map_err(|e| CoreError::Fatal(format!("no output config: {e}")))?;
        let channels = config.channels() as usize;
        let device_rate = config.sample_rate().0;
        let stream_config: cpal::StreamConfig = config.clone().into();

        let (tx, rx): (SyncSender<Vec<i16>>, Receiver<Vec<i16>>) = mpsc::sync_channel(32);
        let mut pending: Vec<i16> = Vec::new();

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut idx = 0;
                    while idx < data.len() {
                        if pending.is_empty() {
                            match rx.try_recv() {
                                Ok(chunk) => pending = chunk,
                                Err(_) => {
                                    // Underrun: fill remainder with silence.
                                    for s in &mut data[idx..] {
                                        *s = 0.0;
                                    }
                                    break;
                                }
                            }
                        }
                        let take = (data.len() - idx).min(pending.len()) / channels.max(1);
                        let take = take.max(if pending.is_empty() { 0 } else { 1 });
                        for frame in 0..take {
                            if frame >= pending.len() {
                                break;
                            }
                            let sample = pending[frame] as f32 / i16::MAX as f32;
                            for ch in 0..channels {
                                if idx + ch < data.len() {
                                    data[idx + ch] = sample;
                                }
                            }
                            idx += channels;
                        }
                        pending.drain(0..take.min(pending.len()));
                    }
                },
                |err| log::error!("i2s output stream error: {err}"),
                None,
            )
            .map_err(|e| CoreError::Fatal(format!("failed to build output stream: {e}")))?;
        stream
            .play()
            .map_err(|e| CoreError::Fatal(format!("failed to start output stream: {e}")))?;

        let _ = playback_rate_hz;
        Ok(Self {
            tx,
            device_rate,
            _stream: stream,
        })
    }
}

impl I2sOutput for CpalI2sOutput {
    fn write_samples(&mut self, samples: &[i16]) -> CoreResult<()> {
        let out = if self.device_rate == 24_000 {
            samples.to_vec()
        } else {
            resample_linear(samples, 24_000, self.device_rate)
        };
        self.tx
            .send(out)
            .map_err(|_| CoreError::Fatal("i2s output stream disconnected".into()))
    }
}

/// Deterministic I²S input for tests: replays a fixed sequence of frames,
/// then reports zero samples (silence) forever — never errors.
#[derive(Default)]
pub struct MockI2sInput {
    frames: std::collections::VecDeque<Vec<i32>>,
}

impl MockI2sInput {
    pub fn new(frames: Vec<Vec<i32>>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

impl I2sInput for MockI2sInput {
    fn read_frame(&mut self, buf: &mut [i32]) -> CoreResult<usize> {
        match self.frames.pop_front() {
            Some(frame) => {
                let n = frame.len().min(buf.len());
                buf[..n].copy_from_slice(&frame[..n]);
                Ok(n)
            }
            None => Ok(0),
        }
    }
}

/// Collects everything written to it, for playback assertions in tests.
#[derive(Clone, Default)]
pub struct MockI2sOutput {
    pub written: std::sync::Arc<std::sync::Mutex<Vec<i16>>>,
}

impl MockI2sOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_samples_written(&self) -> usize {
        self.written.lock().unwrap().len()
    }
}

impl I2sOutput for MockI2sOutput {
    fn write_samples(&mut self, samples: &[i16]) -> CoreResult<()> {
        self.written.lock().unwrap().extend_from_slice(samples);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_input_replays_then_reports_silence() {
        let mut input = MockI2sInput::new(vec![vec![1, 2, 3], vec![4, 5]]);
        let mut buf = [0i32; 8];
        assert_eq!(input.read_frame(&mut buf).unwrap(), 3);
        assert_eq!(input.read_frame(&mut buf).unwrap(), 2);
        assert_eq!(input.read_frame(&mut buf).unwrap(), 0);
    }

    #[test]
    fn mock_output_accumulates_samples() {
        let mut output = MockI2sOutput::new();
        output.write_samples(&[1, 2, 3]).unwrap();
        output.write_samples(&[4, 5]).unwrap();
        assert_eq!(output.total_samples_written(), 5);
    }
}
