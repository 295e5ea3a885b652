//! Audio capture module
//!
//! Provides audio recording via cpal, which works with PipeWire, PulseAudio,
//! and ALSA backends. Captured samples accumulate in a [`SessionBuffer`] that
//! the transcription scheduler reads as growing snapshots: the buffer is
//! append-only for the lifetime of a recording session and never truncated.

pub mod cpal_capture;

use crate::config::AudioConfig;
use crate::error::AudioError;
use std::sync::{Arc, Mutex};

/// Append-only PCM accumulator for one recording session.
///
/// The capture thread appends; the scheduler snapshots. Cloning shares the
/// underlying buffer.
#[derive(Clone, Default)]
pub struct SessionBuffer {
    samples: Arc<Mutex<Vec<f32>>>,
}

impl SessionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append captured samples (called from the audio thread)
    pub fn append(&self, samples: &[f32]) {
        if let Ok(mut guard) = self.samples.lock() {
            guard.extend_from_slice(samples);
        }
    }

    /// Copy of everything accumulated so far
    pub fn snapshot(&self) -> Vec<f32> {
        self.samples
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Accumulated duration in seconds at 16kHz
    pub fn duration_secs(&self) -> f32 {
        self.len() as f32 / 16000.0
    }
}

/// Trait for audio capture implementations
#[async_trait::async_trait]
pub trait AudioCapture: Send {
    /// Start capturing into the given buffer (f32 samples, mono, 16kHz)
    async fn start(&mut self, sink: SessionBuffer) -> Result<(), AudioError>;

    /// Stop capturing. The buffer keeps whatever was accumulated.
    async fn stop(&mut self) -> Result<(), AudioError>;
}

/// Factory function to create audio capture
pub fn create_capture(config: &AudioConfig) -> Result<Box<dyn AudioCapture>, AudioError> {
    Ok(Box::new(cpal_capture::CpalCapture::new(config)))
}

/// Linear interpolation resampling
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_idx = i as f64 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = (src_idx - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else {
            samples.get(idx).copied().unwrap_or(0.0)
        };

        output.push(sample);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_buffer_append_and_snapshot() {
        let buffer = SessionBuffer::new();
        assert!(buffer.is_empty());

        buffer.append(&[0.1, 0.2]);
        let writer = buffer.clone();
        writer.append(&[0.3]);

        assert_eq!(buffer.snapshot(), vec![0.1, 0.2, 0.3]);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let buffer = SessionBuffer::new();
        buffer.append(&[1.0]);
        let snap = buffer.snapshot();
        buffer.append(&[2.0]);
        // Earlier snapshots are unaffected by later appends
        assert_eq!(snap, vec![1.0]);
        assert_eq!(buffer.snapshot(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_resample_same_rate() {
        let samples = vec![1.0, 2.0, 3.0, 4.0];
        let result = resample(&samples, 16000, 16000);
        assert_eq!(result, samples);
    }

    #[test]
    fn test_resample_downsample() {
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let result = resample(&samples, 48000, 16000);
        // 3:1 ratio, so 8 samples -> ~3 samples
        assert!(result.len() >= 2 && result.len() <= 4);
    }

    #[test]
    fn test_resample_upsample() {
        let samples = vec![1.0, 2.0];
        let result = resample(&samples, 8000, 16000);
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn test_resample_empty() {
        let samples: Vec<f32> = vec![];
        let result = resample(&samples, 48000, 16000);
        assert!(result.is_empty());
    }
}
