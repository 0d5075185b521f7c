//! Sample buffers and WAV file I/O.

use crate::error::{SynthesisError, SynthesisResult};
use std::path::Path;

/// Output sample rate of every built-in backend.
pub const SAMPLE_RATE: u32 = 24_000;

/// Mono float samples plus their rate.
///
/// Samples produced by a backend are passed through as the model emitted
/// them; clamping to [-1, 1] happens in [`write_wav`].
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Write a buffer as 16-bit PCM mono WAV.
pub fn write_wav(path: impl AsRef<Path>, audio: &SampleBuffer) -> SynthesisResult<()> {
    let path = path.as_ref();
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for sample in &audio.samples {
        let clamped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clamped * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;

    log::debug!(
        "Wrote {} samples at {} Hz to {}",
        audio.samples.len(),
        audio.sample_rate,
        path.display()
    );
    Ok(())
}

/// Read a WAV file, keeping only the first channel.
///
/// Integer sources of 8 to 32 bits are scaled to [-1, 1]; 32-bit float
/// sources are read unchanged.
pub fn read_wav(path: impl AsRef<Path>) -> SynthesisResult<SampleBuffer> {
    let path = path.as_ref();
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            if bits == 0 || bits > 32 {
                return Err(SynthesisError::Format(format!(
                    "unsupported WAV bit depth: {}",
                    bits
                )));
            }
            let max_value = (1u64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_value))
                .collect::<Result<_, _>>()?
        }
    };

    let samples = interleaved.into_iter().step_by(channels).collect();
    Ok(SampleBuffer::new(samples, spec.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_duration() {
        let audio = SampleBuffer::new(vec![0.0; 12_000], SAMPLE_RATE);
        assert!((audio.duration_secs() - 0.5).abs() < 1e-6);
        assert_eq!(SampleBuffer::new(vec![0.0; 10], 0).duration_secs(), 0.0);
    }

    #[test]
    fn test_write_clamps_and_reads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.wav");
        let audio = SampleBuffer::new(vec![0.0, 0.5, -0.5, 2.0, -3.0], SAMPLE_RATE);
        write_wav(&path, &audio).unwrap();

        let read = read_wav(&path).unwrap();
        assert_eq!(read.sample_rate, SAMPLE_RATE);
        assert_eq!(read.len(), 5);
        let expected = [0.0, 0.5, -0.5, 1.0, -1.0];
        for (got, want) in read.samples.iter().zip(expected) {
            assert!((got - want).abs() < 1e-3, "{} vs {}", got, want);
        }
    }

    #[test]
    fn test_read_keeps_first_channel() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for (l, r) in [(0.1f32, -0.9f32), (0.2, -0.8), (0.3, -0.7)] {
            writer.write_sample(l).unwrap();
            writer.write_sample(r).unwrap();
        }
        writer.finalize().unwrap();

        let read = read_wav(&path).unwrap();
        assert_eq!(read.sample_rate, 16_000);
        assert_eq!(read.samples, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_read_24_bit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deep.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 24,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(1 << 22).unwrap();
        writer.write_sample(-(1 << 23)).unwrap();
        writer.finalize().unwrap();

        let read = read_wav(&path).unwrap();
        assert_eq!(read.samples, vec![0.5, -1.0]);
    }

    #[test]
    fn test_read_missing_file() {
        assert!(read_wav("/nonexistent/ref.wav").is_err());
    }
}
