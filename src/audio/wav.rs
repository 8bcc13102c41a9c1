//! WAV capture/playback for offline debugging of the acoustic channel —
//! dump what a node transmitted or captured without needing real hardware.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::MacError;
use super::port::AudioPort;

/// Write mono f32 PCM samples to a WAV file.
pub fn write_wav<P: AsRef<Path>>(path: P, samples: &[f32], sample_rate: u32) -> Result<(), MacError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer =
        WavWriter::create(path, spec).map_err(|e| MacError::AudioIo(format!("WAV write error: {}", e)))?;

    for &s in samples {
        writer
            .write_sample(s)
            .map_err(|e| MacError::AudioIo(format!("WAV sample write error: {}", e)))?;
    }

    writer
        .finalize()
        .map_err(|e| MacError::AudioIo(format!("WAV finalize error: {}", e)))?;

    Ok(())
}

/// Read mono f32 PCM samples from a WAV file. Returns `(samples, sample_rate)`.
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, u32), MacError> {
    let reader =
        WavReader::open(path).map_err(|e| MacError::AudioIo(format!("WAV read error: {}", e)))?;

    let spec = reader.spec();
    let sample_rate = spec.sample_rate;

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map_err(|e| MacError::AudioIo(format!("WAV sample error: {}", e))))
            .collect::<Result<Vec<f32>, _>>()?,
        SampleFormat::Int => {
            let max_val = (1u32 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| {
                    s.map(|v| v as f32 / max_val)
                        .map_err(|e| MacError::AudioIo(format!("WAV sample error: {}", e)))
                })
                .collect::<Result<Vec<f32>, _>>()?
        }
    };

    Ok((samples, sample_rate))
}

/// Output-only `AudioPort` that buffers every written sample in memory,
/// for the `tx` CLI subcommand: encode a frame, then dump it to a WAV file
/// with [`WavRecorder::save`] instead of playing it through a real device.
pub struct WavRecorder {
    sample_rate: u32,
    samples: Vec<f32>,
}

impl WavRecorder {
    pub fn new(sample_rate: u32) -> Self {
        WavRecorder {
            sample_rate,
            samples: Vec::new(),
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), MacError> {
        write_wav(path, &self.samples, self.sample_rate)
    }
}

impl AudioPort for WavRecorder {
    fn open_input(&mut self, _frames_per_buffer: usize) -> Result<(), MacError> {
        Err(MacError::AudioIo("WavRecorder is output-only".to_string()))
    }

    fn open_output(&mut self) -> Result<(), MacError> {
        Ok(())
    }

    fn read_i16(&mut self, _n_samples: usize) -> Result<Vec<i16>, MacError> {
        Err(MacError::AudioIo("WavRecorder is output-only".to_string()))
    }

    fn write_f32(&mut self, samples: &[f32]) -> Result<(), MacError> {
        self.samples.extend_from_slice(samples);
        Ok(())
    }

    fn close(&mut self) {}
}

/// Input-only `AudioPort` serving PCM samples preloaded from a WAV file, for
/// the `rx` CLI subcommand: load a captured frame and run it through the
/// same Preamble Detector/Framer a live node would use. Reads past the end
/// of the file return silence rather than an error, matching a live device
/// idling after the recording has ended.
pub struct WavPlayer {
    samples: Vec<i16>,
    cursor: usize,
}

impl WavPlayer {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MacError> {
        let (samples, _sample_rate) = read_wav(path)?;
        let samples = samples
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .collect();
        Ok(WavPlayer { samples, cursor: 0 })
    }
}

impl AudioPort for WavPlayer {
    fn open_input(&mut self, _frames_per_buffer: usize) -> Result<(), MacError> {
        Ok(())
    }

    fn open_output(&mut self) -> Result<(), MacError> {
        Err(MacError::AudioIo("WavPlayer is input-only".to_string()))
    }

    fn read_i16(&mut self, n_samples: usize) -> Result<Vec<i16>, MacError> {
        let end = (self.cursor + n_samples).min(self.samples.len());
        let mut out = self.samples[self.cursor.min(end)..end].to_vec();
        out.resize(n_samples, 0);
        self.cursor = (self.cursor + n_samples).min(self.samples.len());
        Ok(out)
    }

    fn write_f32(&mut self, _samples: &[f32]) -> Result<(), MacError> {
        Err(MacError::AudioIo("WavPlayer is input-only".to_string()))
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn wav_roundtrip_preserves_samples() {
        let path = std::env::temp_dir().join("acoustic_mac_test_wav_roundtrip.wav");
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.01).sin()).collect();
        let sr = 16_000;

        write_wav(&path, &samples, sr).unwrap();
        let (read_samples, read_sr) = read_wav(&path).unwrap();

        assert_eq!(read_sr, sr);
        assert_eq!(read_samples.len(), samples.len());
        for (a, b) in samples.iter().zip(read_samples.iter()) {
            assert!((a - b).abs() < 1e-6, "sample mismatch: {} vs {}", a, b);
        }

        fs::remove_file(&path).ok();
    }

    #[test]
    fn recorder_saved_samples_round_trip_through_player() {
        let path = std::env::temp_dir().join("acoustic_mac_test_wav_recorder_player.wav");

        let mut recorder = WavRecorder::new(8_000);
        recorder.open_output().unwrap();
        let tone = crate::tone::generate_tone(440.0, 0.05, 0.8, 8_000);
        recorder.write_f32(&tone).unwrap();
        assert_eq!(recorder.sample_count(), tone.len());
        recorder.save(&path).unwrap();

        let mut player = WavPlayer::load(&path).unwrap();
        player.open_input(tone.len()).unwrap();
        let played = player.read_i16(tone.len()).unwrap();
        assert_eq!(played.len(), tone.len());
        assert!(played.iter().any(|&s| s != 0));

        // Reading past the recorded samples returns silence, not an error.
        let tail = player.read_i16(10).unwrap();
        assert!(tail.iter().all(|&s| s == 0));

        fs::remove_file(&path).ok();
    }
}
