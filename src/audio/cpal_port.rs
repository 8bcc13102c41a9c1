//! Live `AudioPort` backed by `cpal`. Grounded on the same
//! callback-plus-shared-buffer pattern as the teacher's one-shot
//! `play_audio`/`record_audio` helpers, but kept open across many short
//! reads/writes instead of a single record-then-play round trip.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::error::MacError;

use super::port::AudioPort;

fn lock_or_recover<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn stream_config(sample_rate: u32) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    }
}

enum Stream {
    Input {
        _stream: cpal::Stream,
        buffer: Arc<Mutex<VecDeque<f32>>>,
    },
    Output {
        stream: cpal::Stream,
    },
    None,
}

/// `AudioPort` implementation over the default system input/output devices.
pub struct CpalAudioPort {
    sample_rate: u32,
    stream: Stream,
    output_queue: Option<Arc<Mutex<VecDeque<f32>>>>,
}

impl CpalAudioPort {
    pub fn new(sample_rate: u32) -> Self {
        CpalAudioPort {
            sample_rate,
            stream: Stream::None,
            output_queue: None,
        }
    }
}

impl AudioPort for CpalAudioPort {
    fn open_input(&mut self, _frames_per_buffer: usize) -> Result<(), MacError> {
        self.close();

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| MacError::AudioIo("no input audio device available".into()))?;
        let config = stream_config(self.sample_rate);

        let buffer: Arc<Mutex<VecDeque<f32>>> = Arc::new(Mutex::new(VecDeque::new()));
        let buffer_cb = Arc::clone(&buffer);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mut buf = lock_or_recover(&buffer_cb);
                    buf.extend(data.iter().copied());
                },
                |err| log::warn!("input stream error: {}", err),
                None,
            )
            .map_err(|e| MacError::AudioIo(format!("failed to build input stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| MacError::AudioIo(format!("failed to start input stream: {}", e)))?;

        self.stream = Stream::Input {
            _stream: stream,
            buffer,
        };
        Ok(())
    }

    fn open_output(&mut self) -> Result<(), MacError> {
        self.close();

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| MacError::AudioIo("no output audio device available".into()))?;
        let config = stream_config(self.sample_rate);

        let queue: Arc<Mutex<VecDeque<f32>>> = Arc::new(Mutex::new(VecDeque::new()));
        let queue_cb = Arc::clone(&queue);

        let stream = device
            .build_output_stream(
                &config,
                move |output: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut buf = lock_or_recover(&queue_cb);
                    for sample in output.iter_mut() {
                        *sample = buf.pop_front().unwrap_or(0.0);
                    }
                },
                |err| log::warn!("output stream error: {}", err),
                None,
            )
            .map_err(|e| MacError::AudioIo(format!("failed to build output stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| MacError::AudioIo(format!("failed to start output stream: {}", e)))?;

        // Stash the fill queue alongside the stream via a second Input-style
        // wrapper is avoided; instead we keep the queue in a thread-local by
        // closing over it in write_f32 through a dedicated field.
        self.stream = Stream::Output { stream };
        self.output_queue = Some(queue);
        Ok(())
    }

    fn read_i16(&mut self, n_samples: usize) -> Result<Vec<i16>, MacError> {
        let buffer = match &self.stream {
            Stream::Input { buffer, .. } => Arc::clone(buffer),
            _ => return Err(MacError::AudioIo("read called without an open input stream".into())),
        };

        loop {
            let len = lock_or_recover(&buffer).len();
            if len >= n_samples {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }

        let mut buf = lock_or_recover(&buffer);
        let samples: Vec<i16> = (0..n_samples)
            .map(|_| {
                let s = buf.pop_front().unwrap_or(0.0);
                (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
            })
            .collect();
        Ok(samples)
    }

    fn write_f32(&mut self, samples: &[f32]) -> Result<(), MacError> {
        let queue = self
            .output_queue
            .as_ref()
            .ok_or_else(|| MacError::AudioIo("write called without an open output stream".into()))?;
        {
            let mut buf = lock_or_recover(queue);
            buf.extend(samples.iter().copied());
        }
        // Block until the device has drained the samples we just queued,
        // so the MAC's blocking-write contract holds.
        loop {
            let remaining = lock_or_recover(queue).len();
            if remaining == 0 {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        Ok(())
    }

    fn close(&mut self) {
        self.stream = Stream::None;
        self.output_queue = None;
    }
}
