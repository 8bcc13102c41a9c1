//! In-memory `AudioPort` for tests and for driving several MAC instances
//! against each other in one process without real hardware. Samples written
//! by any handle are mixed into a shared timeline indexed by wall-clock
//! time since the medium was created, so concurrent transmitters genuinely
//! collide the way they would over the air.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::MacError;

use super::port::AudioPort;

struct MediumState {
    /// Mixed PCM samples, indexed from `origin`.
    samples: Vec<f32>,
}

/// The shared acoustic medium several `LoopbackAudioPort` handles attach to.
#[derive(Clone)]
pub struct LoopbackMedium {
    state: Arc<Mutex<MediumState>>,
    origin: Instant,
    sample_rate: u32,
}

impl LoopbackMedium {
    pub fn new(sample_rate: u32) -> Self {
        LoopbackMedium {
            state: Arc::new(Mutex::new(MediumState { samples: Vec::new() })),
            origin: Instant::now(),
            sample_rate,
        }
    }

    /// Attach a new node handle to this medium.
    pub fn attach(&self) -> LoopbackAudioPort {
        LoopbackAudioPort {
            medium: self.clone(),
            read_cursor: 0,
            frames_per_buffer: (self.sample_rate as f32 * 0.05) as usize,
            direction: Direction::Input,
        }
    }

    fn now_index(&self) -> usize {
        ((self.origin.elapsed().as_secs_f64()) * self.sample_rate as f64) as usize
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Input,
    Output,
}

/// A single node's handle onto a [`LoopbackMedium`].
pub struct LoopbackAudioPort {
    medium: LoopbackMedium,
    read_cursor: usize,
    frames_per_buffer: usize,
    direction: Direction,
}

impl AudioPort for LoopbackAudioPort {
    fn open_input(&mut self, frames_per_buffer: usize) -> Result<(), MacError> {
        self.direction = Direction::Input;
        self.frames_per_buffer = frames_per_buffer;
        // Resync the read cursor to "now" so a freshly (re)opened input
        // stream does not replay stale history, matching real hardware.
        self.read_cursor = self.medium.now_index();
        Ok(())
    }

    fn open_output(&mut self) -> Result<(), MacError> {
        self.direction = Direction::Output;
        Ok(())
    }

    fn read_i16(&mut self, n_samples: usize) -> Result<Vec<i16>, MacError> {
        let needed_end = self.read_cursor + n_samples;
        loop {
            if self.medium.now_index() >= needed_end {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        let mut guard = self
            .medium
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if guard.samples.len() < needed_end {
            guard.samples.resize(needed_end, 0.0);
        }
        let slice = &guard.samples[self.read_cursor..needed_end];
        let out: Vec<i16> = slice
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .collect();
        self.read_cursor = needed_end;
        Ok(out)
    }

    fn write_f32(&mut self, samples: &[f32]) -> Result<(), MacError> {
        let start = self.medium.now_index();
        let end = start + samples.len();
        {
            let mut guard = self
                .medium
                .state
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if guard.samples.len() < end {
                guard.samples.resize(end, 0.0);
            }
            for (dst, &src) in guard.samples[start..end].iter_mut().zip(samples) {
                *dst += src;
            }
        }
        let duration = Duration::from_secs_f64(samples.len() as f64 / self.medium.sample_rate as f64);
        thread::sleep(duration);
        Ok(())
    }

    fn close(&mut self) {}
}
