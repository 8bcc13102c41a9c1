//! AudioPort (§4.I): the half-duplex PCM device contract the core depends
//! on. The core never names a concrete backend — only this trait.

use crate::error::MacError;

/// A half-duplex PCM audio device: `int16` on input, `float32` on output,
/// exactly one direction open at a time.
pub trait AudioPort: Send {
    /// Open (or reopen) the input stream with the given frames-per-buffer.
    /// Closes any currently open output stream first.
    fn open_input(&mut self, frames_per_buffer: usize) -> Result<(), MacError>;

    /// Open (or reopen) the output stream. Closes any currently open input
    /// stream first.
    fn open_output(&mut self) -> Result<(), MacError>;

    /// Block until `n_samples` input samples are available and return them.
    fn read_i16(&mut self, n_samples: usize) -> Result<Vec<i16>, MacError>;

    /// Write PCM samples to the (already open) output stream, blocking
    /// until accepted.
    fn write_f32(&mut self, samples: &[f32]) -> Result<(), MacError>;

    /// Close whichever stream is currently open.
    fn close(&mut self);
}
