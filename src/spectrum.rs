//! Spectral Analyzer (§4.B): dominant-frequency peak detection over a PCM
//! frame, via FFT magnitude spectrum.

use rustfft::{num_complex::Complex, FftPlanner};

/// Analyze one frame of `int16` PCM samples and return its dominant
/// frequency, or `None` if the frame is silent (max abs sample is zero).
///
/// `low_pass_hz` restricts the search to bins whose frequency is strictly
/// greater than the cutoff (used when decoding data symbols); pass `0.0`
/// to scan the full spectrum (used for preamble/END detection).
pub fn dominant_frequency(frame: &[i16], sample_rate: u32, low_pass_hz: f32) -> Option<f32> {
    let max_abs = frame.iter().map(|&s| (s as f32).abs()).fold(0.0f32, f32::max);
    if max_abs == 0.0 {
        return None;
    }

    let normalized: Vec<f32> = frame.iter().map(|&s| s as f32 / max_abs).collect();

    let mut buffer: Vec<Complex<f32>> = normalized.iter().map(|&s| Complex::new(s, 0.0)).collect();
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(buffer.len());
    fft.process(&mut buffer);

    let n = buffer.len();
    let sr = sample_rate as f32;
    let bin_hz = sr / n as f32;

    let mut best_idx = 0usize;
    let mut best_mag = -1.0f32;
    for (i, c) in buffer.iter().enumerate().take(n / 2) {
        let freq = i as f32 * bin_hz;
        if freq <= low_pass_hz {
            continue;
        }
        let mag = c.norm();
        if mag > best_mag {
            best_mag = mag;
            best_idx = i;
        }
    }

    if best_mag < 0.0 {
        None
    } else {
        Some(best_idx as f32 * bin_hz)
    }
}
