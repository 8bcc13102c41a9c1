//! Tone Generator (§4.A): synthesizes a single-frequency sinusoid as PCM.

use std::f32::consts::PI;

/// Synthesize `sin(2*pi*f*t)` over `[0, duration)` at `sample_rate`, scaled
/// by `amplitude`. No windowing or envelope: boundary discontinuities are
/// accepted, matching the source's plain tone generator.
pub fn generate_tone(freq: f32, duration: f32, amplitude: f32, sample_rate: u32) -> Vec<f32> {
    let n = (sample_rate as f32 * duration).floor() as usize;
    let sr = sample_rate as f32;
    (0..n)
        .map(|i| {
            let t = i as f32 / sr;
            amplitude * (2.0 * PI * freq * t).sin()
        })
        .collect()
}
