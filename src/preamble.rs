//! Preamble Detector (§4.D): scans short frames for a target tone until it
//! has been seen enough times in a row, or a deadline elapses.
//!
//! Timeouts are expressed as a per-call deadline against a monotonic clock
//! rather than a process-global alarm (§9 design note).

use std::time::{Duration, Instant};

use crate::audio::AudioPort;
use crate::config::Config;
use crate::error::MacError;
use crate::spectrum::dominant_frequency;

/// Scan `T_pre`-length frames until `target_freq` is detected once, or
/// `max_wait` elapses. Returns `Ok(())` on the first hit.
pub fn detect_once(
    cfg: &Config,
    audio: &mut dyn AudioPort,
    target_freq: f32,
    max_wait: Duration,
) -> Result<(), MacError> {
    let deadline = Instant::now() + max_wait;
    let frame_len = (cfg.sample_rate as f32 * cfg.t_pre) as usize;

    loop {
        if Instant::now() >= deadline {
            return Err(MacError::Timeout { waited: max_wait });
        }
        let frame = audio.read_i16(frame_len)?;
        if let Some(freq) = dominant_frequency(&frame, cfg.sample_rate, 0.0) {
            if (freq - target_freq).abs() < cfg.f_tol {
                return Ok(());
            }
        }
    }
}

/// Confirm a preamble already seen once: require `cfg.n_pre - 1` further
/// consecutive hits. Any miss fails the whole confirmation (the source's
/// "any miss resets counting by returning timeout" rule) rather than
/// resetting a running count.
pub fn confirm(
    cfg: &Config,
    audio: &mut dyn AudioPort,
    target_freq: f32,
    max_wait: Duration,
) -> Result<(), MacError> {
    let deadline = Instant::now() + max_wait;
    let frame_len = (cfg.sample_rate as f32 * cfg.t_pre) as usize;
    let mut hits = 0u32;
    let needed = cfg.n_pre.saturating_sub(1);

    while hits < needed {
        if Instant::now() >= deadline {
            return Err(MacError::Timeout { waited: max_wait });
        }
        let frame = audio.read_i16(frame_len)?;
        match dominant_frequency(&frame, cfg.sample_rate, 0.0) {
            Some(freq) if (freq - target_freq).abs() < cfg.f_tol => {
                hits += 1;
            }
            _ => return Err(MacError::Timeout { waited: max_wait }),
        }
    }
    Ok(())
}

/// Full preamble acquisition: `detect_once` then `confirm`, i.e.
/// `cfg.n_pre - 1` further consecutive hits after the first.
pub fn detect(
    cfg: &Config,
    audio: &mut dyn AudioPort,
    target_freq: f32,
    max_wait: Duration,
) -> Result<(), MacError> {
    detect_once(cfg, audio, target_freq, max_wait)?;
    confirm(cfg, audio, target_freq, max_wait)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::LoopbackMedium;
    use crate::tone::generate_tone;

    fn fast_cfg() -> Config {
        let mut cfg = Config::default();
        cfg.t_pre = 0.01;
        cfg.n_pre = 4;
        cfg
    }

    #[test]
    fn detects_preamble_after_silence() {
        let cfg = fast_cfg();
        let medium = LoopbackMedium::new(cfg.sample_rate);
        let mut tx = medium.attach();
        let mut rx = medium.attach();
        rx.open_input((cfg.sample_rate as f32 * cfg.t_pre) as usize).unwrap();

        let tone = generate_tone(cfg.bcast_pre, cfg.t_pre * (cfg.n_pre as f32 + 2.0), cfg.amplitude, cfg.sample_rate);
        std::thread::spawn(move || {
            tx.open_output().unwrap();
            tx.write_f32(&tone).unwrap();
        });

        let result = detect(&cfg, &mut rx, cfg.bcast_pre, Duration::from_secs(2));
        assert!(result.is_ok());
    }

    #[test]
    fn times_out_on_silence() {
        let cfg = fast_cfg();
        let medium = LoopbackMedium::new(cfg.sample_rate);
        let mut rx = medium.attach();
        rx.open_input((cfg.sample_rate as f32 * cfg.t_pre) as usize).unwrap();

        let result = detect_once(&cfg, &mut rx, cfg.bcast_pre, Duration::from_millis(50));
        assert!(matches!(result, Err(MacError::Timeout { .. })));
    }
}
