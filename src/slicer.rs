//! Bit-Slicer (§4.E): symbol-rate recovery. Turns a stream of `T_sym`-length
//! frames into a stream of emitted nibbles by run-length filtering across
//! the sender/receiver oversampling ratio `R`.
//!
//! A `None` nibble stands for the `?` symbol: the measured frequency did not
//! land within tolerance of any table entry. It is emitted like any other
//! value and propagated to the caller, which decides what an unreadable
//! symbol means for the frame being assembled.

use crate::audio::AudioPort;
use crate::codec::demap_nibble;
use crate::config::Config;
use crate::error::MacError;
use crate::spectrum::dominant_frequency;

/// One recovered symbol: `Some(nibble)` or `None` for `?`.
pub type Symbol = Option<u8>;

/// Recovers one symbol per call from a live `AudioPort`, reading `T_sym`
/// frames and applying the run-length filter of §4.E.
pub struct BitSlicer<'a> {
    cfg: &'a Config,
    audio: &'a mut dyn AudioPort,
    frame_len: usize,
    prev: Option<Symbol>,
    run: u32,
}

impl<'a> BitSlicer<'a> {
    pub fn new(cfg: &'a Config, audio: &'a mut dyn AudioPort) -> Self {
        let frame_len = (cfg.sample_rate as f32 * cfg.t_sym) as usize;
        BitSlicer {
            cfg,
            audio,
            frame_len,
            prev: None,
            run: 0,
        }
    }

    fn candidate(&mut self) -> Result<Symbol, MacError> {
        let frame = self.audio.read_i16(self.frame_len)?;
        let freq = dominant_frequency(&frame, self.cfg.sample_rate, self.cfg.f_lp);
        Ok(freq.and_then(|f| demap_nibble(self.cfg, f)))
    }

    /// Block until the run-length filter emits the next symbol.
    pub fn next_symbol(&mut self) -> Result<Symbol, MacError> {
        loop {
            let candidate = self.candidate()?;
            match self.prev {
                None => {
                    self.prev = Some(candidate);
                    self.run = 1;
                }
                Some(p) if p == candidate => {
                    self.run += 1;
                    if self.run >= self.cfg.r_ratio {
                        self.run = 0;
                        return Ok(p);
                    }
                }
                Some(p) => {
                    let ended_run = self.run;
                    self.prev = Some(candidate);
                    self.run = 1;
                    let lo = self.cfg.r_ratio.saturating_sub(self.cfg.r_tol);
                    let hi = self.cfg.r_ratio + self.cfg.r_tol;
                    if ended_run >= lo && ended_run <= hi {
                        return Ok(p);
                    }
                    // Outside tolerance: the ended run was noise, discard it
                    // and keep tracking the new candidate.
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{LoopbackAudioPort, LoopbackMedium};
    use crate::codec::map_nibble;
    use crate::tone::generate_tone;

    fn fast_cfg() -> Config {
        let mut cfg = Config::default();
        cfg.t_sym = 0.01;
        cfg.r_ratio = 6;
        cfg.r_tol = 2;
        cfg
    }

    fn feed_nibbles(cfg: &Config, tx: &mut LoopbackAudioPort, nibbles: &[u8]) {
        tx.open_output().unwrap();
        for &n in nibbles {
            let tone = generate_tone(map_nibble(cfg, n), cfg.t_sym, cfg.amplitude, cfg.sample_rate);
            tx.write_f32(&tone).unwrap();
        }
    }

    #[test]
    fn emits_one_copy_per_r_consecutive_frames() {
        let cfg = fast_cfg();
        let medium = LoopbackMedium::new(cfg.sample_rate);
        let mut tx = medium.attach();
        let mut rx = medium.attach();
        rx.open_input((cfg.sample_rate as f32 * cfg.t_sym) as usize).unwrap();

        let nibbles = vec![5u8; cfg.r_ratio as usize * 2];
        let cfg2 = cfg.clone();
        std::thread::spawn(move || feed_nibbles(&cfg2, &mut tx, &nibbles));

        let mut slicer = BitSlicer::new(&cfg, &mut rx);
        assert_eq!(slicer.next_symbol().unwrap(), Some(5));
        assert_eq!(slicer.next_symbol().unwrap(), Some(5));
    }

    #[test]
    fn unreadable_tone_emits_question_symbol() {
        let cfg = fast_cfg();
        let medium = LoopbackMedium::new(cfg.sample_rate);
        let mut rx = medium.attach();
        rx.open_input((cfg.sample_rate as f32 * cfg.t_sym) as usize).unwrap();
        // Nothing written: silence demaps to `None` (no frequency at all, or
        // out-of-tolerance), so the slicer must eventually emit `?`.
        let mut slicer = BitSlicer::new(&cfg, &mut rx);
        assert_eq!(slicer.next_symbol().unwrap(), None);
    }
}
