//! Framer (§4.F): assembles and parses wire frames on top of the Tone
//! Generator, Symbol Codec, Preamble Detector, and Bit-Slicer.

use std::time::Duration;

use crate::audio::AudioPort;
use crate::codec::{end_freq_for_sender, Preamble};
use crate::config::Config;
use crate::error::MacError;
use crate::frame::{CtsFrame, DataFrame, NodeId, RtsFrame};
use crate::preamble::detect;
use crate::slicer::BitSlicer;
use crate::tone::generate_tone;

/// Transmit a preamble tone for `n_pre` symbol periods' worth of `T_pre` frames.
pub fn send_preamble(cfg: &Config, audio: &mut dyn AudioPort, kind: Preamble) -> Result<(), MacError> {
    audio.open_output()?;
    let duration = cfg.t_pre * cfg.n_pre as f32;
    let tone = generate_tone(kind.freq(cfg), duration, cfg.amplitude, cfg.sample_rate);
    audio.write_f32(&tone)
}

/// One symbol is held for `r_ratio` `T_sym`-length frames, matching the
/// Bit-Slicer's run-length filter (§4.E) on the receive side.
fn send_symbol(cfg: &Config, audio: &mut dyn AudioPort, nibble: u8) -> Result<(), MacError> {
    let duration = cfg.t_sym * cfg.r_ratio as f32;
    let tone = generate_tone(
        crate::codec::map_nibble(cfg, nibble),
        duration,
        cfg.amplitude,
        cfg.sample_rate,
    );
    audio.write_f32(&tone)
}

pub fn send_rts(cfg: &Config, audio: &mut dyn AudioPort, rts: RtsFrame) -> Result<(), MacError> {
    send_preamble(cfg, audio, Preamble::Rts)?;
    send_symbol(cfg, audio, rts.to_symbol())
}

pub fn send_cts(cfg: &Config, audio: &mut dyn AudioPort, cts: CtsFrame) -> Result<(), MacError> {
    send_preamble(cfg, audio, Preamble::Cts)?;
    send_symbol(cfg, audio, cts.to_symbol())
}

/// Send `MSG_PRE` followed by a DATA frame's header, length, and payload symbols.
pub fn send_data(cfg: &Config, audio: &mut dyn AudioPort, frame: &DataFrame) -> Result<(), MacError> {
    send_preamble(cfg, audio, Preamble::Msg)?;
    send_symbol(cfg, audio, frame.header_symbol())?;
    send_symbol(cfg, audio, frame.length_symbol())?;
    for symbol in frame.payload_symbols() {
        send_symbol(cfg, audio, symbol)?;
    }
    Ok(())
}

/// Send a broadcast DATA frame, preceded by `BCAST_PRE` instead of `MSG_PRE`.
pub fn send_bcast_data(cfg: &Config, audio: &mut dyn AudioPort, frame: &DataFrame) -> Result<(), MacError> {
    send_preamble(cfg, audio, Preamble::Bcast)?;
    send_symbol(cfg, audio, frame.header_symbol())?;
    send_symbol(cfg, audio, frame.length_symbol())?;
    for symbol in frame.payload_symbols() {
        send_symbol(cfg, audio, symbol)?;
    }
    Ok(())
}

/// Send a sustained END tone for two symbol periods at `freq`.
pub fn send_end(cfg: &Config, audio: &mut dyn AudioPort, freq: f32) -> Result<(), MacError> {
    audio.open_output()?;
    let tone = generate_tone(freq, cfg.t_sym * 2.0, cfg.amplitude, cfg.sample_rate);
    audio.write_f32(&tone)
}

/// Send this node's own sender-indexed END tone, acknowledging `sender`'s broadcast.
pub fn send_end_for_sender(cfg: &Config, audio: &mut dyn AudioPort, sender: NodeId) -> Result<(), MacError> {
    send_end(cfg, audio, end_freq_for_sender(cfg, sender))
}

fn open_symbol_input(cfg: &Config, audio: &mut dyn AudioPort) -> Result<(), MacError> {
    audio.open_input((cfg.sample_rate as f32 * cfg.t_sym) as usize)
}

/// Receive one RTS symbol, assuming `RTS_PRE` has already been detected and
/// confirmed by the caller (the MAC's IDLE scan observes the first hit).
pub fn recv_rts_symbol(cfg: &Config, audio: &mut dyn AudioPort) -> Result<RtsFrame, MacError> {
    open_symbol_input(cfg, audio)?;
    let mut slicer = BitSlicer::new(cfg, audio);
    let symbol = slicer.next_symbol()?.ok_or(MacError::DecodeError)?;
    Ok(RtsFrame::from_symbol(symbol))
}

/// Receive one CTS symbol, assuming `CTS_PRE` has already been detected and
/// confirmed by the caller.
pub fn recv_cts_symbol(cfg: &Config, audio: &mut dyn AudioPort) -> Result<CtsFrame, MacError> {
    open_symbol_input(cfg, audio)?;
    let mut slicer = BitSlicer::new(cfg, audio);
    let symbol = slicer.next_symbol()?.ok_or(MacError::DecodeError)?;
    Ok(CtsFrame::from_symbol(symbol))
}

/// Wait for and confirm `RTS_PRE`, then receive one RTS symbol.
pub fn recv_rts(cfg: &Config, audio: &mut dyn AudioPort) -> Result<RtsFrame, MacError> {
    detect(cfg, audio, Preamble::Rts.freq(cfg), cfg.preamble_wait_time)?;
    recv_rts_symbol(cfg, audio)
}

/// Wait for and confirm `CTS_PRE`, then receive one CTS symbol.
pub fn recv_cts(cfg: &Config, audio: &mut dyn AudioPort) -> Result<CtsFrame, MacError> {
    detect(cfg, audio, Preamble::Cts.freq(cfg), cfg.preamble_wait_time)?;
    recv_cts_symbol(cfg, audio)
}

/// Receive a DATA frame's header, length, and payload symbols, assuming the
/// preamble (`BCAST_PRE` or `MSG_PRE`) has already been detected and
/// confirmed by the caller. Any `?` symbol anywhere in the frame makes the
/// whole frame a `MacError::DecodeError`.
pub fn recv_data(cfg: &Config, audio: &mut dyn AudioPort) -> Result<DataFrame, MacError> {
    open_symbol_input(cfg, audio)?;
    let mut slicer = BitSlicer::new(cfg, audio);

    let header = slicer.next_symbol()?.ok_or(MacError::DecodeError)?;
    let length = slicer.next_symbol()?.ok_or(MacError::DecodeError)?;
    if length == 0 || length as usize > crate::frame::BitString::MAX_BITS {
        return Err(MacError::DecodeError);
    }

    let n_payload_symbols = (length as usize).div_ceil(4);
    let mut payload_symbols = Vec::with_capacity(n_payload_symbols);
    for _ in 0..n_payload_symbols {
        let symbol = slicer.next_symbol()?.ok_or(MacError::DecodeError)?;
        payload_symbols.push(symbol);
    }

    let (sender, msg_id) = DataFrame::header_from_symbol(header);
    Ok(DataFrame::from_symbols(sender, msg_id, length, &payload_symbols))
}

/// Wait up to `max_wait` for a sustained tone at `freq`, reusing the
/// preamble-detector strategy but on `T_sym`-length frames.
pub fn wait_for_end(cfg: &Config, audio: &mut dyn AudioPort, freq: f32, max_wait: Duration) -> Result<(), MacError> {
    open_symbol_input(cfg, audio)?;
    let deadline = std::time::Instant::now() + max_wait;
    loop {
        if std::time::Instant::now() >= deadline {
            return Err(MacError::Timeout { waited: max_wait });
        }
        let frame_len = (cfg.sample_rate as f32 * cfg.t_sym) as usize;
        let frame = audio.read_i16(frame_len)?;
        if let Some(measured) = crate::spectrum::dominant_frequency(&frame, cfg.sample_rate, 0.0) {
            if crate::codec::matches(cfg, measured, freq) {
                return Ok(());
            }
        }
    }
}

/// `wait_for_end` against the default (unaddressed) END frequency.
pub fn wait_for_default_end(cfg: &Config, audio: &mut dyn AudioPort, max_wait: Duration) -> Result<(), MacError> {
    wait_for_end(cfg, audio, cfg.default_end, max_wait)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::LoopbackMedium;
    use crate::frame::{BitString, MessageId};

    fn fast_cfg() -> Config {
        let mut cfg = Config::default();
        cfg.t_pre = 0.01;
        cfg.t_sym = 0.02;
        cfg.n_pre = 3;
        cfg.r_ratio = 3;
        cfg.r_tol = 1;
        cfg.preamble_wait_time = Duration::from_secs(2);
        cfg
    }

    #[test]
    fn rts_round_trips_over_loopback() {
        let cfg = fast_cfg();
        let medium = LoopbackMedium::new(cfg.sample_rate);
        let mut tx = medium.attach();
        let mut rx = medium.attach();
        rx.open_input(1).unwrap();

        let rts = RtsFrame {
            sender: NodeId::from_int(1).unwrap(),
            dest: NodeId::from_int(2).unwrap(),
        };
        let cfg2 = cfg.clone();
        std::thread::spawn(move || {
            send_rts(&cfg2, &mut tx, rts).unwrap();
        });

        let received = recv_rts(&cfg, &mut rx).unwrap();
        assert_eq!(received, rts);
    }

    #[test]
    fn data_frame_round_trips_over_loopback() {
        let cfg = fast_cfg();
        let medium = LoopbackMedium::new(cfg.sample_rate);
        let mut tx = medium.attach();
        let mut rx = medium.attach();
        rx.open_input(1).unwrap();

        let frame = DataFrame {
            sender: NodeId::from_int(1).unwrap(),
            msg_id: MessageId::default(),
            payload: BitString::parse("10110").unwrap(),
        };
        let cfg2 = cfg.clone();
        let frame2 = frame.clone();
        std::thread::spawn(move || {
            send_bcast_data(&cfg2, &mut tx, &frame2).unwrap();
        });

        detect(&cfg, &mut rx, Preamble::Bcast.freq(&cfg), cfg.preamble_wait_time).unwrap();
        let received = recv_data(&cfg, &mut rx).unwrap();
        assert_eq!(received, frame);
    }

    #[test]
    fn end_tone_is_detected() {
        let cfg = fast_cfg();
        let medium = LoopbackMedium::new(cfg.sample_rate);
        let mut tx = medium.attach();
        let mut rx = medium.attach();

        let cfg2 = cfg.clone();
        std::thread::spawn(move || {
            send_end(&cfg2, &mut tx, cfg2.default_end).unwrap();
        });

        let result = wait_for_default_end(&cfg, &mut rx, Duration::from_secs(2));
        assert!(result.is_ok());
    }
}
