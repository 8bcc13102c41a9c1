use std::time::Duration;

/// Tuned protocol parameters, constructed once and shared by reference into
/// every component. Replaces a free-standing bag of constants: two nodes
/// only interoperate if they were built from equivalent `Config`s.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    // ── Audio device ──
    pub sample_rate: u32,

    // ── Symbol timing ──
    /// Duration of one data symbol (seconds).
    pub t_sym: f32,
    /// Duration of one preamble-scan frame (seconds).
    pub t_pre: f32,
    /// Sender/receiver oversampling ratio, `t_sym / t_pre`.
    pub r_ratio: u32,
    /// Tolerance band around `r_ratio` for the bit-slicer's run-length filter.
    pub r_tol: u32,

    // ── Spectral analysis ──
    /// Low-pass cutoff (Hz) applied only when decoding data symbols.
    pub f_lp: f32,
    /// Frequency tolerance (Hz) for matching a measured peak to a table entry.
    pub f_tol: f32,

    // ── Data tone table: bin(i) = f_bit_base + i * f_bit_gap, i in 0..16 ──
    pub f_bit_base: f32,
    pub f_bit_gap: f32,

    // ── Control tones ──
    pub bcast_pre: f32,
    pub rts_pre: f32,
    pub cts_pre: f32,
    pub msg_pre: f32,
    /// Per-sender END frequency, indexed by `NodeId::as_u8() - 1`.
    pub end_freqs: [f32; 3],
    pub default_end: f32,

    // ── Preamble confirmation ──
    /// Total hits (including the first) required to confirm a preamble.
    pub n_pre: u32,

    // ── Timeouts / gaps ──
    pub preamble_wait_time: Duration,
    pub end_wait_time: Duration,
    pub inter_frame_gap: Duration,

    // ── Backoff ──
    pub backoff_base: Duration,

    // ── Tone synthesis ──
    pub amplitude: f32,

    // ── Outbound queue ──
    pub message_source_path: String,
    pub queue_poll_interval: Duration,

    /// Number of addressable peers sharing the medium (1..=3). Broadcast
    /// ACK collection expects one END from each peer other than the sender.
    pub node_count: u8,
}

impl Config {
    /// `f_bit_base + i * f_bit_gap` for `i in 0..16`.
    pub fn data_tone(&self, nibble: u8) -> f32 {
        self.f_bit_base + (nibble as f32) * self.f_bit_gap
    }

    /// END frequency this node transmits when acknowledging, indexed by sender id (1..3).
    pub fn end_freq_for(&self, node_int: u8) -> f32 {
        self.end_freqs[(node_int - 1) as usize]
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,

            t_sym: 0.7,
            t_pre: 0.05,
            r_ratio: 6,
            r_tol: 3,

            f_lp: 1000.0,
            f_tol: 100.0,

            f_bit_base: 4300.0,
            f_bit_gap: 200.0,

            bcast_pre: 5000.0,
            rts_pre: 4000.0,
            cts_pre: 3500.0,
            msg_pre: 3000.0,
            end_freqs: [3300.0, 3400.0, 3600.0],
            default_end: 7000.0,

            n_pre: 6,

            preamble_wait_time: Duration::from_secs(5),
            end_wait_time: Duration::from_secs(5),
            inter_frame_gap: Duration::from_millis(300),

            backoff_base: Duration::from_secs(3),

            amplitude: 0.8,

            message_source_path: ".buffer".to_string(),
            queue_poll_interval: Duration::from_millis(200),

            node_count: 3,
        }
    }
}
