//! MAC State Machine (§4.G): the listen/transmit loop driving carrier
//! sense, RTS/CTS exchange, broadcast delivery, ACK collection, duplicate
//! suppression, and backoff. Single-threaded, cooperatively driven by
//! blocking audio I/O (§5) — there is no separate state enum because each
//! "state" of the spec corresponds to exactly one function here that runs
//! to completion before returning control to the IDLE scan.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use rand::Rng;

use crate::audio::AudioPort;
use crate::codec::{matches, Preamble};
use crate::config::Config;
use crate::error::MacError;
use crate::frame::{CtsFrame, DataFrame, Destination, MessageId, NodeId, OutboundItem};
use crate::framer;
use crate::preamble;
use crate::queue::OutboundQueue;
use crate::spectrum::dominant_frequency;

/// Drives one node's half of the protocol against an `AudioPort`.
pub struct Mac {
    cfg: Config,
    audio: Box<dyn AudioPort>,
    this_node: NodeId,
    queue: OutboundQueue,
    seen: HashSet<(NodeId, MessageId)>,
    collisions: u32,
    backoff: Duration,
    pending: VecDeque<OutboundItem>,
}

impl Mac {
    pub fn new(cfg: Config, audio: Box<dyn AudioPort>, this_node: NodeId) -> Self {
        let queue = OutboundQueue::new(&cfg, this_node);
        Mac {
            cfg,
            audio,
            this_node,
            queue,
            seen: HashSet::new(),
            collisions: 0,
            backoff: Duration::ZERO,
            pending: VecDeque::new(),
        }
    }

    /// Queue an item directly, bypassing the outbound file — used by the
    /// loopback demo and by tests that drive the MAC without a `.buffer` file.
    pub fn enqueue(&mut self, item: OutboundItem) {
        self.pending.push_back(item);
    }

    pub fn this_node(&self) -> NodeId {
        self.this_node
    }

    /// Run the IDLE scan loop until `stop` returns true, checked once per
    /// `T_pre` scan. `MacError::AudioIo` propagates out (the device is
    /// treated as dead once it fails); everything else is handled inline.
    pub fn run_until(&mut self, mut stop: impl FnMut(&Mac) -> bool) -> Result<(), MacError> {
        while !stop(self) {
            self.scan_once()?;
        }
        Ok(())
    }

    fn scan_once(&mut self) -> Result<(), MacError> {
        for item in self.queue.poll()? {
            log::debug!("outbound queue: enqueued item for {:?}", item.dest);
            self.pending.push_back(item);
        }

        self.audio
            .open_input((self.cfg.sample_rate as f32 * self.cfg.t_pre) as usize)?;
        let frame_len = (self.cfg.sample_rate as f32 * self.cfg.t_pre) as usize;
        let frame = self.audio.read_i16(frame_len)?;
        let freq = dominant_frequency(&frame, self.cfg.sample_rate, 0.0);

        self.backoff = self
            .backoff
            .saturating_sub(Duration::from_secs_f32(self.cfg.t_pre));

        match freq {
            Some(f) if matches(&self.cfg, f, Preamble::Bcast.freq(&self.cfg)) => self.rx_bcast(),
            Some(f) if matches(&self.cfg, f, Preamble::Rts.freq(&self.cfg)) => self.rx_rts(),
            _ => {
                if self.backoff.is_zero() && !self.pending.is_empty() {
                    self.tx_try()
                } else {
                    Ok(())
                }
            }
        }
    }

    fn rx_bcast(&mut self) -> Result<(), MacError> {
        log::debug!("RX_BCAST: confirming preamble");
        if preamble::confirm(
            &self.cfg,
            self.audio.as_mut(),
            Preamble::Bcast.freq(&self.cfg),
            self.cfg.preamble_wait_time,
        )
        .is_err()
        {
            log::debug!("bcast preamble confirm failed, back to IDLE");
            return Ok(());
        }
        match framer::recv_data(&self.cfg, self.audio.as_mut()) {
            Ok(frame) => self.deliver_and_ack(frame),
            Err(MacError::DecodeError) => {
                log::debug!("bcast DATA had undecodable symbols, dropping");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn rx_rts(&mut self) -> Result<(), MacError> {
        log::debug!("RX_RTS: confirming preamble");
        if preamble::confirm(
            &self.cfg,
            self.audio.as_mut(),
            Preamble::Rts.freq(&self.cfg),
            self.cfg.preamble_wait_time,
        )
        .is_err()
        {
            return Ok(());
        }
        let rts = match framer::recv_rts_symbol(&self.cfg, self.audio.as_mut()) {
            Ok(rts) => rts,
            Err(MacError::DecodeError) => return Ok(()),
            Err(e) => return Err(e),
        };
        if rts.dest == self.this_node || rts.dest.is_broadcast() {
            self.tx_cts(rts.sender)
        } else {
            self.defer()
        }
    }

    fn tx_cts(&mut self, original_sender: NodeId) -> Result<(), MacError> {
        std::thread::sleep(self.cfg.inter_frame_gap);
        log::debug!("TX_CTS: granting channel to {:?}", original_sender);
        framer::send_cts(
            &self.cfg,
            self.audio.as_mut(),
            crate::frame::CtsFrame {
                sender: self.this_node,
                dest: original_sender,
            },
        )?;

        if preamble::detect(
            &self.cfg,
            self.audio.as_mut(),
            Preamble::Msg.freq(&self.cfg),
            self.cfg.preamble_wait_time,
        )
        .is_err()
        {
            log::debug!("no MSG_PRE after CTS, back to IDLE");
            return Ok(());
        }

        match framer::recv_data(&self.cfg, self.audio.as_mut()) {
            Ok(frame) => {
                self.deliver_if_new(&frame);
                framer::send_end(&self.cfg, self.audio.as_mut(), self.cfg.default_end)?;
                Ok(())
            }
            Err(MacError::DecodeError) => {
                log::debug!("unicast DATA had undecodable symbols, dropping");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn defer(&mut self) -> Result<(), MacError> {
        log::debug!("DEFER: RTS addressed to another node");
        let _ = framer::wait_for_default_end(&self.cfg, self.audio.as_mut(), self.cfg.end_wait_time);
        Ok(())
    }

    fn deliver_if_new(&mut self, frame: &DataFrame) {
        let key = (frame.sender, frame.msg_id);
        if self.seen.insert(key) {
            self.deliver(frame);
        }
    }

    fn deliver_and_ack(&mut self, frame: DataFrame) -> Result<(), MacError> {
        self.deliver_if_new(&frame);
        self.send_ack_slot(frame.sender)
    }

    /// Transmit this node's END in its broadcast-ACK slot: the non-sender
    /// peers, in ascending node-id order, take slot 0 (immediate) and slot 1
    /// (one symbol period later). Reproduces the spec's hard-coded
    /// three-node table and degrades to a single immediate ACK with two
    /// nodes.
    fn send_ack_slot(&mut self, sender: NodeId) -> Result<(), MacError> {
        let peers: Vec<NodeId> = (1..=self.cfg.node_count)
            .filter_map(NodeId::from_int)
            .filter(|&n| n != sender)
            .collect();
        if let Some(slot) = peers.iter().position(|&n| n == self.this_node) {
            if slot > 0 {
                let symbol_period = self.cfg.t_sym * self.cfg.r_ratio as f32;
                std::thread::sleep(Duration::from_secs_f32(symbol_period * slot as f32));
            }
            log::debug!("sending broadcast ACK in slot {}", slot);
            framer::send_end_for_sender(&self.cfg, self.audio.as_mut(), self.this_node)?;
        }
        Ok(())
    }

    fn deliver(&self, frame: &DataFrame) {
        let now = now_hms();
        println!("[RECVD]: {} {} {}", frame.payload, frame.sender.as_int(), now);
    }

    fn log_sent(&self, item: &OutboundItem) {
        let target = match item.dest {
            Destination::Broadcast => "0".to_string(),
            Destination::Unicast(n) => n.as_int().to_string(),
        };
        println!("[SENT]: {} {} {}", item.payload, target, now_hms());
    }

    fn tx_try(&mut self) -> Result<(), MacError> {
        let item = match self.pending.pop_front() {
            Some(item) => item,
            None => return Ok(()),
        };
        match item.dest {
            Destination::Broadcast => self.tx_try_broadcast(item),
            Destination::Unicast(dest) => self.tx_try_unicast(item, dest),
        }
    }

    fn tx_try_broadcast(&mut self, item: OutboundItem) -> Result<(), MacError> {
        let frame = DataFrame {
            sender: self.this_node,
            msg_id: item.msg_id,
            payload: item.payload.clone(),
        };
        log::debug!("TX_TRY (broadcast): sending DATA msg_id={:?}", item.msg_id);
        framer::send_bcast_data(&self.cfg, self.audio.as_mut(), &frame)?;
        self.log_sent(&item);

        let expected: Vec<NodeId> = (1..=self.cfg.node_count)
            .filter_map(NodeId::from_int)
            .filter(|&n| n != self.this_node)
            .collect();

        for node in expected {
            let freq = self.cfg.end_freq_for(node.as_int());
            match framer::wait_for_end(&self.cfg, self.audio.as_mut(), freq, self.cfg.end_wait_time) {
                Ok(()) => continue,
                Err(MacError::Timeout { .. }) => {
                    self.on_collision(item);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
        self.collisions = 0;
        Ok(())
    }

    fn tx_try_unicast(&mut self, item: OutboundItem, dest: NodeId) -> Result<(), MacError> {
        log::debug!("TX_TRY (unicast): RTS to {:?}", dest);
        framer::send_rts(
            &self.cfg,
            self.audio.as_mut(),
            crate::frame::RtsFrame {
                sender: self.this_node,
                dest,
            },
        )?;

        if preamble::detect(
            &self.cfg,
            self.audio.as_mut(),
            Preamble::Cts.freq(&self.cfg),
            self.cfg.preamble_wait_time,
        )
        .is_err()
        {
            self.on_collision(item);
            return Ok(());
        }

        let cts = match framer::recv_cts_symbol(&self.cfg, self.audio.as_mut()) {
            Ok(cts) => cts,
            Err(MacError::DecodeError) => {
                self.on_collision(item);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match self.check_cts_dest(&cts) {
            Ok(()) => {}
            Err(MacError::WrongAddress { expected, got }) => {
                log::debug!(
                    "CTS granted to {:?}, not {:?}; requeueing without backoff",
                    got,
                    expected
                );
                self.pending.push_front(item);
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        std::thread::sleep(self.cfg.inter_frame_gap);
        let frame = DataFrame {
            sender: self.this_node,
            msg_id: item.msg_id,
            payload: item.payload.clone(),
        };
        framer::send_data(&self.cfg, self.audio.as_mut(), &frame)?;
        self.log_sent(&item);

        match framer::wait_for_default_end(&self.cfg, self.audio.as_mut(), self.cfg.end_wait_time) {
            Ok(()) => {
                self.collisions = 0;
                Ok(())
            }
            Err(MacError::Timeout { .. }) => {
                log::debug!("no END after unicast DATA, requeueing without backoff");
                self.pending.push_front(item);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// A CTS grants the channel to `cts.dest`; `00` means "any". Anything
    /// else addressed to a different node is `MacError::WrongAddress`.
    fn check_cts_dest(&self, cts: &CtsFrame) -> Result<(), MacError> {
        if cts.dest.is_broadcast() || cts.dest == self.this_node {
            Ok(())
        } else {
            Err(MacError::WrongAddress {
                expected: self.this_node,
                got: cts.dest,
            })
        }
    }

    fn on_collision(&mut self, item: OutboundItem) {
        self.collisions += 1;
        let c = self.collisions;
        let id_int = self.this_node.as_int() as u32;
        let upper = 1u32 << c.min(16);
        let units = rand::thread_rng().gen_range(1..=upper);
        self.backoff = self.cfg.backoff_base * units * id_int;
        log::warn!(
            "collision #{} for node {:?}, backing off {:?}",
            c,
            self.this_node,
            self.backoff
        );
        self.pending.push_front(item);
    }
}

fn now_hms() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let h = (secs / 3600) % 24;
    let m = (secs / 60) % 60;
    let s = secs % 60;
    format!("{:02}:{:02}:{:02}", h, m, s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::LoopbackMedium;
    use crate::frame::BitString;
    use std::time::Instant;

    fn fast_cfg() -> Config {
        let mut cfg = Config::default();
        cfg.t_pre = 0.01;
        cfg.t_sym = 0.02;
        cfg.n_pre = 3;
        cfg.r_ratio = 3;
        cfg.r_tol = 1;
        cfg.preamble_wait_time = Duration::from_millis(500);
        cfg.end_wait_time = Duration::from_millis(500);
        cfg.inter_frame_gap = Duration::from_millis(10);
        cfg.message_source_path = std::env::temp_dir()
            .join(format!("acoustic_mac_test_mac_{}.buffer", std::process::id()))
            .to_string_lossy()
            .to_string();
        cfg
    }

    #[test]
    fn unicast_happy_path_delivers_and_acks() {
        let cfg = fast_cfg();
        let medium = LoopbackMedium::new(cfg.sample_rate);

        let mut a = Mac::new(cfg.clone(), Box::new(medium.attach()), NodeId::from_int(1).unwrap());
        let mut b = Mac::new(cfg.clone(), Box::new(medium.attach()), NodeId::from_int(2).unwrap());
        a.enqueue(OutboundItem {
            payload: BitString::parse("1001").unwrap(),
            dest: Destination::Unicast(NodeId::from_int(2).unwrap()),
            msg_id: MessageId::default(),
        });

        let b_handle = std::thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(3);
            b.run_until(|_| Instant::now() >= deadline).ok();
            b
        });
        let deadline = Instant::now() + Duration::from_secs(3);
        a.run_until(|_| Instant::now() >= deadline).ok();
        let b = b_handle.join().unwrap();

        assert!(b.seen.contains(&(NodeId::from_int(1).unwrap(), MessageId::default())));
        assert_eq!(a.pending.len(), 0);
    }

    #[test]
    fn duplicate_data_is_only_delivered_once() {
        let cfg = fast_cfg();
        let audio = LoopbackMedium::new(cfg.sample_rate).attach();
        let mut mac = Mac::new(cfg, Box::new(audio), NodeId::from_int(1).unwrap());
        let frame = DataFrame {
            sender: NodeId::from_int(2).unwrap(),
            msg_id: MessageId::default(),
            payload: BitString::parse("1").unwrap(),
        };
        mac.deliver_if_new(&frame);
        mac.deliver_if_new(&frame);
        assert_eq!(mac.seen.len(), 1);
    }

    #[test]
    fn collision_backoff_is_bounded_by_base_and_node_id() {
        let cfg = fast_cfg();
        let audio = LoopbackMedium::new(cfg.sample_rate).attach();
        let mut mac = Mac::new(cfg.clone(), Box::new(audio), NodeId::from_int(3).unwrap());
        let item = OutboundItem {
            payload: BitString::parse("1").unwrap(),
            dest: Destination::Broadcast,
            msg_id: MessageId::default(),
        };
        mac.on_collision(item);
        assert_eq!(mac.collisions, 1);
        assert!(mac.backoff >= cfg.backoff_base * 3);
        assert!(mac.backoff <= cfg.backoff_base * 2 * 3);
        assert_eq!(mac.pending.len(), 1);
    }

    #[test]
    fn broadcast_ack_schedule_with_three_nodes_resets_collisions() {
        let cfg = fast_cfg();
        let medium = LoopbackMedium::new(cfg.sample_rate);

        let mut a = Mac::new(cfg.clone(), Box::new(medium.attach()), NodeId::from_int(1).unwrap());
        let mut b = Mac::new(cfg.clone(), Box::new(medium.attach()), NodeId::from_int(2).unwrap());
        let mut c = Mac::new(cfg.clone(), Box::new(medium.attach()), NodeId::from_int(3).unwrap());
        a.enqueue(OutboundItem {
            payload: BitString::parse("101").unwrap(),
            dest: Destination::Broadcast,
            msg_id: MessageId::default(),
        });

        let deadline = Instant::now() + Duration::from_secs(3);
        let b_handle = std::thread::spawn(move || {
            b.run_until(|_| Instant::now() >= deadline).ok();
            b
        });
        let deadline = Instant::now() + Duration::from_secs(3);
        let c_handle = std::thread::spawn(move || {
            c.run_until(|_| Instant::now() >= deadline).ok();
            c
        });
        let deadline = Instant::now() + Duration::from_secs(3);
        a.run_until(|_| Instant::now() >= deadline).ok();
        let b = b_handle.join().unwrap();
        let c = c_handle.join().unwrap();

        let key = (NodeId::from_int(1).unwrap(), MessageId::default());
        assert!(b.seen.contains(&key));
        assert!(c.seen.contains(&key));
        assert_eq!(a.collisions, 0);
        assert_eq!(a.pending.len(), 0);
    }

    #[test]
    fn broadcast_ack_loss_requeues_and_increments_collisions() {
        let cfg = fast_cfg();
        let medium = LoopbackMedium::new(cfg.sample_rate);

        // Only node 2 runs; node 3's slot-1 ACK never arrives, so the
        // sender's wait for it must time out.
        let mut a = Mac::new(cfg.clone(), Box::new(medium.attach()), NodeId::from_int(1).unwrap());
        let mut b = Mac::new(cfg.clone(), Box::new(medium.attach()), NodeId::from_int(2).unwrap());
        a.enqueue(OutboundItem {
            payload: BitString::parse("101").unwrap(),
            dest: Destination::Broadcast,
            msg_id: MessageId::default(),
        });

        let deadline = Instant::now() + Duration::from_secs(2);
        let b_handle = std::thread::spawn(move || {
            b.run_until(|_| Instant::now() >= deadline).ok();
            b
        });
        let deadline = Instant::now() + Duration::from_secs(2);
        a.run_until(|_| Instant::now() >= deadline).ok();
        b_handle.join().unwrap();

        assert_eq!(a.collisions, 1);
        assert_eq!(a.pending.len(), 1);
    }

    #[test]
    fn dueling_senders_both_back_off_independently() {
        let cfg = fast_cfg();
        let medium = LoopbackMedium::new(cfg.sample_rate);

        // Node 3 never runs, so neither RTS can ever be granted a CTS,
        // forcing both concurrent senders through the same timeout-and-
        // backoff path rather than one winning the channel.
        let mut a = Mac::new(cfg.clone(), Box::new(medium.attach()), NodeId::from_int(1).unwrap());
        let mut b = Mac::new(cfg.clone(), Box::new(medium.attach()), NodeId::from_int(2).unwrap());
        a.enqueue(OutboundItem {
            payload: BitString::parse("1").unwrap(),
            dest: Destination::Unicast(NodeId::from_int(3).unwrap()),
            msg_id: MessageId::default(),
        });
        b.enqueue(OutboundItem {
            payload: BitString::parse("1").unwrap(),
            dest: Destination::Unicast(NodeId::from_int(3).unwrap()),
            msg_id: MessageId::default(),
        });

        let deadline = Instant::now() + Duration::from_secs(2);
        let b_handle = std::thread::spawn(move || {
            b.run_until(|_| Instant::now() >= deadline).ok();
            b
        });
        let deadline = Instant::now() + Duration::from_secs(2);
        a.run_until(|_| Instant::now() >= deadline).ok();
        let b = b_handle.join().unwrap();

        assert_eq!(a.collisions, 1);
        assert_eq!(b.collisions, 1);
        assert_eq!(a.pending.len(), 1);
        assert_eq!(b.pending.len(), 1);
    }
}
