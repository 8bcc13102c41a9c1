use std::env;
use std::io::{self, BufRead};
use std::process;
use std::time::{Duration, Instant};

use acoustic_mac::audio::{AudioPort, LoopbackMedium, WavPlayer, WavRecorder};
use acoustic_mac::codec::Preamble;
use acoustic_mac::config::Config;
use acoustic_mac::frame::{BitString, DataFrame, MessageId, NodeId};
use acoustic_mac::mac::Mac;
use acoustic_mac::{framer, preamble};

fn usage() -> ! {
    eprintln!("Usage:");
    eprintln!("  acoustic-mac run [--loopback]          Prompt for node id, run the MAC main loop");
    eprintln!("  acoustic-mac tx <node> <bits> <wav>    Encode a broadcast DATA frame to a WAV file");
    eprintln!("  acoustic-mac rx <wav>                  Decode a broadcast DATA frame from a WAV file");
    eprintln!("  acoustic-mac loopback-demo              Run two or three MAC instances against each other in one process");
    process::exit(1);
}

fn prompt_node_id() -> Result<NodeId, String> {
    println!("Node id (1-3): ");
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| format!("failed to read node id: {}", e))?;
    let n: u8 = line
        .trim()
        .parse()
        .map_err(|_| format!("node id must be an integer, got '{}'", line.trim()))?;
    NodeId::from_int(n).ok_or_else(|| format!("node id must be 1..3, got {}", n))
}

#[cfg(feature = "audio-live")]
fn live_audio_port(sample_rate: u32) -> Box<dyn AudioPort> {
    Box::new(acoustic_mac::audio::CpalAudioPort::new(sample_rate))
}

#[cfg(not(feature = "audio-live"))]
fn live_audio_port(_sample_rate: u32) -> Box<dyn AudioPort> {
    eprintln!("built without the `audio-live` feature; pass --loopback or rebuild with --features audio-live");
    process::exit(1);
}

/// Encode `bits` as a broadcast DATA frame from `node` and write the
/// resulting tone sequence to a WAV file, for offline inspection or to play
/// into a speaker later, mirroring the teacher's `tx <hex-bytes>` subcommand.
fn cmd_tx(node: &str, bits: &str, path: &str) -> Result<(), String> {
    let cfg = Config::default();
    let sender: u8 = node.parse().map_err(|_| format!("node id must be an integer, got '{}'", node))?;
    let sender = NodeId::from_int(sender).ok_or_else(|| format!("node id must be 1..3, got {}", node))?;
    let payload = BitString::parse(bits).map_err(|e| e.to_string())?;

    let frame = DataFrame {
        sender,
        msg_id: MessageId::default(),
        payload,
    };

    let mut recorder = WavRecorder::new(cfg.sample_rate);
    framer::send_bcast_data(&cfg, &mut recorder, &frame).map_err(|e| e.to_string())?;
    recorder.save(path).map_err(|e| e.to_string())?;
    println!("Wrote {} samples to {}", recorder.sample_count(), path);
    Ok(())
}

/// Decode a broadcast DATA frame previously written by `tx` back out of a
/// WAV file, mirroring the teacher's `rx <seconds>` subcommand but reading
/// a file instead of a live microphone.
fn cmd_rx(path: &str) -> Result<(), String> {
    let cfg = Config::default();
    let mut player = WavPlayer::load(path).map_err(|e| e.to_string())?;

    preamble::detect(&cfg, &mut player, Preamble::Bcast.freq(&cfg), cfg.preamble_wait_time)
        .map_err(|e| e.to_string())?;
    let frame = framer::recv_data(&cfg, &mut player).map_err(|e| e.to_string())?;

    println!(
        "Decoded: sender={} msg_id={:?} payload={}",
        frame.sender, frame.msg_id, frame.payload
    );
    Ok(())
}

fn cmd_run(use_loopback: bool) -> Result<(), String> {
    let cfg = Config::default();
    let this_node = prompt_node_id()?;

    let audio: Box<dyn AudioPort> = if use_loopback {
        Box::new(LoopbackMedium::new(cfg.sample_rate).attach())
    } else {
        live_audio_port(cfg.sample_rate)
    };

    let mut mac = Mac::new(cfg, audio, this_node);
    mac.run_until(|_| false)
        .map_err(|e| format!("MAC run loop failed: {}", e))
}

/// Drive three in-process MAC instances over a shared `LoopbackAudioPort`
/// medium, for manual verification without audio hardware. Mirrors the
/// broadcast-ACK-schedule trace of testable property 7.
fn cmd_loopback_demo() -> Result<(), String> {
    let mut cfg = Config::default();
    cfg.t_pre = 0.02;
    cfg.t_sym = 0.05;
    cfg.n_pre = 4;
    cfg.r_ratio = 4;
    cfg.r_tol = 1;
    cfg.preamble_wait_time = Duration::from_secs(2);
    cfg.end_wait_time = Duration::from_secs(2);
    cfg.inter_frame_gap = Duration::from_millis(50);

    let medium = LoopbackMedium::new(cfg.sample_rate);
    let node_ids = [1u8, 2, 3];

    let mut handles = Vec::new();
    for &id in &node_ids {
        let cfg = cfg.clone();
        let audio: Box<dyn AudioPort> = Box::new(medium.attach());
        let node = NodeId::from_int(id).unwrap();
        handles.push(std::thread::spawn(move || {
            let mut mac = Mac::new(cfg, audio, node);
            if id == 1 {
                mac.enqueue(acoustic_mac::frame::OutboundItem {
                    payload: acoustic_mac::frame::BitString::parse("1011").unwrap(),
                    dest: acoustic_mac::frame::Destination::Broadcast,
                    msg_id: acoustic_mac::frame::MessageId::default(),
                });
            }
            let deadline = Instant::now() + Duration::from_secs(10);
            mac.run_until(|_| Instant::now() >= deadline).ok();
        }));
    }
    for h in handles {
        h.join().map_err(|_| "a loopback-demo node thread panicked".to_string())?;
    }
    Ok(())
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage();
    }

    let result = match args[1].as_str() {
        "run" => cmd_run(args.iter().any(|a| a == "--loopback")),
        "tx" if args.len() == 5 => cmd_tx(&args[2], &args[3], &args[4]),
        "rx" if args.len() == 3 => cmd_rx(&args[2]),
        "loopback-demo" => cmd_loopback_demo(),
        "tx" | "rx" => usage(),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            usage();
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
