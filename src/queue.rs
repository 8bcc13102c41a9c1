//! Outbound Queue (§4.H): watches the message-source file for appended
//! lines and turns them into addressed, sequenced `OutboundItem`s.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::SystemTime;

use crate::config::Config;
use crate::error::MacError;
use crate::frame::{BitString, Destination, MessageId, NodeId, OutboundItem};

/// Polls a text file by mtime, parsing newly appended `<text> <target>`
/// lines into `OutboundItem`s tagged with this node's id and an increasing
/// per-node message id.
pub struct OutboundQueue {
    path: PathBuf,
    this_node: NodeId,
    last_mtime: Option<SystemTime>,
    bytes_consumed: u64,
    next_msg_id: MessageId,
}

impl OutboundQueue {
    pub fn new(cfg: &Config, this_node: NodeId) -> Self {
        OutboundQueue {
            path: PathBuf::from(&cfg.message_source_path),
            this_node,
            last_mtime: None,
            bytes_consumed: 0,
            next_msg_id: MessageId::default(),
        }
    }

    /// Non-blocking: returns any items appended since the last poll, or an
    /// empty vec if the file's mtime has not advanced. Missing files are not
    /// an error — the source may not exist until a producer creates it.
    pub fn poll(&mut self) -> Result<Vec<OutboundItem>, MacError> {
        let metadata = match std::fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(MacError::QueueIo(e.to_string())),
        };
        let mtime = metadata.modified().map_err(|e| MacError::QueueIo(e.to_string()))?;
        if Some(mtime) == self.last_mtime {
            return Ok(Vec::new());
        }
        self.last_mtime = Some(mtime);

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.bytes_consumed))?;
        let mut appended = String::new();
        file.read_to_string(&mut appended)?;
        self.bytes_consumed += appended.len() as u64;

        let mut items = Vec::new();
        for line in appended.lines() {
            if let Some(item) = self.parse_line(line) {
                items.push(item);
            }
        }
        Ok(items)
    }

    fn parse_line(&mut self, line: &str) -> Option<OutboundItem> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let mut parts = line.rsplitn(2, char::is_whitespace);
        let target = parts.next()?;
        let text = parts.next()?.trim();

        let dest = match target {
            "0" => Destination::Broadcast,
            "-1" => return None,
            other => Destination::Unicast(NodeId::from_int(other.parse().ok()?)?),
        };
        let payload = BitString::parse(text).ok()?;
        let msg_id = self.next_msg_id;
        self.next_msg_id = self.next_msg_id.next();

        Some(OutboundItem {
            payload,
            dest,
            msg_id,
        })
    }

    pub fn this_node(&self) -> NodeId {
        self.this_node
    }
}
