//! Interactive prompt commands and their output formatting.

use std::io::Write;

use curryparty_shared::time::timestamp_to_rfc3339;
use thiserror::Error;

use crate::{connection::Peer, engine::SessionSnapshot};

/// A line typed at the prompt
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Play,
    Pause,
    Seek(f64),
    Navigate(String),
    Status,
    Peers,
    Kick(String),
    Leave,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown command '{0}' (type `help`)")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

pub const HELP: &str = "\
commands:
  play              start playback
  pause             pause playback
  seek <seconds>    jump to a position
  nav <url>         move the local page
  status            show session status
  peers             list peers (host)
  kick <peer id>    remove a peer (host)
  leave             leave the room and exit";

impl ReplCommand {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Err(ParseError::Usage("<command> [argument]"));
        };
        let argument = words.next();

        match (name.to_ascii_lowercase().as_str(), argument) {
            ("play", None) => Ok(Self::Play),
            ("pause", None) => Ok(Self::Pause),
            ("seek", Some(value)) => value
                .parse::<f64>()
                .ok()
                .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
                .map(Self::Seek)
                .ok_or(ParseError::Usage("seek <seconds>")),
            ("seek", None) => Err(ParseError::Usage("seek <seconds>")),
            ("nav", Some(url)) => Ok(Self::Navigate(url.to_string())),
            ("nav", None) => Err(ParseError::Usage("nav <url>")),
            ("status", None) => Ok(Self::Status),
            ("peers", None) => Ok(Self::Peers),
            ("kick", Some(peer)) => Ok(Self::Kick(peer.to_string())),
            ("kick", None) => Err(ParseError::Usage("kick <peer id>")),
            ("leave" | "quit" | "exit", None) => Ok(Self::Leave),
            ("help" | "?", None) => Ok(Self::Help),
            (other, _) => Err(ParseError::Unknown(other.to_string())),
        }
    }
}

/// Multi-line status block
pub fn format_status(snapshot: &SessionSnapshot, position: f64, playing: bool) -> String {
    let mut output = String::new();
    output.push_str(&format!("\n{}\n", snapshot.status));
    if let Some(peer_id) = &snapshot.local_peer_id {
        output.push_str(&format!("  peer id:   {}\n", peer_id));
    }
    output.push_str(&format!("  liveness:  {}\n", snapshot.liveness));
    if let Some(url) = &snapshot.room_url {
        output.push_str(&format!("  room url:  {}\n", url));
    }
    if let Some(url) = &snapshot.page_url {
        output.push_str(&format!("  page url:  {}\n", url));
    }
    output.push_str(&format!(
        "  player:    {:.1}s {}\n",
        position,
        if playing { "playing" } else { "paused" }
    ));
    output
}

pub fn format_peers(peers: &[Peer]) -> String {
    let mut output = String::new();
    output.push_str("\n============================================================\n");
    if peers.is_empty() {
        output.push_str("(No peers)\n");
    }
    for peer in peers {
        output.push_str(&format!(
            "{} [{}] - last seen at {}\n",
            peer.peer_id,
            if peer.active { "active" } else { "left" },
            timestamp_to_rfc3339(peer.last_seen_at)
        ));
    }
    output.push_str("============================================================\n");
    output
}

/// Print the prompt again after asynchronous output
pub fn redisplay_prompt(prompt: &str) {
    print!("{}", prompt);
    std::io::stdout().flush().ok();
}
