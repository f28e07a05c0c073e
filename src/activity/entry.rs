//! Recognition of the client log entries that drive rich presence.

use serde::Deserialize;
use std::sync::LazyLock;

use regex::Regex;

const GAME_JOINING: &str = "[FLog::Output] ! Joining game";
const GAME_JOINING_PRIVATE: &str = "[FLog::GameJoinUtil] GameJoinUtil::joinGamePostPrivateServer";
const GAME_JOINING_RESERVED: &str =
    "[FLog::GameJoinUtil] GameJoinUtil::initiateTeleportToReservedServer";
const GAME_JOINING_UDMUX: &str = "[FLog::Network] UDMUX Address = ";
const GAME_JOINED: &str = "[FLog::Network] serverId:";
const GAME_DISCONNECTED: &str = "[FLog::Network] Time to disconnect replication data:";
const GAME_TELEPORTING: &str = "[FLog::SingleSurfaceApp] initiateTeleport";
const BLOXSTRAP_RPC: &str = "[FLog::Output] [BloxstrapRPC] ";

static JOINING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"! Joining game '([0-9a-f\-]{36})' place ([0-9]+) at ([0-9\.]+)")
        .expect("valid regex")
});
static UDMUX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"UDMUX Address = ([0-9\.]+), Port = [0-9]+ \| RCC Server Address = ([0-9\.]+), Port = [0-9]+")
        .expect("valid regex")
});
static JOINED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"serverId: ([0-9\.]+)\|[0-9]+").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Joining {
        job_id: String,
        place_id: u64,
        address: String,
    },
    JoiningPrivate,
    JoiningReserved,
    Udmux {
        address: String,
    },
    Joined {
        address: String,
    },
    Disconnected,
    Teleporting,
    Message(Message),
}

/// A message an experience sends through the BloxstrapRPC SDK.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Message {
    pub command: String,
    #[serde(default)]
    pub data: Option<RichPresence>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RichPresence {
    pub details: Option<String>,
    pub state: Option<String>,
    pub time_start: Option<i64>,
    pub time_end: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum EntryError {
    #[error("unrecognized {0} entry")]
    Malformed(&'static str),
    #[error("bad BloxstrapRPC message: {0}")]
    Message(#[from] serde_json::Error),
}

/// Classify one log line. Lines that are not presence-related yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Entry>, EntryError> {
    if let Some(idx) = line.find(BLOXSTRAP_RPC) {
        let raw = &line[idx + BLOXSTRAP_RPC.len()..];
        return Ok(Some(Entry::Message(serde_json::from_str(raw)?)));
    }

    if line.contains(GAME_JOINING_PRIVATE) {
        return Ok(Some(Entry::JoiningPrivate));
    }
    if line.contains(GAME_JOINING_RESERVED) {
        return Ok(Some(Entry::JoiningReserved));
    }
    if line.contains(GAME_TELEPORTING) {
        return Ok(Some(Entry::Teleporting));
    }
    if line.contains(GAME_DISCONNECTED) {
        return Ok(Some(Entry::Disconnected));
    }

    if line.contains(GAME_JOINING) {
        let caps = JOINING_RE
            .captures(line)
            .ok_or(EntryError::Malformed("game joining"))?;
        let place_id = caps[2]
            .parse()
            .map_err(|_| EntryError::Malformed("game joining"))?;
        return Ok(Some(Entry::Joining {
            job_id: caps[1].to_string(),
            place_id,
            address: caps[3].to_string(),
        }));
    }
    if line.contains(GAME_JOINING_UDMUX) {
        let caps = UDMUX_RE
            .captures(line)
            .ok_or(EntryError::Malformed("UDMUX"))?;
        return Ok(Some(Entry::Udmux {
            address: caps[1].to_string(),
        }));
    }
    if line.contains(GAME_JOINED) {
        let caps = JOINED_RE
            .captures(line)
            .ok_or(EntryError::Malformed("game joined"))?;
        return Ok(Some(Entry::Joined {
            address: caps[1].to_string(),
        }));
    }

    Ok(None)
}
