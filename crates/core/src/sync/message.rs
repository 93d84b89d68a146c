//! Wire shapes exchanged between the controller and display windows.

use serde::{Deserialize, Serialize};

use crate::error::PidsError;
use crate::models::{LineData, RouteState};

/// A full copy of the controller's state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub line: LineData,
    pub route: RouteState,
}

/// Messages carried by the sync bus, tagged by `t`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum SyncMessage {
    /// Authoritative state from the controller.
    #[serde(rename = "SYNC")]
    Sync { d: LineData, r: RouteState },
    /// A key pressed in a display window, for remote control.
    #[serde(rename = "CMD_KEY")]
    CmdKey { code: String, key: String },
    /// Start screen capture at the given bitrate.
    #[serde(rename = "REC_START")]
    RecStart { bps: u64 },
    #[serde(rename = "REC_STOP")]
    RecStop,
    /// A display asking for a fresh `SYNC`.
    #[serde(rename = "REQ")]
    Req,
}

impl SyncMessage {
    pub fn sync(snapshot: Snapshot) -> Self {
        SyncMessage::Sync {
            d: snapshot.line,
            r: snapshot.route,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::Sync { .. } => "SYNC",
            SyncMessage::CmdKey { .. } => "CMD_KEY",
            SyncMessage::RecStart { .. } => "REC_START",
            SyncMessage::RecStop => "REC_STOP",
            SyncMessage::Req => "REQ",
        }
    }

    pub fn encode(&self) -> Result<String, PidsError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self, PidsError> {
        Ok(serde_json::from_str(raw)?)
    }
}

impl From<Snapshot> for SyncMessage {
    fn from(snapshot: Snapshot) -> Self {
        SyncMessage::sync(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunState;
    use serde_json::json;

    #[test]
    fn decodes_browser_shaped_sync() {
        let raw = json!({
            "t": "SYNC",
            "d": {
                "meta": { "lineName": "<#e4002b>1号线</>", "mode": "linear", "dirType": "up" },
                "stations": [ { "name": "苹果园", "en": "Pingguoyuan" }, { "name": "古城", "en": "Gucheng" } ]
            },
            "r": { "idx": 1, "state": 1 }
        })
        .to_string();
        let SyncMessage::Sync { d, r } = SyncMessage::decode(&raw).unwrap() else {
            panic!("expected SYNC");
        };
        assert_eq!(d.len(), 2);
        assert_eq!(r, RouteState::new(1, RunState::Running));
    }

    #[test]
    fn unit_messages_are_bare_tags() {
        assert_eq!(SyncMessage::Req.encode().unwrap(), r#"{"t":"REQ"}"#);
        assert_eq!(SyncMessage::RecStop.encode().unwrap(), r#"{"t":"REC_STOP"}"#);
        let start = SyncMessage::decode(r#"{"t":"REC_START","bps":8000000}"#).unwrap();
        assert_eq!(start, SyncMessage::RecStart { bps: 8_000_000 });
    }

    #[test]
    fn rejects_unknown_tags() {
        assert!(matches!(
            SyncMessage::decode(r#"{"t":"PING"}"#),
            Err(PidsError::Payload(_))
        ));
    }
}
