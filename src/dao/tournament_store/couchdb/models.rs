use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    dao::models::{CLOCK_ROW_ID, ClockEntity, VoteEntity, WinnerEntity},
    state::{
        bracket::Color,
        timer::{Countdown, CycleTimer},
    },
};

pub const VOTE_PREFIX: &str = "vote::";
pub const WINNER_PREFIX: &str = "winner::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[allow(dead_code)]
    pub id: String,
    #[serde(default)]
    pub doc: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchVoteDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub phase_key: String,
    pub voter_id: Uuid,
    pub color: Color,
    pub cast_at_ms: i64,
}

impl From<VoteEntity> for CouchVoteDocument {
    fn from(value: VoteEntity) -> Self {
        Self {
            id: vote_doc_id(&value.phase_key, value.voter_id),
            rev: None,
            phase_key: value.phase_key,
            voter_id: value.voter_id,
            color: value.color,
            cast_at_ms: value.cast_at_ms,
        }
    }
}

/// Projection used when tallying; only the color matters.
#[derive(Debug, Deserialize)]
pub struct CouchVoteColor {
    pub color: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchWinnerDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub phase_key: String,
    pub color: Color,
    pub decided_at_ms: i64,
}

impl From<WinnerEntity> for CouchWinnerDocument {
    fn from(value: WinnerEntity) -> Self {
        Self {
            id: winner_doc_id(&value.phase_key),
            rev: None,
            phase_key: value.phase_key,
            color: value.color,
            decided_at_ms: value.decided_at_ms,
        }
    }
}

impl From<CouchWinnerDocument> for WinnerEntity {
    fn from(value: CouchWinnerDocument) -> Self {
        Self {
            phase_key: value.phase_key,
            color: value.color,
            decided_at_ms: value.decided_at_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchClockDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub version: u64,
    pub cycle: CycleTimer,
    pub countdown: Countdown,
}

impl CouchClockDocument {
    pub fn from_entity(clock: ClockEntity, rev: Option<String>) -> Self {
        Self {
            id: CLOCK_ROW_ID.to_owned(),
            rev,
            version: clock.version,
            cycle: clock.cycle,
            countdown: clock.countdown,
        }
    }
}

impl From<CouchClockDocument> for ClockEntity {
    fn from(value: CouchClockDocument) -> Self {
        Self {
            version: value.version,
            cycle: value.cycle,
            countdown: value.countdown,
        }
    }
}

/// Vote ids share the phase-key prefix so one range scan covers a matchup.
pub fn vote_doc_id(phase_key: &str, voter_id: Uuid) -> String {
    format!("{}{}", vote_prefix(phase_key), voter_id)
}

pub fn vote_prefix(phase_key: &str) -> String {
    format!("{VOTE_PREFIX}{phase_key}::")
}

pub fn winner_doc_id(phase_key: &str) -> String {
    format!("{WINNER_PREFIX}{phase_key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_ids_for_one_matchup_share_a_prefix() {
        let key = "2024-05-01T12:00:00Z|r32_1";
        let id = vote_doc_id(key, Uuid::nil());
        assert!(id.starts_with(&vote_prefix(key)));
        assert!(!vote_doc_id("2024-05-01T12:00:00Z|r32_10", Uuid::nil()).starts_with(&vote_prefix(key)));
    }

    #[test]
    fn clock_document_omits_missing_revision() {
        let doc = CouchClockDocument::from_entity(ClockEntity::initial(0, 300), None);
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["_id"], "clock");
        assert!(value.get("_rev").is_none());
        assert_eq!(value["version"], 0);
    }
}
