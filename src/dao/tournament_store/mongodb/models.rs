use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    dao::models::{CLOCK_ROW_ID, ClockEntity, VoteEntity, WinnerEntity},
    state::{
        bracket::Color,
        timer::{Countdown, CycleTimer},
    },
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoVoteDocument {
    #[serde(rename = "_id")]
    id: String,
    phase_key: String,
    voter_id: String,
    color: Color,
    cast_at: DateTime,
}

impl From<VoteEntity> for MongoVoteDocument {
    fn from(value: VoteEntity) -> Self {
        Self {
            id: vote_doc_id(&value.phase_key, value.voter_id),
            phase_key: value.phase_key,
            voter_id: value.voter_id.to_string(),
            color: value.color,
            cast_at: DateTime::from_millis(value.cast_at_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoWinnerDocument {
    #[serde(rename = "_id")]
    phase_key: String,
    color: Color,
    decided_at: DateTime,
}

impl From<WinnerEntity> for MongoWinnerDocument {
    fn from(value: WinnerEntity) -> Self {
        Self {
            phase_key: value.phase_key,
            color: value.color,
            decided_at: DateTime::from_millis(value.decided_at_ms),
        }
    }
}

impl From<MongoWinnerDocument> for WinnerEntity {
    fn from(value: MongoWinnerDocument) -> Self {
        Self {
            phase_key: value.phase_key,
            color: value.color,
            decided_at_ms: value.decided_at.timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoClockDocument {
    #[serde(rename = "_id")]
    id: String,
    version: i64,
    cycle: CycleTimer,
    countdown: Countdown,
}

impl From<ClockEntity> for MongoClockDocument {
    fn from(value: ClockEntity) -> Self {
        Self {
            id: CLOCK_ROW_ID.to_owned(),
            version: value.version as i64,
            cycle: value.cycle,
            countdown: value.countdown,
        }
    }
}

impl From<MongoClockDocument> for ClockEntity {
    fn from(value: MongoClockDocument) -> Self {
        Self {
            version: value.version.max(0) as u64,
            cycle: value.cycle,
            countdown: value.countdown,
        }
    }
}

/// Votes are keyed by `(phase_key, voter)` through a composite `_id`.
pub fn vote_doc_id(phase_key: &str, voter_id: Uuid) -> String {
    format!("{phase_key}/{voter_id}")
}

pub fn key_filter(key: &str) -> Document {
    doc! {"_id": key}
}

pub fn color_filter(phase_key: &str, color: Color) -> Document {
    let color = match color {
        Color::Red => "red",
        Color::Blue => "blue",
    };
    doc! {"phase_key": phase_key, "color": color}
}

pub fn clock_filter(version: u64) -> Document {
    doc! {"_id": CLOCK_ROW_ID, "version": version as i64}
}
