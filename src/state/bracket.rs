//! Bracket vocabulary: rounds, slots, colors and the phase keys that identify a matchup.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use utoipa::ToSchema;

/// Separator placed between the base timestamp and the slot id of a phase key.
pub const PHASE_KEY_SEPARATOR: char = '|';
/// Number of seeds entering the round-of-32.
pub const SEED_COUNT: usize = 32;

/// Errors raised when parsing bracket identifiers coming from clients or storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The slot identifier does not name one of the 31 bracket positions.
    #[error("unknown slot `{0}`")]
    UnknownSlot(String),
    /// The round identifier is not one of `r32`, `r16`, `qf`, `sf`, `final`.
    #[error("unknown round `{0}`")]
    UnknownRound(String),
    /// The phase key is missing its separator.
    #[error("phase key `{0}` has no `|` separator")]
    MissingSeparator(String),
    /// The base timestamp is not a second-precision UTC ISO-8601 instant.
    #[error("invalid base timestamp `{0}`")]
    InvalidBase(String),
}

/// The five rounds of a cycle, in play order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Round {
    /// Sixteen matchups between the thirty-two seeds.
    #[serde(rename = "r32")]
    RoundOf32,
    /// Eight matchups.
    #[serde(rename = "r16")]
    RoundOf16,
    /// Four matchups.
    #[serde(rename = "qf")]
    Quarterfinal,
    /// Two matchups.
    #[serde(rename = "sf")]
    Semifinal,
    /// The last matchup.
    Final,
}

impl Round {
    /// Every round in play order.
    pub const ALL: [Round; 5] = [
        Round::RoundOf32,
        Round::RoundOf16,
        Round::Quarterfinal,
        Round::Semifinal,
        Round::Final,
    ];

    /// 1-based round number, which is also the checkpoint that closes the round.
    pub fn number(self) -> u8 {
        match self {
            Round::RoundOf32 => 1,
            Round::RoundOf16 => 2,
            Round::Quarterfinal => 3,
            Round::Semifinal => 4,
            Round::Final => 5,
        }
    }

    /// Round closed by `checkpoint` (1..=5). Checkpoint 0 closes nothing.
    pub fn from_checkpoint(checkpoint: u8) -> Option<Self> {
        Self::ALL.get(usize::from(checkpoint).checked_sub(1)?).copied()
    }

    /// Number of matchups played in this round.
    pub fn slot_count(self) -> u8 {
        match self {
            Round::RoundOf32 => 16,
            Round::RoundOf16 => 8,
            Round::Quarterfinal => 4,
            Round::Semifinal => 2,
            Round::Final => 1,
        }
    }

    /// Every slot of this round, in bracket order.
    pub fn slots(self) -> impl Iterator<Item = Slot> {
        (1..=self.slot_count()).map(move |index| Slot { round: self, index })
    }

    /// Round feeding winners into this one.
    pub fn previous(self) -> Option<Self> {
        Self::from_checkpoint(self.number() - 1)
    }

    /// Round receiving this round's winners.
    pub fn next(self) -> Option<Self> {
        Self::from_checkpoint(self.number() + 1)
    }

    /// Short identifier used in URLs and slot ids.
    pub fn as_str(self) -> &'static str {
        match self {
            Round::RoundOf32 => "r32",
            Round::RoundOf16 => "r16",
            Round::Quarterfinal => "qf",
            Round::Semifinal => "sf",
            Round::Final => "final",
        }
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Round {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Round::ALL
            .into_iter()
            .find(|round| round.as_str() == s)
            .ok_or_else(|| KeyError::UnknownRound(s.to_string()))
    }
}

/// A symbolic bracket position such as `r32_7`, `qf2` or `final`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub struct Slot {
    round: Round,
    index: u8,
}

impl Slot {
    /// Build a slot, returning `None` when `index` is outside `1..=round.slot_count()`.
    pub fn new(round: Round, index: u8) -> Option<Self> {
        (1..=round.slot_count())
            .contains(&index)
            .then_some(Self { round, index })
    }

    /// The single slot of the final.
    pub fn final_slot() -> Self {
        Self {
            round: Round::Final,
            index: 1,
        }
    }

    /// Round this slot belongs to.
    pub fn round(self) -> Round {
        self.round
    }

    /// 1-based position within the round.
    pub fn index(self) -> u8 {
        self.index
    }

    /// The two slots of the previous round whose winners meet here.
    ///
    /// Slot `n` pairs parents `2n - 1` and `2n`; round-of-32 slots have no parents.
    pub fn parents(self) -> Option<(Slot, Slot)> {
        let previous = self.round.previous()?;
        Some((
            Slot {
                round: previous,
                index: self.index * 2 - 1,
            },
            Slot {
                round: previous,
                index: self.index * 2,
            },
        ))
    }

    /// Slot of the next round this slot's winner advances into.
    pub fn child(self) -> Option<Slot> {
        Some(Slot {
            round: self.round.next()?,
            index: self.index.div_ceil(2),
        })
    }

    /// Zero-based indices of the two seeds of a round-of-32 slot.
    pub fn seed_indices(self) -> Option<(usize, usize)> {
        if self.round != Round::RoundOf32 {
            return None;
        }
        let first = usize::from(self.index - 1) * 2;
        Some((first, first + 1))
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.round {
            Round::RoundOf32 | Round::RoundOf16 => write!(f, "{}_{}", self.round, self.index),
            Round::Quarterfinal | Round::Semifinal => write!(f, "{}{}", self.round, self.index),
            Round::Final => f.write_str("final"),
        }
    }
}

impl FromStr for Slot {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || KeyError::UnknownSlot(s.to_string());
        if s == "final" {
            return Ok(Slot::final_slot());
        }

        let (round, digits) = if let Some(rest) = s.strip_prefix("r32_") {
            (Round::RoundOf32, rest)
        } else if let Some(rest) = s.strip_prefix("r16_") {
            (Round::RoundOf16, rest)
        } else if let Some(rest) = s.strip_prefix("qf") {
            (Round::Quarterfinal, rest)
        } else if let Some(rest) = s.strip_prefix("sf") {
            (Round::Semifinal, rest)
        } else {
            return Err(unknown());
        };

        if digits.is_empty() || digits.starts_with('0') {
            return Err(unknown());
        }
        let index = digits.parse::<u8>().map_err(|_| unknown())?;
        Slot::new(round, index).ok_or_else(unknown)
    }
}

/// Choice between the two images of a matchup. `Red` is the first image, `Blue` the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    /// First image of the pair.
    Red,
    /// Second image of the pair.
    Blue,
}

impl Color {
    /// Select the element of `pair` this color stands for.
    pub fn pick<T>(self, pair: (T, T)) -> T {
        match self {
            Color::Red => pair.0,
            Color::Blue => pair.1,
        }
    }

    /// The other side of the pair.
    pub fn opposite(self) -> Self {
        match self {
            Color::Red => Color::Blue,
            Color::Blue => Color::Red,
        }
    }
}

/// Identifier of one matchup instance: the round's base timestamp plus a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub struct PhaseKey {
    base_ms: i64,
    slot: Slot,
}

impl PhaseKey {
    /// Build a key; the base is truncated to whole seconds.
    pub fn new(base_ms: i64, slot: Slot) -> Self {
        Self {
            base_ms: truncate_to_second(base_ms),
            slot,
        }
    }

    /// Base timestamp in unix milliseconds (always a whole second).
    pub fn base_ms(&self) -> i64 {
        self.base_ms
    }

    /// Slot this key refers to.
    pub fn slot(&self) -> Slot {
        self.slot
    }
}

impl fmt::Display for PhaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            format_base(self.base_ms),
            PHASE_KEY_SEPARATOR,
            self.slot
        )
    }
}

impl FromStr for PhaseKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, slot) = s
            .split_once(PHASE_KEY_SEPARATOR)
            .ok_or_else(|| KeyError::MissingSeparator(s.to_string()))?;
        let base_ms = parse_base(base)?;
        Ok(Self {
            base_ms,
            slot: slot.parse()?,
        })
    }
}

/// Drop the sub-second part of a unix millisecond timestamp.
pub fn truncate_to_second(ms: i64) -> i64 {
    ms - ms.rem_euclid(1_000)
}

/// Format unix milliseconds as an RFC 3339 UTC instant, dropping sub-second precision.
pub fn format_base(ms: i64) -> String {
    OffsetDateTime::from_unix_timestamp(ms.div_euclid(1_000))
        .ok()
        .and_then(|instant| instant.format(&Rfc3339).ok())
        .unwrap_or_else(|| "invalid-timestamp".into())
}

/// Format unix milliseconds as an RFC 3339 UTC instant keeping milliseconds.
pub fn format_instant(ms: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .ok()
        .and_then(|instant| instant.format(&Rfc3339).ok())
        .unwrap_or_else(|| "invalid-timestamp".into())
}

fn parse_base(base: &str) -> Result<i64, KeyError> {
    let invalid = || KeyError::InvalidBase(base.to_string());
    let instant = OffsetDateTime::parse(base, &Rfc3339).map_err(|_| invalid())?;
    if !instant.offset().is_utc() || instant.nanosecond() != 0 {
        return Err(invalid());
    }
    let ms = instant.unix_timestamp() * 1_000;
    if format_base(ms) != base {
        return Err(invalid());
    }
    Ok(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thirty_one_slots_per_cycle() {
        let total: usize = Round::ALL.iter().map(|round| round.slots().count()).sum();
        assert_eq!(total, 31);
    }

    #[test]
    fn slot_ids_round_trip_through_strings() {
        for round in Round::ALL {
            for slot in round.slots() {
                assert_eq!(slot.to_string().parse::<Slot>().unwrap(), slot);
            }
        }
        assert_eq!(Slot::new(Round::RoundOf32, 7).unwrap().to_string(), "r32_7");
        assert_eq!(Slot::new(Round::Quarterfinal, 2).unwrap().to_string(), "qf2");
        assert_eq!(Slot::final_slot().to_string(), "final");
    }

    #[test]
    fn rejects_unknown_slots() {
        for raw in ["r32_0", "r32_17", "r16_9", "qf5", "sf0", "sf01", "final2", "", "r8_1"] {
            assert!(raw.parse::<Slot>().is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn parents_follow_fixed_pairing() {
        let qf2 = Slot::new(Round::Quarterfinal, 2).unwrap();
        let (left, right) = qf2.parents().unwrap();
        assert_eq!(left.to_string(), "r16_3");
        assert_eq!(right.to_string(), "r16_4");
        assert_eq!(left.child(), Some(qf2));
        assert_eq!(right.child(), Some(qf2));
        assert!(Slot::new(Round::RoundOf32, 1).unwrap().parents().is_none());
        assert!(Slot::final_slot().child().is_none());
    }

    #[test]
    fn checkpoints_map_to_rounds() {
        assert_eq!(Round::from_checkpoint(0), None);
        assert_eq!(Round::from_checkpoint(1), Some(Round::RoundOf32));
        assert_eq!(Round::from_checkpoint(5), Some(Round::Final));
        assert_eq!(Round::from_checkpoint(6), None);
    }

    #[test]
    fn phase_key_uses_second_precision_base() {
        let slot = Slot::new(Round::RoundOf32, 7).unwrap();
        let key = PhaseKey::new(1_714_564_800_999, slot);
        assert_eq!(key.to_string(), "2024-05-01T12:00:00Z|r32_7");
        assert_eq!(key.to_string().parse::<PhaseKey>().unwrap(), key);
    }

    #[test]
    fn rejects_malformed_phase_keys() {
        for raw in [
            "2024-05-01T12:00:00Z",
            "2024-05-01T12:00:00.500Z|qf1",
            "2024-05-01T14:00:00+02:00|qf1",
            "yesterday|qf1",
            "2024-05-01T12:00:00Z|qf9",
        ] {
            assert!(raw.parse::<PhaseKey>().is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn color_picks_side_of_pair() {
        assert_eq!(Color::Red.pick(("a", "b")), "a");
        assert_eq!(Color::Blue.pick(("a", "b")), "b");
    }
}
