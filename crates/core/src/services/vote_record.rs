//! Vote record model shared by both backends.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use votebattle_db::entities::battle_vote;

/// One of the two contenders in a pairing.
///
/// A side is always relative to the order the caller passed the ids in,
/// not to the column the record happens to store the contender under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The first contender.
    A,
    /// The second contender.
    B,
}

impl Side {
    /// The other side.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    /// Stable string form used by the local store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "a",
            Self::B => "b",
        }
    }

    /// Parse the form written by [`Side::as_str`].
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "a" => Some(Self::A),
            "b" => Some(Self::B),
            _ => None,
        }
    }

    /// Pick the id on this side of `(id_a, id_b)`.
    #[must_use]
    pub const fn pick(self, id_a: i32, id_b: i32) -> i32 {
        match self {
            Self::A => id_a,
            Self::B => id_b,
        }
    }
}

/// Persisted tally for one pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    /// Identity assigned by the backend that created the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Contender stored in the A column.
    pub entity_a_id: i32,
    /// Name of the A contender.
    pub entity_a_name: String,
    /// Votes for the A contender.
    pub entity_a_votes: u32,
    /// Contender stored in the B column.
    pub entity_b_id: i32,
    /// Name of the B contender.
    pub entity_b_name: String,
    /// Votes for the B contender.
    pub entity_b_votes: u32,
    /// When the battle started (or was last reset).
    pub started_at: DateTime<Utc>,
    /// Last mutation.
    pub updated_at: DateTime<Utc>,
}

impl VoteRecord {
    /// A zero-vote record starting now.
    #[must_use]
    pub fn new(
        id: Option<i64>,
        entity_a_id: i32,
        entity_a_name: impl Into<String>,
        entity_b_id: i32,
        entity_b_name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            entity_a_id,
            entity_a_name: entity_a_name.into(),
            entity_a_votes: 0,
            entity_b_id,
            entity_b_name: entity_b_name.into(),
            entity_b_votes: 0,
            started_at: now,
            updated_at: now,
        }
    }

    /// Name used when a record is created before the contender is known.
    #[must_use]
    pub fn placeholder_name(entity_id: i32) -> String {
        format!("contender-{entity_id}")
    }

    /// Whether this record belongs to the unordered pair `{first, second}`.
    #[must_use]
    pub const fn matches_pair(&self, first_id: i32, second_id: i32) -> bool {
        (self.entity_a_id == first_id && self.entity_b_id == second_id)
            || (self.entity_a_id == second_id && self.entity_b_id == first_id)
    }

    /// The stored column holding `entity_id`, if it is part of this record.
    #[must_use]
    pub const fn side_of(&self, entity_id: i32) -> Option<Side> {
        if self.entity_a_id == entity_id {
            Some(Side::A)
        } else if self.entity_b_id == entity_id {
            Some(Side::B)
        } else {
            None
        }
    }

    /// Translate a side relative to `(id_a, id_b)` into the stored column.
    #[must_use]
    pub const fn stored_side(&self, side: Side, id_a: i32, id_b: i32) -> Side {
        match self.side_of(side.pick(id_a, id_b)) {
            Some(stored) => stored,
            None => side,
        }
    }

    /// Votes in a stored column.
    #[must_use]
    pub const fn votes(&self, stored: Side) -> u32 {
        match stored {
            Side::A => self.entity_a_votes,
            Side::B => self.entity_b_votes,
        }
    }

    /// Votes for a contender, zero if it is not part of this record.
    #[must_use]
    pub const fn votes_for_entity(&self, entity_id: i32) -> u32 {
        match self.side_of(entity_id) {
            Some(stored) => self.votes(stored),
            None => 0,
        }
    }

    /// Sum of both counters.
    #[must_use]
    pub const fn total_votes(&self) -> u32 {
        self.entity_a_votes.saturating_add(self.entity_b_votes)
    }

    /// Add one vote to a stored column.
    pub fn record_vote(&mut self, stored: Side) {
        match stored {
            Side::A => self.entity_a_votes = self.entity_a_votes.saturating_add(1),
            Side::B => self.entity_b_votes = self.entity_b_votes.saturating_add(1),
        }
        self.updated_at = next_timestamp(self.updated_at);
    }

    /// Zero both counters and restart the battle clock.
    pub fn reset(&mut self) {
        let now = next_timestamp(self.updated_at);
        self.entity_a_votes = 0;
        self.entity_b_votes = 0;
        self.started_at = now;
        self.updated_at = now;
    }

    /// Refresh contender names, keeping them in the stored column order.
    pub fn rename(&mut self, entity_id: i32, name: &str) {
        match self.side_of(entity_id) {
            Some(Side::A) => self.entity_a_name = name.to_string(),
            Some(Side::B) => self.entity_b_name = name.to_string(),
            None => {}
        }
    }
}

/// Now, or one microsecond past `previous` if the clock has not moved on.
fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

impl From<battle_vote::Model> for VoteRecord {
    fn from(model: battle_vote::Model) -> Self {
        Self {
            id: Some(model.id),
            entity_a_id: model.entity_a_id,
            entity_a_name: model.entity_a_name,
            entity_a_votes: u32::try_from(model.entity_a_votes).unwrap_or(0),
            entity_b_id: model.entity_b_id,
            entity_b_name: model.entity_b_name,
            entity_b_votes: u32::try_from(model.entity_b_votes).unwrap_or(0),
            started_at: model.started_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record() -> VoteRecord {
        VoteRecord::new(Some(1), 1, "bulbasaur", 25, "pikachu")
    }

    #[test]
    fn test_new_record_is_empty() {
        let r = record();
        assert_eq!(r.total_votes(), 0);
        assert_eq!(r.started_at, r.updated_at);
    }

    #[test]
    fn test_stored_side_follows_entity() {
        let r = record();
        assert_eq!(r.stored_side(Side::A, 1, 25), Side::A);
        // Caller sees 25 first; its side A is stored in column B.
        assert_eq!(r.stored_side(Side::A, 25, 1), Side::B);
        assert_eq!(r.stored_side(Side::B, 25, 1), Side::A);
    }

    #[test]
    fn test_record_vote_advances_updated_at() {
        let mut r = record();
        let before = r.updated_at;
        r.record_vote(Side::A);
        let middle = r.updated_at;
        r.record_vote(Side::B);

        assert_eq!((r.entity_a_votes, r.entity_b_votes), (1, 1));
        assert!(middle > before);
        assert!(r.updated_at > middle);
    }

    #[test]
    fn test_reset_zeroes_counters() {
        let mut r = record();
        r.record_vote(Side::A);
        r.record_vote(Side::A);
        let voted_at = r.updated_at;
        r.reset();

        assert_eq!(r.total_votes(), 0);
        assert!(r.started_at > voted_at);
        assert!(r.updated_at >= r.started_at);
    }

    #[test]
    fn test_votes_for_entity() {
        let mut r = record();
        r.record_vote(Side::B);
        assert_eq!(r.votes_for_entity(25), 1);
        assert_eq!(r.votes_for_entity(1), 0);
        assert_eq!(r.votes_for_entity(99), 0);
    }

    #[test]
    fn test_side_string_form() {
        assert_eq!(Side::parse(Side::A.as_str()), Some(Side::A));
        assert_eq!(Side::parse(Side::B.as_str()), Some(Side::B));
        assert_eq!(Side::parse("pokemon1"), None);
        assert_eq!(serde_json::to_string(&Side::B).unwrap(), "\"b\"");
    }

    #[test]
    fn test_from_model_clamps_negative_counts() {
        let now = Utc::now().fixed_offset();
        let model = battle_vote::Model {
            id: 5,
            entity_a_id: 4,
            entity_a_name: "charmander".to_string(),
            entity_a_votes: -1,
            entity_b_id: 7,
            entity_b_name: "squirtle".to_string(),
            entity_b_votes: 3,
            started_at: now,
            updated_at: now,
        };
        let r = VoteRecord::from(model);
        assert_eq!(r.id, Some(5));
        assert_eq!((r.entity_a_votes, r.entity_b_votes), (0, 3));
    }
}
