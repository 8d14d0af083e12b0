//! Database repositories.

pub mod battle_vote;

pub use battle_vote::{BattleVoteRepository, VoteColumn};
