//! Database entities.

#![allow(missing_docs)]

pub mod battle_vote;

pub use battle_vote::Entity as BattleVote;
