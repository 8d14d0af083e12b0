//! Capability shared by the vote storage backends.

use async_trait::async_trait;
use votebattle_common::AppResult;

use super::contender_lookup::Contender;
use super::subscription::VoteSubscription;
use super::vote_record::{Side, VoteRecord};

/// Which backend served a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// The shared remote table.
    Remote,
    /// The profile-scoped local store.
    Local,
}

impl BackendKind {
    /// Lowercase name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Local => "local",
        }
    }
}

/// What `start_new_battle` does when the pairing already has a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartPolicy {
    /// Return the existing record and its counts.
    #[default]
    KeepExisting,
    /// Zero the existing record's counts.
    ResetExisting,
}

/// Storage for vote records.
///
/// Pair ids are accepted in either order; `side` always refers to the
/// order the caller passed them in.
#[async_trait]
pub trait VoteBackend: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> BackendKind;

    /// Fetch the record for a pairing, creating a zero-vote record if absent.
    async fn get_record(&self, id_a: i32, id_b: i32) -> AppResult<VoteRecord>;

    /// Add exactly one vote to `side` and return the updated record.
    async fn increment_vote(&self, side: Side, id_a: i32, id_b: i32) -> AppResult<VoteRecord>;

    /// Make sure a record exists for a pairing, with the contenders' names.
    async fn start_new_battle(
        &self,
        contender_a: &Contender,
        contender_b: &Contender,
        policy: StartPolicy,
    ) -> AppResult<VoteRecord>;

    /// Zero both counters of a pairing.
    async fn reset_votes(&self, id_a: i32, id_b: i32) -> AppResult<VoteRecord>;

    /// Listen for record changes, optionally scoped to one record identity.
    async fn subscribe(&self, battle_id: Option<i64>) -> AppResult<VoteSubscription>;
}
