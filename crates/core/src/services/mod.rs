//! Vote synchronization services.

#![allow(missing_docs)]

pub mod arbitrator;
pub mod backend;
pub mod battle_key;
pub mod battle_state;
pub mod contender_lookup;
pub mod local_backend;
pub mod local_store;
pub mod remote_backend;
pub mod subscription;
pub mod vote_feed;
pub mod vote_record;

pub use arbitrator::VoteArbitrator;
pub use backend::{BackendKind, StartPolicy, VoteBackend};
pub use battle_key::{battle_key, canonical_pair, decode_pairing, encode_pairing};
pub use battle_state::{BattleController, BattleState, BattleStatus, VoteOutcome};
pub use contender_lookup::{
    Contender, ContenderLookup, HttpContenderLookup, StaticContenderLookup,
};
pub use local_backend::LocalBackend;
pub use local_store::{FileStore, KeyValueStore, MemoryStore, SharedStore, StorageEvent};
pub use remote_backend::RemoteBackend;
pub use subscription::VoteSubscription;
pub use vote_feed::{ChangeKind, InProcessVoteFeed, RedisVoteFeed, VoteChange, VoteFeed};
pub use vote_record::{Side, VoteRecord};
