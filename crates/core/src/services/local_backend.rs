//! Local vote backend.
//!
//! Records, vote markers and the last active pairing all live in one
//! [`KeyValueStore`]. Every record write is announced on the store's
//! change channel, so listeners sharing the store (including this handle)
//! see it.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};
use votebattle_common::{AppResult, IdGenerator, LocalConfig};

use super::backend::{BackendKind, StartPolicy, VoteBackend};
use super::battle_key::{battle_key, canonical_pair, decode_pairing, encode_pairing};
use super::contender_lookup::Contender;
use super::local_store::{FileStore, KeyValueStore, MemoryStore, SharedStore, StorageEvent};
use super::subscription::{SUBSCRIPTION_BUFFER, VoteSubscription, spawn_forwarder};
use super::vote_record::{Side, VoteRecord};

/// Key prefix for vote records.
pub const VOTES_PREFIX: &str = "battle_votes:";
/// Key prefix for this profile's vote markers.
pub const USER_VOTE_PREFIX: &str = "battle_user_vote:";
/// Key holding the last active pairing.
pub const LAST_ACTIVE_KEY: &str = "last_active_battle";

/// Vote backend over a profile-scoped key-value store.
#[derive(Clone)]
pub struct LocalBackend {
    store: SharedStore,
    ids: IdGenerator,
    /// Held across each record read-modify-write. Shared by clones.
    write_lock: Arc<Mutex<()>>,
}

impl LocalBackend {
    /// Create a backend over an existing store.
    #[must_use]
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            ids: IdGenerator::new(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Backend over a fresh in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Backend over the file store described by `config`.
    pub async fn open(config: &LocalConfig) -> AppResult<Self> {
        Self::open_path(config.storage_path()).await
    }

    /// Backend over a file store at `path`.
    pub async fn open_path(path: impl AsRef<Path>) -> AppResult<Self> {
        let store = FileStore::open(path).await?;
        Ok(Self::new(Arc::new(store)))
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    fn votes_key(id_a: i32, id_b: i32) -> String {
        format!("{VOTES_PREFIX}{}", battle_key(id_a, id_b))
    }

    fn user_vote_key(id_a: i32, id_b: i32) -> String {
        format!("{USER_VOTE_PREFIX}{}", battle_key(id_a, id_b))
    }

    async fn load(&self, id_a: i32, id_b: i32) -> AppResult<Option<VoteRecord>> {
        let key = Self::votes_key(id_a, id_b);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding unreadable vote record");
                Ok(None)
            }
        }
    }

    async fn save(&self, record: &VoteRecord) -> AppResult<()> {
        let key = Self::votes_key(record.entity_a_id, record.entity_b_id);
        let raw = serde_json::to_string(record)?;
        self.store.set(&key, raw.clone()).await?;
        self.store.broadcast(StorageEvent {
            key,
            new_value: Some(raw),
        });
        Ok(())
    }

    async fn load_or_create(&self, id_a: i32, id_b: i32) -> AppResult<VoteRecord> {
        if let Some(record) = self.load(id_a, id_b).await? {
            return Ok(record);
        }

        let record = VoteRecord::new(
            Some(self.ids.next_local_id()),
            id_a,
            VoteRecord::placeholder_name(id_a),
            id_b,
            VoteRecord::placeholder_name(id_b),
        );
        self.save(&record).await?;
        debug!(battle_id = ?record.id, id_a, id_b, "Created local vote record");
        Ok(record)
    }

    /// The side this profile voted for, relative to `(id_a, id_b)`.
    pub async fn get_user_vote(&self, id_a: i32, id_b: i32) -> AppResult<Option<Side>> {
        let raw = self.store.get(&Self::user_vote_key(id_a, id_b)).await?;
        Ok(raw
            .as_deref()
            .and_then(Side::parse)
            .map(|stored| relative_side(stored, id_a, id_b)))
    }

    /// Remember that this profile voted for `side` of `(id_a, id_b)`.
    pub async fn set_user_vote(&self, side: Side, id_a: i32, id_b: i32) -> AppResult<()> {
        let stored = relative_side(side, id_a, id_b);
        self.store
            .set(&Self::user_vote_key(id_a, id_b), stored.as_str().to_string())
            .await
    }

    /// Forget the vote for one pairing, or every vote when `pair` is `None`.
    pub async fn clear_user_vote(&self, pair: Option<(i32, i32)>) -> AppResult<()> {
        match pair {
            Some((id_a, id_b)) => self.store.remove(&Self::user_vote_key(id_a, id_b)).await,
            None => {
                let keys = self.store.keys_with_prefix(USER_VOTE_PREFIX).await?;
                for key in &keys {
                    self.store.remove(key).await?;
                }
                info!(count = keys.len(), "Cleared all vote markers");
                Ok(())
            }
        }
    }

    /// The pairing shown last, in display order.
    pub async fn last_active_pairing(&self) -> AppResult<Option<(i32, i32)>> {
        let Some(raw) = self.store.get(LAST_ACTIVE_KEY).await? else {
            return Ok(None);
        };
        let pairing = decode_pairing(&raw);
        if pairing.is_none() {
            warn!(value = %raw, "Ignoring malformed last active pairing");
        }
        Ok(pairing)
    }

    /// Persist the pairing being shown.
    pub async fn set_last_active_pairing(&self, id_a: i32, id_b: i32) -> AppResult<()> {
        self.store
            .set(LAST_ACTIVE_KEY, encode_pairing(id_a, id_b))
            .await
    }

    /// Forget the last active pairing.
    pub async fn clear_last_active_pairing(&self) -> AppResult<()> {
        self.store.remove(LAST_ACTIVE_KEY).await
    }
}

/// Markers are stored relative to the ascending order of the pair.
/// The mapping is its own inverse.
fn relative_side(side: Side, id_a: i32, id_b: i32) -> Side {
    if canonical_pair(id_a, id_b) == (id_a, id_b) {
        side
    } else {
        side.opposite()
    }
}

#[async_trait]
impl VoteBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn get_record(&self, id_a: i32, id_b: i32) -> AppResult<VoteRecord> {
        let _guard = self.write_lock.lock().await;
        self.load_or_create(id_a, id_b).await
    }

    async fn increment_vote(&self, side: Side, id_a: i32, id_b: i32) -> AppResult<VoteRecord> {
        let guard = self.write_lock.lock().await;
        let mut record = self.load_or_create(id_a, id_b).await?;
        let stored = record.stored_side(side, id_a, id_b);
        record.record_vote(stored);
        self.save(&record).await?;
        drop(guard);

        debug!(
            battle_id = ?record.id,
            side = side.as_str(),
            a_votes = record.entity_a_votes,
            b_votes = record.entity_b_votes,
            "Recorded local vote"
        );
        Ok(record)
    }

    async fn start_new_battle(
        &self,
        contender_a: &Contender,
        contender_b: &Contender,
        policy: StartPolicy,
    ) -> AppResult<VoteRecord> {
        let guard = self.write_lock.lock().await;
        let record = match self.load(contender_a.id, contender_b.id).await? {
            Some(mut existing) => {
                existing.rename(contender_a.id, &contender_a.name);
                existing.rename(contender_b.id, &contender_b.name);
                if policy == StartPolicy::ResetExisting {
                    existing.reset();
                }
                existing
            }
            None => VoteRecord::new(
                Some(self.ids.next_local_id()),
                contender_a.id,
                contender_a.name.clone(),
                contender_b.id,
                contender_b.name.clone(),
            ),
        };
        self.save(&record).await?;
        drop(guard);

        info!(
            battle_id = ?record.id,
            a = %contender_a.name,
            b = %contender_b.name,
            "Started local battle"
        );
        Ok(record)
    }

    async fn reset_votes(&self, id_a: i32, id_b: i32) -> AppResult<VoteRecord> {
        let guard = self.write_lock.lock().await;
        let mut record = self.load_or_create(id_a, id_b).await?;
        record.reset();
        self.save(&record).await?;
        drop(guard);
        self.clear_user_vote(Some((id_a, id_b))).await?;

        info!(battle_id = ?record.id, id_a, id_b, "Reset local votes");
        Ok(record)
    }

    async fn subscribe(&self, battle_id: Option<i64>) -> AppResult<VoteSubscription> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let task = spawn_forwarder(self.store.watch(), tx, move |event: StorageEvent| {
            if !event.key.starts_with(VOTES_PREFIX) {
                return None;
            }
            let record: VoteRecord = serde_json::from_str(event.new_value.as_deref()?).ok()?;
            match battle_id {
                Some(id) if record.id != Some(id) => None,
                _ => Some(record),
            }
        });

        debug!(?battle_id, "Subscribed to local vote changes");
        Ok(VoteSubscription::new(rx, vec![task]))
    }
}
