//! Remote vote backend over the shared `battle_votes` table.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{DatabaseConnection, Set};
use tracing::{info, warn};
use votebattle_common::{AppError, AppResult, RemoteConfig};
use votebattle_db::entities::battle_vote;
use votebattle_db::repositories::{BattleVoteRepository, VoteColumn};

use super::backend::{BackendKind, StartPolicy, VoteBackend};
use super::contender_lookup::Contender;
use super::subscription::VoteSubscription;
use super::vote_feed::{ChangeKind, RedisVoteFeed, VoteChange, VoteFeed};
use super::vote_record::{Side, VoteRecord};

/// Vote backend over the remote table and its change feed.
#[derive(Clone)]
pub struct RemoteBackend {
    repo: BattleVoteRepository,
    feed: Arc<dyn VoteFeed>,
}

impl RemoteBackend {
    /// Create a backend from an open connection and a feed.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>, feed: Arc<dyn VoteFeed>) -> Self {
        Self {
            repo: BattleVoteRepository::new(db),
            feed,
        }
    }

    /// Open the database pool and the Redis feed described by `config`.
    pub async fn connect(config: &RemoteConfig) -> AppResult<Self> {
        if !config.is_configured() {
            return Err(AppError::RemoteUnavailable(
                "remote configuration is missing or invalid".to_string(),
            ));
        }

        let db = votebattle_db::init(config).await?;
        if config.run_migrations {
            votebattle_db::migrate(&db).await?;
        }

        let redis_url = config
            .redis_url
            .as_deref()
            .ok_or_else(|| AppError::RemoteUnavailable("redis URL is not set".to_string()))?;
        let feed = RedisVoteFeed::connect(redis_url, &config.channel_prefix).await?;

        info!("Remote vote backend connected");
        Ok(Self::new(Arc::new(db), Arc::new(feed)))
    }

    async fn notify(&self, kind: ChangeKind, record: &VoteRecord) {
        // The write already happened; a lost notification only delays listeners.
        if let Err(e) = self.feed.publish(&VoteChange::new(kind, record.clone())).await {
            warn!(error = %e, battle_id = ?record.id, "Failed to publish vote change");
        }
    }

    async fn insert(
        &self,
        id_a: i32,
        name_a: &str,
        id_b: i32,
        name_b: &str,
    ) -> AppResult<VoteRecord> {
        let now = Utc::now().fixed_offset();
        let model = battle_vote::ActiveModel {
            entity_a_id: Set(id_a),
            entity_a_name: Set(name_a.to_string()),
            entity_a_votes: Set(0),
            entity_b_id: Set(id_b),
            entity_b_name: Set(name_b.to_string()),
            entity_b_votes: Set(0),
            started_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let record = VoteRecord::from(self.repo.create(model).await?);
        info!(battle_id = ?record.id, id_a, id_b, "Created remote vote record");
        self.notify(ChangeKind::Insert, &record).await;
        Ok(record)
    }

    async fn find_or_create(&self, id_a: i32, id_b: i32) -> AppResult<VoteRecord> {
        match self.repo.find_by_pair(id_a, id_b).await? {
            Some(model) => Ok(model.into()),
            None => {
                self.insert(
                    id_a,
                    &VoteRecord::placeholder_name(id_a),
                    id_b,
                    &VoteRecord::placeholder_name(id_b),
                )
                .await
            }
        }
    }

    /// Delete every row for the pairing except the oldest.
    ///
    /// Concurrent first visits can each insert a row before seeing the
    /// other's. Returns the number of rows removed.
    pub async fn collapse_duplicates(&self, id_a: i32, id_b: i32) -> AppResult<u64> {
        let rows = self.repo.find_all_by_pair(id_a, id_b).await?;
        let Some((kept, extra)) = rows.split_first() else {
            return Ok(0);
        };
        if extra.is_empty() {
            return Ok(0);
        }

        let ids = extra.iter().map(|row| row.id).collect();
        let removed = self.repo.delete_by_ids(ids).await?;
        for row in extra {
            self.notify(ChangeKind::Delete, &VoteRecord::from(row.clone()))
                .await;
        }

        info!(kept = kept.id, removed, id_a, id_b, "Collapsed duplicate vote records");
        Ok(removed)
    }
}

fn row_id(record: &VoteRecord) -> AppResult<i64> {
    record
        .id
        .ok_or_else(|| AppError::Internal("remote record without identity".to_string()))
}

#[async_trait]
impl VoteBackend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn get_record(&self, id_a: i32, id_b: i32) -> AppResult<VoteRecord> {
        self.find_or_create(id_a, id_b).await
    }

    async fn increment_vote(&self, side: Side, id_a: i32, id_b: i32) -> AppResult<VoteRecord> {
        let record = self.find_or_create(id_a, id_b).await?;
        let column = match record.stored_side(side, id_a, id_b) {
            Side::A => VoteColumn::EntityA,
            Side::B => VoteColumn::EntityB,
        };

        let updated = VoteRecord::from(self.repo.increment(row_id(&record)?, column).await?);
        self.notify(ChangeKind::Update, &updated).await;
        Ok(updated)
    }

    async fn start_new_battle(
        &self,
        contender_a: &Contender,
        contender_b: &Contender,
        policy: StartPolicy,
    ) -> AppResult<VoteRecord> {
        let Some(model) = self.repo.find_by_pair(contender_a.id, contender_b.id).await? else {
            return self
                .insert(
                    contender_a.id,
                    &contender_a.name,
                    contender_b.id,
                    &contender_b.name,
                )
                .await;
        };

        let mut record = VoteRecord::from(model);
        let id = row_id(&record)?;

        if policy == StartPolicy::ResetExisting {
            record = self.repo.reset(id).await?.into();
            self.notify(ChangeKind::Update, &record).await;
        }

        let mut named = record.clone();
        named.rename(contender_a.id, &contender_a.name);
        named.rename(contender_b.id, &contender_b.name);
        if named.entity_a_name != record.entity_a_name
            || named.entity_b_name != record.entity_b_name
        {
            record = self
                .repo
                .set_names(id, &named.entity_a_name, &named.entity_b_name)
                .await?
                .into();
            self.notify(ChangeKind::Update, &record).await;
        }

        Ok(record)
    }

    async fn reset_votes(&self, id_a: i32, id_b: i32) -> AppResult<VoteRecord> {
        let record = self.find_or_create(id_a, id_b).await?;
        let reset = VoteRecord::from(self.repo.reset(row_id(&record)?).await?);

        info!(battle_id = ?reset.id, id_a, id_b, "Reset remote votes");
        self.notify(ChangeKind::Update, &reset).await;
        Ok(reset)
    }

    async fn subscribe(&self, battle_id: Option<i64>) -> AppResult<VoteSubscription> {
        self.feed.subscribe(battle_id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::vote_feed::InProcessVoteFeed;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn row(id: i64, a: i32, b: i32, a_votes: i32, b_votes: i32) -> battle_vote::Model {
        let now = Utc::now().fixed_offset();
        battle_vote::Model {
            id,
            entity_a_id: a,
            entity_a_name: format!("contender-{a}"),
            entity_a_votes: a_votes,
            entity_b_id: b,
            entity_b_name: format!("contender-{b}"),
            entity_b_votes: b_votes,
            started_at: now,
            updated_at: now,
        }
    }

    fn exec(rows_affected: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected,
        }
    }

    fn backend(db: MockDatabase, feed: &InProcessVoteFeed) -> RemoteBackend {
        RemoteBackend::new(Arc::new(db.into_connection()), Arc::new(feed.clone()))
    }

    #[tokio::test]
    async fn test_get_record_creates_missing_row() {
        let feed = InProcessVoteFeed::new();
        let mut changes = feed.subscribe(None).await.unwrap();
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([
            Vec::<battle_vote::Model>::new(),
            Vec::new(),
            vec![row(1, 1, 25, 0, 0)],
        ]);

        let record = backend(db, &feed).get_record(1, 25).await.unwrap();

        assert_eq!(record.id, Some(1));
        assert_eq!(record.total_votes(), 0);
        assert_eq!(changes.recv().await.unwrap().id, Some(1));
    }

    #[tokio::test]
    async fn test_increment_maps_side_to_stored_column() {
        let feed = InProcessVoteFeed::new();
        // Stored as (25, 1); the caller votes for side A of (1, 25).
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[row(3, 25, 1, 0, 0)]])
            .append_exec_results([exec(1)])
            .append_query_results([[row(3, 25, 1, 0, 1)]]);
        let remote = backend(db, &feed);

        let record = remote.increment_vote(Side::A, 1, 25).await.unwrap();

        assert_eq!(record.votes_for_entity(1), 1);
        assert_eq!(record.votes_for_entity(25), 0);
    }

    #[tokio::test]
    async fn test_increment_publishes_update() {
        let feed = InProcessVoteFeed::new();
        let mut changes = feed.subscribe(Some(3)).await.unwrap();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[row(3, 1, 25, 0, 0)]])
            .append_exec_results([exec(1)])
            .append_query_results([[row(3, 1, 25, 1, 0)]]);

        backend(db, &feed)
            .increment_vote(Side::A, 1, 25)
            .await
            .unwrap();

        assert_eq!(changes.recv().await.unwrap().entity_a_votes, 1);
    }

    #[tokio::test]
    async fn test_database_error_is_surfaced() {
        let feed = InProcessVoteFeed::new();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_errors([sea_orm::DbErr::Custom("connection refused".to_string())]);

        let result = backend(db, &feed).get_record(1, 25).await;

        assert!(matches!(result, Err(AppError::Database(_))));
    }

    #[tokio::test]
    async fn test_start_new_battle_inserts_with_names() {
        let feed = InProcessVoteFeed::new();
        let mut created = row(8, 4, 7, 0, 0);
        created.entity_a_name = "charmander".to_string();
        created.entity_b_name = "squirtle".to_string();
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([
            Vec::<battle_vote::Model>::new(),
            Vec::new(),
            vec![created],
        ]);

        let record = backend(db, &feed)
            .start_new_battle(
                &Contender::named(4, "charmander"),
                &Contender::named(7, "squirtle"),
                StartPolicy::KeepExisting,
            )
            .await
            .unwrap();

        assert_eq!(record.entity_a_name, "charmander");
        assert_eq!(record.entity_b_name, "squirtle");
    }

    #[tokio::test]
    async fn test_start_new_battle_keeps_existing_counts() {
        let feed = InProcessVoteFeed::new();
        let mut existing = row(8, 4, 7, 3, 2);
        existing.entity_a_name = "charmander".to_string();
        existing.entity_b_name = "squirtle".to_string();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[existing]]);

        let record = backend(db, &feed)
            .start_new_battle(
                &Contender::named(4, "charmander"),
                &Contender::named(7, "squirtle"),
                StartPolicy::KeepExisting,
            )
            .await
            .unwrap();

        assert_eq!(record.id, Some(8));
        assert_eq!(record.total_votes(), 5);
    }

    #[tokio::test]
    async fn test_start_new_battle_reset_policy() {
        let feed = InProcessVoteFeed::new();
        let mut existing = row(8, 4, 7, 3, 2);
        existing.entity_a_name = "charmander".to_string();
        existing.entity_b_name = "squirtle".to_string();
        let mut zeroed = existing.clone();
        zeroed.entity_a_votes = 0;
        zeroed.entity_b_votes = 0;
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[existing]])
            .append_exec_results([exec(1)])
            .append_query_results([[zeroed]]);

        let record = backend(db, &feed)
            .start_new_battle(
                &Contender::named(4, "charmander"),
                &Contender::named(7, "squirtle"),
                StartPolicy::ResetExisting,
            )
            .await
            .unwrap();

        assert_eq!(record.total_votes(), 0);
    }

    #[tokio::test]
    async fn test_reset_votes() {
        let feed = InProcessVoteFeed::new();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[row(2, 1, 25, 4, 4)]])
            .append_exec_results([exec(1)])
            .append_query_results([[row(2, 1, 25, 0, 0)]]);

        let record = backend(db, &feed).reset_votes(1, 25).await.unwrap();

        assert_eq!(record.total_votes(), 0);
    }

    #[tokio::test]
    async fn test_collapse_duplicates_keeps_oldest() {
        let feed = InProcessVoteFeed::new();
        let mut deletions = feed.subscribe(None).await.unwrap();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[row(3, 1, 25, 5, 5), row(9, 25, 1, 1, 0), row(11, 1, 25, 0, 0)]])
            .append_exec_results([exec(2)]);

        let removed = backend(db, &feed).collapse_duplicates(1, 25).await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(deletions.recv().await.unwrap().id, Some(9));
        assert_eq!(deletions.recv().await.unwrap().id, Some(11));
    }

    #[tokio::test]
    async fn test_collapse_single_row_is_noop() {
        let feed = InProcessVoteFeed::new();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[row(3, 1, 25, 5, 5)]]);

        let removed = backend(db, &feed).collapse_duplicates(1, 25).await.unwrap();

        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn test_connect_rejects_placeholder_config() {
        let config = RemoteConfig {
            database_url: Some(votebattle_common::config::PLACEHOLDER_DATABASE_URL.to_string()),
            redis_url: Some("redis://localhost".to_string()),
            ..Default::default()
        };

        let result = RemoteBackend::connect(&config).await;

        assert!(matches!(result, Err(AppError::RemoteUnavailable(_))));
    }
}
