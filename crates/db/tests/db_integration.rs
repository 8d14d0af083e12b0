//! Database integration tests.
//!
//! These tests require a running `PostgreSQL` instance.
//! Run with: `cargo test --test db_integration -- --ignored`
//!
//! Environment variables:
//!   `TEST_DB_HOST` (default: localhost)
//!   `TEST_DB_PORT` (default: 5433)
//!   `TEST_DB_USER` (default: `votebattle_test`)
//!   `TEST_DB_PASSWORD` (default: `votebattle_test`)
//!   `TEST_DB_NAME` (default: `votebattle_test`)

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use chrono::Utc;
use sea_orm::Set;
use votebattle_db::entities::battle_vote;
use votebattle_db::repositories::{BattleVoteRepository, VoteColumn};
use votebattle_db::test_utils::{TestDatabase, TestDbConfig};

fn new_battle(a: i32, b: i32) -> battle_vote::ActiveModel {
    let now = Utc::now().fixed_offset();
    battle_vote::ActiveModel {
        entity_a_id: Set(a),
        entity_a_name: Set(format!("contender-{a}")),
        entity_a_votes: Set(0),
        entity_b_id: Set(b),
        entity_b_name: Set(format!("contender-{b}")),
        entity_b_votes: Set(0),
        started_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_create_and_find_in_both_orders() {
    let db = TestDatabase::new().await.expect("Failed to connect");
    db.cleanup().await.unwrap();
    let repo = BattleVoteRepository::new(Arc::new(db.conn));

    let created = repo.create(new_battle(1, 25)).await.unwrap();

    let direct = repo.find_by_pair(1, 25).await.unwrap().unwrap();
    let swapped = repo.find_by_pair(25, 1).await.unwrap().unwrap();
    assert_eq!(direct.id, created.id);
    assert_eq!(swapped.id, created.id);
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_increment_and_reset() {
    let db = TestDatabase::new().await.expect("Failed to connect");
    db.cleanup().await.unwrap();
    let repo = BattleVoteRepository::new(Arc::new(db.conn));

    let created = repo.create(new_battle(4, 7)).await.unwrap();
    repo.increment(created.id, VoteColumn::EntityA).await.unwrap();
    let after = repo.increment(created.id, VoteColumn::EntityB).await.unwrap();

    assert_eq!((after.entity_a_votes, after.entity_b_votes), (1, 1));
    assert!(after.updated_at >= after.started_at);

    let reset = repo.reset(created.id).await.unwrap();
    assert_eq!((reset.entity_a_votes, reset.entity_b_votes), (0, 0));
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_concurrent_increments_are_not_lost() {
    let db = TestDatabase::new().await.expect("Failed to connect");
    db.cleanup().await.unwrap();
    let repo = BattleVoteRepository::new(Arc::new(db.conn));

    let created = repo.create(new_battle(10, 20)).await.unwrap();

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let repo = repo.clone();
            tokio::spawn(async move { repo.increment(created.id, VoteColumn::EntityA).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let row = repo.get_by_id(created.id).await.unwrap();
    assert_eq!(row.entity_a_votes, 20);
}

#[test]
fn test_config_from_env() {
    let config = TestDbConfig::default();
    assert!(!config.host.is_empty());
    assert!(config.port > 0);
    assert!(!config.database.is_empty());
}
