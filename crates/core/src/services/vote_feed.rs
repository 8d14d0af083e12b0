//! Change feed for the remote vote table.
//!
//! Every write the remote backend performs is published as a [`VoteChange`].
//! With Redis configured, changes travel over pub/sub so every process
//! sharing the table sees them; otherwise an in-process broadcast is used.

use async_trait::async_trait;
use fred::clients::{Client, SubscriberClient};
use fred::interfaces::{ClientLike, EventInterface, PubsubInterface};
use fred::types::config::Config as RedisConfig;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use votebattle_common::{AppError, AppResult};

use super::subscription::{SUBSCRIPTION_BUFFER, VoteSubscription, spawn_forwarder};
use super::vote_record::VoteRecord;

/// Capacity of the local fan-out channel.
const FEED_CAPACITY: usize = 1000;

/// Kind of row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row change with the row's state after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteChange {
    pub kind: ChangeKind,
    pub record: VoteRecord,
}

impl VoteChange {
    #[must_use]
    pub const fn new(kind: ChangeKind, record: VoteRecord) -> Self {
        Self { kind, record }
    }
}

/// Publishes and delivers vote changes.
#[async_trait]
pub trait VoteFeed: Send + Sync {
    /// Announce a change.
    async fn publish(&self, change: &VoteChange) -> AppResult<()>;

    /// Listen for changes to one record, or to all records when `None`.
    async fn subscribe(&self, battle_id: Option<i64>) -> AppResult<VoteSubscription>;
}

fn subscribe_to(
    source: &broadcast::Sender<VoteChange>,
    battle_id: Option<i64>,
) -> VoteSubscription {
    let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
    let task = spawn_forwarder(source.subscribe(), tx, move |change: VoteChange| {
        match battle_id {
            Some(id) if change.record.id != Some(id) => None,
            _ => Some(change.record),
        }
    });
    VoteSubscription::new(rx, vec![task])
}

/// Feed confined to this process.
#[derive(Clone)]
pub struct InProcessVoteFeed {
    tx: broadcast::Sender<VoteChange>,
}

impl InProcessVoteFeed {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }
}

impl Default for InProcessVoteFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VoteFeed for InProcessVoteFeed {
    async fn publish(&self, change: &VoteChange) -> AppResult<()> {
        if self.tx.send(change.clone()).is_err() {
            debug!(battle_id = ?change.record.id, "No listeners for vote change");
        }
        Ok(())
    }

    async fn subscribe(&self, battle_id: Option<i64>) -> AppResult<VoteSubscription> {
        Ok(subscribe_to(&self.tx, battle_id))
    }
}

/// Pub/sub channel for one battle.
#[must_use]
pub fn battle_channel(prefix: &str, battle_id: i64) -> String {
    format!("{prefix}:battle_votes:{battle_id}")
}

/// Pattern matching every battle channel under `prefix`.
#[must_use]
pub fn battle_channel_pattern(prefix: &str) -> String {
    format!("{prefix}:battle_votes:*")
}

fn redis_error(e: fred::error::Error) -> AppError {
    AppError::Redis(e.to_string())
}

/// Feed over Redis pub/sub.
///
/// One pattern subscription receives every battle channel; messages are
/// fanned out locally and filtered per subscription.
#[derive(Clone)]
pub struct RedisVoteFeed {
    publisher: Client,
    subscriber: SubscriberClient,
    prefix: String,
    local_tx: broadcast::Sender<VoteChange>,
}

impl RedisVoteFeed {
    /// Connect both clients and start receiving.
    pub async fn connect(redis_url: &str, prefix: &str) -> AppResult<Self> {
        let config = RedisConfig::from_url(redis_url).map_err(redis_error)?;

        let publisher = Client::new(config.clone(), None, None, None);
        publisher.init().await.map_err(redis_error)?;

        let subscriber = SubscriberClient::new(config, None, None, None);
        subscriber.init().await.map_err(redis_error)?;

        let (local_tx, _) = broadcast::channel(FEED_CAPACITY);
        let feed = Self {
            publisher,
            subscriber,
            prefix: prefix.to_string(),
            local_tx,
        };
        feed.start().await?;

        info!(prefix, "Redis vote feed initialized");
        Ok(feed)
    }

    async fn start(&self) -> AppResult<()> {
        self.subscriber
            .psubscribe(battle_channel_pattern(&self.prefix))
            .await
            .map_err(redis_error)?;

        let local_tx = self.local_tx.clone();
        let mut messages = self.subscriber.message_rx();

        tokio::spawn(async move {
            while let Ok(message) = messages.recv().await {
                let Some(payload) = message.value.as_string() else {
                    continue;
                };
                match serde_json::from_str::<VoteChange>(&payload) {
                    Ok(change) => {
                        debug!(battle_id = ?change.record.id, kind = ?change.kind, "Received vote change");
                        let _ = local_tx.send(change);
                    }
                    Err(e) => {
                        warn!("Failed to parse vote change: {}", e);
                    }
                }
            }
            info!("Vote feed message stream ended");
        });

        Ok(())
    }

    /// Disconnect both clients.
    pub async fn quit(&self) -> AppResult<()> {
        self.subscriber.quit().await.map_err(redis_error)?;
        self.publisher.quit().await.map_err(redis_error)
    }
}

#[async_trait]
impl VoteFeed for RedisVoteFeed {
    async fn publish(&self, change: &VoteChange) -> AppResult<()> {
        let Some(battle_id) = change.record.id else {
            return Err(AppError::Internal(
                "cannot publish a change for an unsaved record".to_string(),
            ));
        };
        let channel = battle_channel(&self.prefix, battle_id);
        let payload = serde_json::to_string(change)?;

        let _: () = self
            .publisher
            .publish(channel.as_str(), payload)
            .await
            .map_err(redis_error)?;
        debug!(channel = %channel, kind = ?change.kind, "Published vote change");
        Ok(())
    }

    async fn subscribe(&self, battle_id: Option<i64>) -> AppResult<VoteSubscription> {
        Ok(subscribe_to(&self.local_tx, battle_id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn change(kind: ChangeKind, id: i64, a_votes: u32) -> VoteChange {
        let mut record = VoteRecord::new(Some(id), 1, "bulbasaur", 25, "pikachu");
        record.entity_a_votes = a_votes;
        VoteChange::new(kind, record)
    }

    #[test]
    fn test_channel_names() {
        assert_eq!(battle_channel("votebattle", 42), "votebattle:battle_votes:42");
        assert_eq!(battle_channel_pattern("vb"), "vb:battle_votes:*");
    }

    #[test]
    fn test_change_wire_format() {
        let json = serde_json::to_value(change(ChangeKind::Update, 3, 2)).unwrap();
        assert_eq!(json["kind"], "update");
        assert_eq!(json["record"]["id"], 3);
        assert_eq!(json["record"]["entity_a_votes"], 2);
    }

    #[tokio::test]
    async fn test_in_process_feed_filters_by_battle() {
        let feed = InProcessVoteFeed::new();
        let mut scoped = feed.subscribe(Some(2)).await.unwrap();
        let mut all = feed.subscribe(None).await.unwrap();

        feed.publish(&change(ChangeKind::Update, 1, 5)).await.unwrap();
        feed.publish(&change(ChangeKind::Update, 2, 7)).await.unwrap();

        assert_eq!(scoped.recv().await.unwrap().entity_a_votes, 7);
        assert_eq!(all.recv().await.unwrap().id, Some(1));
        assert_eq!(all.recv().await.unwrap().id, Some(2));
    }

    #[tokio::test]
    async fn test_publish_without_listeners_is_ok() {
        let feed = InProcessVoteFeed::new();
        feed.publish(&change(ChangeKind::Insert, 1, 0)).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires running Redis instance"]
    async fn test_redis_feed_roundtrip() {
        let url = votebattle_db::test_utils::TestRedisConfig::default().redis_url();
        let feed = RedisVoteFeed::connect(&url, "votebattle-test").await.unwrap();
        let mut sub = feed.subscribe(Some(9)).await.unwrap();

        feed.publish(&change(ChangeKind::Update, 9, 4)).await.unwrap();

        let got = tokio::time::timeout(std::time::Duration::from_secs(5), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.entity_a_votes, 4);
        feed.quit().await.unwrap();
    }
}
