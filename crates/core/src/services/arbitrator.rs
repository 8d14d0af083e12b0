//! Backend arbitration.
//!
//! The remote backend is chosen once, on first use: if the remote
//! configuration is usable and a connection succeeds it serves every call
//! for the rest of the process, otherwise the local backend does. A remote
//! call that fails is retried against the local backend and the caller
//! never sees the remote error.
//!
//! Vote markers and the last active pairing belong to this profile and are
//! always kept locally.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use votebattle_common::{AppError, AppResult, RemoteConfig};

use super::backend::{BackendKind, StartPolicy, VoteBackend};
use super::contender_lookup::Contender;
use super::local_backend::LocalBackend;
use super::remote_backend::RemoteBackend;
use super::subscription::VoteSubscription;
use super::vote_record::{Side, VoteRecord};

/// Routes vote operations to the remote or local backend.
pub struct VoteArbitrator {
    local: LocalBackend,
    remote_config: Option<RemoteConfig>,
    remote: OnceCell<Option<Arc<dyn VoteBackend>>>,
}

impl VoteArbitrator {
    /// Resolve the remote backend from `config` on first use.
    #[must_use]
    pub fn new(local: LocalBackend, config: RemoteConfig) -> Self {
        Self {
            local,
            remote_config: Some(config),
            remote: OnceCell::new(),
        }
    }

    /// Never use a remote backend.
    #[must_use]
    pub fn local_only(local: LocalBackend) -> Self {
        Self {
            local,
            remote_config: None,
            remote: OnceCell::new_with(Some(None)),
        }
    }

    /// Use `remote` as the remote backend.
    #[must_use]
    pub fn with_remote(local: LocalBackend, remote: Arc<dyn VoteBackend>) -> Self {
        Self {
            local,
            remote_config: None,
            remote: OnceCell::new_with(Some(Some(remote))),
        }
    }

    /// The local backend.
    #[must_use]
    pub const fn local(&self) -> &LocalBackend {
        &self.local
    }

    async fn remote(&self) -> Option<&Arc<dyn VoteBackend>> {
        self.remote
            .get_or_init(|| async {
                let Some(config) = self.remote_config.as_ref() else {
                    return None;
                };
                if !config.is_configured() {
                    info!("Remote vote storage not configured, using local storage");
                    return None;
                }
                match RemoteBackend::connect(config).await {
                    Ok(backend) => {
                        info!("Using remote vote storage");
                        Some(Arc::new(backend) as Arc<dyn VoteBackend>)
                    }
                    Err(e) => {
                        warn!(error = %e, "Remote vote storage unavailable, using local storage");
                        None
                    }
                }
            })
            .await
            .as_ref()
    }

    /// Which backend serves calls. Resolves the choice if needed.
    pub async fn active_backend(&self) -> BackendKind {
        if self.remote().await.is_some() {
            BackendKind::Remote
        } else {
            BackendKind::Local
        }
    }

    /// Fetch (creating if needed) the record for a pairing.
    pub async fn get_votes(&self, id_a: i32, id_b: i32) -> AppResult<VoteRecord> {
        if let Some(remote) = self.remote().await {
            match remote.get_record(id_a, id_b).await {
                Ok(record) => return Ok(record),
                Err(e) => log_fallback("get_votes", &e),
            }
        }
        self.local.get_record(id_a, id_b).await
    }

    /// Add one vote to `side` of `(id_a, id_b)`.
    pub async fn increment_vote(&self, side: Side, id_a: i32, id_b: i32) -> AppResult<VoteRecord> {
        if let Some(remote) = self.remote().await {
            match remote.increment_vote(side, id_a, id_b).await {
                Ok(record) => return Ok(record),
                Err(e) => log_fallback("increment_vote", &e),
            }
        }
        self.local.increment_vote(side, id_a, id_b).await
    }

    /// Make sure a record exists for the pairing.
    pub async fn start_new_battle(
        &self,
        contender_a: &Contender,
        contender_b: &Contender,
        policy: StartPolicy,
    ) -> AppResult<VoteRecord> {
        if let Some(remote) = self.remote().await {
            match remote
                .start_new_battle(contender_a, contender_b, policy)
                .await
            {
                Ok(record) => return Ok(record),
                Err(e) => log_fallback("start_new_battle", &e),
            }
        }
        self.local
            .start_new_battle(contender_a, contender_b, policy)
            .await
    }

    /// Zero a pairing's counts and forget this profile's vote on it.
    pub async fn reset_votes(&self, id_a: i32, id_b: i32) -> AppResult<VoteRecord> {
        if let Some(remote) = self.remote().await {
            match remote.reset_votes(id_a, id_b).await {
                Ok(record) => {
                    self.local.clear_user_vote(Some((id_a, id_b))).await?;
                    return Ok(record);
                }
                Err(e) => log_fallback("reset_votes", &e),
            }
        }
        self.local.reset_votes(id_a, id_b).await
    }

    /// Listen for record changes.
    pub async fn subscribe(&self, battle_id: Option<i64>) -> AppResult<VoteSubscription> {
        if let Some(remote) = self.remote().await {
            match remote.subscribe(battle_id).await {
                Ok(subscription) => {
                    debug!(?battle_id, "Subscribed to remote vote changes");
                    return Ok(subscription);
                }
                Err(e) => log_fallback("subscribe", &e),
            }
        }
        self.local.subscribe(battle_id).await
    }

    /// The side this profile voted for.
    pub async fn get_user_vote(&self, id_a: i32, id_b: i32) -> AppResult<Option<Side>> {
        self.local.get_user_vote(id_a, id_b).await
    }

    /// Remember this profile's vote.
    pub async fn set_user_vote(&self, side: Side, id_a: i32, id_b: i32) -> AppResult<()> {
        self.local.set_user_vote(side, id_a, id_b).await
    }

    /// Forget this profile's vote on one pairing, or on all of them.
    pub async fn clear_user_vote(&self, pair: Option<(i32, i32)>) -> AppResult<()> {
        self.local.clear_user_vote(pair).await
    }

    /// The pairing shown last.
    pub async fn last_active_pairing(&self) -> AppResult<Option<(i32, i32)>> {
        self.local.last_active_pairing().await
    }

    /// Persist the pairing being shown.
    pub async fn set_last_active_pairing(&self, id_a: i32, id_b: i32) -> AppResult<()> {
        self.local.set_last_active_pairing(id_a, id_b).await
    }

    /// Forget the last active pairing.
    pub async fn clear_last_active_pairing(&self) -> AppResult<()> {
        self.local.clear_last_active_pairing().await
    }
}

fn log_fallback(operation: &str, error: &AppError) {
    warn!(
        operation,
        error = %error,
        code = error.error_code(),
        "Remote vote storage failed, falling back to local storage"
    );
}
