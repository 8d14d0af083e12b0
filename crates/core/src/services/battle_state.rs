//! Battle state controller.
//!
//! Holds the pairing being shown, its counts and this profile's vote. Every
//! count shown comes from a backend response or a change notification;
//! nothing is updated optimistically.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use votebattle_common::{AppResult, BattleConfig};

use super::arbitrator::VoteArbitrator;
use super::backend::StartPolicy;
use super::contender_lookup::{Contender, ContenderLookup};
use super::vote_record::{Side, VoteRecord};

/// Shown when the initial load (or a retry) fails.
pub const LOAD_ERROR: &str = "failed to load data, retry";
/// Shown when a vote cannot be recorded.
pub const VOTE_ERROR: &str = "failed to submit vote, retry";
/// Shown when a new pairing cannot be started.
pub const NEW_BATTLE_ERROR: &str = "failed to start new battle, retry";
/// Shown when the default pairing cannot be restored.
pub const RESET_ERROR: &str = "failed to reset to default battle, retry";

/// Lifecycle of the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BattleStatus {
    #[default]
    Loading,
    Ready,
    Error(String),
}

/// Snapshot of what is being shown.
#[derive(Debug, Clone, Default)]
pub struct BattleState {
    pub status: BattleStatus,
    pub contender_a: Option<Contender>,
    pub contender_b: Option<Contender>,
    /// Last record received for the pairing.
    pub record: Option<VoteRecord>,
    /// Votes for `contender_a`.
    pub votes_a: u32,
    /// Votes for `contender_b`.
    pub votes_b: u32,
    /// This profile's vote, relative to the displayed order.
    pub user_vote: Option<Side>,
    /// A new pairing is being fetched.
    pub new_battle_loading: bool,
    /// The duplicate-vote warning is shown until this instant.
    pub duplicate_warning_until: Option<Instant>,
}

impl BattleState {
    /// Ids of the displayed pairing, in display order.
    #[must_use]
    pub fn pairing(&self) -> Option<(i32, i32)> {
        Some((self.contender_a.as_ref()?.id, self.contender_b.as_ref()?.id))
    }

    /// Identity of the record being shown.
    #[must_use]
    pub fn battle_id(&self) -> Option<i64> {
        self.record.as_ref().and_then(|r| r.id)
    }

    #[must_use]
    pub const fn total_votes(&self) -> u32 {
        self.votes_a.saturating_add(self.votes_b)
    }

    #[must_use]
    pub const fn has_voted(&self) -> bool {
        self.user_vote.is_some()
    }

    /// The leading side, once this profile has voted and at least one vote
    /// exists. A tie has no winner.
    #[must_use]
    pub fn winner(&self) -> Option<Side> {
        if !self.has_voted() || self.total_votes() == 0 {
            return None;
        }
        match self.votes_a.cmp(&self.votes_b) {
            std::cmp::Ordering::Greater => Some(Side::A),
            std::cmp::Ordering::Less => Some(Side::B),
            std::cmp::Ordering::Equal => None,
        }
    }

    #[must_use]
    pub fn duplicate_warning_active(&self, now: Instant) -> bool {
        self.duplicate_warning_until.is_some_and(|until| now < until)
    }

    /// Whether a change notification belongs to the shown record.
    ///
    /// Timestamps come from whichever client wrote the change, so they are
    /// not compared.
    fn accepts(&self, record: &VoteRecord) -> bool {
        self.record
            .as_ref()
            .is_some_and(|current| current.id == record.id)
    }

    fn apply_record(&mut self, record: VoteRecord) {
        self.votes_a = self
            .contender_a
            .as_ref()
            .map_or(record.entity_a_votes, |c| record.votes_for_entity(c.id));
        self.votes_b = self
            .contender_b
            .as_ref()
            .map_or(record.entity_b_votes, |c| record.votes_for_entity(c.id));
        self.record = Some(record);
    }
}

/// Result of a vote attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// The vote was stored; the record as the backend returned it.
    Recorded(VoteRecord),
    /// This profile already voted on the pairing. Nothing was written.
    AlreadyVoted,
    /// No pairing is loaded yet.
    NoActiveBattle,
}

/// Drives one battle view.
pub struct BattleController {
    arbitrator: Arc<VoteArbitrator>,
    lookup: Arc<dyn ContenderLookup>,
    config: BattleConfig,
    state: Arc<RwLock<BattleState>>,
    state_tx: Arc<watch::Sender<BattleState>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    op_lock: Mutex<()>,
}

impl BattleController {
    /// Create a controller in the `Loading` state. Call [`Self::load`] to mount.
    #[must_use]
    pub fn new(
        arbitrator: Arc<VoteArbitrator>,
        lookup: Arc<dyn ContenderLookup>,
        config: BattleConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(BattleState::default());
        Self {
            arbitrator,
            lookup,
            config,
            state: Arc::new(RwLock::new(BattleState::default())),
            state_tx: Arc::new(state_tx),
            listener: Mutex::new(None),
            op_lock: Mutex::new(()),
        }
    }

    /// Current snapshot.
    pub async fn state(&self) -> BattleState {
        self.state.read().await.clone()
    }

    /// Receive a snapshot after every change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<BattleState> {
        self.state_tx.subscribe()
    }

    pub async fn total_votes(&self) -> u32 {
        self.state.read().await.total_votes()
    }

    pub async fn winner(&self) -> Option<Side> {
        self.state.read().await.winner()
    }

    pub async fn has_voted(&self) -> bool {
        self.state.read().await.has_voted()
    }

    pub async fn duplicate_warning_active(&self) -> bool {
        self.state
            .read()
            .await
            .duplicate_warning_active(Instant::now())
    }

    async fn update(&self, change: impl FnOnce(&mut BattleState)) {
        let snapshot = {
            let mut state = self.state.write().await;
            change(&mut state);
            state.clone()
        };
        self.state_tx.send_replace(snapshot);
    }

    async fn fail(&self, message: &str) {
        self.update(|state| state.status = BattleStatus::Error(message.to_string()))
            .await;
    }

    async fn resolve(&self, (id_a, id_b): (i32, i32)) -> AppResult<(Contender, Contender)> {
        futures::future::try_join(self.lookup.get_by_id(id_a), self.lookup.get_by_id(id_b)).await
    }

    /// Mount, or retry after an error.
    ///
    /// Shows the last active pairing if one is stored and can be resolved,
    /// otherwise the default pairing.
    pub async fn load(&self) -> AppResult<()> {
        let _op = self.op_lock.lock().await;
        self.update(|state| state.status = BattleStatus::Loading)
            .await;

        match self.load_pairing().await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(error = %e, "Failed to load battle");
                self.fail(LOAD_ERROR).await;
                Err(e)
            }
        }
    }

    async fn load_pairing(&self) -> AppResult<()> {
        let default = self.config.default_pairing();
        let (contender_a, contender_b) = match self.arbitrator.last_active_pairing().await? {
            Some(pairing) => match self.resolve(pairing).await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(?pairing, error = %e, "Last active pairing unavailable, using default");
                    self.resolve(default).await?
                }
            },
            None => self.resolve(default).await?,
        };

        let record = self
            .arbitrator
            .get_votes(contender_a.id, contender_b.id)
            .await?;
        let returning = self.config.returning_voter_warning_secs;
        self.install(contender_a, contender_b, record, Some(returning))
            .await
    }

    /// Show a pairing with its record and this profile's marker, then bind
    /// live updates to the record.
    async fn install(
        &self,
        contender_a: Contender,
        contender_b: Contender,
        record: VoteRecord,
        returning_warning_secs: Option<u64>,
    ) -> AppResult<()> {
        let user_vote = self
            .arbitrator
            .get_user_vote(contender_a.id, contender_b.id)
            .await?;
        let battle_id = record.id;

        info!(
            battle_id = ?battle_id,
            a = %contender_a.name,
            b = %contender_b.name,
            has_voted = user_vote.is_some(),
            "Showing battle"
        );

        self.update(|state| {
            state.contender_a = Some(contender_a);
            state.contender_b = Some(contender_b);
            state.apply_record(record);
            state.user_vote = user_vote;
            state.duplicate_warning_until = match (user_vote, returning_warning_secs) {
                (Some(_), Some(secs)) => Some(Instant::now() + Duration::from_secs(secs)),
                _ => None,
            };
            state.status = BattleStatus::Ready;
        })
        .await;

        self.rebind(battle_id).await;
        Ok(())
    }

    /// Drop the current listener and listen to `battle_id` instead.
    async fn rebind(&self, battle_id: Option<i64>) {
        let mut listener = self.listener.lock().await;
        if let Some(old) = listener.take() {
            old.abort();
            debug!("Released vote subscription");
        }

        let Some(id) = battle_id else {
            return;
        };

        let mut subscription = match self.arbitrator.subscribe(Some(id)).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(battle_id = id, error = %e, "Live vote updates unavailable");
                return;
            }
        };

        let state = Arc::clone(&self.state);
        let state_tx = Arc::clone(&self.state_tx);
        *listener = Some(tokio::spawn(async move {
            while let Some(record) = subscription.recv().await {
                let snapshot = {
                    let mut state = state.write().await;
                    if !state.accepts(&record) {
                        debug!(battle_id = ?record.id, "Ignoring update for another battle");
                        continue;
                    }
                    state.apply_record(record);
                    state.clone()
                };
                state_tx.send_replace(snapshot);
            }
        }));
        debug!(battle_id = id, "Bound vote subscription");
    }

    /// Vote for `side` of the displayed pairing.
    pub async fn vote(&self, side: Side) -> AppResult<VoteOutcome> {
        let _op = self.op_lock.lock().await;

        let Some((id_a, id_b)) = self.state.read().await.pairing() else {
            return Ok(VoteOutcome::NoActiveBattle);
        };

        match self.submit_vote(side, id_a, id_b).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(error = %e, id_a, id_b, "Failed to submit vote");
                self.fail(VOTE_ERROR).await;
                Err(e)
            }
        }
    }

    async fn submit_vote(&self, side: Side, id_a: i32, id_b: i32) -> AppResult<VoteOutcome> {
        if let Some(existing) = self.arbitrator.get_user_vote(id_a, id_b).await? {
            info!(id_a, id_b, "Rejected duplicate vote");
            let until = Instant::now() + Duration::from_secs(self.config.duplicate_warning_secs);
            self.update(|state| {
                state.user_vote = Some(existing);
                state.duplicate_warning_until = Some(until);
            })
            .await;
            return Ok(VoteOutcome::AlreadyVoted);
        }

        let record = self.arbitrator.increment_vote(side, id_a, id_b).await?;
        self.arbitrator.set_user_vote(side, id_a, id_b).await?;

        let applied = record.clone();
        self.update(|state| {
            if state.pairing() == Some((id_a, id_b)) {
                state.apply_record(applied);
                state.user_vote = Some(side);
                state.status = BattleStatus::Ready;
            }
        })
        .await;

        Ok(VoteOutcome::Recorded(record))
    }

    /// Replace the displayed pairing with a random one.
    pub async fn new_pairing(&self) -> AppResult<()> {
        let _op = self.op_lock.lock().await;
        self.update(|state| state.new_battle_loading = true).await;

        let result = self.start_random_pairing().await;

        self.update(|state| state.new_battle_loading = false).await;
        if let Err(e) = &result {
            error!(error = %e, "Failed to start new battle");
            self.fail(NEW_BATTLE_ERROR).await;
        }
        result
    }

    async fn start_random_pairing(&self) -> AppResult<()> {
        let (contender_a, contender_b) = self.draw_pairing().await?;
        let record = self
            .arbitrator
            .start_new_battle(&contender_a, &contender_b, StartPolicy::KeepExisting)
            .await?;
        self.arbitrator
            .set_last_active_pairing(contender_a.id, contender_b.id)
            .await?;
        self.install(contender_a, contender_b, record, None).await
    }

    /// Two distinct contenders, or the default pairing once every attempt
    /// is used up.
    async fn draw_pairing(&self) -> AppResult<(Contender, Contender)> {
        for attempt in 1..=self.config.max_pairing_attempts {
            match self.lookup.get_random_pair().await {
                Ok((a, b)) if a.id != b.id => return Ok((a, b)),
                Ok((a, _)) => debug!(attempt, id = a.id, "Drew the same contender twice"),
                Err(e) => warn!(attempt, error = %e, "Random pairing lookup failed"),
            }
        }

        warn!(
            attempts = self.config.max_pairing_attempts,
            "No distinct pairing drawn, using default"
        );
        self.resolve(self.config.default_pairing()).await
    }

    /// Forget the last active pairing and show the default one with its
    /// stored counts.
    pub async fn reset_to_default(&self) -> AppResult<()> {
        let _op = self.op_lock.lock().await;

        match self.restore_default().await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(error = %e, "Failed to reset to default battle");
                self.fail(RESET_ERROR).await;
                Err(e)
            }
        }
    }

    async fn restore_default(&self) -> AppResult<()> {
        self.arbitrator.clear_last_active_pairing().await?;
        let (contender_a, contender_b) = self.resolve(self.config.default_pairing()).await?;
        let record = self
            .arbitrator
            .get_votes(contender_a.id, contender_b.id)
            .await?;
        self.install(contender_a, contender_b, record, None).await
    }

    /// Stop listening for updates.
    pub async fn unmount(&self) {
        if let Some(listener) = self.listener.lock().await.take() {
            listener.abort();
            debug!("Released vote subscription");
        }
    }
}

impl Drop for BattleController {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.abort();
        }
    }
}
