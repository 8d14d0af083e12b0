//! Core vote synchronization for votebattle.

pub mod services;

pub use services::*;

use std::sync::Arc;

use votebattle_common::{AppResult, Config};

/// Wire a controller from configuration: file-backed local storage, the
/// remote backend when configured, and the HTTP contender catalogue.
pub async fn build_controller(config: &Config) -> AppResult<BattleController> {
    let local = LocalBackend::open(&config.local).await?;
    let arbitrator = VoteArbitrator::new(local, config.remote.clone());
    let lookup = HttpContenderLookup::new(config.lookup.clone())?;
    Ok(BattleController::new(
        Arc::new(arbitrator),
        Arc::new(lookup),
        config.battle.clone(),
    ))
}
