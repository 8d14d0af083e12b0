//! Battle vote repository.

use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, sea_query::Expr,
};
use votebattle_common::{AppError, AppResult};

use crate::entities::{BattleVote, battle_vote};

/// Which vote counter column to touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteColumn {
    /// `entity_a_votes`
    EntityA,
    /// `entity_b_votes`
    EntityB,
}

impl VoteColumn {
    const fn column(self) -> battle_vote::Column {
        match self {
            Self::EntityA => battle_vote::Column::EntityAVotes,
            Self::EntityB => battle_vote::Column::EntityBVotes,
        }
    }
}

/// Repository for the shared vote table.
#[derive(Clone)]
pub struct BattleVoteRepository {
    db: Arc<DatabaseConnection>,
}

impl BattleVoteRepository {
    /// Create a new battle vote repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a battle by ID.
    pub async fn find_by_id(&self, id: i64) -> AppResult<Option<battle_vote::Model>> {
        BattleVote::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a battle by ID, returning error if not found.
    pub async fn get_by_id(&self, id: i64) -> AppResult<battle_vote::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Battle not found: {id}")))
    }

    /// Find the battle stored exactly as `(entity_a_id, entity_b_id)`.
    ///
    /// If duplicates exist the oldest row wins.
    pub async fn find_by_ordered_pair(
        &self,
        entity_a_id: i32,
        entity_b_id: i32,
    ) -> AppResult<Option<battle_vote::Model>> {
        BattleVote::find()
            .filter(battle_vote::Column::EntityAId.eq(entity_a_id))
            .filter(battle_vote::Column::EntityBId.eq(entity_b_id))
            .order_by_asc(battle_vote::Column::Id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find the battle for an unordered pair.
    ///
    /// Looks up the given order first, then the swapped order.
    pub async fn find_by_pair(
        &self,
        first_id: i32,
        second_id: i32,
    ) -> AppResult<Option<battle_vote::Model>> {
        if let Some(found) = self.find_by_ordered_pair(first_id, second_id).await? {
            return Ok(Some(found));
        }
        if first_id == second_id {
            return Ok(None);
        }
        self.find_by_ordered_pair(second_id, first_id).await
    }

    /// Find every row stored for an unordered pair, oldest first.
    pub async fn find_all_by_pair(
        &self,
        first_id: i32,
        second_id: i32,
    ) -> AppResult<Vec<battle_vote::Model>> {
        BattleVote::find()
            .filter(
                Condition::any()
                    .add(
                        Condition::all()
                            .add(battle_vote::Column::EntityAId.eq(first_id))
                            .add(battle_vote::Column::EntityBId.eq(second_id)),
                    )
                    .add(
                        Condition::all()
                            .add(battle_vote::Column::EntityAId.eq(second_id))
                            .add(battle_vote::Column::EntityBId.eq(first_id)),
                    ),
            )
            .order_by_asc(battle_vote::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a new battle.
    pub async fn create(&self, model: battle_vote::ActiveModel) -> AppResult<battle_vote::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Add one vote to a counter and return the updated row.
    ///
    /// The increment is a single `SET col = col + 1` statement keyed by the
    /// row identity, so concurrent voters never overwrite each other.
    pub async fn increment(&self, id: i64, column: VoteColumn) -> AppResult<battle_vote::Model> {
        let col = column.column();
        let result = BattleVote::update_many()
            .col_expr(col, Expr::col(col).add(1))
            .col_expr(battle_vote::Column::UpdatedAt, Expr::current_timestamp().into())
            .filter(battle_vote::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!("Battle not found: {id}")));
        }

        self.get_by_id(id).await
    }

    /// Zero both counters and restart the battle clock.
    pub async fn reset(&self, id: i64) -> AppResult<battle_vote::Model> {
        let result = BattleVote::update_many()
            .col_expr(battle_vote::Column::EntityAVotes, Expr::value(0))
            .col_expr(battle_vote::Column::EntityBVotes, Expr::value(0))
            .col_expr(battle_vote::Column::StartedAt, Expr::current_timestamp().into())
            .col_expr(battle_vote::Column::UpdatedAt, Expr::current_timestamp().into())
            .filter(battle_vote::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!("Battle not found: {id}")));
        }

        self.get_by_id(id).await
    }

    /// Replace both contender names.
    pub async fn set_names(
        &self,
        id: i64,
        entity_a_name: &str,
        entity_b_name: &str,
    ) -> AppResult<battle_vote::Model> {
        let result = BattleVote::update_many()
            .col_expr(battle_vote::Column::EntityAName, Expr::value(entity_a_name))
            .col_expr(battle_vote::Column::EntityBName, Expr::value(entity_b_name))
            .col_expr(battle_vote::Column::UpdatedAt, Expr::current_timestamp().into())
            .filter(battle_vote::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!("Battle not found: {id}")));
        }

        self.get_by_id(id).await
    }

    /// Delete the given rows. Returns the number of rows removed.
    pub async fn delete_by_ids(&self, ids: Vec<i64>) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = BattleVote::delete_many()
            .filter(battle_vote::Column::Id.is_in(ids))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }
}
