//! Create `battle_votes` table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BattleVotes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BattleVotes::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BattleVotes::EntityAId).integer().not_null())
                    .col(
                        ColumnDef::new(BattleVotes::EntityAName)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BattleVotes::EntityAVotes)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(BattleVotes::EntityBId).integer().not_null())
                    .col(
                        ColumnDef::new(BattleVotes::EntityBName)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BattleVotes::EntityBVotes)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BattleVotes::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(BattleVotes::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .check(Expr::col(BattleVotes::EntityAVotes).gte(0))
                    .check(Expr::col(BattleVotes::EntityBVotes).gte(0))
                    .to_owned(),
            )
            .await?;

        // Pair lookup (queried in both orders)
        manager
            .create_index(
                Index::create()
                    .name("idx_battle_votes_pair")
                    .table(BattleVotes::Table)
                    .col(BattleVotes::EntityAId)
                    .col(BattleVotes::EntityBId)
                    .to_owned(),
            )
            .await?;

        // Most recent battle
        manager
            .create_index(
                Index::create()
                    .name("idx_battle_votes_started_at")
                    .table(BattleVotes::Table)
                    .col(BattleVotes::StartedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BattleVotes::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum BattleVotes {
    Table,
    Id,
    EntityAId,
    EntityAName,
    EntityAVotes,
    EntityBId,
    EntityBName,
    EntityBVotes,
    StartedAt,
    UpdatedAt,
}
