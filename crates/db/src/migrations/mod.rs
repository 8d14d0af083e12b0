//! Database migrations.
//!
//! Schema migrations for the shared vote table.

#![allow(missing_docs)]

use sea_orm_migration::prelude::*;

mod m20250101_000001_create_battle_votes_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(
            m20250101_000001_create_battle_votes_table::Migration,
        )]
    }
}
