//! Battle vote entity: the shared tally for one pairing.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "battle_votes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub entity_a_id: i32,

    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub entity_a_name: String,

    pub entity_a_votes: i32,

    pub entity_b_id: i32,

    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub entity_b_name: String,

    pub entity_b_votes: i32,

    /// When the battle was started or last reset
    pub started_at: DateTimeWithTimeZone,

    /// Last mutation (vote or reset)
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
