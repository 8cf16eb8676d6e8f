use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 按 (agent_name, instrument_id) 记录上次自动通知时间。
/// 手动触发（bypass）不读也不写这张表。
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "throttle_states")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub agent_name: String,
    pub instrument_id: i32,
    pub last_notified_at: i64,
    pub notify_count: i32, // 当日累计，跨天清零，仅作统计
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
