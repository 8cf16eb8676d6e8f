use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 股票与 Agent 的绑定关系，字段为空即继承 Agent 默认值。
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "instrument_agent_bindings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub instrument_id: i32,
    pub agent_name: String,
    pub schedule: Option<String>, // 空/None = 继承
    pub ai_model_id: Option<i32>,
    pub notify_channel_ids: Option<String>, // JSON 数组；非空则整体覆盖默认列表
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
