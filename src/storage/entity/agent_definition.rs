use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "agent_definitions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String, // 内置 Agent 标识，唯一
    pub display_name: String,
    pub description: String,
    pub enabled: bool,
    pub schedule: String,       // 五字段 cron，空串表示不自动调度
    pub execution_mode: String, // single / batch
    pub ai_model_id: Option<i32>,
    pub notify_channel_ids: Option<String>, // JSON 数组，如 [1,3]
    pub config: Option<String>,             // JSON 对象，Agent 自定义参数
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
