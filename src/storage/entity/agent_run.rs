use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 一次 Agent 执行的落库记录，只增不改。
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "agent_runs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub agent_name: String,
    pub instrument_symbol: Option<String>, // batch 模式整体一条记录，无单只代码
    pub status: String,                    // done / failed / no_alert
    pub result: Option<String>,            // JSON，分类后的结论
    pub error: Option<String>,
    pub duration_ms: i64,
    pub logs: Option<String>, // JSON 数组，执行日志轨迹
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
