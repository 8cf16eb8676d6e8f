use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "notify_channels")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub channel_type: String, // telegram / bark / dingtalk / wecom / lark / serverchan / pushplus / discord / pushover
    pub config: Option<String>, // JSON，token、webhook 地址等
    pub enabled: bool,
    pub is_default: bool, // 全局唯一默认通道，切换时原默认被原子清除
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
