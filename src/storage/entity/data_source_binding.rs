use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "data_source_bindings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub source_type: String, // news / kline / capital_flow / quote / chart
    pub provider: String,    // tencent / eastmoney / eastmoney_news / xueqiu
    pub config: Option<String>, // JSON，供应商参数（cookie 等）
    pub enabled: bool,
    pub priority: i32, // 越小越先尝试
    pub supports_batch: bool,
    pub test_symbols: Option<String>, // JSON 数组，测试连通性用
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
