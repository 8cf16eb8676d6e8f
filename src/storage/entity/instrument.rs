use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "instruments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub symbol: String, // 代码，唯一，如 600519 / 00700 / AAPL
    pub name: String,
    pub market: String, // CN / HK / US
    pub enabled: bool,
    pub cost_price: Option<f64>, // 持仓成本，仅作为分析上下文
    pub shares: Option<f64>,
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
