use crate::storage::entity::instrument::{
    self, ActiveModel as InstrumentActiveModel, Entity as Instrument,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

pub struct InstrumentRepository;

impl InstrumentRepository {
    pub async fn get_all(
        db: &DatabaseConnection,
    ) -> Result<Vec<instrument::Model>, sea_orm::DbErr> {
        Instrument::find()
            .order_by_asc(instrument::Column::Id)
            .all(db)
            .await
    }

    pub async fn get_enabled(
        db: &DatabaseConnection,
    ) -> Result<Vec<instrument::Model>, sea_orm::DbErr> {
        Instrument::find()
            .filter(instrument::Column::Enabled.eq(true))
            .order_by_asc(instrument::Column::Id)
            .all(db)
            .await
    }

    pub async fn get_by_symbol(
        db: &DatabaseConnection,
        symbol: &str,
    ) -> Result<Option<instrument::Model>, sea_orm::DbErr> {
        Instrument::find()
            .filter(instrument::Column::Symbol.eq(symbol))
            .one(db)
            .await
    }

    pub async fn get_by_ids(
        db: &DatabaseConnection,
        ids: &[i32],
    ) -> Result<Vec<instrument::Model>, sea_orm::DbErr> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Instrument::find()
            .filter(instrument::Column::Id.is_in(ids.to_vec()))
            .order_by_asc(instrument::Column::Id)
            .all(db)
            .await
    }

    pub async fn count(db: &DatabaseConnection) -> Result<u64, sea_orm::DbErr> {
        Instrument::find().count(db).await
    }

    /// 已存在同代码则返回 None
    pub async fn insert(
        db: &DatabaseConnection,
        symbol: &str,
        name: &str,
        market: &str,
    ) -> Result<Option<instrument::Model>, sea_orm::DbErr> {
        if Self::get_by_symbol(db, symbol).await?.is_some() {
            return Ok(None);
        }
        let model = InstrumentActiveModel {
            symbol: Set(symbol.to_string()),
            name: Set(name.to_string()),
            market: Set(market.to_string()),
            enabled: Set(true),
            cost_price: Set(None),
            shares: Set(None),
            created_at: Set(Utc::now().timestamp()),
            ..Default::default()
        };
        Ok(Some(model.insert(db).await?))
    }

    pub async fn set_enabled(
        db: &DatabaseConnection,
        id: i32,
        enabled: bool,
    ) -> Result<bool, sea_orm::DbErr> {
        match Instrument::find_by_id(id).one(db).await? {
            Some(existing) => {
                let update = InstrumentActiveModel {
                    id: Set(existing.id),
                    enabled: Set(enabled),
                    ..Default::default()
                };
                update.update(db).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 两个字段一起写，传 None 即清仓（回到仅关注）
    pub async fn set_position(
        db: &DatabaseConnection,
        id: i32,
        cost_price: Option<f64>,
        shares: Option<f64>,
    ) -> Result<bool, sea_orm::DbErr> {
        match Instrument::find_by_id(id).one(db).await? {
            Some(existing) => {
                let update = InstrumentActiveModel {
                    id: Set(existing.id),
                    cost_price: Set(cost_price),
                    shares: Set(shares),
                    ..Default::default()
                };
                update.update(db).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn remove(db: &DatabaseConnection, id: i32) -> Result<u64, sea_orm::DbErr> {
        let res = Instrument::delete_by_id(id).exec(db).await?;
        Ok(res.rows_affected)
    }
}
