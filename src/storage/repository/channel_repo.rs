use crate::storage::entity::notify_channel::{
    self, ActiveModel as ChannelActiveModel, Entity as NotifyChannel,
};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};

pub struct ChannelRepository;

impl ChannelRepository {
    pub async fn get_all(
        db: &DatabaseConnection,
    ) -> Result<Vec<notify_channel::Model>, sea_orm::DbErr> {
        NotifyChannel::find()
            .order_by_asc(notify_channel::Column::Id)
            .all(db)
            .await
    }

    pub async fn get(
        db: &DatabaseConnection,
        id: i32,
    ) -> Result<Option<notify_channel::Model>, sea_orm::DbErr> {
        NotifyChannel::find_by_id(id).one(db).await
    }

    /// 按传入顺序返回启用的通道，配置里的列表顺序即发送顺序
    pub async fn get_enabled_by_ids(
        db: &DatabaseConnection,
        ids: &[i32],
    ) -> Result<Vec<notify_channel::Model>, sea_orm::DbErr> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut rows = NotifyChannel::find()
            .filter(notify_channel::Column::Id.is_in(ids.to_vec()))
            .filter(notify_channel::Column::Enabled.eq(true))
            .all(db)
            .await?;
        rows.sort_by_key(|row| ids.iter().position(|id| *id == row.id).unwrap_or(usize::MAX));
        Ok(rows)
    }

    pub async fn get_default(
        db: &DatabaseConnection,
    ) -> Result<Option<notify_channel::Model>, sea_orm::DbErr> {
        NotifyChannel::find()
            .filter(notify_channel::Column::IsDefault.eq(true))
            .filter(notify_channel::Column::Enabled.eq(true))
            .one(db)
            .await
    }

    pub async fn create(
        db: &DatabaseConnection,
        name: &str,
        channel_type: &str,
        config: serde_json::Value,
    ) -> Result<notify_channel::Model, sea_orm::DbErr> {
        let model = ChannelActiveModel {
            name: Set(name.to_string()),
            channel_type: Set(channel_type.to_string()),
            config: Set(Some(config.to_string())),
            enabled: Set(true),
            is_default: Set(false),
            created_at: Set(Utc::now().timestamp()),
            ..Default::default()
        };
        model.insert(db).await
    }

    /// 默认通道切换：同一事务内先清空旧默认再置新默认，
    /// 并发调用在事务上串行化，后写者胜出。
    pub async fn set_default(db: &DatabaseConnection, id: i32) -> Result<bool, sea_orm::DbErr> {
        let txn = db.begin().await?;

        let target = NotifyChannel::find_by_id(id).one(&txn).await?;
        if target.is_none() {
            txn.commit().await?;
            return Ok(false);
        }

        NotifyChannel::update_many()
            .col_expr(notify_channel::Column::IsDefault, Expr::value(false))
            .filter(notify_channel::Column::IsDefault.eq(true))
            .exec(&txn)
            .await?;
        NotifyChannel::update_many()
            .col_expr(notify_channel::Column::IsDefault, Expr::value(true))
            .filter(notify_channel::Column::Id.eq(id))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(true)
    }

    pub async fn set_enabled(
        db: &DatabaseConnection,
        id: i32,
        enabled: bool,
    ) -> Result<bool, sea_orm::DbErr> {
        match Self::get(db, id).await? {
            Some(row) => {
                let update = ChannelActiveModel {
                    id: Set(row.id),
                    enabled: Set(enabled),
                    ..Default::default()
                };
                update.update(db).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn delete(db: &DatabaseConnection, id: i32) -> Result<u64, sea_orm::DbErr> {
        let res = NotifyChannel::delete_by_id(id).exec(db).await?;
        Ok(res.rows_affected)
    }
}
