use crate::storage::entity::throttle_state::{
    self, ActiveModel as ThrottleActiveModel, Entity as ThrottleState,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

pub struct ThrottleRepository;

impl ThrottleRepository {
    pub async fn get(
        db: &DatabaseConnection,
        agent_name: &str,
        instrument_id: i32,
    ) -> Result<Option<throttle_state::Model>, sea_orm::DbErr> {
        ThrottleState::find()
            .filter(throttle_state::Column::AgentName.eq(agent_name))
            .filter(throttle_state::Column::InstrumentId.eq(instrument_id))
            .one(db)
            .await
    }

    /// 写入一次自动通知的时间戳与当日计数。
    /// 调用方（节流门）持有该 key 的锁，这里不需要再加事务。
    pub async fn record(
        db: &DatabaseConnection,
        agent_name: &str,
        instrument_id: i32,
        notified_at: i64,
        notify_count: i32,
    ) -> Result<(), sea_orm::DbErr> {
        match Self::get(db, agent_name, instrument_id).await? {
            Some(existing) => {
                let update = ThrottleActiveModel {
                    id: Set(existing.id),
                    last_notified_at: Set(notified_at),
                    notify_count: Set(notify_count),
                    updated_at: Set(notified_at),
                    ..Default::default()
                };
                update.update(db).await?;
            }
            None => {
                let model = ThrottleActiveModel {
                    agent_name: Set(agent_name.to_string()),
                    instrument_id: Set(instrument_id),
                    last_notified_at: Set(notified_at),
                    notify_count: Set(notify_count),
                    updated_at: Set(notified_at),
                    ..Default::default()
                };
                model.insert(db).await?;
            }
        }
        Ok(())
    }
}
