use crate::storage::entity::instrument_agent_binding::{
    self, ActiveModel as BindingActiveModel, Entity as InstrumentAgentBinding,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

pub struct BindingRepository;

impl BindingRepository {
    pub async fn for_agent(
        db: &DatabaseConnection,
        agent_name: &str,
    ) -> Result<Vec<instrument_agent_binding::Model>, sea_orm::DbErr> {
        InstrumentAgentBinding::find()
            .filter(instrument_agent_binding::Column::AgentName.eq(agent_name))
            .order_by_asc(instrument_agent_binding::Column::Id)
            .all(db)
            .await
    }

    pub async fn find(
        db: &DatabaseConnection,
        instrument_id: i32,
        agent_name: &str,
    ) -> Result<Option<instrument_agent_binding::Model>, sea_orm::DbErr> {
        InstrumentAgentBinding::find()
            .filter(instrument_agent_binding::Column::InstrumentId.eq(instrument_id))
            .filter(instrument_agent_binding::Column::AgentName.eq(agent_name))
            .one(db)
            .await
    }

    /// 重复绑定返回 None
    pub async fn enroll(
        db: &DatabaseConnection,
        instrument_id: i32,
        agent_name: &str,
    ) -> Result<Option<i32>, sea_orm::DbErr> {
        if Self::find(db, instrument_id, agent_name).await?.is_some() {
            return Ok(None);
        }
        let model = BindingActiveModel {
            instrument_id: Set(instrument_id),
            agent_name: Set(agent_name.to_string()),
            schedule: Set(None),
            ai_model_id: Set(None),
            notify_channel_ids: Set(None),
            created_at: Set(Utc::now().timestamp()),
            ..Default::default()
        };
        let inserted = model.insert(db).await?;
        Ok(Some(inserted.id))
    }

    pub async fn unenroll(
        db: &DatabaseConnection,
        instrument_id: i32,
        agent_name: &str,
    ) -> Result<u64, sea_orm::DbErr> {
        let res = InstrumentAgentBinding::delete_many()
            .filter(instrument_agent_binding::Column::InstrumentId.eq(instrument_id))
            .filter(instrument_agent_binding::Column::AgentName.eq(agent_name))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }

    /// 股票删除时级联清理绑定
    pub async fn delete_for_instrument(
        db: &DatabaseConnection,
        instrument_id: i32,
    ) -> Result<u64, sea_orm::DbErr> {
        let res = InstrumentAgentBinding::delete_many()
            .filter(instrument_agent_binding::Column::InstrumentId.eq(instrument_id))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }

    /// 整体写入覆盖项；传 None 即恢复继承
    pub async fn set_overrides(
        db: &DatabaseConnection,
        instrument_id: i32,
        agent_name: &str,
        schedule: Option<String>,
        ai_model_id: Option<i32>,
        notify_channel_ids: Option<Vec<i32>>,
    ) -> Result<bool, sea_orm::DbErr> {
        match Self::find(db, instrument_id, agent_name).await? {
            Some(existing) => {
                let encoded = notify_channel_ids
                    .filter(|ids| !ids.is_empty())
                    .map(|ids| serde_json::json!(ids).to_string());
                let update = BindingActiveModel {
                    id: Set(existing.id),
                    schedule: Set(schedule.filter(|s| !s.trim().is_empty())),
                    ai_model_id: Set(ai_model_id),
                    notify_channel_ids: Set(encoded),
                    ..Default::default()
                };
                update.update(db).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
