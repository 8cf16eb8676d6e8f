use crate::storage::entity::agent_definition::{
    self, ActiveModel as AgentActiveModel, Entity as AgentDefinition,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

pub struct AgentRepository;

impl AgentRepository {
    pub async fn get_all(
        db: &DatabaseConnection,
    ) -> Result<Vec<agent_definition::Model>, sea_orm::DbErr> {
        AgentDefinition::find()
            .order_by_asc(agent_definition::Column::Id)
            .all(db)
            .await
    }

    pub async fn get_enabled(
        db: &DatabaseConnection,
    ) -> Result<Vec<agent_definition::Model>, sea_orm::DbErr> {
        AgentDefinition::find()
            .filter(agent_definition::Column::Enabled.eq(true))
            .order_by_asc(agent_definition::Column::Id)
            .all(db)
            .await
    }

    pub async fn get_by_name(
        db: &DatabaseConnection,
        name: &str,
    ) -> Result<Option<agent_definition::Model>, sea_orm::DbErr> {
        AgentDefinition::find()
            .filter(agent_definition::Column::Name.eq(name))
            .one(db)
            .await
    }

    /// 内置 Agent 的幂等初始化：不存在则插入；
    /// 已存在时只同步代码侧定义（执行模式、名称、描述），保留用户改过的开关和排程。
    pub async fn upsert_builtin(
        db: &DatabaseConnection,
        name: &str,
        display_name: &str,
        description: &str,
        enabled: bool,
        schedule: &str,
        execution_mode: &str,
        config: Option<serde_json::Value>,
    ) -> Result<(), sea_orm::DbErr> {
        let now = Utc::now().timestamp();
        match Self::get_by_name(db, name).await? {
            Some(existing) => {
                let update = AgentActiveModel {
                    id: Set(existing.id),
                    display_name: Set(display_name.to_string()),
                    description: Set(description.to_string()),
                    execution_mode: Set(execution_mode.to_string()),
                    updated_at: Set(now),
                    ..Default::default()
                };
                update.update(db).await?;
            }
            None => {
                let model = AgentActiveModel {
                    name: Set(name.to_string()),
                    display_name: Set(display_name.to_string()),
                    description: Set(description.to_string()),
                    enabled: Set(enabled),
                    schedule: Set(schedule.to_string()),
                    execution_mode: Set(execution_mode.to_string()),
                    ai_model_id: Set(None),
                    notify_channel_ids: Set(None),
                    config: Set(config.map(|v| v.to_string())),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                };
                model.insert(db).await?;
            }
        }
        Ok(())
    }

    pub async fn set_enabled(
        db: &DatabaseConnection,
        name: &str,
        enabled: bool,
    ) -> Result<bool, sea_orm::DbErr> {
        match Self::get_by_name(db, name).await? {
            Some(existing) => {
                let update = AgentActiveModel {
                    id: Set(existing.id),
                    enabled: Set(enabled),
                    updated_at: Set(Utc::now().timestamp()),
                    ..Default::default()
                };
                update.update(db).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn update_schedule(
        db: &DatabaseConnection,
        name: &str,
        schedule: &str,
    ) -> Result<bool, sea_orm::DbErr> {
        match Self::get_by_name(db, name).await? {
            Some(existing) => {
                let update = AgentActiveModel {
                    id: Set(existing.id),
                    schedule: Set(schedule.to_string()),
                    updated_at: Set(Utc::now().timestamp()),
                    ..Default::default()
                };
                update.update(db).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn update_model(
        db: &DatabaseConnection,
        name: &str,
        ai_model_id: Option<i32>,
    ) -> Result<bool, sea_orm::DbErr> {
        match Self::get_by_name(db, name).await? {
            Some(existing) => {
                let update = AgentActiveModel {
                    id: Set(existing.id),
                    ai_model_id: Set(ai_model_id),
                    updated_at: Set(Utc::now().timestamp()),
                    ..Default::default()
                };
                update.update(db).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn update_channels(
        db: &DatabaseConnection,
        name: &str,
        channel_ids: &[i32],
    ) -> Result<bool, sea_orm::DbErr> {
        let encoded = if channel_ids.is_empty() {
            None
        } else {
            Some(serde_json::json!(channel_ids).to_string())
        };
        match Self::get_by_name(db, name).await? {
            Some(existing) => {
                let update = AgentActiveModel {
                    id: Set(existing.id),
                    notify_channel_ids: Set(encoded),
                    updated_at: Set(Utc::now().timestamp()),
                    ..Default::default()
                };
                update.update(db).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn update_config(
        db: &DatabaseConnection,
        name: &str,
        config: serde_json::Value,
    ) -> Result<bool, sea_orm::DbErr> {
        match Self::get_by_name(db, name).await? {
            Some(existing) => {
                let update = AgentActiveModel {
                    id: Set(existing.id),
                    config: Set(Some(config.to_string())),
                    updated_at: Set(Utc::now().timestamp()),
                    ..Default::default()
                };
                update.update(db).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
