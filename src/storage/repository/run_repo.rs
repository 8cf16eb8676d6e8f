use crate::storage::entity::agent_run::{self, ActiveModel as RunActiveModel, Entity as AgentRun};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

pub struct RunRepository;

impl RunRepository {
    #[allow(clippy::too_many_arguments)]
    pub async fn append(
        db: &DatabaseConnection,
        agent_name: &str,
        instrument_symbol: Option<String>,
        status: &str,
        result: Option<serde_json::Value>,
        error: Option<String>,
        duration_ms: i64,
        logs: Option<serde_json::Value>,
    ) -> Result<i32, sea_orm::DbErr> {
        let model = RunActiveModel {
            agent_name: Set(agent_name.to_string()),
            instrument_symbol: Set(instrument_symbol),
            status: Set(status.to_string()),
            result: Set(result.map(|v| v.to_string())),
            error: Set(error),
            duration_ms: Set(duration_ms),
            logs: Set(logs.map(|v| v.to_string())),
            created_at: Set(Utc::now().timestamp()),
            ..Default::default()
        };
        let inserted = model.insert(db).await?;
        Ok(inserted.id)
    }

    pub async fn recent(
        db: &DatabaseConnection,
        agent_name: Option<&str>,
        limit: u64,
    ) -> Result<Vec<agent_run::Model>, sea_orm::DbErr> {
        let mut query = AgentRun::find()
            .order_by_desc(agent_run::Column::CreatedAt)
            .order_by_desc(agent_run::Column::Id)
            .limit(limit);
        if let Some(name) = agent_name {
            query = query.filter(agent_run::Column::AgentName.eq(name));
        }
        query.all(db).await
    }
}
