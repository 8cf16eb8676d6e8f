use crate::storage::entity::ai_model::{self, ActiveModel as AiModelActiveModel, Entity as AiModel};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};

pub struct AiModelRepository;

impl AiModelRepository {
    pub async fn get_all(db: &DatabaseConnection) -> Result<Vec<ai_model::Model>, sea_orm::DbErr> {
        AiModel::find()
            .order_by_asc(ai_model::Column::Id)
            .all(db)
            .await
    }

    pub async fn get(
        db: &DatabaseConnection,
        id: i32,
    ) -> Result<Option<ai_model::Model>, sea_orm::DbErr> {
        AiModel::find_by_id(id).one(db).await
    }

    pub async fn get_default(
        db: &DatabaseConnection,
    ) -> Result<Option<ai_model::Model>, sea_orm::DbErr> {
        AiModel::find()
            .filter(ai_model::Column::IsDefault.eq(true))
            .filter(ai_model::Column::Enabled.eq(true))
            .one(db)
            .await
    }

    pub async fn first_enabled(
        db: &DatabaseConnection,
    ) -> Result<Option<ai_model::Model>, sea_orm::DbErr> {
        AiModel::find()
            .filter(ai_model::Column::Enabled.eq(true))
            .order_by_asc(ai_model::Column::Id)
            .one(db)
            .await
    }

    pub async fn create(
        db: &DatabaseConnection,
        name: &str,
        provider: &str,
        model_name: &str,
        api_key: &str,
        base_url: Option<String>,
    ) -> Result<ai_model::Model, sea_orm::DbErr> {
        let model = AiModelActiveModel {
            name: Set(name.to_string()),
            provider: Set(provider.to_string()),
            model_name: Set(model_name.to_string()),
            api_key: Set(api_key.to_string()),
            base_url: Set(base_url),
            enabled: Set(true),
            is_default: Set(false),
            created_at: Set(Utc::now().timestamp()),
            ..Default::default()
        };
        model.insert(db).await
    }

    /// 与通道默认切换同一套原子交换语义
    pub async fn set_default(db: &DatabaseConnection, id: i32) -> Result<bool, sea_orm::DbErr> {
        let txn = db.begin().await?;

        let target = AiModel::find_by_id(id).one(&txn).await?;
        if target.is_none() {
            txn.commit().await?;
            return Ok(false);
        }

        AiModel::update_many()
            .col_expr(ai_model::Column::IsDefault, Expr::value(false))
            .filter(ai_model::Column::IsDefault.eq(true))
            .exec(&txn)
            .await?;
        AiModel::update_many()
            .col_expr(ai_model::Column::IsDefault, Expr::value(true))
            .filter(ai_model::Column::Id.eq(id))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(true)
    }

    pub async fn delete(db: &DatabaseConnection, id: i32) -> Result<u64, sea_orm::DbErr> {
        let res = AiModel::delete_by_id(id).exec(db).await?;
        Ok(res.rows_affected)
    }
}
