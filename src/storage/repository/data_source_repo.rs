use crate::storage::entity::data_source_binding::{
    self, ActiveModel as DataSourceActiveModel, Entity as DataSourceBinding,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

pub struct DataSourceRepository;

impl DataSourceRepository {
    pub async fn get_all(
        db: &DatabaseConnection,
    ) -> Result<Vec<data_source_binding::Model>, sea_orm::DbErr> {
        DataSourceBinding::find()
            .order_by_asc(data_source_binding::Column::SourceType)
            .order_by_asc(data_source_binding::Column::Priority)
            .all(db)
            .await
    }

    pub async fn get(
        db: &DatabaseConnection,
        id: i32,
    ) -> Result<Option<data_source_binding::Model>, sea_orm::DbErr> {
        DataSourceBinding::find_by_id(id).one(db).await
    }

    /// 某能力类型下启用的绑定，按 priority 升序、id 升序。
    /// 这个顺序就是路由的尝试顺序，必须稳定可复现。
    pub async fn enabled_by_type(
        db: &DatabaseConnection,
        source_type: &str,
    ) -> Result<Vec<data_source_binding::Model>, sea_orm::DbErr> {
        DataSourceBinding::find()
            .filter(data_source_binding::Column::SourceType.eq(source_type))
            .filter(data_source_binding::Column::Enabled.eq(true))
            .order_by_asc(data_source_binding::Column::Priority)
            .order_by_asc(data_source_binding::Column::Id)
            .all(db)
            .await
    }

    /// 预置数据源的幂等初始化：按 (name, provider) 匹配；
    /// 已存在时同步 supports_batch，test_symbols 只在为空时补上。
    pub async fn upsert_preset(
        db: &DatabaseConnection,
        name: &str,
        source_type: &str,
        provider: &str,
        config: Option<serde_json::Value>,
        enabled: bool,
        priority: i32,
        supports_batch: bool,
        test_symbols: &[&str],
    ) -> Result<(), sea_orm::DbErr> {
        let existing = DataSourceBinding::find()
            .filter(data_source_binding::Column::Name.eq(name))
            .filter(data_source_binding::Column::Provider.eq(provider))
            .one(db)
            .await?;

        let symbols_json = serde_json::json!(test_symbols).to_string();
        match existing {
            Some(row) => {
                let mut update = DataSourceActiveModel {
                    id: Set(row.id),
                    ..Default::default()
                };
                let mut dirty = false;
                if row.supports_batch != supports_batch {
                    update.supports_batch = Set(supports_batch);
                    dirty = true;
                }
                let missing_symbols = row
                    .test_symbols
                    .as_deref()
                    .map(|s| s.trim().is_empty() || s == "[]")
                    .unwrap_or(true);
                if missing_symbols {
                    update.test_symbols = Set(Some(symbols_json));
                    dirty = true;
                }
                if dirty {
                    update.update(db).await?;
                }
            }
            None => {
                let model = DataSourceActiveModel {
                    name: Set(name.to_string()),
                    source_type: Set(source_type.to_string()),
                    provider: Set(provider.to_string()),
                    config: Set(config.map(|v| v.to_string())),
                    enabled: Set(enabled),
                    priority: Set(priority),
                    supports_batch: Set(supports_batch),
                    test_symbols: Set(Some(symbols_json)),
                    created_at: Set(Utc::now().timestamp()),
                    ..Default::default()
                };
                model.insert(db).await?;
            }
        }
        Ok(())
    }

    pub async fn set_enabled(
        db: &DatabaseConnection,
        id: i32,
        enabled: bool,
    ) -> Result<bool, sea_orm::DbErr> {
        match Self::get(db, id).await? {
            Some(row) => {
                let update = DataSourceActiveModel {
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
}
