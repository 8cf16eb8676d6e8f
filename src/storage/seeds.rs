use crate::storage::repository::{AgentRepository, DataSourceRepository, InstrumentRepository};
use log::info;
use sea_orm::DatabaseConnection;
use serde_json::json;

/// 首次启动的内置配置：Agent、预置数据源、示例股票。
/// 全部幂等，重复执行不会覆盖用户修改。
pub async fn run_all(db: &DatabaseConnection) -> Result<(), sea_orm::DbErr> {
    seed_builtin_agents(db).await?;
    seed_preset_sources(db).await?;
    seed_sample_instruments(db).await?;
    Ok(())
}

async fn seed_builtin_agents(db: &DatabaseConnection) -> Result<(), sea_orm::DbErr> {
    AgentRepository::upsert_builtin(
        db,
        "daily_report",
        "盘后日报",
        "每日收盘后生成自选股日报，包含大盘概览、个股分析和明日关注",
        true,
        "30 15 * * 1-5",
        "batch",
        None,
    )
    .await?;

    AgentRepository::upsert_builtin(
        db,
        "intraday_monitor",
        "盘中监测",
        "交易时段实时监控，AI 智能判断是否有值得关注的信号",
        false,
        "*/5 9-15 * * 1-5",
        "single",
        Some(json!({
            "price_alert_threshold": 3.0,
            "volume_alert_ratio": 2.0,
            "stop_loss_warning": -5.0,
            "take_profit_warning": 10.0,
            "throttle_minutes": 30,
        })),
    )
    .await?;

    AgentRepository::upsert_builtin(
        db,
        "news_digest",
        "新闻速递",
        "定时抓取与持仓相关的新闻资讯并推送摘要",
        false,
        "0 9-18/2 * * 1-5",
        "batch",
        None,
    )
    .await?;

    AgentRepository::upsert_builtin(
        db,
        "premarket_outlook",
        "盘前分析",
        "开盘前综合昨日分析和隔夜信息，展望今日走势",
        false,
        "0 9 * * 1-5",
        "batch",
        None,
    )
    .await?;

    AgentRepository::upsert_builtin(
        db,
        "chart_analyst",
        "技术分析",
        "抓取 K 线图并使用多模态 AI 进行技术分析",
        false,
        "0 15 * * 1-5",
        "single",
        None,
    )
    .await?;

    info!("内置 Agent 初始化完成");
    Ok(())
}

async fn seed_preset_sources(db: &DatabaseConnection) -> Result<(), sea_orm::DbErr> {
    // 新闻类
    DataSourceRepository::upsert_preset(
        db,
        "雪球资讯",
        "news",
        "xueqiu",
        Some(json!({"cookies": "", "description": "雪球个股新闻聚合，需要登录 cookie"})),
        false,
        0,
        true,
        &["601127", "600519"],
    )
    .await?;
    DataSourceRepository::upsert_preset(
        db,
        "东方财富资讯",
        "news",
        "eastmoney_news",
        None,
        true,
        1,
        false,
        &["601127", "600519"],
    )
    .await?;
    DataSourceRepository::upsert_preset(
        db,
        "东方财富公告",
        "news",
        "eastmoney",
        None,
        true,
        2,
        true,
        &["601127", "600519"],
    )
    .await?;

    // K线
    DataSourceRepository::upsert_preset(
        db,
        "腾讯K线",
        "kline",
        "tencent",
        None,
        true,
        0,
        false,
        &["601127", "600519", "300750"],
    )
    .await?;

    // 资金流向
    DataSourceRepository::upsert_preset(
        db,
        "东方财富资金流",
        "capital_flow",
        "eastmoney",
        None,
        true,
        0,
        false,
        &["601127", "600519"],
    )
    .await?;

    // 实时行情
    DataSourceRepository::upsert_preset(
        db,
        "腾讯行情",
        "quote",
        "tencent",
        None,
        true,
        0,
        true,
        &["601127", "600519", "300750"],
    )
    .await?;

    // K线图
    DataSourceRepository::upsert_preset(
        db,
        "新浪K线图",
        "chart",
        "sina",
        None,
        true,
        0,
        false,
        &["601127"],
    )
    .await?;
    DataSourceRepository::upsert_preset(
        db,
        "东方财富K线图",
        "chart",
        "eastmoney",
        None,
        false,
        1,
        false,
        &["601127"],
    )
    .await?;

    info!("预置数据源初始化完成");
    Ok(())
}

/// 只在没有任何股票时添加示例
async fn seed_sample_instruments(db: &DatabaseConnection) -> Result<(), sea_orm::DbErr> {
    if InstrumentRepository::count(db).await? > 0 {
        return Ok(());
    }

    let samples = [
        ("600519", "贵州茅台", "CN"),
        ("002594", "比亚迪", "CN"),
        ("300750", "宁德时代", "CN"),
        ("00700", "腾讯控股", "HK"),
        ("AAPL", "苹果", "US"),
    ];
    for (symbol, name, market) in samples {
        InstrumentRepository::insert(db, symbol, name, market).await?;
    }
    info!("已添加 {} 只示例股票（首次启动）", samples.len());
    Ok(())
}
