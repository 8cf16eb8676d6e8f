mod agent;
mod analysis;
mod app_service;
mod commands;
mod market;
mod net;
mod notify;
mod resolve;
mod runlog;
mod schedule;
mod scheduler;
mod storage;

use chrono::{Local, TimeZone};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

use crate::agent::{RunReport, RunStatus};
use crate::analysis::HttpProviderFactory;
use crate::app_service::{AppService, TestReport};
use crate::commands::AppCommand;
use crate::market::StaticDispatch;
use crate::notify::HttpSenderDispatch;
use crate::runlog::LogPhase;
use crate::scheduler::SchedulerService;
use crate::storage::entity::agent_run;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
// AI 请求的超时由执行器控制，客户端留足余量
const AI_HTTP_TIMEOUT: Duration = Duration::from_secs(150);

#[tokio::main(flavor = "multi_thread")]
async fn main() -> io::Result<()> {
    let ts = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let log_dir = std::path::PathBuf::from("logs");
    std::fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join(format!("app-{}.log", ts));
    let log_file = std::fs::File::create(log_path)?;
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file))) // 核心：重定向输出到文件
        .filter_level(log::LevelFilter::Warn)
        .filter_module("rustpan", log::LevelFilter::Info)
        .filter_module("sqlx", log::LevelFilter::Error)
        .filter_module("sea_orm", log::LevelFilter::Error)
        .init();

    dotenv::dotenv().ok();

    println!("盘中助手");

    // 初始化数据库
    let db_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://watchlist.db?mode=rwc".to_string());
    let db = match storage::establish_connection(&db_url).await {
        Ok(connection) => {
            println!("✓ 数据库就绪: {}", db_url);
            connection
        }
        Err(e) => {
            eprintln!("✗ 无法连接数据库: {}", e);
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("数据库连接失败: {}", e),
            ));
        }
    };
    if let Err(e) = storage::seeds::run_all(&db).await {
        eprintln!("⚠ 内置配置初始化失败: {}", e);
    }

    // 共享 HTTP 客户端，AI 请求单独一个（超时更长）
    let http = match net::build_http_client(HTTP_TIMEOUT) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("✗ HTTP 客户端初始化失败: {}", e);
            return Err(io::Error::new(io::ErrorKind::Other, e.to_string()));
        }
    };
    let ai_http = match net::build_http_client(AI_HTTP_TIMEOUT) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("✗ HTTP 客户端初始化失败: {}", e);
            return Err(io::Error::new(io::ErrorKind::Other, e.to_string()));
        }
    };

    let service = Arc::new(AppService::new(
        db.clone(),
        Arc::new(StaticDispatch::new(http.clone())),
        Arc::new(HttpSenderDispatch::new(http)),
        Arc::new(HttpProviderFactory::new(ai_http)),
    ));

    // 调度器常驻后台
    tokio::spawn(SchedulerService::new(db, service.executor()).run_forever());

    // 创建核心 Channel (使用 AppCommand)
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<AppCommand>();

    // 启动单后台任务模型 (Actor)
    let service_bg = service.clone();
    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            handle_command(&service_bg, cmd).await;
        }
    });

    print_help();

    // 控制台输入循环
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            _ => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Ok(cmd) = line.parse::<AppCommand>() {
            if matches!(cmd, AppCommand::Quit) {
                println!("再见");
                break;
            }
            if cmd_tx.send(cmd).is_err() {
                break;
            }
        }
    }

    Ok(())
}

async fn handle_command(service: &Arc<AppService>, cmd: AppCommand) {
    match cmd {
        AppCommand::TriggerAgent { agent, bypass } => {
            let svc = service.clone();
            tokio::spawn(async move {
                println!("开始执行 {} ...", agent);
                match svc.trigger_agent(&agent, bypass).await {
                    Ok(reports) => {
                        if reports.is_empty() {
                            println!("○ [{}] 没有可执行的股票", agent);
                        }
                        for report in &reports {
                            print_run_report(report);
                        }
                    }
                    Err(e) => println!("✗ [{}] {}", agent, e),
                }
            });
        }
        AppCommand::TriggerInstrument {
            agent,
            symbol,
            bypass,
        } => {
            let svc = service.clone();
            tokio::spawn(async move {
                println!("开始执行 {} / {} ...", agent, symbol);
                match svc.trigger_instrument(&agent, &symbol, bypass).await {
                    Ok(report) => print_run_report(&report),
                    Err(e) => println!("✗ [{}] {}", agent, e),
                }
            });
        }
        AppCommand::TestSource { id } => {
            let svc = service.clone();
            tokio::spawn(async move {
                match svc.test_data_source(id).await {
                    Ok(report) => print_test_report(&report),
                    Err(e) => println!("✗ {}", e),
                }
            });
        }
        AppCommand::TestModel { id } => {
            let svc = service.clone();
            tokio::spawn(async move {
                match svc.test_ai_model(id).await {
                    Ok(report) => print_test_report(&report),
                    Err(e) => println!("✗ {}", e),
                }
            });
        }
        AppCommand::TestChannel { id } => {
            let svc = service.clone();
            tokio::spawn(async move {
                match svc.test_channel(id).await {
                    Ok(report) => print_test_report(&report),
                    Err(e) => println!("✗ {}", e),
                }
            });
        }
        AppCommand::AgentList => match service.list_agents().await {
            Ok(list) => {
                for a in &list {
                    println!(
                        "  {} {:<18} {} | 排程 [{}] | 模式 {} | 模型 {} | 通道 {}",
                        mark(a.enabled),
                        a.name,
                        a.display_name,
                        a.schedule,
                        a.execution_mode,
                        a.ai_model_id
                            .map(|id| id.to_string())
                            .unwrap_or_else(|| "默认".to_string()),
                        a.notify_channel_ids.as_deref().unwrap_or("默认"),
                    );
                }
            }
            Err(e) => println!("✗ {}", e),
        },
        AppCommand::AgentEnable { name, enabled } => {
            report_unit(service.set_agent_enabled(&name, enabled).await, "已更新");
        }
        AppCommand::AgentSchedule { name, expr } => {
            match service.update_agent_schedule(&name, &expr).await {
                Ok(true) => println!("✓ 排程已更新"),
                Ok(false) => println!("○ 排程与现有表达式等价，未修改"),
                Err(e) => println!("✗ {}", e),
            }
        }
        AppCommand::AgentModel { name, model_id } => {
            report_unit(service.set_agent_model(&name, model_id).await, "已更新");
        }
        AppCommand::AgentChannels { name, channel_ids } => {
            report_unit(
                service.set_agent_channels(&name, &channel_ids).await,
                "已更新",
            );
        }
        AppCommand::StockList => match service.list_stocks().await {
            Ok(list) => {
                for s in &list {
                    let position = match (s.cost_price, s.shares) {
                        (Some(cost), Some(n)) => format!("成本 {:.2} × {:.0} 股", cost, n),
                        (Some(cost), None) => format!("成本 {:.2}", cost),
                        _ => "未持仓".to_string(),
                    };
                    println!(
                        "  {} {:<8} {} [{}] {}",
                        mark(s.enabled),
                        s.symbol,
                        s.name,
                        s.market,
                        position
                    );
                }
            }
            Err(e) => println!("✗ {}", e),
        },
        AppCommand::StockAdd {
            symbol,
            name,
            market,
        } => match service.add_stock(&symbol, &name, &market).await {
            Ok(stock) => println!("✓ 已收录 {} {}", stock.symbol, stock.name),
            Err(e) => println!("✗ {}", e),
        },
        AppCommand::StockRemove { symbol } => {
            report_unit(service.remove_stock(&symbol).await, "已删除（含绑定）");
        }
        AppCommand::StockEnable { symbol, enabled } => {
            report_unit(service.set_stock_enabled(&symbol, enabled).await, "已更新");
        }
        AppCommand::StockPosition {
            symbol,
            cost_price,
            shares,
        } => {
            report_unit(
                service.set_position(&symbol, cost_price, shares).await,
                "持仓已更新",
            );
        }
        AppCommand::Assign { symbol, agent } => match service.assign(&symbol, &agent).await {
            Ok(true) => println!("✓ 已绑定 {} -> {}", symbol, agent),
            Ok(false) => println!("○ {} 已经绑定过 {}", symbol, agent),
            Err(e) => println!("✗ {}", e),
        },
        AppCommand::Unassign { symbol, agent } => match service.unassign(&symbol, &agent).await {
            Ok(true) => println!("✓ 已解绑 {} -> {}", symbol, agent),
            Ok(false) => println!("○ {} 本来就没绑定 {}", symbol, agent),
            Err(e) => println!("✗ {}", e),
        },
        AppCommand::OverrideSchedule {
            symbol,
            agent,
            expr,
        } => {
            report_unit(
                service.override_binding_schedule(&symbol, &agent, expr).await,
                "绑定排程已更新",
            );
        }
        AppCommand::OverrideModel {
            symbol,
            agent,
            model_id,
        } => {
            report_unit(
                service.override_binding_model(&symbol, &agent, model_id).await,
                "绑定模型已更新",
            );
        }
        AppCommand::OverrideChannels {
            symbol,
            agent,
            channel_ids,
        } => {
            report_unit(
                service
                    .override_binding_channels(&symbol, &agent, channel_ids)
                    .await,
                "绑定通道已更新",
            );
        }
        AppCommand::OverrideClear { symbol, agent } => {
            report_unit(
                service.clear_binding_overrides(&symbol, &agent).await,
                "绑定覆盖已清除",
            );
        }
        AppCommand::ModelList => match service.list_models().await {
            Ok(list) => {
                for m in &list {
                    println!(
                        "  {} [{}] {} {}/{}{}",
                        mark(m.enabled),
                        m.id,
                        m.name,
                        m.provider,
                        m.model_name,
                        if m.is_default { "（默认）" } else { "" }
                    );
                }
            }
            Err(e) => println!("✗ {}", e),
        },
        AppCommand::ModelAdd {
            name,
            provider,
            model_name,
            api_key,
            base_url,
        } => {
            match service
                .add_model(&name, &provider, &model_name, &api_key, base_url)
                .await
            {
                Ok(model) => println!("✓ 已添加模型 [{}] {}", model.id, model.name),
                Err(e) => println!("✗ {}", e),
            }
        }
        AppCommand::ModelDefault { id } => {
            report_unit(service.set_default_model(id).await, "默认模型已切换");
        }
        AppCommand::ModelRemove { id } => {
            report_unit(service.delete_model(id).await, "已删除");
        }
        AppCommand::ChannelList => match service.list_channels().await {
            Ok(list) => {
                for c in &list {
                    println!(
                        "  {} [{}] {} {}{}",
                        mark(c.enabled),
                        c.id,
                        c.name,
                        c.channel_type,
                        if c.is_default { "（默认）" } else { "" }
                    );
                }
            }
            Err(e) => println!("✗ {}", e),
        },
        AppCommand::ChannelAdd {
            name,
            channel_type,
            config,
        } => match serde_json::from_str::<serde_json::Value>(&config) {
            Ok(value) => match service.add_channel(&name, &channel_type, value).await {
                Ok(channel) => println!("✓ 已添加通道 [{}] {}", channel.id, channel.name),
                Err(e) => println!("✗ {}", e),
            },
            Err(e) => println!("✗ config 不是合法 JSON: {}", e),
        },
        AppCommand::ChannelDefault { id } => {
            report_unit(service.set_default_channel(id).await, "默认通道已切换");
        }
        AppCommand::ChannelEnable { id, enabled } => {
            report_unit(service.set_channel_enabled(id, enabled).await, "已更新");
        }
        AppCommand::ChannelRemove { id } => {
            report_unit(service.delete_channel(id).await, "已删除");
        }
        AppCommand::SourceList => match service.list_sources().await {
            Ok(list) => {
                for b in &list {
                    println!(
                        "  {} [{}] {} {}/{} 优先级 {}",
                        mark(b.enabled),
                        b.id,
                        b.name,
                        b.source_type,
                        b.provider,
                        b.priority
                    );
                }
            }
            Err(e) => println!("✗ {}", e),
        },
        AppCommand::SourceEnable { id, enabled } => {
            report_unit(service.set_source_enabled(id, enabled).await, "已更新");
        }
        AppCommand::Runs { agent, limit } => {
            match service.recent_runs(agent.as_deref(), limit).await {
                Ok(rows) => {
                    for row in &rows {
                        print_run_row(row);
                    }
                }
                Err(e) => println!("✗ {}", e),
            }
        }
        AppCommand::Help => print_help(),
        // Quit 在输入循环就拦截了，不会到这里
        AppCommand::Quit => {}
        AppCommand::Unknown(msg) => {
            if !msg.is_empty() {
                println!("{}", msg);
            }
        }
    }
}

fn mark(enabled: bool) -> &'static str {
    if enabled {
        "✓"
    } else {
        "✗"
    }
}

fn report_unit(result: anyhow::Result<()>, done: &str) {
    match result {
        Ok(()) => println!("✓ {}", done),
        Err(e) => println!("✗ {}", e),
    }
}

fn print_run_report(report: &RunReport) {
    let marker = match report.status {
        RunStatus::Done => "✓",
        RunStatus::NoAlert => "○",
        RunStatus::Failed => "✗",
    };
    let scope = report.instrument_symbol.as_deref().unwrap_or("整体");
    println!(
        "{} [{}] {} {}ms",
        marker, report.agent_name, scope, report.duration_ms
    );
    for v in &report.verdicts {
        println!(
            "    {} {}: {}{} {}",
            v.symbol,
            v.name,
            v.action.label(),
            if v.should_alert { "（需提醒）" } else { "" },
            v.summary
        );
    }
    if report.notified {
        println!("    已推送通知");
    }
    if report.throttled {
        println!("    节流窗口内，本次未推送");
    }
    if let Some(e) = &report.error {
        println!("    {}", e);
    }
}

fn print_test_report(report: &TestReport) {
    if report.success {
        let count = report
            .count
            .map(|n| format!("，{} 条数据", n))
            .unwrap_or_default();
        println!(
            "✓ [{}] 测试通过，耗时 {}ms{}",
            report.target, report.duration_ms, count
        );
    } else {
        println!(
            "✗ [{}] 测试失败: {}",
            report.target,
            report.error.as_deref().unwrap_or("未知错误")
        );
    }
    for entry in report.logs.entries() {
        let phase = match entry.phase {
            LogPhase::Start => "开始",
            LogPhase::Success => "成功",
            LogPhase::Error => "失败",
        };
        println!("    [{}] {} {}", entry.actor, phase, entry.message);
    }
}

fn print_run_row(row: &agent_run::Model) {
    let time = Local
        .timestamp_opt(row.created_at, 0)
        .single()
        .map(|t| t.format("%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();
    let marker = match row.status.as_str() {
        "done" => "✓",
        "no_alert" => "○",
        _ => "✗",
    };
    println!(
        "  {} [{}] {} {} {} {}ms{}",
        marker,
        row.id,
        time,
        row.agent_name,
        row.instrument_symbol.as_deref().unwrap_or("-"),
        row.duration_ms,
        row.error
            .as_deref()
            .map(|e| format!(" | {}", e))
            .unwrap_or_default()
    );
}

fn print_help() {
    println!("可用命令:");
    println!("  trigger <agent> [代码] [--bypass]       手动执行，--bypass 跳过节流");
    println!("  test source|model|channel <id>          测试连接");
    println!("  agents | agent on|off <name>");
    println!("  agent schedule <name> <分 时 日 月 周>");
    println!("  agent model <name> <id|none> | agent channels <name> <id,id,...>");
    println!("  stocks | stock add <代码> <名称> [市场] | stock rm <代码>");
    println!("  stock on|off <代码> | stock pos <代码> <成本|none> [股数]");
    println!("  assign <代码> <agent> | unassign <代码> <agent>");
    println!("  override <代码> <agent> schedule|model|channels <值|none>");
    println!("  override <代码> <agent> clear");
    println!("  models | model add <名称> <provider> <model_name> <api_key> [base_url]");
    println!("  model default <id> | model rm <id>");
    println!("  channels | channel add <名称> <类型> <config_json>");
    println!("  channel default <id> | channel on|off <id> | channel rm <id>");
    println!("  sources | source on|off <id>");
    println!("  runs [agent] [n]                        执行历史");
    println!("  help | quit");
}
