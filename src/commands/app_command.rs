use std::str::FromStr;

#[derive(Debug, Clone)]
pub enum AppCommand {
    TriggerAgent {
        agent: String,
        bypass: bool,
    },
    TriggerInstrument {
        agent: String,
        symbol: String,
        bypass: bool,
    },
    TestSource {
        id: i32,
    },
    TestModel {
        id: i32,
    },
    TestChannel {
        id: i32,
    },
    AgentList,
    AgentEnable {
        name: String,
        enabled: bool,
    },
    AgentSchedule {
        name: String,
        expr: String,
    },
    AgentModel {
        name: String,
        model_id: Option<i32>,
    },
    AgentChannels {
        name: String,
        channel_ids: Vec<i32>,
    },
    StockList,
    StockAdd {
        symbol: String,
        name: String,
        market: String,
    },
    StockRemove {
        symbol: String,
    },
    StockEnable {
        symbol: String,
        enabled: bool,
    },
    StockPosition {
        symbol: String,
        cost_price: Option<f64>,
        shares: Option<f64>,
    },
    Assign {
        symbol: String,
        agent: String,
    },
    Unassign {
        symbol: String,
        agent: String,
    },
    OverrideSchedule {
        symbol: String,
        agent: String,
        expr: Option<String>,
    },
    OverrideModel {
        symbol: String,
        agent: String,
        model_id: Option<i32>,
    },
    OverrideChannels {
        symbol: String,
        agent: String,
        channel_ids: Option<Vec<i32>>,
    },
    OverrideClear {
        symbol: String,
        agent: String,
    },
    ModelList,
    ModelAdd {
        name: String,
        provider: String,
        model_name: String,
        api_key: String,
        base_url: Option<String>,
    },
    ModelDefault {
        id: i32,
    },
    ModelRemove {
        id: i32,
    },
    ChannelList,
    ChannelAdd {
        name: String,
        channel_type: String,
        config: String,
    },
    ChannelDefault {
        id: i32,
    },
    ChannelEnable {
        id: i32,
        enabled: bool,
    },
    ChannelRemove {
        id: i32,
    },
    SourceList,
    SourceEnable {
        id: i32,
        enabled: bool,
    },
    Runs {
        agent: Option<String>,
        limit: u64,
    },
    Help,
    Quit,
    Unknown(String),
}

impl FromStr for AppCommand {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.is_empty() {
            return Ok(AppCommand::Unknown("".to_string()));
        }

        match parts[0] {
            "trigger" => {
                let mut rest: Vec<&str> = parts[1..].to_vec();
                let bypass = rest.iter().any(|t| *t == "--bypass" || *t == "-b");
                rest.retain(|t| *t != "--bypass" && *t != "-b");
                match (rest.first(), rest.get(1)) {
                    (Some(agent), Some(symbol)) => Ok(AppCommand::TriggerInstrument {
                        agent: agent.to_string(),
                        symbol: symbol.to_string(),
                        bypass,
                    }),
                    (Some(agent), None) => Ok(AppCommand::TriggerAgent {
                        agent: agent.to_string(),
                        bypass,
                    }),
                    _ => Ok(AppCommand::Unknown(
                        "用法: trigger <agent> [代码] [--bypass]".to_string(),
                    )),
                }
            }
            "test" => {
                let id = parts.get(2).and_then(|s| s.parse::<i32>().ok());
                match (parts.get(1).map(|s| *s), id) {
                    (Some("source"), Some(id)) => Ok(AppCommand::TestSource { id }),
                    (Some("model"), Some(id)) => Ok(AppCommand::TestModel { id }),
                    (Some("channel"), Some(id)) => Ok(AppCommand::TestChannel { id }),
                    _ => Ok(AppCommand::Unknown(
                        "用法: test source|model|channel <id>".to_string(),
                    )),
                }
            }
            "agents" => Ok(AppCommand::AgentList),
            "agent" => match parts.get(1).map(|s| *s) {
                Some("on") | Some("off") => {
                    if let Some(name) = parts.get(2) {
                        Ok(AppCommand::AgentEnable {
                            name: name.to_string(),
                            enabled: parts[1] == "on",
                        })
                    } else {
                        Ok(AppCommand::Unknown("用法: agent on|off <name>".to_string()))
                    }
                }
                Some("schedule") => {
                    let expr = parts.get(3..).map(|p| p.join(" ")).unwrap_or_default();
                    match parts.get(2) {
                        Some(name) if !expr.is_empty() => Ok(AppCommand::AgentSchedule {
                            name: name.to_string(),
                            expr,
                        }),
                        _ => Ok(AppCommand::Unknown(
                            "用法: agent schedule <name> <分 时 日 月 周>".to_string(),
                        )),
                    }
                }
                Some("model") => match (parts.get(2), parts.get(3).map(|s| *s)) {
                    (Some(name), Some("none")) => Ok(AppCommand::AgentModel {
                        name: name.to_string(),
                        model_id: None,
                    }),
                    (Some(name), Some(id_str)) => match id_str.parse::<i32>() {
                        Ok(id) => Ok(AppCommand::AgentModel {
                            name: name.to_string(),
                            model_id: Some(id),
                        }),
                        Err(_) => Ok(AppCommand::Unknown(
                            "用法: agent model <name> <id|none>".to_string(),
                        )),
                    },
                    _ => Ok(AppCommand::Unknown(
                        "用法: agent model <name> <id|none>".to_string(),
                    )),
                },
                Some("channels") => match (parts.get(2), parts.get(3)) {
                    (Some(name), Some(ids)) => Ok(AppCommand::AgentChannels {
                        name: name.to_string(),
                        channel_ids: parse_id_list(ids),
                    }),
                    _ => Ok(AppCommand::Unknown(
                        "用法: agent channels <name> <id,id,...>".to_string(),
                    )),
                },
                _ => Ok(AppCommand::Unknown(
                    "用法: agent on|off <name> | agent schedule <name> <表达式> | agent model <name> <id|none> | agent channels <name> <id,id,...>".to_string(),
                )),
            },
            "stocks" => Ok(AppCommand::StockList),
            "stock" => match parts.get(1).map(|s| *s) {
                Some("add") => match (parts.get(2), parts.get(3)) {
                    (Some(symbol), Some(name)) => Ok(AppCommand::StockAdd {
                        symbol: symbol.to_string(),
                        name: name.to_string(),
                        market: parts.get(4).unwrap_or(&"CN").to_string(),
                    }),
                    _ => Ok(AppCommand::Unknown(
                        "用法: stock add <代码> <名称> [市场]".to_string(),
                    )),
                },
                Some("rm") => {
                    if let Some(symbol) = parts.get(2) {
                        Ok(AppCommand::StockRemove {
                            symbol: symbol.to_string(),
                        })
                    } else {
                        Ok(AppCommand::Unknown("用法: stock rm <代码>".to_string()))
                    }
                }
                Some("on") | Some("off") => {
                    if let Some(symbol) = parts.get(2) {
                        Ok(AppCommand::StockEnable {
                            symbol: symbol.to_string(),
                            enabled: parts[1] == "on",
                        })
                    } else {
                        Ok(AppCommand::Unknown("用法: stock on|off <代码>".to_string()))
                    }
                }
                Some("pos") => match (parts.get(2), parts.get(3).map(|s| *s)) {
                    (Some(symbol), Some("none")) => Ok(AppCommand::StockPosition {
                        symbol: symbol.to_string(),
                        cost_price: None,
                        shares: None,
                    }),
                    (Some(symbol), Some(cost_str)) => match cost_str.parse::<f64>() {
                        Ok(cost) => Ok(AppCommand::StockPosition {
                            symbol: symbol.to_string(),
                            cost_price: Some(cost),
                            shares: parts.get(4).and_then(|s| s.parse::<f64>().ok()),
                        }),
                        Err(_) => Ok(AppCommand::Unknown(
                            "用法: stock pos <代码> <成本|none> [股数]".to_string(),
                        )),
                    },
                    _ => Ok(AppCommand::Unknown(
                        "用法: stock pos <代码> <成本|none> [股数]".to_string(),
                    )),
                },
                _ => Ok(AppCommand::Unknown(
                    "用法: stock add <代码> <名称> [市场] | stock rm <代码> | stock on|off <代码> | stock pos <代码> <成本|none> [股数]".to_string(),
                )),
            },
            "assign" => match (parts.get(1), parts.get(2)) {
                (Some(symbol), Some(agent)) => Ok(AppCommand::Assign {
                    symbol: symbol.to_string(),
                    agent: agent.to_string(),
                }),
                _ => Ok(AppCommand::Unknown("用法: assign <代码> <agent>".to_string())),
            },
            "unassign" => match (parts.get(1), parts.get(2)) {
                (Some(symbol), Some(agent)) => Ok(AppCommand::Unassign {
                    symbol: symbol.to_string(),
                    agent: agent.to_string(),
                }),
                _ => Ok(AppCommand::Unknown(
                    "用法: unassign <代码> <agent>".to_string(),
                )),
            },
            "override" => {
                let usage = "用法: override <代码> <agent> schedule <表达式|none> | override <代码> <agent> model <id|none> | override <代码> <agent> channels <id,id,...|none> | override <代码> <agent> clear";
                match (parts.get(1), parts.get(2), parts.get(3).map(|s| *s)) {
                    (Some(symbol), Some(agent), Some("schedule")) => {
                        let expr = parts.get(4..).map(|p| p.join(" ")).unwrap_or_default();
                        if expr.is_empty() {
                            Ok(AppCommand::Unknown(usage.to_string()))
                        } else {
                            Ok(AppCommand::OverrideSchedule {
                                symbol: symbol.to_string(),
                                agent: agent.to_string(),
                                expr: (expr != "none").then_some(expr),
                            })
                        }
                    }
                    (Some(symbol), Some(agent), Some("model")) => {
                        match parts.get(4).map(|s| *s) {
                            Some("none") => Ok(AppCommand::OverrideModel {
                                symbol: symbol.to_string(),
                                agent: agent.to_string(),
                                model_id: None,
                            }),
                            Some(id_str) => match id_str.parse::<i32>() {
                                Ok(model_id) => Ok(AppCommand::OverrideModel {
                                    symbol: symbol.to_string(),
                                    agent: agent.to_string(),
                                    model_id: Some(model_id),
                                }),
                                Err(_) => Ok(AppCommand::Unknown(usage.to_string())),
                            },
                            None => Ok(AppCommand::Unknown(usage.to_string())),
                        }
                    }
                    (Some(symbol), Some(agent), Some("channels")) => {
                        match parts.get(4).map(|s| *s) {
                            Some("none") => Ok(AppCommand::OverrideChannels {
                                symbol: symbol.to_string(),
                                agent: agent.to_string(),
                                channel_ids: None,
                            }),
                            Some(ids) => Ok(AppCommand::OverrideChannels {
                                symbol: symbol.to_string(),
                                agent: agent.to_string(),
                                channel_ids: Some(parse_id_list(ids)),
                            }),
                            None => Ok(AppCommand::Unknown(usage.to_string())),
                        }
                    }
                    (Some(symbol), Some(agent), Some("clear")) => Ok(AppCommand::OverrideClear {
                        symbol: symbol.to_string(),
                        agent: agent.to_string(),
                    }),
                    _ => Ok(AppCommand::Unknown(usage.to_string())),
                }
            }
            "models" => Ok(AppCommand::ModelList),
            "model" => match parts.get(1).map(|s| *s) {
                Some("add") => {
                    match (parts.get(2), parts.get(3), parts.get(4), parts.get(5)) {
                        (Some(name), Some(provider), Some(model_name), Some(api_key)) => {
                            Ok(AppCommand::ModelAdd {
                                name: name.to_string(),
                                provider: provider.to_string(),
                                model_name: model_name.to_string(),
                                api_key: api_key.to_string(),
                                base_url: parts.get(6).map(|s| s.to_string()),
                            })
                        }
                        _ => Ok(AppCommand::Unknown(
                            "用法: model add <名称> <provider> <model_name> <api_key> [base_url]"
                                .to_string(),
                        )),
                    }
                }
                Some("default") => match parts.get(2).and_then(|s| s.parse::<i32>().ok()) {
                    Some(id) => Ok(AppCommand::ModelDefault { id }),
                    None => Ok(AppCommand::Unknown("用法: model default <id>".to_string())),
                },
                Some("rm") => match parts.get(2).and_then(|s| s.parse::<i32>().ok()) {
                    Some(id) => Ok(AppCommand::ModelRemove { id }),
                    None => Ok(AppCommand::Unknown("用法: model rm <id>".to_string())),
                },
                _ => Ok(AppCommand::Unknown(
                    "用法: model add <名称> <provider> <model_name> <api_key> [base_url] | model default <id> | model rm <id>".to_string(),
                )),
            },
            "channels" => Ok(AppCommand::ChannelList),
            "channel" => match parts.get(1).map(|s| *s) {
                Some("add") => match (parts.get(2), parts.get(3)) {
                    (Some(name), Some(channel_type)) => {
                        // config 是剩余整段 JSON，可能带空格
                        let config = parts.get(4..).map(|p| p.join(" ")).unwrap_or_default();
                        if config.is_empty() {
                            Ok(AppCommand::Unknown(
                                "用法: channel add <名称> <类型> <config_json>".to_string(),
                            ))
                        } else {
                            Ok(AppCommand::ChannelAdd {
                                name: name.to_string(),
                                channel_type: channel_type.to_string(),
                                config,
                            })
                        }
                    }
                    _ => Ok(AppCommand::Unknown(
                        "用法: channel add <名称> <类型> <config_json>".to_string(),
                    )),
                },
                Some("default") => match parts.get(2).and_then(|s| s.parse::<i32>().ok()) {
                    Some(id) => Ok(AppCommand::ChannelDefault { id }),
                    None => Ok(AppCommand::Unknown("用法: channel default <id>".to_string())),
                },
                Some("on") | Some("off") => {
                    match parts.get(2).and_then(|s| s.parse::<i32>().ok()) {
                        Some(id) => Ok(AppCommand::ChannelEnable {
                            id,
                            enabled: parts[1] == "on",
                        }),
                        None => Ok(AppCommand::Unknown("用法: channel on|off <id>".to_string())),
                    }
                }
                Some("rm") => match parts.get(2).and_then(|s| s.parse::<i32>().ok()) {
                    Some(id) => Ok(AppCommand::ChannelRemove { id }),
                    None => Ok(AppCommand::Unknown("用法: channel rm <id>".to_string())),
                },
                _ => Ok(AppCommand::Unknown(
                    "用法: channel add <名称> <类型> <config_json> | channel default <id> | channel on|off <id> | channel rm <id>".to_string(),
                )),
            },
            "sources" => Ok(AppCommand::SourceList),
            "source" => match parts.get(1).map(|s| *s) {
                Some("on") | Some("off") => {
                    match parts.get(2).and_then(|s| s.parse::<i32>().ok()) {
                        Some(id) => Ok(AppCommand::SourceEnable {
                            id,
                            enabled: parts[1] == "on",
                        }),
                        None => Ok(AppCommand::Unknown("用法: source on|off <id>".to_string())),
                    }
                }
                _ => Ok(AppCommand::Unknown("用法: source on|off <id>".to_string())),
            },
            "runs" => match parts.get(1) {
                None => Ok(AppCommand::Runs {
                    agent: None,
                    limit: 20,
                }),
                Some(tok) => {
                    // 第一个参数是纯数字时当条数
                    if let Ok(limit) = tok.parse::<u64>() {
                        Ok(AppCommand::Runs { agent: None, limit })
                    } else {
                        let limit = parts.get(2).and_then(|s| s.parse().ok()).unwrap_or(20);
                        Ok(AppCommand::Runs {
                            agent: Some(tok.to_string()),
                            limit,
                        })
                    }
                }
            },
            "help" | "h" => Ok(AppCommand::Help),
            "quit" | "q" | "exit" => Ok(AppCommand::Quit),
            _ => Ok(AppCommand::Unknown(format!("未知命令: {}", parts[0]))),
        }
    }
}

fn parse_id_list(s: &str) -> Vec<i32> {
    s.split(',')
        .filter_map(|t| t.trim().parse::<i32>().ok())
        .collect()
}
