use anyhow::Result;
use std::time::Duration;

/// 构建共享 HTTP 客户端。PROXY_URL 非空时所有出站请求走代理，
/// 不带 scheme 的值按 socks5h 处理（域名在代理侧解析）。
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(timeout);

    if let Ok(raw) = std::env::var("PROXY_URL") {
        let t = raw.trim();
        if !t.is_empty() {
            let url = if t.contains("://") {
                t.to_string()
            } else {
                format!("socks5h://{}", t)
            };
            let proxy = reqwest::Proxy::all(&url)?;
            builder = builder.proxy(proxy);
        }
    }

    Ok(builder.build()?)
}
