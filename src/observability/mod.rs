//! 可观测性：tracing 订阅器初始化
//!
//! RUST_LOG 未设置时默认 info；能力审计日志以 `audit=<json>` 字段输出（见 tools::executor）。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
