//! 可观测性：tracing 订阅器初始化
//!
//! 默认 info，RUST_LOG 可覆盖；日志写 stderr，stdout 留给事件输出。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // 重复初始化（如多个测试）时保持第一次的订阅器
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
