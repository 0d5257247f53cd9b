//! CLI 日志初始化
//!
//! 基于 `tracing-subscriber`，引擎各阶段的 target 单独设档。

use std::io;

use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer};

/// 装上全局 subscriber；`debug` 打开引擎内部的调试输出
pub fn init(debug: bool) {
    let engine_level = if debug {
        LevelFilter::TRACE
    } else {
        LevelFilter::WARN
    };

    let targets = Targets::new()
        .with_default(LevelFilter::WARN)
        .with_target("kabap::lexer", engine_level)
        .with_target("kabap::optimiser", engine_level)
        .with_target("kabap::executor", engine_level)
        .with_target("kabap::extension", engine_level);

    let stderr_layer = fmt::layer()
        .compact()
        .without_time()
        .with_target(true)
        .with_writer(io::stderr)
        .with_filter(targets);

    tracing_subscriber::registry().with(stderr_layer).init();
}
