//! tracing 初始化
//!
//! 标准输出始终开启；`Config::file_logs` 为真时另写一份按天滚动的日志到 `Config::log_dir`。

use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, DEFAULT_LOG_FILTER};

const LOG_FILE_PREFIX: &str = "dansk-quiz.log";

/// 持有文件日志的后台写线程，丢弃时刷新剩余日志
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

/// 安装全局 subscriber
///
/// 已安装过时只打印提示，返回 `None`。
pub fn init_tracing(config: &Config) -> Option<FileLogGuard> {
    let env_filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|err| {
        eprintln!("invalid log filter {:?}: {err}", config.log_level);
        EnvFilter::new(DEFAULT_LOG_FILTER)
    });

    let (file_layer, guard) = match file_writer(config) {
        Some((writer, guard)) => (
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true),
            ),
            Some(FileLogGuard { _guard: guard }),
        ),
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .try_init();

    if let Err(err) = installed {
        eprintln!("tracing already initialized: {err}");
        return None;
    }

    guard
}

fn file_writer(config: &Config) -> Option<(NonBlocking, WorkerGuard)> {
    if !config.file_logs {
        return None;
    }

    let appender = rolling_appender(&config.log_dir)?;
    Some(tracing_appender::non_blocking(appender))
}

/// 创建日志目录和滚动文件，目录不可用时退回只写标准输出
fn rolling_appender(log_dir: &Path) -> Option<RollingFileAppender> {
    if let Err(err) = std::fs::create_dir_all(log_dir) {
        eprintln!("failed to create log directory {}: {err}", log_dir.display());
        return None;
    }
    Some(RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_PREFIX))
}
