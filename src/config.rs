use std::path::PathBuf;

use crate::storage::sync::DEFAULT_DATABASE_URL;
use crate::storage::SyncConfig;

/// 未设置 `RUST_LOG` 时的过滤规则：本 crate 输出 info，依赖只输出 warn
pub const DEFAULT_LOG_FILTER: &str = "warn,dansk_quiz_lib=info,dansk_quiz=info";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_path: PathBuf,
    pub sync_timeout_secs: u64,
    pub log_level: String,
    /// 是否额外写入按天滚动的日志文件
    pub file_logs: bool,
    pub log_dir: PathBuf,
}

impl Config {
    /// 读取 `.env`（若存在）后再从环境变量构建
    pub fn load() -> Self {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                eprintln!("failed to load .env: {err}");
            }
        }
        Self::from_env()
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let database_url = lookup("DANSK_DATABASE_URL")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let db_path = lookup("DANSK_DB_PATH")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("dansk-quiz.db"));

        let sync_timeout_secs = lookup("DANSK_SYNC_TIMEOUT_SECS")
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(30);

        let log_level = lookup("RUST_LOG")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let file_logs = lookup("ENABLE_FILE_LOGS")
            .map(|value| value == "true" || value == "1")
            .unwrap_or(false);

        let log_dir = lookup("LOG_DIR")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./logs"));

        Self {
            database_url,
            db_path,
            sync_timeout_secs,
            log_level,
            file_logs,
            log_dir,
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            database_url: self.database_url.clone(),
            timeout_secs: self.sync_timeout_secs,
        }
    }
}
