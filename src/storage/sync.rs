//! 同步引擎模块
//!
//! 从固定地址下载 `database.json`，解析后整体替换本地文本与练习题：
//! - 单次无认证 GET，不重试
//! - 解析失败时不做任何删除
//! - `user_progress` 始终保留

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use crate::exercise::{decode_exercise_value, decode_text_value};
use crate::storage::models::{ExerciseRecord, Text};
use crate::storage::{Storage, StorageError, StorageResult, LAST_SYNC_TIME_KEY};

/// 默认的远端练习库地址
pub const DEFAULT_DATABASE_URL: &str =
    "https://raw.githubusercontent.com/luisdecunto/danish-exercises/main/data/exercises/database.json";

/// 同步配置
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 练习库 JSON 地址
    pub database_url: String,
    /// 连接与读取超时（秒）
    pub timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

/// 同步结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    pub success: bool,
    pub new_text_count: usize,
    pub new_exercise_count: usize,
    /// 因格式问题被丢弃的文本数
    pub dropped_text_count: usize,
    /// 因格式问题被丢弃的练习数
    pub dropped_exercise_count: usize,
    pub error_message: Option<String>,
    pub sync_time: DateTime<Utc>,
}

impl SyncResult {
    fn failed(message: String) -> Self {
        Self {
            success: false,
            new_text_count: 0,
            new_exercise_count: 0,
            dropped_text_count: 0,
            dropped_exercise_count: 0,
            error_message: Some(message),
            sync_time: Utc::now(),
        }
    }
}

/// 远端文档顶层结构，记录本身逐条解码
#[derive(Debug, Deserialize)]
struct RawDatabase {
    texts: BTreeMap<String, Value>,
    exercises: Vec<Value>,
}

/// 解析后的远端快照
#[derive(Debug, Clone, Default)]
pub struct ParsedDatabase {
    pub texts: Vec<Text>,
    pub exercises: Vec<ExerciseRecord>,
    pub dropped_texts: usize,
    pub dropped_exercises: usize,
}

/// 解析远端文档
///
/// 顶层结构不合法返回 `StorageError::Serialization`；单条记录不合法只丢弃该条。
/// 同 ID 的练习后者覆盖前者；引用了不存在文本的练习保留，但去掉引用。
pub fn parse_database(body: &str) -> StorageResult<ParsedDatabase> {
    let raw: RawDatabase = serde_json::from_str(body)
        .map_err(|e| StorageError::Serialization(format!("解析数据库 JSON 失败: {}", e)))?;

    let mut parsed = ParsedDatabase::default();

    let mut text_positions: HashMap<String, usize> = HashMap::new();
    for (key, value) in raw.texts {
        match decode_text_value(&key, value) {
            Ok(text) => match text_positions.get(&text.id) {
                Some(&pos) => {
                    tracing::warn!(text_id = %text.id, "duplicate text id, keeping the later one");
                    parsed.texts[pos] = text;
                    parsed.dropped_texts += 1;
                }
                None => {
                    text_positions.insert(text.id.clone(), parsed.texts.len());
                    parsed.texts.push(text);
                }
            },
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "dropping malformed text");
                parsed.dropped_texts += 1;
            }
        }
    }

    let text_ids: HashSet<&str> = parsed.texts.iter().map(|t| t.id.as_str()).collect();
    let mut exercise_positions: HashMap<String, usize> = HashMap::new();

    for value in raw.exercises {
        let id_hint = value
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("<missing>")
            .to_string();

        let mut record = match decode_exercise_value(value) {
            Ok((record, _)) => record,
            Err(e) => {
                tracing::warn!(exercise_id = %id_hint, error = %e, "dropping undecodable exercise");
                parsed.dropped_exercises += 1;
                continue;
            }
        };

        if let Some(text_id) = record.text_id.as_deref() {
            if !text_ids.contains(text_id) {
                tracing::warn!(
                    exercise_id = %record.id,
                    text_id,
                    "exercise references unknown text, clearing reference"
                );
                record.text_id = None;
            }
        }

        match exercise_positions.get(&record.id) {
            Some(&pos) => {
                tracing::warn!(exercise_id = %record.id, "duplicate exercise id, keeping the later one");
                parsed.exercises[pos] = record;
                parsed.dropped_exercises += 1;
            }
            None => {
                exercise_positions.insert(record.id.clone(), parsed.exercises.len());
                parsed.exercises.push(record);
            }
        }
    }

    Ok(parsed)
}

/// 同步引擎
pub struct SyncEngine {
    config: SyncConfig,
    client: Client,
}

impl SyncEngine {
    /// 使用配置创建同步引擎
    pub fn new(config: SyncConfig) -> StorageResult<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| StorageError::Network(format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// 下载练习库文档
    pub async fn fetch_database(&self) -> StorageResult<String> {
        let response = self
            .client
            .get(&self.config.database_url)
            .send()
            .await
            .map_err(|e| StorageError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Sync(format!("下载练习库失败: HTTP {}", status)));
        }

        response
            .text()
            .await
            .map_err(|e| StorageError::Network(e.to_string()))
    }

    /// 执行完整同步
    ///
    /// 任何错误都转换为 `success = false` 的结果，不会返回 `Err`。
    pub async fn sync(&self, storage: &Storage) -> SyncResult {
        tracing::info!(url = %self.config.database_url, "starting sync");

        let result = match self.fetch_database().await {
            Ok(body) => Self::apply_document(storage, &body),
            Err(e) => Err(e),
        };

        match result {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "sync failed");
                SyncResult::failed(e.to_string())
            }
        }
    }

    /// 解析文档并替换本地数据
    ///
    /// 先完整解析，成功后才在一个事务中删旧插新。
    pub fn apply_document(storage: &Storage, body: &str) -> StorageResult<SyncResult> {
        let parsed = parse_database(body)?;

        let before = storage.exercises().count().unwrap_or(0);
        storage.replace_content(&parsed.texts, &parsed.exercises)?;

        let sync_time = Utc::now();
        if let Err(e) = storage.set_sync_metadata(LAST_SYNC_TIME_KEY, &sync_time.to_rfc3339()) {
            tracing::warn!(error = %e, "failed to record sync time");
        }

        tracing::info!(
            previous_exercises = before,
            texts = parsed.texts.len(),
            exercises = parsed.exercises.len(),
            dropped_texts = parsed.dropped_texts,
            dropped_exercises = parsed.dropped_exercises,
            "sync applied"
        );

        Ok(SyncResult {
            success: true,
            new_text_count: parsed.texts.len(),
            new_exercise_count: parsed.exercises.len(),
            dropped_text_count: parsed.dropped_texts,
            dropped_exercise_count: parsed.dropped_exercises,
            error_message: None,
            sync_time,
        })
    }

    /// 读取上次成功同步的时间
    pub fn last_sync_time(storage: &Storage) -> StorageResult<Option<DateTime<Utc>>> {
        match storage.get_sync_metadata(LAST_SYNC_TIME_KEY)? {
            Some(value) => {
                let dt = DateTime::parse_from_rfc3339(&value)
                    .map_err(|e| StorageError::Sync(format!("解析同步时间失败: {}", e)))?;
                Ok(Some(dt.with_timezone(&Utc)))
            }
            None => Ok(None),
        }
    }
}
