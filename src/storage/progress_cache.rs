//! 轻量级进度缓存
//!
//! 以 `exercise_<id>` 为键、JSON 为值的 key-value 存储，
//! 保存每题的 `{isCompleted, userAnswer}`，供界面快速恢复作答状态。

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::storage::{StorageError, StorageResult};

const KEY_EXERCISE_PREFIX: &str = "exercise_";

/// 缓存的单题作答状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedProgress {
    pub is_completed: bool,
    pub user_answer: Option<String>,
}

/// 进度缓存仓库
pub struct ProgressCacheRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProgressCacheRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))
    }

    fn key_for(exercise_id: &str) -> String {
        format!("{KEY_EXERCISE_PREFIX}{exercise_id}")
    }

    /// 保存某题的作答状态
    pub fn save(&self, exercise_id: &str, progress: &CachedProgress) -> StorageResult<()> {
        let conn = self.get_conn()?;
        Self::save_internal(&conn, exercise_id, progress)
    }

    /// 批量保存
    pub fn save_all(&self, entries: &[(String, CachedProgress)]) -> StorageResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        for (exercise_id, progress) in entries {
            Self::save_internal(&tx, exercise_id, progress)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// 读取某题的作答状态
    ///
    /// 值损坏时视为没有缓存。
    pub fn load(&self, exercise_id: &str) -> StorageResult<Option<CachedProgress>> {
        let conn = self.get_conn()?;

        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM progress_cache WHERE key = ?1",
                params![Self::key_for(exercise_id)],
                |row| row.get(0),
            )
            .optional()?;

        Ok(raw.and_then(|json| match serde_json::from_str(&json) {
            Ok(progress) => Some(progress),
            Err(e) => {
                tracing::warn!(exercise_id, error = %e, "discarding corrupt cached progress");
                None
            }
        }))
    }

    /// 清除一组练习的缓存
    pub fn remove_set(&self, exercise_ids: &[&str]) -> StorageResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        for exercise_id in exercise_ids {
            removed += tx.execute(
                "DELETE FROM progress_cache WHERE key = ?1",
                params![Self::key_for(exercise_id)],
            )?;
        }
        tx.commit()?;
        Ok(removed)
    }

    /// 清除全部缓存
    pub fn clear_all(&self) -> StorageResult<usize> {
        let conn = self.get_conn()?;
        Ok(conn.execute("DELETE FROM progress_cache", [])?)
    }

    pub(crate) fn save_internal(
        conn: &Connection,
        exercise_id: &str,
        progress: &CachedProgress,
    ) -> StorageResult<()> {
        let json = serde_json::to_string(progress)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT OR REPLACE INTO progress_cache (key, value, updated_at) VALUES (?1, ?2, datetime('now'))",
            params![Self::key_for(exercise_id), json],
        )?;
        Ok(())
    }
}
