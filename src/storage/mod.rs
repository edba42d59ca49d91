//! SQLite 本地缓存模块
//!
//! 提供练习数据的本地持久化，支持：
//! - 文本、练习题的整体替换式同步
//! - 用户答题进度（每题一条，后写覆盖）
//! - 轻量级的 key-value 进度缓存

// ============================================================
// 子模块声明
// ============================================================

pub mod exercise;
pub mod migrations;
pub mod models;
pub mod progress_cache;
pub mod sync;
pub mod text;
pub mod user_progress;

// ============================================================
// 重新导出主要类型
// ============================================================

pub use exercise::ExerciseRepository;
pub use migrations::run_migrations;
pub use models::*;
pub use progress_cache::{CachedProgress, ProgressCacheRepository};
pub use sync::{SyncConfig, SyncEngine, SyncResult};
pub use text::TextRepository;
pub use user_progress::UserProgressRepository;

// ============================================================
// 依赖导入
// ============================================================

use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

// ============================================================
// 错误类型定义
// ============================================================

/// 存储模块错误类型
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("数据库错误: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("迁移错误: {0}")]
    Migration(String),

    #[error("同步错误: {0}")]
    Sync(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("数据未找到: {0}")]
    NotFound(String),

    #[error("答案无法保存: {0}")]
    InvalidAnswer(String),

    #[error("锁获取失败: {0}")]
    LockError(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// 同步元数据中的上次同步时间键
pub const LAST_SYNC_TIME_KEY: &str = "last_sync_time";

// ============================================================
// Storage - 统一存储结构体
// ============================================================

/// 统一存储结构体
///
/// 持有共享连接，按需创建各个 Repository。
pub struct Storage {
    conn: Arc<Mutex<Connection>>,
    db_path: String,
}

impl Storage {
    /// 打开（或创建）数据库文件并运行迁移
    pub fn new<P: AsRef<Path>>(db_path: P) -> StorageResult<Self> {
        let path_str = db_path.as_ref().to_string_lossy().to_string();
        let connection = Connection::open(&db_path)?;

        connection.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )?;

        Self::from_connection(connection, path_str)
    }

    /// 创建内存数据库（用于测试）
    pub fn in_memory() -> StorageResult<Self> {
        let connection = Connection::open_in_memory()?;
        connection.execute_batch("PRAGMA foreign_keys=ON;")?;

        Self::from_connection(connection, ":memory:".to_string())
    }

    fn from_connection(connection: Connection, db_path: String) -> StorageResult<Self> {
        let conn = Arc::new(Mutex::new(connection));

        {
            let guard = conn
                .lock()
                .map_err(|e| StorageError::LockError(e.to_string()))?;
            migrations::run_migrations(&guard)?;
        }

        Ok(Self { conn, db_path })
    }

    /// 获取数据库连接
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    /// 获取数据库路径
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    pub fn texts(&self) -> TextRepository {
        TextRepository::new(Arc::clone(&self.conn))
    }

    pub fn exercises(&self) -> ExerciseRepository {
        ExerciseRepository::new(Arc::clone(&self.conn))
    }

    pub fn user_progress(&self) -> UserProgressRepository {
        UserProgressRepository::new(Arc::clone(&self.conn))
    }

    pub fn progress_cache(&self) -> ProgressCacheRepository {
        ProgressCacheRepository::new(Arc::clone(&self.conn))
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))
    }

    /// 执行事务
    ///
    /// 闭包返回错误时事务回滚。
    pub fn transaction<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Connection) -> StorageResult<T>,
    {
        let mut conn = self.lock()?;

        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;

        Ok(result)
    }

    /// 整体替换文本和练习题
    ///
    /// 在同一事务中先删后插：练习题引用文本，所以先删练习再删文本，
    /// 先插文本再插练习。`user_progress` 不受影响。
    pub fn replace_content(
        &self,
        texts: &[Text],
        exercises: &[ExerciseRecord],
    ) -> StorageResult<()> {
        self.transaction(|conn| {
            ExerciseRepository::delete_all_internal(conn)?;
            TextRepository::delete_all_internal(conn)?;
            TextRepository::insert_all_internal(conn, texts)?;
            ExerciseRepository::insert_all_internal(conn, exercises)?;
            Ok(())
        })
    }

    // ========== 同步元数据操作 ==========

    /// 获取同步元数据，不存在或值为 NULL 时返回 None
    pub fn get_sync_metadata(&self, key: &str) -> StorageResult<Option<String>> {
        let conn = self.lock()?;

        let result: Option<Option<String>> = conn
            .query_row(
                "SELECT value FROM sync_metadata WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;

        Ok(result.flatten())
    }

    /// 设置同步元数据（插入或更新）
    pub fn set_sync_metadata(&self, key: &str, value: &str) -> StorageResult<()> {
        let conn = self.lock()?;

        conn.execute(
            "INSERT OR REPLACE INTO sync_metadata (key, value, updated_at) VALUES (?1, ?2, datetime('now'))",
            [key, value],
        )?;

        Ok(())
    }
}

// ============================================================
// 测试
// ============================================================
