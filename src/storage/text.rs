//! 文本数据库操作

use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::storage::models::{Text, TextKind};
use crate::storage::{StorageError, StorageResult};

/// 文本仓库
///
/// 文本只在同步时整体写入，其余时间只读。
pub struct TextRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TextRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))
    }

    /// 获取所有文本，按 ID 排序
    pub fn get_all(&self) -> StorageResult<Vec<Text>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT * FROM texts ORDER BY id")?;

        let texts = stmt
            .query_map([], |row| Text::from_row(row))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(texts)
    }

    /// 根据 ID 获取文本
    pub fn get_by_id(&self, id: &str) -> StorageResult<Option<Text>> {
        let conn = self.get_conn()?;
        Self::get_by_id_internal(&conn, id)
    }

    /// 获取所有文章类文本，按 ID 排序
    pub fn get_articles(&self) -> StorageResult<Vec<Text>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT * FROM texts WHERE kind = ?1 ORDER BY id")?;

        let texts = stmt
            .query_map(params![TextKind::Article.as_str()], |row| Text::from_row(row))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(texts)
    }

    /// 批量写入（同 ID 覆盖）
    pub fn insert_all(&self, texts: &[Text]) -> StorageResult<()> {
        if texts.is_empty() {
            return Ok(());
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        Self::insert_all_internal(&tx, texts)?;
        tx.commit()?;

        Ok(())
    }

    /// 删除所有文本
    pub fn delete_all(&self) -> StorageResult<usize> {
        let conn = self.get_conn()?;
        Self::delete_all_internal(&conn)
    }

    // ============================================================
    // 内部方法（可在事务中使用）
    // ============================================================

    pub(crate) fn get_by_id_internal(conn: &Connection, id: &str) -> StorageResult<Option<Text>> {
        let mut stmt = conn.prepare("SELECT * FROM texts WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], |row| Text::from_row(row))?;

        match rows.next() {
            Some(Ok(text)) => Ok(Some(text)),
            Some(Err(e)) => Err(StorageError::Database(e)),
            None => Ok(None),
        }
    }

    pub(crate) fn insert_all_internal(conn: &Connection, texts: &[Text]) -> StorageResult<()> {
        for text in texts {
            text.insert(conn)?;
        }
        Ok(())
    }

    pub(crate) fn delete_all_internal(conn: &Connection) -> StorageResult<usize> {
        Ok(conn.execute("DELETE FROM texts", [])?)
    }
}
