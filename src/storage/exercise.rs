//! 练习题数据库操作

use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::storage::models::ExerciseRecord;
use crate::storage::{StorageError, StorageResult};

/// 练习题仓库
pub struct ExerciseRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ExerciseRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))
    }

    fn query(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> StorageResult<Vec<ExerciseRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(sql)?;

        let records = stmt
            .query_map(args, |row| ExerciseRecord::from_row(row))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(records)
    }

    /// 获取所有练习，按 ID 排序
    pub fn get_all(&self) -> StorageResult<Vec<ExerciseRecord>> {
        self.query("SELECT * FROM exercises ORDER BY id", &[])
    }

    /// 根据 ID 获取练习
    pub fn get_by_id(&self, id: &str) -> StorageResult<Option<ExerciseRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT * FROM exercises WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], |row| ExerciseRecord::from_row(row))?;

        match rows.next() {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => Err(StorageError::Database(e)),
            None => Ok(None),
        }
    }

    /// 获取引用某篇文本的练习
    pub fn get_by_text_id(&self, text_id: &str) -> StorageResult<Vec<ExerciseRecord>> {
        self.query(
            "SELECT * FROM exercises WHERE text_id = ?1 ORDER BY id",
            &[&text_id],
        )
    }

    /// 获取不依赖文本的独立练习
    pub fn get_standalone(&self) -> StorageResult<Vec<ExerciseRecord>> {
        self.query("SELECT * FROM exercises WHERE text_id IS NULL ORDER BY id", &[])
    }

    pub fn count(&self) -> StorageResult<i64> {
        let conn = self.get_conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM exercises", [], |row| row.get(0))?)
    }

    /// 批量写入（同 ID 覆盖）
    pub fn insert_all(&self, records: &[ExerciseRecord]) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        Self::insert_all_internal(&tx, records)?;
        tx.commit()?;

        Ok(())
    }

    /// 删除所有练习
    pub fn delete_all(&self) -> StorageResult<usize> {
        let conn = self.get_conn()?;
        Self::delete_all_internal(&conn)
    }

    // ============================================================
    // 内部方法（可在事务中使用）
    // ============================================================

    pub(crate) fn insert_all_internal(
        conn: &Connection,
        records: &[ExerciseRecord],
    ) -> StorageResult<()> {
        for record in records {
            record.insert(conn)?;
        }
        Ok(())
    }

    pub(crate) fn delete_all_internal(conn: &Connection) -> StorageResult<usize> {
        Ok(conn.execute("DELETE FROM exercises", [])?)
    }
}
