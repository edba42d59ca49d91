//! 用户答题进度数据库操作
//!
//! 每道题最多一条记录，后写覆盖。同步不会清空此表，
//! 所以练习 ID 变化后旧进度会成为孤儿记录。

use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::storage::models::UserProgress;
use crate::storage::{StorageError, StorageResult};

/// 用户进度仓库
pub struct UserProgressRepository {
    conn: Arc<Mutex<Connection>>,
}

impl UserProgressRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))
    }

    /// 获取某题的进度
    pub fn get(&self, exercise_id: &str) -> StorageResult<Option<UserProgress>> {
        let conn = self.get_conn()?;
        Self::get_internal(&conn, exercise_id)
    }

    /// 获取全部进度
    pub fn get_all(&self) -> StorageResult<Vec<UserProgress>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT * FROM user_progress ORDER BY exercise_id")?;

        let records = stmt
            .query_map([], |row| UserProgress::from_row(row))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(records)
    }

    /// 写入进度（覆盖同题旧记录）
    pub fn upsert(&self, progress: &UserProgress) -> StorageResult<()> {
        let conn = self.get_conn()?;
        progress.upsert(&conn)
    }

    /// 记录一次作答
    ///
    /// 已有记录时作答次数加一，其余字段以本次为准。
    pub fn record_answer(
        &self,
        exercise_id: &str,
        is_correct: bool,
        answer: Option<&str>,
    ) -> StorageResult<UserProgress> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let progress = Self::record_answer_internal(&tx, exercise_id, is_correct, answer)?;
        tx.commit()?;

        Ok(progress)
    }

    /// 已完成的题数
    pub fn completed_count(&self) -> StorageResult<i64> {
        self.count_where("is_completed = 1")
    }

    /// 答对的题数
    pub fn correct_count(&self) -> StorageResult<i64> {
        self.count_where("is_correct = 1")
    }

    /// 作答过的题数
    pub fn attempted_count(&self) -> StorageResult<i64> {
        self.count_where("1 = 1")
    }

    fn count_where(&self, predicate: &str) -> StorageResult<i64> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT COUNT(*) FROM user_progress WHERE {predicate}");
        Ok(conn.query_row(&sql, [], |row| row.get(0))?)
    }

    /// 删除某题的进度，返回是否删除了记录
    pub fn delete(&self, exercise_id: &str) -> StorageResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "DELETE FROM user_progress WHERE exercise_id = ?1",
            params![exercise_id],
        )?;
        Ok(affected > 0)
    }

    pub fn delete_all(&self) -> StorageResult<usize> {
        let conn = self.get_conn()?;
        Ok(conn.execute("DELETE FROM user_progress", [])?)
    }

    /// 在调用方的事务中记录一次作答
    pub(crate) fn record_answer_internal(
        conn: &Connection,
        exercise_id: &str,
        is_correct: bool,
        answer: Option<&str>,
    ) -> StorageResult<UserProgress> {
        let progress = match Self::get_internal(conn, exercise_id)? {
            Some(mut existing) => {
                existing.record_attempt(is_correct, answer);
                existing
            }
            None => UserProgress::first_attempt(exercise_id, is_correct, answer),
        };
        progress.upsert(conn)?;

        tracing::debug!(
            exercise_id,
            is_correct,
            attempts = progress.attempts,
            "progress recorded"
        );

        Ok(progress)
    }

    fn get_internal(conn: &Connection, exercise_id: &str) -> StorageResult<Option<UserProgress>> {
        let mut stmt = conn.prepare("SELECT * FROM user_progress WHERE exercise_id = ?1")?;
        let mut rows = stmt.query_map(params![exercise_id], |row| UserProgress::from_row(row))?;

        match rows.next() {
            Some(Ok(progress)) => Ok(Some(progress)),
            Some(Err(e)) => Err(StorageError::Database(e)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    #[test]
    fn test_record_answer_creates_then_updates() {
        let storage = Storage::in_memory().unwrap();
        let repo = storage.user_progress();

        let first = repo.record_answer("ex_001", false, Some("0")).unwrap();
        assert_eq!(first.attempts, 1);
        assert!(!first.is_correct);

        let second = repo.record_answer("ex_001", true, Some("1")).unwrap();
        assert_eq!(second.attempts, 2);
        assert!(second.is_correct);

        let stored = repo.get("ex_001").unwrap().unwrap();
        assert_eq!(stored.attempts, 2);
        assert!(stored.is_correct);
        assert_eq!(stored.last_answer.as_deref(), Some("1"));
        assert!(stored.completed_at.is_some());

        // 每题只有一条记录
        assert_eq!(repo.get_all().unwrap().len(), 1);
    }

    #[test]
    fn test_last_write_wins() {
        let storage = Storage::in_memory().unwrap();
        let repo = storage.user_progress();

        repo.record_answer("ex_001", true, Some("1")).unwrap();
        repo.record_answer("ex_001", false, Some("2")).unwrap();

        let stored = repo.get("ex_001").unwrap().unwrap();
        assert!(!stored.is_correct);
        assert_eq!(repo.correct_count().unwrap(), 0);
    }

    #[test]
    fn test_counts() {
        let storage = Storage::in_memory().unwrap();
        let repo = storage.user_progress();

        repo.record_answer("ex_001", true, None).unwrap();
        repo.record_answer("ex_002", false, None).unwrap();
        repo.upsert(&UserProgress {
            is_completed: false,
            ..UserProgress::first_attempt("ex_003", false, None)
        })
        .unwrap();

        assert_eq!(repo.attempted_count().unwrap(), 3);
        assert_eq!(repo.completed_count().unwrap(), 2);
        assert_eq!(repo.correct_count().unwrap(), 1);
    }

    #[test]
    fn test_delete() {
        let storage = Storage::in_memory().unwrap();
        let repo = storage.user_progress();

        repo.record_answer("ex_001", true, None).unwrap();
        repo.record_answer("ex_002", true, None).unwrap();

        assert!(repo.delete("ex_001").unwrap());
        assert!(!repo.delete("ex_001").unwrap());
        assert!(repo.get("ex_001").unwrap().is_none());

        assert_eq!(repo.delete_all().unwrap(), 1);
        assert!(repo.get_all().unwrap().is_empty());
    }
}
