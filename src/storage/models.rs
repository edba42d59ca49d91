//! 数据模型定义
//!
//! 定义本地缓存所需的行结构，以及与数据库交互的方法。

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use serde::{Deserialize, Serialize};

use crate::storage::StorageResult;

// ============================================================
// Text - 阅读文本
// ============================================================

/// 文本类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextKind {
    /// 普通阅读文本
    Text,
    /// 带练习的新闻文章
    Article,
}

impl TextKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextKind::Text => "text",
            TextKind::Article => "article",
        }
    }

    /// 只有 "article" 被识别为文章，其余一律视为普通文本
    pub fn from_label(label: &str) -> Self {
        if label == "article" {
            TextKind::Article
        } else {
            TextKind::Text
        }
    }
}

/// 阅读文本，同步后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    /// 文本唯一标识 (如 "text_001")
    pub id: String,
    pub kind: TextKind,
    pub title: String,
    /// 导语
    pub lead_text: Option<String>,
    /// 丹麦语正文
    pub content: String,
    /// 英文翻译
    pub translation: Option<String>,
}

impl Text {
    /// 从数据库行解析
    pub fn from_row(row: &Row) -> SqliteResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            kind: TextKind::from_label(&row.get::<_, String>("kind")?),
            title: row.get("title")?,
            lead_text: row.get("lead_text")?,
            content: row.get("content")?,
            translation: row.get("translation")?,
        })
    }

    /// 插入或替换
    pub fn insert(&self, conn: &Connection) -> StorageResult<()> {
        conn.execute(
            r#"
            INSERT OR REPLACE INTO texts (id, kind, title, lead_text, content, translation)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                self.id,
                self.kind.as_str(),
                self.title,
                self.lead_text,
                self.content,
                self.translation,
            ],
        )?;
        Ok(())
    }
}

// ============================================================
// ExerciseRecord - 练习题行
// ============================================================

/// 练习题的持久化形式
///
/// 题型相关的字段（选项、答案、配对、子题等）序列化在 `data_json` 中，
/// 读取时由 [`crate::exercise::decode_exercise`] 解码成领域类型。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseRecord {
    /// 练习唯一标识 (如 "ex_001")
    pub id: String,
    /// 题型标签: multiple_choice / write_word / match_pairs / article
    pub kind: String,
    /// 关联文本 ID
    pub text_id: Option<String>,
    pub question: String,
    /// CEFR 等级 (A1..C2)
    pub level: Option<String>,
    pub data_json: String,
}

impl ExerciseRecord {
    pub fn from_row(row: &Row) -> SqliteResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            kind: row.get("kind")?,
            text_id: row.get("text_id")?,
            question: row.get("question")?,
            level: row.get("level")?,
            data_json: row.get("data_json")?,
        })
    }

    /// 插入或替换
    pub fn insert(&self, conn: &Connection) -> StorageResult<()> {
        conn.execute(
            r#"
            INSERT OR REPLACE INTO exercises (id, kind, text_id, question, level, data_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                self.id,
                self.kind,
                self.text_id,
                self.question,
                self.level,
                self.data_json,
            ],
        )?;
        Ok(())
    }
}

// ============================================================
// UserProgress - 答题进度
// ============================================================

/// 单题的最新答题状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProgress {
    pub exercise_id: String,
    /// 是否已作答
    pub is_completed: bool,
    /// 最近一次作答是否正确
    pub is_correct: bool,
    /// 作答次数
    pub attempts: i32,
    /// 最近一次的答案（旧版字符串格式）
    pub last_answer: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl UserProgress {
    /// 首次作答
    pub fn first_attempt(exercise_id: &str, is_correct: bool, answer: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            exercise_id: exercise_id.to_string(),
            is_completed: true,
            is_correct,
            attempts: 1,
            last_answer: answer.map(str::to_string),
            completed_at: Some(now),
            updated_at: now,
        }
    }

    /// 在已有记录上再作答一次，状态以本次为准
    pub fn record_attempt(&mut self, is_correct: bool, answer: Option<&str>) {
        let now = Utc::now();
        self.is_completed = true;
        self.is_correct = is_correct;
        self.attempts += 1;
        self.last_answer = answer.map(str::to_string);
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    pub fn from_row(row: &Row) -> SqliteResult<Self> {
        Ok(Self {
            exercise_id: row.get("exercise_id")?,
            is_completed: row.get::<_, i32>("is_completed")? != 0,
            is_correct: row.get::<_, i32>("is_correct")? != 0,
            attempts: row.get("attempts")?,
            last_answer: row.get("last_answer")?,
            completed_at: row
                .get::<_, Option<String>>("completed_at")?
                .map(parse_datetime),
            updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
        })
    }

    /// 插入或替换（每题一条）
    pub fn upsert(&self, conn: &Connection) -> StorageResult<()> {
        conn.execute(
            r#"
            INSERT OR REPLACE INTO user_progress (
                exercise_id, is_completed, is_correct, attempts,
                last_answer, completed_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                self.exercise_id,
                self.is_completed as i32,
                self.is_correct as i32,
                self.attempts,
                self.last_answer,
                self.completed_at.map(format_datetime),
                format_datetime(self.updated_at),
            ],
        )?;
        Ok(())
    }
}

// ============================================================
// 辅助函数
// ============================================================

/// 解析日期时间字符串
pub(crate) fn parse_datetime(s: String) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return dt.with_timezone(&Utc);
    }

    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S") {
        return DateTime::from_naive_utc_and_offset(dt, Utc);
    }

    tracing::warn!(value = %s, "unparsable timestamp, using now");
    Utc::now()
}

/// 格式化日期时间 (RFC 3339, 毫秒精度)
pub(crate) fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}
