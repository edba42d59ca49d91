//! 远端 JSON 与本地行 -> 领域类型的转换
//!
//! 远端文档里每条练习题带 `type` 判别字段，其余字段按题型取用。
//! 转换分两步：
//! 1. [`exercise_record_from_json`]：只保留该题型用到的字段，序列化进 `data_json`
//! 2. [`decode_exercise`]：从行解码出 [`Exercise`]，校验必填字段与下标范围
//!
//! 任何一步失败都只丢弃这一条记录，由调用方记录日志。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use super::{ArticleSubExercise, Exercise, ExerciseKind, ExerciseType};
use crate::storage::models::{ExerciseRecord, Text, TextKind};

/// 单条记录的解码错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("未知题型: {0}")]
    UnknownKind(String),

    #[error("缺少字段: {0}")]
    MissingField(&'static str),

    #[error("字段 {field} 无效: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("字段 {field} 下标越界: {index} (共 {len} 项)")]
    OutOfRange {
        field: &'static str,
        index: usize,
        len: usize,
    },

    #[error("记录格式错误: {0}")]
    Malformed(String),
}

// ============================================================
// 远端 JSON 结构
// ============================================================

/// 远端文本
#[derive(Debug, Clone, Deserialize)]
pub struct TextJson {
    /// 缺省时使用 `texts` 映射中的键
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub title: String,
    /// 导语
    pub pompadour: Option<String>,
    pub content: String,
    pub translation: Option<String>,
}

/// 连线题的一对
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairJson {
    pub left: String,
    pub right: String,
}

/// 文章子题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubExerciseJson {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default, rename = "correctIndex")]
    pub correct_index: Option<Value>,
    #[serde(default, rename = "correctAnswer")]
    pub correct_answer: Option<String>,
}

/// 远端练习题，包含所有题型的字段
#[derive(Debug, Clone, Deserialize)]
pub struct ExerciseJson {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text_id: Option<String>,
    pub question: String,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    /// 单选为数字下标，填空为字符串
    #[serde(default)]
    pub correct: Option<Value>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub accept_variants: Option<Vec<String>>,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub pairs: Option<Vec<PairJson>>,
    #[serde(default, rename = "subExercises")]
    pub sub_exercises: Option<Vec<SubExerciseJson>>,
}

/// `data_json` 中保存的题型相关字段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ExerciseData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correct: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    accept_variants: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pairs: Option<Vec<PairJson>>,
    #[serde(default, rename = "subExercises", skip_serializing_if = "Option::is_none")]
    sub_exercises: Option<Vec<SubExerciseJson>>,
}

// ============================================================
// 文本
// ============================================================

/// 解码 `texts` 映射中的一项
pub fn decode_text_value(key: &str, value: Value) -> Result<Text, DecodeError> {
    let json: TextJson =
        serde_json::from_value(value).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    Ok(Text {
        id: json.id.unwrap_or_else(|| key.to_string()),
        kind: json
            .kind
            .as_deref()
            .map(TextKind::from_label)
            .unwrap_or(TextKind::Text),
        title: json.title,
        lead_text: json.pompadour,
        content: json.content,
        translation: json.translation,
    })
}

// ============================================================
// 练习题
// ============================================================

/// 远端练习题 -> 持久化行
///
/// 只保留该题型用到的字段；未知题型的 `data_json` 只带讲解，解码时会被丢弃。
pub fn exercise_record_from_json(json: ExerciseJson) -> ExerciseRecord {
    let mut data = ExerciseData {
        explanation: json.explanation,
        ..Default::default()
    };

    match ExerciseType::from_label(&json.kind) {
        Some(ExerciseType::MultipleChoice) => {
            data.options = json.options;
            data.correct = json.correct;
        }
        Some(ExerciseType::FillInBlank) => {
            data.correct = json.correct;
            data.accept_variants = json.accept_variants;
            data.hint = json.hint;
        }
        Some(ExerciseType::MatchPairs) => {
            data.pairs = json.pairs;
        }
        Some(ExerciseType::Article) => {
            data.sub_exercises = json.sub_exercises;
        }
        None => {}
    }

    // ExerciseData 只含字符串、数组和 JSON 值，序列化不会失败
    let data_json = serde_json::to_string(&data).unwrap_or_else(|_| "{}".to_string());

    ExerciseRecord {
        id: json.id,
        kind: json.kind,
        text_id: json.text_id,
        question: json.question,
        level: json.level,
        data_json,
    }
}

/// 解码远端文档中的一条练习题，返回待写入的行和校验过的领域对象
pub fn decode_exercise_value(value: Value) -> Result<(ExerciseRecord, Exercise), DecodeError> {
    let json: ExerciseJson =
        serde_json::from_value(value).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let record = exercise_record_from_json(json);
    let exercise = decode_exercise(&record)?;

    Ok((record, exercise))
}

/// 从持久化行解码练习题
pub fn decode_exercise(record: &ExerciseRecord) -> Result<Exercise, DecodeError> {
    let exercise_type = ExerciseType::from_label(&record.kind)
        .ok_or_else(|| DecodeError::UnknownKind(record.kind.clone()))?;

    let data: ExerciseData = serde_json::from_str(&record.data_json)
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let explanation = data.explanation.clone();

    let kind = match exercise_type {
        ExerciseType::MultipleChoice => {
            let options = require_non_empty(data.options, "options")?;
            let correct_index = coerce_index(require(data.correct.as_ref(), "correct")?, "correct")?;
            check_range("correct", correct_index, options.len())?;
            ExerciseKind::MultipleChoice {
                options,
                correct_index,
            }
        }
        ExerciseType::FillInBlank => {
            let correct_answer = match require(data.correct, "correct")? {
                Value::String(s) => s,
                other => {
                    return Err(DecodeError::InvalidField {
                        field: "correct",
                        reason: format!("应为字符串，实际为 {other}"),
                    })
                }
            };
            ExerciseKind::FillInBlank {
                correct_answer,
                hint: data.hint,
            }
        }
        ExerciseType::MatchPairs => {
            let pairs = require_non_empty(data.pairs, "pairs")?;
            // 远端按正确配对顺序列出，正确答案即恒等映射
            let correct_pairs: BTreeMap<usize, usize> = (0..pairs.len()).map(|i| (i, i)).collect();
            let (left_items, right_items) = pairs.into_iter().map(|p| (p.left, p.right)).unzip();
            ExerciseKind::MatchPairs {
                left_items,
                right_items,
                correct_pairs,
            }
        }
        ExerciseType::Article => {
            let subs = require_non_empty(data.sub_exercises, "subExercises")?;
            let sub_exercises = subs
                .into_iter()
                .map(decode_sub_exercise)
                .collect::<Result<Vec<_>, _>>()?;
            ExerciseKind::Article { sub_exercises }
        }
    };

    Ok(Exercise {
        id: record.id.clone(),
        question: record.question.clone(),
        level: record.level.clone(),
        explanation,
        text_id: record.text_id.clone(),
        kind,
    })
}

fn decode_sub_exercise(json: SubExerciseJson) -> Result<ArticleSubExercise, DecodeError> {
    let question = json.question.unwrap_or_default();

    match json.kind.as_str() {
        "multiple_choice" => {
            let options = require_non_empty(json.options, "subExercises.options")?;
            let correct_index = coerce_index(
                require(json.correct_index.as_ref(), "subExercises.correctIndex")?,
                "subExercises.correctIndex",
            )?;
            check_range("subExercises.correctIndex", correct_index, options.len())?;
            Ok(ArticleSubExercise::MultipleChoice {
                question,
                options,
                correct_index,
            })
        }
        "open_ended" => Ok(ArticleSubExercise::OpenEnded {
            question,
            correct_answer: require(json.correct_answer, "subExercises.correctAnswer")?,
        }),
        other => Err(DecodeError::UnknownKind(format!("subExercises.{other}"))),
    }
}

// ============================================================
// 辅助函数
// ============================================================

fn require<T>(value: Option<T>, field: &'static str) -> Result<T, DecodeError> {
    value.ok_or(DecodeError::MissingField(field))
}

fn require_non_empty<T>(value: Option<Vec<T>>, field: &'static str) -> Result<Vec<T>, DecodeError> {
    let items = require(value, field)?;
    if items.is_empty() {
        return Err(DecodeError::InvalidField {
            field,
            reason: "不能为空".to_string(),
        });
    }
    Ok(items)
}

fn check_range(field: &'static str, index: usize, len: usize) -> Result<(), DecodeError> {
    if index < len {
        Ok(())
    } else {
        Err(DecodeError::OutOfRange { field, index, len })
    }
}

/// 把 JSON 数字转为下标，`1.0` 这类整数值的浮点数同样接受
fn coerce_index(value: &Value, field: &'static str) -> Result<usize, DecodeError> {
    let invalid = || DecodeError::InvalidField {
        field,
        reason: format!("{value} 不是非负整数"),
    };

    let Value::Number(number) = value else {
        return Err(invalid());
    };

    if let Some(n) = number.as_u64() {
        return usize::try_from(n).map_err(|_| invalid());
    }

    match number.as_f64() {
        Some(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 => {
            Ok(f as usize)
        }
        _ => Err(invalid()),
    }
}
