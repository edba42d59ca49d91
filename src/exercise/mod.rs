//! 练习题领域模型
//!
//! 四种题型用一个和类型表示，判题按题型分派：
//! - 单选：所选下标等于正确下标
//! - 填空：去掉首尾空白后忽略大小写相等
//! - 连线：作答映射与正确映射完全相同
//! - 文章：子题逐个按各自规则判定，数量必须一致

pub mod answer;
pub mod decode;

pub use answer::{Answer, SubAnswer};
pub use decode::{
    decode_exercise, decode_exercise_value, decode_text_value, exercise_record_from_json,
    DecodeError, ExerciseJson, PairJson, SubExerciseJson, TextJson,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 题型标签（与远端 JSON 的 `type` 字段对应）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExerciseType {
    #[serde(rename = "multiple_choice")]
    MultipleChoice,
    #[serde(rename = "write_word")]
    FillInBlank,
    #[serde(rename = "match_pairs")]
    MatchPairs,
    #[serde(rename = "article")]
    Article,
}

impl ExerciseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExerciseType::MultipleChoice => "multiple_choice",
            ExerciseType::FillInBlank => "write_word",
            ExerciseType::MatchPairs => "match_pairs",
            ExerciseType::Article => "article",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "multiple_choice" => Some(ExerciseType::MultipleChoice),
            "write_word" => Some(ExerciseType::FillInBlank),
            "match_pairs" => Some(ExerciseType::MatchPairs),
            "article" => Some(ExerciseType::Article),
            _ => None,
        }
    }
}

impl fmt::Display for ExerciseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一道练习题
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exercise {
    pub id: String,
    pub question: String,
    /// CEFR 等级
    pub level: Option<String>,
    /// 作答后展示的讲解
    pub explanation: Option<String>,
    /// 关联的阅读文本
    pub text_id: Option<String>,
    pub kind: ExerciseKind,
}

/// 题型相关数据
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExerciseKind {
    MultipleChoice {
        options: Vec<String>,
        correct_index: usize,
    },
    FillInBlank {
        correct_answer: String,
        hint: Option<String>,
    },
    MatchPairs {
        left_items: Vec<String>,
        right_items: Vec<String>,
        /// 左侧下标 -> 右侧下标，覆盖 `0..left_items.len()` 的双射
        correct_pairs: BTreeMap<usize, usize>,
    },
    Article {
        sub_exercises: Vec<ArticleSubExercise>,
    },
}

/// 文章题中的子题
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArticleSubExercise {
    MultipleChoice {
        question: String,
        options: Vec<String>,
        correct_index: usize,
    },
    OpenEnded {
        question: String,
        correct_answer: String,
    },
}

impl Exercise {
    pub fn exercise_type(&self) -> ExerciseType {
        self.kind.exercise_type()
    }

    pub fn is_article(&self) -> bool {
        matches!(self.kind, ExerciseKind::Article { .. })
    }

    /// 判定结构化答案
    pub fn check(&self, answer: &Answer) -> bool {
        self.kind.check(answer)
    }

    /// 判定旧版字符串答案，格式不合法时判错，不会 panic
    pub fn check_answer(&self, raw: &str) -> bool {
        Answer::parse_legacy(&self.kind, raw).is_some_and(|answer| self.check(&answer))
    }
}

impl ExerciseKind {
    pub fn exercise_type(&self) -> ExerciseType {
        match self {
            ExerciseKind::MultipleChoice { .. } => ExerciseType::MultipleChoice,
            ExerciseKind::FillInBlank { .. } => ExerciseType::FillInBlank,
            ExerciseKind::MatchPairs { .. } => ExerciseType::MatchPairs,
            ExerciseKind::Article { .. } => ExerciseType::Article,
        }
    }

    pub fn check(&self, answer: &Answer) -> bool {
        match (self, answer) {
            (ExerciseKind::MultipleChoice { correct_index, .. }, Answer::Selected(index)) => {
                index == correct_index
            }
            (ExerciseKind::FillInBlank { correct_answer, .. }, Answer::Text(text)) => {
                answers_match(text, correct_answer)
            }
            (ExerciseKind::MatchPairs { correct_pairs, .. }, Answer::Pairs(pairs)) => {
                pairs == correct_pairs
            }
            (ExerciseKind::Article { sub_exercises }, Answer::Article(answers)) => {
                answers.len() == sub_exercises.len()
                    && sub_exercises
                        .iter()
                        .zip(answers)
                        .all(|(sub, answer)| sub.check(answer))
            }
            _ => false,
        }
    }

    /// 本题的标准答案
    pub fn solution(&self) -> Answer {
        match self {
            ExerciseKind::MultipleChoice { correct_index, .. } => Answer::Selected(*correct_index),
            ExerciseKind::FillInBlank { correct_answer, .. } => {
                Answer::Text(correct_answer.clone())
            }
            ExerciseKind::MatchPairs { correct_pairs, .. } => Answer::Pairs(correct_pairs.clone()),
            ExerciseKind::Article { sub_exercises } => {
                Answer::Article(sub_exercises.iter().map(ArticleSubExercise::solution).collect())
            }
        }
    }
}

impl ArticleSubExercise {
    pub fn question(&self) -> &str {
        match self {
            ArticleSubExercise::MultipleChoice { question, .. }
            | ArticleSubExercise::OpenEnded { question, .. } => question,
        }
    }

    pub fn check(&self, answer: &SubAnswer) -> bool {
        match (self, answer) {
            (ArticleSubExercise::MultipleChoice { correct_index, .. }, SubAnswer::Selected(index)) => {
                index == correct_index
            }
            (ArticleSubExercise::OpenEnded { correct_answer, .. }, SubAnswer::Text(text)) => {
                answers_match(text, correct_answer)
            }
            _ => false,
        }
    }

    pub fn solution(&self) -> SubAnswer {
        match self {
            ArticleSubExercise::MultipleChoice { correct_index, .. } => {
                SubAnswer::Selected(*correct_index)
            }
            ArticleSubExercise::OpenEnded { correct_answer, .. } => {
                SubAnswer::Text(correct_answer.clone())
            }
        }
    }
}

/// 文字答案比较：去掉首尾空白，忽略大小写
pub fn answers_match(given: &str, expected: &str) -> bool {
    given.trim().to_lowercase() == expected.trim().to_lowercase()
}
