//! 进度统计与概览
//!
//! 进度记录按练习 ID 关联；已不存在的练习的记录一律忽略。

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::exercise::{Exercise, ExerciseType};
use crate::storage::{Text, TextKind, UserProgress};

/// 无等级练习的分组名
pub const UNKNOWN_LEVEL: &str = "Unknown";

const CEFR_ORDER: [&str; 6] = ["A1", "A2", "B1", "B2", "C1", "C2"];

/// 百分比，向下取整；总数为 0 时为 0
pub fn percent(count: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (count * 100 / total) as u32
}

fn index_progress(progress: &[UserProgress]) -> HashMap<&str, &UserProgress> {
    progress.iter().map(|p| (p.exercise_id.as_str(), p)).collect()
}

/// 单题状态（概览网格中的颜色）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseStatus {
    Unattempted,
    Correct,
    Incorrect,
}

impl ExerciseStatus {
    pub fn from_progress(progress: Option<&UserProgress>) -> Self {
        match progress {
            Some(p) if p.is_correct => ExerciseStatus::Correct,
            Some(p) if p.is_completed => ExerciseStatus::Incorrect,
            _ => ExerciseStatus::Unattempted,
        }
    }
}

/// 总体统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressStats {
    pub total: usize,
    /// 至少作答过一次
    pub attempted: usize,
    pub completed: usize,
    pub correct: usize,
    pub percent_correct: u32,
}

impl ProgressStats {
    pub fn compute(exercises: &[Exercise], progress: &[UserProgress]) -> Self {
        let by_id = index_progress(progress);

        let mut stats = ProgressStats {
            total: exercises.len(),
            attempted: 0,
            completed: 0,
            correct: 0,
            percent_correct: 0,
        };

        for exercise in exercises {
            let Some(p) = by_id.get(exercise.id.as_str()) else {
                continue;
            };
            if p.attempts > 0 {
                stats.attempted += 1;
            }
            if p.is_completed {
                stats.completed += 1;
            }
            if p.is_correct {
                stats.correct += 1;
            }
        }

        stats.percent_correct = percent(stats.correct, stats.total);
        stats
    }
}

/// 概览中的一道题
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseSummary {
    pub id: String,
    pub exercise_type: ExerciseType,
    pub status: ExerciseStatus,
}

/// 某等级下的练习
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelGroup {
    pub level: String,
    pub exercises: Vec<ExerciseSummary>,
}

/// 按等级分组的进度概览
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelOverview {
    /// 非文章题，按 CEFR 顺序
    pub levels: Vec<LevelGroup>,
    /// 文章题，单独列出
    pub articles: Vec<ExerciseSummary>,
}

impl LevelOverview {
    pub fn build(exercises: &[Exercise], progress: &[UserProgress]) -> Self {
        let by_id = index_progress(progress);
        let summarize = |e: &Exercise| ExerciseSummary {
            id: e.id.clone(),
            exercise_type: e.exercise_type(),
            status: ExerciseStatus::from_progress(by_id.get(e.id.as_str()).copied()),
        };

        let mut grouped: BTreeMap<(usize, String), Vec<ExerciseSummary>> = BTreeMap::new();
        let mut articles = Vec::new();

        for exercise in exercises {
            if exercise.is_article() {
                articles.push(summarize(exercise));
                continue;
            }
            let level = exercise.level.as_deref().unwrap_or(UNKNOWN_LEVEL);
            grouped
                .entry((level_rank(level), level.to_string()))
                .or_default()
                .push(summarize(exercise));
        }

        let levels = grouped
            .into_iter()
            .map(|((_, level), mut exercises)| {
                exercises.sort_by(|a, b| a.id.cmp(&b.id));
                LevelGroup { level, exercises }
            })
            .collect();
        articles.sort_by(|a, b| a.id.cmp(&b.id));

        Self { levels, articles }
    }
}

/// CEFR 等级排在前面，其余按字母序
fn level_rank(level: &str) -> usize {
    CEFR_ORDER
        .iter()
        .position(|l| *l == level)
        .unwrap_or(CEFR_ORDER.len())
}

/// 一篇文章及其练习
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleSection {
    pub text: Text,
    pub exercises: Vec<ExerciseSummary>,
}

impl ArticleSection {
    /// 文章按 ID 排序；没有练习的文章不列出
    pub fn build_all(texts: &[Text], exercises: &[Exercise], progress: &[UserProgress]) -> Vec<Self> {
        let by_id = index_progress(progress);

        let mut by_text: HashMap<&str, Vec<ExerciseSummary>> = HashMap::new();
        for exercise in exercises {
            if let Some(text_id) = exercise.text_id.as_deref() {
                by_text.entry(text_id).or_default().push(ExerciseSummary {
                    id: exercise.id.clone(),
                    exercise_type: exercise.exercise_type(),
                    status: ExerciseStatus::from_progress(by_id.get(exercise.id.as_str()).copied()),
                });
            }
        }

        let mut articles: Vec<&Text> = texts.iter().filter(|t| t.kind == TextKind::Article).collect();
        articles.sort_by(|a, b| a.id.cmp(&b.id));

        articles
            .into_iter()
            .filter_map(|text| {
                let mut exercises = by_text.remove(text.id.as_str())?;
                exercises.sort_by(|a, b| a.id.cmp(&b.id));
                Some(ArticleSection {
                    text: text.clone(),
                    exercises,
                })
            })
            .collect()
    }
}

/// 一组练习（如某节课）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseSet {
    pub id: String,
    pub title: String,
    pub description: String,
    pub exercise_ids: Vec<String>,
}

/// 练习组完成度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetCompletion {
    pub completed: usize,
    pub total: usize,
    pub percent: u32,
}

impl ExerciseSet {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        exercise_ids: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            exercise_ids,
        }
    }

    /// 组内最近一次作答正确的题数，与缓存中的 `isCompleted` 一致
    pub fn completion(&self, progress: &[UserProgress]) -> SetCompletion {
        let completed_ids: HashSet<&str> = progress
            .iter()
            .filter(|p| p.is_correct)
            .map(|p| p.exercise_id.as_str())
            .collect();

        let completed = self
            .exercise_ids
            .iter()
            .filter(|id| completed_ids.contains(id.as_str()))
            .count();
        let total = self.exercise_ids.len();

        SetCompletion {
            completed,
            total,
            percent: percent(completed, total),
        }
    }
}
