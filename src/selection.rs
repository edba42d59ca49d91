//! 随机抽取未答对的练习
//!
//! 候选池 = 全部练习 - 已答对（`is_correct = true`）的练习，再按过滤条件筛选，
//! 在池中均匀随机抽取；池为空时返回 [`Selection::AllCompleted`]。

use rand::Rng;
use std::collections::HashSet;

use crate::exercise::{Exercise, ExerciseType};
use crate::storage::UserProgress;

/// 候选过滤条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionFilter {
    /// 只抽该等级
    pub level: Option<String>,
    /// 只抽该题型
    pub exercise_type: Option<ExerciseType>,
}

impl SelectionFilter {
    /// 不做过滤
    pub fn any() -> Self {
        Self::default()
    }

    /// 只抽文章题
    pub fn articles_only() -> Self {
        Self {
            level: None,
            exercise_type: Some(ExerciseType::Article),
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    pub fn matches(&self, exercise: &Exercise) -> bool {
        if let Some(level) = &self.level {
            if exercise.level.as_deref() != Some(level.as_str()) {
                return false;
            }
        }
        if let Some(exercise_type) = self.exercise_type {
            if exercise.exercise_type() != exercise_type {
                return false;
            }
        }
        true
    }
}

/// 抽取结果
#[derive(Debug, Clone, PartialEq)]
pub enum Selection<T> {
    Next(T),
    /// 候选池为空
    AllCompleted,
}

impl<T> Selection<T> {
    pub fn is_all_completed(&self) -> bool {
        matches!(self, Selection::AllCompleted)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Selection<U> {
        match self {
            Selection::Next(value) => Selection::Next(f(value)),
            Selection::AllCompleted => Selection::AllCompleted,
        }
    }
}

/// 已答对的练习 ID
pub fn solved_ids(progress: &[UserProgress]) -> HashSet<&str> {
    progress
        .iter()
        .filter(|p| p.is_correct)
        .map(|p| p.exercise_id.as_str())
        .collect()
}

/// 过滤后的候选池，保持输入顺序
pub fn unsolved_candidates<'a>(
    exercises: &'a [Exercise],
    progress: &[UserProgress],
    filter: &SelectionFilter,
) -> Vec<&'a Exercise> {
    let solved = solved_ids(progress);
    exercises
        .iter()
        .filter(|e| !solved.contains(e.id.as_str()) && filter.matches(e))
        .collect()
}

/// 在候选池中均匀随机抽取一道
pub fn pick_unsolved<'a, R: Rng + ?Sized>(
    exercises: &'a [Exercise],
    progress: &[UserProgress],
    filter: &SelectionFilter,
    rng: &mut R,
) -> Selection<&'a Exercise> {
    let candidates = unsolved_candidates(exercises, progress, filter);
    if candidates.is_empty() {
        tracing::debug!(total = exercises.len(), "no unsolved exercise left");
        return Selection::AllCompleted;
    }

    let index = rng.random_range(0..candidates.len());
    Selection::Next(candidates[index])
}
