//! 丹麦语练习核心库
//!
//! 远端练习库同步到本地 SQLite，提供判题、随机抽题和进度统计。

pub mod config;
pub mod exercise;
pub mod logging;
pub mod progress;
pub mod selection;
pub mod service;
pub mod storage;

pub use config::Config;
pub use exercise::{Answer, ArticleSubExercise, Exercise, ExerciseKind, ExerciseType, SubAnswer};
pub use progress::{ExerciseSet, ExerciseStatus, ProgressStats, SetCompletion};
pub use selection::{Selection, SelectionFilter};
pub use service::{AnswerOutcome, ExerciseWithText, QuizService};
pub use storage::{Storage, StorageError, StorageResult, SyncConfig, SyncResult};
