//! 练习服务
//!
//! 组合存储、同步、判题、抽题和进度统计，对外提供一组面向界面的操作。

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;

use crate::config::Config;
use crate::exercise::{decode_exercise, Answer, Exercise};
use crate::progress::{ArticleSection, ExerciseSet, LevelOverview, ProgressStats, SetCompletion};
use crate::selection::{pick_unsolved, Selection, SelectionFilter};
use crate::storage::{
    CachedProgress, ExerciseRecord, ProgressCacheRepository, Storage, StorageError, StorageResult,
    SyncConfig, SyncEngine, SyncResult, Text, UserProgress, UserProgressRepository,
};

/// 练习及其关联文本
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExerciseWithText {
    pub exercise: Exercise,
    pub text: Option<Text>,
}

/// 一次作答的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerOutcome {
    pub is_correct: bool,
    pub explanation: Option<String>,
    /// 含本次在内的作答次数
    pub attempts: i32,
}

pub struct QuizService {
    storage: Storage,
    sync_engine: SyncEngine,
}

impl QuizService {
    /// 打开配置中的数据库文件
    pub fn open(config: &Config) -> StorageResult<Self> {
        let storage = Storage::new(&config.db_path)?;
        tracing::info!(db_path = %storage.db_path(), "opened quiz database");
        Self::with_storage(storage, config.sync_config())
    }

    /// 内存数据库
    pub fn in_memory(sync_config: SyncConfig) -> StorageResult<Self> {
        Self::with_storage(Storage::in_memory()?, sync_config)
    }

    pub fn with_storage(storage: Storage, sync_config: SyncConfig) -> StorageResult<Self> {
        Ok(Self {
            storage,
            sync_engine: SyncEngine::new(sync_config)?,
        })
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    // ========== 同步 ==========

    pub async fn sync(&self) -> SyncResult {
        self.sync_engine.sync(&self.storage).await
    }

    pub fn last_sync_time(&self) -> StorageResult<Option<DateTime<Utc>>> {
        SyncEngine::last_sync_time(&self.storage)
    }

    // ========== 内容 ==========

    /// 全部可解码的练习，按 ID 排序
    pub fn exercises(&self) -> StorageResult<Vec<Exercise>> {
        Ok(decode_records(self.storage.exercises().get_all()?))
    }

    pub fn exercise(&self, id: &str) -> StorageResult<Option<Exercise>> {
        Ok(self
            .storage
            .exercises()
            .get_by_id(id)?
            .and_then(|record| decode_records(vec![record]).pop()))
    }

    pub fn texts(&self) -> StorageResult<Vec<Text>> {
        self.storage.texts().get_all()
    }

    pub fn text(&self, id: &str) -> StorageResult<Option<Text>> {
        self.storage.texts().get_by_id(id)
    }

    /// 某文本下的练习
    pub fn exercises_for_text(&self, text_id: &str) -> StorageResult<Vec<Exercise>> {
        Ok(decode_records(self.storage.exercises().get_by_text_id(text_id)?))
    }

    pub fn exercise_with_text(&self, id: &str) -> StorageResult<Option<ExerciseWithText>> {
        match self.exercise(id)? {
            Some(exercise) => self.attach_text(exercise).map(Some),
            None => Ok(None),
        }
    }

    fn attach_text(&self, exercise: Exercise) -> StorageResult<ExerciseWithText> {
        let text = match exercise.text_id.as_deref() {
            Some(text_id) => self.text(text_id)?,
            None => None,
        };
        Ok(ExerciseWithText { exercise, text })
    }

    // ========== 作答 ==========

    /// 判定结构化答案并记录进度
    ///
    /// 答案以旧版字符串保存，无法无损编码的答案返回 `StorageError::InvalidAnswer`。
    pub fn submit_answer(&self, exercise_id: &str, answer: &Answer) -> StorageResult<AnswerOutcome> {
        let exercise = self.require_exercise(exercise_id)?;
        let legacy = answer.encode_legacy(&exercise.kind).ok_or_else(|| {
            StorageError::InvalidAnswer(format!("练习 {} 的答案 {:?}", exercise_id, answer))
        })?;
        let is_correct = exercise.check(answer);
        self.record(&exercise, is_correct, &legacy)
    }

    /// 判定旧版字符串答案并记录进度，格式不合法时判错
    pub fn submit_legacy_answer(&self, exercise_id: &str, raw: &str) -> StorageResult<AnswerOutcome> {
        let exercise = self.require_exercise(exercise_id)?;
        let is_correct = exercise.check_answer(raw);
        self.record(&exercise, is_correct, raw)
    }

    fn require_exercise(&self, exercise_id: &str) -> StorageResult<Exercise> {
        let record = self
            .storage
            .exercises()
            .get_by_id(exercise_id)?
            .ok_or_else(|| StorageError::NotFound(format!("练习 {}", exercise_id)))?;

        decode_exercise(&record).map_err(|e| {
            StorageError::Serialization(format!("练习 {} 数据损坏: {}", exercise_id, e))
        })
    }

    /// 进度与缓存在同一事务中写入；缓存的 `isCompleted` 表示最近一次作答是否正确
    fn record(&self, exercise: &Exercise, is_correct: bool, legacy_answer: &str) -> StorageResult<AnswerOutcome> {
        let cached = CachedProgress {
            is_completed: is_correct,
            user_answer: Some(legacy_answer.to_string()),
        };

        let progress = self.storage.transaction(|conn| {
            let progress = UserProgressRepository::record_answer_internal(
                conn,
                &exercise.id,
                is_correct,
                Some(legacy_answer),
            )?;
            ProgressCacheRepository::save_internal(conn, &exercise.id, &cached)?;
            Ok(progress)
        })?;

        Ok(AnswerOutcome {
            is_correct,
            explanation: exercise.explanation.clone(),
            attempts: progress.attempts,
        })
    }

    pub fn progress(&self, exercise_id: &str) -> StorageResult<Option<UserProgress>> {
        self.storage.user_progress().get(exercise_id)
    }

    /// 界面恢复作答状态用的缓存
    pub fn cached_progress(&self, exercise_id: &str) -> StorageResult<Option<CachedProgress>> {
        self.storage.progress_cache().load(exercise_id)
    }

    /// 清空全部进度与缓存
    pub fn reset_progress(&self) -> StorageResult<()> {
        let removed = self.storage.user_progress().delete_all()?;
        self.storage.progress_cache().clear_all()?;
        tracing::info!(removed, "progress reset");
        Ok(())
    }

    /// 清空一组练习的进度与缓存
    pub fn reset_set(&self, set: &ExerciseSet) -> StorageResult<()> {
        let repo = self.storage.user_progress();
        for id in &set.exercise_ids {
            repo.delete(id)?;
        }
        let ids: Vec<&str> = set.exercise_ids.iter().map(String::as_str).collect();
        self.storage.progress_cache().remove_set(&ids)?;
        Ok(())
    }

    // ========== 抽题与统计 ==========

    /// 随机抽一道尚未答对的练习
    pub fn next_unsolved<R: Rng + ?Sized>(
        &self,
        filter: &SelectionFilter,
        rng: &mut R,
    ) -> StorageResult<Selection<ExerciseWithText>> {
        let exercises = self.exercises()?;
        let progress = self.storage.user_progress().get_all()?;

        match pick_unsolved(&exercises, &progress, filter, rng) {
            Selection::Next(exercise) => Ok(Selection::Next(self.attach_text(exercise.clone())?)),
            Selection::AllCompleted => Ok(Selection::AllCompleted),
        }
    }

    pub fn statistics(&self) -> StorageResult<ProgressStats> {
        let exercises = self.exercises()?;
        let progress = self.storage.user_progress().get_all()?;
        Ok(ProgressStats::compute(&exercises, &progress))
    }

    pub fn level_overview(&self) -> StorageResult<LevelOverview> {
        let exercises = self.exercises()?;
        let progress = self.storage.user_progress().get_all()?;
        Ok(LevelOverview::build(&exercises, &progress))
    }

    pub fn article_sections(&self) -> StorageResult<Vec<ArticleSection>> {
        let texts = self.storage.texts().get_articles()?;
        let exercises = self.exercises()?;
        let progress = self.storage.user_progress().get_all()?;
        Ok(ArticleSection::build_all(&texts, &exercises, &progress))
    }

    pub fn set_completion(&self, set: &ExerciseSet) -> StorageResult<SetCompletion> {
        let progress = self.storage.user_progress().get_all()?;
        Ok(set.completion(&progress))
    }
}

/// 解码持久化行，跳过损坏的
fn decode_records(records: Vec<ExerciseRecord>) -> Vec<Exercise> {
    records
        .iter()
        .filter_map(|record| match decode_exercise(record) {
            Ok(exercise) => Some(exercise),
            Err(e) => {
                tracing::warn!(exercise_id = %record.id, error = %e, "skipping undecodable stored exercise");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exercise::SubAnswer;
    use crate::progress::ExerciseStatus;
    use crate::storage::TextKind;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn seeded_service() -> QuizService {
        let service = QuizService::in_memory(SyncConfig::default()).unwrap();
        let body = json!({
            "texts": {
                "art_airbnb": {
                    "type": "article",
                    "title": "Airbnb i København",
                    "pompadour": "Flere udlejer deres lejlighed.",
                    "content": "Der var 22684 udlejninger sidste år.",
                    "translation": "There were 22684 rentals last year."
                }
            },
            "exercises": [
                {
                    "id": "ex_mc",
                    "type": "multiple_choice",
                    "question": "Hvad betyder 'hund'?",
                    "level": "A1",
                    "options": ["cat", "dog", "bird"],
                    "correct": 1,
                    "explanation": "'Hund' betyder 'dog'."
                },
                {
                    "id": "ex_word",
                    "type": "write_word",
                    "question": "Jeg ___ til skole.",
                    "level": "A2",
                    "correct": "går"
                },
                {
                    "id": "ex_pairs",
                    "type": "match_pairs",
                    "question": "Forbind ordene",
                    "level": "A1",
                    "pairs": [
                        {"left": "hund", "right": "dog"},
                        {"left": "kat", "right": "cat"}
                    ]
                },
                {
                    "id": "ex_article",
                    "type": "article",
                    "text_id": "art_airbnb",
                    "question": "Læs artiklen",
                    "level": "B1",
                    "subExercises": [
                        {"type": "multiple_choice", "question": "Emne?", "options": ["Airbnb", "Fodbold"], "correctIndex": 0},
                        {"type": "open_ended", "question": "Hvor mange?", "correctAnswer": "22684"}
                    ]
                }
            ]
        })
        .to_string();
        SyncEngine::apply_document(service.storage(), &body).unwrap();
        service
    }

    #[test]
    fn test_content_queries() {
        let service = seeded_service();

        let ids: Vec<_> = service.exercises().unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["ex_article", "ex_mc", "ex_pairs", "ex_word"]);

        let text = service.text("art_airbnb").unwrap().unwrap();
        assert_eq!(text.kind, TextKind::Article);
        assert_eq!(text.lead_text.as_deref(), Some("Flere udlejer deres lejlighed."));

        let with_text = service.exercise_with_text("ex_article").unwrap().unwrap();
        assert_eq!(with_text.text.map(|t| t.id), Some("art_airbnb".to_string()));
        assert!(service.exercise_with_text("ex_mc").unwrap().unwrap().text.is_none());

        assert_eq!(service.exercises_for_text("art_airbnb").unwrap().len(), 1);
        assert!(service.exercise("ex_404").unwrap().is_none());
    }

    #[test]
    fn test_submit_answer_records_progress_and_cache() {
        let service = seeded_service();

        let outcome = service.submit_answer("ex_mc", &Answer::Selected(0)).unwrap();
        assert!(!outcome.is_correct);
        assert_eq!(outcome.explanation.as_deref(), Some("'Hund' betyder 'dog'."));
        assert_eq!(outcome.attempts, 1);

        let outcome = service.submit_answer("ex_mc", &Answer::Selected(1)).unwrap();
        assert!(outcome.is_correct);
        assert_eq!(outcome.attempts, 2);

        let progress = service.progress("ex_mc").unwrap().unwrap();
        assert!(progress.is_correct);
        assert_eq!(progress.last_answer.as_deref(), Some("1"));

        let cached = service.cached_progress("ex_mc").unwrap().unwrap();
        assert_eq!(
            cached,
            CachedProgress {
                is_completed: true,
                user_answer: Some("1".to_string())
            }
        );
    }

    #[test]
    fn test_last_answer_wins() {
        let service = seeded_service();
        service.submit_answer("ex_word", &Answer::Text(" GÅR ".into())).unwrap();
        let outcome = service.submit_answer("ex_word", &Answer::Text("gik".into())).unwrap();
        assert!(!outcome.is_correct);
        assert!(!service.progress("ex_word").unwrap().unwrap().is_correct);
    }

    #[test]
    fn test_submit_structured_pairs_and_article() {
        let service = seeded_service();

        let pairs = Answer::Pairs(BTreeMap::from([(0, 0), (1, 1)]));
        assert!(service.submit_answer("ex_pairs", &pairs).unwrap().is_correct);
        assert_eq!(
            service.progress("ex_pairs").unwrap().unwrap().last_answer.as_deref(),
            Some("{0:0},{1:1}")
        );

        let article = Answer::Article(vec![SubAnswer::Selected(0), SubAnswer::Text("22684".into())]);
        assert!(service.submit_answer("ex_article", &article).unwrap().is_correct);
        assert_eq!(
            service.cached_progress("ex_article").unwrap().unwrap().user_answer.as_deref(),
            Some("0|22684")
        );
    }

    #[test]
    fn test_submit_legacy_answer() {
        let service = seeded_service();

        assert!(service.submit_legacy_answer("ex_pairs", "{0:0},{1:1}").unwrap().is_correct);
        assert!(!service.submit_legacy_answer("ex_pairs", "garbage").unwrap().is_correct);
        assert!(service.submit_legacy_answer("ex_article", "0|22684").unwrap().is_correct);
        assert!(!service.submit_legacy_answer("ex_article", "0").unwrap().is_correct);

        let progress = service.progress("ex_pairs").unwrap().unwrap();
        assert_eq!(progress.attempts, 2);
        assert_eq!(progress.last_answer.as_deref(), Some("garbage"));
    }

    #[test]
    fn test_submit_unknown_exercise() {
        let service = seeded_service();
        let result = service.submit_answer("ex_404", &Answer::Selected(0));
        assert!(matches!(result, Err(StorageError::NotFound(_))));
        assert!(service.progress("ex_404").unwrap().is_none());
    }

    #[test]
    fn test_next_unsolved_until_all_completed() {
        let service = seeded_service();
        let mut rng = StdRng::seed_from_u64(11);

        service.submit_legacy_answer("ex_mc", "1").unwrap();
        service.submit_legacy_answer("ex_word", "går").unwrap();
        service.submit_legacy_answer("ex_pairs", "{0:0},{1:1}").unwrap();

        for _ in 0..10 {
            match service.next_unsolved(&SelectionFilter::any(), &mut rng).unwrap() {
                Selection::Next(next) => {
                    assert_eq!(next.exercise.id, "ex_article");
                    assert_eq!(next.text.map(|t| t.id), Some("art_airbnb".to_string()));
                }
                Selection::AllCompleted => panic!("article is still unsolved"),
            }
        }

        service.submit_legacy_answer("ex_article", "0|22684").unwrap();
        assert!(service
            .next_unsolved(&SelectionFilter::any(), &mut rng)
            .unwrap()
            .is_all_completed());
        assert!(service
            .next_unsolved(&SelectionFilter::articles_only(), &mut rng)
            .unwrap()
            .is_all_completed());
    }

    #[test]
    fn test_statistics_and_overviews() {
        let service = seeded_service();
        service.submit_legacy_answer("ex_mc", "1").unwrap();
        service.submit_legacy_answer("ex_word", "nej").unwrap();

        let stats = service.statistics().unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.attempted, 2);
        assert_eq!(stats.correct, 1);
        assert_eq!(stats.percent_correct, 25);

        let overview = service.level_overview().unwrap();
        let levels: Vec<_> = overview.levels.iter().map(|g| g.level.as_str()).collect();
        assert_eq!(levels, vec!["A1", "A2"]);
        assert_eq!(overview.levels[1].exercises[0].status, ExerciseStatus::Incorrect);
        assert_eq!(overview.articles.len(), 1);

        let sections = service.article_sections().unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].text.id, "art_airbnb");
    }

    #[test]
    fn test_set_completion_and_reset() {
        let service = seeded_service();
        let set = ExerciseSet::new(
            "basics",
            "Grundlæggende",
            "Ord og sætninger",
            vec!["ex_mc".into(), "ex_word".into()],
        );

        service.submit_legacy_answer("ex_mc", "1").unwrap();
        service.submit_legacy_answer("ex_word", "nej").unwrap();
        service.submit_legacy_answer("ex_pairs", "{0:0},{1:1}").unwrap();
        let completion = service.set_completion(&set).unwrap();
        assert_eq!((completion.completed, completion.total, completion.percent), (1, 2, 50));

        service.reset_set(&set).unwrap();
        assert!(service.progress("ex_mc").unwrap().is_none());
        assert!(service.cached_progress("ex_mc").unwrap().is_none());
        assert!(service.progress("ex_pairs").unwrap().is_some());

        service.reset_progress().unwrap();
        assert_eq!(service.statistics().unwrap().attempted, 0);
        assert!(service.cached_progress("ex_pairs").unwrap().is_none());
    }

    #[test]
    fn test_wrong_answer_is_not_completed() {
        let service = seeded_service();
        let set = ExerciseSet::new("mc_only", "Ét spørgsmål", "", vec!["ex_mc".into()]);

        service.submit_legacy_answer("ex_mc", "0").unwrap();

        let cached = service.cached_progress("ex_mc").unwrap().unwrap();
        assert!(!cached.is_completed);
        assert_eq!(cached.user_answer.as_deref(), Some("0"));
        let completion = service.set_completion(&set).unwrap();
        assert_eq!((completion.completed, completion.total, completion.percent), (0, 1, 0));

        // 改正后才算完成
        service.submit_legacy_answer("ex_mc", "1").unwrap();
        assert!(service.cached_progress("ex_mc").unwrap().unwrap().is_completed);
        assert_eq!(service.set_completion(&set).unwrap().percent, 100);
    }

    #[test]
    fn test_article_answer_with_pipe_is_rejected() {
        let service = QuizService::in_memory(SyncConfig::default()).unwrap();
        let body = json!({
            "texts": {
                "art_pipe": {"type": "article", "title": "Rør", "content": "a|b"}
            },
            "exercises": [
                {
                    "id": "ex_pipe",
                    "type": "article",
                    "text_id": "art_pipe",
                    "question": "Skriv svaret",
                    "subExercises": [
                        {"type": "open_ended", "question": "Hvad står der?", "correctAnswer": "a|b"}
                    ]
                }
            ]
        })
        .to_string();
        SyncEngine::apply_document(service.storage(), &body).unwrap();

        let typed = Answer::Article(vec![SubAnswer::Text("a|b".into())]);
        let result = service.submit_answer("ex_pipe", &typed);
        assert!(matches!(result, Err(StorageError::InvalidAnswer(_))));
        assert!(service.progress("ex_pipe").unwrap().is_none());
        assert!(service.cached_progress("ex_pipe").unwrap().is_none());

        // 旧版字符串按分隔符切分，按存储的原样判定
        let outcome = service.submit_legacy_answer("ex_pipe", "a|b").unwrap();
        assert!(!outcome.is_correct);
        let stored = service.progress("ex_pipe").unwrap().unwrap();
        let exercise = service.exercise("ex_pipe").unwrap().unwrap();
        assert_eq!(
            exercise.check_answer(stored.last_answer.as_deref().unwrap()),
            outcome.is_correct
        );
    }

    #[test]
    fn test_stored_answer_regrades_the_same() {
        let service = seeded_service();
        let answers = [
            ("ex_mc", Answer::Selected(2)),
            ("ex_word", Answer::Text(" Går ".into())),
            ("ex_pairs", Answer::Pairs(BTreeMap::from([(0, 1), (1, 0)]))),
            (
                "ex_article",
                Answer::Article(vec![SubAnswer::Selected(0), SubAnswer::Text("22684".into())]),
            ),
        ];

        for (id, answer) in answers {
            let outcome = service.submit_answer(id, &answer).unwrap();
            let stored = service.progress(id).unwrap().unwrap();
            let exercise = service.exercise(id).unwrap().unwrap();
            assert_eq!(
                exercise.check_answer(stored.last_answer.as_deref().unwrap()),
                outcome.is_correct,
                "{id}"
            );
        }
    }

    #[test]
    fn test_failed_cache_write_rolls_back_progress() {
        let service = seeded_service();
        {
            let conn = service.storage().connection();
            let conn = conn.lock().unwrap();
            conn.execute("DROP TABLE progress_cache", []).unwrap();
        }

        let result = service.submit_legacy_answer("ex_mc", "1");
        assert!(matches!(result, Err(StorageError::Database(_))));
        assert!(service.progress("ex_mc").unwrap().is_none());
    }

    #[test]
    fn test_undecodable_rows_are_skipped() {
        let service = seeded_service();
        {
            let conn = service.storage().connection();
            let conn = conn.lock().unwrap();
            conn.execute(
                "UPDATE exercises SET data_json = '{\"options\": []}' WHERE id = 'ex_mc'",
                [],
            )
            .unwrap();
        }

        assert_eq!(service.exercises().unwrap().len(), 3);
        assert!(service.exercise("ex_mc").unwrap().is_none());
        assert!(matches!(
            service.submit_answer("ex_mc", &Answer::Selected(1)),
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database_url: "http://127.0.0.1:9/database.json".to_string(),
            db_path: dir.path().join("quiz.db"),
            sync_timeout_secs: 1,
            log_level: "info".to_string(),
            file_logs: false,
            log_dir: dir.path().join("logs"),
        };

        let service = QuizService::open(&config).unwrap();
        assert!(service.exercises().unwrap().is_empty());
        assert!(service.last_sync_time().unwrap().is_none());
    }
}
