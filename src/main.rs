use dansk_quiz_lib::logging::init_tracing;
use dansk_quiz_lib::{Config, QuizService};

/// 同步练习库并输出当前进度
#[tokio::main]
async fn main() {
    let config = Config::load();
    let _log_guard = init_tracing(&config);

    let service = match QuizService::open(&config) {
        Ok(service) => service,
        Err(err) => {
            tracing::error!(error = %err, "failed to open quiz database");
            std::process::exit(1);
        }
    };

    let result = service.sync().await;
    if result.success {
        tracing::info!(
            texts = result.new_text_count,
            exercises = result.new_exercise_count,
            dropped = result.dropped_exercise_count,
            "sync finished"
        );
    } else {
        tracing::warn!(
            error = result.error_message.as_deref().unwrap_or_default(),
            "sync failed, using cached exercises"
        );
    }

    match service.statistics() {
        Ok(stats) => tracing::info!(
            total = stats.total,
            attempted = stats.attempted,
            correct = stats.correct,
            percent_correct = stats.percent_correct,
            "progress"
        ),
        Err(err) => {
            tracing::error!(error = %err, "failed to compute statistics");
            std::process::exit(1);
        }
    }
}
