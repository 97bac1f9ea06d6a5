use std::time::Duration;

use sqlx::PgPool;

/// 每天清一次过期的 code2session 日志
const PURGE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

use crate::database::CodeSessionLog;

pub async fn run_session_log_retention(pool: PgPool, retention_days: i64) {
    let mut interval = tokio::time::interval(PURGE_INTERVAL);
    loop {
        interval.tick().await;
        match CodeSessionLog::purge_older_than(&pool, retention_days).await {
            Ok(deleted) if deleted > 0 => {
                tracing::info!(deleted, retention_days, "清理过期会话日志");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!("清理会话日志失败: {:?}", e);
            }
        }
    }
}
