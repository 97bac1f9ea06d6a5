use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// code2session 日志，每个 (account, code) 只会有一行。
/// 创建后不再修改，由保留策略任务定期清理。
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CodeSessionLog {
    pub id: Uuid,
    pub account_id: Uuid,
    pub code: String,
    pub open_id: String,
    pub union_id: Option<String>,
    #[serde(skip_serializing)]
    pub session_key: String,
    pub raw_data: Option<String>,
    pub created_from_ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CodeSessionLog {
    /// 按 (account, code) 幂等写入。并发重复提交时第二个请求
    /// 落在 ON CONFLICT 分支，拿回同一行。
    pub async fn upsert(
        pool: &PgPool,
        account_id: Uuid,
        code: &str,
        open_id: &str,
        union_id: Option<&str>,
        session_key: &str,
        raw_data: &str,
        created_from_ip: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, CodeSessionLog>(
            r#"
            INSERT INTO code_session_log
                (id, account_id, code, open_id, union_id, session_key, raw_data, created_from_ip)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (account_id, code) DO UPDATE
                SET open_id = EXCLUDED.open_id,
                    union_id = EXCLUDED.union_id,
                    session_key = EXCLUDED.session_key,
                    raw_data = EXCLUDED.raw_data
            RETURNING id, account_id, code, open_id, union_id, session_key, raw_data,
                      created_from_ip, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(account_id)
        .bind(code)
        .bind(open_id)
        .bind(union_id)
        .bind(session_key)
        .bind(raw_data)
        .bind(created_from_ip)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_account_and_code(
        pool: &PgPool,
        account_id: Uuid,
        code: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, CodeSessionLog>(
            r#"
            SELECT id, account_id, code, open_id, union_id, session_key, raw_data,
                   created_from_ip, created_at
            FROM code_session_log
            WHERE account_id = $1 AND code = $2
            "#,
        )
        .bind(account_id)
        .bind(code)
        .fetch_optional(pool)
        .await
    }

    /// 保留策略：删除 N 天前的日志，返回删除行数
    pub async fn purge_older_than(pool: &PgPool, days: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM code_session_log
            WHERE created_at < now() - ($1 || ' days')::interval
            "#,
        )
        .bind(days.to_string())
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }
}
