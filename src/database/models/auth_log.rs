use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// 登录/授权审计日志
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuthLog {
    pub id: Uuid,
    pub open_id: Option<String>,
    pub action: String,
    pub raw_data: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuthLog {
    pub async fn record(
        pool: &PgPool,
        open_id: Option<&str>,
        action: &str,
        raw_data: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO auth_log (id, open_id, action, raw_data)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(open_id)
        .bind(action)
        .bind(raw_data)
        .execute(pool)
        .await?;
        Ok(())
    }
}
