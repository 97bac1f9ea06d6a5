use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// 微信小程序账号配置
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub app_id: String,
    #[serde(skip_serializing)]
    pub app_secret: String,
    pub name: String,
    pub valid: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub async fn find_by_app_id(pool: &PgPool, app_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Account>(
            r#"
            SELECT id, app_id, app_secret, name, valid, created_at
            FROM wechat_mini_program_account
            WHERE app_id = $1 AND valid = true
            "#,
        )
        .bind(app_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Account>(
            r#"
            SELECT id, app_id, app_secret, name, valid, created_at
            FROM wechat_mini_program_account
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// appId 为空时退回唯一一个有效账号
    pub async fn resolve(pool: &PgPool, app_id: &str) -> Result<Option<Self>, sqlx::Error> {
        if !app_id.is_empty() {
            return Self::find_by_app_id(pool, app_id).await;
        }

        sqlx::query_as::<_, Account>(
            r#"
            SELECT id, app_id, app_secret, name, valid, created_at
            FROM wechat_mini_program_account
            WHERE valid = true
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .fetch_optional(pool)
        .await
    }
}
