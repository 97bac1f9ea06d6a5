use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// 手机号，按号码本身去重。一个号码可以挂在多个微信用户下，
/// 重复上报只更新元数据并补关联，不会产生新行。
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PhoneNumber {
    pub id: Uuid,
    pub phone_number: String,
    pub pure_phone_number: Option<String>,
    pub country_code: Option<String>,
    /// 防重放水印：时间戳 + appid
    pub watermark: Option<Value>,
    pub raw_data: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PhoneNumber {
    const COLUMNS: &'static str = "id, phone_number, pure_phone_number, country_code, \
         watermark, raw_data, created_at, updated_at";

    pub async fn upsert(
        pool: &PgPool,
        phone_number: &str,
        pure_phone_number: Option<&str>,
        country_code: Option<&str>,
        watermark: Option<&Value>,
        raw_data: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, PhoneNumber>(&format!(
            r#"
            INSERT INTO phone_number
                (id, phone_number, pure_phone_number, country_code, watermark, raw_data)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (phone_number) DO UPDATE
                SET pure_phone_number = EXCLUDED.pure_phone_number,
                    country_code = EXCLUDED.country_code,
                    watermark = EXCLUDED.watermark,
                    raw_data = EXCLUDED.raw_data,
                    updated_at = now()
            RETURNING {}
            "#,
            Self::COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(phone_number)
        .bind(pure_phone_number)
        .bind(country_code)
        .bind(watermark)
        .bind(raw_data)
        .fetch_one(pool)
        .await
    }

    /// 幂等关联到微信用户，重复上报不产生重复关联
    pub async fn add_user(
        pool: &PgPool,
        phone_number_id: Uuid,
        wechat_user_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO wechat_user_phone_number (wechat_user_id, phone_number_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(wechat_user_id)
        .bind(phone_number_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn find_first_by_union_id(
        pool: &PgPool,
        union_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, PhoneNumber>(&format!(
            r#"
            SELECT {}
            FROM phone_number p
            JOIN wechat_user_phone_number up ON up.phone_number_id = p.id
            JOIN wechat_user u ON u.id = up.wechat_user_id
            WHERE u.union_id = $1
            LIMIT 1
            "#,
            Self::COLUMNS
                .split(", ")
                .map(|c| format!("p.{}", c))
                .collect::<Vec<_>>()
                .join(", ")
        ))
        .bind(union_id)
        .fetch_optional(pool)
        .await
    }
}
