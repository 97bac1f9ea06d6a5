use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// 微信的性别枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Unknown,
    Male,
    Female,
}

impl Gender {
    pub fn from_i16(value: i16) -> Self {
        match value {
            1 => Gender::Male,
            2 => Gender::Female,
            _ => Gender::Unknown,
        }
    }

    pub fn as_i16(self) -> i16 {
        match self {
            Gender::Unknown => 0,
            Gender::Male => 1,
            Gender::Female => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Gender::Unknown => "未知",
            Gender::Male => "男性",
            Gender::Female => "女性",
        }
    }
}

/// country/province/city 的展示语言，微信侧现在强制 zh_CN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "en")]
    En,
    #[serde(rename = "zh_CN")]
    ZhCn,
    #[serde(rename = "zh_TW")]
    ZhTw,
}

impl Language {
    pub fn from_str_or_default(value: &str) -> Self {
        match value {
            "en" => Language::En,
            "zh_TW" => Language::ZhTw,
            _ => Language::ZhCn,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::ZhCn => "zh_CN",
            Language::ZhTw => "zh_TW",
        }
    }
}

/// 微信用户，(account, openId) 唯一
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WechatUser {
    pub id: Uuid,
    pub account_id: Uuid,
    pub open_id: String,
    pub union_id: Option<String>,
    pub nick_name: Option<String>,
    pub avatar_url: Option<String>,
    pub gender: i16,
    pub country: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub language: String,
    pub raw_data: Option<String>,
    pub authorize_scopes: Option<Value>,
    /// 关联的业务用户
    pub sys_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WechatUser {
    pub fn gender(&self) -> Gender {
        Gender::from_i16(self.gender)
    }

    pub fn language(&self) -> Language {
        Language::from_str_or_default(&self.language)
    }

    const COLUMNS: &'static str = "id, account_id, open_id, union_id, nick_name, avatar_url, \
         gender, country, province, city, language, raw_data, authorize_scopes, sys_user_id, \
         created_at, updated_at";

    /// 按 (account, openId) 幂等创建；后学到的 unionId 补写进去，
    /// 已有值不会被空值覆盖。并发安全靠唯一约束 + ON CONFLICT。
    pub async fn upsert(
        pool: &PgPool,
        account_id: Uuid,
        open_id: &str,
        union_id: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, WechatUser>(&format!(
            r#"
            INSERT INTO wechat_user (id, account_id, open_id, union_id, language)
            VALUES ($1, $2, $3, $4, 'zh_CN')
            ON CONFLICT (account_id, open_id) DO UPDATE
                SET union_id = COALESCE(EXCLUDED.union_id, wechat_user.union_id),
                    updated_at = now()
            RETURNING {}
            "#,
            Self::COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(account_id)
        .bind(open_id)
        .bind(union_id)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_open_id(
        pool: &PgPool,
        open_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, WechatUser>(&format!(
            "SELECT {} FROM wechat_user WHERE open_id = $1",
            Self::COLUMNS
        ))
        .bind(open_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_union_id(
        pool: &PgPool,
        union_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, WechatUser>(&format!(
            "SELECT {} FROM wechat_user WHERE union_id = $1 LIMIT 1",
            Self::COLUMNS
        ))
        .bind(union_id)
        .fetch_optional(pool)
        .await
    }

    /// 按业务用户身份回查微信用户：先 openId，再 unionId
    pub async fn find_by_identity(
        pool: &PgPool,
        identifier: &str,
        identity: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        if let Some(user) = Self::find_by_open_id(pool, identifier).await? {
            return Ok(Some(user));
        }
        if let Some(identity) = identity {
            return Self::find_by_union_id(pool, identity).await;
        }
        Ok(None)
    }

    pub async fn find_by_phone_number(
        pool: &PgPool,
        phone_number: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, WechatUser>(&format!(
            r#"
            SELECT {}
            FROM wechat_user u
            JOIN wechat_user_phone_number up ON up.wechat_user_id = u.id
            JOIN phone_number p ON p.id = up.phone_number_id
            WHERE p.phone_number = $1
            LIMIT 1
            "#,
            Self::COLUMNS
                .split(", ")
                .map(|c| format!("u.{}", c))
                .collect::<Vec<_>>()
                .join(", ")
        ))
        .bind(phone_number)
        .fetch_optional(pool)
        .await
    }

    pub async fn update_profile(
        pool: &PgPool,
        id: Uuid,
        nick_name: &str,
        avatar_url: &str,
        language: Language,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, WechatUser>(&format!(
            r#"
            UPDATE wechat_user
            SET nick_name = $1, avatar_url = $2, language = $3, updated_at = now()
            WHERE id = $4
            RETURNING {}
            "#,
            Self::COLUMNS
        ))
        .bind(nick_name)
        .bind(avatar_url)
        .bind(language.as_str())
        .bind(id)
        .fetch_one(pool)
        .await
    }

    pub async fn set_authorize_scopes(
        pool: &PgPool,
        id: Uuid,
        scopes: &[String],
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, WechatUser>(&format!(
            r#"
            UPDATE wechat_user
            SET authorize_scopes = $1, updated_at = now()
            WHERE id = $2
            RETURNING {}
            "#,
            Self::COLUMNS
        ))
        .bind(serde_json::json!(scopes))
        .bind(id)
        .fetch_one(pool)
        .await
    }

    pub async fn link_sys_user(
        pool: &PgPool,
        id: Uuid,
        sys_user_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE wechat_user SET sys_user_id = $1, updated_at = now() WHERE id = $2",
        )
        .bind(sys_user_id)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// 该微信用户名下所有手机号，按关联时间排序
    pub async fn phone_numbers(pool: &PgPool, id: Uuid) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT p.phone_number
            FROM phone_number p
            JOIN wechat_user_phone_number up ON up.phone_number_id = p.id
            WHERE up.wechat_user_id = $1
            ORDER BY up.created_at
            "#,
        )
        .bind(id)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|(p,)| p).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gender_round_trip() {
        assert_eq!(Gender::from_i16(0), Gender::Unknown);
        assert_eq!(Gender::from_i16(1), Gender::Male);
        assert_eq!(Gender::from_i16(2), Gender::Female);
        // 微信偶尔会给出脏值，兜底到未知
        assert_eq!(Gender::from_i16(9), Gender::Unknown);
        assert_eq!(Gender::Male.as_i16(), 1);
        assert_eq!(Gender::Female.label(), "女性");
    }

    #[test]
    fn language_defaults_to_zh_cn() {
        assert_eq!(Language::from_str_or_default("en"), Language::En);
        assert_eq!(Language::from_str_or_default("zh_TW"), Language::ZhTw);
        assert_eq!(Language::from_str_or_default("zh_CN"), Language::ZhCn);
        assert_eq!(Language::from_str_or_default("fr"), Language::ZhCn);
        assert_eq!(Language::ZhTw.as_str(), "zh_TW");
    }
}
