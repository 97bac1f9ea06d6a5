use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::ApiError;

/// 业务用户。微信用户归微信用户，实际登录态挂在这层用户上。
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BusinessUser {
    pub id: Uuid,
    /// 登录标识，一般是 openId，老的匿名注册路径会是 temp_{unionId}
    pub identifier: String,
    /// 跨小程序的身份标记，即 unionId
    pub identity: Option<String>,
    pub nickname: String,
    pub avatar_url: Option<String>,
    pub mobile: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BusinessUser {
    /// 对外的公开投影，不泄露内部字段
    pub fn api_projection(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("id".into(), Value::String(self.id.to_string()));
        map.insert("username".into(), Value::String(self.identifier.clone()));
        map.insert("nickname".into(), Value::String(self.nickname.clone()));
        map.insert(
            "avatarUrl".into(),
            self.avatar_url
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        );
        map
    }
}

/// 宿主应用的用户管理抽象。编排器只依赖这几个窄接口，
/// 不探测业务用户上有什么方法。
#[async_trait]
pub trait UserManager: Send + Sync {
    async fn load_user_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<BusinessUser>, ApiError>;

    async fn create_user(
        &self,
        identifier: &str,
        nickname: &str,
        avatar_url: &str,
    ) -> Result<BusinessUser, ApiError>;

    async fn save_user(&self, user: &BusinessUser) -> Result<(), ApiError>;

    /// 幂等写入身份标记（unionId）
    async fn set_identity(&self, user: &mut BusinessUser, identity: &str) -> Result<(), ApiError>;
}

/// 默认实现：业务用户落在本库 sys_user 表
pub struct DatabaseUserManager {
    pool: PgPool,
}

impl DatabaseUserManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const COLUMNS: &str = "id, identifier, identity, nickname, avatar_url, mobile, created_at";

#[async_trait]
impl UserManager for DatabaseUserManager {
    async fn load_user_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<BusinessUser>, ApiError> {
        let user = sqlx::query_as::<_, BusinessUser>(&format!(
            "SELECT {} FROM sys_user WHERE identifier = $1",
            COLUMNS
        ))
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user(
        &self,
        identifier: &str,
        nickname: &str,
        avatar_url: &str,
    ) -> Result<BusinessUser, ApiError> {
        let result = sqlx::query_as::<_, BusinessUser>(&format!(
            r#"
            INSERT INTO sys_user (id, identifier, nickname, avatar_url)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(identifier)
        .bind(nickname)
        .bind(avatar_url)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(e) => {
                // 锁外部还有并发写入方时仍可能撞唯一约束，
                // 记录完整上下文后转成面向用户的终态错误
                if e.as_database_error()
                    .map(|db| db.is_unique_violation())
                    .unwrap_or(false)
                {
                    tracing::error!(identifier, "创建业务用户撞唯一约束");
                    return Err(ApiError::BizUserCreation);
                }
                Err(e.into())
            }
        }
    }

    async fn save_user(&self, user: &BusinessUser) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            UPDATE sys_user
            SET identity = $1, nickname = $2, avatar_url = $3, mobile = $4
            WHERE id = $5
            "#,
        )
        .bind(&user.identity)
        .bind(&user.nickname)
        .bind(&user.avatar_url)
        .bind(&user.mobile)
        .bind(user.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_identity(&self, user: &mut BusinessUser, identity: &str) -> Result<(), ApiError> {
        if user.identity.as_deref() == Some(identity) {
            return Ok(());
        }
        user.identity = Some(identity.to_string());
        self.save_user(user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_projection_hides_mobile_and_identity() {
        let user = BusinessUser {
            id: Uuid::new_v4(),
            identifier: "openid-abc".into(),
            identity: Some("union-1".into()),
            nickname: "微信用户".into(),
            avatar_url: None,
            mobile: Some("+8613800138000".into()),
            created_at: Utc::now(),
        };
        let projection = user.api_projection();
        assert_eq!(projection["username"], "openid-abc");
        assert_eq!(projection["avatarUrl"], Value::Null);
        assert!(!projection.contains_key("mobile"));
        assert!(!projection.contains_key("identity"));
    }
}
