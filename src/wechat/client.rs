use std::sync::Arc;
use std::time::Duration;

use redis::{AsyncCommands, Client as RedisClient};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;

/// code2session 响应缓存时长，对齐微信侧 session 的短期有效性。
/// 只是为了容忍网络层的重复请求，正确性由会话日志兜底。
const CODE_SESSION_CACHE_SECS: u64 = 60 * 60;

const MOCK_CODE_PREFIX: &str = "mock_";

/// code2session 返回。session_key 缺失本身不是错误，
/// 由调用方走回查日志的兜底逻辑。
#[derive(Debug, Clone, Deserialize)]
pub struct CodeSessionResponse {
    pub openid: Option<String>,
    pub unionid: Option<String>,
    pub session_key: Option<String>,
    pub errcode: Option<i64>,
    pub errmsg: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhoneInfo {
    #[serde(rename = "phoneNumber")]
    pub phone_number: String,
    #[serde(rename = "purePhoneNumber")]
    pub pure_phone_number: Option<String>,
    #[serde(rename = "countryCode")]
    pub country_code: Option<String>,
    pub watermark: Option<Value>,
}

/// 微信小程序服务端接口客户端
#[derive(Clone)]
pub struct WechatClient {
    http: reqwest::Client,
    base_url: String,
    allow_mock_code: bool,
}

impl WechatClient {
    pub fn new(base_url: String, allow_mock_code: bool) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url,
            allow_mock_code,
        }
    }

    /// code2session，带一小时的响应缓存
    pub async fn code_to_session(
        &self,
        redis: &Arc<RedisClient>,
        app_id: &str,
        secret: &str,
        code: &str,
    ) -> Result<(CodeSessionResponse, Value), ApiError> {
        if self.allow_mock_code {
            if let Some(raw) = parse_mock_code(code) {
                let session = session_from_value(&raw)?;
                return Ok((session, raw));
            }
        }

        let cache_key = format!("wechat:code2session:{}:{}", app_id, code);
        if let Some(raw) = self.cache_get(redis, &cache_key).await {
            let session = session_from_value(&raw)?;
            return Ok((session, raw));
        }

        let url = format!("{}/sns/jscode2session", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("appid", app_id),
                ("secret", secret),
                ("js_code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(map_transport_error)?;

        let raw: Value = response.json().await.map_err(map_transport_error)?;
        let session = session_from_value(&raw)?;

        self.cache_set(redis, &cache_key, &raw).await;

        Ok((session, raw))
    }

    /// 通过手机号授权code换取手机号信息
    pub async fn get_phone_number(&self, code: &str) -> Result<(PhoneInfo, Value), ApiError> {
        let url = format!("{}/wxa/business/getuserphonenumber", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "code": code }))
            .send()
            .await
            .map_err(map_transport_error)?;

        let raw: Value = response.json().await.map_err(map_transport_error)?;
        tracing::debug!(response = %raw, "远程获取微信手机号码信息");

        let info = raw
            .get("phone_info")
            .cloned()
            .and_then(|v| serde_json::from_value::<PhoneInfo>(v).ok())
            .ok_or_else(|| ApiError::PhoneRetrieval("找不到手机号码信息".to_string()))?;

        Ok((info, raw))
    }

    async fn cache_get(&self, redis: &Arc<RedisClient>, key: &str) -> Option<Value> {
        let mut conn = redis.get_multiplexed_async_connection().await.ok()?;
        let cached: Option<String> = conn.get(key).await.ok()?;
        cached.and_then(|json| serde_json::from_str(&json).ok())
    }

    async fn cache_set(&self, redis: &Arc<RedisClient>, key: &str, raw: &Value) {
        // 缓存失败不影响主流程
        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let _: Result<(), _> = conn
                .set_ex(key, raw.to_string(), CODE_SESSION_CACHE_SECS)
                .await;
        }
    }
}

/// mock_{json} 形式的登录code，剥掉前缀后直接当session用
pub fn parse_mock_code(code: &str) -> Option<Value> {
    let payload = code.strip_prefix(MOCK_CODE_PREFIX)?;
    serde_json::from_str::<Value>(payload)
        .ok()
        .filter(Value::is_object)
}

fn session_from_value(raw: &Value) -> Result<CodeSessionResponse, ApiError> {
    let session: CodeSessionResponse = serde_json::from_value(raw.clone())
        .map_err(|_| ApiError::SessionExchange("微信接口返回数据格式错误".to_string()))?;

    // code 已被消费的语义错误是终态，用户必须重新走 wx.login
    if let Some(errmsg) = &session.errmsg {
        if errmsg.contains("invalid code, rid") {
            return Err(ApiError::SessionExchange(
                "微信登录态无效，请返回重试".to_string(),
            ));
        }
    }

    Ok(session)
}

fn map_transport_error(e: reqwest::Error) -> ApiError {
    tracing::error!("微信接口请求失败: {:?}", e);
    ApiError::UpstreamTimeout
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mock_code() {
        let raw =
            parse_mock_code(r#"mock_{"openid":"abc","unionid":"u1","session_key":"k1"}"#).unwrap();
        assert_eq!(raw["openid"], "abc");

        let session = session_from_value(&raw).unwrap();
        assert_eq!(session.openid.as_deref(), Some("abc"));
        assert_eq!(session.unionid.as_deref(), Some("u1"));
        assert_eq!(session.session_key.as_deref(), Some("k1"));
    }

    #[test]
    fn rejects_non_mock_code() {
        assert!(parse_mock_code("081Kq9Ga1rtjJD0").is_none());
        assert!(parse_mock_code("mock_not json").is_none());
        assert!(parse_mock_code("mock_[1,2]").is_none());
    }

    #[test]
    fn invalid_code_maps_to_session_exchange_error() {
        let raw = serde_json::json!({
            "errcode": 40029,
            "errmsg": "invalid code, rid: 61234-abcdef",
        });
        let err = session_from_value(&raw).unwrap_err();
        assert!(matches!(err, ApiError::SessionExchange(_)));
        assert_eq!(err.public_message(), "微信登录态无效，请返回重试");
    }

    #[test]
    fn missing_session_key_is_not_an_error_here() {
        let raw = serde_json::json!({ "openid": "abc" });
        let session = session_from_value(&raw).unwrap();
        assert!(session.session_key.is_none());
    }
}
