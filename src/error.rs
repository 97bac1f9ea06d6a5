use thiserror::Error;

use crate::wechat::crypto::DecryptError;

/// 业务错误码，沿用内部约定的数字段
pub mod error_codes {
    pub const ACCOUNT_NOT_FOUND: i32 = 1100;
    pub const SESSION_EXCHANGE: i32 = 1101;
    pub const UPSTREAM_TIMEOUT: i32 = 1102;
    pub const DECRYPT: i32 = 1103;
    pub const PHONE_RETRIEVAL: i32 = 1104;
    pub const BIZ_USER_CREATION: i32 = 1105;
    pub const UNAUTHORIZED: i32 = 1002;
    pub const NOT_FOUND: i32 = 1004;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const RATE_LIMIT: i32 = 1005;
    pub const INTERNAL_ERROR: i32 = 5000;

    // JSON-RPC 标准错误码
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const PARSE_ERROR: i32 = -32700;
}

/// 对外统一的错误类型。message 都是面向用户的文案，
/// 内部异常在转换前先带上下文写日志。
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("找不到小程序")]
    AccountNotFound,

    /// code 已失效等微信侧的语义错误，终态，用户需重新发起登录
    #[error("{0}")]
    SessionExchange(String),

    #[error("微信接口超时，请稍后重试")]
    UpstreamTimeout,

    #[error("微信数据异常，请重试")]
    Decrypt(#[from] DecryptError),

    #[error("{0}")]
    PhoneRetrieval(String),

    /// 锁内仍然撞了唯一约束等无法自愈的场景
    #[error("请重新打开小程序")]
    BizUserCreation,

    #[error("用户未登录")]
    Unauthorized,

    #[error("找不到微信小程序用户信息")]
    WechatUserNotFound,

    /// 参数形状没问题但业务上非法（空code、空手机号等）
    #[error("请求参数不正确")]
    Validation(String),

    #[error("请求参数不正确")]
    InvalidParams(String),

    #[error("不支持的方法")]
    MethodNotFound(String),

    #[error("内部服务器错误")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> i32 {
        match self {
            ApiError::AccountNotFound => error_codes::ACCOUNT_NOT_FOUND,
            ApiError::SessionExchange(_) => error_codes::SESSION_EXCHANGE,
            ApiError::UpstreamTimeout => error_codes::UPSTREAM_TIMEOUT,
            ApiError::Decrypt(_) => error_codes::DECRYPT,
            ApiError::PhoneRetrieval(_) => error_codes::PHONE_RETRIEVAL,
            ApiError::BizUserCreation => error_codes::BIZ_USER_CREATION,
            ApiError::Unauthorized => error_codes::UNAUTHORIZED,
            ApiError::WechatUserNotFound => error_codes::NOT_FOUND,
            ApiError::Validation(_) => error_codes::VALIDATION_ERROR,
            ApiError::InvalidParams(_) => error_codes::INVALID_PARAMS,
            ApiError::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            ApiError::Internal(_) => error_codes::INTERNAL_ERROR,
        }
    }

    /// 对用户展示的文案，内部细节只进日志不出网
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Validation(msg) | ApiError::InvalidParams(msg) => {
                if msg.is_empty() {
                    "请求参数不正确".to_string()
                } else {
                    msg.clone()
                }
            }
            ApiError::MethodNotFound(method) => format!("不支持的方法: {}", method),
            other => other.to_string(),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!("数据库错误: {:?}", e);
        ApiError::Internal(e.to_string())
    }
}

impl From<redis::RedisError> for ApiError {
    fn from(e: redis::RedisError) -> Self {
        tracing::error!("Redis错误: {:?}", e);
        ApiError::Internal(e.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        tracing::error!("令牌错误: {:?}", e);
        ApiError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrypt_error_maps_to_public_message() {
        let err = ApiError::Decrypt(DecryptError::InvalidPayload);
        assert_eq!(err.public_message(), "微信数据异常，请重试");
        assert_eq!(err.code(), error_codes::DECRYPT);
    }

    #[test]
    fn invalid_params_keeps_custom_text() {
        let err = ApiError::InvalidParams("code参数必须是字符串".into());
        assert_eq!(err.public_message(), "code参数必须是字符串");
    }

    #[test]
    fn validation_error_has_own_code_and_fallback_text() {
        let err = ApiError::Validation(String::new());
        assert_eq!(err.code(), error_codes::VALIDATION_ERROR);
        assert_eq!(err.public_message(), "请求参数不正确");

        let err = ApiError::Validation("code参数不能为空".into());
        assert_eq!(err.public_message(), "code参数不能为空");
    }

    #[test]
    fn internal_error_hides_details() {
        let err = ApiError::Internal("connection refused".into());
        assert_eq!(err.public_message(), "内部服务器错误");
    }
}
