use std::env;
use std::time::Duration;

/// 微信默认头像
pub const DEFAULT_AVATAR: &str =
    "https://thirdwx.qlogo.cn/mmopen/vi_32/POgEwh4mIHO4nibH0KlMECNjjGxQUq24ZEaGT4poC6icRiccVGKSyXwibcPq4BWmiaIGuG1icwxaQX6grC9VemZoIbeg/132";

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub server_host: String,
    pub server_port: u16,
    /// 微信接口地址，测试环境可指向 mock 服务
    pub wechat_api_base_url: String,
    /// 是否允许 mock_{json} 形式的登录code，仅开发环境打开
    pub allow_mock_code: bool,
    pub default_user_nickname: String,
    pub default_user_avatar_url: String,
    pub session_log_retention_days: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let jwt_expiration = env::var("JWT_EXPIRATION")?
            .trim_end_matches('h')
            .parse::<u64>()
            .unwrap_or(24);
        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")?,
            server_host: env::var("SERVER_HOST")?,
            server_port: env::var("SERVER_PORT")?.parse().unwrap_or(3000),
            jwt_secret: env::var("JWT_SECRET")?,
            jwt_expiration_secs: jwt_expiration * 3600,
            rate_limit_window_secs: env::var("RATE_LIMIT_WINDOW")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            rate_limit_requests: env::var("RATE_LIMIT_REQUESTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
            wechat_api_base_url: env::var("WECHAT_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.weixin.qq.com".to_string()),
            allow_mock_code: env::var("WECHAT_ALLOW_MOCK_CODE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            default_user_nickname: env::var("WECHAT_DEFAULT_USER_NICKNAME")
                .unwrap_or_else(|_| "微信用户".to_string()),
            default_user_avatar_url: env::var("WECHAT_DEFAULT_USER_AVATAR_URL")
                .unwrap_or_else(|_| DEFAULT_AVATAR.to_string()),
            session_log_retention_days: env::var("SESSION_LOG_RETENTION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        })
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}
