use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use redis::Client as RedisClient;
use uuid::Uuid;

use crate::error::ApiError;

/// 单次持锁上限，覆盖一次找建用户的临界区足够
const LOCK_TTL_MS: u64 = 10_000;
const ACQUIRE_RETRY_INTERVAL: Duration = Duration::from_millis(100);
const ACQUIRE_MAX_ATTEMPTS: u32 = 50;

/// 基于 Redis SET NX PX 的逻辑身份锁。
/// 锁按 openId / 业务用户标识粒度获取，临界区结束后无条件释放。
#[derive(Clone)]
pub struct LockManager {
    redis: Arc<RedisClient>,
}

impl LockManager {
    pub fn new(redis: Arc<RedisClient>) -> Self {
        Self { redis }
    }

    /// 在 key 对应的锁内执行 f，返回 f 的结果。
    /// 出错也会走释放逻辑，不会把锁留到TTL之外。
    pub async fn run_exclusively<F, Fut, T>(&self, key: &str, f: F) -> Result<T, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let lock_key = format!("lock:{}", key);
        let owner = Uuid::new_v4().to_string();
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let mut acquired = false;
        for _ in 0..ACQUIRE_MAX_ATTEMPTS {
            let reply: Option<String> = redis::cmd("SET")
                .arg(&lock_key)
                .arg(&owner)
                .arg("NX")
                .arg("PX")
                .arg(LOCK_TTL_MS)
                .query_async(&mut conn)
                .await?;
            if reply.is_some() {
                acquired = true;
                break;
            }
            tokio::time::sleep(ACQUIRE_RETRY_INTERVAL).await;
        }
        if !acquired {
            tracing::error!(key = %lock_key, "获取身份锁超时");
            return Err(ApiError::Internal(format!("lock timeout: {}", lock_key)));
        }

        let result = f().await;

        // 只释放自己持有的锁，过期被别人抢走时不误删
        let current: Option<String> = redis::cmd("GET")
            .arg(&lock_key)
            .query_async(&mut conn)
            .await
            .unwrap_or(None);
        if current.as_deref() == Some(owner.as_str()) {
            let _: Result<(), _> = redis::cmd("DEL")
                .arg(&lock_key)
                .query_async::<()>(&mut conn)
                .await;
        }

        result
    }
}
