use std::sync::Arc;

use redis::Client as RedisClient;
use sqlx::PgPool;

use cache::LockManager;
use config::Config;
use infrastructure::{HookRegistry, UserManager};
use wechat::WechatClient;

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod infrastructure;
pub mod middleware;
pub mod routes;
pub mod tasks;
pub mod utils;
pub mod wechat;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub redis: Arc<RedisClient>,
    pub wechat: WechatClient,
    pub locks: LockManager,
    pub user_manager: Arc<dyn UserManager>,
    pub hooks: Arc<HookRegistry>,
}
