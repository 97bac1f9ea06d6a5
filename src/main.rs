use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{Router, routing::post};
use backend::{
    AppState,
    cache::LockManager,
    config::Config,
    infrastructure::{DatabaseUserManager, HookRegistry},
    middleware::{RateLimiter, auth_middleware, log_errors, rate_limit},
    routes, tasks,
    wechat::WechatClient,
};
use sqlx::postgres::PgPoolOptions;
#[cfg(debug_assertions)]
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    if config.allow_mock_code {
        tracing::warn!("mock登录code已开启，生产环境请关闭 WECHAT_ALLOW_MOCK_CODE");
    }

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    // 设置 Redis 客户端
    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");
    let redis_arc = Arc::new(redis_client.clone());

    // 宿主应用在这里注册 code2session / 手机号上报的扩展监听器
    let hooks = Arc::new(HookRegistry::new());

    // 设置应用状态
    let state = AppState {
        pool: pool.clone(),
        config: config.clone(),
        redis: redis_arc.clone(),
        wechat: WechatClient::new(config.wechat_api_base_url.clone(), config.allow_mock_code),
        locks: LockManager::new(redis_arc),
        user_manager: Arc::new(DatabaseUserManager::new(pool.clone())),
        hooks,
    };

    // 会话日志保留策略任务
    tokio::spawn(tasks::run_session_log_retention(
        pool,
        config.session_log_retention_days,
    ));

    // 设置限流器
    let rate_limiter = Arc::new(RateLimiter::new(redis_client, config.clone()));

    // 所有procedure走同一个 JsonRPC 入口，
    // 鉴权中间件只负责解析令牌，是否要求登录由procedure自己判断
    let router = Router::new()
        .route("/rpc", post(routes::rpc::handle))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // 添加日志中间件和限流中间件
    let router = router.layer(axum::middleware::from_fn(log_errors)).layer(
        axum::middleware::from_fn_with_state(rate_limiter, rate_limit),
    );

    // 开发模式下放开CORS
    #[cfg(debug_assertions)]
    let router = router.layer(CorsLayer::permissive());

    let app = router.with_state(state.clone());

    // 启动服务器
    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
