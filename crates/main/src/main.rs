//! 主应用程序入口
//!
//! 加载配置，组装总线、存储与连接生命周期控制器，启动 Axum 服务。

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use application::{
    ConnectionLifecycleController, LifecycleDependencies, RateLimiter, SystemClock,
};
use config::AppConfig;
use infrastructure::{build_bus, MemoryStore};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("加载配置失败")?;
    tracing::info!(config = %config.sanitize(), "配置已加载");

    let clock = Arc::new(SystemClock);
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

    if config.server.seed_demo {
        let seed = store.seed_demo();
        tracing::info!(room_id = %seed.room.id, room = %seed.room.name, "已写入演示数据");
        for user in &seed.users {
            let token = jwt_service.generate_token(user.id).map_err(|err| {
                anyhow::anyhow!("生成演示 token 失败: {:?}", err)
            })?;
            tracing::info!(user_id = %user.id, username = %user.username, %token, "演示用户");
        }
    }

    let bus = build_bus(&config).await.context("创建扇出总线失败")?;
    let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit, clock.clone()));
    let sweeper = RateLimiter::spawn_sweeper(
        limiter.clone(),
        Duration::from_secs(config.rate_limit.sweep_interval_secs),
    );

    let controller = Arc::new(ConnectionLifecycleController::new(LifecycleDependencies {
        rooms: store.clone(),
        messages: store.clone(),
        notifications: store.clone(),
        users: store.clone(),
        verifier: jwt_service.clone(),
        bus,
        limiter,
        clock,
    }));
    let fanout = controller
        .clone()
        .start_fanout()
        .await
        .context("订阅扇出总线失败")?;

    let state = AppState::new(controller, store.clone(), store, jwt_service);
    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("绑定 {addr} 失败"))?;

    tracing::info!("聊天室服务器启动在 http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    fanout.abort();
    tracing::info!("服务器已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "监听 ctrl-c 失败");
    }
    tracing::info!("收到关闭信号");
}
