//! 需要本地 Redis：设置 REDIS_INTEGRATION_TEST 后运行

use std::time::Duration;

use application::FanOutBus;
use chrono::Utc;
use config::RedisConfig;
use domain::{BusEnvelope, PresenceStatus, UserId};
use infrastructure::RedisBus;

fn redis_config() -> RedisConfig {
    RedisConfig {
        url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
        channel_prefix: format!("test-{}:", UserId::new()),
        ..RedisConfig::default()
    }
}

#[tokio::test]
async fn envelope_crosses_two_bus_instances() {
    if std::env::var("REDIS_INTEGRATION_TEST").is_err() {
        return;
    }
    let config = redis_config();
    let process_a = RedisBus::connect(&config, 64).await.unwrap();
    let process_b = RedisBus::connect(&config, 64).await.unwrap();
    let mut subscription = process_b.subscribe().await.unwrap();
    // 等待订阅连接建立
    tokio::time::sleep(Duration::from_millis(300)).await;

    let envelope = BusEnvelope::PresenceChanged {
        user_id: UserId::new(),
        status: PresenceStatus::Online,
        timestamp: Utc::now(),
    };
    process_a.publish(envelope.clone()).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), subscription.recv())
        .await
        .unwrap();
    assert_eq!(received, Some(envelope));
    assert_eq!(process_a.publisher().channel_stats().len(), 1);
}
