use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{
    ConnectionLifecycleController, InMemoryBus, LifecycleDependencies, RateLimiter, SystemClock,
};
use config::{JwtConfig, RateLimitConfig};
use futures_util::StreamExt;
use infrastructure::{DemoSeed, MemoryStore};
use tokio::{net::TcpListener, sync::oneshot};
use tokio_tungstenite::{
    tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState, JwtService};

pub type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// 绑定随机端口的测试服务器，使用内存存储与内存总线
pub struct TestServer {
    pub addr: SocketAddr,
    pub seed: DemoSeed,
    pub store: MemoryStore,
    pub jwt: Arc<JwtService>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let store = MemoryStore::new();
        let seed = store.seed_demo();
        let shared = Arc::new(store.clone());
        let jwt = Arc::new(JwtService::new(JwtConfig {
            secret: "test-secret-key-that-is-long-enough-for-hs256".to_string(),
            expiration_hours: 24,
        }));

        let controller = Arc::new(ConnectionLifecycleController::new(LifecycleDependencies {
            rooms: shared.clone(),
            messages: shared.clone(),
            notifications: shared.clone(),
            users: shared.clone(),
            verifier: jwt.clone(),
            bus: Arc::new(InMemoryBus::new(256)),
            limiter: Arc::new(RateLimiter::from_config(
                &RateLimitConfig::default(),
                Arc::new(SystemClock),
            )),
            clock: Arc::new(SystemClock),
        }));
        controller.clone().start_fanout().await.expect("fan-out");

        let state = AppState::new(controller, shared.clone(), shared, jwt.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, router(state).into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            seed,
            store,
            jwt,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, token: &str) -> String {
        format!("ws://{}/ws?token={}", self.addr, token)
    }

    pub fn token_for(&self, index: usize) -> String {
        self.jwt
            .generate_token(self.seed.users[index].id)
            .expect("token")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// 读取下一个满足条件的服务端事件
pub async fn next_event<F>(ws: &mut WsClient, mut matches: F) -> domain::ServerEvent
where
    F: FnMut(&domain::ServerEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            let frame = ws.next().await.expect("socket closed").expect("frame");
            if let TungsteniteMessage::Text(text) = frame {
                let event: domain::ServerEvent =
                    serde_json::from_str(text.as_str()).expect("server event");
                if matches(&event) {
                    return event;
                }
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
