//! Web API 层。
//!
//! 提供 Axum 路由：WebSocket 握手在升级前完成认证，之后的事件交给连接生命周期控制器。

mod auth;
mod error;
mod routes;
mod state;
mod ws_connection;

pub use auth::{bearer_token, Claims, JwtService};
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
